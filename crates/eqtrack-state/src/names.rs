//! Canonical SCREAMING_SNAKE_CASE names for status enums.
//!
//! The names are what gets persisted, so `Display` and `FromStr` must agree
//! with the serde representation. One macro keeps the three in lockstep.

macro_rules! state_names {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Every state, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// The canonical persisted name of this state.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = eqtrack_core::CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(eqtrack_core::CoreError::UnknownState {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

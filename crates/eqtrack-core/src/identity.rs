//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier the lifecycle core handles. Each
//! namespace is its own type: a `LoanSlipId` cannot be handed to an operation
//! expecting a `MaintenanceSlipId`.
//!
//! Identifiers render as `namespace:uuid` and parse from either that form or
//! a bare UUID.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $namespace:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Identifier namespace used in the rendered form.
            pub const NAMESPACE: &'static str = $namespace;

            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}:{}", $namespace, self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .strip_prefix(concat!($namespace, ":"))
                    .unwrap_or(s);
                Uuid::parse_str(raw)
                    .map(Self)
                    .map_err(|_| CoreError::InvalidIdentifier {
                        kind: $namespace,
                        value: s.to_string(),
                    })
            }
        }
    };
}

uuid_identifier!(
    /// A physical device tracked through the lifecycle.
    DeviceId,
    "device"
);

uuid_identifier!(
    /// A user acting as borrower, loaner, returner, or document author.
    UserId,
    "user"
);

uuid_identifier!(
    /// An external repair partner.
    PartnerId,
    "partner"
);

uuid_identifier!(
    /// A loan slip header.
    LoanSlipId,
    "loan"
);

uuid_identifier!(
    /// A return slip header.
    ReturnSlipId,
    "return"
);

uuid_identifier!(
    /// A maintenance dispatch slip header.
    MaintenanceSlipId,
    "maintenance"
);

uuid_identifier!(
    /// A maintenance-return slip header.
    MaintenanceReturnSlipId,
    "maintenance-return"
);

uuid_identifier!(
    /// A warranty request.
    WarrantyId,
    "warranty"
);

uuid_identifier!(
    /// A detail line under any document header.
    DetailId,
    "line"
);

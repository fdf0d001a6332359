//! # Lifecycle Engine
//!
//! [`Engine`] owns the store, the code sequencer and the cache signal, and
//! hands out one borrowed facade per cycle:
//!
//! ```ignore
//! let engine = Engine::new(store, EngineConfig::default())?;
//! let slip = engine.loans().create(&mut ctx, borrower, loaner, &devices).await?;
//! ```
//!
//! Every cycle operation follows the same shape: `begin`, run the body
//! against the transaction, then [`Engine::finish`], which commits and
//! signals the cache on success or rolls back on failure.

use std::sync::Arc;

use eqtrack_core::DeviceId;
use eqtrack_state::Device;

use crate::cache::{CacheInvalidator, CacheTag, TracingInvalidator};
use crate::config::{ConfigError, EngineConfig};
use crate::device::DeviceStateStore;
use crate::error::CycleError;
use crate::loan::LoanCycle;
use crate::maintenance::MaintenanceCycle;
use crate::ports::{Store, Transaction};
use crate::returns::ReturnCycle;
use crate::sequencer::CodeSequencer;
use crate::warranty::WarrantyCycle;

/// Entry point of the lifecycle core.
pub struct Engine<S: Store> {
    store: S,
    cache: Arc<dyn CacheInvalidator>,
    sequencer: CodeSequencer,
    config: EngineConfig,
}

impl<S: Store> Engine<S> {
    /// Build an engine over `store`.
    pub fn new(store: S, config: EngineConfig) -> Result<Self, ConfigError> {
        let sequencer = CodeSequencer::new(config.code_offset()?);
        Ok(Self {
            store,
            cache: Arc::new(TracingInvalidator),
            sequencer,
            config,
        })
    }

    /// Replace the cache-invalidation sink.
    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Loan slips.
    pub fn loans(&self) -> LoanCycle<'_, S> {
        LoanCycle::new(self)
    }

    /// Return slips.
    pub fn returns(&self) -> ReturnCycle<'_, S> {
        ReturnCycle::new(self)
    }

    /// Maintenance and maintenance-return slips.
    pub fn maintenance(&self) -> MaintenanceCycle<'_, S> {
        MaintenanceCycle::new(self)
    }

    /// Warranty requests.
    pub fn warranties(&self) -> WarrantyCycle<'_, S> {
        WarrantyCycle::new(self)
    }

    /// Load a live device.
    pub async fn device(&self, id: DeviceId) -> Result<Device, CycleError> {
        let mut tx = self.begin().await?;
        let result = DeviceStateStore::new(&mut tx).load(id).await;
        self.finish(tx, result, &[]).await
    }

    pub(crate) fn sequencer(&self) -> &CodeSequencer {
        &self.sequencer
    }

    pub(crate) async fn begin(&self) -> Result<S::Tx, CycleError> {
        Ok(self.store.begin().await?)
    }

    /// Commit on `Ok` and signal `tags`; roll back on `Err`.
    pub(crate) async fn finish<T>(
        &self,
        tx: S::Tx,
        result: Result<T, CycleError>,
        tags: &[CacheTag],
    ) -> Result<T, CycleError> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                self.invalidate(tags);
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                tracing::warn!(kind = err.kind(), error = %err, "operation rolled back");
                Err(err)
            }
        }
    }

    fn invalidate(&self, tags: &[CacheTag]) {
        if !self.config.invalidate_cache {
            return;
        }
        for tag in tags {
            if let Err(err) = self.cache.invalidate(*tag) {
                tracing::warn!(tag = %tag, error = %err, "cache invalidation failed");
            }
        }
    }
}

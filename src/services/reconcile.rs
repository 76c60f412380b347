//! Applies entity patches to the twin store, one entity at a time.
//!
//! Per entity: check existence, create when absent, then apply the patch. A failure on one
//! entity is logged and recorded; the remaining entities are still processed.

use log::{debug, error, info, warn};

use crate::client::{TwinClientError, TwinStore};
use crate::config::LOG_PATCHES;
use crate::models::twin::EntityPatch;

/// What to do when the existence check fails for a reason other than "not found".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistencePolicy {
    /// Treat the failure as absence and attempt a create-or-replace.
    pub treat_check_failure_as_absent: bool,
}

impl Default for ExistencePolicy {
    fn default() -> Self {
        ExistencePolicy {
            treat_check_failure_as_absent: true,
        }
    }
}

/// Step at which an entity failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckExists,
    Create,
    Apply,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityStatus {
    Updated,
    Failed { stage: Stage, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityResult {
    pub entity_id: String,
    pub created: bool,
    pub status: EntityStatus,
}

impl EntityResult {
    pub fn is_updated(&self) -> bool {
        self.status == EntityStatus::Updated
    }
}

pub struct Reconciler<'a, T: TwinStore + ?Sized> {
    store: &'a T,
    policy: ExistencePolicy,
    log_verbosity: i32,
}

impl<'a, T: TwinStore + ?Sized> Reconciler<'a, T> {
    pub fn new(store: &'a T, policy: ExistencePolicy, log_verbosity: i32) -> Self {
        Reconciler {
            store,
            policy,
            log_verbosity,
        }
    }

    pub fn reconcile(&self, patches: &[EntityPatch]) -> Vec<EntityResult> {
        patches.iter().map(|p| self.reconcile_one(p)).collect()
    }

    fn reconcile_one(&self, patch: &EntityPatch) -> EntityResult {
        let id = patch.entity_id.as_str();
        let operations = patch.operations();
        if self.log_verbosity >= LOG_PATCHES {
            let doc = serde_json::to_string_pretty(&operations).unwrap_or_default();
            info!("Patch document for {}:\n{}", id, doc);
        }

        let mut created = false;
        let failed = |created: bool, stage: Stage, message: String| EntityResult {
            entity_id: id.to_string(),
            created,
            status: EntityStatus::Failed { stage, message },
        };

        let must_create = match self.store.get_twin(id) {
            Ok(twin) => {
                debug!(
                    "Twin '{}' exists (model={}, etag={})",
                    twin.id,
                    twin.metadata.as_ref().and_then(|m| m.model.as_deref()).unwrap_or("-"),
                    twin.etag.as_deref().unwrap_or("-")
                );
                false
            }
            Err(TwinClientError::NotFound(_)) => {
                info!("'{}' does not exist. Creating new twin of model '{}'", id, patch.model_id);
                true
            }
            Err(e) if self.policy.treat_check_failure_as_absent => {
                warn!(
                    "Existence check for '{}' failed ({}); treating as absent and creating twin of model '{}'",
                    id, e, patch.model_id
                );
                true
            }
            Err(e) => {
                error!("Existence check for '{}' failed: {}", id, e);
                return failed(created, Stage::CheckExists, e.to_string());
            }
        };

        if must_create {
            if let Err(e) = self.store.create_or_replace_twin(id, &patch.model_id) {
                error!("Error creating twin '{}': {}", id, e);
                return failed(created, Stage::Create, e.to_string());
            }
            created = true;
        }

        match self.store.update_twin(id, &operations) {
            Ok(()) => {
                match patch.observed_at {
                    Some(ts) => info!("Successfully updated twin: {} (source time {})", id, ts.to_rfc3339()),
                    None => info!("Successfully updated twin: {}", id),
                }
                EntityResult {
                    entity_id: id.to_string(),
                    created,
                    status: EntityStatus::Updated,
                }
            }
            Err(e) => {
                error!("Error updating twin '{}': {}", id, e);
                failed(created, Stage::Apply, e.to_string())
            }
        }
    }
}

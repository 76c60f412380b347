use log::{error, info, warn};

use crate::client::TwinStore;
use crate::config::LOG_BODIES;
use crate::error::BridgeError;
use crate::services::decoder;
use crate::services::mapping_cache::{MappingCache, MappingSource};
use crate::services::patch::build_patches;
use crate::services::reconcile::{EntityResult, ExistencePolicy, Reconciler};
use crate::services::resolver::resolve;

/// Outcome of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub readings: usize,
    pub entities: usize,
    pub updated: usize,
    pub created: usize,
    pub failed: usize,
    pub results: Vec<EntityResult>,
}

impl BatchReport {
    fn from_results(readings: usize, results: Vec<EntityResult>) -> Self {
        BatchReport {
            readings,
            entities: results.len(),
            updated: results.iter().filter(|r| r.is_updated()).count(),
            created: results.iter().filter(|r| r.created).count(),
            failed: results.iter().filter(|r| !r.is_updated()).count(),
            results,
        }
    }
}

/// Event-to-twin pipeline. Holds the process-lifetime mapping cache.
pub struct Bridge<S, T> {
    mapping: MappingCache<S>,
    store: T,
    policy: ExistencePolicy,
    log_verbosity: i32,
}

impl<S: MappingSource, T: TwinStore> Bridge<S, T> {
    pub fn new(source: S, store: T, policy: ExistencePolicy, log_verbosity: i32) -> Self {
        Bridge {
            mapping: MappingCache::new(source),
            store,
            policy,
            log_verbosity,
        }
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    /// Handles one event envelope end to end.
    ///
    /// An empty batch is a no-op and returns an empty report. Every other input or mapping
    /// problem is returned before any twin write is attempted.
    pub fn process_event(&self, event: &str) -> Result<BatchReport, BridgeError> {
        let body = decoder::extract_body(event)?;
        self.process_body(&body)
    }

    pub fn process_body(&self, body: &str) -> Result<BatchReport, BridgeError> {
        let readings = match decoder::decode(body) {
            Ok(r) => r,
            Err(BridgeError::EmptyPayload) => {
                warn!("Decoded batch is empty, nothing to update");
                return Ok(BatchReport::default());
            }
            Err(e) => return Err(e),
        };
        if self.log_verbosity >= LOG_BODIES {
            info!("body:\n{}", decoder::decode_body(body).unwrap_or_default());
        }

        let mapping = self.mapping.get()?;
        let updates = resolve(&readings, mapping)?;
        if self.log_verbosity >= LOG_BODIES {
            for u in &updates {
                info!(
                    "resolved {} -> {}/{} = '{}' @ {}",
                    u.node_key,
                    u.entity_id,
                    u.property_name,
                    u.value,
                    u.timestamp.to_rfc3339()
                );
            }
        }

        let patches = build_patches(&updates);
        let results = Reconciler::new(&self.store, self.policy, self.log_verbosity).reconcile(&patches);
        let report = BatchReport::from_results(readings.len(), results);

        if report.failed > 0 {
            error!(
                "Batch done with failures: readings={}, twins={}, updated={}, created={}, failed={}",
                report.readings, report.entities, report.updated, report.created, report.failed
            );
        } else {
            info!(
                "Batch done: readings={}, twins={}, updated={}, created={}",
                report.readings, report.entities, report.updated, report.created
            );
        }
        Ok(report)
    }
}

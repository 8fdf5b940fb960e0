//! Node configuration.
//!
//! Values are externally supplied (the process's config loader is out of
//! scope here) and validated with safe fallbacks: a bad value is replaced
//! by its default rather than aborting the node.

use attest_core::TrustWeights;
use attest_federation::{GuardConfig, SyncerConfig};

/// Configuration the node consumes.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// This node's producer identifier, stamped on local records.
    pub producer: String,
    /// Record schema version tag for new records.
    pub record_version: String,
    /// Trust score weights.
    pub trust_weights: TrustWeights,
    /// Boundary guard settings for the ingestion surface.
    pub guards: GuardConfig,
    /// Range-sync settings.
    pub sync: SyncerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            producer: "attest-node".to_string(),
            record_version: "1".to_string(),
            trust_weights: TrustWeights::default(),
            guards: GuardConfig::default(),
            sync: SyncerConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Replace invalid values with safe defaults.
    pub fn validated(mut self) -> Self {
        if self.producer.is_empty() {
            self.producer = "attest-node".to_string();
        }
        if self.record_version.is_empty() {
            self.record_version = "1".to_string();
        }
        self.trust_weights = self.trust_weights.or_default();
        self.guards = self.guards.validated();
        self.sync = self.sync.validated();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::DEFAULT_TRUST_WEIGHTS;

    #[test]
    fn test_invalid_values_fall_back() {
        let config = NodeConfig {
            producer: String::new(),
            record_version: String::new(),
            trust_weights: TrustWeights {
                fidelity: 2.0,
                signature: 2.0,
                continuity: 2.0,
            },
            ..Default::default()
        }
        .validated();

        assert_eq!(config.producer, "attest-node");
        assert_eq!(config.record_version, "1");
        assert_eq!(config.trust_weights, DEFAULT_TRUST_WEIGHTS);
    }
}

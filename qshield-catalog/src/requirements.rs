//! Caller requirements that drive scoring and recommendation.

use serde::{Deserialize, Serialize};

/// How much the caller cares about raw throughput.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformancePriority {
    Low,
    #[default]
    Normal,
    High,
}

/// What the caller needs from an algorithm.
///
/// Deserialized straight from the recommendation/comparison request bodies;
/// every field defaults so partial requests are valid.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Requirements {
    pub performance_priority: PerformancePriority,
    /// Hard preference for quantum-resistant algorithms.
    pub quantum_resistance: bool,
    /// Compliance standards the deployment must carry, e.g. `["FIPS-203"]`.
    pub compliance_standards: Vec<String>,
    /// Free-form environment descriptors, e.g. `["legacy", "embedded"]`.
    pub environment: Vec<String>,
    /// Reject algorithms whose largest key size is below this.
    pub min_key_size: Option<u32>,
}

impl Requirements {
    /// Whether any environment descriptor contains `keyword`
    /// (case-insensitive substring match).
    pub fn environment_mentions(&self, keyword: &str) -> bool {
        self.environment
            .iter()
            .any(|e| e.to_ascii_lowercase().contains(keyword))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let req = Requirements::default();
        assert_eq!(req.performance_priority, PerformancePriority::Normal);
        assert!(!req.quantum_resistance);
        assert!(req.compliance_standards.is_empty());
    }

    #[test]
    fn environment_matching_is_substring_and_case_insensitive() {
        let req = Requirements {
            environment: vec!["Legacy mainframe".into(), "cloud".into()],
            ..Default::default()
        };
        assert!(req.environment_mentions("legacy"));
        assert!(req.environment_mentions("cloud"));
        assert!(!req.environment_mentions("embedded"));
    }

    #[test]
    fn deserializes_partial_bodies() {
        let req: Requirements =
            serde_json::from_str(r#"{"quantumResistance": true}"#).unwrap();
        assert!(req.quantum_resistance);
        assert_eq!(req.performance_priority, PerformancePriority::Normal);
    }
}

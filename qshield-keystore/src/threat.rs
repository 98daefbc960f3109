//! Threat intelligence: the pluggable signal source and the simulated feed.
//!
//! Everything downstream (trigger evaluation, the background monitor, the
//! dashboard) only sees the [`ThreatSignal`] trait. The production
//! implementation is a seeded-RNG simulation; swapping in a real feed is a
//! matter of implementing the trait.

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Threat intelligence records
// ---------------------------------------------------------------------------

/// Broad category of a detected threat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    QuantumAdvance,
    Cryptanalysis,
    ImplementationFlaw,
    SupplyChain,
    KeyCompromise,
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreatCategory::QuantumAdvance => write!(f, "quantum_advance"),
            ThreatCategory::Cryptanalysis => write!(f, "cryptanalysis"),
            ThreatCategory::ImplementationFlaw => write!(f, "implementation_flaw"),
            ThreatCategory::SupplyChain => write!(f, "supply_chain"),
            ThreatCategory::KeyCompromise => write!(f, "key_compromise"),
        }
    }
}

/// One threat intelligence record. Deactivated, never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreatIntelligence {
    pub id: String,
    pub category: ThreatCategory,
    /// 1 (informational) to 5 (critical).
    pub severity: u8,
    /// Detection confidence in [0, 1].
    pub confidence: f64,
    pub source: String,
    pub title: String,
    pub description: String,
    /// Catalog algorithm names this threat bears on.
    pub affected_algorithms: Vec<String>,
    pub predicted_impact: Option<DateTime<Utc>>,
    pub mitigations: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ThreatIntelligence {
    /// Whether this threat names the given algorithm (case-insensitive).
    pub fn affects(&self, algorithm: &str) -> bool {
        self.affected_algorithms
            .iter()
            .any(|a| a.eq_ignore_ascii_case(algorithm))
    }
}

// ---------------------------------------------------------------------------
// Signal trait
// ---------------------------------------------------------------------------

/// Source of threat signals. Implementations must be cheap to poll; trigger
/// evaluation calls into this on every assessment.
pub trait ThreatSignal: Send + Sync {
    /// Current global threat level in [0, 1].
    fn global_threat_level(&self) -> f64;

    /// Whether a compliance issue is currently flagged.
    fn compliance_issue(&self) -> bool;

    /// Poll for a newly detected threat. Most polls return `None`.
    fn sample_threat(&self) -> Option<ThreatIntelligence>;
}

// ---------------------------------------------------------------------------
// Candidate table for the simulated feed
// ---------------------------------------------------------------------------

struct ThreatTemplate {
    category: ThreatCategory,
    source: &'static str,
    title: &'static str,
    description: &'static str,
    affected: &'static [&'static str],
    mitigations: &'static [&'static str],
    base_severity: u8,
}

static THREAT_TEMPLATES: &[ThreatTemplate] = &[
    ThreatTemplate {
        category: ThreatCategory::QuantumAdvance,
        source: "Academic preprint monitor",
        title: "Logical-qubit milestone reported",
        description: "A fault-tolerant logical qubit count milestone shortens \
                      the projected window for classical public-key algorithms.",
        affected: &["RSA-2048", "RSA-4096", "ECDSA-P256", "X25519"],
        mitigations: &[
            "Accelerate migration to NIST PQC algorithms",
            "Shorten rotation intervals for classical keys",
        ],
        base_severity: 4,
    },
    ThreatTemplate {
        category: ThreatCategory::Cryptanalysis,
        source: "IACR ePrint monitor",
        title: "Improved lattice reduction estimate",
        description: "A refined cost model for lattice reduction marginally \
                      lowers concrete security estimates for lattice schemes.",
        affected: &["CRYSTALS-Kyber", "CRYSTALS-Dilithium", "FALCON"],
        mitigations: &[
            "Prefer the largest parameter set",
            "Track revised NIST category mappings",
        ],
        base_severity: 2,
    },
    ThreatTemplate {
        category: ThreatCategory::Cryptanalysis,
        source: "CERT advisory feed",
        title: "Practical attack on legacy curve implementations",
        description: "Invalid-curve handling flaws are being exploited against \
                      unpatched ECDSA deployments.",
        affected: &["ECDSA-P256"],
        mitigations: &["Patch affected libraries", "Rotate exposed signing keys"],
        base_severity: 4,
    },
    ThreatTemplate {
        category: ThreatCategory::ImplementationFlaw,
        source: "Vendor security bulletin",
        title: "Timing side channel in signature sampler",
        description: "A non-constant-time Gaussian sampler leaks key bits under \
                      co-located measurement.",
        affected: &["FALCON"],
        mitigations: &["Apply vendor patch", "Rotate keys generated on affected builds"],
        base_severity: 3,
    },
    ThreatTemplate {
        category: ThreatCategory::SupplyChain,
        source: "Dependency audit",
        title: "Compromised build of a crypto provider",
        description: "A tampered artifact was published for a widely used \
                      cryptographic provider; affected deployments cannot trust \
                      key material generated during the exposure window.",
        affected: &["RSA-2048", "AES-256-GCM"],
        mitigations: &["Pin verified artifact digests", "Rotate keys created in the window"],
        base_severity: 5,
    },
    ThreatTemplate {
        category: ThreatCategory::KeyCompromise,
        source: "Dark-web monitor",
        title: "Credential dump references internal key identifiers",
        description: "Leaked material includes identifiers consistent with \
                      managed signing keys.",
        affected: &["RSA-2048", "ECDSA-P256", "CRYSTALS-Dilithium"],
        mitigations: &["Rotate referenced keys immediately", "Audit access logs"],
        base_severity: 5,
    },
];

// ---------------------------------------------------------------------------
// Simulated feed
// ---------------------------------------------------------------------------

/// Probability that one poll of [`ThreatSignal::sample_threat`] yields a hit.
const DETECTION_PROBABILITY: f64 = 0.30;
/// Probability that a compliance poll flags an issue.
const COMPLIANCE_ISSUE_PROBABILITY: f64 = 0.05;
/// Resting global threat level before noise and the diurnal term.
const BASE_THREAT_LEVEL: f64 = 0.30;

/// Simulated threat feed: a noisy baseline with a daily sinusoidal swing and
/// randomized detections drawn from a fixed candidate table.
///
/// Seed it for deterministic tests; use [`SimulatedThreatFeed::from_entropy`]
/// in production wiring.
pub struct SimulatedThreatFeed {
    rng: Mutex<ChaCha20Rng>,
}

impl SimulatedThreatFeed {
    pub fn from_entropy() -> Self {
        Self { rng: Mutex::new(ChaCha20Rng::from_entropy()) }
    }

    /// Deterministic feed — the test double for everything behind
    /// [`ThreatSignal`].
    pub fn seeded(seed: u64) -> Self {
        Self { rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)) }
    }

    fn diurnal_term(now: DateTime<Utc>) -> f64 {
        let seconds_today =
            now.hour() as f64 * 3600.0 + now.minute() as f64 * 60.0 + now.second() as f64;
        0.15 * (TAU * seconds_today / 86_400.0).sin()
    }
}

impl ThreatSignal for SimulatedThreatFeed {
    fn global_threat_level(&self) -> f64 {
        let noise = {
            let mut rng = self.rng.lock().unwrap();
            rng.gen_range(-0.10..=0.10)
        };
        (BASE_THREAT_LEVEL + noise + Self::diurnal_term(Utc::now())).clamp(0.0, 1.0)
    }

    fn compliance_issue(&self) -> bool {
        self.rng.lock().unwrap().gen_bool(COMPLIANCE_ISSUE_PROBABILITY)
    }

    fn sample_threat(&self) -> Option<ThreatIntelligence> {
        let mut rng = self.rng.lock().unwrap();
        if !rng.gen_bool(DETECTION_PROBABILITY) {
            return None;
        }

        let template = &THREAT_TEMPLATES[rng.gen_range(0..THREAT_TEMPLATES.len())];
        let severity = (template.base_severity as i32 + rng.gen_range(-1..=1)).clamp(1, 5) as u8;
        let confidence = 0.5 + rng.gen::<f64>() * 0.5;
        let impact_days = rng.gen_range(30..365);
        let mut id_bytes = [0u8; 8];
        rng.fill(&mut id_bytes);
        let now = Utc::now();

        Some(ThreatIntelligence {
            id: format!("thr_{}", hex::encode(id_bytes)),
            category: template.category,
            severity,
            confidence,
            source: template.source.to_string(),
            title: template.title.to_string(),
            description: template.description.to_string(),
            affected_algorithms: template.affected.iter().map(|s| s.to_string()).collect(),
            predicted_impact: Some(now + Duration::days(impact_days)),
            mitigations: template.mitigations.iter().map(|s| s.to_string()).collect(),
            active: true,
            created_at: now,
        })
    }
}

/// Fixed-level signal for tests that need a pinned threat level.
pub struct FixedThreatSignal {
    pub level: f64,
    pub compliance: bool,
}

impl ThreatSignal for FixedThreatSignal {
    fn global_threat_level(&self) -> f64 {
        self.level
    }

    fn compliance_issue(&self) -> bool {
        self.compliance
    }

    fn sample_threat(&self) -> Option<ThreatIntelligence> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_level_stays_in_unit_interval() {
        let feed = SimulatedThreatFeed::seeded(7);
        for _ in 0..500 {
            let level = feed.global_threat_level();
            assert!((0.0..=1.0).contains(&level), "{level}");
        }
    }

    #[test]
    fn seeded_feeds_are_deterministic() {
        let a = SimulatedThreatFeed::seeded(42);
        let b = SimulatedThreatFeed::seeded(42);
        for _ in 0..50 {
            let ta = a.sample_threat();
            let tb = b.sample_threat();
            match (ta, tb) {
                (None, None) => {}
                (Some(x), Some(y)) => {
                    assert_eq!(x.title, y.title);
                    assert_eq!(x.severity, y.severity);
                }
                other => panic!("feeds diverged: {:?}", other.0.map(|t| t.title)),
            }
        }
    }

    #[test]
    fn detection_rate_is_roughly_a_third() {
        let feed = SimulatedThreatFeed::seeded(1);
        let hits = (0..1000).filter(|_| feed.sample_threat().is_some()).count();
        assert!((200..=400).contains(&hits), "hits={hits}");
    }

    #[test]
    fn sampled_threats_are_well_formed() {
        let feed = SimulatedThreatFeed::seeded(9);
        let threat = std::iter::repeat_with(|| feed.sample_threat())
            .flatten()
            .next()
            .unwrap();
        assert!((1..=5).contains(&threat.severity));
        assert!((0.5..=1.0).contains(&threat.confidence));
        assert!(threat.active);
        assert!(!threat.affected_algorithms.is_empty());
        assert!(threat.id.starts_with("thr_"));
    }

    #[test]
    fn affects_is_case_insensitive() {
        let feed = SimulatedThreatFeed::seeded(9);
        let threat = std::iter::repeat_with(|| feed.sample_threat())
            .flatten()
            .next()
            .unwrap();
        let name = threat.affected_algorithms[0].clone();
        assert!(threat.affects(&name.to_ascii_lowercase()));
        assert!(!threat.affects("definitely-not-an-algorithm"));
    }
}

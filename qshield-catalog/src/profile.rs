//! Algorithm profiles: the immutable reference data the rest of the system
//! scores, recommends, and rotates toward.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// What an algorithm is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    /// Public-key encryption / KEM.
    Asymmetric,
    /// Digital signatures.
    Signature,
    /// Symmetric ciphers.
    Symmetric,
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmKind::Asymmetric => write!(f, "asymmetric"),
            AlgorithmKind::Signature => write!(f, "signature"),
            AlgorithmKind::Symmetric => write!(f, "symmetric"),
        }
    }
}

/// Lifecycle stage of the algorithm's specification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Maturity {
    Experimental,
    Draft,
    Standardized,
    Deprecated,
}

impl fmt::Display for Maturity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Maturity::Experimental => write!(f, "experimental"),
            Maturity::Draft => write!(f, "draft"),
            Maturity::Standardized => write!(f, "standardized"),
            Maturity::Deprecated => write!(f, "deprecated"),
        }
    }
}

/// What a managed key is used for. Lives here because the per-purpose
/// quantum-successor preference tables are catalog knowledge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyPurpose {
    Encryption,
    Signing,
    KeyExchange,
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPurpose::Encryption => write!(f, "encryption"),
            KeyPurpose::Signing => write!(f, "signing"),
            KeyPurpose::KeyExchange => write!(f, "key-exchange"),
        }
    }
}

// ---------------------------------------------------------------------------
// Metric blocks
// ---------------------------------------------------------------------------

/// Measured performance characteristics.
///
/// Signature timings are only present for [`AlgorithmKind::Signature`]
/// algorithms; scorers skip the missing components.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PerformanceProfile {
    /// Bulk encryption throughput, MB/s.
    pub encryption_speed_mbps: f64,
    /// Bulk decryption throughput, MB/s.
    pub decryption_speed_mbps: f64,
    /// Key generation latency, milliseconds.
    pub keygen_ms: f64,
    /// Signing latency, milliseconds.
    pub signature_ms: Option<f64>,
    /// Verification latency, milliseconds.
    pub verification_ms: Option<f64>,
    /// Working-set memory, KB.
    pub memory_kb: f64,
    /// Relative CPU cost (1.0 = AES-256-GCM baseline).
    pub cpu_units: f64,
}

/// Security posture.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityProfile {
    /// Effective bits of security against a quantum adversary.
    pub quantum_security_bits: u32,
    /// Effective bits of security against a classical adversary.
    pub classical_security_bits: u32,
    /// Published weaknesses, one entry per known issue.
    pub known_vulnerabilities: Vec<String>,
    /// Date of the most recent cryptanalytic review.
    pub last_review: NaiveDate,
    /// Date until which use is recommended.
    pub recommended_until: NaiveDate,
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// One algorithm's complete reference record. Seeded at startup and never
/// mutated at runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlgorithmProfile {
    /// Stable lowercase identifier, e.g. `crystals-kyber`.
    pub id: String,
    /// Canonical display name, e.g. `CRYSTALS-Kyber`.
    pub name: String,
    pub kind: AlgorithmKind,
    pub quantum_resistant: bool,
    /// Supported key sizes, ascending.
    pub key_sizes: Vec<u32>,
    pub performance: PerformanceProfile,
    pub security: SecurityProfile,
    /// Compliance tags, e.g. `NIST-PQC`, `FIPS-203`.
    pub compliance: Vec<String>,
    pub maturity: Maturity,
}

impl AlgorithmProfile {
    /// Largest cataloged key size.
    pub fn max_key_size(&self) -> u32 {
        self.key_sizes.iter().copied().max().unwrap_or(0)
    }

    /// Whether `size` is one of the cataloged key sizes.
    pub fn supports_key_size(&self, size: u32) -> bool {
        self.key_sizes.contains(&size)
    }

    /// Case-insensitive match against the id or the display name.
    pub fn matches(&self, needle: &str) -> bool {
        self.id.eq_ignore_ascii_case(needle) || self.name.eq_ignore_ascii_case(needle)
    }

    /// Whether this algorithm can back a key with the given purpose.
    pub fn suits_purpose(&self, purpose: KeyPurpose) -> bool {
        match purpose {
            KeyPurpose::Signing => self.kind == AlgorithmKind::Signature,
            KeyPurpose::Encryption => {
                matches!(self.kind, AlgorithmKind::Asymmetric | AlgorithmKind::Symmetric)
            }
            KeyPurpose::KeyExchange => self.kind == AlgorithmKind::Asymmetric,
        }
    }
}

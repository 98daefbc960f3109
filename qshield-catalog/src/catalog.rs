//! The seeded algorithm catalog and the per-purpose quantum-successor
//! preference tables.

use crate::profile::{
    AlgorithmKind, AlgorithmProfile, KeyPurpose, Maturity, PerformanceProfile, SecurityProfile,
};
use chrono::NaiveDate;

/// Successor preference by purpose. First cataloged match wins.
const SIGNING_PREFERENCE: &[&str] = &["CRYSTALS-Dilithium", "FALCON", "SPHINCS+"];
const ENCRYPTION_PREFERENCE: &[&str] = &["CRYSTALS-Kyber", "AES-256-GCM", "ChaCha20-Poly1305"];
const KEY_EXCHANGE_PREFERENCE: &[&str] = &["CRYSTALS-Kyber"];

/// Ordered, immutable table of algorithm profiles.
///
/// The builtin catalog is seeded once at startup; recommendation ties are
/// broken by this ordering, so it is part of the observable behavior.
pub struct AlgorithmCatalog {
    profiles: Vec<AlgorithmProfile>,
}

impl AlgorithmCatalog {
    /// Build a catalog from explicit profiles (tests, future dynamic loading).
    pub fn new(profiles: Vec<AlgorithmProfile>) -> Self {
        Self { profiles }
    }

    /// The builtin reference catalog.
    pub fn builtin() -> Self {
        Self::new(builtin_profiles())
    }

    /// Look up a profile by id or display name, case-insensitively.
    pub fn get(&self, id_or_name: &str) -> Option<&AlgorithmProfile> {
        self.profiles.iter().find(|p| p.matches(id_or_name))
    }

    /// All profiles in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &AlgorithmProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// The preferred quantum-resistant successor for a purpose, if any is
    /// cataloged. Walks the purpose's preference table in order.
    pub fn preferred_quantum(&self, purpose: KeyPurpose) -> Option<&AlgorithmProfile> {
        let preference = match purpose {
            KeyPurpose::Signing => SIGNING_PREFERENCE,
            KeyPurpose::Encryption => ENCRYPTION_PREFERENCE,
            KeyPurpose::KeyExchange => KEY_EXCHANGE_PREFERENCE,
        };
        preference
            .iter()
            .filter_map(|name| self.get(name))
            .find(|p| p.quantum_resistant && p.suits_purpose(purpose))
    }

    /// All quantum-resistant profiles usable for a purpose, in preference
    /// order followed by catalog order.
    pub fn quantum_candidates(&self, purpose: KeyPurpose) -> Vec<&AlgorithmProfile> {
        let mut out: Vec<&AlgorithmProfile> = Vec::new();
        if let Some(first) = self.preferred_quantum(purpose) {
            out.push(first);
        }
        for p in &self.profiles {
            if p.quantum_resistant && p.suits_purpose(purpose) && !out.iter().any(|q| q.id == p.id)
            {
                out.push(p);
            }
        }
        out
    }
}

impl Default for AlgorithmCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Seed data
// ---------------------------------------------------------------------------

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid calendar date in seed table")
}

fn builtin_profiles() -> Vec<AlgorithmProfile> {
    vec![
        AlgorithmProfile {
            id: "rsa-2048".into(),
            name: "RSA-2048".into(),
            kind: AlgorithmKind::Signature,
            quantum_resistant: false,
            key_sizes: vec![2048],
            performance: PerformanceProfile {
                encryption_speed_mbps: 180.0,
                decryption_speed_mbps: 12.0,
                keygen_ms: 450.0,
                signature_ms: Some(4.2),
                verification_ms: Some(0.15),
                memory_kb: 16.0,
                cpu_units: 3.5,
            },
            security: SecurityProfile {
                quantum_security_bits: 0,
                classical_security_bits: 112,
                known_vulnerabilities: vec!["Shor's algorithm breaks the RSA problem".into()],
                last_review: date(2024, 3, 18),
                recommended_until: date(2030, 12, 31),
            },
            compliance: vec!["FIPS-186".into(), "PKCS#1".into()],
            maturity: Maturity::Standardized,
        },
        AlgorithmProfile {
            id: "rsa-4096".into(),
            name: "RSA-4096".into(),
            kind: AlgorithmKind::Signature,
            quantum_resistant: false,
            key_sizes: vec![4096],
            performance: PerformanceProfile {
                encryption_speed_mbps: 95.0,
                decryption_speed_mbps: 2.1,
                keygen_ms: 3200.0,
                signature_ms: Some(28.0),
                verification_ms: Some(0.45),
                memory_kb: 32.0,
                cpu_units: 6.0,
            },
            security: SecurityProfile {
                quantum_security_bits: 0,
                classical_security_bits: 140,
                known_vulnerabilities: vec!["Shor's algorithm breaks the RSA problem".into()],
                last_review: date(2024, 3, 18),
                recommended_until: date(2032, 12, 31),
            },
            compliance: vec!["FIPS-186".into(), "PKCS#1".into()],
            maturity: Maturity::Standardized,
        },
        AlgorithmProfile {
            id: "ecdsa-p256".into(),
            name: "ECDSA-P256".into(),
            kind: AlgorithmKind::Signature,
            quantum_resistant: false,
            key_sizes: vec![256],
            performance: PerformanceProfile {
                encryption_speed_mbps: 0.0,
                decryption_speed_mbps: 0.0,
                keygen_ms: 0.8,
                signature_ms: Some(0.6),
                verification_ms: Some(1.9),
                memory_kb: 4.0,
                cpu_units: 1.2,
            },
            security: SecurityProfile {
                quantum_security_bits: 0,
                classical_security_bits: 128,
                known_vulnerabilities: vec![
                    "Shor's algorithm solves the elliptic-curve discrete log".into(),
                    "Nonce-reuse leaks the private key".into(),
                ],
                last_review: date(2023, 11, 2),
                recommended_until: date(2030, 12, 31),
            },
            compliance: vec!["FIPS-186".into()],
            maturity: Maturity::Standardized,
        },
        AlgorithmProfile {
            id: "x25519".into(),
            name: "X25519".into(),
            kind: AlgorithmKind::Asymmetric,
            quantum_resistant: false,
            key_sizes: vec![256],
            performance: PerformanceProfile {
                encryption_speed_mbps: 0.0,
                decryption_speed_mbps: 0.0,
                keygen_ms: 0.05,
                signature_ms: None,
                verification_ms: None,
                memory_kb: 2.0,
                cpu_units: 1.0,
            },
            security: SecurityProfile {
                quantum_security_bits: 0,
                classical_security_bits: 128,
                known_vulnerabilities: vec![
                    "Shor's algorithm solves the elliptic-curve discrete log".into(),
                ],
                last_review: date(2024, 6, 30),
                recommended_until: date(2030, 12, 31),
            },
            compliance: vec!["RFC-7748".into()],
            maturity: Maturity::Standardized,
        },
        AlgorithmProfile {
            id: "aes-256-gcm".into(),
            name: "AES-256-GCM".into(),
            kind: AlgorithmKind::Symmetric,
            quantum_resistant: true,
            key_sizes: vec![256],
            performance: PerformanceProfile {
                encryption_speed_mbps: 3800.0,
                decryption_speed_mbps: 3800.0,
                keygen_ms: 0.01,
                signature_ms: None,
                verification_ms: None,
                memory_kb: 1.0,
                cpu_units: 1.0,
            },
            security: SecurityProfile {
                quantum_security_bits: 128,
                classical_security_bits: 256,
                known_vulnerabilities: vec![],
                last_review: date(2025, 1, 15),
                recommended_until: date(2040, 12, 31),
            },
            compliance: vec!["FIPS-197".into(), "NIST-SP-800-38D".into()],
            maturity: Maturity::Standardized,
        },
        AlgorithmProfile {
            id: "chacha20-poly1305".into(),
            name: "ChaCha20-Poly1305".into(),
            kind: AlgorithmKind::Symmetric,
            quantum_resistant: true,
            key_sizes: vec![256],
            performance: PerformanceProfile {
                encryption_speed_mbps: 2900.0,
                decryption_speed_mbps: 2900.0,
                keygen_ms: 0.01,
                signature_ms: None,
                verification_ms: None,
                memory_kb: 1.0,
                cpu_units: 1.1,
            },
            security: SecurityProfile {
                quantum_security_bits: 128,
                classical_security_bits: 256,
                known_vulnerabilities: vec![],
                last_review: date(2024, 9, 10),
                recommended_until: date(2040, 12, 31),
            },
            compliance: vec!["RFC-8439".into()],
            maturity: Maturity::Standardized,
        },
        AlgorithmProfile {
            id: "crystals-kyber".into(),
            name: "CRYSTALS-Kyber".into(),
            kind: AlgorithmKind::Asymmetric,
            quantum_resistant: true,
            key_sizes: vec![512, 768, 1024],
            performance: PerformanceProfile {
                encryption_speed_mbps: 950.0,
                decryption_speed_mbps: 1100.0,
                keygen_ms: 0.04,
                signature_ms: None,
                verification_ms: None,
                memory_kb: 6.0,
                cpu_units: 1.4,
            },
            security: SecurityProfile {
                quantum_security_bits: 192,
                classical_security_bits: 256,
                known_vulnerabilities: vec![],
                last_review: date(2025, 2, 20),
                recommended_until: date(2045, 12, 31),
            },
            compliance: vec!["NIST-PQC".into(), "FIPS-203".into()],
            maturity: Maturity::Standardized,
        },
        AlgorithmProfile {
            id: "crystals-dilithium".into(),
            name: "CRYSTALS-Dilithium".into(),
            kind: AlgorithmKind::Signature,
            quantum_resistant: true,
            key_sizes: vec![1312, 1952, 2592],
            performance: PerformanceProfile {
                encryption_speed_mbps: 0.0,
                decryption_speed_mbps: 0.0,
                keygen_ms: 0.08,
                signature_ms: Some(0.25),
                verification_ms: Some(0.09),
                memory_kb: 12.0,
                cpu_units: 1.6,
            },
            security: SecurityProfile {
                quantum_security_bits: 192,
                classical_security_bits: 256,
                known_vulnerabilities: vec![],
                last_review: date(2025, 2, 20),
                recommended_until: date(2045, 12, 31),
            },
            compliance: vec!["NIST-PQC".into(), "FIPS-204".into()],
            maturity: Maturity::Standardized,
        },
        AlgorithmProfile {
            id: "falcon".into(),
            name: "FALCON".into(),
            kind: AlgorithmKind::Signature,
            quantum_resistant: true,
            key_sizes: vec![512, 1024],
            performance: PerformanceProfile {
                encryption_speed_mbps: 0.0,
                decryption_speed_mbps: 0.0,
                keygen_ms: 8.5,
                signature_ms: Some(0.35),
                verification_ms: Some(0.05),
                memory_kb: 20.0,
                cpu_units: 2.2,
            },
            security: SecurityProfile {
                quantum_security_bits: 128,
                classical_security_bits: 256,
                known_vulnerabilities: vec![
                    "Floating-point sampling is hard to implement constant-time".into(),
                ],
                last_review: date(2024, 10, 5),
                recommended_until: date(2045, 12, 31),
            },
            compliance: vec!["NIST-PQC".into()],
            maturity: Maturity::Draft,
        },
        AlgorithmProfile {
            id: "sphincs-plus".into(),
            name: "SPHINCS+".into(),
            kind: AlgorithmKind::Signature,
            quantum_resistant: true,
            key_sizes: vec![128, 192, 256],
            performance: PerformanceProfile {
                encryption_speed_mbps: 0.0,
                decryption_speed_mbps: 0.0,
                keygen_ms: 2.1,
                signature_ms: Some(14.0),
                verification_ms: Some(0.9),
                memory_kb: 8.0,
                cpu_units: 4.0,
            },
            security: SecurityProfile {
                quantum_security_bits: 128,
                classical_security_bits: 256,
                known_vulnerabilities: vec![],
                last_review: date(2025, 2, 20),
                recommended_until: date(2050, 12, 31),
            },
            compliance: vec!["NIST-PQC".into(), "FIPS-205".into()],
            maturity: Maturity::Standardized,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_nonempty_and_unique() {
        let cat = AlgorithmCatalog::builtin();
        assert!(cat.len() >= 8);
        for p in cat.iter() {
            let matches = cat.iter().filter(|q| q.id == p.id).count();
            assert_eq!(matches, 1, "duplicate id {}", p.id);
        }
    }

    #[test]
    fn lookup_is_case_insensitive_by_id_and_name() {
        let cat = AlgorithmCatalog::builtin();
        assert!(cat.get("crystals-kyber").is_some());
        assert!(cat.get("CRYSTALS-Kyber").is_some());
        assert!(cat.get("rsa-2048").is_some());
        assert!(cat.get("RSA-2048").is_some());
        assert!(cat.get("nonesuch").is_none());
    }

    #[test]
    fn signing_preference_order() {
        let cat = AlgorithmCatalog::builtin();
        let first = cat.preferred_quantum(KeyPurpose::Signing).unwrap();
        assert_eq!(first.name, "CRYSTALS-Dilithium");
        let candidates = cat.quantum_candidates(KeyPurpose::Signing);
        assert!(candidates.iter().all(|p| p.quantum_resistant));
        assert!(candidates.len() >= 3);
    }

    #[test]
    fn key_exchange_prefers_kyber() {
        let cat = AlgorithmCatalog::builtin();
        let first = cat.preferred_quantum(KeyPurpose::KeyExchange).unwrap();
        assert_eq!(first.name, "CRYSTALS-Kyber");
    }

    #[test]
    fn classical_signature_algorithms_are_not_quantum_candidates() {
        let cat = AlgorithmCatalog::builtin();
        let candidates = cat.quantum_candidates(KeyPurpose::Signing);
        assert!(!candidates.iter().any(|p| p.name.starts_with("RSA")));
        assert!(!candidates.iter().any(|p| p.name.starts_with("ECDSA")));
    }
}

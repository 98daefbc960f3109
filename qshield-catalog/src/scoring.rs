//! Scoring engines: pure functions from (profile, requirements) to [0, 1].
//!
//! Five factors — performance, security, compliance, compatibility, migration
//! ease — compose into a weighted overall score. Weights shift with the
//! caller's requirements and are renormalized to sum to 1 so overall scores
//! stay comparable across requirement sets.

use crate::catalog::AlgorithmCatalog;
use crate::profile::{AlgorithmKind, AlgorithmProfile, Maturity};
use crate::requirements::{PerformancePriority, Requirements};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

// Reference constants the discrete metrics normalize against.
const REF_THROUGHPUT_MBPS: f64 = 1000.0;
const REF_KEYGEN_MS: f64 = 10.0;
const REF_SIGN_MS: f64 = 1.0;
const REF_VERIFY_MS: f64 = 0.5;
const REF_MEMORY_KB: f64 = 8.0;
const REF_CPU_UNITS: f64 = 1.0;

/// Review staleness horizon: reviews older than this draw a penalty.
const REVIEW_STALE_DAYS: i64 = 2 * 365;

// ---------------------------------------------------------------------------
// Individual scorers
// ---------------------------------------------------------------------------

fn throughput_component(value_mbps: f64) -> f64 {
    (value_mbps / REF_THROUGHPUT_MBPS).clamp(0.0, 1.0)
}

fn latency_component(value_ms: f64, reference_ms: f64) -> f64 {
    (reference_ms / value_ms.max(f64::EPSILON)).clamp(0.0, 1.0)
}

/// Performance: average of the applicable normalized metrics, adjusted for
/// the caller's priority. Signature timings only count for signature
/// algorithms; zero throughput means the metric does not apply.
pub fn performance_score(profile: &AlgorithmProfile, req: &Requirements) -> f64 {
    let perf = &profile.performance;
    let mut components = Vec::with_capacity(7);

    if perf.encryption_speed_mbps > 0.0 {
        components.push(throughput_component(perf.encryption_speed_mbps));
    }
    if perf.decryption_speed_mbps > 0.0 {
        components.push(throughput_component(perf.decryption_speed_mbps));
    }
    components.push(latency_component(perf.keygen_ms, REF_KEYGEN_MS));
    components.push(latency_component(perf.memory_kb, REF_MEMORY_KB));
    components.push(latency_component(perf.cpu_units, REF_CPU_UNITS));

    if profile.kind == AlgorithmKind::Signature {
        if let Some(ms) = perf.signature_ms {
            components.push(latency_component(ms, REF_SIGN_MS));
        }
        if let Some(ms) = perf.verification_ms {
            components.push(latency_component(ms, REF_VERIFY_MS));
        }
    }

    let base = components.iter().sum::<f64>() / components.len() as f64;
    let adjusted = match req.performance_priority {
        PerformancePriority::High => base * 1.2,
        PerformancePriority::Normal => base,
        PerformancePriority::Low => base + 0.3,
    };
    adjusted.clamp(0.0, 1.0)
}

/// Security: quantum resistance dominates, with tiered bit-strength bonuses,
/// per-vulnerability penalties, a maturity table, and a staleness penalty.
/// Monotonically non-decreasing in quantum security bits.
pub fn security_score(profile: &AlgorithmProfile, req: &Requirements) -> f64 {
    let sec = &profile.security;
    let mut score = 0.0;

    if profile.quantum_resistant {
        score += 0.6;
    }
    if sec.quantum_security_bits >= 192 {
        score += 0.2;
    } else if sec.quantum_security_bits >= 128 {
        score += 0.1;
    }
    score += (sec.classical_security_bits.min(256) as f64 / 256.0) * 0.1;
    score -= 0.1 * sec.known_vulnerabilities.len() as f64;
    score += match profile.maturity {
        Maturity::Standardized => 0.1,
        Maturity::Draft => 0.0,
        Maturity::Experimental => -0.1,
        Maturity::Deprecated => -0.3,
    };

    let stale_cutoff = Utc::now().date_naive() - chrono::Duration::days(REVIEW_STALE_DAYS);
    if sec.last_review < stale_cutoff {
        score -= 0.1;
    }

    // An explicit quantum-resistance requirement rewards a match; it can only
    // add, so the score never drops when resistance is both asked for and
    // present.
    if req.quantum_resistance && profile.quantum_resistant {
        score += 0.05;
    }

    score.clamp(0.0, 1.0)
}

/// Compliance: fraction of requested standards the profile carries.
/// 1.0 when nothing is requested.
pub fn compliance_score(profile: &AlgorithmProfile, req: &Requirements) -> f64 {
    if req.compliance_standards.is_empty() {
        return 1.0;
    }
    let present = req
        .compliance_standards
        .iter()
        .filter(|wanted| {
            profile
                .compliance
                .iter()
                .any(|tag| tag.eq_ignore_ascii_case(wanted))
        })
        .count();
    present as f64 / req.compliance_standards.len() as f64
}

/// Compatibility: keyword heuristics over the environment descriptors plus
/// maturity and key-size adjustments.
pub fn compatibility_score(profile: &AlgorithmProfile, req: &Requirements) -> f64 {
    let mut score: f64 = 0.7;

    if req.environment_mentions("legacy") {
        if profile.quantum_resistant {
            score -= 0.1;
        } else {
            score += 0.2;
        }
    }
    if req.environment_mentions("nist") || req.environment_mentions("fips") {
        let tagged = profile.compliance.iter().any(|tag| {
            let t = tag.to_ascii_lowercase();
            t.contains("nist") || t.contains("fips")
        });
        if tagged {
            score += 0.2;
        } else {
            score -= 0.1;
        }
    }
    if req.environment_mentions("embedded") && profile.performance.memory_kb > 2.0 * REF_MEMORY_KB
    {
        score -= 0.2;
    }

    score += match profile.maturity {
        Maturity::Standardized => 0.1,
        Maturity::Draft => 0.0,
        Maturity::Experimental => -0.2,
        Maturity::Deprecated => -0.3,
    };
    if let Some(min) = req.min_key_size {
        if profile.max_key_size() < min {
            score -= 0.3;
        }
    }

    score.clamp(0.0, 1.0)
}

/// Migration ease (higher = easier), so all five factors point the same way.
pub fn migration_ease_score(profile: &AlgorithmProfile, req: &Requirements) -> f64 {
    let mut score: f64 = 0.8;

    if profile.max_key_size() > 2048 {
        score -= 0.1;
    }
    if profile.max_key_size() > 4000 {
        score -= 0.1;
    }
    score += match profile.maturity {
        Maturity::Standardized => 0.0,
        Maturity::Draft => -0.1,
        Maturity::Experimental => -0.2,
        Maturity::Deprecated => -0.4,
    };
    // Larger post-quantum artifacts travel badly through legacy plumbing.
    if req.environment_mentions("legacy") && profile.quantum_resistant {
        score -= 0.1;
    }
    if profile.kind == AlgorithmKind::Symmetric {
        score += 0.1;
    }

    score.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// Factor weights for the overall score. Always normalized before use.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub performance: f64,
    pub security: f64,
    pub compliance: f64,
    pub compatibility: f64,
    pub migration: f64,
}

impl ScoreWeights {
    pub const DEFAULT: Self = Self {
        performance: 0.25,
        security: 0.35,
        compliance: 0.2,
        compatibility: 0.1,
        migration: 0.1,
    };

    /// Weights shifted toward what the caller asked for, renormalized to 1.
    pub fn for_requirements(req: &Requirements) -> Self {
        let mut w = Self::DEFAULT;
        if req.quantum_resistance {
            w.security += 0.15;
        }
        if req.performance_priority == PerformancePriority::High {
            w.performance += 0.10;
        }
        if !req.compliance_standards.is_empty() {
            w.compliance += 0.10;
        }
        w.normalized()
    }

    pub fn sum(&self) -> f64 {
        self.performance + self.security + self.compliance + self.compatibility + self.migration
    }

    fn normalized(self) -> Self {
        let total = self.sum();
        Self {
            performance: self.performance / total,
            security: self.security / total,
            compliance: self.compliance / total,
            compatibility: self.compatibility / total,
            migration: self.migration / total,
        }
    }
}

// ---------------------------------------------------------------------------
// Scorecards
// ---------------------------------------------------------------------------

/// One algorithm's full evaluation against a requirement set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scorecard {
    pub algorithm_id: String,
    pub algorithm_name: String,
    pub quantum_resistant: bool,
    pub performance: f64,
    pub security: f64,
    pub compliance: f64,
    pub compatibility: f64,
    pub migration: f64,
    pub overall: f64,
}

/// Score a single profile.
pub fn score(profile: &AlgorithmProfile, req: &Requirements) -> Scorecard {
    let weights = ScoreWeights::for_requirements(req);
    let performance = performance_score(profile, req);
    let security = security_score(profile, req);
    let compliance = compliance_score(profile, req);
    let compatibility = compatibility_score(profile, req);
    let migration = migration_ease_score(profile, req);
    let overall = performance * weights.performance
        + security * weights.security
        + compliance * weights.compliance
        + compatibility * weights.compatibility
        + migration * weights.migration;

    Scorecard {
        algorithm_id: profile.id.clone(),
        algorithm_name: profile.name.clone(),
        quantum_resistant: profile.quantum_resistant,
        performance,
        security,
        compliance,
        compatibility,
        migration,
        overall,
    }
}

/// Score the whole catalog, descending by overall score. The sort is stable,
/// so ties keep catalog order.
pub fn recommend(catalog: &AlgorithmCatalog, req: &Requirements) -> Vec<Scorecard> {
    let mut cards: Vec<Scorecard> = catalog.iter().map(|p| score(p, req)).collect();
    cards.sort_by(|a, b| b.overall.partial_cmp(&a.overall).unwrap_or(std::cmp::Ordering::Equal));
    cards
}

/// Unknown algorithm id passed to [`compare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAlgorithm(pub String);

impl fmt::Display for UnknownAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown algorithm: {}", self.0)
    }
}

impl std::error::Error for UnknownAlgorithm {}

/// Scorecards for the named profiles, in request order. Arity validation
/// (at least two ids) belongs to the HTTP layer.
pub fn compare(
    catalog: &AlgorithmCatalog,
    ids: &[String],
    req: &Requirements,
) -> Result<Vec<Scorecard>, UnknownAlgorithm> {
    ids.iter()
        .map(|id| {
            catalog
                .get(id)
                .map(|p| score(p, req))
                .ok_or_else(|| UnknownAlgorithm(id.clone()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

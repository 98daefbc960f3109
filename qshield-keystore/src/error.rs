//! Error types for the keystore.

use crate::types::KeyId;
use std::fmt;

// ---------------------------------------------------------------------------
// Top-level keystore error
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum KeystoreError {
    KeyNotFound(KeyId),
    UnknownAlgorithm(String),
    UnsupportedKeySize { algorithm: String, size: u32 },
    AlgorithmPurposeMismatch { algorithm: String, purpose: String },
    AlreadySuperseded(KeyId),
    StorageError(String),
    ConfigNotFound(String),
    ThreatNotFound(String),
    HistoryNotFound(String),
}

impl fmt::Display for KeystoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound(id) => write!(f, "key not found: {}", id),
            Self::UnknownAlgorithm(name) => write!(f, "unknown algorithm: {}", name),
            Self::UnsupportedKeySize { algorithm, size } => {
                write!(f, "{} does not support key size {}", algorithm, size)
            }
            Self::AlgorithmPurposeMismatch { algorithm, purpose } => {
                write!(f, "{} cannot back a {} key", algorithm, purpose)
            }
            Self::AlreadySuperseded(id) => write!(f, "key already superseded: {}", id),
            Self::StorageError(msg) => write!(f, "storage error: {}", msg),
            Self::ConfigNotFound(user) => write!(f, "no system configuration for: {}", user),
            Self::ThreatNotFound(id) => write!(f, "threat not found: {}", id),
            Self::HistoryNotFound(id) => write!(f, "rotation record not found: {}", id),
        }
    }
}

impl std::error::Error for KeystoreError {}

// ---------------------------------------------------------------------------
// Specific operation errors (type-safe)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CreateError(pub KeystoreError);
impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}
impl std::error::Error for CreateError {}
impl From<KeystoreError> for CreateError {
    fn from(e: KeystoreError) -> Self { Self(e) }
}

#[derive(Debug)]
pub struct RotateError(pub KeystoreError);
impl fmt::Display for RotateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}
impl std::error::Error for RotateError {}
impl From<KeystoreError> for RotateError {
    fn from(e: KeystoreError) -> Self { Self(e) }
}

impl RotateError {
    /// Whether this rotation failed because another caller got there first.
    pub fn is_already_superseded(&self) -> bool {
        matches!(self.0, KeystoreError::AlreadySuperseded(_))
    }
}

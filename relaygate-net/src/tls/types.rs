use std::path::PathBuf;

use chrono::{DateTime, Utc};

#[derive(Debug)]
pub struct CaMaterial {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
    pub cert_der: Vec<u8>,
    pub key_der: Vec<u8>,
}

#[derive(Debug)]
pub struct CaMaterialPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

pub struct CaCertificate {
    pub material: CaMaterial,
    pub cert: rcgen::Certificate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCertificate {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
    pub not_after: DateTime<Utc>,
}

impl LeafCertificate {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.not_after
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct TlsError {
    pub kind: TlsErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsErrorKind {
    Rcgen,
    Io,
    OpenSsl,
    Issuer,
}

impl TlsError {
    pub fn new(kind: TlsErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<openssl::error::ErrorStack> for TlsError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        TlsError::new(TlsErrorKind::OpenSsl, err.to_string())
    }
}

impl From<rcgen::Error> for TlsError {
    fn from(err: rcgen::Error) -> Self {
        TlsError::new(TlsErrorKind::Rcgen, err.to_string())
    }
}

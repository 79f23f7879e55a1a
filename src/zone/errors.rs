use thiserror::Error;

/// Failures while turning one zone-document record into a stored record
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ZoneError {
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),
    #[error("Invalid resource record type: {0}")]
    InvalidRRType(String),
    #[error("Invalid record class: {0}")]
    InvalidClass(String),
    #[error("Invalid record data for {rtype}: {message}")]
    InvalidRData { rtype: String, message: String },
}

impl ZoneError {
    pub fn rdata(rtype: impl ToString, message: impl Into<String>) -> Self {
        ZoneError::InvalidRData {
            rtype: rtype.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ZoneError>;

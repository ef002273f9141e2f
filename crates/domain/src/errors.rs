use thiserror::Error;

/// Error kinds shared across the workspace.
///
/// Variants correspond to the failure kinds in the core's error-handling
/// design: each crossing from an infrastructure error type (`sqlx::Error`,
/// `std::io::Error`, a prober's own error) into application/engine code
/// is mapped into one of these.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid node address: {0}")]
    InvalidAddress(String),

    #[error("configuration invalid: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("dns resolution failed: {0}")]
    Dns(String),

    #[error("geolocation lookup failed: {0}")]
    Geo(String),

    #[error("whois lookup failed: {0}")]
    Whois(String),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operator error: {0}")]
    Control(String),
}

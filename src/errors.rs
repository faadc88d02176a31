use miette::Diagnostic;
use thiserror::Error;

use crate::authz::errors::AuthzError;

#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(claimgate::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(claimgate::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(claimgate::serde))]
    Serde(#[from] serde_json::Error),

    #[error("JOSE error: {0}")]
    #[diagnostic(code(claimgate::jose))]
    Jose(String),

    #[error("Session configuration error: {0}")]
    #[diagnostic(
        code(claimgate::session),
        help("Set CLAIMGATE__AUTHZ__SESSION__SECRET to at least 32 bytes shared with the session issuer")
    )]
    Session(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Authz(#[from] AuthzError),
}

impl From<josekit::JoseError> for ServiceError {
    fn from(value: josekit::JoseError) -> Self {
        ServiceError::Jose(value.to_string())
    }
}

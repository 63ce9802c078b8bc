use crate::server::LifecycleState;
use smf_api::ConfigError;
use smf_core::CoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SbiError>;

#[derive(Error, Debug)]
pub enum SbiError {
    #[error("Unsupported SBI scheme: {0}")]
    UnsupportedScheme(String),

    #[error("The https scheme requires TLS certificate and key paths")]
    MissingTlsMaterial,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Access token key error: {0}")]
    AccessTokenKey(String),

    #[error("Invalid configuration: {0}")]
    Config(ConfigError),

    #[error("NF registration failed: {0}")]
    Registration(#[source] CoreError),

    #[error("Operation not allowed in state {0:?}")]
    InvalidState(LifecycleState),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for SbiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnsupportedScheme(scheme) => SbiError::UnsupportedScheme(scheme),
            other => SbiError::Config(other),
        }
    }
}

use thiserror::Error;

/// Variable de entorno presente pero inválida.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid { var: String, value: String, reason: String },
}

impl ConfigError {
    pub fn invalid(var: &str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid { var: var.to_string(),
                               value: value.to_string(),
                               reason: reason.into() }
    }
}

use thiserror::Error;

use crate::config::ConfigError;

/// Failures the engine cannot absorb and must hand to the host.
///
/// Missing records, bad prompt input and out-of-range indexes are not errors;
/// they are no-ops or terminal states reported through events.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage failure on `{key}`: {source}")]
    Storage {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("could not encode `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub(crate) fn storage<E>(key: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            key: key.to_string(),
            source: Box::new(source),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

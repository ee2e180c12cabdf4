use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid run configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("run task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

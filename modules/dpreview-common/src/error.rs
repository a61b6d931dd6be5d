use thiserror::Error;

#[derive(Error, Debug)]
pub enum DpreviewError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Progress store error: {0}")]
    Progress(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DpreviewError>;

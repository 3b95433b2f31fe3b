use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("Not found: {entity} {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("Missing credential for connector {0}")]
  MissingCredential(String),

  #[error("Validation: {0}")]
  Validation(String),

  #[error("Coordination: {0}")]
  Coordination(String),

  #[error("Embedding: {0}")]
  Embedding(String),

  #[error("Index: {0}")]
  Index(String),

  #[error("Ledger: {0}")]
  Ledger(String),

  #[error("Dispatch: {0}")]
  Dispatch(String),

  #[error("Task aborted")]
  Aborted,

  #[error("Serialization: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("IO: {0}")]
  Io(#[from] std::io::Error),
}

impl Error {
  /// Errors that no amount of retrying will fix (bad config, absent
  /// credentials). The dispatch layer records these without requeueing.
  pub fn is_permanent(&self) -> bool {
    matches!(
      self,
      Error::MissingCredential(_) | Error::Validation(_) | Error::NotFound { .. }
    )
  }
}

pub type Result<T> = std::result::Result<T, Error>;

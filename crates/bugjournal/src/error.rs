use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JournalError {
  #[error("{message}")]
  Validation { message: String },

  #[error("User not logged in")]
  NotAuthenticated,

  #[error("Backend request failed: {message}")]
  Backend { message: String },

  #[error("Suggestion generation failed: {message}")]
  SuggestionGeneration { message: String },
}

impl JournalError {
  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation { message: message.into() }
  }

  pub fn backend(message: impl Into<String>) -> Self {
    Self::Backend { message: message.into() }
  }

  pub fn suggestion_generation(message: impl Into<String>) -> Self {
    Self::SuggestionGeneration { message: message.into() }
  }

  /// Flatten a collaborator failure, keeping the whole context chain
  pub fn from_backend(error: anyhow::Error) -> Self {
    Self::backend(format!("{error:#}"))
  }

  pub fn is_validation(&self) -> bool {
    matches!(self, Self::Validation { .. })
  }

  pub fn is_backend(&self) -> bool {
    matches!(self, Self::Backend { .. })
  }
}

pub type JournalResult<T> = std::result::Result<T, JournalError>;

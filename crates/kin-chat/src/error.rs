use thiserror::Error;

/// Failure kinds of the chat core. Validation and authorization failures are
/// returned before any mutation is attempted.
#[derive(Debug, Error)]
pub enum ChatError {
    /// No credential, or one that failed verification
    #[error("Authentication required")]
    Unauthenticated,

    /// Authenticated, but not allowed to touch this resource
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    /// Persistence or infrastructure failure; details are logged, not shown
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    pub fn not_member() -> Self {
        Self::Forbidden("Not a member of this chat".into())
    }

    pub fn chat_not_found() -> Self {
        Self::NotFound("Chat not found".into())
    }

    pub fn user_not_found() -> Self {
        Self::NotFound("User not found".into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

use http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid API key")]
    InvalidApiKey,
    #[error("Missing token")]
    MissingToken,
    #[error("Authentication failed")]
    InvalidToken,
    #[error("Account suspended")]
    Banned,
    #[error("Internal server error")]
    Internal,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidApiKey | Self::MissingToken | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::Banned => StatusCode::FORBIDDEN,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `error` field of the JSON body.
    pub fn title(&self) -> &'static str {
        match self {
            Self::InvalidApiKey | Self::MissingToken | Self::InvalidToken => "Unauthorized",
            Self::Banned => "Forbidden",
            Self::Internal => "Internal Server Error",
        }
    }
}

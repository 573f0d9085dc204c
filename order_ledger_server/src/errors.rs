use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use order_ledger_engine::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ServerError {
    /// The stable error code returned to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.code(),
            Self::InvalidRequestBody(_) | Self::InvalidRequestPath(_) => "BAD_REQUEST",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Ledger(e) => match e {
                LedgerError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                LedgerError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::Conflict(_) => StatusCode::CONFLICT,
                LedgerError::GatewayError(_) => StatusCode::BAD_GATEWAY,
                LedgerError::CheckoutFailed(_) => StatusCode::BAD_REQUEST,
                LedgerError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "code": self.code(), "error": self.to_string() }).to_string())
    }
}

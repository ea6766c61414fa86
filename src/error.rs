use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

/// Failure reported by a hardware backend.
#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("line {0} not found")]
    NotFound(u32),
    #[error("{0}")]
    Io(String),
}

/// Failure of a pin registry operation.
#[derive(Debug, Error)]
pub enum GpioError {
    #[error("Pin {0} is already configured")]
    AlreadyConfigured(u32),
    #[error("Invalid direction: {0}")]
    InvalidDirection(String),
    #[error("Pin {0} is not configured")]
    NotConfigured(u32),
    #[error("Pin {0} is not configured as output")]
    WrongDirection(u32),
    #[error("Pin {pin} unavailable: {reason}")]
    HardwareUnavailable { pin: u32, reason: String },
    #[error("Pin {pin} hardware fault: {reason}")]
    HardwareFault { pin: u32, reason: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Gpio(#[from] GpioError),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Gpio(e) => match e {
                GpioError::AlreadyConfigured(_) => StatusCode::CONFLICT,
                GpioError::InvalidDirection(_) | GpioError::WrongDirection(_) => {
                    StatusCode::BAD_REQUEST
                }
                GpioError::NotConfigured(_) => StatusCode::NOT_FOUND,
                GpioError::HardwareUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                GpioError::HardwareFault { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::InvalidValue(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse failure classes, used by the HTTP layer to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Conflict,
    DependencyFailure,
    Unauthorized,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("user {0} not found")]
    UserNotFound(i64),
    #[error("drawing {0} not found")]
    DrawingNotFound(i64),
    #[error("route {0} not found")]
    RouteNotFound(i64),
    #[error("health profile of user {0} not found")]
    HealthProfileNotFound(i64),
    #[error("invalid drawing mode: {0}")]
    InvalidMode(String),
    #[error("a route id is required to start a route drawing")]
    RouteRequired,
    #[error("no position supplied")]
    MissingPosition,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("user {user_id} already has {limit} route drawings in progress")]
    SessionLimitExceeded { user_id: i64, limit: usize },
    #[error("drawing {0} is already completed")]
    DrawingAlreadyCompleted(i64),
    #[error("drawing {0} is not completed")]
    DrawingNotCompleted(i64),
    #[error("drawing {0} is already published")]
    AlreadyPublished(i64),
    #[error("trace processing failed: {0}")]
    ProcessingFailed(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UserNotFound(_)
            | Error::DrawingNotFound(_)
            | Error::RouteNotFound(_)
            | Error::HealthProfileNotFound(_) => ErrorKind::NotFound,
            Error::InvalidMode(_) | Error::RouteRequired | Error::MissingPosition | Error::InvalidInput(_) => {
                ErrorKind::InvalidInput
            }
            Error::SessionLimitExceeded { .. }
            | Error::DrawingAlreadyCompleted(_)
            | Error::DrawingNotCompleted(_)
            | Error::AlreadyPublished(_) => ErrorKind::Conflict,
            Error::ProcessingFailed(_) | Error::Storage(_) | Error::Config(_) => ErrorKind::DependencyFailure,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
        }
    }

    /// Stable identifier reported to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::UserNotFound(_) => "USER_NOT_FOUND",
            Error::DrawingNotFound(_) => "DRAWING_NOT_FOUND",
            Error::RouteNotFound(_) => "ROUTE_NOT_FOUND",
            Error::HealthProfileNotFound(_) => "HEALTH_PROFILE_NOT_FOUND",
            Error::InvalidMode(_) => "INVALID_MODE",
            Error::RouteRequired => "ROUTE_REQUIRED",
            Error::MissingPosition => "MISSING_POSITION",
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::SessionLimitExceeded { .. } => "SESSION_LIMIT_EXCEEDED",
            Error::DrawingAlreadyCompleted(_) => "DRAWING_ALREADY_COMPLETED",
            Error::DrawingNotCompleted(_) => "DRAWING_NOT_COMPLETED",
            Error::AlreadyPublished(_) => "ALREADY_PUBLISHED",
            Error::ProcessingFailed(_) => "PROCESSING_FAILED",
            Error::Storage(_) => "STORAGE_FAILED",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Config(_) => "CONFIG_INVALID",
        }
    }
}

impl From<postgres::Error> for Error {
    fn from(err: postgres::Error) -> Error {
        Error::Storage(err.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Error {
        Error::Storage(format!("connection pool: {}", err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Error {
        Error::Storage(format!("blocking task: {}", err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Error {
        Error::ProcessingFailed(err.to_string())
    }
}

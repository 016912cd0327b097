use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Not found")]
    NotFound,

    #[error("Account has no active subscription")]
    NoActiveSubscription,

    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("No base plan line item on subscription {0}")]
    MissingBasePlanItem(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    InvalidInput,
    InvalidSignature,
    NotFound,
    NoActiveSubscription,
    ProviderError,
    MissingBasePlanItem,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::NoActiveSubscription => "NO_ACTIVE_SUBSCRIPTION",
            ErrorCode::ProviderError => "PROVIDER_ERROR",
            ErrorCode::MissingBasePlanItem => "MISSING_BASE_PLAN_ITEM",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

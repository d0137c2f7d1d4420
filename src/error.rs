use poem::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("store {0:?} is not registered")]
    StoreNotRegistered(String),

    #[error("a store named {0:?} is already registered")]
    DuplicateStore(String),

    #[error("the converter pool is closed")]
    PoolClosed,

    #[error("the request was cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ImageError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            Self::PoolClosed | Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::StoreNotRegistered(_) | Self::DuplicateStore(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ImageError>;

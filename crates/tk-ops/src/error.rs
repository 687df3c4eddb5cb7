use thiserror::Error;
use tk_runtime::DeviceError;
use tk_tensor::TensorError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("bad parameter: {0}")]
    BadParam(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of an operator call as seen across the C boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    BadParam,
    NotImplemented,
    InternalError,
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Error::BadParam(_) | Error::Tensor(_) => Status::BadParam,
            Error::NotImplemented(_) => Status::NotImplemented,
            Error::Device(_) | Error::Internal(_) => Status::InternalError,
        }
    }
}

impl<T> From<&Result<T>> for Status {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }
}

/// Shorthand for building a [`Error::BadParam`].
pub(crate) fn bad_param(msg: impl Into<String>) -> Error {
    Error::BadParam(msg.into())
}

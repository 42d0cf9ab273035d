use std::io;

use crate::http::connection::State;
use crate::http::response::StatusCode;
use crate::memory::MemoryError;
use crate::template::TemplateError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Peer closed (or went silent) mid-request.
    #[error("client disconnected")]
    Disconnect,
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// Socket failure outside a request: bind, listen, accept or runtime setup.
    #[error("fatal socket error: {0}")]
    Fatal(#[source] io::Error),
    #[error("{operation} is not allowed in state {state:?}")]
    State { operation: &'static str, state: State },
    /// The reply was aborted earlier in this cycle.
    #[error("response aborted")]
    Aborted,
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Failures that end only the current request: the client gets a
    /// best-effort reply and serving continues.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Error::Disconnect | Error::BadRequest(_) | Error::Internal(_) | Error::Memory(_)
        )
    }

    /// Status code of the best-effort reply for a request-phase failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Disconnect | Error::BadRequest(_) => StatusCode::BadRequest,
            _ => StatusCode::InternalServerError,
        }
    }
}

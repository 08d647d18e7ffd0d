//! Error taxonomy shared by every library module.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    /// Missing or rejected credential. Callers must re-authenticate.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Non-success answer (or no answer at all) from the video service.
    #[error("{}", describe_remote_failure(.page, .status, .message))]
    RemoteFetchFailed {
        page: Option<usize>,
        status: Option<u16>,
        message: String,
    },

    #[error("pagination did not finish within {ceiling} pages")]
    PaginationExhausted { ceiling: usize },

    #[error("video {0} is being edited without an original snapshot")]
    SnapshotMissing(String),

    #[error("could not decode remote payload: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, EditorError>;

impl EditorError {
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RemoteFetchFailed {
            page: None,
            status,
            message: message.into(),
        }
    }

    /// Maps an HTTP error status plus its body onto the taxonomy.
    ///
    /// Only 401 means the credential itself is bad. A 403 is a refusal for
    /// one resource (e.g. a video the account may not edit) and stays a
    /// remote failure.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 => Self::Unauthorized(body),
            404 => Self::NotFound(body),
            400 => Self::BadRequest(body),
            _ => Self::remote(Some(status), body),
        }
    }

    /// Re-labels a failure as belonging to the given (1-based) listing page.
    /// `Unauthorized` stays as is so callers can still prompt for a login.
    pub fn at_page(self, page: usize) -> Self {
        match self {
            Self::Unauthorized(_) | Self::PaginationExhausted { .. } => self,
            Self::RemoteFetchFailed {
                status, message, ..
            } => Self::RemoteFetchFailed {
                page: Some(page),
                status,
                message,
            },
            Self::NotFound(message) => Self::RemoteFetchFailed {
                page: Some(page),
                status: Some(404),
                message,
            },
            Self::BadRequest(message) => Self::RemoteFetchFailed {
                page: Some(page),
                status: Some(400),
                message,
            },
            other => Self::RemoteFetchFailed {
                page: Some(page),
                status: None,
                message: other.to_string(),
            },
        }
    }

    /// Status code of the remote answer, when there was one.
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            Self::RemoteFetchFailed { status, .. } => *status,
            Self::Unauthorized(_) => Some(401),
            Self::NotFound(_) => Some(404),
            Self::BadRequest(_) => Some(400),
            _ => None,
        }
    }
}

fn describe_remote_failure(page: &Option<usize>, status: &Option<u16>, message: &str) -> String {
    let mut text = String::from("remote fetch failed");
    if let Some(page) = page {
        text.push_str(&format!(" on page {page}"));
    }
    if let Some(status) = status {
        text.push_str(&format!(" with status {status}"));
    }
    if !message.is_empty() {
        text.push_str(&format!(": {message}"));
    }
    text
}

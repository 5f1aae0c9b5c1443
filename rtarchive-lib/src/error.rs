use serde::Serialize;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Not enough bytes to decode a header or a whole record.
    #[error("short buffer: got {actual} bytes, want {wanted} bytes")]
    ShortBuffer { wanted: usize, actual: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown/unsupported packet type: {0}")]
    UnknownFamily(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors that only mean "no more usable input" for the current source.
    #[must_use]
    pub fn is_short(&self) -> bool {
        matches!(self, Error::ShortBuffer { .. })
    }

    /// Map this error to the status reported at the query boundary.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Error::InvalidRequest(_) | Error::UnknownFamily(_) | Error::Config(_) => {
                Status::BadRequest
            }
            _ => Status::Internal,
        }
    }
}

/// Outcome of a query as reported to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Ok,
    NoContent,
    BadRequest,
    Internal,
}

impl Status {
    /// Status for a successful query producing `len` records.
    #[must_use]
    pub fn for_len(len: usize) -> Self {
        if len == 0 {
            Status::NoContent
        } else {
            Status::Ok
        }
    }

    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::NoContent => 204,
            Status::BadRequest => 400,
            Status::Internal => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Error::InvalidRequest("x".into()), 400; "invalid request")]
    #[test_case(Error::UnknownFamily("x".into()), 400; "unknown family")]
    #[test_case(Error::ShortBuffer { wanted: 2, actual: 1 }, 500; "short buffer")]
    #[test_case(Error::Io(std::io::Error::other("boom")), 500; "io")]
    fn status_codes(err: Error, code: u16) {
        assert_eq!(err.status().code(), code);
    }

    #[test]
    fn empty_results_have_no_content() {
        assert_eq!(Status::for_len(0), Status::NoContent);
        assert_eq!(Status::for_len(3), Status::Ok);
    }
}

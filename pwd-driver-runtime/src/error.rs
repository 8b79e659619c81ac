use std::fmt;

/// Errors returned by driver operations.
#[derive(Debug)]
pub enum DriverError {
    /// Missing or disallowed configuration, or an operation called in the wrong state.
    Configuration(String),
    /// Remote session API call failed (connection error or non-200 status).
    Transport {
        status: Option<u16>,
        message: String,
    },
    /// Key or certificate synthesis failed.
    Generation(String),
    /// Local certificate store read/write/copy failed.
    Io(String),
    /// The operation is owned by the remote session system.
    Unsupported(&'static str),
}

impl DriverError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        DriverError::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status carried by a transport failure, if the remote answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            DriverError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            DriverError::Transport {
                status: Some(status),
                message,
            } => write!(f, "transport error: HTTP {status}: {message}"),
            DriverError::Transport {
                status: None,
                message,
            } => write!(f, "transport error: {message}"),
            DriverError::Generation(msg) => write!(f, "generation error: {msg}"),
            DriverError::Io(msg) => write!(f, "io error: {msg}"),
            DriverError::Unsupported(op) => write!(f, "{op}: not implemented"),
        }
    }
}

impl std::error::Error for DriverError {}

pub type Result<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_display_includes_status() {
        let err = DriverError::Transport {
            status: Some(503),
            message: "instance pool exhausted".into(),
        };
        assert_eq!(
            err.to_string(),
            "transport error: HTTP 503: instance pool exhausted"
        );
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn unsupported_names_the_operation() {
        let err = DriverError::Unsupported("kill");
        assert_eq!(err.to_string(), "kill: not implemented");
        assert_eq!(err.status(), None);
    }
}

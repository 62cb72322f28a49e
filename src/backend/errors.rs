//! Backend Error Types

/// Why a remote file operation failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The file does not exist in the collection
    #[error("File not found: {0}")]
    NotFound(String),

    /// The caller may not read or write this file
    #[error("Access denied: {0}")]
    Denied(String),

    /// The backend could not be reached or did not answer in time
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered but refused the request
    #[error("Backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl BackendError {
    /// Whether the same request may succeed later without any change.
    /// Logged with every failed load and sync operation.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Unavailable(_) => true,
            BackendError::Rejected { status, .. } => *status == 429 || *status >= 500,
            BackendError::NotFound(_) | BackendError::Denied(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient() {
        assert!(BackendError::Unavailable("timeout".into()).is_transient());
        assert!(BackendError::Rejected {
            status: 503,
            message: "maintenance".into()
        }
        .is_transient());
        assert!(BackendError::Rejected {
            status: 429,
            message: String::new()
        }
        .is_transient());

        assert!(!BackendError::Rejected {
            status: 400,
            message: "bad name".into()
        }
        .is_transient());
        assert!(!BackendError::NotFound("f1/a.bin".into()).is_transient());
        assert!(!BackendError::Denied("f1/a.bin".into()).is_transient());
    }

    #[test]
    fn test_display_names_the_file() {
        assert_eq!(
            BackendError::NotFound("f1/a.bin".into()).to_string(),
            "File not found: f1/a.bin"
        );
    }
}

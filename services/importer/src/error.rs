use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

/// Failures that abort an import run before any `ImportResult` exists.
///
/// Row-level write failures are not represented here: they are recorded as
/// [`crate::model::FailedRow`] entries and the run continues.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to download {bucket}/{path} from storage: {reason}")]
    StorageFetch {
        bucket: String,
        path: String,
        reason: String,
    },

    #[error("Failed to fetch {url}: {reason}")]
    Http { url: String, reason: String },

    #[error("Source returned an HTML page instead of CSV data{}: {preview}", title_suffix(.title))]
    InvalidPayload {
        title: Option<String>,
        preview: String,
    },

    #[error("Invalid CSV: {0}")]
    CsvStructure(String),

    #[error("Invalid source locator: {0}")]
    Locator(String),

    #[error("Storage backend error: {0}")]
    Store(String),
}

fn title_suffix(title: &Option<String>) -> String {
    match title {
        Some(t) => format!(" ({})", t),
        None => String::new(),
    }
}

impl ImportError {
    pub fn http(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Http {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn csv_structure(msg: impl Into<String>) -> Self {
        Self::CsvStructure(msg.into())
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_payload_message_includes_title() {
        let err = ImportError::InvalidPayload {
            title: Some("502 Bad Gateway".to_string()),
            preview: "<html>...".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("(502 Bad Gateway)"));
        assert!(msg.contains("<html>..."));
    }

    #[test]
    fn invalid_payload_message_without_title() {
        let err = ImportError::InvalidPayload {
            title: None,
            preview: "<body>oops".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Source returned an HTML page instead of CSV data: <body>oops"
        );
    }
}

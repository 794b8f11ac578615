//! Error type shared by every step of the read and write pipelines.

use std::path::PathBuf;

use reqwest::StatusCode;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while moving a workbook between SharePoint and
/// memory.
///
/// Each variant names the pipeline step that failed. Nothing is retried: the
/// first error aborts the operation and is returned to the caller as is.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The token endpoint refused the client credentials or returned no
    /// `access_token`.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The site lookup returned a non-success status or no site id.
    #[error("site lookup failed: {0}")]
    Lookup(String),

    /// A metadata or content download returned a non-success status.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The requested sheet does not exist in the downloaded workbook.
    #[error("sheet '{name}' not found (available: {})", .available.join(", "))]
    SheetNotFound {
        name: String,
        available: Vec<String>,
    },

    /// The downloaded bytes could not be parsed as a spreadsheet.
    #[error("failed to decode workbook: {0}")]
    Decode(String),

    /// The merged workbook could not be serialized.
    #[error("failed to encode workbook: {0}")]
    Encode(#[from] rust_xlsxwriter::XlsxError),

    /// The content-replace request returned a non-success status.
    #[error("upload failed ({status}): {body}")]
    Upload { status: StatusCode, body: String },

    /// The HTTP transport failed before a response was received.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A configuration file could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid TOML for [`crate::Config`].
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A configuration value is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status code carried by the error, when the failing step got a
    /// response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Upload { status, .. } => Some(*status),
            Error::Http(err) => err.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_not_found_lists_available_sheets() {
        let error = Error::SheetNotFound {
            name: "Budget".to_string(),
            available: vec!["Sales".to_string(), "Forecast".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "sheet 'Budget' not found (available: Sales, Forecast)"
        );
    }

    #[test]
    fn test_upload_error_display_includes_status_and_body() {
        let error = Error::Upload {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "try later".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "upload failed (503 Service Unavailable): try later"
        );
        assert_eq!(error.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn test_status_is_none_for_codec_errors() {
        let error = Error::Decode("not a zip".to_string());
        assert!(error.status().is_none());
    }
}

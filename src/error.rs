//! Error types for the edgequake-finmetrics library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`FinMetricsError`], **fatal**: the document cannot be analysed at all
//!   (bad input file, wrong password, pdfium unavailable, invalid config).
//!   Returned as `Err(FinMetricsError)` from the top-level `analyze*`
//!   functions. Nothing is persisted when one of these occurs.
//!
//! * [`MetricError`], **per keyword**: the extraction service failed or
//!   replied with something that is not a metric. Captured inline as an
//!   error [`crate::output::MetricRecord`] so every configured keyword still
//!   gets exactly one record.
//!
//! Finding no keyword at all is neither: it is the
//! [`crate::output::ExtractionOutcome::NothingFound`] outcome.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-finmetrics library.
#[derive(Debug, Error)]
pub enum FinMetricsError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the binary, install it system-wide,\n\
or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Store errors ──────────────────────────────────────────────────────
    /// The result store could not be read or appended to.
    #[error("Result store '{location}' failed: {detail}")]
    StoreFailed { location: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FinMetricsError {
    /// `true` for the errors that mean "this document could not be opened".
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            FinMetricsError::FileNotFound { .. }
                | FinMetricsError::PermissionDenied { .. }
                | FinMetricsError::NotAPdf { .. }
                | FinMetricsError::CorruptPdf { .. }
                | FinMetricsError::PasswordRequired { .. }
                | FinMetricsError::WrongPassword { .. }
                | FinMetricsError::PdfiumBindingFailed(_)
        )
    }
}

/// Failure to read one page. Scan and extract degrade these to empty content.
#[derive(Debug, Clone, Error)]
#[error("page {index}: {detail}")]
pub struct PageReadError {
    pub index: usize,
    pub detail: String,
}

/// Broad class of an extraction-service failure, used by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// HTTP 429 or an explicit rate-limit message.
    RateLimited,
    /// The call exceeded `api_timeout_secs` or the provider reported a timeout.
    Timeout,
    /// Connection reset, DNS failure, 5xx.
    Transport,
    /// 401/403 or an invalid key. Retrying never helps.
    Auth,
    /// Anything else.
    Other,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceErrorKind::RateLimited => "rate limited",
            ServiceErrorKind::Timeout => "timeout",
            ServiceErrorKind::Transport => "transport",
            ServiceErrorKind::Auth => "auth",
            ServiceErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Failure of a single call to the extraction service.
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify a provider error from its rendered message.
    ///
    /// Providers surface HTTP status and transport failures as text, so the
    /// classification works on the lower-cased message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let kind = if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
            ServiceErrorKind::RateLimited
        } else if lower.contains("timed out") || lower.contains("timeout") {
            ServiceErrorKind::Timeout
        } else if lower.contains("401")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("invalid api key")
            || lower.contains("authentication")
        {
            ServiceErrorKind::Auth
        } else if lower.contains("connection")
            || lower.contains("network")
            || lower.contains("dns")
            || lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
        {
            ServiceErrorKind::Transport
        } else {
            ServiceErrorKind::Other
        };
        Self { kind, message }
    }
}

/// A recoverable failure for a single keyword.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum MetricError {
    /// The service call itself failed after the configured attempts.
    #[error("'{keyword}': extraction service failed after {attempts} attempt(s): {detail}")]
    ServiceCall {
        keyword: String,
        attempts: u32,
        kind: ServiceErrorKind,
        detail: String,
    },

    /// The service replied, but not with a JSON metric object.
    #[error("'{keyword}': malformed response ({reason})")]
    MalformedResponse {
        keyword: String,
        reason: String,
        raw: String,
    },
}

impl MetricError {
    pub fn keyword(&self) -> &str {
        match self {
            MetricError::ServiceCall { keyword, .. } => keyword,
            MetricError::MalformedResponse { keyword, .. } => keyword,
        }
    }
}

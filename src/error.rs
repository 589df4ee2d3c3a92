//! Error types for the receipt2latex library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReceiptError`] — **Fatal**: the run cannot proceed at all (image
//!   missing or unreadable, provider not configured, bad configuration).
//!   Returned as `Err(ReceiptError)` from [`crate::ensemble::run`] and
//!   [`crate::pipeline::extract::Extractor::extract`].
//!
//! * [`ProviderError`] — **Non-fatal**: one completion call failed (HTTP
//!   error status, timeout, unparsable body). Stored inside
//!   [`crate::pipeline::extract::ExtractionResult`] so the orchestrator can
//!   decide what the judge gets to see, and returned by the selector when
//!   the judge call itself fails.
//!
//! Callers branch on variants, never on message text.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the receipt2latex library.
#[derive(Debug, Error)]
pub enum ReceiptError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Receipt image was not found at the given path.
    #[error("Receipt image not found: '{path}'\nCheck the path exists and is readable.")]
    ImageNotFound { path: PathBuf },

    /// Process does not have read permission on the image.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Any other I/O failure while reading the image.
    #[error("Failed to read receipt image '{path}': {source}")]
    ImageReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image file exists but holds zero bytes.
    #[error("Receipt image '{path}' is empty")]
    EmptyImage { path: PathBuf },

    /// Media-type sniffing found no known image signature.
    #[error(
        "Could not detect the image type of '{path}'\n\
Supported: JPEG, PNG, GIF, WebP. Pass --media-type to declare it."
    )]
    UnsupportedImage { path: PathBuf },

    // ── Provider errors ───────────────────────────────────────────────────
    /// No credential or pre-built provider is available.
    #[error("Completion provider is not configured.\n{hint}")]
    ProviderNotConfigured { hint: String },

    /// The judge call failed, so no candidate could be selected.
    ///
    /// Returned by [`crate::output::EnsembleOutput::into_result`]; the
    /// extraction results are still available on the output itself.
    #[error("Judge model call failed: {source}")]
    JudgeFailed {
        #[source]
        source: ProviderError,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failed call to one completion provider.
///
/// The `Display` text of the transport variants matches the wording users of
/// the command-line tool see in candidate listings; the fields carry the
/// same data in typed form.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderError {
    /// The provider answered with a non-success HTTP status.
    #[error("Request failed with status code {status}: {body}")]
    TransportFailure {
        provider_id: String,
        status: u16,
        body: String,
    },

    /// Connection, DNS or protocol failure before a status was received.
    #[error("Request failed due to an exception: {cause}")]
    TransportException { provider_id: String, cause: String },

    /// The bounded wait elapsed.
    #[error("Request to '{provider_id}' timed out after {secs}s")]
    Timeout { provider_id: String, secs: u64 },

    /// Success status, but the body held no usable first choice.
    #[error("Malformed response from '{provider_id}': {detail}")]
    MalformedResponse { provider_id: String, detail: String },
}

impl ProviderError {
    /// The provider (model) identifier the failed call was addressed to.
    pub fn provider_id(&self) -> &str {
        match self {
            ProviderError::TransportFailure { provider_id, .. }
            | ProviderError::TransportException { provider_id, .. }
            | ProviderError::Timeout { provider_id, .. }
            | ProviderError::MalformedResponse { provider_id, .. } => provider_id,
        }
    }

    /// HTTP status, when the provider got far enough to send one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::TransportFailure { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure is an authentication rejection (401/403).
    pub fn is_auth(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

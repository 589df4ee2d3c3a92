//! Result types returned by [`crate::ensemble::run`].

use crate::error::{ProviderError, ReceiptError};
use crate::pipeline::extract::ExtractionResult;
use crate::pipeline::select::Selection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything one ensemble run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleOutput {
    /// Image path, when the run started from a file.
    pub image: Option<PathBuf>,
    /// Media type declared to the providers.
    pub media_type: String,
    /// One entry per configured backend, in configuration order.
    pub candidates: Vec<ExtractionResult>,
    /// The judge's decision. `None` exactly when `judge_error` is set.
    pub selection: Option<Selection>,
    pub judge_error: Option<ProviderError>,
    pub stats: EnsembleStats,
}

impl EnsembleOutput {
    /// The selected table text, verbatim from the judge.
    pub fn selected_text(&self) -> Option<&str> {
        self.selection.as_ref().and_then(Selection::text)
    }

    /// The extraction result the judge's answer was attributed to.
    pub fn winner(&self) -> Option<&ExtractionResult> {
        let index = self.selection.as_ref()?.index()?;
        self.candidates.iter().find(|c| c.index == index)
    }

    /// Turn a failed judge call into an error.
    pub fn into_result(self) -> Result<Self, ReceiptError> {
        match self.judge_error {
            Some(source) => Err(ReceiptError::JudgeFailed { source }),
            None => Ok(self),
        }
    }
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsembleStats {
    pub total_providers: usize,
    pub successful: usize,
    pub failed: usize,
    /// Distinct successful outputs after normalisation.
    pub distinct_outputs: usize,
    /// Successful outputs containing a LaTeX table environment.
    pub table_like: usize,
    /// Options shown to the judge.
    pub judged: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub extraction_duration_ms: u64,
    pub judge_duration_ms: u64,
    pub total_duration_ms: u64,
}

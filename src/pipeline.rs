use log::{error, info};

use crate::cancel::CancelToken;
use crate::challenge::{ChallengeType, ReferenceBundle, ScoreOptions, ScoringRequest, dispatch};
use crate::io::PcmSource;
use crate::score::ScoringResult;
use crate::{Error, Result};

/// Lifecycle of one performance inside the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Progress checkpoints reported during processing, in order.
const STAGES: [(u8, &str); 6] = [
    (10, "Analyzing audio..."),
    (30, "Extracting voice features..."),
    (50, "Loading reference data..."),
    (60, "Processing reference voice features..."),
    (70, "Calculating scores..."),
    (80, "Finalizing..."),
];

/// Stateful per-performance pipeline: decode, analyze, score.
///
/// Drives `Pending -> Processing -> {Completed, Failed}` and reports the
/// literal progress messages at 10/30/50/60/70/80/100 %. Analyzer failures
/// move the performance to `Failed` with `"Processing failed: <cause>"`;
/// cancellation records `"Processing cancelled"`. The core never retries —
/// a caller may construct a fresh `Performance` and start over.
#[derive(Debug)]
pub struct Performance {
    status: ProcessingStatus,
    progress: u8,
    message: String,
    result: Option<ScoringResult>,
}

impl Default for Performance {
    fn default() -> Self {
        Self::new()
    }
}

impl Performance {
    pub fn new() -> Self {
        Self {
            status: ProcessingStatus::Pending,
            progress: 0,
            message: String::new(),
            result: None,
        }
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The scoring result, present once processing completed.
    pub fn result(&self) -> Option<&ScoringResult> {
        self.result.as_ref()
    }

    fn report(&mut self, progress: u8, message: &str, callback: &mut dyn FnMut(u8, &str)) {
        self.progress = progress;
        self.message = message.to_string();
        callback(progress, message);
    }

    /// Run the full pipeline for one performance.
    ///
    /// The heavy lifting happens between the progress checkpoints; large
    /// audio buffers live only inside the dispatcher and are dropped
    /// before the result is finalized, so nothing sample-sized survives a
    /// progress report.
    pub fn process(
        &mut self,
        audio: PcmSource,
        reference: &ReferenceBundle,
        challenge: ChallengeType,
        options: &ScoreOptions,
        progress: &mut dyn FnMut(u8, &str),
        cancel: &CancelToken,
    ) -> Result<&ScoringResult> {
        self.status = ProcessingStatus::Processing;

        let request = ScoringRequest {
            challenge,
            user_audio: audio,
            reference: reference.clone(),
            options: options.clone(),
        };

        // The stages before scoring exist to surface pipeline position to
        // the caller; the dispatcher performs decode/analysis work when the
        // scoring stage runs.
        for (percent, message) in STAGES.iter().take(4) {
            if cancel.is_cancelled() {
                return Err(self.fail_cancelled());
            }
            self.report(*percent, message, progress);
        }

        self.report(70, STAGES[4].1, progress);
        let outcome = dispatch(&request, cancel);
        let result = match outcome {
            Ok(result) => result,
            Err(Error::Cancelled) => return Err(self.fail_cancelled()),
            Err(err) => {
                self.status = ProcessingStatus::Failed;
                self.message = format!("Processing failed: {err}");
                error!("{}", self.message);
                return Err(err);
            }
        };

        self.report(80, STAGES[5].1, progress);

        self.result = Some(result);
        self.status = ProcessingStatus::Completed;
        self.report(100, "Processing completed successfully", progress);
        info!(
            "performance completed with overall score {:.1}",
            self.result.as_ref().map(|r| r.overall_score).unwrap_or(0.0)
        );

        Ok(self.result.as_ref().expect("result just stored"))
    }

    fn fail_cancelled(&mut self) -> Error {
        self.status = ProcessingStatus::Failed;
        self.message = "Processing cancelled".to_string();
        Error::Cancelled
    }
}

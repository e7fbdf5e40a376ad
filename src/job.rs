//! Job lifecycle: state machine, job record and cooperative cancellation.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{KeyframeError, Result};

// ----------------------------------------------------------------------------
// State machine
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Analyzing,
    Detecting,
    Extracting,
    Completed,
    Failed { message: String },
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Analyzing => "analyzing",
            JobState::Detecting => "detecting",
            JobState::Extracting => "extracting",
            JobState::Completed => "completed",
            JobState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed { .. })
    }

    /// `detecting` and `extracting` together form the processing phase.
    pub fn is_processing(&self) -> bool {
        matches!(self, JobState::Detecting | JobState::Extracting)
    }

    fn can_advance_to(&self, next: &JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Analyzing)
                | (JobState::Analyzing, JobState::Detecting)
                | (JobState::Detecting, JobState::Extracting)
                | (JobState::Extracting, JobState::Completed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Failed { message } => write!(f, "failed: {message}"),
            other => f.write_str(other.name()),
        }
    }
}

/// One extraction job and its observable lifecycle.
#[derive(Clone, Debug, Serialize)]
pub struct Job {
    pub video_id: String,
    pub video_path: PathBuf,
    state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(video_id: impl Into<String>, video_path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            video_id: video_id.into(),
            video_path: video_path.into(),
            state: JobState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Move forward one step. Skipping a state or leaving a terminal state
    /// is rejected.
    pub fn advance(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_advance_to(&next) {
            return Err(KeyframeError::processing(
                "job",
                anyhow::anyhow!(
                    "illegal job transition {} -> {}",
                    self.state.name(),
                    next.name()
                ),
            ));
        }
        log::debug!(
            "Job {}: {} -> {}",
            self.video_id,
            self.state.name(),
            next.name()
        );
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a terminal failure. A job that already finished keeps its state.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        let message = message.into();
        log::warn!("Job {}: failed in {}: {}", self.video_id, self.state.name(), message);
        self.state = JobState::Failed { message };
        self.updated_at = Utc::now();
    }
}

// ----------------------------------------------------------------------------
// Cancellation
// ----------------------------------------------------------------------------

/// Shared stop flag with an optional wall-clock budget.
///
/// Clones observe the same flag. Long-running stages call [`check`] between
/// sampled frames and between saved keyframes.
///
/// [`check`]: CancelToken::check
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<(Instant, Duration)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same flag, plus a budget that starts counting now.
    pub fn with_timeout(&self, budget: Duration) -> Self {
        Self {
            flag: self.flag.clone(),
            deadline: Some((Instant::now() + budget, budget)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(KeyframeError::Cancelled);
        }
        if let Some((deadline, budget)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(KeyframeError::TimedOut(budget));
            }
        }
        Ok(())
    }
}

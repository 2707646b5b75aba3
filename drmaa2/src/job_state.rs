use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The lifecycle state of a job as seen through a job session.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    #[default]
    Unset,
    Undetermined,
    Queued,
    QueuedHeld,
    Running,
    Suspended,
    Requeued,
    RequeuedHeld,
    Done,
    Failed,
}

impl JobState {
    pub const ALL: [JobState; 10] = [
        JobState::Unset,
        JobState::Undetermined,
        JobState::Queued,
        JobState::QueuedHeld,
        JobState::Running,
        JobState::Suspended,
        JobState::Requeued,
        JobState::RequeuedHeld,
        JobState::Done,
        JobState::Failed,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            JobState::Unset => "unset",
            JobState::Undetermined => "undetermined",
            JobState::Queued => "queued",
            JobState::QueuedHeld => "queued-held",
            JobState::Running => "running",
            JobState::Suspended => "suspended",
            JobState::Requeued => "requeued",
            JobState::RequeuedHeld => "requeued-held",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }

    /// Returns true if the job can not leave this state anymore.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseJobStateError(String);

impl std::error::Error for ParseJobStateError {}

impl fmt::Display for ParseJobStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown job state {:?}, expected one of ", self.0)?;
        for (index, state) in JobState::ALL.iter().enumerate() {
            if index != 0 {
                f.write_str(", ")?;
            }
            f.write_str(state.as_str())?;
        }
        Ok(())
    }
}

impl FromStr for JobState {
    type Err = ParseJobStateError;

    /// Accepts the kebab-case names produced by [`JobState::as_str`], ignoring ASCII case and treating `_` like `-`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_ascii_lowercase().replace('_', "-");
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| ParseJobStateError(input.to_string()))
    }
}

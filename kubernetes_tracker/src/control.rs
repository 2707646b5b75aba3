use std::{fmt, str::FromStr};

use drmaa2::JobState;
use log::info;

use crate::{kubectl::Job, state, store::WorkloadStore, Result};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    Suspend,
    Resume,
    Hold,
    Release,
    Terminate,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Suspend,
        Action::Resume,
        Action::Hold,
        Action::Release,
        Action::Terminate,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Action::Suspend => "suspend",
            Action::Resume => "resume",
            Action::Hold => "hold",
            Action::Release => "release",
            Action::Terminate => "terminate",
        }
    }

    /// Returns true if the action can be applied to a job in the given state.
    pub fn applies_to(&self, state: JobState) -> bool {
        match self {
            Action::Suspend => matches!(state, JobState::Queued | JobState::Running),
            Action::Resume => state == JobState::Suspended,
            Action::Hold => state == JobState::Queued,
            Action::Release => state == JobState::QueuedHeld,
            Action::Terminate => true,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ControlError {
    UnknownAction(String),
    InvalidState { action: Action, state: JobState },
}

impl std::error::Error for ControlError {}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::UnknownAction(action) => {
                write!(f, "unsupported action {action:?}, expected one of ")?;
                for (index, action) in Action::ALL.iter().enumerate() {
                    if index != 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(action.as_str())?;
                }
                Ok(())
            }
            ControlError::InvalidState { action, state } => {
                write!(f, "can not {action} a job that is {state}")
            }
        }
    }
}

impl FromStr for Action {
    type Err = ControlError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_ascii_lowercase();
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| ControlError::UnknownAction(input.to_owned()))
    }
}

/// Applies the action to the Job. Suspending, holding, resuming and releasing toggle `spec.suspend`, terminating
/// deletes the Job.
pub fn apply<S: WorkloadStore + ?Sized>(store: &S, job: &Job, action: Action) -> Result<()> {
    let (state, _) = state::job_state(job);
    if !action.applies_to(state) {
        return Err(ControlError::InvalidState { action, state }.into());
    }

    let namespace = job.metadata.namespace.as_str();
    let name = job.metadata.name.as_str();
    match action {
        Action::Suspend | Action::Hold => store.set_job_suspended(namespace, name, true)?,
        Action::Resume | Action::Release => store.set_job_suspended(namespace, name, false)?,
        Action::Terminate => store.delete_job(namespace, name)?,
    }

    info!("applied {action} to Job {namespace}/{name} which was {state}");
    Ok(())
}

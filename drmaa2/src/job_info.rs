use std::time::Duration;

use serde::Serialize;

use crate::JobState;

/// A snapshot of what a backend knows about a job at the time it was asked.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub state: JobState,
    /// Backend specific detail about the state, e.g. the reason a job failed.
    pub sub_state: String,
    pub exit_status: Option<i32>,
    pub job_owner: Option<String>,
    pub queue_name: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub submission_time: Option<time::OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub dispatch_time: Option<time::OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finish_time: Option<time::OffsetDateTime>,
    pub wallclock_time: Option<Duration>,
}

//! Derives job session states from the status the Job controller reports.

use drmaa2::{JobInfo, JobState};

use crate::kubectl::{annotation, Job, JobCondition, JobConditionType};

fn reason(condition: Option<&JobCondition>) -> String {
    condition
        .and_then(|condition| condition.reason.clone())
        .unwrap_or_default()
}

/// Maps the Job to a state and a sub-state. The sub-state is the reason of the condition the state was derived
/// from, if any.
///
/// Terminal conditions take precedence over suspension, suspension over pod counts. A suspended Job that never
/// started is held in the queue, one that did is suspended.
pub fn job_state(job: &Job) -> (JobState, String) {
    if let Some(condition) = job.active_condition(JobConditionType::Complete) {
        return (JobState::Done, reason(Some(condition)));
    }
    if let Some(condition) = job.active_condition(JobConditionType::Failed) {
        return (JobState::Failed, reason(Some(condition)));
    }

    if job.is_suspended() {
        let state = if job.has_started() {
            JobState::Suspended
        } else {
            JobState::QueuedHeld
        };
        return (
            state,
            reason(job.active_condition(JobConditionType::Suspended)),
        );
    }

    let status = &job.status;
    if status.active.unwrap_or_default() > 0 {
        (JobState::Running, String::new())
    } else if status.succeeded.unwrap_or_default() > 0 {
        (JobState::Done, String::new())
    } else if status.failed.unwrap_or_default() > 0 {
        // Pods failed but the controller has not concluded yet, e.g. while it is still retrying.
        (
            JobState::Failed,
            reason(job.active_condition(JobConditionType::FailureTarget)),
        )
    } else {
        (JobState::Queued, String::new())
    }
}

/// Builds the job info record for a Job known under `id`.
pub fn job_info(id: String, job: &Job) -> JobInfo {
    let (state, sub_state) = job_state(job);

    let dispatch_time = job.status.start_time;
    let finish_time = match state {
        JobState::Done => job.status.completion_time.or_else(|| {
            job.active_condition(JobConditionType::Complete)
                .and_then(|condition| condition.last_transition_time)
        }),
        JobState::Failed => job
            .active_condition(JobConditionType::Failed)
            .and_then(|condition| condition.last_transition_time),
        _ => None,
    };

    // Exit codes live on the pods, the Job only tells whether they succeeded.
    let exit_status = match state {
        JobState::Done => Some(0),
        JobState::Failed => Some(1),
        _ => None,
    };

    JobInfo {
        id,
        state,
        sub_state,
        exit_status,
        job_owner: job
            .metadata
            .annotation(annotation::JOB_OWNER)
            .map(str::to_owned),
        queue_name: Some(job.metadata.namespace.clone()),
        submission_time: Some(job.metadata.creation_timestamp),
        dispatch_time,
        finish_time,
        wallclock_time: dispatch_time
            .zip(finish_time)
            .and_then(|(start, end)| (end - start).try_into().ok()),
    }
}

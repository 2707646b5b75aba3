use serde::Deserialize;

use super::ResourceMetadata;

/// The parts of a [Job](https://kubernetes.io/docs/reference/kubernetes-api/workload-resources/job-v1/) the tracker
/// reads back from the cluster.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub metadata: ResourceMetadata,
    #[serde(default)]
    pub spec: JobSpec,
    #[serde(default)]
    pub status: JobStatus,
}

impl Job {
    /// Returns the condition of the given type if its status is true.
    pub fn active_condition(&self, r#type: JobConditionType) -> Option<&JobCondition> {
        self.status
            .conditions
            .iter()
            .find(|condition| condition.r#type == r#type && condition.status)
    }

    /// Whether the Job has been asked to suspend, or the controller reports it as suspended.
    pub fn is_suspended(&self) -> bool {
        self.spec.suspend.unwrap_or_default()
            || self.active_condition(JobConditionType::Suspended).is_some()
    }

    /// Whether the Job is being deleted. It stays visible until its finalizers have run.
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether a pod of this Job has been started at some point.
    pub fn has_started(&self) -> bool {
        self.status.start_time.is_some()
            || self.status.succeeded.unwrap_or_default() > 0
            || self.status.failed.unwrap_or_default() > 0
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// When true, the Job controller does not create pods and deletes running ones.
    #[serde(default)]
    pub suspend: Option<bool>,
    #[serde(default)]
    pub active_deadline_seconds: Option<i64>,
    #[serde(default)]
    pub backoff_limit: Option<i32>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
/// https://kubernetes.io/docs/reference/kubernetes-api/workload-resources/job-v1/#JobStatus
///
/// The latest available observations of an object's current state. When a Job fails, one of the conditions will have
/// type "Failed" and status true. When a Job is suspended, one of the conditions will have type "Suspended" and status
/// true; when the Job is resumed, the status of this condition will become false. When a Job is completed, one of the
/// conditions will have type "Complete" and status true.
pub struct JobStatus {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<time::OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completion_time: Option<time::OffsetDateTime>,
    #[serde(default)]
    pub active: Option<u64>,
    #[serde(default)]
    pub failed: Option<u64>,
    #[serde(default)]
    pub succeeded: Option<u64>,
    #[serde(default)]
    pub conditions: Vec<JobCondition>,
}

/// [JobCondition](https://kubernetes.io/docs/reference/generated/kubernetes-api/v1.31/#jobcondition-v1-batch)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCondition {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_transition_time: Option<time::OffsetDateTime>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(with = "job_condition_status")]
    pub status: bool,
    pub r#type: JobConditionType,
}

pub mod job_condition_status {
    // Learn more at https://serde.rs/custom-date-format.html.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value: String = serde::Deserialize::deserialize(deserializer)?;
        Ok(match value.as_str() {
            "True" => true,
            // A condition whose status can not be determined does not hold.
            "False" | "Unknown" => false,
            invalid => {
                return Err(serde::de::Error::unknown_variant(
                    invalid,
                    &["True", "False", "Unknown"],
                ))
            }
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
pub enum JobConditionType {
    Failed,
    Suspended,
    Complete,
    FailureTarget,
    SuccessCriteriaMet,
    #[serde(other)]
    Other,
}

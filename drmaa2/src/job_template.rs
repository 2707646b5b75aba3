use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Describes the work to run, independent of the backend that runs it. Backends interpret the fields they
/// support and ignore the rest. Backend specific settings go into [`JobTemplate::extensions`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct JobTemplate {
    pub remote_command: Option<String>,

    pub args: Vec<String>,

    /// Submit the job in a held state so that it does not start until released.
    pub submit_as_hold: bool,

    pub job_environment: BTreeMap<String, String>,

    pub working_directory: Option<String>,

    /// Backend specific job category. Container based backends use it as the image to run.
    pub job_category: Option<String>,

    pub job_name: Option<String>,

    /// Host names of which one must be used to run the job.
    pub candidate_machines: Vec<String>,

    /// Minimum physical memory in KiB.
    pub min_phys_memory: Option<u64>,

    /// Point in time after which the job is terminated if it has not finished.
    #[serde(with = "time::serde::rfc3339::option")]
    pub deadline_time: Option<time::OffsetDateTime>,

    pub resource_limits: HashMap<String, String>,

    pub extensions: HashMap<String, String>,
}

impl JobTemplate {
    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_partial_templates() {
        let template: JobTemplate = serde_json::from_str(
            r#"{
                "remote_command": "/bin/sleep",
                "args": ["10"],
                "job_category": "busybox:1.36",
                "deadline_time": "2030-01-01T00:00:00Z",
                "extensions": { "namespace": "batch" }
            }"#,
        )
        .unwrap();

        assert_eq!(template.remote_command.as_deref(), Some("/bin/sleep"));
        assert_eq!(template.args, ["10"]);
        assert_eq!(template.job_category.as_deref(), Some("busybox:1.36"));
        assert_eq!(
            template.deadline_time,
            Some(time::macros::datetime!(2030-01-01 00:00:00 UTC))
        );
        assert_eq!(template.extension("namespace"), Some("batch"));
        assert_eq!(template.extension("labels"), None);
        assert!(!template.submit_as_hold);
        assert!(template.job_environment.is_empty());
    }
}

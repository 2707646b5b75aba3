//! Array jobs for backends without a native array job primitive. Every task is submitted as a single job and the
//! array job id is the JSON encoded list of the task job ids.

use std::fmt;

use log::{debug, warn};

use crate::{JobTemplate, JobTracker, Result};

/// The environment variable through which a task learns its index.
pub const TASK_ID_ENV: &str = "TASK_ID";

/// The longest job name a task may get. Backends commonly use job names as DNS labels.
pub const MAX_TASK_NAME_LEN: usize = 63;

#[derive(Debug)]
pub enum ArrayJobError {
    ZeroStep,
    EmptyRange { begin: u32, end: u32 },
    InvalidId(serde_json::Error),
    NameTooLong { name: String, max_len: usize },
}

impl std::error::Error for ArrayJobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArrayJobError::InvalidId(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for ArrayJobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayJobError::ZeroStep => f.write_str("array job step must be at least 1"),
            ArrayJobError::EmptyRange { begin, end } => {
                write!(f, "array job begin {begin} is larger than end {end}")
            }
            ArrayJobError::InvalidId(error) => write!(f, "invalid array job id: {error}"),
            ArrayJobError::NameTooLong { name, max_len } => write!(
                f,
                "array job task name {name:?} is longer than {max_len} characters"
            ),
        }
    }
}

/// Returns the task indices of an array job.
pub fn task_indices(
    begin: u32,
    end: u32,
    step: u32,
) -> Result<impl Iterator<Item = u32>, ArrayJobError> {
    if step == 0 {
        return Err(ArrayJobError::ZeroStep);
    }
    if begin > end {
        return Err(ArrayJobError::EmptyRange { begin, end });
    }
    Ok((begin..=end).step_by(step as usize))
}

fn task_name(name: &str, index: u32) -> String {
    format!("{name}-{index}")
}

/// Returns the template for the task with the given index. The index is exported through [`TASK_ID_ENV`] and
/// appended to the job name, if any, so that tasks do not collide.
pub fn task_template(template: &JobTemplate, index: u32) -> JobTemplate {
    let mut task = template.clone();
    task.job_environment
        .insert(TASK_ID_ENV.to_string(), index.to_string());
    if let Some(name) = task.job_name.as_mut() {
        *name = task_name(name, index);
    }
    task
}

/// Submits every task of an array job through [`JobTracker::add_job`] and returns the array job id.
///
/// Nothing is submitted when the name of the last task would exceed [`MAX_TASK_NAME_LEN`]. When a submission fails
/// the error is returned as is. Tasks that were submitted before are not removed.
pub fn add_as_single_jobs<T: JobTracker + ?Sized>(
    tracker: &T,
    template: &JobTemplate,
    begin: u32,
    end: u32,
    step: u32,
) -> Result<String> {
    let indices = task_indices(begin, end, step)?;
    if let Some(name) = template.job_name.as_deref() {
        // Indices ascend, the last one has the most digits.
        let last = begin + (end - begin) / step * step;
        let longest = task_name(name, last);
        if longest.len() > MAX_TASK_NAME_LEN {
            return Err(ArrayJobError::NameTooLong {
                name: longest,
                max_len: MAX_TASK_NAME_LEN,
            }
            .into());
        }
    }

    let mut ids = Vec::new();
    for index in indices {
        match tracker.add_job(&task_template(template, index)) {
            Ok(id) => {
                debug!("submitted array job task {index} as {id:?}");
                ids.push(id);
            }
            Err(error) => {
                if !ids.is_empty() {
                    warn!(
                        "array job submission failed at task {index}, tasks {ids:?} were already submitted"
                    );
                }
                return Err(error);
            }
        }
    }
    Ok(join_id(&ids))
}

/// Encodes job ids into an array job id.
pub fn join_id(ids: &[String]) -> String {
    // Serializing a slice of strings can not fail.
    serde_json::Value::from(ids).to_string()
}

/// Decodes an array job id into the ids of its jobs.
pub fn split_id(array_job_id: &str) -> Result<Vec<String>, ArrayJobError> {
    serde_json::from_str(array_job_id).map_err(ArrayJobError::InvalidId)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{JobInfo, JobState};

    #[derive(Default)]
    struct RecordingTracker {
        templates: Mutex<Vec<JobTemplate>>,
        fail_after: Option<usize>,
    }

    impl JobTracker for RecordingTracker {
        fn list_job_categories(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn list_jobs(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn add_job(&self, template: &JobTemplate) -> Result<String> {
            let mut templates = self.templates.lock().unwrap();
            if Some(templates.len()) == self.fail_after {
                return Err("quota exceeded".into());
            }
            templates.push(template.clone());
            Ok(format!("job-{}", templates.len()))
        }

        fn add_array_job(&self, t: &JobTemplate, b: u32, e: u32, s: u32, _: u32) -> Result<String> {
            add_as_single_jobs(self, t, b, e, s)
        }

        fn list_array_jobs(&self, id: &str) -> Result<Vec<String>> {
            Ok(split_id(id)?)
        }

        fn job_state(&self, _: &str) -> Result<(JobState, String)> {
            Ok((JobState::Undetermined, String::new()))
        }

        fn job_info(&self, _: &str) -> Result<JobInfo> {
            Ok(JobInfo::default())
        }

        fn job_control(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }

        fn wait(&self, _: &str, _: std::time::Duration, _: &[JobState]) -> Result<()> {
            Ok(())
        }

        fn delete_job(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn task_indices_honor_step() {
        assert_eq!(task_indices(1, 3, 1).unwrap().collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(task_indices(1, 10, 4).unwrap().collect::<Vec<_>>(), [1, 5, 9]);
        assert_eq!(task_indices(7, 7, 3).unwrap().collect::<Vec<_>>(), [7]);
        assert!(matches!(task_indices(1, 3, 0), Err(ArrayJobError::ZeroStep)));
        assert!(matches!(
            task_indices(3, 1, 1),
            Err(ArrayJobError::EmptyRange { begin: 3, end: 1 })
        ));
    }

    #[test]
    fn submits_one_job_per_task() {
        let tracker = RecordingTracker::default();
        let template = JobTemplate {
            job_name: Some("sweep".to_string()),
            ..Default::default()
        };

        let id = tracker.add_array_job(&template, 1, 3, 1, 0).unwrap();
        assert_eq!(
            tracker.list_array_jobs(&id).unwrap(),
            ["job-1", "job-2", "job-3"]
        );

        let templates = tracker.templates.lock().unwrap();
        let names: Vec<_> = templates
            .iter()
            .map(|t| t.job_name.as_deref().unwrap())
            .collect();
        assert_eq!(names, ["sweep-1", "sweep-2", "sweep-3"]);
        let task_ids: Vec<_> = templates
            .iter()
            .map(|t| t.job_environment[TASK_ID_ENV].as_str())
            .collect();
        assert_eq!(task_ids, ["1", "2", "3"]);
    }

    #[test]
    fn submission_errors_surface_unchanged() {
        let tracker = RecordingTracker {
            fail_after: Some(2),
            ..Default::default()
        };
        let error = tracker
            .add_array_job(&JobTemplate::default(), 1, 5, 1, 0)
            .unwrap_err();
        assert_eq!(error.to_string(), "quota exceeded");
        assert_eq!(tracker.templates.lock().unwrap().len(), 2);
    }

    #[test]
    fn overlong_task_names_submit_nothing() {
        let tracker = RecordingTracker::default();
        // "-9" still fits, "-100" does not.
        let template = JobTemplate {
            job_name: Some("n".repeat(60)),
            ..Default::default()
        };
        let error = tracker.add_array_job(&template, 1, 100, 1, 0).unwrap_err();
        assert_eq!(
            error.to_string(),
            format!(
                "array job task name \"{}-100\" is longer than 63 characters",
                "n".repeat(60)
            )
        );
        assert!(tracker.templates.lock().unwrap().is_empty());

        // The step decides which index comes last.
        tracker.add_array_job(&template, 1, 100, 50, 0).unwrap();
        let templates = tracker.templates.lock().unwrap();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[1].job_name.as_deref().map(str::len), Some(63));
    }

    #[test]
    fn split_id_rejects_garbage() {
        assert_eq!(split_id("[]").unwrap(), Vec::<String>::new());
        assert_eq!(split_id(&join_id(&["a".to_string()])).unwrap(), ["a"]);
        assert!(matches!(split_id("job-1"), Err(ArrayJobError::InvalidId(_))));
    }
}

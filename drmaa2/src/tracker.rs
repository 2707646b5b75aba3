use std::{any::Any, collections::HashMap, fmt, time::Duration};

use log::debug;

use crate::{JobInfo, JobState, JobTemplate, Result};

/// The operations a backend implements to run the jobs of one job session.
///
/// Implementations do not keep job state of their own. Every call reflects what the backend reports at the time of
/// the call.
pub trait JobTracker: Send + Sync {
    fn list_job_categories(&self) -> Result<Vec<String>>;

    /// Returns the ids of all jobs that belong to the job session.
    fn list_jobs(&self) -> Result<Vec<String>>;

    /// Submits a job and returns its id.
    fn add_job(&self, template: &JobTemplate) -> Result<String>;

    /// Submits one job per index in `begin..=end` with the given step and returns the id of the array job.
    fn add_array_job(
        &self,
        template: &JobTemplate,
        begin: u32,
        end: u32,
        step: u32,
        max_parallel: u32,
    ) -> Result<String>;

    /// Returns the ids of the jobs that make up an array job.
    fn list_array_jobs(&self, array_job_id: &str) -> Result<Vec<String>>;

    /// Returns the state of a job together with a backend specific sub-state.
    fn job_state(&self, job_id: &str) -> Result<(JobState, String)>;

    fn job_info(&self, job_id: &str) -> Result<JobInfo>;

    /// Applies one of the actions `suspend`, `resume`, `hold`, `release` or `terminate`.
    fn job_control(&self, job_id: &str, action: &str) -> Result<()>;

    /// Blocks until the job is in one of `states` or `timeout` has passed, in which case an error is returned.
    fn wait(&self, job_id: &str, timeout: Duration, states: &[JobState]) -> Result<()>;

    fn delete_job(&self, job_id: &str) -> Result<()>;
}

/// Backend specific parameters handed to an [`Allocator`], e.g. a client that has already been configured.
pub type InitParams = Box<dyn Any + Send>;

/// Creates job trackers for a backend.
pub trait Allocator: Send + Sync {
    /// Creates a tracker for the job session `session_name`. Allocators document which type they accept as
    /// `init_params` and fail if they receive anything else.
    fn allocate(
        &self,
        session_name: &str,
        init_params: Option<InitParams>,
    ) -> Result<Box<dyn JobTracker>>;
}

#[derive(Debug)]
pub struct UnknownBackend(pub String);

impl std::error::Error for UnknownBackend {}

impl fmt::Display for UnknownBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no job tracker registered for backend {:?}", self.0)
    }
}

/// Maps backend names to allocators. The application registers the backends it supports at startup and looks them
/// up when a job session is opened.
#[derive(Default)]
pub struct Registry {
    allocators: HashMap<String, Box<dyn Allocator>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `allocator` for `backend`, returning the allocator previously registered under that name.
    pub fn register(
        &mut self,
        backend: impl Into<String>,
        allocator: impl Allocator + 'static,
    ) -> Option<Box<dyn Allocator>> {
        let backend = backend.into();
        debug!("registering job tracker allocator for backend {backend:?}");
        self.allocators.insert(backend, Box::new(allocator))
    }

    pub fn backends(&self) -> impl Iterator<Item = &str> {
        self.allocators.keys().map(String::as_str)
    }

    pub fn allocate(
        &self,
        backend: &str,
        session_name: &str,
        init_params: Option<InitParams>,
    ) -> Result<Box<dyn JobTracker>> {
        let allocator = self
            .allocators
            .get(backend)
            .ok_or_else(|| UnknownBackend(backend.to_string()))?;
        allocator.allocate(session_name, init_params)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.allocators.keys()).finish()
    }
}

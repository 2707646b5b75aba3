//! The Kubernetes job tracker. Every job of a job session is a Job labeled with the session name.

use std::{fmt, time::Duration};

use drmaa2::{array_job, wait::Poller, Allocator, InitParams, JobInfo, JobState, JobTemplate, JobTracker};
use log::{debug, info, warn};

use crate::{
    control::{self, Action},
    convert::{self, JobSpecArgs},
    kubectl::{self, Job, Kubectl, SESSION_LABEL},
    state,
    store::{Forbidden, Scope, WorkloadStore},
    Result,
};

/// The backend name under which hosts register [`KubernetesAllocator`].
pub const BACKEND: &str = "kubernetes";

pub const DEFAULT_NAMESPACE: &str = "default";

/// Wraps a failed operation with a short description of what was attempted.
#[derive(Debug)]
pub struct TrackerError {
    context: &'static str,
    source: drmaa2::Error,
}

impl TrackerError {
    fn wrap<E: Into<drmaa2::Error>>(context: &'static str) -> impl FnOnce(E) -> Self {
        move |source| Self {
            context,
            source: source.into(),
        }
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.source)
    }
}

impl std::error::Error for TrackerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

#[derive(Debug)]
pub struct JobNotFound(pub String);

impl std::error::Error for JobNotFound {}

impl fmt::Display for JobNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job {:?} does not exist in this job session", self.0)
    }
}

#[derive(Debug)]
pub struct InvalidJobId(pub String);

impl std::error::Error for InvalidJobId {}

impl fmt::Display for InvalidJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job id {:?} is neither a Job name nor `<namespace>/<name>` with RFC 1123 labels",
            self.0
        )
    }
}

#[derive(Debug)]
pub struct InvalidSessionName(pub String);

impl std::error::Error for InvalidSessionName {}

impl fmt::Display for InvalidSessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job session name {:?} can not be used as a label value, use at most 63 alphanumeric characters, '-', '_' or '.' starting and ending with an alphanumeric character",
            self.0
        )
    }
}

#[derive(Debug)]
pub struct InitParamsError;

impl std::error::Error for InitParamsError {}

impl fmt::Display for InitParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("job tracker init params are not a `Kubectl` client")
    }
}

/// Where a job lives. Jobs in the tracker's namespace are known by their name, jobs placed elsewhere through the
/// namespace extension by `<namespace>/<name>`.
#[derive(Debug, PartialEq, Eq)]
struct JobRef<'a> {
    namespace: &'a str,
    name: &'a str,
}

pub struct KubernetesTracker<S = Kubectl> {
    store: S,
    session: String,
    namespace: String,
    job_owner: Option<String>,
    poller: Poller,
}

impl<S: WorkloadStore> KubernetesTracker<S> {
    pub fn new(session: impl Into<String>, store: S) -> Result<Self, InvalidSessionName> {
        let session = session.into();
        if session.is_empty() || !kubectl::is_label_value(&session) {
            return Err(InvalidSessionName(session));
        }
        Ok(Self {
            store,
            session,
            namespace: DEFAULT_NAMESPACE.to_owned(),
            job_owner: Some(whoami::username()),
            poller: Poller::default(),
        })
    }

    /// Sets the namespace jobs are created in unless their template says otherwise.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_job_owner(mut self, job_owner: Option<String>) -> Self {
        self.job_owner = job_owner;
        self
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn label_selector(&self) -> String {
        format!("{SESSION_LABEL}={}", self.session)
    }

    /// Splits a job id into where the Job lives. Ids that are not valid names are rejected before they reach the
    /// cluster client, so they can never be taken for command line flags.
    fn job_ref<'a>(&'a self, job_id: &'a str) -> Result<JobRef<'a>, InvalidJobId> {
        let job_ref = match job_id.split_once('/') {
            Some((namespace, name)) => JobRef { namespace, name },
            None => JobRef {
                namespace: &self.namespace,
                name: job_id,
            },
        };
        if kubectl::is_rfc_1123_label(job_ref.namespace) && kubectl::is_rfc_1123_label(job_ref.name) {
            Ok(job_ref)
        } else {
            Err(InvalidJobId(job_id.to_owned()))
        }
    }

    fn job_id(&self, namespace: &str, name: &str) -> String {
        if namespace == self.namespace {
            name.to_owned()
        } else {
            format!("{namespace}/{name}")
        }
    }

    fn is_listed(&self, job: &Job) -> bool {
        job.metadata.label(SESSION_LABEL) == Some(self.session.as_str()) && !job.is_terminating()
    }

    /// Fetches a Job of this session. Jobs of other sessions and Jobs being deleted are reported as missing.
    fn lookup(&self, job_id: &str) -> Result<Job> {
        let JobRef { namespace, name } = self.job_ref(job_id)?;
        self.store
            .get_job(namespace, name)?
            .filter(|job| self.is_listed(job))
            .ok_or_else(|| JobNotFound(job_id.to_owned()).into())
    }

    /// Lists across namespaces. Clients that may only list within a namespace fall back to the tracker's namespace.
    fn session_jobs(&self) -> Result<Vec<Job>> {
        let selector = self.label_selector();
        match self.store.list_jobs(Scope::AllNamespaces, &selector) {
            Err(error) if error.is::<Forbidden>() => {
                warn!(
                    "listing jobs in namespace {:?} only, listing across namespaces failed: {error}",
                    self.namespace
                );
                self.store
                    .list_jobs(Scope::Namespace(&self.namespace), &selector)
            }
            result => result,
        }
    }
}

impl<S: WorkloadStore> JobTracker for KubernetesTracker<S> {
    fn list_job_categories(&self) -> drmaa2::Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn list_jobs(&self) -> drmaa2::Result<Vec<String>> {
        let jobs = self
            .session_jobs()
            .map_err(TrackerError::wrap("listing jobs"))?;
        Ok(jobs
            .iter()
            .filter(|job| self.is_listed(job))
            .map(|job| self.job_id(&job.metadata.namespace, &job.metadata.name))
            .collect())
    }

    fn add_job(&self, template: &JobTemplate) -> drmaa2::Result<String> {
        let job = convert::job_spec(
            &JobSpecArgs {
                session: &self.session,
                namespace: &self.namespace,
                job_owner: self.job_owner.as_deref(),
                now: time::OffsetDateTime::now_utc(),
            },
            template,
        )
        .map_err(TrackerError::wrap("converting job template into a k8s job"))?;

        let handle = self
            .store
            .create_job(&job)
            .map_err(TrackerError::wrap("creating new job"))?;

        info!(
            "created Job {}/{} for job session {:?}",
            handle.namespace, handle.name, self.session
        );
        Ok(self.job_id(&handle.namespace, &handle.name))
    }

    fn add_array_job(
        &self,
        template: &JobTemplate,
        begin: u32,
        end: u32,
        step: u32,
        max_parallel: u32,
    ) -> drmaa2::Result<String> {
        if max_parallel != 0 {
            debug!("ignoring max_parallel {max_parallel}, every task is submitted right away");
        }
        array_job::add_as_single_jobs(self, template, begin, end, step)
    }

    fn list_array_jobs(&self, array_job_id: &str) -> drmaa2::Result<Vec<String>> {
        Ok(array_job::split_id(array_job_id)?)
    }

    /// Never fails. When the Job can not be read the state is undetermined and the sub-state tells why.
    fn job_state(&self, job_id: &str) -> drmaa2::Result<(JobState, String)> {
        match self.lookup(job_id) {
            Ok(job) => Ok(state::job_state(&job)),
            Err(error) => {
                warn!("state of job {job_id:?} is undetermined: {error}");
                Ok((JobState::Undetermined, error.to_string()))
            }
        }
    }

    fn job_info(&self, job_id: &str) -> drmaa2::Result<JobInfo> {
        let job = self
            .lookup(job_id)
            .map_err(TrackerError::wrap("job info"))?;
        Ok(state::job_info(job_id.to_owned(), &job))
    }

    fn job_control(&self, job_id: &str, action: &str) -> drmaa2::Result<()> {
        let action: Action = action.parse().map_err(TrackerError::wrap("job control"))?;
        let job = self
            .lookup(job_id)
            .map_err(TrackerError::wrap("job control"))?;
        control::apply(&self.store, &job, action).map_err(TrackerError::wrap("job control"))?;
        Ok(())
    }

    fn wait(&self, job_id: &str, timeout: Duration, states: &[JobState]) -> drmaa2::Result<()> {
        Ok(self
            .poller
            .wait_for_state(self, job_id, timeout, states)?)
    }

    fn delete_job(&self, job_id: &str) -> drmaa2::Result<()> {
        let job = self
            .lookup(job_id)
            .map_err(TrackerError::wrap("deleting job"))?;
        self.store
            .delete_job(&job.metadata.namespace, &job.metadata.name)
            .map_err(TrackerError::wrap("deleting job"))?;
        info!(
            "deleted Job {}/{} of job session {:?}",
            job.metadata.namespace, job.metadata.name, self.session
        );
        Ok(())
    }
}

/// Creates [`KubernetesTracker`]s. Accepts a [`Kubectl`] as init params, otherwise uses the ambient cluster
/// configuration.
#[derive(Debug, Clone)]
pub struct KubernetesAllocator {
    namespace: String,
    poller: Poller,
}

impl Default for KubernetesAllocator {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            poller: Poller::default(),
        }
    }
}

impl KubernetesAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    pub fn tracker(
        &self,
        session_name: &str,
        init_params: Option<InitParams>,
    ) -> Result<KubernetesTracker<Kubectl>> {
        let kubectl = match init_params {
            Some(params) => *params.downcast::<Kubectl>().map_err(|_| InitParamsError)?,
            None => Kubectl::from_ambient()?,
        };
        Ok(KubernetesTracker::new(session_name, kubectl)?
            .with_namespace(self.namespace.clone())
            .with_poller(self.poller))
    }
}

impl Allocator for KubernetesAllocator {
    fn allocate(
        &self,
        session_name: &str,
        init_params: Option<InitParams>,
    ) -> drmaa2::Result<Box<dyn JobTracker>> {
        Ok(Box::new(self.tracker(session_name, init_params)?))
    }
}

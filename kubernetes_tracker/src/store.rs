//! The cluster operations the tracker needs, independent of how they reach the cluster.

use std::fmt;

use kubernetes::models as k8s;

use crate::{
    kubectl::{Job, Kubectl, ResourceHandle},
    Result,
};

/// Where to list Jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    AllNamespaces,
    Namespace(&'a str),
}

/// The caller is not allowed to perform the operation, e.g. listing Jobs at the cluster scope with namespaced RBAC.
#[derive(Debug)]
pub struct Forbidden(pub String);

impl std::error::Error for Forbidden {}

impl fmt::Display for Forbidden {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait WorkloadStore: Send + Sync {
    /// Creates the Job and returns where it was created. The name is assigned by the cluster when the Job only
    /// carries a `generateName`.
    fn create_job(&self, job: &k8s::V1Job) -> Result<ResourceHandle>;

    /// Lists the Jobs in the scope that match a label selector. Fails with [`Forbidden`] when listing in that scope
    /// is not permitted.
    fn list_jobs(&self, scope: Scope, label_selector: &str) -> Result<Vec<Job>>;

    /// Returns `None` if the Job does not exist.
    fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>>;

    fn set_job_suspended(&self, namespace: &str, name: &str, suspend: bool) -> Result<()>;

    /// Deletes the Job together with its pods.
    fn delete_job(&self, namespace: &str, name: &str) -> Result<()>;
}

impl WorkloadStore for Kubectl {
    fn create_job(&self, job: &k8s::V1Job) -> Result<ResourceHandle> {
        self.create(&serde_json::to_string(job)?)
    }

    fn list_jobs(&self, scope: Scope, label_selector: &str) -> Result<Vec<Job>> {
        self.jobs_with_selector(scope, label_selector)
    }

    fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        self.try_get_job(namespace, name)
    }

    fn set_job_suspended(&self, namespace: &str, name: &str, suspend: bool) -> Result<()> {
        self.patch_job(
            namespace,
            name,
            &serde_json::json!({ "spec": { "suspend": suspend } }),
        )
    }

    fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
        Kubectl::delete_job(self, namespace, name)
    }
}

/// Keeps Jobs in memory the way the API server would store them, without a controller acting on them. Tests drive
/// status changes explicitly.
#[cfg(test)]
pub(crate) mod memory {
    use std::{
        collections::BTreeMap,
        sync::{Mutex, MutexGuard},
    };

    use super::*;
    use crate::kubectl::{JobSpec, JobStatus, ResourceMetadata};

    pub struct StoredJob {
        pub spec: k8s::V1Job,
        pub job: Job,
    }

    #[derive(Default)]
    pub struct MemoryStore {
        jobs: Mutex<BTreeMap<(String, String), StoredJob>>,
        generated: Mutex<u32>,
        cluster_scope_forbidden: bool,
    }

    impl MemoryStore {
        /// A store whose caller may only list Jobs namespace by namespace.
        pub fn namespaced() -> Self {
            Self {
                cluster_scope_forbidden: true,
                ..Default::default()
            }
        }

        /// Marks the Job as being deleted while it still exists, e.g. while finalizers run.
        pub fn mark_terminating(&self, namespace: &str, name: &str) {
            let mut jobs = self.jobs();
            let stored = jobs
                .get_mut(&(namespace.to_string(), name.to_string()))
                .expect("job exists");
            stored.job.metadata.deletion_timestamp = Some(time::OffsetDateTime::now_utc());
        }

        pub fn jobs(&self) -> MutexGuard<'_, BTreeMap<(String, String), StoredJob>> {
            self.jobs.lock().unwrap()
        }

        pub fn update_status(&self, namespace: &str, name: &str, f: impl FnOnce(&mut JobStatus)) {
            let mut jobs = self.jobs();
            let stored = jobs
                .get_mut(&(namespace.to_string(), name.to_string()))
                .expect("job exists");
            f(&mut stored.job.status);
        }
    }

    /// Supports equality based selectors joined by commas.
    fn matches_selector(job: &Job, label_selector: &str) -> bool {
        label_selector
            .split(',')
            .filter(|requirement| !requirement.is_empty())
            .all(|requirement| match requirement.split_once('=') {
                Some((key, value)) => job.metadata.label(key) == Some(value),
                None => job.metadata.labels.contains_key(requirement),
            })
    }

    impl WorkloadStore for MemoryStore {
        fn create_job(&self, spec: &k8s::V1Job) -> Result<ResourceHandle> {
            let metadata = spec.metadata.as_deref().ok_or("Job has no metadata")?;
            let namespace = metadata
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string());
            let name = match (&metadata.name, &metadata.generate_name) {
                (Some(name), _) => name.clone(),
                (None, Some(prefix)) => {
                    let mut generated = self.generated.lock().unwrap();
                    *generated += 1;
                    format!("{prefix}{:05}", *generated)
                }
                (None, None) => return Err("Job has neither name nor generateName".into()),
            };

            let mut jobs = self.jobs();
            let key = (namespace.clone(), name.clone());
            if jobs.contains_key(&key) {
                return Err(format!("jobs.batch {name:?} already exists").into());
            }

            let job = Job {
                metadata: ResourceMetadata {
                    name: name.clone(),
                    namespace: namespace.clone(),
                    creation_timestamp: time::OffsetDateTime::now_utc(),
                    deletion_timestamp: None,
                    labels: metadata.labels.clone().unwrap_or_default().into_iter().collect(),
                    annotations: metadata
                        .annotations
                        .clone()
                        .unwrap_or_default()
                        .into_iter()
                        .collect(),
                    generate_name: metadata.generate_name.clone(),
                },
                spec: JobSpec {
                    suspend: spec.spec.as_ref().and_then(|spec| spec.suspend),
                    active_deadline_seconds: spec
                        .spec
                        .as_ref()
                        .and_then(|spec| spec.active_deadline_seconds),
                    backoff_limit: spec.spec.as_ref().and_then(|spec| spec.backoff_limit),
                },
                status: JobStatus::default(),
            };
            jobs.insert(
                key,
                StoredJob {
                    spec: spec.clone(),
                    job,
                },
            );

            Ok(ResourceHandle { namespace, name })
        }

        fn list_jobs(&self, scope: Scope, label_selector: &str) -> Result<Vec<Job>> {
            if scope == Scope::AllNamespaces && self.cluster_scope_forbidden {
                return Err(Forbidden(
                    "jobs.batch is forbidden: cannot list resource \"jobs\" at the cluster scope"
                        .to_string(),
                )
                .into());
            }
            Ok(self
                .jobs()
                .values()
                .filter(|stored| match scope {
                    Scope::AllNamespaces => true,
                    Scope::Namespace(namespace) => stored.job.metadata.namespace == namespace,
                })
                .filter(|stored| matches_selector(&stored.job, label_selector))
                .map(|stored| stored.job.clone())
                .collect())
        }

        fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
            Ok(self
                .jobs()
                .get(&(namespace.to_string(), name.to_string()))
                .map(|stored| stored.job.clone()))
        }

        fn set_job_suspended(&self, namespace: &str, name: &str, suspend: bool) -> Result<()> {
            let mut jobs = self.jobs();
            let stored = jobs
                .get_mut(&(namespace.to_string(), name.to_string()))
                .ok_or_else(|| format!("jobs.batch {name:?} not found"))?;
            stored.job.spec.suspend = Some(suspend);
            Ok(())
        }

        fn delete_job(&self, namespace: &str, name: &str) -> Result<()> {
            self.jobs()
                .remove(&(namespace.to_string(), name.to_string()))
                .map(|_| ())
                .ok_or_else(|| format!("jobs.batch {name:?} not found").into())
        }
    }
}

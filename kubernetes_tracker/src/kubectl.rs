use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
};

use log::{debug, error};

use crate::{
    process,
    store::{Forbidden, Scope},
    Result,
};

mod common;
pub use common::*;

mod job;
pub use job::*;

mod name;
pub use name::*;

/// Where `kubectl` reads the service account token from when running inside a pod.
const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// How to reach the cluster. Fields left unset fall back to what `kubectl` resolves by itself.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KubectlConfig {
    /// The `kubectl` binary, looked up in `PATH` when not set.
    pub program: Option<PathBuf>,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    /// Neither `$KUBECONFIG`, `~/.kube/config` nor an in-cluster service account are available.
    NoConfiguration,
    MissingKubeconfig(PathBuf),
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoConfiguration => f.write_str(
                "no cluster configuration found, set $KUBECONFIG, create ~/.kube/config or run inside a pod with a service account",
            ),
            ConfigError::MissingKubeconfig(path) => {
                write!(f, "kubeconfig {} does not exist", path.display())
            }
        }
    }
}

/// The ambient configuration sources `kubectl` consults, captured so that the lookup can be tested.
#[derive(Debug, Default)]
struct Ambient {
    kubeconfig_env: Option<OsString>,
    home_dir: Option<PathBuf>,
    in_cluster: bool,
}

impl Ambient {
    fn from_env() -> Self {
        Self {
            kubeconfig_env: std::env::var_os("KUBECONFIG").filter(|value| !value.is_empty()),
            home_dir: home::home_dir(),
            in_cluster: std::env::var_os("KUBERNETES_SERVICE_HOST").is_some()
                && Path::new(SERVICE_ACCOUNT_TOKEN).exists(),
        }
    }

    fn resolve(self) -> Result<KubectlConfig, ConfigError> {
        if self.kubeconfig_env.is_some() {
            // `kubectl` picks up `$KUBECONFIG` itself. It may list several files.
            return Ok(KubectlConfig::default());
        }

        if let Some(path) = self
            .home_dir
            .map(|home| home.join(".kube").join("config"))
            .filter(|path| path.exists())
        {
            return Ok(KubectlConfig {
                kubeconfig: Some(path),
                ..Default::default()
            });
        }

        if self.in_cluster {
            return Ok(KubectlConfig::default());
        }

        Err(ConfigError::NoConfiguration)
    }
}

/// A cluster client that drives `kubectl` and parses its JSON output.
#[derive(Debug, Clone)]
pub struct Kubectl {
    config: KubectlConfig,
}

impl Kubectl {
    pub fn new(config: KubectlConfig) -> Self {
        Self { config }
    }

    /// Creates a client from the configuration `kubectl` would find in the environment of this process.
    pub fn from_ambient() -> Result<Self, ConfigError> {
        let config = Ambient::from_env().resolve()?;
        debug!("using ambient cluster configuration {config:?}");
        Ok(Self::new(config))
    }

    /// Creates a client from an explicit configuration, checking that a given kubeconfig exists.
    pub fn from_config(config: KubectlConfig) -> Result<Self, ConfigError> {
        if let Some(path) = config.kubeconfig.as_ref() {
            if !path.exists() {
                return Err(ConfigError::MissingKubeconfig(path.clone()));
            }
        }
        Ok(Self::new(config))
    }

    /// Returns the kubectl command where the connection arguments have already been set.
    fn kubectl(&self) -> process::Command {
        let KubectlConfig {
            program,
            kubeconfig,
            context,
        } = &self.config;

        let mut args: Vec<OsString> = Vec::new();
        if let Some(kubeconfig) = kubeconfig {
            let mut arg = OsString::from("--kubeconfig=");
            arg.push(kubeconfig);
            args.push(arg);
        }
        if let Some(context) = context {
            args.push(format!("--context={context}").into());
        }

        process::Command::new(program.as_deref().unwrap_or(Path::new("kubectl"))).args(args)
    }

    /// The input is written to stdin and should be a [YAML or JSON formatted kubernetes
    /// configuration](https://kubernetes.io/docs/tasks/manage-kubernetes-objects/imperative-config/).
    pub fn create(&self, input: &str) -> Result<ResourceHandle> {
        let output = self
            .kubectl()
            .args(["create", "--output=json", "-f", "-"])
            .try_output_with_input(input.as_bytes().to_owned())?;

        if log::log_enabled!(log::Level::Error) && !output.status.success() {
            let path = crate::temp_path::tmp_path("json");
            if std::fs::write(&path, input).is_ok() {
                error!(
                    "kubectl rejected the Job spec, it has been written to {}",
                    path.display()
                );
            }
        }

        let output = output.require_success()?;

        let root: CreateOutput = serde_json::from_slice(&output.stdout)?;

        Ok(root.into())
    }

    /// Lists the Jobs in the given scope that match the label selector. Fails with [`Forbidden`] when the caller may
    /// not list Jobs in that scope.
    pub fn jobs_with_selector(&self, scope: Scope, label_selector: &str) -> Result<Vec<Job>> {
        let scope_args: Vec<&str> = match scope {
            Scope::AllNamespaces => vec!["--all-namespaces"],
            Scope::Namespace(namespace) => vec!["--namespace", namespace],
        };
        let output = self
            .kubectl()
            .args(["get", "jobs", "--output=json"])
            .args(scope_args)
            .args([format!("--selector={label_selector}")])
            .try_output()?;

        match output.require_success() {
            Ok(output) => Ok(serde_json::from_slice::<GetResource<_>>(&output.stdout)?.items),
            Err(error) if server_error_reason(&error) == Some("Forbidden") => {
                Err(Forbidden(error.to_string()).into())
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn try_get_job(&self, namespace: &str, job_name: &str) -> Result<Option<Job>> {
        let output = self
            .kubectl()
            .args(["get", "job", "--namespace", namespace, "--output=json", "--", job_name])
            .try_output()?;

        match output.require_success() {
            Ok(output) => Ok(Some(serde_json::from_slice(&output.stdout)?)),
            Err(error) if server_error_reason(&error) == Some("NotFound") => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Applies a JSON merge patch to a Job.
    pub fn patch_job(
        &self,
        namespace: &str,
        job_name: &str,
        patch: &serde_json::Value,
    ) -> Result<()> {
        self.kubectl()
            .args(["patch", "job", "--namespace", namespace, "--type=merge"])
            .args([format!("--patch={patch}")])
            .args(["--", job_name])
            .output()?;
        Ok(())
    }

    /// Deletes a Job. Its pods are removed by the garbage collector afterwards.
    pub fn delete_job(&self, namespace: &str, job_name: &str) -> Result<()> {
        self.kubectl()
            .args([
                "delete",
                "job",
                "--namespace",
                namespace,
                "--cascade=background",
                "--wait=false",
                "--",
                job_name,
            ])
            .output()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    pub namespace: String,
    pub name: String,
}

impl From<CreateOutput> for ResourceHandle {
    fn from(value: CreateOutput) -> Self {
        let CreateOutputMetadata { namespace, name } = value.metadata;
        Self { namespace, name }
    }
}

#[derive(serde::Deserialize)]
struct CreateOutput {
    metadata: CreateOutputMetadata,
}

#[derive(serde::Deserialize)]
struct CreateOutputMetadata {
    namespace: String,
    name: String,
}

/// Returns the reason of an error the API server reported through kubectl, e.g. `NotFound` or `Forbidden`.
fn server_error_reason(error: &process::Error) -> Option<&str> {
    match &error.kind {
        process::ErrorKind::NonZeroExitStatus { stderr, .. } => stderr
            .strip_prefix("Error from server (")?
            .split_once("): ")
            .map(|(reason, _)| reason),
        _ => None,
    }
}

/// The label that scopes Jobs to a job session.
pub const SESSION_LABEL: &str = "drmaa2jobsession";

pub mod annotation {
    pub const VERSION: &str = "drmaa2.org/tracker-version";
    pub const JOB_OWNER: &str = "drmaa2.org/job-owner";
}

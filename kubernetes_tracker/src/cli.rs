mod list;
mod submit;

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use constcat::concat;
use drmaa2::{wait::Poller, JobState, JobTracker, Registry};
use itertools::Itertools;
use log::debug;

use crate::{
    control::Action,
    kubectl::{Kubectl, KubectlConfig, SESSION_LABEL},
    tracker::{self, KubernetesAllocator},
    Result,
};

const SESSION_ENV: &str = "DRMAA2_SESSION";
const NAMESPACE_ENV: &str = "DRMAA2_NAMESPACE";

/// Parses a number of seconds, fractions allowed.
fn seconds(value: &str) -> Result<Duration> {
    Ok(Duration::try_from_secs_f64(value.parse()?)?)
}

#[derive(Debug, Parser)]
#[command(version = crate::version::VERSION, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long = "session", global = true, env = SESSION_ENV, help = concat!("The job session to operate on. Jobs are labeled `", SESSION_LABEL, "=<session>`."))]
    session: Option<String>,

    /// The namespace jobs are created in unless a template sets the namespace extension.
    #[arg(long = "namespace", global = true, env = NAMESPACE_ENV, default_value = tracker::DEFAULT_NAMESPACE)]
    namespace: String,

    /// The kubeconfig to use instead of the ambient configuration.
    #[arg(long = "kubeconfig", global = true)]
    kubeconfig: Option<PathBuf>,

    /// The kubeconfig context to use.
    #[arg(long = "context", global = true)]
    context: Option<String>,

    /// The kubectl binary to run.
    #[arg(long = "kubectl", global = true)]
    kubectl: Option<PathBuf>,

    /// How often to query the job state while waiting, in seconds.
    #[arg(long = "poll-interval", global = true, value_parser = seconds, default_value = "1")]
    poll_interval: Duration,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the job categories the backend offers
    Categories,

    /// List the jobs of the job session
    List,

    /// Submit a job
    Submit(submit::SubmitArgs),

    /// Submit an array job, one job per task
    SubmitArray(submit::SubmitArrayArgs),

    /// List the jobs of an array job
    #[command(arg_required_else_help = true)]
    ArrayJobs { array_job_id: String },

    /// Print the state of a job
    #[command(arg_required_else_help = true)]
    State { job_id: String },

    /// Print everything known about a job
    #[command(arg_required_else_help = true)]
    Info { job_id: String },

    /// Suspend, resume, hold, release or terminate a job
    #[command(arg_required_else_help = true)]
    Control { job_id: String, action: Action },

    /// Wait until a job reaches one of the given states
    #[command(arg_required_else_help = true)]
    Wait {
        job_id: String,

        /// Give up after this many seconds. Waits indefinitely when not set.
        #[arg(long = "timeout", value_parser = seconds)]
        timeout: Option<Duration>,

        /// The states to wait for. Defaults to the terminal states.
        #[arg(long = "state", num_args = 1..)]
        states: Vec<JobState>,
    },

    /// Delete a job and its pods
    #[command(arg_required_else_help = true)]
    Delete { job_id: String },
}

impl Cli {
    fn kubectl_config(&self) -> KubectlConfig {
        KubectlConfig {
            program: self.kubectl.clone(),
            kubeconfig: self.kubeconfig.clone(),
            context: self.context.clone(),
        }
    }

    fn job_tracker(&self) -> Result<Box<dyn JobTracker>> {
        let session = self.session.as_deref().ok_or(concat!(
            "no job session given, pass --session or set $",
            SESSION_ENV
        ))?;

        let mut registry = Registry::new();
        registry.register(
            tracker::BACKEND,
            KubernetesAllocator::new()
                .with_namespace(self.namespace.clone())
                .with_poller(Poller::new(self.poll_interval)),
        );

        let config = self.kubectl_config();
        let init_params: Option<drmaa2::InitParams> = if config == KubectlConfig::default() {
            None
        } else {
            debug!("using cluster configuration {config:?}");
            Some(Box::new(Kubectl::from_config(config)?))
        };

        Ok(registry.allocate(tracker::BACKEND, session, init_params)?)
    }

    pub fn run(self) -> Result<()> {
        let tracker = self.job_tracker()?;
        let tracker = tracker.as_ref();

        match self.command {
            Commands::Categories => {
                for category in tracker.list_job_categories()? {
                    println!("{category}");
                }
            }
            Commands::List => {
                list::list(tracker)?;
            }
            Commands::Submit(args) => {
                println!("{}", submit::submit(tracker, args)?);
            }
            Commands::SubmitArray(args) => {
                println!("{}", submit::submit_array(tracker, args)?);
            }
            Commands::ArrayJobs { array_job_id } => {
                for job_id in tracker.list_array_jobs(&array_job_id)? {
                    println!("{job_id}");
                }
            }
            Commands::State { job_id } => {
                let (state, sub_state) = tracker.job_state(&job_id)?;
                if sub_state.is_empty() {
                    println!("{state}");
                } else {
                    println!("{state} ({sub_state})");
                }
            }
            Commands::Info { job_id } => {
                list::info(tracker, &job_id)?;
            }
            Commands::Control { job_id, action } => {
                tracker.job_control(&job_id, action.as_str())?;
            }
            Commands::Wait {
                job_id,
                timeout,
                states,
            } => {
                let states = if states.is_empty() {
                    JobState::ALL
                        .into_iter()
                        .filter(JobState::is_terminal)
                        .collect()
                } else {
                    states
                };
                debug!(
                    "waiting for {job_id} to become {}",
                    states.iter().join(" or ")
                );
                tracker.wait(
                    &job_id,
                    timeout.unwrap_or(drmaa2::wait::INFINITE_TIME),
                    &states,
                )?;
                let (state, _) = tracker.job_state(&job_id)?;
                println!("{state}");
            }
            Commands::Delete { job_id } => {
                tracker.delete_job(&job_id)?;
            }
        }

        Ok(())
    }
}

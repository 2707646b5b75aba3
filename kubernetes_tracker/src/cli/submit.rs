use std::path::PathBuf;

use clap::Args;
use constcat::concat;
use drmaa2::{JobTemplate, JobTracker};
use log::debug;

use crate::{convert::extension, Result};

fn key_value(value: &str) -> Result<(String, String), &'static str> {
    value
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or("expected KEY=VALUE")
}

#[derive(Debug, Args)]
pub struct TemplateArgs {
    /// A YAML or JSON job template. Flags override the values it contains.
    #[arg(long = "template")]
    pub template: Option<PathBuf>,

    /// The container image to run, stored as the job category.
    #[arg(long = "image")]
    pub image: Option<String>,

    /// The Job name. Generated from the job session name when not set.
    #[arg(long = "name")]
    pub name: Option<String>,

    /// Submit the job held, it starts once released.
    #[arg(long = "hold", default_value_t)]
    pub hold: bool,

    /// An environment variable for the job, may be repeated.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = key_value)]
    pub env: Vec<(String, String)>,

    #[arg(long = "job-namespace", help = concat!("Create the job in this namespace, sets the `", extension::NAMESPACE, "` extension."))]
    pub job_namespace: Option<String>,

    /// The command to run followed by its arguments.
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl TemplateArgs {
    pub fn into_template(self) -> Result<JobTemplate> {
        let TemplateArgs {
            template,
            image,
            name,
            hold,
            env,
            job_namespace,
            command,
        } = self;

        let mut job_template = match template {
            Some(path) => {
                let contents = std::fs::read_to_string(&path)
                    .map_err(|error| format!("failed to read {}: {error}", path.display()))?;
                serde_yaml::from_str::<JobTemplate>(&contents)
                    .map_err(|error| format!("invalid job template {}: {error}", path.display()))?
            }
            None => JobTemplate::default(),
        };

        if let Some((remote_command, args)) = command.split_first() {
            job_template.remote_command = Some(remote_command.clone());
            job_template.args = args.to_vec();
        }
        if image.is_some() {
            job_template.job_category = image;
        }
        if name.is_some() {
            job_template.job_name = name;
        }
        job_template.submit_as_hold |= hold;
        job_template.job_environment.extend(env);
        if let Some(namespace) = job_namespace {
            job_template
                .extensions
                .insert(extension::NAMESPACE.to_string(), namespace);
        }

        debug!("job template: {job_template:?}");
        Ok(job_template)
    }
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub template: TemplateArgs,
}

pub fn submit(tracker: &dyn JobTracker, args: SubmitArgs) -> Result<String> {
    Ok(tracker.add_job(&args.template.into_template()?)?)
}

#[derive(Debug, Args)]
pub struct SubmitArrayArgs {
    #[arg(long = "begin", default_value_t = 1)]
    pub begin: u32,

    #[arg(long = "end")]
    pub end: u32,

    #[arg(long = "step", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub step: u32,

    /// Accepted for compatibility, all tasks are submitted at once.
    #[arg(long = "max-parallel", default_value_t)]
    pub max_parallel: u32,

    #[command(flatten)]
    pub template: TemplateArgs,
}

pub fn submit_array(tracker: &dyn JobTracker, args: SubmitArrayArgs) -> Result<String> {
    let SubmitArrayArgs {
        begin,
        end,
        step,
        max_parallel,
        template,
    } = args;
    Ok(tracker.add_array_job(&template.into_template()?, begin, end, step, max_parallel)?)
}

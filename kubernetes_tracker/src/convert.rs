//! Turns a job template into a Kubernetes Job.

use std::{collections::HashMap, fmt};

use drmaa2::JobTemplate;
use kubernetes::models as k8s;

use crate::kubectl::{self, annotation, SESSION_LABEL};

/// Job template extensions understood by this tracker.
pub mod extension {
    /// Creates the Job in this namespace instead of the tracker's namespace.
    pub const NAMESPACE: &str = "namespace";
    /// Additional labels for the Job formatted as `key=value,key=value`.
    pub const LABELS: &str = "labels";
}

pub const PRIMARY_CONTAINER_NAME: &str = "main";

const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

#[derive(Debug, PartialEq, Eq)]
pub enum ConversionError {
    MissingJobCategory,
    MissingRemoteCommand,
    InvalidJobName(String),
    InvalidNamespace(String),
    InvalidLabel(String),
    DeadlinePassed(time::OffsetDateTime),
}

impl std::error::Error for ConversionError {}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::MissingJobCategory => {
                f.write_str("job category (the container image) is not set")
            }
            ConversionError::MissingRemoteCommand => f.write_str("remote command is not set"),
            ConversionError::InvalidJobName(name) => write!(
                f,
                "job name {name:?} is not a lowercase RFC 1123 label of at most 63 characters"
            ),
            ConversionError::InvalidNamespace(namespace) => {
                write!(f, "namespace {namespace:?} is not a valid RFC 1123 label")
            }
            ConversionError::InvalidLabel(label) => write!(
                f,
                "invalid label {label:?} in the {:?} extension, expected key=value",
                extension::LABELS
            ),
            ConversionError::DeadlinePassed(deadline) => {
                write!(f, "deadline {deadline} has already passed")
            }
        }
    }
}

/// Everything besides the template that goes into a Job.
pub struct JobSpecArgs<'a> {
    pub session: &'a str,
    pub namespace: &'a str,
    pub job_owner: Option<&'a str>,
    pub now: time::OffsetDateTime,
}

impl JobSpecArgs<'_> {
    fn annotations(&self) -> HashMap<String, String> {
        [
            (annotation::VERSION, Some(crate::version::VERSION)),
            (annotation::JOB_OWNER, self.job_owner),
        ]
        .into_iter()
        .filter_map(|(key, value)| Some((key.to_owned(), value?.to_owned())))
        .collect()
    }
}

/// Parses the labels extension. Entries are separated by commas, keys and values by `=`.
fn parse_labels(value: &str) -> Result<Vec<(String, String)>, ConversionError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((key, value))
                if kubectl::is_label_key(key.trim()) && kubectl::is_label_value(value.trim()) =>
            {
                Ok((key.trim().to_owned(), value.trim().to_owned()))
            }
            _ => Err(ConversionError::InvalidLabel(entry.to_owned())),
        })
        .collect()
}

fn labels(
    args: &JobSpecArgs,
    template: &JobTemplate,
) -> Result<HashMap<String, String>, ConversionError> {
    let mut labels: HashMap<String, String> = template
        .extension(extension::LABELS)
        .map(parse_labels)
        .transpose()?
        .unwrap_or_default()
        .into_iter()
        .collect();
    // The session label scopes every later lookup, the template may not override it.
    labels.insert(SESSION_LABEL.to_owned(), args.session.to_owned());
    Ok(labels)
}

fn env(template: &JobTemplate) -> Option<Vec<k8s::V1EnvVar>> {
    if template.job_environment.is_empty() {
        return None;
    }
    Some(
        template
            .job_environment
            .iter()
            .map(|(name, value)| k8s::V1EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            })
            .collect(),
    )
}

fn resources(template: &JobTemplate) -> Option<k8s::V1ResourceRequirements> {
    let requests = template.min_phys_memory.map(|kibibytes| {
        [("memory".to_owned(), format!("{kibibytes}Ki"))]
            .into_iter()
            .collect()
    });
    let limits = (!template.resource_limits.is_empty()).then(|| {
        template
            .resource_limits
            .iter()
            .map(|(name, quantity)| (name.clone(), quantity.clone()))
            .collect()
    });
    if requests.is_none() && limits.is_none() {
        return None;
    }
    Some(k8s::V1ResourceRequirements {
        requests,
        limits,
        ..Default::default()
    })
}

fn affinity(template: &JobTemplate) -> Option<k8s::V1Affinity> {
    if template.candidate_machines.is_empty() {
        return None;
    }
    Some(k8s::V1Affinity {
        node_affinity: Some(Box::new(k8s::V1NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(Box::new(
                k8s::V1NodeSelector {
                    node_selector_terms: vec![k8s::V1NodeSelectorTerm {
                        match_expressions: Some(vec![k8s::V1NodeSelectorRequirement {
                            key: HOSTNAME_LABEL.to_owned(),
                            operator: "In".to_owned(),
                            values: Some(template.candidate_machines.clone()),
                        }]),
                        ..Default::default()
                    }],
                },
            )),
            ..Default::default()
        })),
        ..Default::default()
    })
}

fn active_deadline_seconds(
    args: &JobSpecArgs,
    template: &JobTemplate,
) -> Result<Option<i64>, ConversionError> {
    template
        .deadline_time
        .map(|deadline| {
            let seconds = (deadline - args.now).whole_seconds();
            if seconds > 0 {
                Ok(seconds)
            } else {
                Err(ConversionError::DeadlinePassed(deadline))
            }
        })
        .transpose()
}

/// Converts a job template into a Job that carries the session label.
pub fn job_spec(
    args: &JobSpecArgs,
    template: &JobTemplate,
) -> Result<k8s::V1Job, ConversionError> {
    let image = template
        .job_category
        .as_deref()
        .filter(|image| !image.is_empty())
        .ok_or(ConversionError::MissingJobCategory)?;
    let command = template
        .remote_command
        .as_deref()
        .filter(|command| !command.is_empty())
        .ok_or(ConversionError::MissingRemoteCommand)?;

    if let Some(name) = template.job_name.as_deref() {
        if !kubectl::is_rfc_1123_label(name) {
            return Err(ConversionError::InvalidJobName(name.to_owned()));
        }
    }

    let namespace = template
        .extension(extension::NAMESPACE)
        .unwrap_or(args.namespace);
    if !kubectl::is_rfc_1123_label(namespace) {
        return Err(ConversionError::InvalidNamespace(namespace.to_owned()));
    }

    let labels = labels(args, template)?;
    let annotations = args.annotations();

    Ok(k8s::V1Job {
        api_version: Some("batch/v1".to_owned()),
        kind: Some("Job".to_owned()),
        metadata: Some(Box::new(k8s::V1ObjectMeta {
            annotations: Some(annotations.clone()),
            labels: Some(labels.clone()),
            name: template.job_name.clone(),
            generate_name: template
                .job_name
                .is_none()
                .then(|| kubectl::generate_name_for(args.session)),
            namespace: Some(namespace.to_owned()),
            ..Default::default()
        })),
        spec: Some(Box::new(k8s::V1JobSpec {
            // Failed jobs are reported as failed rather than retried.
            backoff_limit: Some(0),
            suspend: template.submit_as_hold.then_some(true),
            active_deadline_seconds: active_deadline_seconds(args, template)?,
            template: Box::new(k8s::V1PodTemplateSpec {
                metadata: Some(Box::new(k8s::V1ObjectMeta {
                    annotations: Some(annotations),
                    labels: Some(labels),
                    ..Default::default()
                })),
                spec: Some(Box::new(k8s::V1PodSpec {
                    affinity: affinity(template).map(Box::new),
                    containers: vec![k8s::V1Container {
                        name: PRIMARY_CONTAINER_NAME.to_owned(),
                        image: Some(image.to_owned()),
                        command: Some(vec![command.to_owned()]),
                        args: (!template.args.is_empty()).then(|| template.args.clone()),
                        env: env(template),
                        working_dir: template.working_directory.clone(),
                        resources: resources(template).map(Box::new),
                        ..Default::default()
                    }],
                    restart_policy: Some("Never".to_owned()),
                    ..Default::default()
                })),
            }),
            ..Default::default()
        })),
        ..Default::default()
    })
}

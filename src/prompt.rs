//! Interactive provisioning questions, bounded by live cluster capacity.
//!
//! Mirrors the negotiation order: pick a node first (bounds depend on it),
//! then a storage on that node, then the numeric answers validated against
//! the resolver's limits for that node/storage pair.

use inquire::validator::Validation;
use inquire::{CustomType, Select};

use crate::api::ClusterApi;
use crate::config::DefaultsConfig;
use crate::error::DeployError;
use crate::limits::LimitResolver;
use crate::provision::{MIN_CPUS, MIN_DISK_GB, MIN_MEMORY_MB};

/// Answers collected for one provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionAnswers {
    pub node: String,
    pub storage: String,
    pub cpus: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
}

pub async fn ask_provision_questions(
    api: &impl ClusterApi,
    defaults: &DefaultsConfig,
) -> Result<ProvisionAnswers, DeployError> {
    let resolver = LimitResolver::new(api);

    let node_names: Vec<String> = api.nodes().await?.into_iter().map(|n| n.node).collect();
    if node_names.is_empty() {
        return Err(DeployError::Validation {
            message: "cluster reports no nodes".into(),
        });
    }
    let node = choose("Node to create the VM on:", node_names, &defaults.node, "node")?;

    let storage_names: Vec<String> = resolver
        .image_storages(&node)
        .await?
        .into_iter()
        .map(|s| s.storage)
        .collect();
    if storage_names.is_empty() {
        return Err(DeployError::Validation {
            message: format!("no image-capable storage on node '{node}'"),
        });
    }
    let storage = choose(
        "Storage to create the disk on:",
        storage_names,
        &defaults.storage,
        "storage",
    )?;

    let max_cpu = resolver.max_cpu(Some(&node)).await?;
    let cpus = ask_bounded("Amount of CPUs:", u64::from(MIN_CPUS), u64::from(max_cpu))? as u32;

    let max_memory = resolver.max_memory_mb(Some(&node)).await?;
    let memory_mb = ask_bounded("Amount of memory (MB):", MIN_MEMORY_MB, max_memory)?;

    let max_disk = resolver.max_disk_gb(Some(&node), Some(&storage)).await?;
    let disk_gb = ask_bounded("Size of disk (GB):", MIN_DISK_GB, max_disk)?;

    Ok(ProvisionAnswers {
        node,
        storage,
        cpus,
        memory_mb,
        disk_gb,
    })
}

/// Select from `options`, or short-circuit to a configured default.
/// A default that is not among the live options is an error, not a prompt.
fn choose(
    prompt: &str,
    options: Vec<String>,
    default: &str,
    what: &str,
) -> Result<String, DeployError> {
    if !default.is_empty() {
        if options.iter().any(|o| o == default) {
            return Ok(default.to_string());
        }
        return Err(DeployError::Validation {
            message: format!("configured default {what} '{default}' not found (available: {})", options.join(", ")),
        });
    }
    Select::new(prompt, options).prompt().map_err(map_inquire_err)
}

fn ask_bounded(prompt: &str, min: u64, max: u64) -> Result<u64, DeployError> {
    if max < min {
        return Err(DeployError::Validation {
            message: format!("no capacity available ({prompt} upper bound {max} is below minimum {min})"),
        });
    }
    let help = format!("between {min} and {max}");
    CustomType::<u64>::new(prompt)
        .with_help_message(&help)
        .with_error_message("Please enter a valid number")
        .with_validator(move |val: &u64| {
            if (min..=max).contains(val) {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid(
                    format!("must be between {min} and {max}").into(),
                ))
            }
        })
        .prompt()
        .map_err(map_inquire_err)
}

pub(crate) fn map_inquire_err(e: inquire::InquireError) -> DeployError {
    match e {
        inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted => {
            DeployError::PromptCancelled
        }
        other => DeployError::Validation {
            message: format!("prompt error: {other}"),
        },
    }
}

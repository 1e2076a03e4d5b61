use std::path::Path;

use clap::Parser;
use facet::Facet;
use tracing_subscriber::EnvFilter;

use pvedeploy::api::{ClusterApi, ProxmoxApi};
use pvedeploy::cli::{Cli, Command};
use pvedeploy::config::{self, Config};
use pvedeploy::error::DeployError;
use pvedeploy::limits::LimitResolver;
use pvedeploy::prompt;
use pvedeploy::provision::{self, ProvisionRequest};
use pvedeploy::remote::SshSession;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
            .add_directive("pvedeploy=info".parse().expect("valid log directive"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Handle init before loading config — it creates the config
    if matches!(cli.command, Command::Init) {
        return pvedeploy::init::run().map_err(Into::into);
    }

    let config = config::load_config(&cli.config)?;
    let api = ProxmoxApi::new(&config.api)?;

    match cli.command {
        Command::Init => unreachable!(),
        Command::Nodes => run_nodes(&api).await?,
        Command::Storages { node } => run_storages(&api, &node).await?,
        Command::Limits {
            node,
            storage,
            json,
        } => run_limits(&api, node.as_deref(), storage.as_deref(), json).await?,
        Command::Deploy {
            image,
            seed,
            vmid,
            name,
        } => run_deploy(&config, &api, &image, seed.as_deref(), vmid, &name).await?,
    }

    Ok(())
}

async fn run_nodes(api: &impl ClusterApi) -> Result<(), DeployError> {
    let nodes = api.nodes().await?;
    if nodes.is_empty() {
        println!("No nodes.");
        return Ok(());
    }
    for node in &nodes {
        println!(
            "  {}  {} cpus  {} MB memory  {} GB disk",
            node.node,
            node.maxcpu,
            node.maxmem / (1024 * 1024),
            node.maxdisk / (1024 * 1024 * 1024)
        );
    }
    Ok(())
}

async fn run_storages(api: &impl ClusterApi, node: &str) -> Result<(), DeployError> {
    let resolver = LimitResolver::new(api);
    let storages = resolver.image_storages(node).await?;
    if storages.is_empty() {
        println!("No image-capable storages on '{node}'.");
        return Ok(());
    }
    for storage in &storages {
        println!(
            "  {}  {} GB available",
            storage.storage,
            storage.avail / (1024 * 1024 * 1024)
        );
    }
    Ok(())
}

#[derive(Facet)]
struct LimitsJson {
    cpus: u32,
    memory_mb: u64,
    disk_gb: u64,
}

async fn run_limits(
    api: &impl ClusterApi,
    node: Option<&str>,
    storage: Option<&str>,
    json: bool,
) -> Result<(), DeployError> {
    let resolver = LimitResolver::new(api);

    // Disk first: its node/storage arity precondition should surface
    // before any other query runs.
    let disk_gb = resolver.max_disk_gb(node, storage).await?;
    let cpus = resolver.max_cpu(node).await?;
    let memory_mb = resolver.max_memory_mb(node).await?;

    if json {
        println!(
            "{}",
            facet_json::to_string(&LimitsJson {
                cpus,
                memory_mb,
                disk_gb,
            })
            .expect("serialize limits to JSON")
        );
    } else {
        println!("cpus:      {cpus}");
        println!("memory_mb: {memory_mb}");
        println!("disk_gb:   {disk_gb}");
    }
    Ok(())
}

async fn run_deploy(
    config: &Config,
    api: &impl ClusterApi,
    image: &Path,
    seed: Option<&Path>,
    vmid: u32,
    name: &str,
) -> Result<(), DeployError> {
    for path in [Some(image), seed].into_iter().flatten() {
        if !path.is_file() {
            return Err(DeployError::Validation {
                message: format!("file not found: {}", path.display()),
            });
        }
    }

    let answers = prompt::ask_provision_questions(api, &config.defaults).await?;

    let request = ProvisionRequest {
        node: answers.node,
        storage: answers.storage,
        vmid,
        name: name.to_string(),
        cpus: answers.cpus,
        memory_mb: answers.memory_mb,
        disk_gb: answers.disk_gb,
    };

    let session = SshSession::new(&config.ssh);
    provision::provision(api, &session, &request, image, seed).await
}

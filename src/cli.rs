use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pvedeploy", about = "CLI-based VM deployment for Proxmox clusters")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "pvedeploy.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Provision a VM: negotiate resources, create it, upload its disks
    Deploy {
        /// Local base/cloud image to upload as the boot disk
        #[arg(long)]
        image: PathBuf,

        /// Cloud-init seed ISO to upload and attach
        #[arg(long)]
        seed: Option<PathBuf>,

        /// VM id (must be unused in the cluster)
        #[arg(long)]
        vmid: u32,

        /// VM name
        #[arg(long)]
        name: String,
    },

    /// List cluster nodes and their capacity
    Nodes,

    /// List image-capable storages on a node
    Storages {
        #[arg(long)]
        node: String,
    },

    /// Print resolved resource limits
    Limits {
        /// Limit to one node (per-node physical ceilings)
        #[arg(long)]
        node: Option<String>,

        /// Storage for the disk bound (requires --node)
        #[arg(long)]
        storage: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate a pvedeploy.toml interactively
    Init,
}

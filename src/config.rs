use std::path::Path;

use facet::Facet;

use crate::error::DeployError;

#[derive(Debug, Clone, Facet)]
pub struct Config {
    pub api: ApiConfig,
    pub ssh: SshConfig,
    #[facet(default)]
    pub defaults: DefaultsConfig,
}

/// Proxmox REST API endpoint and token credentials.
#[derive(Debug, Clone, Facet)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://pve1.example.com:8006`.
    pub url: String,
    /// API user including realm, e.g. `root@pam`.
    pub user: String,
    /// Token name as created in the cluster.
    pub token_id: String,
    pub token_secret: String,
    /// Accept self-signed cluster certificates.
    #[facet(default)]
    pub insecure: bool,
}

/// SSH endpoint used for staging uploads and remote tool invocation.
/// The host should be the node the disks are uploaded to — uploads only
/// work against the node the session is connected to.
#[derive(Debug, Clone, Facet)]
pub struct SshConfig {
    pub host: String,
    #[facet(default = "root")]
    pub user: String,
    #[facet(default = 22)]
    pub port: u16,
}

/// Optional preselected answers — skips the matching prompts.
#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct DefaultsConfig {
    #[facet(default)]
    pub node: String,
    #[facet(default)]
    pub storage: String,
}

// ── validation ────────────────────────────────────────────

fn validate_config(config: &Config) -> Result<(), DeployError> {
    if !config.api.url.starts_with("http://") && !config.api.url.starts_with("https://") {
        return Err(DeployError::Validation {
            message: format!("api.url must start with http:// or https:// (got '{}')", config.api.url),
        });
    }
    if !config.api.user.contains('@') {
        return Err(DeployError::Validation {
            message: format!("api.user must include a realm, e.g. root@pam (got '{}')", config.api.user),
        });
    }
    if config.api.token_id.is_empty() {
        return Err(DeployError::Validation {
            message: "api.token_id must not be empty".into(),
        });
    }
    if config.api.token_secret.is_empty() {
        return Err(DeployError::Validation {
            message: "api.token_secret must not be empty".into(),
        });
    }
    if config.ssh.host.is_empty() {
        return Err(DeployError::Validation {
            message: "ssh.host must not be empty".into(),
        });
    }
    if config.ssh.port == 0 {
        return Err(DeployError::Validation {
            message: "ssh.port must not be 0".into(),
        });
    }
    Ok(())
}

// ── public API ────────────────────────────────────────────

pub fn load_config(path: &Path) -> Result<Config, DeployError> {
    let contents = std::fs::read_to_string(path).map_err(|source| DeployError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    let config: Config = facet_toml::from_str(&contents).map_err(|e| DeployError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    validate_config(&config)?;
    Ok(config)
}

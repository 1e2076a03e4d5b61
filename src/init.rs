use std::path::PathBuf;

use inquire::validator::Validation;
use inquire::{Confirm, CustomType, Text};

use crate::error::DeployError;
use crate::prompt::map_inquire_err;

// ── wizard state ─────────────────────────────────────────

struct WizardConfig {
    api_url: String,
    api_user: String,
    token_id: String,
    token_secret: String,
    insecure: bool,
    ssh_host: String,
    ssh_user: String,
    ssh_port: u16,
}

// ── public entry point ───────────────────────────────────

pub fn run() -> Result<(), DeployError> {
    let output_path = PathBuf::from("pvedeploy.toml");

    if output_path.exists() {
        let overwrite = Confirm::new("pvedeploy.toml already exists. Overwrite?")
            .with_default(false)
            .prompt()
            .map_err(map_inquire_err)?;
        if !overwrite {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let config = run_wizard()?;

    let toml = generate_toml(&config);
    std::fs::write(&output_path, &toml).map_err(|e| DeployError::Io {
        context: format!("writing {}", output_path.display()),
        source: e,
    })?;

    println!("Created pvedeploy.toml");
    println!("Run `pvedeploy deploy --image <file> --vmid <id> --name <name>` to provision a VM.");
    Ok(())
}

// ── interactive wizard ───────────────────────────────────

fn run_wizard() -> Result<WizardConfig, DeployError> {
    println!();

    let api_url = Text::new("Cluster API URL:")
        .with_help_message("e.g. https://pve1.example.com:8006")
        .with_validator(|input: &str| {
            if input.starts_with("http://") || input.starts_with("https://") {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid(
                    "URL must start with http:// or https://".into(),
                ))
            }
        })
        .prompt()
        .map_err(map_inquire_err)?;

    let api_user = Text::new("API user:")
        .with_default("root@pam")
        .with_help_message("Must include the realm, e.g. root@pam")
        .with_validator(|input: &str| {
            if input.contains('@') {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid("User must include a realm".into()))
            }
        })
        .prompt()
        .map_err(map_inquire_err)?;

    let token_id = Text::new("API token id:")
        .with_default("deploy")
        .with_validator(non_empty)
        .prompt()
        .map_err(map_inquire_err)?;

    let token_secret = Text::new("API token secret:")
        .with_validator(non_empty)
        .prompt()
        .map_err(map_inquire_err)?;

    let insecure = Confirm::new("Accept self-signed cluster certificate?")
        .with_default(true)
        .with_help_message("Proxmox ships with a self-signed certificate by default")
        .prompt()
        .map_err(map_inquire_err)?;

    let default_host = api_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split([':', '/'])
        .next()
        .unwrap_or("")
        .to_string();

    let ssh_host = Text::new("SSH host:")
        .with_default(&default_host)
        .with_help_message("Node to stage uploads on — disks land on this node")
        .with_validator(non_empty)
        .prompt()
        .map_err(map_inquire_err)?;

    let ssh_user = Text::new("SSH user:")
        .with_default("root")
        .with_validator(non_empty)
        .prompt()
        .map_err(map_inquire_err)?;

    let ssh_port: u16 = CustomType::new("SSH port:")
        .with_default(22)
        .with_error_message("Please enter a valid port number")
        .with_validator(|val: &u16| {
            if *val > 0 {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid("Port must not be 0".into()))
            }
        })
        .prompt()
        .map_err(map_inquire_err)?;

    Ok(WizardConfig {
        api_url,
        api_user,
        token_id,
        token_secret,
        insecure,
        ssh_host,
        ssh_user,
        ssh_port,
    })
}

fn non_empty(input: &str) -> Result<Validation, inquire::CustomUserError> {
    if input.is_empty() {
        Ok(Validation::Invalid("Must not be empty".into()))
    } else {
        Ok(Validation::Valid)
    }
}

// ── TOML generation ──────────────────────────────────────

fn generate_toml(config: &WizardConfig) -> String {
    let mut out = String::new();

    out.push_str("[api]\n");
    out.push_str(&format!("url = \"{}\"\n", config.api_url));
    out.push_str(&format!("user = \"{}\"\n", config.api_user));
    out.push_str(&format!("token_id = \"{}\"\n", config.token_id));
    out.push_str(&format!("token_secret = \"{}\"\n", config.token_secret));
    if config.insecure {
        out.push_str("insecure = true\n");
    }
    out.push('\n');

    out.push_str("[ssh]\n");
    out.push_str(&format!("host = \"{}\"\n", config.ssh_host));
    if config.ssh_user != "root" {
        out.push_str(&format!("user = \"{}\"\n", config.ssh_user));
    }
    if config.ssh_port != 22 {
        out.push_str(&format!("port = {}\n", config.ssh_port));
    }
    out.push('\n');

    // commented-out hints
    out.push_str("# [defaults]\n");
    out.push_str("# node = \"pve1\"\n");
    out.push_str("# storage = \"local\"\n");

    out
}

// ── tests ────────────────────────────────────────────────

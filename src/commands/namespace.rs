//! `ns` command: force-delete one namespace

use crate::config::{Mode, RunConfig};
use crate::engine::{Orchestrator, RemovalPolicy, RunReport};
use crate::k8s::credentials::{self, CredentialInputs};
use crate::k8s::{DirectApi, Kubectl};
use crate::utils::prompt::{is_interactive, needs_confirmation};
use crate::utils::{NukeError, confirm};
use anyhow::{Context, Result};
use colored::Colorize;

/// Remove hazardous webhooks without asking unless a human is there to answer
pub fn webhook_policy(config: &RunConfig, interactive: bool) -> RemovalPolicy {
    if config.auto_remove_webhooks || config.assume_yes || !interactive {
        RemovalPolicy::Auto
    } else {
        RemovalPolicy::Prompt
    }
}

fn print_banner(name: &str, config: &RunConfig) {
    match (config.mode, config.diagnose_only) {
        (_, true) => println!(
            "{} {}",
            "🔍 DRY RUN: diagnosing namespace".cyan().bold(),
            name.bold()
        ),
        (Mode::Force, false) => println!(
            "{} {}",
            "💥 FORCE MODE: nuking namespace".red().bold(),
            name.bold()
        ),
        (Mode::Standard, false) => println!("🗑️  Deleting namespace {}", name.bold()),
    }
}

/// Connect, confirm force mode if needed, and run the orchestrator
pub async fn nuke_namespace(name: &str, config: &RunConfig) -> Result<RunReport> {
    let client = credentials::connect(&CredentialInputs::from_env(config.kubeconfig.clone()))
        .await
        .map_err(NukeError::from)?;

    let interactive = is_interactive();
    if config.mode.is_force()
        && !config.diagnose_only
        && needs_confirmation(config.confirm_destructive, config.assume_yes, interactive)
    {
        let prompt = format!(
            "Force mode will strip finalizers from and delete everything in namespace {}. Continue?",
            name
        );
        if !confirm(&prompt).context("Failed to read confirmation")? {
            return Err(NukeError::new("Aborted by user")
                .suggest("Pass --yes to skip this prompt")
                .into());
        }
    }

    let kubectl = if config.force_api_direct {
        if Kubectl::available() {
            Some(Kubectl::new(config.kubeconfig.clone()))
        } else {
            crate::log_warn!("--force-api-direct needs kubectl on PATH; continuing without it");
            None
        }
    } else {
        None
    };

    print_banner(name, config);
    let report = Orchestrator::new(&client, config)
        .with_direct(kubectl.as_ref().map(|k| k as &dyn DirectApi))
        .with_webhook_policy(webhook_policy(config, interactive))
        .resolve(name)
        .await?;

    report.print_summary();
    Ok(report)
}

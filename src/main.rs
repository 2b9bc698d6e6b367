//! kubectl-nuke CLI - force-delete stuck namespaces and pods

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use kubectl_nuke::config::{Mode, RunConfig, Settings};
use kubectl_nuke::engine::Verdict;
use kubectl_nuke::log_info;
use kubectl_nuke::utils::{display_error_and_exit, enhance_error, logger};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kubectl-nuke")]
#[command(author, version, about = "Forcefully delete stuck Kubernetes namespaces and pods", long_about = None)]
struct Cli {
    /// Path to kubeconfig file (otherwise $KUBECONFIG, in-cluster, ~/.kube/config)
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Verbose output (can be used multiple times: -v, -vv, -vvv)
    /// -v: INFO, -vv: DEBUG, -vvv: TRACE
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete a namespace, cleaning up whatever keeps it in Terminating
    #[command(name = "ns", visible_alias = "namespace")]
    Namespace {
        /// Namespace to delete
        name: String,

        /// Strip and delete everything in the namespace, not just what the
        /// namespace controller reports as blocking
        #[arg(short, long)]
        force: bool,

        /// Only diagnose; never change anything in the cluster
        #[arg(long, visible_alias = "diagnose-only")]
        dry_run: bool,

        /// Detect and remove admission webhooks that would block deletes
        #[arg(long)]
        bypass_webhooks: bool,

        /// Escalate finalizer removal to raw API writes through kubectl
        #[arg(long)]
        force_api_direct: bool,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Force delete pods with a zero grace period
    #[command(name = "pod", visible_aliases = ["pods", "po"])]
    Pod {
        /// Pods to delete
        #[arg(required = true)]
        names: Vec<String>,

        /// Namespace of the pods (default from config, usually "default")
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logger::init(cli.verbose);
    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli).await {
        display_error_and_exit(enhance_error(e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load();

    match cli.command {
        Commands::Namespace {
            name,
            force,
            dry_run,
            bypass_webhooks,
            force_api_direct,
            yes,
        } => {
            let config = RunConfig {
                kubeconfig: cli.kubeconfig,
                mode: if force { Mode::Force } else { Mode::Standard },
                diagnose_only: dry_run,
                bypass_webhooks,
                force_api_direct,
                assume_yes: yes,
                ..RunConfig::from_settings(&settings)
            };
            handle_namespace_command(&name, &config).await
        }
        Commands::Pod { names, namespace } => {
            let namespace = namespace.unwrap_or_else(|| settings.defaults.pod_namespace.clone());
            handle_pod_command(&names, &namespace, cli.kubeconfig).await
        }
        Commands::Completion { shell } => handle_completion_command(shell),
        Commands::Version => handle_version_command(),
    }
}

async fn handle_namespace_command(name: &str, config: &RunConfig) -> Result<()> {
    let report = kubectl_nuke::commands::namespace::nuke_namespace(name, config).await?;
    if report.verdict == Verdict::StillPresent {
        log_info!("Namespace {} left for the namespace controller", name);
    }
    Ok(())
}

async fn handle_pod_command(
    names: &[String],
    namespace: &str,
    kubeconfig: Option<PathBuf>,
) -> Result<()> {
    kubectl_nuke::commands::pod::nuke_pods(names, namespace, kubeconfig).await?;
    Ok(())
}

fn handle_completion_command(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "kubectl-nuke", &mut io::stdout());
    Ok(())
}

fn handle_version_command() -> Result<()> {
    println!("kubectl-nuke {}", env!("CARGO_PKG_VERSION"));
    println!("Forcefully delete stuck Kubernetes namespaces and pods");
    Ok(())
}

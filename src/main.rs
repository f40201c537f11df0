mod config;
mod pipeline;
mod pr;
mod report;
mod server;

use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span};
use tracing_subscriber::EnvFilter;

use config::Config;
use pipeline::clients::{http_client, HttpChangeRequests, HttpDiagnostics, HttpSolutions, ReadRetry};
use pipeline::{Coordinator, DiagnoseRequest};
use pr::github::GitHubHost;
use pr::{ChangeRequestManager, MemoryStore, VcsBackend};
use server::pr_service::{GitHubStatus, PrServiceState};

/// Fix pipeline: turns a diagnosed production error into a filed fix
/// pull request or an operational alert recommendation.
#[derive(Parser, Debug)]
#[command(name = "fix-pipeline", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the pipeline API (`/api/diagnose`, `/api/history`, `/health`)
    Orchestrator {
        /// Listen port (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Serve the change request API (`/create-pr`, `/pr/...`, `/prs`, `/health`)
    PrService {
        /// Listen port (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one diagnosis against the configured services and print the result
    Diagnose {
        #[arg(long)]
        transaction_id: Option<String>,

        #[arg(long)]
        scope_id: Option<String>,

        #[arg(long)]
        doc_name: Option<String>,

        /// Log search window, e.g. 1h or 24h
        #[arg(long, default_value = "24h")]
        time_range: String,

        /// File change requests in-process instead of calling the PR service
        #[arg(long)]
        local_prs: bool,

        /// Optional output file path for a markdown report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fix_pipeline=info,tower_http=info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = Config::load()?;

    match cli.command {
        Command::Orchestrator { port } => {
            let _span = info_span!("orchestrator").entered();
            let coordinator = build_coordinator(&config, None)?;
            info!(
                llm1 = %config.llm1_url(),
                llm2 = %config.llm2_url(),
                pr_service = %config.pr_service_url(),
                "connected services"
            );
            let app = server::with_layers(
                server::orchestrator::router(Arc::new(coordinator)),
                orchestrator_request_timeout(&config),
            );
            server::serve(bind_addr(&config, port.unwrap_or(config.port_or(3000)))?, app).await?;
        }
        Command::PrService { port } => {
            let _span = info_span!("pr_service").entered();
            let manager = build_manager(&config)?;
            info!(mode = %manager.mode(), "change request manager ready");
            let state = PrServiceState {
                manager: Arc::new(manager),
                github: GitHubStatus::from_config(&config),
            };
            let app = server::with_layers(
                server::pr_service::routes(state),
                filing_timeout(&config),
            );
            server::serve(bind_addr(&config, port.unwrap_or(config.port_or(3005)))?, app).await?;
        }
        Command::Diagnose {
            transaction_id,
            scope_id,
            doc_name,
            time_range,
            local_prs,
            output,
        } => {
            let local = if local_prs {
                Some(Arc::new(build_manager(&config)?))
            } else {
                None
            };
            let coordinator = build_coordinator(&config, local)?;
            let request = DiagnoseRequest {
                transaction_id,
                scope_id,
                doc_name,
                time_range: Some(time_range),
            };
            let result = coordinator.run_diagnosis(&request).await?;
            report::output(&result, output.as_deref())?;
            info!(solution_type = %result.solution_type, "done");
        }
    }

    Ok(())
}

/// Real GitHub when fully configured, the in-memory store otherwise.
fn build_manager(config: &Config) -> Result<ChangeRequestManager, Box<dyn std::error::Error>> {
    let vcs = match config.github_target() {
        Some(target) => {
            info!(owner = %target.owner, repo = %target.repo, "using GitHub");
            let client = http_client(config.upstream_timeout())?;
            Some(VcsBackend {
                host: Arc::new(GitHubHost::new(client, &target)),
                deadline: config.vcs_timeout(),
            })
        }
        None => {
            info!("GitHub not configured, change requests are kept in memory");
            None
        }
    };
    Ok(ChangeRequestManager::new(Arc::new(MemoryStore::new()), vcs))
}

/// Wire the coordinator to its HTTP collaborators. `local` replaces the
/// remote PR service with an in-process manager.
fn build_coordinator(
    config: &Config,
    local: Option<Arc<ChangeRequestManager>>,
) -> Result<Coordinator, Box<dyn std::error::Error>> {
    let retry = ReadRetry::new(config.read_retry_attempts());
    let client = http_client(config.upstream_timeout())?;
    let filing_timeout = filing_timeout(config);

    let filer: Arc<dyn pipeline::ChangeRequestFiler> = match local {
        Some(manager) => manager,
        None => Arc::new(HttpChangeRequests::new(
            http_client(filing_timeout)?,
            config.pr_service_url(),
        )),
    };

    Ok(Coordinator::new(
        Arc::new(HttpDiagnostics::new(client.clone(), config.llm1_url(), retry)),
        Arc::new(HttpSolutions::new(client, config.llm2_url(), retry)),
        filer,
        config.upstream_timeout(),
    )
    .with_read_timeout(retry.budget(config.upstream_timeout()))
    .with_filing_timeout(filing_timeout))
}

/// Filing covers a full VCS publish plus the hop to the PR service.
fn filing_timeout(config: &Config) -> Duration {
    config.vcs_timeout().saturating_add(config.upstream_timeout())
}

/// Diagnosis (with read retries) and solution steps followed by filing.
fn orchestrator_request_timeout(config: &Config) -> Duration {
    ReadRetry::new(config.read_retry_attempts())
        .budget(config.upstream_timeout())
        .saturating_add(config.upstream_timeout())
        .saturating_add(filing_timeout(config))
}

fn bind_addr(config: &Config, port: u16) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    let host: IpAddr = config.host().parse()?;
    Ok(SocketAddr::new(host, port))
}

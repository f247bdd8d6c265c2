use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use sandgate::api::ApiServer;
use sandgate::config::{expand_tilde, Config};
use sandgate::mcp::CapabilityInvoker;
use sandgate_storage::{FileStore, GitRepository, LocalFileStore, SandboxRoot};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sandgate-server")]
#[command(about = "Sandboxed workspace server speaking MCP over SSE")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "SANDGATE_CONFIG", default_value = "sandgate.toml")]
    config: PathBuf,

    /// Host to bind to (overrides server.bind_addr)
    #[arg(long, env = "SANDGATE_HOST")]
    host: Option<String>,

    /// Port to listen on (overrides server.bind_addr)
    #[arg(short, long, env = "SANDGATE_PORT")]
    port: Option<u16>,

    /// Workspace root (overrides workspace.root)
    #[arg(short, long, env = "SANDGATE_ROOT")]
    root: Option<PathBuf>,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let format = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| config.observability.log_format.clone());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Apply --host / --port on top of the configured bind address
fn bind_addr(config: &Config, host: Option<String>, port: Option<u16>) -> String {
    let (cfg_host, cfg_port) = match config.server.bind_addr.rsplit_once(':') {
        Some((h, p)) => (h.to_string(), p.to_string()),
        None => (config.server.bind_addr.clone(), "3080".to_string()),
    };
    format!(
        "{}:{}",
        host.unwrap_or(cfg_host),
        port.map(|p| p.to_string()).unwrap_or(cfg_port)
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_create(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;
    if let Some(root) = args.root {
        config.workspace.root = expand_tilde(&root)?;
    }
    config.server.bind_addr = bind_addr(&config, args.host, args.port);

    init_tracing(&config);

    tracing::info!("Starting sandgate server");
    tracing::info!("Config file: {}", args.config.display());

    let root = SandboxRoot::open(&config.workspace.root, config.workspace.create_root)?;
    config.workspace.root = root.path().to_path_buf();
    tracing::info!("Workspace root: {}", root.path().display());

    let repo = if config.workspace.git_init {
        GitRepository::open_or_init(root.path())?
    } else {
        GitRepository::open(root.path())?
    };
    let vcs = Arc::new(
        repo.with_remote(config.workspace.git_remote.clone())
            .with_author(config.workspace.git_author.as_deref()),
    );
    let files = Arc::new(LocalFileStore::new(root));
    tracing::info!("File backend: {}", files.backend_name());

    let mut server = ApiServer::new(&config, CapabilityInvoker::new(files, vcs));
    if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing Prometheus recorder")?;
        server = server.with_metrics(handle);
    }

    server.serve(&config.server.bind_addr).await?;

    Ok(())
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;

use request_accounting::accounting::Accountant;
use request_accounting::config::{Config, ConfigError};
use request_accounting::server;
use request_accounting::telemetry::{self, LogError, LogFormat};
use request_accounting::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "request-accounting",
    version,
    about = "HTTP server that accounts CPU, I/O and wall time per transaction"
)]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides `listen`).
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log filter directive (overrides `[log] level`).
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format (overrides `[log] format`).
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Do not reap exited children before the end snapshot.
    #[arg(long)]
    no_reap_children: bool,

    /// Do not copy accounting values into response headers.
    #[arg(long)]
    no_headers: bool,
}

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("server exited with error: {0}")]
    Serve(std::io::Error),
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.log.format = format;
        }
        if self.no_reap_children {
            config.accounting.reap_children = false;
        }
        if self.no_headers {
            config.accounting.expose_headers = false;
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("request-accounting: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    // ── 1. Configuration & logging ───────────────────────────────
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    telemetry::init_logging(&config.log)?;
    tracing::debug!(?config, "effective configuration");

    // ── 2. Accounting core ───────────────────────────────────────
    let accountant =
        Arc::new(Accountant::system().with_child_reaping(config.accounting.reap_children));

    // ── 3. Build shared state & app ──────────────────────────────
    let state = Arc::new(AppState {
        work: config.work.clone(),
    });
    let app = server::create_app(state, accountant, config.accounting.clone());

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.listen,
            source,
        })?;

    tracing::info!(
        addr = %config.listen,
        reap_children = config.accounting.reap_children,
        expose_headers = config.accounting.expose_headers,
        "listening"
    );

    axum::serve(
        listener,
        axum::ServiceExt::<axum::extract::Request>::into_make_service(app),
    )
    .await
    .map_err(StartupError::Serve)
}

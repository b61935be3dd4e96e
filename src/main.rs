use clap::Parser;
use miniweb::{serve, AppState, Cli, Config};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::resolve(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("miniweb: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "runtime construction failed");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async {
        let state = match AppState::new(config) {
            Ok(state) => Arc::new(state),
            Err(e) => {
                error!(error = %e, "startup failed");
                return ExitCode::FAILURE;
            }
        };

        tokio::select! {
            result = serve(state) => match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = %e, "startup failed");
                    ExitCode::FAILURE
                }
            },
            _ = shutdown_signal() => {
                info!("shutdown signal received");
                ExitCode::SUCCESS
            }
        }
    })
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!(error = %e, "cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

/// Stderr logging by default; the configured log file when one is set.
/// The returned guard must live as long as the process logs.
fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if config.verbose { "debug" } else { "info" }));

    if let Some(path) = &config.log_file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let (writer, guard) = tracing_appender::non_blocking(file);
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .init();
                return Some(guard);
            }
            Err(e) => {
                eprintln!("miniweb: cannot open log file {}: {e}", path.display());
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    None
}

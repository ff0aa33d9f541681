use event_forwarder::ChangeItem;
use event_forwarder::Error;
use event_forwarder::ForwarderConfig;
use event_forwarder::MonitoringConfig;
use event_forwarder::Result;
use event_forwarder::SinkBuilder;
use event_forwarder::SinkHandle;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

const LOG_FILE_NAME: &str = "forwarder.log";

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let config = ForwarderConfig::new()?.validate()?;

    // Initializing Logs
    let guard = init_observability(&config.monitoring)?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    let sink = SinkBuilder::new(config, graceful_rx.clone())
        .start_metrics_server(graceful_rx.clone())
        .build::<Value>()
        .await
        .inspect_err(|e| error!("failed to start event sink: {}", e))?;
    let handle = sink.handle();

    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    // Stand-in for the resource watcher
    let reader = tokio::spawn(forward_stdin(handle, graceful_rx));

    info!("Application started. Reading change records from stdin...");
    let result = sink.run().await;

    reader.abort();
    let code = match &result {
        Ok(()) => 0,
        Err(e) => {
            error!("event sink stops: {:?}", e);
            1
        }
    };

    info!("Exiting program.");
    drop(guard);
    // A pending blocking stdin read would otherwise hold the runtime open.
    std::process::exit(code);
}

/// Feeds newline-delimited `{"previous": ..., "current": ...}` records into
/// the sink until end of input or shutdown.
async fn forward_stdin(
    handle: SinkHandle<Value>,
    mut shutdown_signal: watch::Receiver<()>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = shutdown_signal.changed() => {
                debug!("stdin reader stopping on shutdown");
                return;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<ChangeItem<Value>>(&line) {
                            Ok(item) => handle.submit(item).await,
                            Err(e) => warn!("skipping malformed change record: {}", e),
                        }
                    }
                    Ok(None) => {
                        info!("end of input, flushing pending change items");
                        handle.close();
                        return;
                    }
                    Err(e) => {
                        error!("failed to read stdin: {}", e);
                        handle.close();
                        return;
                    }
                }
            }
        }
    }
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    info!("Shutdown server..");
    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::SignalSenderClosed(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

/// Logs to `<log_dir>/forwarder.log` through a non-blocking writer, or to
/// stderr when no directory is configured. `RUST_LOG` overrides the
/// configured filter.
pub fn init_observability(monitoring: &MonitoringConfig) -> Result<Option<WorkerGuard>> {
    let filter = monitoring.env_filter()?;

    match &monitoring.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE_NAME));
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(filter);
            tracing_subscriber::registry().with(file_layer).init();
            Ok(Some(guard))
        }
        None => {
            let stderr_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter);
            tracing_subscriber::registry().with(stderr_layer).init();
            Ok(None)
        }
    }
}

//! Owns the producer and writer tasks and turns the shutdown cause into the
//! process exit code.

use std::future::Future;
use std::process::ExitCode;

use seedfeed_client::ClientConfig;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::FeedConfig;
use crate::error::IngestError;
use crate::influx::{PointSink, StorageBackend};
use crate::producer::{Producer, ProducerSettings};
use crate::queue::handoff_queue;
use crate::shutdown::ShutdownHandle;
use crate::source::SeedLinkSource;
use crate::writer::{StorageWriter, WriterSettings};

/// Run the pipeline with the configured InfluxDB backend until Ctrl-C,
/// SIGTERM or a fatal error.
pub async fn run(config: FeedConfig) -> ExitCode {
    let shutdown = ShutdownHandle::new();

    let signals = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match stop_signal().await {
                Ok(()) => shutdown.request(),
                Err(e) => error!(error = %e, "failed to install signal handler"),
            }
        })
    };

    let code = match StorageBackend::from_config(&config.influxdb) {
        Ok(backend) => supervise(&config, backend, shutdown).await,
        Err(e) => {
            shutdown.force("writer", IngestError::from(e));
            exit_code(&shutdown)
        }
    };
    signals.abort();
    code
}

#[cfg(unix)]
async fn stop_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn stop_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Connect, spawn both workers, wait for both to finish.
pub async fn supervise<K>(config: &FeedConfig, sink: K, shutdown: ShutdownHandle) -> ExitCode
where
    K: PointSink + 'static,
{
    let client_config = ClientConfig {
        connect_timeout: config.seedlink.connect_timeout(),
        read_timeout: config.seedlink.network_timeout(),
    };
    let source = match SeedLinkSource::connect(&config.seedlink.server, client_config).await {
        Ok(source) => source,
        Err(e) => {
            shutdown.force("producer", IngestError::from(e));
            return exit_code(&shutdown);
        }
    };

    let (tx, rx) = handoff_queue(config.pipeline.queue_capacity);
    let mut producer = match Producer::new(
        source,
        ProducerSettings::from_config(config),
        tx,
        shutdown.clone(),
    ) {
        Ok(producer) => producer,
        Err(e) => {
            shutdown.force("producer", e);
            return exit_code(&shutdown);
        }
    };
    let mut writer = StorageWriter::new(
        rx,
        sink,
        WriterSettings::from_config(config),
        shutdown.clone(),
    );

    info!(server = %config.seedlink.server, "pipeline started");
    let producer_task = spawn_worker("producer", shutdown.clone(), async move {
        producer.run().await;
    });
    let writer_task = spawn_worker("writer", shutdown.clone(), async move {
        writer.run().await;
    });

    let (p, w) = tokio::join!(producer_task, writer_task);
    for (component, result) in [("producer", p), ("writer", w)] {
        if let Err(e) = result {
            error!(component, error = %e, "supervisor task failed");
        }
    }

    exit_code(&shutdown)
}

/// Spawn `work` and escalate a panic or abort of it as a fatal shutdown.
fn spawn_worker<F>(component: &'static str, shutdown: ShutdownHandle, work: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = tokio::spawn(work).await {
            shutdown.force(
                component,
                IngestError::TaskFailed {
                    component,
                    reason: e.to_string(),
                },
            );
        }
    })
}

fn exit_code(shutdown: &ShutdownHandle) -> ExitCode {
    match shutdown.cause() {
        Some(cause) if cause.is_fatal() => {
            error!(%cause, "pipeline stopped");
            ExitCode::FAILURE
        }
        _ => {
            info!("pipeline stopped");
            ExitCode::SUCCESS
        }
    }
}

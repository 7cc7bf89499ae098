mod config;
mod http_server;
mod influx;
mod ingest;
mod message;
mod metrics;
mod naming;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use influx::InfluxSink;
use metrics::MetricsSink;
use naming::{NameTable, Policy};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Configuration is validated in full before the decoder is spawned or
    // the listen port is opened.
    let policy = match NameTable::from_entries(&config.name_fields)
        .and_then(|table| Policy::new(table, config.named_only))
    {
        Ok(policy) => policy,
        Err(error) => {
            error!(%error, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    let metrics = match MetricsSink::new() {
        Ok(sink) => Arc::new(sink),
        Err(error) => {
            error!(%error, "failed to build metrics registry");
            return ExitCode::from(2);
        }
    };

    let influx = InfluxSink::from_config(&config);
    if let Err(error) = influx.ping().await {
        error!(%error, "influxdb endpoint unreachable");
        return ExitCode::from(2);
    }

    let listener = match TcpListener::bind(("0.0.0.0", config.http_port)).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%error, port = config.http_port, "failed to bind http port");
            return ExitCode::FAILURE;
        }
    };
    info!(port = config.http_port, "serving /metrics");
    tokio::spawn(http_server::start(listener, metrics.clone()));

    let (mut child, stdout) = match ingest::spawn_decoder(&config) {
        Ok(pair) => pair,
        Err(error) => {
            error!(%error, "failed to start decoder");
            return ExitCode::FAILURE;
        }
    };

    let result = ingest::pump(
        tokio::io::BufReader::new(stdout),
        &policy,
        &metrics,
        &influx,
    )
    .await;
    let status = child.wait().await;
    match result {
        Ok(()) => error!(?status, "decoder exited, shutting down"),
        Err(error) => error!(%error, ?status, "decoder stream failed, shutting down"),
    }
    // No restart policy: losing the decoder is fatal for the whole process.
    ExitCode::FAILURE
}

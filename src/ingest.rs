use std::process::Stdio;

use chrono::Utc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::influx::InfluxSink;
use crate::message;
use crate::metrics::MetricsSink;
use crate::naming::{Admission, Policy};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to spawn {cmd}: {source}")]
    Spawn {
        cmd: String,
        source: std::io::Error,
    },
    #[error("decoder stdout not attached")]
    StdoutUnavailable,
    #[error("failed to read decoder output: {0}")]
    Read(#[from] std::io::Error),
}

/// Spawn the rtl_433 decoder with JSON output on a piped stdout. The argument
/// set is rtl_433's contract: -R selects the protocol, -F json selects the
/// output format, -q suppresses non-data chatter.
pub fn spawn_decoder(config: &Config) -> Result<(Child, ChildStdout), IngestError> {
    let mut child = Command::new(&config.cmd_path)
        .args(["-R", &config.protocol, "-F", "json", "-q"])
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|source| IngestError::Spawn {
            cmd: config.cmd_path.clone(),
            source,
        })?;
    let stdout = child.stdout.take().ok_or(IngestError::StdoutUnavailable)?;
    info!(cmd = %config.cmd_path, protocol = %config.protocol, "decoder started");
    Ok((child, stdout))
}

/// Drive the pipeline over a stream of decoder output lines until the stream
/// ends: parse, apply naming policy, then fan out to the metrics sink
/// (always) and the time-series sink (best effort).
///
/// A line that fails to decode is logged and dropped; an influx write failure
/// is logged and never reaches the loop's control flow. Only a read error on
/// the stream itself ends the loop with an error.
pub async fn pump<R>(
    reader: R,
    policy: &Policy,
    metrics: &MetricsSink,
    influx: &InfluxSink,
) -> Result<(), IngestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let mut reading = match message::parse(&line) {
            Ok(reading) => reading,
            Err(error) => {
                warn!(%error, "dropping undecodable line");
                continue;
            }
        };
        reading.observed_at = Utc::now();

        if policy.resolve(&mut reading) == Admission::Skipped {
            debug!(id = reading.id, "skipping unnamed sensor");
            continue;
        }

        metrics.observe(&reading);
        if let Err(error) = influx.write(&reading).await {
            warn!(%error, "influxdb write failed, point dropped");
        }
        debug!(
            id = reading.id,
            name = %reading.name,
            temperature_c = reading.temperature_c,
            "observed reading"
        );
    }
    Ok(())
}

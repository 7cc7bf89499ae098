use reqwest::StatusCode;
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::message::Reading;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("influxdb request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("influxdb rejected write: {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Optional write path to an InfluxDB 1.x endpoint. Constructed disabled when
/// no URL is configured, so the ingestion loop never branches on presence.
///
/// Each reading is written independently and synchronously, no batching or
/// retry queue. A slow endpoint therefore throttles ingestion, but a failed
/// write is only ever logged by the caller and never touches gauge state.
pub enum InfluxSink {
    Disabled,
    Enabled {
        client: reqwest::Client,
        write_url: String,
        db: String,
        user: String,
        password: String,
    },
    #[cfg(test)]
    FailAlways {
        attempts: std::sync::atomic::AtomicUsize,
    },
}

impl InfluxSink {
    pub fn from_config(config: &Config) -> Self {
        if config.influx_url.is_empty() {
            return InfluxSink::Disabled;
        }
        info!(url = %config.influx_url, db = %config.influx_db, "influxdb sink enabled");
        InfluxSink::Enabled {
            client: reqwest::Client::new(),
            write_url: format!("{}/write", config.influx_url.trim_end_matches('/')),
            db: config.influx_db.clone(),
            user: config.influx_user.clone(),
            password: config.influx_password.clone(),
        }
    }

    /// Startup reachability check. An enabled sink pointing at a dead
    /// endpoint is a configuration error, not something to discover one
    /// dropped point at a time.
    pub async fn ping(&self) -> Result<(), WriteError> {
        let InfluxSink::Enabled { client, write_url, .. } = self else {
            return Ok(());
        };
        let ping_url = write_url.trim_end_matches("/write").to_owned() + "/ping";
        let response = client.get(&ping_url).send().await?;
        if !response.status().is_success() {
            return Err(WriteError::Rejected {
                status: response.status(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Write one point for the reading, timestamped at ingestion time with
    /// seconds precision.
    pub async fn write(&self, reading: &Reading) -> Result<(), WriteError> {
        let (client, write_url, db, user, password) = match self {
            InfluxSink::Disabled => return Ok(()),
            InfluxSink::Enabled {
                client,
                write_url,
                db,
                user,
                password,
            } => (client, write_url, db, user, password),
            #[cfg(test)]
            InfluxSink::FailAlways { attempts } => {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                return Err(WriteError::Rejected {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: "test sink always fails".to_owned(),
                });
            }
        };

        let mut request = client
            .post(write_url)
            .query(&[("db", db.as_str()), ("precision", "s")])
            .body(line_protocol(reading));
        if !user.is_empty() {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(WriteError::Rejected {
                status: response.status(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Render one reading as an InfluxDB line-protocol point: measurement
/// `sensor`, the label set as tags in sorted key order, the three measured
/// fields, and a seconds timestamp.
pub fn line_protocol(reading: &Reading) -> String {
    let labels = reading.labels();
    format!(
        "sensor,channel={},id={},model={},name={} temperature={},humidity={},low_battery={} {}",
        escape_tag(&labels.channel),
        labels.id,
        escape_tag(&labels.model),
        escape_tag(&labels.name),
        reading.temperature_c,
        reading.humidity,
        reading.low_battery,
        reading.observed_at.timestamp(),
    )
}

// Tag values must escape commas, equals signs and spaces.
fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::parse;
    use chrono::DateTime;

    fn kitchen_reading() -> Reading {
        let mut reading = parse(
            r#"{"model":"Acurite","id":1251,"channel":"A","temperature_C":21.5,"humidity":55,"battery":"LOW"}"#,
        )
        .unwrap();
        reading.name = "kitchen".to_owned();
        reading.observed_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        reading
    }

    #[test]
    fn renders_point() {
        assert_eq!(
            line_protocol(&kitchen_reading()),
            "sensor,channel=A,id=1251,model=Acurite,name=kitchen \
             temperature=21.5,humidity=55,low_battery=true 1700000000"
        );
    }

    #[test]
    fn escapes_tag_values() {
        let mut reading = kitchen_reading();
        reading.model = "Acu rite".to_owned();
        reading.name = "a=b,c".to_owned();

        let line = line_protocol(&reading);
        assert!(line.contains(r"model=Acu\ rite"));
        assert!(line.contains(r"name=a\=b\,c"));
    }

    #[test]
    fn unnamed_reading_tags_id_as_name() {
        let mut reading = kitchen_reading();
        reading.name = String::new();

        assert!(line_protocol(&reading).contains("name=1251"));
    }

    #[tokio::test]
    async fn disabled_sink_accepts_everything() {
        let sink = InfluxSink::Disabled;
        assert!(sink.write(&kitchen_reading()).await.is_ok());
        assert!(sink.ping().await.is_ok());
    }
}

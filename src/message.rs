use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed reading line {line:?}: {source}")]
    Malformed {
        line: String,
        source: serde_json::Error,
    },
}

/// One decoded sensor transmission, as emitted by rtl_433 in JSON mode.
///
/// Unknown fields are ignored so newer rtl_433 builds can add fields without
/// breaking ingestion. `humidity` and `battery` are optional; `id` must be a
/// JSON number.
#[derive(Debug, Clone, Deserialize)]
pub struct Reading {
    #[serde(default)]
    pub model: String,
    pub id: i64,
    #[serde(default, deserialize_with = "channel_as_text")]
    pub channel: String,
    #[serde(rename = "temperature_C", default)]
    pub temperature_c: f64,
    #[serde(default)]
    pub humidity: f64,
    #[serde(rename = "battery", default, deserialize_with = "battery_is_low")]
    pub low_battery: bool,
    #[serde(default)]
    pub name: String,
    /// When the line was read off the decoder, not when the sensor transmitted.
    #[serde(skip, default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

/// Parse a single newline-delimited JSON line into a [`Reading`].
pub fn parse(line: &str) -> Result<Reading, DecodeError> {
    serde_json::from_str(line).map_err(|source| DecodeError::Malformed {
        line: line.to_owned(),
        source,
    })
}

pub const LABEL_KEYS: [&str; 4] = ["model", "channel", "id", "name"];

/// The fixed label tuple identifying a metric series. Never carries measured
/// values, so series cardinality tracks the device population only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    pub model: String,
    pub channel: String,
    pub id: String,
    pub name: String,
}

impl LabelSet {
    /// Values in [`LABEL_KEYS`] order.
    pub fn values(&self) -> [&str; 4] {
        [&self.model, &self.channel, &self.id, &self.name]
    }
}

impl Reading {
    pub fn labels(&self) -> LabelSet {
        let id = self.id.to_string();
        let name = if self.name.is_empty() {
            id.clone()
        } else {
            self.name.clone()
        };
        LabelSet {
            model: self.model.clone(),
            channel: self.channel.clone(),
            id,
            name,
        }
    }
}

// rtl_433 reports the channel as either a string ("A") or a number (1)
// depending on the device decoder.
fn channel_as_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Channel {
        Text(String),
        Number(i64),
    }

    Ok(match Option::<Channel>::deserialize(deserializer)? {
        Some(Channel::Text(s)) => s,
        Some(Channel::Number(n)) => n.to_string(),
        None => String::new(),
    })
}

// Two legacy battery encodings exist across rtl_433 versions: a status string
// where "LOW" means low, and an integer flag where 1 means low. Anything else,
// including an absent field, reads as healthy.
fn battery_is_low<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Battery {
        Status(String),
        Flag(i64),
    }

    Ok(match Option::<Battery>::deserialize(deserializer)? {
        Some(Battery::Status(s)) => s == "LOW",
        Some(Battery::Flag(n)) => n == 1,
        None => false,
    })
}

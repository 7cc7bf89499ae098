use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::message::{Reading, LABEL_KEYS};

pub const TEMPERATURE_METRIC: &str = "sensoracurite_temperature_celsius";
pub const HUMIDITY_METRIC: &str = "sensoracurite_humidity";
pub const LOW_BATTERY_METRIC: &str = "sensoracurite_low_battery";

/// Gauge-style current-value state per label set, shared between the
/// ingestion loop (writer) and the scrape handlers (readers). Owns its own
/// registry rather than touching the process-global default one.
///
/// Cells are created on first observation and overwritten on every later one,
/// last write wins. Nothing is ever evicted; the population of radio sensors
/// bounds the series count.
pub struct MetricsSink {
    registry: Registry,
    temperature: GaugeVec,
    humidity: GaugeVec,
    low_battery: GaugeVec,
}

/// One row of the HTML status page, merged across metrics by display name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StatusReading {
    pub name: String,
    pub channel: String,
    pub temperature: f64,
    pub humidity: f64,
}

impl MetricsSink {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let temperature = GaugeVec::new(
            Opts::new(TEMPERATURE_METRIC, "Current temperature in Celsius"),
            &LABEL_KEYS,
        )?;
        registry.register(Box::new(temperature.clone()))?;

        let humidity = GaugeVec::new(
            Opts::new(HUMIDITY_METRIC, "Current humidity"),
            &LABEL_KEYS,
        )?;
        registry.register(Box::new(humidity.clone()))?;

        let low_battery = GaugeVec::new(
            Opts::new(LOW_BATTERY_METRIC, "Battery is low"),
            &LABEL_KEYS,
        )?;
        registry.register(Box::new(low_battery.clone()))?;

        Ok(MetricsSink {
            registry,
            temperature,
            humidity,
            low_battery,
        })
    }

    /// Upsert all three gauges for the reading's label set. Low battery is
    /// exposed as 0.0/1.0 to fit the gauge model.
    pub fn observe(&self, reading: &Reading) {
        let labels = reading.labels();
        let values = labels.values();

        self.temperature
            .with_label_values(&values)
            .set(reading.temperature_c);
        self.humidity.with_label_values(&values).set(reading.humidity);
        self.low_battery
            .with_label_values(&values)
            .set(if reading.low_battery { 1.0 } else { 0.0 });
    }

    /// Point-in-time snapshot in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Current readings merged per display name for the status page, sorted
    /// by name. Keyed by the resolved name so two metrics for the same device
    /// land on the same row.
    pub fn status_readings(&self) -> Vec<StatusReading> {
        let mut rows: std::collections::HashMap<String, StatusReading> =
            std::collections::HashMap::new();

        for family in self.registry.gather() {
            let metric_name = family.get_name().to_owned();
            if metric_name != TEMPERATURE_METRIC && metric_name != HUMIDITY_METRIC {
                continue;
            }
            for metric in family.get_metric() {
                let mut name = String::new();
                let mut id = String::new();
                let mut channel = String::new();
                for label in metric.get_label() {
                    match label.get_name() {
                        "name" => name = label.get_value().to_owned(),
                        "id" => id = label.get_value().to_owned(),
                        "channel" => channel = label.get_value().to_owned(),
                        _ => {}
                    }
                }
                if name.is_empty() {
                    name = id;
                }

                let row = rows.entry(name.clone()).or_default();
                row.name = name;
                if metric_name == TEMPERATURE_METRIC {
                    row.temperature = metric.get_gauge().get_value();
                    row.channel = channel;
                } else {
                    row.humidity = metric.get_gauge().get_value();
                }
            }
        }

        let mut rows: Vec<StatusReading> = rows.into_values().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::parse;

    fn acurite_line() -> Reading {
        parse(
            r#"{"model":"Acurite","id":1251,"channel":"A","temperature_C":21.5,"humidity":55,"battery":"OK"}"#,
        )
        .unwrap()
    }

    fn series_line<'a>(exposition: &'a str, metric: &str) -> &'a str {
        exposition
            .lines()
            .find(|l| l.starts_with(&format!("{metric}{{")))
            .unwrap_or_else(|| panic!("no {metric} series in {exposition}"))
    }

    #[test]
    fn observe_creates_one_series_per_metric() {
        let sink = MetricsSink::new().unwrap();
        let mut reading = acurite_line();
        reading.name = "kitchen".to_owned();
        sink.observe(&reading);

        let text = sink.encode_text().unwrap();
        let temperature = series_line(&text, TEMPERATURE_METRIC);
        assert!(temperature.contains(r#"model="Acurite""#));
        assert!(temperature.contains(r#"channel="A""#));
        assert!(temperature.contains(r#"id="1251""#));
        assert!(temperature.contains(r#"name="kitchen""#));
        assert!(temperature.ends_with("21.5"));

        assert!(series_line(&text, HUMIDITY_METRIC).ends_with("55"));
        assert!(series_line(&text, LOW_BATTERY_METRIC).ends_with('0'));
    }

    #[test]
    fn low_battery_encodes_as_one() {
        let sink = MetricsSink::new().unwrap();
        let mut reading = acurite_line();
        reading.low_battery = true;
        sink.observe(&reading);

        assert!(series_line(&sink.encode_text().unwrap(), LOW_BATTERY_METRIC).ends_with('1'));
    }

    #[test]
    fn repeated_observation_is_idempotent() {
        let sink = MetricsSink::new().unwrap();
        let reading = acurite_line();

        sink.observe(&reading);
        let first = sink.encode_text().unwrap();
        sink.observe(&reading);
        let second = sink.encode_text().unwrap();

        assert_eq!(first, second);
        let count = second
            .lines()
            .filter(|l| l.starts_with(&format!("{TEMPERATURE_METRIC}{{")))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn last_observation_wins() {
        let sink = MetricsSink::new().unwrap();
        let mut reading = acurite_line();
        sink.observe(&reading);
        reading.temperature_c = 23.0;
        sink.observe(&reading);

        assert!(series_line(&sink.encode_text().unwrap(), TEMPERATURE_METRIC).ends_with("23"));
    }

    #[test]
    fn status_rows_merge_by_resolved_name_and_sort() {
        let sink = MetricsSink::new().unwrap();

        let mut kitchen = acurite_line();
        kitchen.name = "kitchen".to_owned();
        sink.observe(&kitchen);

        let mut porch = parse(
            r#"{"model":"Acurite","id":903,"channel":"B","temperature_C":4.5,"humidity":80}"#,
        )
        .unwrap();
        porch.name = "porch".to_owned();
        sink.observe(&porch);

        let rows = sink.status_readings();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "kitchen");
        assert_eq!(rows[0].temperature, 21.5);
        assert_eq!(rows[0].humidity, 55.0);
        assert_eq!(rows[0].channel, "A");
        assert_eq!(rows[1].name, "porch");
        assert_eq!(rows[1].humidity, 80.0);
    }

    #[test]
    fn unnamed_device_shows_under_its_id() {
        let sink = MetricsSink::new().unwrap();
        sink.observe(&acurite_line());

        let rows = sink.status_readings();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "1251");
    }
}

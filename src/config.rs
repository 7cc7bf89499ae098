use clap::Parser;

/// Prometheus and InfluxDB exporter for rtl_433 sensor readings.
///
/// All configuration is taken once at process start and is immutable
/// afterwards.
#[derive(Parser, Debug)]
#[command(name = "rtl433_exporter")]
pub struct Config {
    /// HTTP port for the /metrics and status endpoints.
    #[arg(long, default_value_t = 44010)]
    pub http_port: u16,

    /// rtl_433 protocol to enable (passed through as -R).
    #[arg(long, default_value = "39")]
    pub protocol: String,

    /// Full path to the rtl_433 executable.
    #[arg(long, default_value = "rtl_433")]
    pub cmd_path: String,

    /// Log at debug level.
    #[arg(long)]
    pub debug: bool,

    /// Only export sensors with a configured name. See --name-fields.
    #[arg(long)]
    pub named_only: bool,

    /// Comma-separated id=name pairs injected as the name label,
    /// e.g. 1251=kitchen.
    #[arg(long, default_value = "")]
    pub name_fields: String,

    /// InfluxDB base URL, e.g. http://localhost:8086. Empty disables the
    /// InfluxDB write path.
    #[arg(long, default_value = "")]
    pub influx_url: String,

    /// InfluxDB database to write points into.
    #[arg(long, default_value = "sensors")]
    pub influx_db: String,

    /// InfluxDB user, empty for no authentication.
    #[arg(long, default_value = "")]
    pub influx_user: String,

    /// InfluxDB password.
    #[arg(long, default_value = "")]
    pub influx_password: String,
}

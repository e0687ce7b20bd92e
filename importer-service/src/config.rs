use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct InfluxDbConfig {
    #[serde(default = "default_influxdb_url")]
    pub url: String,
    pub token: String,
    #[serde(default = "default_influxdb_org")]
    pub org: String,
    #[serde(default = "default_influxdb_bucket")]
    pub bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    /// Hours between polls; fixed for the lifetime of the process.
    #[serde(default = "default_poll_interval_hours")]
    pub poll_interval_hours: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            poll_interval_hours: default_poll_interval_hours(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub influxdb: InfluxDbConfig,
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub import: ImportConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_influxdb_url() -> String {
    "http://a0d7b954-influxdb:8086".to_string()
}

fn default_influxdb_org() -> String {
    "homeassistant".to_string()
}

fn default_influxdb_bucket() -> String {
    "homeassistant/autogen".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_poll_interval_hours() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path =
            env::var("WATER_IMPORTER_CONFIG").unwrap_or_else(|_| "water-importer.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=24).contains(&self.import.poll_interval_hours),
            "import.poll_interval_hours must be between 1 and 24, got {}",
            self.import.poll_interval_hours
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> AppConfig {
        toml::from_str(toml_str).expect("config should deserialize")
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse(
            r#"
            [influxdb]
            token = "secret"

            [recorder]
            uri = "postgres://localhost/recorder"
            "#,
        );

        assert_eq!(cfg.influxdb.url, "http://a0d7b954-influxdb:8086");
        assert_eq!(cfg.influxdb.org, "homeassistant");
        assert_eq!(cfg.influxdb.bucket, "homeassistant/autogen");
        assert_eq!(cfg.import.poll_interval_hours, 3);
        assert!(cfg.metrics.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn poll_interval_bounds_are_enforced() {
        let base = |hours: u32| {
            parse(&format!(
                r#"
                [influxdb]
                token = "secret"

                [recorder]
                uri = "postgres://localhost/recorder"

                [import]
                poll_interval_hours = {hours}
                "#
            ))
        };

        assert!(base(1).validate().is_ok());
        assert!(base(24).validate().is_ok());
        assert!(base(0).validate().is_err());
        assert!(base(25).validate().is_err());
    }
}

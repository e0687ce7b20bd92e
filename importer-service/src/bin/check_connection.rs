use anyhow::Result;
use importer_service::{
    config::AppConfig,
    influx::InfluxHttpClient,
    observability,
    validate::{self, ValidationOutcome},
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let client = InfluxHttpClient::new(&cfg.influxdb)?;

    match validate::classify(client.probe().await) {
        Ok(ValidationOutcome::SuccessWithData) => {
            println!("ok: connected, water consumption data found");
        }
        Ok(ValidationOutcome::SuccessWithoutData) => {
            println!("ok: connected, but no water consumption data in the last 30 days");
        }
        Err(e) => {
            println!("error: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}

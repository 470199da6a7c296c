use pwrmon_collector::{run, CollectorError, CollectorSettings};
use tracing_appender::rolling;
use tracing_subscriber::FmtSubscriber;

use tracing_log::LogTracer;

#[tokio::main]
async fn main() -> Result<(), CollectorError> {
    LogTracer::init().expect("Unable to set up log tracer");

    let settings = CollectorSettings::from_config();

    // The guard has to live as long as main or buffered lines are lost
    let _guard = match &settings.log_dir {
        Some(dir) => {
            let log = rolling::daily(dir, "pwrmon-collector");
            let (nb, guard) = tracing_appender::non_blocking(log);
            let sub = FmtSubscriber::builder()
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(nb)
                .finish();
            tracing::subscriber::set_global_default(sub)
                .expect("Unable to set up tracing subscriber");
            Some(guard)
        }
        None => {
            let sub = FmtSubscriber::builder()
                .with_max_level(tracing::Level::INFO)
                .finish();
            tracing::subscriber::set_global_default(sub)
                .expect("Unable to set up tracing subscriber");
            None
        }
    };

    tracing::info!(
        "Collecting {} from {}:{} at {} per kWh",
        settings.telemetry_topic,
        settings.host,
        settings.port,
        settings.tariff_per_kwh
    );

    run(&settings).await
}

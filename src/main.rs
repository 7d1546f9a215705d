use color_eyre::Result;
use mqttscope::config::MonitorSettings;
use mqttscope::ui::Monitor;
use tokio::io::BufReader;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings_path = MonitorSettings::default_path();
    let settings = MonitorSettings::load_or_create(&settings_path).await?;
    info!("Using settings from {}", settings_path.display());

    let mut monitor = Monitor::new(settings);
    monitor.restore().await;

    let settings = monitor.run(BufReader::new(tokio::io::stdin())).await?;

    if let Err(e) = settings.save_to(&settings_path).await {
        error!("Failed to save settings: {}", e);
    }
    info!("Bye");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    // Console rows go to stdout, diagnostics to stderr.
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}

use mirra::SettingsStore;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Logs go to stderr so they do not interleave with the rendered view.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let settings_store = SettingsStore::load();
    tracing::info!("using settings from {:?}", settings_store.config_path());

    if let Err(error) = mirra::driver::run(settings_store).await {
        tracing::error!("{error}");
        std::process::exit(1);
    }
}

use skyline_layout::api;
use skyline_layout::config::AppConfig;

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("⚠️ Could not load .env: {}", err);
        }
    }

    skyline_layout::init_tracing();

    let app_config = AppConfig::from_env();
    let api_config = app_config.api.clone();
    let engine_config = app_config.engine.clone();

    println!("🚀 Skyline layout service starting...");
    api::start_api_server(api_config, engine_config).await;
}

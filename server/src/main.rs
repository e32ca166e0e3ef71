use std::net::SocketAddr;
use tokio::net::TcpListener;

use matrix_collab_server::config::{generate_config_template, Config};
use matrix_collab_server::{auth, db, routes, state, ws};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("matrix_collab_server=info"))?;
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!(
        "Matrix collaboration server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let presence = config.presence.clone().unwrap_or_default();
    let algebra = config.algebra.clone().unwrap_or_default();
    tracing::info!(
        idle_timeout_secs = presence.idle_timeout_secs,
        reap_interval_secs = presence.reap_interval_secs,
        max_determinant_dimension = algebra.max_determinant_dimension,
        "Presence and algebra settings loaded"
    );

    let app_state = state::AppState::new(db, jwt_secret, presence, algebra);

    // Idle connection sweep
    ws::reaper::spawn_idle_reaper(app_state.clone());

    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

use std::env;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use schoolhub::handlers::user::bootstrap_admin;
use schoolhub::mail::MailService;
use schoolhub::permission::PermissionEnforcer;
use schoolhub::{db, routes, AppState, Config};

const DEFAULT_CONFIG: &str = "./etc/schoolhub.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "-help" || arg == "--help") {
        println!("Usage: schoolhub [OPTIONS]");
        println!("Options:");
        println!("  -config <path>  Path to configuration file (default: {})", DEFAULT_CONFIG);
        println!("  -help, --help   Print this help message");
        return Ok(());
    }

    let config_path = args
        .iter()
        .skip_while(|arg| arg.as_str() != "-config")
        .nth(1)
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    // Load configuration first (before logging init)
    let config = Config::load(&config_path).unwrap_or_else(|e| {
        eprintln!("Could not load config file: {}, using defaults", e);
        Config::default()
    });

    // Priority: RUST_LOG env var > config file > default "info"
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting SchoolHub server...");
    info!("Loading configuration from: {}", config_path);

    if let Err(e) = db::test_connection(&config.database).await {
        tracing::error!("Database is not reachable: {}", e);
        return Err(anyhow::anyhow!("Database is not reachable: {}", e));
    }

    let db_conn = db::init_database(&config.database).await.map_err(|e| {
        tracing::error!("Database initialization failed: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;

    let enforcer = PermissionEnforcer::new(db_conn.clone()).await.map_err(|e| {
        tracing::error!("Permission enforcer initialization failed: {}", e);
        anyhow::anyhow!("Permission enforcer initialization failed: {}", e)
    })?;
    enforcer.ensure_default_roles().await?;
    info!("Permission enforcer initialized");

    let mail = MailService::from_config(&config.mail);
    let state = AppState::new(db_conn, enforcer, config.clone(), mail);

    if config.bootstrap.is_configured() {
        bootstrap_admin(&state, &config.bootstrap).await?;
    }

    let app = routes::create_router(state);

    let addr: SocketAddr = match config.addr.parse() {
        Ok(addr) => addr,
        Err(_) => {
            tracing::warn!("Invalid address '{}', using default 0.0.0.0:8080", config.addr);
            SocketAddr::from(([0, 0, 0, 0], 8080))
        }
    };

    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

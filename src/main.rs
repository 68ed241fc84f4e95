use std::path::PathBuf;

use http::{header, Method};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use modelgate_core::state::AppState;
use modelgate_core::watchdog;

fn build_app(state: AppState) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:4173".parse().unwrap(),
            "http://localhost:5199".parse().unwrap(),
            "http://127.0.0.1:5199".parse().unwrap(),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::HeaderName::from_static("x-api-key")])
        .max_age(std::time::Duration::from_secs(86_400));

    // Rate limiting: 30 req burst, replenish 1 per 2 seconds, per IP
    // Jaskier Shared Pattern -- rate_limit
    let governor_conf = GovernorConfigBuilder::default().per_second(2).burst_size(30).finish().unwrap();

    modelgate_core::create_router(state)
        .layer(GovernorLayer::new(governor_conf))
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(header::X_CONTENT_TYPE_OPTIONS, header::HeaderValue::from_static("nosniff")))
        .layer(SetResponseHeaderLayer::overriding(header::X_FRAME_OPTIONS, header::HeaderValue::from_static("DENY")))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            header::HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            header::HeaderValue::from_static("max-age=63072000; includeSubDomains"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
}

fn resolve_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("TINGLY_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("could not determine home directory"))?;
    Ok(home.join(".tingly-box"))
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    match run().await {
        Ok(()) => std::process::ExitCode::from(0),
        Err(StartupError::InvalidConfig(e)) => {
            eprintln!("invalid config: {e:#}");
            std::process::ExitCode::from(2)
        }
        Err(StartupError::Fatal(e)) => {
            eprintln!("fatal startup error: {e:#}");
            std::process::ExitCode::from(1)
        }
    }
}

enum StartupError {
    InvalidConfig(anyhow::Error),
    Fatal(anyhow::Error),
}

async fn run() -> Result<(), StartupError> {
    use tracing_subscriber::EnvFilter;

    enable_ansi();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).with_ansi(true).init();
    }

    dotenvy::dotenv().ok();

    let config_dir = resolve_config_dir().map_err(StartupError::Fatal)?;
    std::fs::create_dir_all(&config_dir).map_err(|e| StartupError::Fatal(e.into()))?;

    let state = AppState::new(config_dir).map_err(StartupError::InvalidConfig)?;
    state.mark_ready();

    let _watchdog = watchdog::spawn(state.clone());

    let app = build_app(state);

    let host = std::env::var("TINGLY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("TINGLY_PORT").unwrap_or_else(|_| "8082".to_string()).parse().map_err(|e| {
        StartupError::Fatal(anyhow::anyhow!("invalid TINGLY_PORT: {e}"))
    })?;
    let addr: std::net::SocketAddr = format!("{host}:{port}").parse().map_err(|e| StartupError::Fatal(anyhow::anyhow!(e)))?;

    print_banner(port);
    tracing::info!("model gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| StartupError::Fatal(e.into()))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Fatal(e.into()))?;

    Ok(())
}

// Jaskier Shared Pattern -- enable ANSI colors on Windows consoles
#[cfg(windows)]
fn enable_ansi() {
    use windows::Win32::System::Console::{
        GetConsoleMode, GetStdHandle, SetConsoleMode, ENABLE_VIRTUAL_TERMINAL_PROCESSING, STD_ERROR_HANDLE, STD_OUTPUT_HANDLE,
    };
    for std_handle in [STD_OUTPUT_HANDLE, STD_ERROR_HANDLE] {
        unsafe {
            let Ok(handle) = GetStdHandle(std_handle) else {
                continue;
            };
            let mut mode = Default::default();
            if GetConsoleMode(handle, &mut mode).is_ok() {
                let _ = SetConsoleMode(handle, mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING);
            }
        }
    }
}
#[cfg(not(windows))]
fn enable_ansi() {}

fn print_banner(port: u16) {
    println!();
    println!("  \x1b[1;33m>>>  MODEL GATEWAY  <<<\x1b[0m");
    println!("  \x1b[33mOpenAI/Anthropic-compatible routing core\x1b[0m");
    println!("  \x1b[1;32mhttp://localhost:{port}\x1b[0m");
    println!();
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    tracing::info!("shutdown signal received, starting graceful shutdown");
}

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use shared::config::load_config;

use apiaryd::AppState;
use apiaryd::cache::SessionCache;
use apiaryd::database::create::create_tables;
use apiaryd::handlers::routes::handle_request;
use apiaryd::oauth::LinkOrchestrator;
use apiaryd::oauth::providers::Provider;
use apiaryd::security::{CredentialEngine, PermissionCatalog};
use apiaryd::service::{SessionService, UserService};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Arc::new(
        load_config(&config_path).with_context(|| format!("Failed to load {}", config_path))?,
    );

    let Some(pepper) = config.auth.resolved_pepper() else {
        bail!("No credential pepper configured; set AUTH_PEPPER or [auth].pepper");
    };
    let credentials = Arc::new(CredentialEngine::new(pepper)?);

    let db = tokio_rusqlite::Connection::open(&config.database.path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))?;
    create_tables(&db).await.context("Failed to prepare schema")?;

    let sessions = SessionService::new(
        db.clone(),
        SessionCache::new(),
        Arc::new(PermissionCatalog::builtin()),
    );
    let users = UserService::new(
        db,
        credentials,
        config.auth.merge_by_email,
        config.auth.default_roles.clone(),
    );

    let mut providers = HashMap::new();
    for (&platform, settings) in &config.oauth {
        providers.insert(platform, Provider::from_settings(platform, settings)?);
        info!("OAuth provider configured: {}", platform);
    }

    let state = AppState {
        oauth: LinkOrchestrator::new(
            providers,
            users.clone(),
            sessions.clone(),
            (config.auth.session_lifetime_hours * 3600) as i64,
        ),
        users,
        sessions: sessions.clone(),
        config: config.clone(),
    };

    // Periodic expired-session sweep.  Errors are logged, never fatal.
    let reaper_interval = Duration::from_secs(config.reaper.interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reaper_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sessions.reap_expired().await {
                Ok(reaped) if reaped > 0 => info!("Reaper removed {} session(s)", reaped),
                Ok(_) => {}
                Err(e) => warn!("Reaper sweep failed: {}", e),
            }
        }
    });

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("Invalid [server] bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();
        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(
                    io,
                    service_fn(move |req| handle_request(req, state.clone())),
                )
                .await
            {
                error!("Error serving connection: {:?}", err);
            }
        });
    }
}

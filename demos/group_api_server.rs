use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use group_tree::api::{GroupAppState, routes};
use group_tree::db::{PgGroupStore, create_group_tables};
use group_tree::store::{GroupStore, MemoryGroupStore};

const DEFAULT_BIND: &str = "127.0.0.1:4020";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

struct ServerConfig {
    bind_addr: SocketAddr,
    database_url: Option<String>,
    max_connections: u32,
}

impl ServerConfig {
    fn from_env() -> anyhow::Result<Self> {
        let bind = env::var("GROUP_API_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let bind_addr = bind
            .parse()
            .with_context(|| format!("invalid GROUP_API_BIND '{}'", bind))?;

        let max_connections = match env::var("GROUP_API_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("invalid GROUP_API_MAX_CONNECTIONS '{}'", value))?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());

        Ok(Self {
            bind_addr,
            database_url,
            max_connections,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("group_tree=info,group_api_server=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(database_url)
                .await
                .context("failed to connect to postgres")?;
            create_group_tables(&pool)
                .await
                .context("failed to run group migrations")?;

            tracing::info!("using postgres group store");
            serve(PgGroupStore::from_pool(&pool), config.bind_addr).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, groups are kept in memory");
            serve(MemoryGroupStore::new(), config.bind_addr).await
        }
    }
}

async fn serve<St: GroupStore>(store: St, bind_addr: SocketAddr) -> anyhow::Result<()> {
    let state = GroupAppState::new(Arc::new(store));

    let api = Router::new()
        .route("/healthz", get(health_handler))
        .merge(routes::<GroupAppState<St>>());

    let app = Router::new().nest("/api", api).with_state(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", bind_addr))?;

    tracing::info!(%bind_addr, "group api listening, base path /api");

    axum::serve(listener, app)
        .await
        .context("group api server failed")
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true
    }))
}

use axum::extract::DefaultBodyLimit;
use postboard_common::snowflake::{ProcessId, WorkerId};
use postboard_db::{client::DbClient, store::DbError};
use serde::Deserialize;
use server::{ServerState, realtime::PostEvents, uploads::DiskImageStore};
use sqlx::postgres::PgPoolOptions;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error connecting to database: {0}")]
    DatabaseConnect(sqlx::Error),
    #[error("Error migrating database: {0}")]
    Migrate(#[from] DbError),
    #[error("Error creating upload directory: {0}")]
    UploadDir(std::io::Error),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: String,
    #[serde(default)]
    worker_id: WorkerId,
    #[serde(default)]
    process_id: ProcessId,
    #[serde(default = "default_upload_base_dir")]
    upload_base_dir: PathBuf,
    #[serde(default = "default_upload_images_dir")]
    upload_images_dir: String,
    #[serde(default = "default_max_upload_bytes")]
    max_upload_bytes: usize,
    #[serde(default = "default_broadcast_capacity")]
    broadcast_capacity: usize,
}

fn default_upload_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_upload_images_dir() -> String {
    "images".to_owned()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_broadcast_capacity() -> usize {
    64
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "postboard_api=debug,postboard_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

/// Resolves on ctrl-c or SIGTERM and tells open sockets to close.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutting down");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let pool = PgPoolOptions::new()
        .connect(&env.database_url)
        .await
        .map_err(InitError::DatabaseConnect)?;
    let db_client = DbClient::new(pool, env.worker_id, env.process_id);
    db_client.migrate().await?;
    info!("Database migrated");

    let images = DiskImageStore::new(env.upload_base_dir, env.upload_images_dir);
    images.create_dirs().await.map_err(InitError::UploadDir)?;
    let images_route = format!("/{}", images.images_dir());
    let images_service = ServeDir::new(images.images_path());

    let shutdown = CancellationToken::new();
    let state = ServerState {
        store: Arc::new(db_client),
        images: Arc::new(images),
        events: PostEvents::new(env.broadcast_capacity),
        shutdown: shutdown.clone(),
    };

    let app = server::routes()
        .nest_service(&images_route, images_service)
        .layer(DefaultBodyLimit::max(env.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use pizarra_shared::{PUBLISH_DESTINATION, SUBSCRIPTION_TOPIC};
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;

mod handlers;
mod logic;
mod state;

use crate::handlers::ws_handler;
use crate::state::{AppState, Routes};

/// Development relay: a small STOMP broker that echoes whiteboard traffic to
/// every subscriber and serves the page.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    #[arg(long)]
    public_dir: Option<PathBuf>,
    /// `<app destination>=<topic>`, repeatable.
    #[arg(long = "route")]
    routes: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let default_route = format!("{PUBLISH_DESTINATION}={SUBSCRIPTION_TOPIC}");
    let entries: Vec<&str> = if args.routes.is_empty() {
        vec![default_route.as_str()]
    } else {
        args.routes.iter().map(String::as_str).collect()
    };
    let routes = match Routes::parse(entries) {
        Ok(routes) => routes,
        Err(error) => {
            tracing::error!("{error}");
            std::process::exit(2);
        }
    };

    let public_dir = args
        .public_dir
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../public"));

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .fallback_service(ServeDir::new(&public_dir).append_index_html_on_directories(true))
        .with_state(AppState::new(routes));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!(public_dir = %public_dir.display(), "whiteboard relay at http://localhost:{}", args.port);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%addr, %error, "failed to bind");
            std::process::exit(1);
        }
    };
    if let Err(error) = axum::serve(listener, app).await {
        tracing::error!(%error, "server stopped");
    }
}

mod context;
mod errors;
mod hub;
mod logging;
mod rooms;
mod socket;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
};

use log::{info, warn};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use watchroom_core::Config;

pub use context::*;
pub use errors::*;
pub use hub::*;
pub use logging::*;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Starts the watchroom signaling server
pub async fn run_server() -> std::io::Result<()> {
    let port = env::var("WATCHROOM_SERVER_PORT")
        .ok()
        .and_then(|x| match x.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                warn!("Port must be a number, got {}", x);
                None
            }
        })
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let context = ServerContext {
        hub: RelayHub::new(&Config::default()),
    };

    tokio::spawn(sweep_expired(context.hub.clone()));

    let version_one_router = Router::new()
        .nest("/socket", socket::router())
        .nest("/rooms", rooms::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, root_router.into_make_service()).await
}

use log::error;
use watchroom_server::{init_logger, run_server};

#[tokio::main]
async fn main() {
    if let Err(e) = init_logger() {
        eprintln!("Could not initialize logging: {}", e);
    }

    if let Err(e) = run_server().await {
        error!("Server stopped: {}", e);
    }
}

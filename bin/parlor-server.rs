//! parlor-server: chat server with an operator console.
//!
//! Usage: `parlor-server [port]`

use std::sync::Arc;

use parlor::chat::config::ServerConfig;
use parlor::chat::console::{self, Stdout};
use parlor::chat::server::{ServerConsole, ServerSession};
use parlor::chat::transport::TcpTransport;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout belongs to the console.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::from_args(std::env::args().skip(1)).with_env_overrides();
    info!(bind_ip = %config.bind_ip, port = config.port, "parlor server starting");

    let server = ServerConsole::new(
        ServerSession::new(),
        TcpTransport::new(config.bind_ip),
        config.port,
        Arc::new(Stdout),
    );

    if let Err(e) = server.start().await {
        error!("{e}");
        println!("ERROR - Could not listen for clients!");
        std::process::exit(1);
    }

    let code = console::run(&server, console::spawn_stdin_reader()).await;
    std::process::exit(i32::from(code));
}

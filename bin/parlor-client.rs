//! parlor-client: connect to a parlor server and chat from the console.
//!
//! Usage: `parlor-client <loginID> [port]`

use std::sync::Arc;

use parlor::chat::client::ClientSession;
use parlor::chat::config::ClientConfig;
use parlor::chat::console::{self, Stdout};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = match ClientConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config.with_env_overrides(),
        Err(e) => {
            println!("{e}");
            std::process::exit(1);
        }
    };

    let client = ClientSession::new(config, Arc::new(Stdout));
    if let Err(e) = client.open().await {
        error!("{e}");
        println!("Error: Can't setup connection! Terminating client.");
        std::process::exit(1);
    }

    let code = console::run(&client, console::spawn_stdin_reader()).await;
    std::process::exit(i32::from(code));
}

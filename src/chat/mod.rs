pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod console;
pub mod message;
pub mod registry;
pub mod server;
pub mod transport;

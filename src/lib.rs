//! Parlor, a small multi-user chat service.
//!
//! A server relays plain-text lines between named clients. Each client
//! opens with a `#loginID <id>` handshake; after that every line it sends
//! is broadcast to all logged-in clients as `<id>: <line>`. Both the server
//! and the client have a line-oriented console that understands a shared
//! `#command` grammar.

pub mod chat;

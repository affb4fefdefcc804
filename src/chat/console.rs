/// Line-oriented operator console shared by client and server.
///
/// Input is read on a dedicated OS thread (a blocked stdin read must not
/// hold up runtime shutdown) and handed to the async side over a channel.
/// [`run`] feeds each line to a [`ConsoleHandler`] until the handler
/// signals an exit code.
use std::future::Future;
use std::io::{self, BufRead};

use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Where a session shows text to its operator.
pub trait Console: Send + Sync {
    fn display(&self, message: &str);
}

/// Prints `> <message>` on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stdout;

impl Console for Stdout {
    fn display(&self, message: &str) {
        println!("> {message}");
    }
}

/// A session that consumes console lines.
pub trait ConsoleHandler: Send + Sync {
    fn handle_line(&self, line: &str) -> impl Future<Output = ()> + Send;

    /// Input reached end-of-file.
    fn on_input_closed(&self) -> impl Future<Output = ()> + Send;

    /// Shut the session down; must eventually publish `code` on
    /// [`exit_signal`](ConsoleHandler::exit_signal).
    fn shutdown(&self, code: u8) -> impl Future<Output = ()> + Send;

    fn exit_signal(&self) -> watch::Receiver<Option<u8>>;

    fn console(&self) -> &dyn Console;
}

/// Read stdin line by line on its own thread.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Drive `handler` from `input` until it publishes an exit code.
///
/// A read error is reported, then the session is shut down with code 1.
/// After end-of-file the loop keeps waiting for the exit signal, so a
/// handler may keep running without a console.
pub async fn run<H: ConsoleHandler>(
    handler: &H,
    mut input: mpsc::UnboundedReceiver<io::Result<String>>,
) -> u8 {
    let mut exit = handler.exit_signal();
    let mut input_open = true;

    loop {
        let published = *exit.borrow_and_update();
        if let Some(code) = published {
            return code;
        }

        tokio::select! {
            biased;

            changed = exit.changed() => {
                if changed.is_err() {
                    return 1;
                }
            }

            line = input.recv(), if input_open => match line {
                Some(Ok(line)) => handler.handle_line(&line).await,
                Some(Err(e)) => {
                    warn!("console read failed: {e}");
                    handler
                        .console()
                        .display("Unexpected error while reading from console!");
                    input_open = false;
                    handler.shutdown(1).await;
                }
                None => {
                    input_open = false;
                    handler.on_input_closed().await;
                }
            },
        }
    }
}

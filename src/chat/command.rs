/// Console command grammar shared by the client and server consoles.
///
/// A console line is one of:
///
/// - blank: ignored
/// - `#name`: a bare command
/// - `#name <argument>`: a command taking one argument; the argument is
///   the rest of the line after the first run of whitespace, trimmed
/// - anything else: a chat message, passed through verbatim
///
/// Each side declares its legal commands in a static table of
/// [`CommandSpec`]s. Names are case-sensitive and must match exactly.
use super::config::parse_port;

/// First character of every console command.
pub const PREFIX: char = '#';

/// What a command table entry accepts and how it builds the typed command.
pub enum Arity<C: 'static> {
    /// No argument; the command value is used as-is.
    Bare(C),
    /// Exactly one argument, described by `label` in error messages.
    WithArg {
        label: &'static str,
        build: fn(&str) -> Result<C, CommandError>,
    },
}

/// One row of a command table.
pub struct CommandSpec<C: 'static> {
    pub name: &'static str,
    pub arity: Arity<C>,
}

/// How one console line was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<C> {
    Blank,
    Message(String),
    Command(C),
}

/// Why a `#` line could not be turned into a command.
///
/// The `Display` text is what the console shows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Not a valid command.")]
    Unknown(String),
    #[error("Error: missing {0}.")]
    MissingArgument(&'static str),
    #[error("Error: #{0} takes no argument.")]
    UnexpectedArgument(String),
    #[error("Error: invalid {label}: {value}")]
    InvalidArgument { label: &'static str, value: String },
}

/// Classify `line` against a command table.
pub fn interpret<C: Clone>(line: &str, commands: &[CommandSpec<C>]) -> Result<Line<C>, CommandError> {
    if line.trim().is_empty() {
        return Ok(Line::Blank);
    }

    let Some(body) = line.strip_prefix(PREFIX) else {
        return Ok(Line::Message(line.to_owned()));
    };

    let (name, argument) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest.trim()).filter(|arg| !arg.is_empty())),
        None => (body, None),
    };

    let spec = commands
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| CommandError::Unknown(name.to_owned()))?;

    match (&spec.arity, argument) {
        (Arity::Bare(command), None) => Ok(Line::Command(command.clone())),
        (Arity::Bare(_), Some(_)) => Err(CommandError::UnexpectedArgument(name.to_owned())),
        (Arity::WithArg { label, .. }, None) => Err(CommandError::MissingArgument(*label)),
        (Arity::WithArg { build, .. }, Some(argument)) => (*build)(argument).map(Line::Command),
    }
}

fn port_argument<C>(argument: &str, wrap: fn(u16) -> C) -> Result<C, CommandError> {
    parse_port(argument)
        .map(wrap)
        .ok_or_else(|| CommandError::InvalidArgument {
            label: "port",
            value: argument.to_owned(),
        })
}

// ── Client console ───────────────────────────────────────────────

/// Commands accepted by the client console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Quit,
    Logoff,
    GetHost,
    GetPort,
    Login(String),
    SetHost(String),
    SetPort(u16),
}

fn client_login(argument: &str) -> Result<ClientCommand, CommandError> {
    Ok(ClientCommand::Login(argument.to_owned()))
}

fn client_sethost(argument: &str) -> Result<ClientCommand, CommandError> {
    Ok(ClientCommand::SetHost(argument.to_owned()))
}

fn client_setport(argument: &str) -> Result<ClientCommand, CommandError> {
    port_argument(argument, ClientCommand::SetPort)
}

pub static CLIENT_COMMANDS: [CommandSpec<ClientCommand>; 7] = [
    CommandSpec { name: "quit", arity: Arity::Bare(ClientCommand::Quit) },
    CommandSpec { name: "logoff", arity: Arity::Bare(ClientCommand::Logoff) },
    CommandSpec { name: "gethost", arity: Arity::Bare(ClientCommand::GetHost) },
    CommandSpec { name: "getport", arity: Arity::Bare(ClientCommand::GetPort) },
    CommandSpec { name: "login", arity: Arity::WithArg { label: "login ID", build: client_login } },
    CommandSpec { name: "sethost", arity: Arity::WithArg { label: "host", build: client_sethost } },
    CommandSpec { name: "setport", arity: Arity::WithArg { label: "port", build: client_setport } },
];

impl ClientCommand {
    /// Classify a line typed on the client console.
    pub fn parse_line(line: &str) -> Result<Line<Self>, CommandError> {
        interpret(line, &CLIENT_COMMANDS)
    }
}

// ── Server console ───────────────────────────────────────────────

/// Commands accepted by the server console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Quit,
    Stop,
    Close,
    GetPort,
    Start,
    SetPort(u16),
}

fn server_setport(argument: &str) -> Result<ServerCommand, CommandError> {
    port_argument(argument, ServerCommand::SetPort)
}

pub static SERVER_COMMANDS: [CommandSpec<ServerCommand>; 6] = [
    CommandSpec { name: "quit", arity: Arity::Bare(ServerCommand::Quit) },
    CommandSpec { name: "stop", arity: Arity::Bare(ServerCommand::Stop) },
    CommandSpec { name: "close", arity: Arity::Bare(ServerCommand::Close) },
    CommandSpec { name: "getport", arity: Arity::Bare(ServerCommand::GetPort) },
    CommandSpec { name: "start", arity: Arity::Bare(ServerCommand::Start) },
    CommandSpec { name: "setport", arity: Arity::WithArg { label: "port", build: server_setport } },
];

impl ServerCommand {
    /// Classify a line typed on the server console.
    pub fn parse_line(line: &str) -> Result<Line<Self>, CommandError> {
        interpret(line, &SERVER_COMMANDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ── Classification ───────────────────────────────────────────

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(ClientCommand::parse_line(""), Ok(Line::Blank));
        assert_eq!(ClientCommand::parse_line("   \t"), Ok(Line::Blank));
        assert_eq!(ServerCommand::parse_line(""), Ok(Line::Blank));
    }

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(
            ClientCommand::parse_line("hello there"),
            Ok(Line::Message("hello there".into()))
        );
    }

    #[test]
    fn message_is_verbatim() {
        assert_eq!(
            ClientCommand::parse_line("  indented #not-a-command  "),
            Ok(Line::Message("  indented #not-a-command  ".into()))
        );
    }

    #[test]
    fn bare_commands() {
        assert_eq!(ClientCommand::parse_line("#quit"), Ok(Line::Command(ClientCommand::Quit)));
        assert_eq!(ClientCommand::parse_line("#logoff"), Ok(Line::Command(ClientCommand::Logoff)));
        assert_eq!(ClientCommand::parse_line("#gethost"), Ok(Line::Command(ClientCommand::GetHost)));
        assert_eq!(ClientCommand::parse_line("#getport"), Ok(Line::Command(ClientCommand::GetPort)));
    }

    #[test]
    fn trailing_whitespace_does_not_make_an_argument() {
        assert_eq!(ClientCommand::parse_line("#quit  "), Ok(Line::Command(ClientCommand::Quit)));
    }

    #[test]
    fn argument_commands() {
        assert_eq!(
            ClientCommand::parse_line("#login alice"),
            Ok(Line::Command(ClientCommand::Login("alice".into())))
        );
        assert_eq!(
            ClientCommand::parse_line("#sethost chat.example.org"),
            Ok(Line::Command(ClientCommand::SetHost("chat.example.org".into())))
        );
        assert_eq!(
            ClientCommand::parse_line("#setport 6000"),
            Ok(Line::Command(ClientCommand::SetPort(6000)))
        );
    }

    #[test]
    fn argument_is_rest_of_line() {
        assert_eq!(
            ClientCommand::parse_line("#login   alice  smith "),
            Ok(Line::Command(ClientCommand::Login("alice  smith".into())))
        );
    }

    #[test]
    fn tab_separates_argument() {
        assert_eq!(
            ClientCommand::parse_line("#login\tbob"),
            Ok(Line::Command(ClientCommand::Login("bob".into())))
        );
    }

    // ── Errors ───────────────────────────────────────────────────

    #[test]
    fn login_without_id() {
        let err = ClientCommand::parse_line("#login").unwrap_err();
        assert_eq!(err, CommandError::MissingArgument("login ID"));
        assert_eq!(err.to_string(), "Error: missing login ID.");
    }

    #[test]
    fn unknown_commands() {
        let err = ClientCommand::parse_line("#dance").unwrap_err();
        assert_eq!(err, CommandError::Unknown("dance".into()));
        assert_eq!(err.to_string(), "Not a valid command.");

        assert_eq!(
            ClientCommand::parse_line("#dance now"),
            Err(CommandError::Unknown("dance".into()))
        );
        assert_eq!(ClientCommand::parse_line("#"), Err(CommandError::Unknown(String::new())));
    }

    #[test]
    fn names_are_case_sensitive() {
        assert_eq!(
            ClientCommand::parse_line("#QUIT"),
            Err(CommandError::Unknown("QUIT".into()))
        );
        assert_eq!(
            ClientCommand::parse_line("#log"),
            Err(CommandError::Unknown("log".into()))
        );
    }

    #[test]
    fn bare_command_rejects_argument() {
        let err = ClientCommand::parse_line("#quit now").unwrap_err();
        assert_eq!(err, CommandError::UnexpectedArgument("quit".into()));
        assert_eq!(err.to_string(), "Error: #quit takes no argument.");
    }

    #[test]
    fn setport_rejects_bad_ports() {
        for bad in ["#setport 0", "#setport 70000", "#setport abc"] {
            assert!(
                matches!(
                    ClientCommand::parse_line(bad),
                    Err(CommandError::InvalidArgument { label: "port", .. })
                ),
                "{bad} should be rejected"
            );
        }
        assert_eq!(
            ServerCommand::parse_line("#setport abc").unwrap_err().to_string(),
            "Error: invalid port: abc"
        );
    }

    // ── Per-side tables ──────────────────────────────────────────

    #[test]
    fn server_commands() {
        assert_eq!(ServerCommand::parse_line("#quit"), Ok(Line::Command(ServerCommand::Quit)));
        assert_eq!(ServerCommand::parse_line("#stop"), Ok(Line::Command(ServerCommand::Stop)));
        assert_eq!(ServerCommand::parse_line("#close"), Ok(Line::Command(ServerCommand::Close)));
        assert_eq!(ServerCommand::parse_line("#getport"), Ok(Line::Command(ServerCommand::GetPort)));
        assert_eq!(ServerCommand::parse_line("#start"), Ok(Line::Command(ServerCommand::Start)));
        assert_eq!(
            ServerCommand::parse_line("#setport 7777"),
            Ok(Line::Command(ServerCommand::SetPort(7777)))
        );
    }

    #[test]
    fn sides_do_not_share_commands() {
        assert_eq!(
            ServerCommand::parse_line("#login alice"),
            Err(CommandError::Unknown("login".into()))
        );
        assert_eq!(
            ClientCommand::parse_line("#start"),
            Err(CommandError::Unknown("start".into()))
        );
    }
}

/// Wire payloads and the fixed notice texts the server broadcasts.
///
/// A payload is one line of text. The only structured payload is the
/// handshake, `#loginID <id>`, which a client sends first after
/// connecting; every other line is chat.
/// Keyword that opens a handshake payload.
pub const HANDSHAKE_KEYWORD: &str = "#loginID";

/// Reply to a handshake on a connection that may not log in again.
pub const ALREADY_CONNECTED: &str = "ERROR - already connected.";

/// Reply to a handshake that carried no login ID.
pub const MISSING_LOGIN_ID: &str = "ERROR - missing login ID.";

/// Reply to chat sent before the handshake.
pub const NOT_LOGGED_IN: &str = "ERROR - not logged in.";

/// Broadcast before `#close` force-disconnects everyone.
pub const ABNORMAL_TERMINATION: &str = "Abnormal termination of connection.";

/// Broadcast by `#stop`, one line each.
pub const STOP_WARNING: [&str; 2] = [
    "WARNING - The server has stopped listening for connections",
    "SERVER SHUTTING DOWN! DISCONNECTING!",
];

/// Marker prepended to lines typed on the server console.
pub const SERVER_MESSAGE_PREFIX: &str = "SERVER MSG> ";

/// A parsed inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// `#loginID <id>`.
    Handshake { login_id: String },
    /// Anything else, kept verbatim.
    Chat(String),
}

/// Errors that can occur during payload parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("handshake without a login ID")]
    MissingLoginId,
}

impl Payload {
    /// Build the handshake a client sends after connecting.
    pub fn handshake(login_id: impl Into<String>) -> Self {
        Payload::Handshake {
            login_id: login_id.into(),
        }
    }

    /// Classify one line received from a client.
    ///
    /// The login ID is the rest of the line after the keyword, trimmed,
    /// so IDs may contain interior spaces.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let Some(rest) = line.strip_prefix(HANDSHAKE_KEYWORD) else {
            return Ok(Payload::Chat(line.to_owned()));
        };

        // `#loginIDs` is chat, not a handshake.
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return Ok(Payload::Chat(line.to_owned()));
        }

        let login_id = rest.trim();
        if login_id.is_empty() {
            return Err(ParseError::MissingLoginId);
        }

        Ok(Payload::Handshake {
            login_id: login_id.to_owned(),
        })
    }

    /// Serialize to the wire format (without line terminator).
    pub fn to_wire(&self) -> String {
        match self {
            Payload::Handshake { login_id } => format!("{HANDSHAKE_KEYWORD} {login_id}"),
            Payload::Chat(text) => text.clone(),
        }
    }
}

/// `<id> has logged on.`
pub fn logged_on(login_id: &str) -> String {
    format!("{login_id} has logged on.")
}

/// `<id> has disconnected.`
pub fn disconnected(login_id: &str) -> String {
    format!("{login_id} has disconnected.")
}

/// `<id>: <text>`, the form every relayed chat line takes.
pub fn relayed(login_id: &str, text: &str) -> String {
    format!("{login_id}: {text}")
}

/// A server console line as broadcast to clients.
pub fn server_message(text: &str) -> String {
    format!("{SERVER_MESSAGE_PREFIX}{text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ── Parsing ──────────────────────────────────────────────────

    #[test]
    fn parse_handshake() {
        assert_eq!(
            Payload::parse("#loginID alice").unwrap(),
            Payload::handshake("alice")
        );
    }

    #[test]
    fn parse_handshake_keeps_spaces_in_id() {
        assert_eq!(
            Payload::parse("#loginID  alice smith ").unwrap(),
            Payload::handshake("alice smith")
        );
    }

    #[test]
    fn parse_handshake_without_id() {
        assert_eq!(Payload::parse("#loginID"), Err(ParseError::MissingLoginId));
        assert_eq!(Payload::parse("#loginID   "), Err(ParseError::MissingLoginId));
    }

    #[test]
    fn parse_keyword_prefix_is_chat() {
        assert_eq!(
            Payload::parse("#loginIDs are fun").unwrap(),
            Payload::Chat("#loginIDs are fun".into())
        );
    }

    #[test]
    fn parse_chat_is_verbatim() {
        assert_eq!(
            Payload::parse("  hello, world  ").unwrap(),
            Payload::Chat("  hello, world  ".into())
        );
    }

    #[test]
    fn parse_empty_line_is_chat() {
        assert_eq!(Payload::parse("").unwrap(), Payload::Chat(String::new()));
    }

    // ── Serialization ────────────────────────────────────────────

    #[test]
    fn handshake_wire_format() {
        assert_eq!(Payload::handshake("bob").to_wire(), "#loginID bob");
    }

    #[test]
    fn handshake_survives_reparse() {
        let hs = Payload::handshake("carol");
        assert_eq!(Payload::parse(&hs.to_wire()).unwrap(), hs);
    }

    // ── Notices ──────────────────────────────────────────────────

    #[test]
    fn notice_texts() {
        assert_eq!(logged_on("alice"), "alice has logged on.");
        assert_eq!(disconnected("alice"), "alice has disconnected.");
        assert_eq!(relayed("alice", "hello"), "alice: hello");
        assert_eq!(server_message("maintenance at 5"), "SERVER MSG> maintenance at 5");
    }
}

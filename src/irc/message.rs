/// IRC message parsing.
///
/// Inbound line format:
///   [`:`source SPACE] command [SPACE args...] [SPACE `:` trailing]
///
/// Lines arrive with or without their `\r\n` terminator; it is stripped here.
/// Only the first `" :"` separates the trailing text, so colons inside the
/// trailing text are kept verbatim.
use std::fmt;

/// Decomposed `nick!user@host` source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hostmask {
    pub nick: String,
    pub user: String,
    pub host: String,
}

impl Hostmask {
    /// Split a source on its first `!` and first `@`, which must appear in
    /// that order.
    ///
    /// Server names and other sources without both markers yield `None`.
    pub fn parse(source: &str) -> Option<Self> {
        let bang = source.find('!')?;
        let at = source.find('@')?;
        if at < bang {
            return None;
        }
        Some(Self {
            nick: source[..bang].to_owned(),
            user: source[bang + 1..at].to_owned(),
            host: source[at + 1..].to_owned(),
        })
    }
}

/// One parsed inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The line as received, terminator stripped.
    pub raw: String,
    /// Source prefix without the leading `:` (server name or `nick!user@host`).
    pub source: Option<String>,
    /// Present when the source matched `nick!user@host`.
    pub hostmask: Option<Hostmask>,
    /// Uppercased command (`PRIVMSG`, `001`, ...).
    pub command: String,
    /// Positional arguments between the command and the trailing text.
    pub args: Vec<String>,
    /// Free text after the first `" :"`.
    pub message: Option<String>,
    /// Set by the connection's auto-responders; handled events are not
    /// delivered to the event stream.
    pub handled: bool,
}

/// Errors that can occur during message parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("prefix present but missing command")]
    MissingCommand,
}

impl Event {
    /// Parse a single IRC line.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let input = input.trim_end_matches(|c| c == '\r' || c == '\n');

        if input.is_empty() {
            return Err(ParseError::Empty);
        }

        let (source, rest) = match input.strip_prefix(':') {
            // Source runs until the first space.
            Some(prefixed) => match prefixed.split_once(' ') {
                Some((source, rest)) => (Some(source), rest),
                None => return Err(ParseError::MissingCommand),
            },
            None => (None, input),
        };

        let (head, message) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing.to_owned())),
            None => (rest, None),
        };

        let mut tokens = head.split(' ');
        let command = tokens.next().unwrap_or_default().to_ascii_uppercase();
        let args = tokens.map(str::to_owned).collect();

        Ok(Event {
            raw: input.to_owned(),
            source: source.map(str::to_owned),
            hostmask: source.and_then(Hostmask::parse),
            command,
            args,
            message,
            handled: false,
        })
    }

    /// Nick of the sender, when the source is a full hostmask.
    pub fn nick(&self) -> Option<&str> {
        self.hostmask.as_ref().map(|m| m.nick.as_str())
    }

    /// Trailing text, or the empty string.
    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ── Parsing basics ───────────────────────────────────────────

    #[test]
    fn parse_full_hostmask_line() {
        let ev = Event::parse(":nick!user@host privmsg a b :trailing").unwrap();
        assert_eq!(ev.source.as_deref(), Some("nick!user@host"));
        assert_eq!(
            ev.hostmask,
            Some(Hostmask {
                nick: "nick".into(),
                user: "user".into(),
                host: "host".into(),
            })
        );
        assert_eq!(ev.command, "PRIVMSG");
        assert_eq!(ev.args, vec!["a", "b"]);
        assert_eq!(ev.message.as_deref(), Some("trailing"));
        assert!(!ev.handled);
    }

    #[test]
    fn parse_simple_command() {
        let ev = Event::parse("QUIT").unwrap();
        assert_eq!(ev.source, None);
        assert_eq!(ev.hostmask, None);
        assert_eq!(ev.command, "QUIT");
        assert_eq!(ev.args, Vec::<String>::new());
        assert_eq!(ev.message, None);
    }

    #[test]
    fn parse_without_prefix_has_no_source() {
        let ev = Event::parse("PING :irc.example.net").unwrap();
        assert_eq!(ev.source, None);
        assert_eq!(ev.nick(), None);
        assert_eq!(ev.command, "PING");
        assert_eq!(ev.text(), "irc.example.net");
    }

    #[test]
    fn parse_server_source_keeps_hostmask_empty() {
        let ev = Event::parse(":irc.example.net 001 ticker :Welcome to the network").unwrap();
        assert_eq!(ev.source.as_deref(), Some("irc.example.net"));
        assert_eq!(ev.hostmask, None);
        assert_eq!(ev.command, "001");
        assert_eq!(ev.args, vec!["ticker"]);
        assert_eq!(ev.text(), "Welcome to the network");
    }

    #[test]
    fn parse_lowercase_command_is_uppercased() {
        let ev = Event::parse("notice ticker :hi").unwrap();
        assert_eq!(ev.command, "NOTICE");
    }

    #[test]
    fn parse_strips_crlf() {
        let ev = Event::parse("PING :server\r\n").unwrap();
        assert_eq!(ev.raw, "PING :server");
        assert_eq!(ev.text(), "server");
    }

    #[test]
    fn parse_keeps_raw_line() {
        let line = ":NickServ!NickServ@services. NOTICE ticker :This nickname is registered";
        let ev = Event::parse(line).unwrap();
        assert_eq!(ev.raw, line);
        assert_eq!(ev.to_string(), line);
        assert_eq!(ev.nick(), Some("NickServ"));
    }

    // ── Parsing edge cases ───────────────────────────────────────

    #[test]
    fn parse_trailing_empty_string() {
        let ev = Event::parse("TOPIC #ticker :").unwrap();
        assert_eq!(ev.args, vec!["#ticker"]);
        assert_eq!(ev.message.as_deref(), Some(""));
    }

    #[test]
    fn parse_trailing_keeps_later_separators() {
        let ev = Event::parse("PRIVMSG #ticker :a :b ::)").unwrap();
        assert_eq!(ev.message.as_deref(), Some("a :b ::)"));
    }

    #[test]
    fn parse_at_before_bang_is_not_a_hostmask() {
        let ev = Event::parse(":weird@host!x JOIN #ticker").unwrap();
        assert_eq!(ev.source.as_deref(), Some("weird@host!x"));
        assert_eq!(ev.hostmask, None);
    }

    #[test]
    fn parse_prefix_with_space_but_nothing_after() {
        let ev = Event::parse(":irc.example.net ").unwrap();
        assert_eq!(ev.source.as_deref(), Some("irc.example.net"));
        assert_eq!(ev.command, "");
    }

    // ── Parse errors ─────────────────────────────────────────────

    #[test]
    fn parse_empty_input() {
        assert_eq!(Event::parse(""), Err(ParseError::Empty));
        assert_eq!(Event::parse("\r\n"), Err(ParseError::Empty));
    }

    #[test]
    fn parse_prefix_only() {
        assert_eq!(Event::parse(":prefix_only"), Err(ParseError::MissingCommand));
        assert_eq!(Event::parse(":"), Err(ParseError::MissingCommand));
    }
}

//! Line commands typed at the prompt.

use chrono::Local;
use cloak_core::Message;

pub const HELP: &str = "\
Commands:
  <text>                 broadcast to everyone
  /dm <user> <text>      direct message (end-to-end encrypted)
  /peers                 ask the relay for its peer list
  /who                   show online users and session state
  /keys                  show key readiness and fingerprint
  /reset-keys            generate and publish a new key pair
  /forget <user>         drop the cached key for a user
  /help                  show this help
  /quit                  leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Broadcast(String),
    Direct { recipient: String, body: String },
    Peers,
    Who,
    Keys,
    ResetKeys,
    Forget(String),
    Help,
    Quit,
    /// Recognised command with bad arguments; carries the usage line
    Usage(&'static str),
    Unknown(String),
}

/// `None` for blank lines
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::Broadcast(line.to_string()));
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    let command = match name {
        "/dm" | "/msg" => match rest.split_once(char::is_whitespace) {
            Some((recipient, body)) if !body.trim().is_empty() => Command::Direct {
                recipient: recipient.to_string(),
                body: body.trim().to_string(),
            },
            _ => Command::Usage("/dm <user> <text>"),
        },
        "/peers" => Command::Peers,
        "/who" => Command::Who,
        "/keys" => Command::Keys,
        "/reset-keys" => Command::ResetKeys,
        "/forget" if !rest.is_empty() && !rest.contains(char::is_whitespace) => {
            Command::Forget(rest.to_string())
        }
        "/forget" => Command::Usage("/forget <user>"),
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

/// One log entry as a terminal line
pub fn render(message: &Message) -> String {
    let time = message.timestamp.with_timezone(&Local).format("%H:%M:%S");

    let route = match &message.recipient {
        Some(recipient) if message.is_directed => format!("{} -> {}", message.sender, recipient),
        _ => message.sender.clone(),
    };

    let marker = if message.undecryptable {
        " [undecryptable]"
    } else if message.is_directed && !message.encrypted {
        " [unencrypted]"
    } else {
        ""
    };

    format!("[{}] {}: {}{}", time, route, message.body, marker)
}

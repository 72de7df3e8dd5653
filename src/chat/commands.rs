//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the client without posting a message.

/// A parsed chat command.
///
/// These commands are handled locally and never sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Show the name this session posts as.
    Whoami,

    /// Show the current draft.
    Draft,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be posted as a message.
///
/// # Examples
///
/// ```
/// # use livechat::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert_eq!(parse_command("/whoami"), Some(ChatCommand::Whoami));
/// assert!(parse_command("Hello, everyone!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match (command.as_str(), argument) {
        ("help" | "?", _) => ChatCommand::Help,
        ("quit" | "exit" | "q", _) => ChatCommand::Quit,
        ("whoami", None) => ChatCommand::Whoami,
        ("whoami", Some(_)) => {
            ChatCommand::Invalid("/whoami takes no arguments; the name is fixed".to_string())
        }
        ("draft", None) => ChatCommand::Draft,
        ("draft", Some(_)) => ChatCommand::Invalid(
            "/draft takes no arguments; type a line to post it".to_string(),
        ),
        ("", _) => ChatCommand::Invalid("Empty command; try /help".to_string()),
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };
    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /whoami                Show the name you post as
  /draft                 Show the message waiting to be sent
  /help                  Show this help message
  /quit                  Exit the chat (Ctrl+D also works)

Any other line is posted as a message."#
}

//! Inbound text to command mapping

pub(crate) const START_REPLY: &str = "Hello! I'm alive. Use /help for commands.";
pub(crate) const HELP_REPLY: &str = "Available commands: /start, /help, /process, /clear";
pub(crate) const CLEARED_REPLY: &str = "Cleared.";
pub(crate) const NOTHING_TO_CLEAR_REPLY: &str = "Nothing to clear.";

/// What an inbound text message asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// Flush pending entries now
    Process,
    /// Reset the conversation
    Clear,
    /// Drop the last summary line
    RemoveLast,
    /// A marked entry
    Entry,
}

impl Command {
    /// Parse `text`, or `None` when it should be ignored.
    ///
    /// Slash commands may carry a `@botname` suffix and trailing arguments;
    /// when `bot_username` is known, a suffix naming another bot is ignored.
    /// The remove-last command must match exactly, so `.-` never becomes an
    /// entry.
    pub fn parse(
        text: &str,
        marker: char,
        remove_last: &str,
        bot_username: Option<&str>,
    ) -> Option<Self> {
        let trimmed = text.trim();

        if trimmed == remove_last {
            return Some(Command::RemoveLast);
        }

        if let Some(rest) = trimmed.strip_prefix('/') {
            let word = rest.split_whitespace().next().unwrap_or_default();
            let (name, addressee) = match word.split_once('@') {
                Some((name, addressee)) => (name, Some(addressee)),
                None => (word, None),
            };
            if let (Some(addressee), Some(ours)) = (addressee, bot_username) {
                if !addressee.eq_ignore_ascii_case(ours) {
                    return None;
                }
            }
            return match name.to_lowercase().as_str() {
                "start" => Some(Command::Start),
                "help" => Some(Command::Help),
                "process" => Some(Command::Process),
                "clear" => Some(Command::Clear),
                _ => None,
            };
        }

        if text.starts_with(marker) {
            return Some(Command::Entry);
        }

        None
    }
}

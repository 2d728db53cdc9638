//! The engine's control surface: commands and the line protocol that carries them.

use configuration::Config;

/// Prefix for account snapshots written to stdout.
pub const ACCOUNT_INFO_PREFIX: &str = "__ACCOUNT_INFO_JSON__:";

/// Stdin line asking the binary to re-read its configuration file.
pub const RELOAD_CONFIG_LINE: &str = "__RELOAD_CONFIG__";

/// Commands accepted while the engine runs. All of them are idempotent.
#[derive(Debug, Clone)]
pub enum ControlCommand {
    /// Resume scanning for entries.
    Start,
    /// Stop opening positions at the next cycle boundary. Open positions stay managed.
    Stop,
    /// Close every open position now.
    CloseAll,
    /// Publish an account snapshot.
    Refresh,
    /// Swap in a new configuration at the next cycle boundary.
    Reload(Box<Config>),
    Shutdown,
}

/// Maps a stdin line to a command. Unknown lines are ignored.
pub fn parse_stdin_line(line: &str) -> Option<ControlCommand> {
    match line.trim() {
        "__START_TRADING__" => Some(ControlCommand::Start),
        "__STOP__" => Some(ControlCommand::Stop),
        "__CLOSE_ALL_POSITIONS__" => Some(ControlCommand::CloseAll),
        "__REFRESH__" => Some(ControlCommand::Refresh),
        "__SHUTDOWN__" => Some(ControlCommand::Shutdown),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_lines() {
        assert!(matches!(parse_stdin_line("__START_TRADING__\n"), Some(ControlCommand::Start)));
        assert!(matches!(parse_stdin_line("  __CLOSE_ALL_POSITIONS__ "), Some(ControlCommand::CloseAll)));
        assert!(matches!(parse_stdin_line("__REFRESH__"), Some(ControlCommand::Refresh)));
        assert!(parse_stdin_line("hello").is_none());
        assert!(parse_stdin_line("").is_none());
    }
}

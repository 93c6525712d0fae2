use std::fmt;

/// Machine-readable error codes surfaced through notices and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    ConfigOutOfRange,
    ItemNotFound,
    DeepLinkNotFound,
    PollFailed,
    ChannelClosed,
    MutationFailed,
    CommitFailed,
    EngineDisposed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::ConfigOutOfRange => "E1002",
            Self::ItemNotFound => "E2001",
            Self::DeepLinkNotFound => "E2002",
            Self::PollFailed => "E3001",
            Self::ChannelClosed => "E3002",
            Self::MutationFailed => "E4001",
            Self::CommitFailed => "E4002",
            Self::EngineDisposed => "E9001",
        }
    }

    /// Short human-facing summary for notices and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::ConfigOutOfRange => "Config value out of valid range",
            Self::ItemNotFound => "Work item not found in visible queue",
            Self::DeepLinkNotFound => "Deep-linked case not in queue",
            Self::PollFailed => "Snapshot poll failed",
            Self::ChannelClosed => "Push channel disconnected",
            Self::MutationFailed => "Action failed on the backend",
            Self::CommitFailed => "Deferred action failed on the backend",
            Self::EngineDisposed => "Engine already disposed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in docket/config.toml and retry."),
            Self::ConfigOutOfRange => {
                Some("Keep poll_interval within 10-30 seconds; timers must be positive.")
            }
            Self::ItemNotFound => Some("The queue may have refreshed; re-select and retry."),
            Self::DeepLinkNotFound => {
                Some("The case may already be resolved; the queue fell back to its first item.")
            }
            Self::PollFailed => Some("Data may be stale; the next scheduled poll retries."),
            Self::ChannelClosed => Some("Reconnecting automatically; polling continues meanwhile."),
            Self::MutationFailed => Some("The item was restored to the queue; retry the action."),
            Self::CommitFailed => Some("The item was restored to the queue; retry the action."),
            Self::EngineDisposed => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 9] = [
        ErrorCode::ConfigParseError,
        ErrorCode::ConfigOutOfRange,
        ErrorCode::ItemNotFound,
        ErrorCode::DeepLinkNotFound,
        ErrorCode::PollFailed,
        ErrorCode::ChannelClosed,
        ErrorCode::MutationFailed,
        ErrorCode::CommitFailed,
        ErrorCode::EngineDisposed,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let text = code.code();
            assert_eq!(text.len(), 5);
            assert!(text.starts_with('E'));
            assert!(text.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of the media path a browser session plays.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Publisher,
    Subscriber,
}

impl SessionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "publisher" => Some(Self::Publisher),
            "subscriber" => Some(Self::Subscriber),
            _ => None,
        }
    }

    /// The other side of the pair.
    pub fn peer(&self) -> Self {
        match self {
            Self::Publisher => Self::Subscriber,
            Self::Subscriber => Self::Publisher,
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one browser session.
///
/// `Closed` and `Failed` are terminal. Valid transitions are enforced
/// by the engine's session state machine, not here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Uninitialized,
    Launched,
    Navigated,
    ChannelJoined,
    StreamActive,
    ReadyForVerification,
    Closed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Launched => "launched",
            Self::Navigated => "navigated",
            Self::ChannelJoined => "channel_joined",
            Self::StreamActive => "stream_active",
            Self::ReadyForVerification => "ready_for_verification",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uninitialized" => Some(Self::Uninitialized),
            "launched" => Some(Self::Launched),
            "navigated" => Some(Self::Navigated),
            "channel_joined" => Some(Self::ChannelJoined),
            "stream_active" => Some(Self::StreamActive),
            "ready_for_verification" => Some(Self::ReadyForVerification),
            "closed" => Some(Self::Closed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_peer() {
        assert_eq!(SessionRole::Publisher.peer(), SessionRole::Subscriber);
        assert_eq!(SessionRole::Subscriber.peer(), SessionRole::Publisher);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(SessionState::ChannelJoined.as_str(), "channel_joined");
        assert_eq!(
            SessionState::parse("ready_for_verification"),
            Some(SessionState::ReadyForVerification)
        );
        assert_eq!(SessionState::parse("nope"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::StreamActive.is_terminal());
    }
}

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Lifecycle of a realtime session. The per-turn states cycle back to `Active`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingConfigAck,
    Active,
    AwaitingItemAck,
    AwaitingResponse,
    ToolRoundTrip,
    ResponseComplete,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::AwaitingConfigAck => "AWAITING_CONFIG_ACK",
            Self::Active => "ACTIVE",
            Self::AwaitingItemAck => "AWAITING_ITEM_ACK",
            Self::AwaitingResponse => "AWAITING_RESPONSE",
            Self::ToolRoundTrip => "TOOL_ROUND_TRIP",
            Self::ResponseComplete => "RESPONSE_COMPLETE",
        }
    }

    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        if self == next {
            return true;
        }

        if *next == SessionState::Disconnected {
            return true;
        }

        match self {
            SessionState::Disconnected => matches!(next, SessionState::Connecting),
            SessionState::Connecting => matches!(next, SessionState::AwaitingConfigAck),
            SessionState::AwaitingConfigAck => matches!(next, SessionState::Active),
            SessionState::Active => matches!(next, SessionState::AwaitingItemAck),
            SessionState::AwaitingItemAck => matches!(next, SessionState::AwaitingResponse),
            SessionState::AwaitingResponse => matches!(
                next,
                SessionState::ToolRoundTrip | SessionState::ResponseComplete
            ),
            SessionState::ToolRoundTrip => {
                matches!(next, SessionState::AwaitingResponse | SessionState::Active)
            }
            SessionState::ResponseComplete => matches!(next, SessionState::Active),
        }
    }

    /// True while a turn is in flight.
    pub fn in_turn(&self) -> bool {
        matches!(
            self,
            Self::AwaitingItemAck
                | Self::AwaitingResponse
                | Self::ToolRoundTrip
                | Self::ResponseComplete
        )
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

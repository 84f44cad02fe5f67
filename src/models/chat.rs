//! Chat entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatProvider {
    Whatsapp,
    Facebook,
    Telegram,
    Livechat,
    B2cbotapi,
}

impl ChatProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatProvider::Whatsapp => "whatsapp",
            ChatProvider::Facebook => "facebook",
            ChatProvider::Telegram => "telegram",
            ChatProvider::Livechat => "livechat",
            ChatProvider::B2cbotapi => "b2cbotapi",
        }
    }
}

impl std::str::FromStr for ChatProvider {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whatsapp" => Ok(ChatProvider::Whatsapp),
            "facebook" => Ok(ChatProvider::Facebook),
            "telegram" => Ok(ChatProvider::Telegram),
            "livechat" => Ok(ChatProvider::Livechat),
            "b2cbotapi" => Ok(ChatProvider::B2cbotapi),
            other => Err(crate::error::Error::Schema(format!(
                "unknown chat provider: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a chat, including the poll/survey sub-states that
/// follow a closed chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatStatus {
    BotChatting,
    Opened,
    PickedUp,
    RespondedByAgent,
    Closed,
    CompletingPoll,
    CompletedPoll,
    AbandonedPoll,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatStatus::BotChatting => "BOT_CHATTING",
            ChatStatus::Opened => "OPENED",
            ChatStatus::PickedUp => "PICKED_UP",
            ChatStatus::RespondedByAgent => "RESPONDED_BY_AGENT",
            ChatStatus::Closed => "CLOSED",
            ChatStatus::CompletingPoll => "COMPLETING_POLL",
            ChatStatus::CompletedPoll => "COMPLETED_POLL",
            ChatStatus::AbandonedPoll => "ABANDONED_POLL",
        }
    }

    /// Legacy upstream aliases fold onto the current status set.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        match raw.to_uppercase().as_str() {
            "BOT_CHATTING" | "BOT" => Ok(ChatStatus::BotChatting),
            "OPENED" | "OPEN" | "PENDING" => Ok(ChatStatus::Opened),
            "PICKED_UP" | "ASSIGNED" => Ok(ChatStatus::PickedUp),
            "RESPONDED_BY_AGENT" | "RESPONDED" => Ok(ChatStatus::RespondedByAgent),
            "CLOSED" | "CLOSE" => Ok(ChatStatus::Closed),
            "COMPLETING_POLL" | "SURVEY_PENDING" => Ok(ChatStatus::CompletingPoll),
            "COMPLETED_POLL" | "SURVEY_COMPLETED" => Ok(ChatStatus::CompletedPoll),
            "ABANDONED_POLL" | "SURVEY_ABANDONED" => Ok(ChatStatus::AbandonedPoll),
            other => Err(crate::error::Error::Schema(format!(
                "unknown chat status: {other}"
            ))),
        }
    }

    /// Whether this status carries an active survey sub-state.
    pub fn is_poll_state(&self) -> bool {
        matches!(
            self,
            ChatStatus::CompletingPoll | ChatStatus::CompletedPoll | ChatStatus::AbandonedPoll
        )
    }
}

impl std::fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction a chat was initiated in. `original_direction` is set once at
/// creation and never changed by subsequent transforms; `direction` may be
/// corrected as later pages reveal more context (e.g. a broadcast reply).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatDirection {
    Incoming,
    Outgoing,
    OutgoingBroadcast,
}

impl ChatDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatDirection::Incoming => "incoming",
            ChatDirection::Outgoing => "outgoing",
            ChatDirection::OutgoingBroadcast => "outgoing_broadcast",
        }
    }
}

impl std::str::FromStr for ChatDirection {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(ChatDirection::Incoming),
            "outgoing" => Ok(ChatDirection::Outgoing),
            "outgoing_broadcast" => Ok(ChatDirection::OutgoingBroadcast),
            other => Err(crate::error::Error::Schema(format!(
                "unknown chat direction: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ChatDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized chat conversation, with the timestamps and poll/survey
/// sub-fields the SLA calculator reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub upstream_id: String,
    pub agent_id: Option<String>,
    pub contact_id: Option<String>,
    pub department_id: Option<String>,
    pub provider: ChatProvider,
    pub status: ChatStatus,
    pub alias: Option<String>,
    pub tags: Vec<String>,
    pub direction: ChatDirection,
    pub original_direction: ChatDirection,
    pub created_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub response_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub poll_started_at: Option<DateTime<Utc>>,
    pub poll_completed_at: Option<DateTime<Utc>>,
    pub poll_abandoned_at: Option<DateTime<Utc>>,
    pub poll_response: Option<String>,
    /// Cached computation from `crate::sla`, refreshed on every transform
    /// that touches this chat.
    pub pickup_seconds: Option<i64>,
    pub business_pickup_seconds: Option<i64>,
    pub first_response_seconds: Option<i64>,
    pub business_first_response_seconds: Option<i64>,
    pub avg_response_seconds: Option<i64>,
    pub business_avg_response_seconds: Option<i64>,
    pub resolution_seconds: Option<i64>,
    pub business_resolution_seconds: Option<i64>,
    pub sla_pickup_met: Option<bool>,
    pub sla_first_response_met: Option<bool>,
    pub sla_avg_response_met: Option<bool>,
    pub sla_resolution_met: Option<bool>,
    pub sla_overall_met: Option<bool>,
}

impl Chat {
    pub fn new(upstream_id: String, provider: ChatProvider, direction: ChatDirection, created_at: DateTime<Utc>) -> Self {
        Self {
            id: crate::ids::generate_id(crate::ids::CHAT_PREFIX, &[&upstream_id]),
            upstream_id,
            agent_id: None,
            contact_id: None,
            department_id: None,
            provider,
            status: ChatStatus::Opened,
            alias: None,
            tags: Vec::new(),
            direction,
            original_direction: direction,
            created_at,
            opened_at: None,
            picked_up_at: None,
            response_at: None,
            closed_at: None,
            duration_seconds: None,
            poll_started_at: None,
            poll_completed_at: None,
            poll_abandoned_at: None,
            poll_response: None,
            pickup_seconds: None,
            business_pickup_seconds: None,
            first_response_seconds: None,
            business_first_response_seconds: None,
            avg_response_seconds: None,
            business_avg_response_seconds: None,
            resolution_seconds: None,
            business_resolution_seconds: None,
            sla_pickup_met: None,
            sla_first_response_met: None,
            sla_avg_response_met: None,
            sla_resolution_met: None,
            sla_overall_met: None,
        }
    }
}

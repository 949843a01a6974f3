//! Cross-context messaging
//!
//! JSON messages tagged by `type`, exchanged between the content script, the
//! settings surfaces and the background worker, plus the background-side
//! handler that owns the badge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BADGE_COLOR;
use crate::store::{RuleStore, StorageArea};
use crate::types::{DomainRules, UserRules};

pub const UPDATE_COUNT: &str = "UPDATE_COUNT";
pub const GET_RULES: &str = "GET_RULES";
pub const SAVE_RULES: &str = "SAVE_RULES";

/// Error type for decoding an incoming message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Message has no `type` field")]
    MissingType,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    #[error("Malformed {kind} message: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Fire-and-forget hidden count from a content script.
    #[serde(rename = "UPDATE_COUNT")]
    UpdateCount { count: usize },

    #[serde(rename = "GET_RULES")]
    GetRules {},

    #[serde(rename = "SAVE_RULES")]
    SaveRules {
        #[serde(rename = "userRules", default, skip_serializing_if = "Option::is_none")]
        user_rules: Option<UserRules>,
        #[serde(rename = "domainRules", default, skip_serializing_if = "Option::is_none")]
        domain_rules: Option<DomainRules>,
    },
}

impl Request {
    /// Decode a raw message, telling unknown types apart from malformed ones.
    pub fn parse(value: Value) -> Result<Self, MessageError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MessageError::MissingType)?
            .to_string();
        if ![UPDATE_COUNT, GET_RULES, SAVE_RULES].contains(&kind.as_str()) {
            return Err(MessageError::UnknownType(kind));
        }
        serde_json::from_value(value).map_err(|source| MessageError::Malformed { kind, source })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpdateCount { .. } => UPDATE_COUNT,
            Self::GetRules {} => GET_RULES,
            Self::SaveRules { .. } => SAVE_RULES,
        }
    }

    /// True if the sender waits for a [`Response`].
    pub fn expects_response(&self) -> bool {
        !matches!(self, Self::UpdateCount { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Rules {
        #[serde(rename = "userRules")]
        user_rules: UserRules,
        #[serde(rename = "domainRules", default)]
        domain_rules: Option<DomainRules>,
    },
    Saved {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Error {
        error: String,
    },
}

/// Outgoing side of the message channel, as seen by a content script.
pub trait MessageSink {
    /// Send without waiting for a reply. Failures are the sink's to log.
    fn send(&self, request: Request);
}

/// The extension's toolbar badge.
pub trait BadgeRenderer {
    /// Set text and background color, for one tab or globally.
    fn set_badge(&self, text: &str, color: &str, tab_id: Option<i32>);
}

/// Badge text for a hidden count: empty when nothing is hidden.
pub fn badge_text(count: usize) -> String {
    if count > 0 {
        count.to_string()
    } else {
        String::new()
    }
}

// =============================================================================
// Background Service
// =============================================================================

/// Background worker logic: install, message dispatch and tab lifecycle.
pub struct BackgroundService<S, G> {
    store: RuleStore<S>,
    badge: G,
}

impl<S: StorageArea, G: BadgeRenderer> BackgroundService<S, G> {
    pub fn new(store: RuleStore<S>, badge: G) -> Self {
        Self { store, badge }
    }

    pub fn store(&self) -> &RuleStore<S> {
        &self.store
    }

    /// Clear the badge and seed storage defaults.
    pub async fn on_installed(&self) -> bool {
        self.badge.set_badge("", BADGE_COLOR, None);
        let ok = self.store.initialize().await;
        if ok {
            log::info!("Extension installed successfully");
        } else {
            log::error!("Failed to handle installation");
        }
        ok
    }

    /// Clear a tab's badge when it starts loading a new page.
    pub fn on_tab_updated(&self, tab_id: i32, status: Option<&str>) {
        if status == Some("loading") {
            self.badge.set_badge("", BADGE_COLOR, Some(tab_id));
        }
    }

    /// Dispatch a decoded request. `None` for fire-and-forget messages.
    pub async fn handle_message(&self, request: Request, sender_tab: Option<i32>) -> Option<Response> {
        match request {
            Request::UpdateCount { count } => {
                // Counts from non-tab contexts have nowhere to go.
                if let Some(tab_id) = sender_tab {
                    self.badge.set_badge(&badge_text(count), BADGE_COLOR, Some(tab_id));
                }
                None
            }
            Request::GetRules {} => Some(Response::Rules {
                user_rules: self.store.load_user_rules().await,
                domain_rules: self.store.get_domain_rules().await,
            }),
            Request::SaveRules {
                user_rules,
                domain_rules,
            } => Some(self.save_rules(user_rules.as_ref(), domain_rules.as_ref()).await),
        }
    }

    async fn save_rules(
        &self,
        user_rules: Option<&UserRules>,
        domain_rules: Option<&DomainRules>,
    ) -> Response {
        if let Some(user_rules) = user_rules {
            if !self.store.set_user_rules(user_rules).await {
                return save_failed("Failed to save user rules");
            }
        }
        if let Some(domain_rules) = domain_rules {
            if !self.store.set_domain_rules(domain_rules).await {
                return save_failed("Failed to save domain rules");
            }
        }
        Response::Saved {
            success: true,
            error: None,
        }
    }

    /// Decode and dispatch a raw JSON message. Unknown types are logged and
    /// get no reply; malformed known types get an error reply.
    pub async fn handle_raw(&self, message: Value, sender_tab: Option<i32>) -> Option<Value> {
        let response = match Request::parse(message) {
            Ok(request) => self.handle_message(request, sender_tab).await?,
            Err(MessageError::UnknownType(kind)) => {
                log::warn!("Unknown message type: {}", kind);
                return None;
            }
            Err(e) => {
                log::error!("Error handling message: {}", e);
                Response::Error {
                    error: e.to_string(),
                }
            }
        };
        match serde_json::to_value(&response) {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("Failed to encode response: {}", e);
                None
            }
        }
    }
}

fn save_failed(message: &str) -> Response {
    log::error!("Failed to save rules: {}", message);
    Response::Saved {
        success: false,
        error: Some(message.to_string()),
    }
}

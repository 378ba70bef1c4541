//! Identity of one post-conversation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Identifies a run: which turn of which conversation, for whom, and when.
///
/// Set once when the context is created and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnIdentity {
    /// Unique id generated for this run, used for log correlation.
    pub run_id: Uuid,
    /// The conversation being processed.
    pub conversation_id: String,
    /// The user the conversation belongs to.
    pub user_id: String,
    /// Client platform the conversation happened on (e.g. "ios", "web").
    pub platform: String,
    /// When processing started.
    pub started_at: DateTime<Utc>,
}

impl TurnIdentity {
    /// Creates an identity stamped with the current time and a fresh run id.
    #[must_use]
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self::at(conversation_id, user_id, platform, Utc::now())
    }

    /// Creates an identity with an explicit start time.
    #[must_use]
    pub fn at(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        platform: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            platform: platform.into(),
            started_at,
        }
    }

    /// Replaces the generated run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Converts to a flat dictionary of strings, for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("run_id".to_string(), serde_json::json!(self.run_id.to_string()));
        map.insert(
            "conversation_id".to_string(),
            serde_json::json!(self.conversation_id),
        );
        map.insert("user_id".to_string(), serde_json::json!(self.user_id));
        map.insert("platform".to_string(), serde_json::json!(self.platform));
        map.insert(
            "started_at".to_string(),
            serde_json::json!(self.started_at.to_rfc3339()),
        );
        map
    }
}

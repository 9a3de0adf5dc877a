//! Contracts for the browser-side collaborators.
//!
//! Logging in and scraping the recruitment site happen outside this workspace.
//! The orchestrator only sees these two traits: a [`SessionProvider`] that
//! establishes the site session and hands out its handshake material, and a
//! [`SiteAutomation`] that performs page-level operations and returns plain
//! records.

use async_trait::async_trait;
use scout_core::{AuthContext, CollaboratorError, Endpoint};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Establishes and owns the logged-in site session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Log in. A failure aborts the orchestrator run.
    async fn login(&self) -> Result<(), CollaboratorError>;

    fn is_logged_in(&self) -> bool;

    /// Cookies and headers for the realtime handshake.
    async fn auth_context(&self) -> Result<AuthContext, CollaboratorError>;

    /// Release the session (browser, cookies). Called once on shutdown.
    async fn close(&self);
}

/// Page-level operations on the recruitment site.
#[async_trait]
pub trait SiteAutomation: Send + Sync {
    /// Locate the realtime endpoint, if the site exposes one.
    async fn realtime_endpoint(&self) -> Result<Option<Endpoint>, CollaboratorError>;

    async fn search_candidates(&self, query: &SearchQuery) -> Result<Vec<Value>, CollaboratorError>;

    /// Full profile for one candidate page; `None` when the page had nothing to
    /// extract.
    async fn candidate_detail(&self, url: &str) -> Result<Option<Value>, CollaboratorError>;

    /// Greet a single candidate. `params` are passed through from the command.
    async fn send_greeting(&self, params: &Value) -> Result<bool, CollaboratorError>;

    /// Greet up to `max_count` of `candidates`.
    async fn batch_greeting(
        &self,
        candidates: &[Value],
        template: Option<&str>,
        max_count: usize,
    ) -> Result<GreetingSummary, CollaboratorError>;

    async fn chat_list(&self) -> Result<Vec<ChatSummary>, CollaboratorError>;

    /// The last `limit` messages of a chat.
    async fn chat_history(&self, chat_id: &str, limit: usize) -> Result<Vec<SiteMessage>, CollaboratorError>;

    async fn close(&self);
}

/// Candidate search filters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub keyword: String,
    pub location: String,
    pub experience: String,
    pub education: String,
    pub page_limit: u32,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            location: String::new(),
            experience: String::new(),
            education: String::new(),
            page_limit: 3,
        }
    }
}

impl SearchQuery {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Default::default()
        }
    }

    /// Build a query from command parameters.
    pub fn from_params(params: &Value) -> Result<Self, CollaboratorError> {
        if params.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(params.clone())
            .map_err(|e| CollaboratorError::InvalidParams(e.to_string()))
    }
}

/// One row of the site's chat list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSummary {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub last_message: String,
    pub last_time: String,
    pub unread_count: u32,
}

/// A message read from a chat on the site.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteMessage {
    pub id: String,
    pub sender: String,
    pub content: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub message_type: String,
}

/// Outcome of a batch greeting run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetingSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub details: Vec<GreetingDetail>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetingDetail {
    pub name: String,
    pub company: String,
    pub url: String,
    pub success: bool,
    pub timestamp: i64,
}

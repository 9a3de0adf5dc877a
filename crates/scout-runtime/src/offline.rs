//! Collaborators that need no browser.
//!
//! [`ConfiguredSession`] treats a configured cookie string as the site session.
//! [`OfflineSite`] reports page operations as unsupported and an empty chat
//! list, so the relay, realtime and command paths still run end to end.

use async_trait::async_trait;
use scout_core::{AuthContext, CollaboratorError, Endpoint};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::collaborators::{ChatSummary, GreetingSummary, SearchQuery, SessionProvider, SiteAutomation, SiteMessage};

pub struct ConfiguredSession {
    username: Option<String>,
    cookie: Option<String>,
    logged_in: AtomicBool,
}

impl ConfiguredSession {
    pub fn new(username: Option<String>, cookie: Option<String>) -> Self {
        Self {
            username,
            cookie: cookie.filter(|c| !c.trim().is_empty()),
            logged_in: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SessionProvider for ConfiguredSession {
    async fn login(&self) -> Result<(), CollaboratorError> {
        if self.cookie.is_none() {
            warn!("no session cookie configured, realtime handshake will be anonymous");
        }
        self.logged_in.store(true, Ordering::SeqCst);
        info!(username = self.username.as_deref().unwrap_or("-"), "session ready");
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    async fn auth_context(&self) -> Result<AuthContext, CollaboratorError> {
        if !self.is_logged_in() {
            return Err(CollaboratorError::NotLoggedIn);
        }
        Ok(self
            .cookie
            .as_deref()
            .map(AuthContext::from_cookie_header)
            .unwrap_or_default())
    }

    async fn close(&self) {
        self.logged_in.store(false, Ordering::SeqCst);
    }
}

/// Site stand-in; optionally serves a fixed realtime endpoint.
#[derive(Default)]
pub struct OfflineSite {
    endpoint: Option<Endpoint>,
    closed: AtomicBool,
}

impl OfflineSite {
    pub fn new(endpoint: Option<Endpoint>) -> Self {
        Self {
            endpoint,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SiteAutomation for OfflineSite {
    async fn realtime_endpoint(&self) -> Result<Option<Endpoint>, CollaboratorError> {
        Ok(self.endpoint.clone())
    }

    async fn search_candidates(&self, _query: &SearchQuery) -> Result<Vec<Value>, CollaboratorError> {
        Err(CollaboratorError::unsupported("search_candidates"))
    }

    async fn candidate_detail(&self, _url: &str) -> Result<Option<Value>, CollaboratorError> {
        Err(CollaboratorError::unsupported("candidate_detail"))
    }

    async fn send_greeting(&self, _params: &Value) -> Result<bool, CollaboratorError> {
        Err(CollaboratorError::unsupported("send_greeting"))
    }

    async fn batch_greeting(
        &self,
        _candidates: &[Value],
        _template: Option<&str>,
        _max_count: usize,
    ) -> Result<GreetingSummary, CollaboratorError> {
        Err(CollaboratorError::unsupported("batch_greeting"))
    }

    async fn chat_list(&self) -> Result<Vec<ChatSummary>, CollaboratorError> {
        Ok(Vec::new())
    }

    async fn chat_history(&self, _chat_id: &str, _limit: usize) -> Result<Vec<SiteMessage>, CollaboratorError> {
        Ok(Vec::new())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

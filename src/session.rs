use chrono::Utc;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::config::Credentials;
use crate::types::Session;
use crate::{Error, Result};

/// Owns the single live vendor session.
///
/// Only the poll cycle touches this, and cycles never overlap, so a refresh
/// can never race another one.
pub struct SessionManager {
    credentials: Credentials,
    account_override: Option<String>,
    session: Option<Session>,
}

impl SessionManager {
    pub fn new(credentials: Credentials, account_override: Option<String>) -> Self {
        Self {
            credentials,
            account_override,
            session: None,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Return the live session, logging in first when there is none.
    /// A failed login leaves no session behind.
    pub async fn ensure_session(&mut self, api: &ApiClient) -> Result<&Session> {
        if self.session.is_none() {
            let resp = api.login(&self.credentials).await?;
            let account_id = resp.account_id();
            if account_id.is_none() && self.account_override.is_none() {
                warn!("login response carries no account id; set accountId in config");
            }
            debug!(account_id = ?account_id, "session established");
            self.session = Some(Session {
                token_id: resp.token_id,
                account_id,
                obtained_at: Utc::now(),
            });
        }
        self.session
            .as_ref()
            .ok_or_else(|| Error::Auth("no session".to_string()))
    }

    /// Drop the session so the next cycle logs in again.
    pub fn invalidate(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(obtained_at = %session.obtained_at, "session invalidated");
        }
    }

    /// Configured override first, then the account id from the login response.
    pub fn resolve_account_id(&self, session: &Session) -> Result<String> {
        self.account_override
            .clone()
            .or_else(|| session.account_id.clone())
            .ok_or_else(|| {
                Error::Config("account id not resolvable; set accountId in config".to_string())
            })
    }
}

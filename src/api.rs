use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::config::Credentials;
use crate::types::{HubSummary, Id, RawDevice, Session};
use crate::{Error, Result};

pub const TOKEN_HEADER: &str = "X-One-Vue-Token";

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token_id: String,
    #[serde(default)]
    pub user: Option<LoginUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    #[serde(default)]
    pub account_users: Vec<AccountUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountUser {
    #[serde(default)]
    pub account_id: Option<Id>,
}

impl LoginResponse {
    /// Account id of the first account user, if the vendor sent one.
    pub fn account_id(&self) -> Option<String> {
        self.user
            .as_ref()?
            .account_users
            .first()?
            .account_id
            .as_ref()
            .map(Id::to_string)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Deserialize)]
struct HubsResponse {
    account_hubs: Vec<HubSummary>,
}

#[derive(Deserialize)]
struct HubDetailResponse {
    #[serde(default)]
    devices: Vec<RawDevice>,
}

/// Typed access to the three vendor endpoints. Never retries.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Any failure here, transport included, is reported as [`Error::Auth`].
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse> {
        let url = format!("{}/users/login", self.base_url);
        debug!(url = %url, email = %credentials.email, "logging in");

        let body = json!({
            "remember": true,
            "email": credentials.email,
            "password": credentials.password,
        });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("login request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Auth(format!("login response unreadable: {e}")))?;
        if !status.is_success() {
            return Err(Error::Auth(format!(
                "login rejected ({}): {}",
                status.as_u16(),
                error_detail(status, &text)
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Auth(format!("unexpected login response: {e}")))
    }

    pub async fn list_hubs(&self, session: &Session, account_id: &str) -> Result<Vec<HubSummary>> {
        let url = format!("{}/accounts/{account_id}/dashboard/hubs", self.base_url);
        let resp: HubsResponse = self.get_json(&url, session).await?;
        Ok(resp.account_hubs)
    }

    pub async fn get_hub_devices(
        &self,
        session: &Session,
        account_id: &str,
        hub_id: &Id,
    ) -> Result<Vec<RawDevice>> {
        let url = format!(
            "{}/accounts/{account_id}/dashboard/hubs/{hub_id}",
            self.base_url
        );
        let resp: HubDetailResponse = self.get_json(&url, session).await?;
        Ok(resp.devices)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, session: &Session) -> Result<T> {
        debug!(url = %url, "fetching");
        let resp = self
            .http
            .get(url)
            .header(TOKEN_HEADER, &session.token_id)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        trace!(status = status.as_u16(), len = body.len(), "response received");

        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| Error::Protocol(format!("{url}: {e}")))
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let detail = error_detail(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Auth(format!("token rejected ({}): {detail}", status.as_u16()))
        }
        _ => Error::Api {
            status: status.as_u16(),
            detail,
        },
    }
}

/// Vendor error text: `message`, then `error`, then the reason phrase.
fn error_detail(status: StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            ["message", "error"]
                .iter()
                .filter_map(|field| v.get(field).and_then(Value::as_str))
                .find(|s| !s.is_empty())
        })
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_prefers_message_then_error() {
        let body = r#"{"message": "Invalid token", "error": "unauthorized"}"#;
        assert_eq!(error_detail(StatusCode::BAD_REQUEST, body), "Invalid token");

        let body = r#"{"error": "rate limited"}"#;
        assert_eq!(error_detail(StatusCode::TOO_MANY_REQUESTS, body), "rate limited");
    }

    #[test]
    fn detail_falls_back_to_reason_phrase() {
        assert_eq!(
            error_detail(StatusCode::SERVICE_UNAVAILABLE, "<html>oops</html>"),
            "Service Unavailable"
        );
        assert_eq!(
            error_detail(StatusCode::INTERNAL_SERVER_ERROR, r#"{"message": ""}"#),
            "Internal Server Error"
        );
    }

    #[test]
    fn unauthorized_maps_to_auth() {
        let err = status_error(StatusCode::UNAUTHORIZED, "{}");
        assert!(err.is_auth(), "expected Auth, got {err:?}");

        match status_error(StatusCode::BAD_GATEWAY, "") {
            Error::Api { status, detail } => {
                assert_eq!(status, 502);
                assert_eq!(detail, "Bad Gateway");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn login_response_account_id() {
        let resp: LoginResponse = serde_json::from_str(
            r#"{"token_id": "t", "user": {"account_users": [{"account_id": 176464}, {"account_id": 1}]}}"#,
        )
        .unwrap();
        assert_eq!(resp.account_id().as_deref(), Some("176464"));

        let resp: LoginResponse =
            serde_json::from_str(r#"{"token_id": "t", "user": {"account_users": []}}"#).unwrap();
        assert_eq!(resp.account_id(), None);

        let resp: LoginResponse = serde_json::from_str(r#"{"token_id": "t"}"#).unwrap();
        assert_eq!(resp.account_id(), None);
    }
}

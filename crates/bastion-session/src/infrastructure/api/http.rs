//! `reqwest`-backed [`SessionApi`] client.
//!
//! | Operation         | Request                                           |
//! |-------------------|---------------------------------------------------|
//! | create_session    | `POST /sessions` `{"assetId", "mode"}`            |
//! | mark_connected    | `POST /sessions/{id}/connect`                     |
//! | resize            | `POST /sessions/{id}/resize?width=..&height=..`   |
//! | disconnect        | `POST /sessions/{id}/disconnect`                  |
//! | command_shortcuts | `GET /commands`                                   |
//!
//! Every request carries the `X-Auth-Token` header.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use tracing::debug;
use url::Url;

use bastion_core::{AssetId, ExecutionMode, Session, SessionId};

use super::{ApiError, SessionApi};
use crate::domain::CommandShortcut;

const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Debug, Clone)]
pub struct HttpSessionApi {
    client: Client,
    base: String,
    token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    asset_id: &'a AssetId,
    mode: ExecutionMode,
}

impl HttpSessionApi {
    /// # Errors
    ///
    /// Returns [`ApiError::Url`] if `api_base` is not an absolute URL.
    pub fn new(api_base: &str, token: impl Into<String>) -> Result<Self, ApiError> {
        Url::parse(api_base)?;
        Ok(Self {
            client: Client::new(),
            base: api_base.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(Url::parse(&format!("{}/{}", self.base, path))?)
    }

    async fn post_empty(&self, url: Url) -> Result<(), ApiError> {
        debug!(%url, "POST");
        let response = self
            .client
            .post(url)
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::UnexpectedStatus {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn create_session(
        &self,
        asset_id: &AssetId,
        mode: ExecutionMode,
    ) -> Result<Session, ApiError> {
        let url = self.endpoint("sessions")?;
        debug!(%url, %asset_id, %mode, "creating session");
        let response = self
            .client
            .post(url)
            .header(AUTH_HEADER, &self.token)
            .json(&CreateSessionRequest { asset_id, mode })
            .send()
            .await?;
        Ok(check_status(response).await?.json::<Session>().await?)
    }

    async fn mark_connected(&self, session_id: &SessionId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("sessions/{session_id}/connect"))?;
        self.post_empty(url).await
    }

    async fn resize(
        &self,
        session_id: &SessionId,
        width: u32,
        height: u32,
    ) -> Result<(), ApiError> {
        let mut url = self.endpoint(&format!("sessions/{session_id}/resize"))?;
        url.query_pairs_mut()
            .append_pair("width", &width.to_string())
            .append_pair("height", &height.to_string());
        self.post_empty(url).await
    }

    async fn disconnect(&self, session_id: &SessionId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("sessions/{session_id}/disconnect"))?;
        self.post_empty(url).await
    }

    async fn command_shortcuts(&self) -> Result<Vec<CommandShortcut>, ApiError> {
        let url = self.endpoint("commands")?;
        let response = self
            .client
            .get(url)
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_relative_base() {
        assert!(matches!(
            HttpSessionApi::new("api/v1", "t"),
            Err(ApiError::Url(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        // Arrange
        let api = HttpSessionApi::new("https://bastion.example.com/api/", "t").unwrap();

        // Act
        let url = api.endpoint("sessions/abc/connect").unwrap();

        // Assert: the base path segment is kept
        assert_eq!(
            url.as_str(),
            "https://bastion.example.com/api/sessions/abc/connect"
        );
    }

    #[test]
    fn test_create_request_body_is_camel_case() {
        let asset = AssetId::new("a-1");
        let body = serde_json::to_string(&CreateSessionRequest {
            asset_id: &asset,
            mode: ExecutionMode::Native,
        })
        .unwrap();
        assert_eq!(body, r#"{"assetId":"a-1","mode":"native"}"#);
    }
}

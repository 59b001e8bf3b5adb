//! Authorization service client
//!
//! [`AuthorizationApi`] is the seam the channel manager and permission
//! queries call through; [`HttpAuthorizationApi`] is the production
//! implementation over reqwest.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;
use z0rath_model::routes::{API_KEY_HEADER, v1};
use z0rath_model::{
    Credential, HasPermissionResponse, IssueTicketRequest, IssueTicketResponse, Ticket,
};

use crate::error::{ApiError, ApiResult};

/// Requests the core issues against the authorization service.
#[async_trait]
pub trait AuthorizationApi: Send + Sync {
    /// Ask whether `user` holds `slug`.
    ///
    /// A forbidden response is an answer, not a failure: it yields
    /// `Ok(false)`.
    async fn has_permission(
        &self,
        credential: &Credential,
        user: &str,
        slug: &str,
    ) -> ApiResult<bool>;

    /// Obtain a one-time ticket for opening the push channel.
    async fn issue_ticket(&self, credential: &Credential, user: &str) -> ApiResult<Ticket>;
}

/// REST client for the hosted authorization service
#[derive(Clone)]
pub struct HttpAuthorizationApi {
    client: Client,
    base_url: Url,
}

impl fmt::Debug for HttpAuthorizationApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAuthorizationApi")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl HttpAuthorizationApi {
    /// Create a client with its own connection pool
    pub fn new(base_url: Url, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        info!(base_url = %base_url, "creating authorization api client");

        Ok(Self::with_client(client, base_url))
    }

    /// Reuse an existing reqwest client
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Versioned base every route is joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join a route onto the versioned base URL
    pub fn build_url(&self, path: &str) -> ApiResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    fn authorize(&self, builder: RequestBuilder, credential: &Credential) -> RequestBuilder {
        builder
            .header(API_KEY_HEADER, credential.expose())
            .header(CONTENT_TYPE, "application/json")
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
    }
}

#[async_trait]
impl AuthorizationApi for HttpAuthorizationApi {
    async fn has_permission(
        &self,
        credential: &Credential,
        user: &str,
        slug: &str,
    ) -> ApiResult<bool> {
        let url = self.build_url(v1::authorization::HAS_PERMISSION)?;
        let request = self
            .authorize(self.client.get(url), credential)
            .query(&[("user", user), ("slug", slug)]);
        let response = request.send().await?;

        match response.status() {
            StatusCode::FORBIDDEN => {
                debug!(user, slug, "permission denied by service");
                Ok(false)
            }
            status if status.is_success() => {
                let body: HasPermissionResponse = Self::decode(response).await?;
                Ok(body.has_permission)
            }
            status => Err(ApiError::Status { status }),
        }
    }

    async fn issue_ticket(&self, credential: &Credential, user: &str) -> ApiResult<Ticket> {
        let url = self.build_url(v1::websockets::ISSUE_TICKET)?;
        let request = self
            .authorize(self.client.post(url), credential)
            .json(&IssueTicketRequest {
                user: user.to_owned(),
            });
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { status });
        }
        let body: IssueTicketResponse = Self::decode(response).await?;
        Ok(body.ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpAuthorizationApi {
        HttpAuthorizationApi::with_client(Client::new(), Url::parse(base).unwrap())
    }

    #[test]
    fn build_url_joins_without_double_slashes() {
        let api = api("https://example.test/api/v1/");
        let url = api.build_url(v1::authorization::HAS_PERMISSION).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.test/api/v1/authorization/has_permission"
        );
    }

    #[test]
    fn build_url_keeps_version_prefix() {
        let api = api("http://127.0.0.1:9000/api/v1");
        let url = api.build_url(v1::websockets::ISSUE_TICKET).unwrap();
        assert_eq!(url.path(), "/api/v1/websockets/issue-ticket");
    }
}

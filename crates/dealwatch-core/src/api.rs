//! REST adapter for the marketplace backend.
//!
//! Implements the collaborator traits the engine needs from the backend:
//! catalog reads, the voucher status endpoint and notification records.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::collaborators::{
    CatalogProvider, NewNotification, Notification, NotificationApi, Product, Promotion, Store,
    VoucherClaimStatus, VoucherStatusApi,
};
use crate::error::CollaboratorError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "dealwatch";

#[derive(Debug, Deserialize)]
struct UnreadCount {
    count: u64,
}

/// HTTP client for the marketplace API.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl RestClient {
    /// Create a client rooted at `base_url` (e.g. `https://api.example.com/v1`).
    pub fn new(base_url: &str) -> Result<Self, CollaboratorError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| CollaboratorError::Network(format!("invalid base url: {e}")))?;
        // Url::join replaces the last segment unless the path ends with '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base,
            token: None,
        })
    }

    /// Authenticate requests with a bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, CollaboratorError> {
        self.base
            .join(path)
            .map_err(|e| CollaboratorError::Network(format!("invalid endpoint '{path}': {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CollaboratorError> {
        let url = self.endpoint(path)?;
        let response = self.authorize(self.http.get(url)).send().await?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CollaboratorError> {
        let url = self.endpoint(path)?;
        let response = self.authorize(self.http.post(url)).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, CollaboratorError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Http {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| CollaboratorError::Decode(e.to_string()))
    }
}

#[async_trait]
impl CatalogProvider for RestClient {
    async fn list_active_promotions(&self) -> Result<Vec<Promotion>, CollaboratorError> {
        self.get_json("promotions/active").await
    }

    async fn list_stores(&self) -> Result<Vec<Store>, CollaboratorError> {
        self.get_json("stores").await
    }

    async fn list_products(&self) -> Result<Vec<Product>, CollaboratorError> {
        self.get_json("products").await
    }
}

#[async_trait]
impl VoucherStatusApi for RestClient {
    async fn check_voucher_claim_status(
        &self,
        store_id: i64,
    ) -> Result<VoucherClaimStatus, CollaboratorError> {
        self.get_json(&format!("vouchers/claim-status/{store_id}")).await
    }
}

#[async_trait]
impl NotificationApi for RestClient {
    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, CollaboratorError> {
        self.post_json("notifications", &notification).await
    }

    async fn refresh_unread_count(&self) -> Result<u64, CollaboratorError> {
        let unread: UnreadCount = self.get_json("notifications/unread-count").await?;
        Ok(unread.count)
    }
}

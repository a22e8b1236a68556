//! `reqwest`-backed remote implementation.
//!
//! Speaks the JSON REST API the engine synchronizes against. Error bodies
//! are normalized here: the server nests its display message either at the
//! top level or under a `data` envelope, and both shapes map onto
//! [`RemoteError::Status`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use url::Url;

use tidemark_core::{CommentId, LineId, PostContent, PostId, ProductId};

use super::payloads::{CartPayload, ContentPayload, CouponPayload, PostPayload};
use super::{ListPostsParams, RemoteApi, RemoteError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`HttpRemote`].
#[derive(Clone)]
pub struct RemoteConfig {
    /// API origin, e.g. `https://api.example.com`.
    pub base_url: Url,
    /// Bearer token attached to every request, when set.
    pub access_token: Option<SecretString>,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url.as_str())
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Error body shapes the server produces. The display message lives either
/// at the top level or nested under `data`.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    data: Option<ErrorData>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(default)]
    message: Option<String>,
}

impl ErrorResponse {
    fn into_message(self) -> Option<String> {
        self.data.and_then(|d| d.message).or(self.message)
    }
}

/// Query string for the post-list endpoint.
fn list_query(params: &ListPostsParams) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(limit) = params.limit {
        query.push(("limit", limit.to_string()));
    }
    if let Some(skip) = params.skip {
        query.push(("skip", skip.to_string()));
    }
    if let Some(tag) = &params.tag {
        query.push(("tag", tag.clone()));
    }
    query
}

/// Default remote over HTTP.
#[derive(Clone)]
pub struct HttpRemote {
    inner: Arc<HttpRemoteInner>,
}

struct HttpRemoteInner {
    client: reqwest::Client,
    base_url: Url,
    access_token: Option<SecretString>,
}

impl HttpRemote {
    /// Create a remote for the configured origin.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created. This should never happen
    /// under normal circumstances as we use standard TLS configuration.
    #[must_use]
    pub fn new(config: &RemoteConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            inner: Arc::new(HttpRemoteInner {
                client,
                base_url: config.base_url.clone(),
                access_token: config.access_token.clone(),
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.inner.base_url.as_str().trim_end_matches('/'),
            path
        )
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.inner.access_token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Send a request, map non-success statuses to [`RemoteError`], and
    /// decode the JSON body.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, RemoteError> {
        let response = self.authorize(builder).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(status, response.text().await?));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Send a request whose success body is empty or ignored.
    async fn send_unit(&self, builder: RequestBuilder) -> Result<(), RemoteError> {
        let response = self.authorize(builder).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(status, response.text().await?));
        }
        Ok(())
    }

    fn status_error(status: StatusCode, body: String) -> RemoteError {
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .and_then(ErrorResponse::into_message)
            .unwrap_or_else(|| body.chars().take(500).collect());
        debug!(status = status.as_u16(), %message, "remote rejected request");
        if status == StatusCode::NOT_FOUND {
            return RemoteError::NotFound(message);
        }
        RemoteError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn get_cart(&self) -> Result<CartPayload, RemoteError> {
        self.send(self.inner.client.get(self.url("cart"))).await
    }

    async fn add_cart_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<CartPayload, RemoteError> {
        let body = json!({ "productId": product_id, "quantity": quantity });
        self.send(self.inner.client.post(self.url("cart/items")).json(&body))
            .await
    }

    async fn update_cart_item(
        &self,
        line_id: &LineId,
        quantity: u32,
    ) -> Result<CartPayload, RemoteError> {
        let body = json!({ "quantity": quantity });
        self.send(
            self.inner
                .client
                .put(self.url(&format!("cart/items/{line_id}")))
                .json(&body),
        )
        .await
    }

    async fn remove_cart_item(&self, line_id: &LineId) -> Result<CartPayload, RemoteError> {
        self.send(
            self.inner
                .client
                .delete(self.url(&format!("cart/items/{line_id}"))),
        )
        .await
    }

    async fn clear_cart(&self) -> Result<CartPayload, RemoteError> {
        self.send(self.inner.client.delete(self.url("cart"))).await
    }

    async fn apply_coupon(&self, code: &str) -> Result<CouponPayload, RemoteError> {
        let body = json!({ "code": code });
        self.send(self.inner.client.post(self.url("cart/coupon")).json(&body))
            .await
    }

    async fn list_posts(&self, params: &ListPostsParams) -> Result<Vec<PostPayload>, RemoteError> {
        let query = list_query(params);
        let path = match &params.user_id {
            Some(user) => format!("users/{user}/posts"),
            None => "posts".to_string(),
        };
        self.send(self.inner.client.get(self.url(&path)).query(&query))
            .await
    }

    async fn get_post(&self, id: &PostId) -> Result<PostPayload, RemoteError> {
        self.send(self.inner.client.get(self.url(&format!("posts/{id}"))))
            .await
    }

    async fn create_post(&self, content: &PostContent) -> Result<PostPayload, RemoteError> {
        let body = ContentPayload::from(content);
        self.send(self.inner.client.post(self.url("posts")).json(&body))
            .await
    }

    async fn edit_post(
        &self,
        id: &PostId,
        content: &PostContent,
    ) -> Result<PostPayload, RemoteError> {
        let body = ContentPayload::from(content);
        self.send(
            self.inner
                .client
                .put(self.url(&format!("posts/{id}")))
                .json(&body),
        )
        .await
    }

    async fn delete_post(&self, id: &PostId) -> Result<(), RemoteError> {
        self.send_unit(self.inner.client.delete(self.url(&format!("posts/{id}"))))
            .await
    }

    async fn toggle_like(&self, id: &PostId) -> Result<PostPayload, RemoteError> {
        self.send(
            self.inner
                .client
                .post(self.url(&format!("posts/{id}/like"))),
        )
        .await
    }

    async fn add_comment(&self, id: &PostId, text: &str) -> Result<PostPayload, RemoteError> {
        let body = json!({ "text": text });
        self.send(
            self.inner
                .client
                .post(self.url(&format!("posts/{id}/comments")))
                .json(&body),
        )
        .await
    }

    async fn delete_comment(
        &self,
        id: &PostId,
        comment_id: &CommentId,
    ) -> Result<PostPayload, RemoteError> {
        self.send(
            self.inner
                .client
                .delete(self.url(&format!("posts/{id}/comments/{comment_id}"))),
        )
        .await
    }

    async fn toggle_comment_like(
        &self,
        id: &PostId,
        comment_id: &CommentId,
    ) -> Result<PostPayload, RemoteError> {
        self.send(
            self.inner
                .client
                .post(self.url(&format!("posts/{id}/comments/{comment_id}/like"))),
        )
        .await
    }

    async fn reply_comment(
        &self,
        id: &PostId,
        comment_id: &CommentId,
        text: &str,
    ) -> Result<PostPayload, RemoteError> {
        let body = json!({ "text": text });
        self.send(
            self.inner
                .client
                .post(self.url(&format!("posts/{id}/comments/{comment_id}/replies")))
                .json(&body),
        )
        .await
    }

    async fn report_post(&self, id: &PostId) -> Result<(), RemoteError> {
        self.send_unit(
            self.inner
                .client
                .post(self.url(&format!("posts/{id}/report"))),
        )
        .await
    }

    async fn toggle_save(&self, id: &PostId) -> Result<PostPayload, RemoteError> {
        self.send(
            self.inner
                .client
                .post(self.url(&format!("posts/{id}/save"))),
        )
        .await
    }

    async fn list_saved(&self) -> Result<Vec<PostPayload>, RemoteError> {
        self.send(self.inner.client.get(self.url("posts/saved")))
            .await
    }

    async fn list_reported(&self) -> Result<Vec<PostPayload>, RemoteError> {
        self.send(self.inner.client.get(self.url("posts/reported")))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_prefers_nested_message() {
        let body = r#"{"data":{"message":"Coupon has expired"},"message":"Bad Request"}"#;
        let parsed: ErrorResponse = serde_json::from_str(body).expect("parses");
        assert_eq!(parsed.into_message().as_deref(), Some("Coupon has expired"));
    }

    #[test]
    fn test_error_response_falls_back_to_top_level_message() {
        let body = r#"{"message":"Bad Request"}"#;
        let parsed: ErrorResponse = serde_json::from_str(body).expect("parses");
        assert_eq!(parsed.into_message().as_deref(), Some("Bad Request"));
    }

    #[test]
    fn test_status_error_truncates_unstructured_bodies() {
        let body = "x".repeat(2000);
        let err = HttpRemote::status_error(StatusCode::INTERNAL_SERVER_ERROR, body);
        match err {
            RemoteError::Status { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message.len(), 500);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_not_found_maps_to_dedicated_variant() {
        let err = HttpRemote::status_error(StatusCode::NOT_FOUND, String::new());
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[test]
    fn test_list_query_includes_every_set_filter() {
        let params = ListPostsParams {
            limit: Some(10),
            skip: Some(20),
            user_id: None,
            tag: Some("history".to_string()),
        };
        let query = list_query(&params);
        assert!(query.contains(&("limit", "10".to_string())));
        assert!(query.contains(&("skip", "20".to_string())));
        assert!(query.contains(&("tag", "history".to_string())));

        assert!(list_query(&ListPostsParams::default()).is_empty());
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let config = RemoteConfig {
            base_url: Url::parse("https://api.example.com/").expect("valid url"),
            access_token: None,
        };
        let remote = HttpRemote::new(&config);
        assert_eq!(remote.url("posts"), "https://api.example.com/posts");
    }
}

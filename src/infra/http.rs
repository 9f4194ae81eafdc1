//! REST/JSON backend adapter.
//!
//! Maps the [`ModelApi`] operations of one model type onto a resource
//! collection below the API base URL:
//!
//! | operation    | request                                   |
//! |--------------|-------------------------------------------|
//! | `fetch_one`  | `GET {resource}/{id}`                     |
//! | `fetch_list` | `GET {resource}` (`?filter=<name>` unless default list) |
//! | `create`     | `POST {resource}`                         |
//! | `update`     | `PATCH {resource}/{id}`                   |
//! | `delete_one` | `DELETE {resource}/{id}`                  |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::cache::{
    ApiError, CacheConfig, DEFAULT_LIST_NAME, EntityRecord, FetchOne, ModelApi, PartialSink,
};
use crate::config::{ApiSettings, ModelSettings};

use super::error::InfraError;

const SOURCE: &str = "infra::http";

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::decode(err.to_string())
        } else {
            ApiError::transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestModelApi {
    client: Client,
    collection: Url,
    token: Option<String>,
    single_fetch: bool,
    default_list: String,
}

impl RestModelApi {
    pub fn user_agent() -> &'static str {
        concat!("normcache/", env!("CARGO_PKG_VERSION"))
    }

    /// Adapter for `resource` below `base_url` with a default client.
    pub fn new(base_url: &Url, resource: &str) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Self::with_client(client, base_url, resource)
    }

    /// `base_url` is treated as a directory whether or not it ends in `/`.
    pub fn with_client(client: Client, base_url: &Url, resource: &str) -> Result<Self, InfraError> {
        if base_url.cannot_be_a_base() {
            return Err(InfraError::invalid_resource(
                base_url,
                resource,
                "base url cannot carry a path",
            ));
        }
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let collection = base
            .join(resource.trim_matches('/'))
            .map_err(|err| InfraError::invalid_resource(base_url, resource, err.to_string()))?;
        Ok(Self {
            client,
            collection,
            token: None,
            single_fetch: true,
            default_list: DEFAULT_LIST_NAME.to_string(),
        })
    }

    pub fn from_settings(
        api: &ApiSettings,
        model: &ModelSettings,
        cache: &CacheConfig,
    ) -> Result<Self, InfraError> {
        let client = build_client(api.timeout)?;
        let mut adapter = Self::with_client(client, &api.base_url, &model.resource)?
            .with_single_fetch(model.single_fetch)
            .with_default_list(&cache.default_list);
        adapter.token = api.token.clone();
        Ok(adapter)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_single_fetch(mut self, enabled: bool) -> Self {
        self.single_fetch = enabled;
        self
    }

    /// List name that maps to the unfiltered collection.
    pub fn with_default_list(mut self, name: impl Into<String>) -> Self {
        self.default_list = name.into();
        self
    }

    pub fn collection_url(&self) -> &Url {
        &self.collection
    }

    pub fn item_url(&self, id: &str) -> Result<Url, ApiError> {
        let mut url = self.collection.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::request(format!("`{}` cannot carry an id", self.collection)))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    fn list_url(&self, name: &str) -> Url {
        let mut url = self.collection.clone();
        if name != self.default_list {
            url.query_pairs_mut().append_pair("filter", name);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(target_module = SOURCE, %method, %url, "Sending backend request");
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        debug!(target_module = SOURCE, status = status.as_u16(), body = %text, "Backend rejected request");
        Err(ApiError::status(status.as_u16(), text))
    }

    async fn send_json(request: RequestBuilder) -> Result<Value, ApiError> {
        let response = Self::send(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|err| ApiError::decode(format!("failed to parse body: {err}")))
    }
}

fn build_client(timeout: Duration) -> Result<Client, InfraError> {
    Client::builder()
        .user_agent(RestModelApi::user_agent())
        .timeout(timeout)
        .build()
        .map_err(|err| InfraError::http_client(err.to_string()))
}

/// Accepts either a bare array or an `{"items": [...]}` envelope.
fn list_items(body: Value) -> Result<Vec<Value>, ApiError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut envelope) => match envelope.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ApiError::decode("list response object has no `items` array")),
        },
        other => Err(ApiError::decode(format!(
            "expected list response, got `{other}`"
        ))),
    }
}

#[async_trait]
impl ModelApi for RestModelApi {
    type CreateRequest = Value;
    type UpdateRequest = Value;

    async fn fetch_one(&self, id: &str) -> Result<FetchOne, ApiError> {
        if !self.single_fetch {
            return Ok(FetchOne::Unsupported);
        }
        let url = self.item_url(id)?;
        let body = Self::send_json(self.request(Method::GET, url)).await?;
        Ok(FetchOne::Found(body))
    }

    async fn fetch_list(&self, name: &str, _partial: &PartialSink) -> Result<Vec<Value>, ApiError> {
        let body = Self::send_json(self.request(Method::GET, self.list_url(name))).await?;
        list_items(body)
    }

    async fn create(&self, request: Value) -> Result<Value, ApiError> {
        let builder = self.request(Method::POST, self.collection.clone()).json(&request);
        Self::send_json(builder).await
    }

    async fn update(&self, request: Value) -> Result<Value, ApiError> {
        let id = request
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::request("update payload has no string `id`"))?;
        let url = self.item_url(id)?;
        Self::send_json(self.request(Method::PATCH, url).json(&request)).await
    }

    async fn delete_one(&self, model: &EntityRecord) -> Result<(), ApiError> {
        let url = self.item_url(model.id())?;
        Self::send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn posts() -> RestModelApi {
        let base = Url::parse("https://api.example.com/v1/").unwrap();
        RestModelApi::new(&base, "/posts/").unwrap()
    }

    #[test]
    fn urls_are_built_below_the_collection() {
        let api = posts();

        assert_eq!(api.collection_url().as_str(), "https://api.example.com/v1/posts");
        assert_eq!(
            api.item_url("a b").unwrap().as_str(),
            "https://api.example.com/v1/posts/a%20b"
        );
        assert_eq!(api.list_url("all").as_str(), "https://api.example.com/v1/posts");
        assert_eq!(
            api.list_url("drafts").as_str(),
            "https://api.example.com/v1/posts?filter=drafts"
        );
    }

    #[test]
    fn base_urls_without_trailing_slash_keep_their_last_segment() {
        let base = Url::parse("https://api.example.com/v1").unwrap();
        let api = RestModelApi::new(&base, "posts").unwrap();

        assert_eq!(api.collection_url().as_str(), "https://api.example.com/v1/posts");
        assert_eq!(base.as_str(), "https://api.example.com/v1");

        let mailto = Url::parse("mailto:team@example.com").unwrap();
        assert!(matches!(
            RestModelApi::new(&mailto, "posts"),
            Err(InfraError::InvalidResource { .. })
        ));
    }

    #[test]
    fn list_bodies_accept_arrays_and_envelopes() {
        assert_eq!(list_items(json!([{"id": "a"}])).unwrap().len(), 1);
        assert_eq!(
            list_items(json!({"items": [{"id": "a"}, {"id": "b"}], "next": null}))
                .unwrap()
                .len(),
            2
        );
        assert!(matches!(list_items(json!({"data": []})), Err(ApiError::Decode(_))));
        assert!(matches!(list_items(json!("nope")), Err(ApiError::Decode(_))));
    }
}

use crate::{Collection, Console, Error, Group};
use reqwest::{header, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("binding-mirror/", env!("CARGO_PKG_VERSION"));

const COLLECTIONS: &[&str] = &["api", "v1", "collections"];
const GROUPS: &[&str] = &["api", "v1", "groups"];

/// An HTTP client for the console API.
///
/// Requests use basic authentication. The console commonly serves a
/// self-signed certificate, so certificate validation is disabled.
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    base: Url,
    user: String,
    password: String,
}

// === impl Client ===

impl Client {
    pub fn new(
        base: &str,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Self::with_http_client(http, base, user, password)
    }

    pub fn with_http_client(
        http: reqwest::Client,
        base: &str,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, Error> {
        let base = Url::parse(base).map_err(|_| Error::InvalidUrl(base.to_string()))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(base.to_string()));
        }
        Ok(Self {
            http,
            base,
            user: user.into(),
            password: password.into(),
        })
    }

    fn url(&self, resource: &[&str], name: Option<&str>) -> Result<Url, Error> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty().extend(resource);
            if let Some(name) = name {
                // Segments are percent-encoded, including any '/'.
                segments.push(name);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.user, Some(&self.password))
            .header(header::CONTENT_TYPE, "application/json")
    }

    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Vec<u8>, Error> {
        let path = url.path().to_string();
        let mut req = self.request(method.clone(), url);
        if let Some(body) = body {
            req = req.json(body);
        }

        let rsp = match req.send().await {
            Ok(rsp) => rsp,
            Err(error) => {
                warn!(%method, %path, %error, "Console request failed");
                return Err(error.into());
            }
        };

        let status = rsp.status();
        if !status.is_success() {
            warn!(%method, %path, %status, "Console rejected request");
            return Err(Error::Status {
                method,
                path,
                status,
            });
        }
        debug!(%method, %path, %status, "Console request");
        Ok(rsp.bytes().await?.to_vec())
    }

    async fn list<T: DeserializeOwned>(&self, resource: &[&str]) -> Result<Vec<T>, Error> {
        let body = self
            .send(Method::GET, self.url(resource, None)?, None)
            .await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let items: Option<Vec<T>> = serde_json::from_slice(&body)?;
        Ok(items.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl Console for Client {
    async fn list_collections(&self) -> Result<Vec<Collection>, Error> {
        self.list(COLLECTIONS).await
    }

    async fn list_groups(&self) -> Result<Vec<Group>, Error> {
        self.list(GROUPS).await
    }

    async fn create_collection(&self, doc: &Value) -> Result<(), Error> {
        let url = self.url(COLLECTIONS, None)?;
        self.send(Method::POST, url, Some(doc)).await.map(|_| ())
    }

    async fn create_group(&self, doc: &Value) -> Result<(), Error> {
        let url = self.url(GROUPS, None)?;
        self.send(Method::POST, url, Some(doc)).await.map(|_| ())
    }

    async fn replace_collection(&self, collection: &Collection) -> Result<(), Error> {
        let url = self.url(COLLECTIONS, Some(&collection.name))?;
        let doc = serde_json::to_value(collection)?;
        self.send(Method::PUT, url, Some(&doc)).await.map(|_| ())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), Error> {
        let url = self.url(COLLECTIONS, Some(name))?;
        self.send(Method::DELETE, url, None).await.map(|_| ())
    }

    async fn delete_group(&self, name: &str) -> Result<(), Error> {
        let url = self.url(GROUPS, Some(name))?;
        self.send(Method::DELETE, url, None).await.map(|_| ())
    }
}

use crate::{Error, RecoveryStore};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const PUT_PATH: &str = "v3/kv/put";
const RANGE_PATH: &str = "v3/kv/range";
const DELETE_RANGE_PATH: &str = "v3/kv/deleterange";

/// A client for etcd's v3 JSON gateway.
///
/// Requests go to the first endpoint that answers; transport failures and
/// timeouts move on to the next endpoint.
#[derive(Clone, Debug)]
pub struct EtcdStore {
    http: reqwest::Client,
    endpoints: Vec<String>,
    prefix: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct PutRequest {
    key: String,
    value: String,
}

#[derive(Serialize)]
struct KeyRequest {
    key: String,
}

#[derive(Default, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<KeyValue>,
}

#[derive(Deserialize)]
struct KeyValue {
    #[serde(default)]
    value: String,
}

// === impl EtcdStore ===

impl EtcdStore {
    /// Builds a client for the given endpoints. Endpoints without a scheme
    /// are assumed to be plain HTTP.
    pub fn new(
        endpoints: impl IntoIterator<Item = impl AsRef<str>>,
        prefix: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| Error::Transport {
                endpoint: String::new(),
                source,
            })?;
        Self::with_http_client(http, endpoints, prefix, timeout)
    }

    pub fn with_http_client(
        http: reqwest::Client,
        endpoints: impl IntoIterator<Item = impl AsRef<str>>,
        prefix: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let endpoints = endpoints
            .into_iter()
            .map(|ep| normalize_endpoint(ep.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }
        Ok(Self {
            http,
            endpoints,
            prefix: prefix.into(),
            timeout,
        })
    }

    fn encode_key(&self, key: &str) -> String {
        STANDARD.encode(format!("{}{}", self.prefix, key))
    }

    async fn call<Req, Rsp>(&self, path: &str, body: &Req) -> Result<Rsp, Error>
    where
        Req: Serialize + Sync,
        Rsp: DeserializeOwned,
    {
        let mut last_error = Error::NoEndpoints;
        for endpoint in &self.endpoints {
            let url = format!("{endpoint}/{path}");
            let rsp = match self.http.post(&url).json(body).send().await {
                Ok(rsp) => rsp,
                Err(error) if error.is_timeout() => {
                    warn!(%endpoint, "Store request timed out");
                    last_error = Error::Timeout {
                        endpoint: endpoint.clone(),
                        timeout: self.timeout,
                    };
                    continue;
                }
                Err(source) => {
                    warn!(%endpoint, error = %source, "Store request failed");
                    last_error = Error::Transport {
                        endpoint: endpoint.clone(),
                        source,
                    };
                    continue;
                }
            };

            let status = rsp.status();
            debug!(%url, %status, "Store responded");
            if !status.is_success() {
                return Err(Error::Status {
                    endpoint: endpoint.clone(),
                    status,
                });
            }
            return rsp.json().await.map_err(|source| Error::Transport {
                endpoint: endpoint.clone(),
                source,
            });
        }
        Err(last_error)
    }
}

#[async_trait::async_trait]
impl RecoveryStore for EtcdStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), Error> {
        let req = PutRequest {
            key: self.encode_key(key),
            value: STANDARD.encode(value),
        };
        self.call::<_, serde::de::IgnoredAny>(PUT_PATH, &req)
            .await
            .map(|_| ())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let req = KeyRequest {
            key: self.encode_key(key),
        };
        let rsp: RangeResponse = self.call(RANGE_PATH, &req).await?;
        match rsp.kvs.into_iter().next() {
            None => Ok(None),
            Some(kv) => STANDARD
                .decode(kv.value)
                .map(Some)
                .map_err(|error| Error::Decode {
                    key: key.to_string(),
                    reason: error.to_string(),
                }),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let req = KeyRequest {
            key: self.encode_key(key),
        };
        self.call::<_, serde::de::IgnoredAny>(DELETE_RANGE_PATH, &req)
            .await
            .map(|_| ())
    }
}

fn normalize_endpoint(endpoint: &str) -> Result<String, Error> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.is_empty() {
        return Err(Error::InvalidEndpoint(endpoint.to_string()));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.to_string())
    } else if endpoint.contains("://") {
        Err(Error::InvalidEndpoint(endpoint.to_string()))
    } else {
        Ok(format!("http://{endpoint}"))
    }
}

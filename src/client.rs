use crate::policy::Label;
use crate::probe::{Observation, StatusProbe};
use async_trait::async_trait;
use drogue_bazaar::{core::tls::ClientConfig, reqwest::ClientFactory};
use drogue_client::core::PropagateCurrentContext;
use drogue_client::error::{ClientError, ErrorInformation};
use drogue_client::openid::{AccessTokenProvider, NoTokenProvider, TokenInjector, TokenProvider};
use reqwest::{IntoUrl, Method, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;
use url::Url;

#[derive(Clone, Debug)]
pub struct ResourceClientBuilder {
    api: Url,
    token_provider: Option<Arc<dyn TokenProvider>>,
    client: ClientFactory,
}

impl ResourceClientBuilder {
    #[allow(unused)]
    pub fn new<U>(api: U) -> Result<Self, reqwest::Error>
    where
        U: IntoUrl,
    {
        Ok(Self::from_url(api.into_url()?))
    }

    pub fn from_url(api: Url) -> Self {
        Self {
            api,
            token_provider: None,
            client: ClientFactory::new(),
        }
    }

    pub fn client(mut self, config: ClientConfig) -> Self {
        self.client = ClientFactory::from(config);
        self
    }

    pub fn access_token(mut self, user: String, token: String) -> Self {
        self.token_provider = Some(Arc::new(AccessTokenProvider { user, token }));
        self
    }

    pub fn build(self) -> anyhow::Result<ResourceClient> {
        let client = self.client.build()?;
        Ok(ResourceClient::new(
            client,
            self.api,
            self.token_provider
                .unwrap_or_else(|| Arc::new(NoTokenProvider)),
        ))
    }
}

/// Reads resource representations from a REST API.
#[derive(Clone, Debug)]
pub struct ResourceClient {
    client: reqwest::Client,
    api: Url,
    token_provider: Arc<dyn TokenProvider>,
}

impl ResourceClient {
    pub fn new(client: reqwest::Client, api: Url, token_provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            client,
            api,
            token_provider,
        }
    }

    pub fn url<S: AsRef<str>>(&self, path: &[S]) -> Result<Url, ClientError> {
        let mut url = self.api.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::Request("Failed to build path".to_string()))?
            .pop_if_empty()
            .extend(path);
        Ok(url)
    }

    /// Fetch a resource, `None` if it does not exist.
    #[instrument(skip_all, err, fields(url = %url))]
    pub async fn get_resource(&self, url: Url) -> Result<Option<Value>, ClientError> {
        let response = self
            .client
            .request(Method::GET, url)
            .propagate_current_context()
            .inject_token(self.token_provider.as_ref())
            .await?
            .send()
            .await?;

        read_response(response).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Existence {
    Present,
    Absent,
    Unknown,
}

fn existence(status: StatusCode) -> Existence {
    match status {
        StatusCode::OK => Existence::Present,
        StatusCode::NOT_FOUND | StatusCode::GONE => Existence::Absent,
        _ => Existence::Unknown,
    }
}

async fn read_response(response: Response) -> Result<Option<Value>, ClientError> {
    log::debug!("Eval get response: {:#?}", response);
    match existence(response.status()) {
        Existence::Present => Ok(Some(response.json().await?)),
        Existence::Absent => Ok(None),
        Existence::Unknown => default_response(response).await,
    }
}

async fn default_response<T>(response: Response) -> Result<T, ClientError> {
    let code = response.status();
    match response.json::<ErrorInformation>().await {
        Ok(info) => Err(ClientError::Service { code, error: info }),
        Err(_) => Err(ClientError::Response(code)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("resource has no state at '{0}'")]
    MissingLabel(String),
    #[error("state at '{pointer}' is not a scalar value: {value}")]
    InvalidLabel { pointer: String, value: Value },
}

/// Extract the state label from a resource representation.
///
/// `pointer` is a JSON pointer (RFC 6901). Numbers and booleans are used in
/// their textual form. An empty string is rejected, it would read as absence.
pub fn extract_label(resource: &Value, pointer: &str) -> Result<Label, ProbeError> {
    match resource.pointer(pointer) {
        None | Some(Value::Null) => Err(ProbeError::MissingLabel(pointer.to_string())),
        Some(Value::String(label)) if label.is_empty() => {
            Err(ProbeError::MissingLabel(pointer.to_string()))
        }
        Some(Value::String(label)) => Ok(Label::new(label.as_str())),
        Some(value @ (Value::Number(_) | Value::Bool(_))) => Ok(Label::new(value.to_string())),
        Some(value) => Err(ProbeError::InvalidLabel {
            pointer: pointer.to_string(),
            value: value.clone(),
        }),
    }
}

/// Probes a single REST resource, treating "not found" as absence.
#[derive(Clone, Debug)]
pub struct ResourceProbe {
    client: ResourceClient,
    url: Url,
    label: String,
}

impl ResourceProbe {
    pub fn new(client: ResourceClient, url: Url, label: String) -> Self {
        Self { client, url, label }
    }
}

#[async_trait]
impl StatusProbe for ResourceProbe {
    type Snapshot = Value;
    type Error = ProbeError;

    async fn probe(&mut self) -> Result<Observation<Value>, ProbeError> {
        match self.client.get_resource(self.url.clone()).await? {
            None => Ok(Observation::Absent),
            Some(resource) => {
                let label = extract_label(&resource, &self.label)?;
                Ok(Observation::Present {
                    snapshot: resource,
                    label,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn label_from_string() {
        let resource = json!({"status": {"phase": "creating"}});
        assert_eq!(
            extract_label(&resource, "/status/phase").unwrap(),
            Label::from("creating")
        );
    }

    #[test]
    fn label_from_scalar() {
        let resource = json!({"done": true, "progress": 42});
        assert_eq!(extract_label(&resource, "/done").unwrap(), Label::from("true"));
        assert_eq!(
            extract_label(&resource, "/progress").unwrap(),
            Label::from("42")
        );
    }

    #[test]
    fn missing_label() {
        let resource = json!({"status": null});
        assert!(matches!(
            extract_label(&resource, "/status"),
            Err(ProbeError::MissingLabel(_))
        ));
        assert!(matches!(
            extract_label(&resource, "/other"),
            Err(ProbeError::MissingLabel(_))
        ));
        assert!(matches!(
            extract_label(&json!({"status": {}}), "/status"),
            Err(ProbeError::InvalidLabel { .. })
        ));
    }

    #[test]
    fn empty_label_is_not_absence() {
        let resource = json!({"status": ""});
        assert!(matches!(
            extract_label(&resource, "/status"),
            Err(ProbeError::MissingLabel(_))
        ));
    }

    #[test]
    fn status_codes() {
        assert_eq!(existence(StatusCode::OK), Existence::Present);
        assert_eq!(existence(StatusCode::NOT_FOUND), Existence::Absent);
        assert_eq!(existence(StatusCode::GONE), Existence::Absent);
        assert_eq!(existence(StatusCode::NO_CONTENT), Existence::Unknown);
        assert_eq!(existence(StatusCode::FORBIDDEN), Existence::Unknown);
        assert_eq!(
            existence(StatusCode::INTERNAL_SERVER_ERROR),
            Existence::Unknown
        );
    }

    #[test]
    fn url_from_path() {
        let client = ResourceClientBuilder::from_url(Url::parse("http://localhost:8080/api/").unwrap())
            .build()
            .unwrap();
        let url = client.url(&["v1", "databases", "db 1"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/v1/databases/db%201");
    }
}

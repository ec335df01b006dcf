//! HTTP exchange with a directory endpoint

use crate::config::{AuthMode, DirectoryEndpoint, TlsMaterial, CONNECT_TIMEOUT_MS};
use crate::error::HpdError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::error::Error as StdError;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml;charset=utf-8";

/// Pluggable request/response exchange with a directory
#[async_trait]
pub trait DirectoryTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send one envelope and return the raw response body
    async fn exchange(
        &self,
        endpoint: &DirectoryEndpoint,
        envelope: &str,
        read_timeout: Duration,
    ) -> Result<String, HpdError>;
}

/// `Basic base64(user:pass)`
pub fn basic_auth_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    connect_timeout: Duration,
}

impl HttpTransport {
    pub fn new() -> Result<Self, HpdError> {
        Self::with_connect_timeout(Duration::from_millis(CONNECT_TIMEOUT_MS))
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, HpdError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| HpdError::Tls(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            connect_timeout,
        })
    }

    fn client_for(&self, endpoint: &DirectoryEndpoint) -> Result<reqwest::Client, HpdError> {
        match &endpoint.auth {
            AuthMode::MutualTls(material) => self.tls_client(material),
            AuthMode::None | AuthMode::Basic { .. } => Ok(self.client.clone()),
        }
    }

    /// Client presenting the endpoint's certificate. Material is read on every call.
    fn tls_client(&self, material: &TlsMaterial) -> Result<reqwest::Client, HpdError> {
        let keystore = std::fs::read(&material.keystore_path).map_err(|e| {
            HpdError::Certificate(format!(
                "cannot read keystore {}: {}",
                material.keystore_path.display(),
                e
            ))
        })?;
        let identity = reqwest::Identity::from_pkcs12_der(&keystore, material.keystore_password())
            .map_err(|e| HpdError::Certificate(format!("invalid keystore: {}", e)))?;

        let truststore = std::fs::read(&material.truststore_path).map_err(|e| {
            HpdError::Certificate(format!(
                "cannot read truststore {}: {}",
                material.truststore_path.display(),
                e
            ))
        })?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .identity(identity)
            .danger_accept_invalid_hostnames(!material.verify_hostname);
        for cert in trusted_certificates(&truststore)? {
            builder = builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|e| HpdError::Tls(format!("Failed to build TLS client: {}", e)))
    }
}

/// Certificates from a PEM bundle, or a single DER certificate
fn trusted_certificates(bytes: &[u8]) -> Result<Vec<reqwest::Certificate>, HpdError> {
    const END: &str = "-----END CERTIFICATE-----";
    let invalid = |e: reqwest::Error| HpdError::Certificate(format!("invalid truststore: {}", e));

    let text = String::from_utf8_lossy(bytes);
    if !text.contains("-----BEGIN CERTIFICATE-----") {
        return Ok(vec![reqwest::Certificate::from_der(bytes).map_err(invalid)?]);
    }

    text.split_inclusive(END)
        .filter(|block| block.contains("-----BEGIN CERTIFICATE-----"))
        .map(|block| reqwest::Certificate::from_pem(block.trim().as_bytes()).map_err(invalid))
        .collect()
}

fn error_chain(err: &(dyn StdError + 'static)) -> (String, bool) {
    let mut text = err.to_string().to_lowercase();
    let mut refused = false;
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            refused |= io.kind() == std::io::ErrorKind::ConnectionRefused;
        }
        text.push_str(" | ");
        text.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }
    (text, refused)
}

/// Map a reqwest failure onto the error taxonomy
pub fn classify_request_error(err: &reqwest::Error, url: &str) -> HpdError {
    let (chain, refused) = error_chain(err);

    if err.is_builder() {
        return HpdError::InvalidServiceUrl(url.to_string());
    }
    if err.is_timeout() {
        return if err.is_connect() {
            HpdError::ConnectTimeout(url.to_string())
        } else {
            HpdError::ResponseTimeout(url.to_string())
        };
    }
    if refused || chain.contains("connection refused") {
        return HpdError::ConnectionRefused(url.to_string());
    }
    if chain.contains("dns error")
        || chain.contains("failed to lookup address")
        || chain.contains("name or service not known")
        || chain.contains("no such host")
    {
        return HpdError::UnknownHost(url.to_string());
    }
    if chain.contains("certificate") {
        return HpdError::Certificate(chain);
    }
    if chain.contains("tls") || chain.contains("ssl") || chain.contains("handshake") {
        return HpdError::Tls(chain);
    }
    if err.is_connect() {
        return HpdError::Connect {
            url: url.to_string(),
            message: chain,
        };
    }
    HpdError::Io(chain)
}

fn check_status(status: reqwest::StatusCode) -> Result<(), HpdError> {
    match status.as_u16() {
        200 => Ok(()),
        503 => Err(HpdError::ServiceUnavailable),
        401 => Err(HpdError::Unauthorized),
        415 => Err(HpdError::UnsupportedMediaType),
        other => Err(HpdError::UnexpectedStatus(other)),
    }
}

#[async_trait]
impl DirectoryTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn exchange(
        &self,
        endpoint: &DirectoryEndpoint,
        envelope: &str,
        read_timeout: Duration,
    ) -> Result<String, HpdError> {
        let url = reqwest::Url::parse(&endpoint.service_url)
            .map_err(|_| HpdError::InvalidServiceUrl(endpoint.service_url.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HpdError::InvalidServiceUrl(endpoint.service_url.clone()));
        }

        let client = self.client_for(endpoint)?;
        let mut request = client
            .post(url)
            .timeout(read_timeout)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(envelope.to_string());
        if let AuthMode::Basic { username, password } = &endpoint.auth {
            request = request.header(AUTHORIZATION, basic_auth_header(username, password));
        }

        debug!("POST {} ({} bytes)", endpoint.service_url, envelope.len());
        let response = request
            .send()
            .await
            .map_err(|e| classify_request_error(&e, &endpoint.service_url))?;

        check_status(response.status())?;

        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error(&e, &endpoint.service_url))?;
        debug!("Response from {}: {}", endpoint.service_url, body);
        Ok(body)
    }
}

/// A request seen by [`MockTransport`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub directory_id: String,
    pub envelope: String,
}

/// In-process transport returning canned responses.
///
/// Failure rules for the target directory win. Otherwise the first rule whose
/// needle occurs in the envelope (and whose directory matches, when one is
/// given) supplies the response, falling back to an empty batch response.
#[derive(Default)]
pub struct MockTransport {
    rules: Vec<MockRule>,
    requests: Mutex<Vec<RecordedRequest>>,
}

struct MockRule {
    directory_id: Option<String>,
    needle: String,
    response: Result<String, fn() -> HpdError>,
}

pub const EMPTY_BATCH_RESPONSE: &str =
    "<batchResponse xmlns='urn:oasis:names:tc:DSML:2:0:core'><searchResultDone><resultCode code='0'/></searchResultDone></batchResponse>";

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `response` when the envelope contains `needle`
    pub fn respond(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push(MockRule {
            directory_id: None,
            needle: needle.into(),
            response: Ok(response.into()),
        });
        self
    }

    /// Like [`respond`](Self::respond) but only for one directory
    pub fn respond_for(
        mut self,
        directory_id: impl Into<String>,
        needle: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.rules.push(MockRule {
            directory_id: Some(directory_id.into()),
            needle: needle.into(),
            response: Ok(response.into()),
        });
        self
    }

    /// Fail every request to `directory_id`
    pub fn fail_for(mut self, directory_id: impl Into<String>, error: fn() -> HpdError) -> Self {
        self.rules.push(MockRule {
            directory_id: Some(directory_id.into()),
            needle: String::new(),
            response: Err(error),
        });
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl DirectoryTransport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn exchange(
        &self,
        endpoint: &DirectoryEndpoint,
        envelope: &str,
        _read_timeout: Duration,
    ) -> Result<String, HpdError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                directory_id: endpoint.id.clone(),
                envelope: envelope.to_string(),
            });
        }

        let applies = |rule: &&MockRule| {
            rule.directory_id
                .as_deref()
                .map(|id| endpoint.matches_id(id))
                .unwrap_or(true)
                && envelope.contains(&rule.needle)
        };
        let rule = self
            .rules
            .iter()
            .filter(|rule| rule.response.is_err())
            .find(applies)
            .or_else(|| self.rules.iter().find(applies));

        match rule.map(|r| &r.response) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(make_error)) => Err(make_error()),
            None => Ok(EMPTY_BATCH_RESPONSE.to_string()),
        }
    }
}

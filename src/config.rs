//! Directory endpoints and the immutable client configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Read timeout used when an endpoint does not override it
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 4000;
/// Connect timeout applied to every endpoint
pub const CONNECT_TIMEOUT_MS: u64 = 5000;
/// Key/trust store password used when an endpoint does not set one
pub const DEFAULT_STORE_PASSWORD: &str = "changeit";

/// SOAP envelope carrying one DSML batch request.
///
/// Placeholders: `{message_id}`, `{service_url}`, `{batch_request_id}`, `{search_request}`.
pub const DEFAULT_ENVELOPE_TEMPLATE: &str = concat!(
    "<?xml version='1.0' encoding='UTF-8'?>",
    "<soap-env:Envelope xmlns:soap-env='http://schemas.xmlsoap.org/soap/envelope/' ",
    "xmlns:a='http://www.w3.org/2005/08/addressing'>",
    "<soap-env:Header>",
    "<a:Action soap-env:mustUnderstand='0'>urn:ihe:iti:hpd:2010:ProviderInformationQueryRequest</a:Action>",
    "<a:MessageID soap-env:mustUnderstand='0'>urn:uuid:{message_id}</a:MessageID>",
    "<a:ReplyTo><a:Address>http://www.w3.org/2005/08/addressing/anonymous</a:Address></a:ReplyTo>",
    "<a:To soap-env:mustUnderstand='1'>{service_url}</a:To>",
    "</soap-env:Header>",
    "<soap-env:Body>",
    "<batchRequest xmlns='urn:oasis:names:tc:DSML:2:0:core' requestID='{batch_request_id}'>",
    "{search_request}",
    "</batchRequest>",
    "</soap-env:Body>",
    "</soap-env:Envelope>"
);

/// Client TLS material for mutual authentication
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TlsMaterial {
    /// PKCS#12 file holding the client certificate and key
    pub keystore_path: PathBuf,
    #[serde(default)]
    pub keystore_password: Option<String>,
    /// PEM bundle of trusted CA certificates
    pub truststore_path: PathBuf,
    #[serde(default)]
    pub verify_hostname: bool,
}

impl TlsMaterial {
    pub fn keystore_password(&self) -> &str {
        self.keystore_password.as_deref().unwrap_or(DEFAULT_STORE_PASSWORD)
    }
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("keystore_path", &self.keystore_path)
            .field("keystore_password", &"[REDACTED]")
            .field("truststore_path", &self.truststore_path)
            .field("verify_hostname", &self.verify_hostname)
            .finish()
    }
}

/// How requests to an endpoint authenticate
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    MutualTls(TlsMaterial),
}

impl AuthMode {
    pub fn label(&self) -> &'static str {
        match self {
            AuthMode::None => "none",
            AuthMode::Basic { .. } => "basic",
            AuthMode::MutualTls(_) => "mutual_tls",
        }
    }
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::None => write!(f, "None"),
            AuthMode::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            AuthMode::MutualTls(material) => f.debug_tuple("MutualTls").field(material).finish(),
        }
    }
}

/// Text-in/text-out rewrite applied to a fully built envelope before it is sent.
///
/// Implementations must be idempotent.
pub trait EnvelopeTransform: Send + Sync {
    fn apply(&self, envelope: &str) -> String;
}

impl<F> EnvelopeTransform for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn apply(&self, envelope: &str) -> String {
        self(envelope)
    }
}

/// Literal find/replace step, the configurable form of an envelope transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub find: String,
    pub replace: String,
}

impl RewriteRule {
    pub fn apply(&self, text: &str) -> String {
        if self.find.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.find, &self.replace)
        }
    }
}

/// One provider directory the client can search
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectoryEndpoint {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub base_dn: String,
    pub service_url: String,
    #[serde(default)]
    pub auth: AuthMode,
    /// Read timeout override; zero or absent means the client default
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub rewrites: Vec<RewriteRule>,
    #[serde(skip)]
    pub transform: Option<Arc<dyn EnvelopeTransform>>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl DirectoryEndpoint {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        base_dn: impl Into<String>,
        service_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            base_dn: base_dn.into(),
            service_url: service_url.into(),
            auth: AuthMode::None,
            request_timeout_ms: None,
            rewrites: Vec::new(),
            transform: None,
            active: true,
        }
    }

    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn EnvelopeTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Endpoint override when set and non-zero, otherwise `default`
    pub fn read_timeout(&self, default: Duration) -> Duration {
        match self.request_timeout_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => default,
        }
    }

    /// Run the configured rewrites, then the custom transform
    pub fn transform_envelope(&self, envelope: String) -> String {
        let envelope = self
            .rewrites
            .iter()
            .fold(envelope, |text, rule| rule.apply(&text));
        match &self.transform {
            Some(transform) => transform.apply(&envelope),
            None => envelope,
        }
    }

    pub fn matches_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }
}

impl fmt::Debug for DirectoryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryEndpoint")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base_dn", &self.base_dn)
            .field("service_url", &self.service_url)
            .field("auth", &self.auth)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("rewrites", &self.rewrites.len())
            .field("transform", &self.transform.is_some())
            .field("active", &self.active)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub default_request_timeout_ms: u64,
    #[serde(default = "default_envelope_template")]
    pub envelope_template: String,
    #[serde(default)]
    directories: Vec<DirectoryEndpoint>,
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_envelope_template() -> String {
    DEFAULT_ENVELOPE_TEMPLATE.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            envelope_template: default_envelope_template(),
            directories: Vec::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(directories: Vec<DirectoryEndpoint>) -> Self {
        directories
            .into_iter()
            .fold(Self::default(), |config, endpoint| config.with_directory(endpoint))
    }

    /// Parse a JSON configuration document, dropping duplicate directory ids
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: ClientConfig =
            serde_json::from_str(json).context("Failed to parse HPD client configuration")?;
        let directories = parsed.directories;
        let base = ClientConfig {
            directories: Vec::new(),
            ..parsed
        };
        Ok(directories
            .into_iter()
            .fold(base, |config, endpoint| config.with_directory(endpoint)))
    }

    /// Add an endpoint; one whose id is already present (ignoring case) is skipped
    pub fn with_directory(mut self, endpoint: DirectoryEndpoint) -> Self {
        if self.directory(&endpoint.id).is_some() {
            warn!("Ignoring duplicate HPD instance id '{}'", endpoint.id);
        } else {
            self.directories.push(endpoint);
        }
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.default_request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_envelope_template(mut self, template: impl Into<String>) -> Self {
        self.envelope_template = template.into();
        self
    }

    pub fn default_request_timeout(&self) -> Duration {
        Duration::from_millis(self.default_request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(CONNECT_TIMEOUT_MS)
    }

    pub fn directories(&self) -> &[DirectoryEndpoint] {
        &self.directories
    }

    /// Case-insensitive lookup by id
    pub fn directory(&self, id: &str) -> Option<&DirectoryEndpoint> {
        self.directories.iter().find(|d| d.matches_id(id))
    }
}

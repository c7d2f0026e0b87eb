//! Client configuration.
//!
//! # Design
//! `Config` is assembled once with chainable setters and then moved into an
//! `ApiClient`, which only ever reads it. The data-only part can also come
//! from a JSON settings file via `Settings`; hooks, the delivery context and
//! the runtime handle are code-only.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::runtime::Handle;

use crate::delivery::DeliveryContext;
use crate::endpoint::{Headers, Parameters};
use crate::error::{ApiError, ConfigError};
use crate::http::{HttpRequest, HttpResponse};
use crate::pinning::{CertificatePin, CertificateSource};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Called after every real HTTP exchange.
pub type LogHook = Arc<dyn Fn(&HttpRequest, &HttpResponse) + Send + Sync>;

/// Called with every classified failure.
pub type ErrorHook = Arc<dyn Fn(&ApiError) + Send + Sync>;

/// Everything an `ApiClient` needs to know.
#[derive(Clone)]
pub struct Config {
    pub base_url: String,
    pub default_parameters: Parameters,
    pub default_headers: Headers,
    pub timeout: Duration,
    pub certificate_pins: Vec<CertificatePin>,
    pub error_message_key_path: Option<String>,
    pub mock_enabled: bool,
    pub log_hook: Option<LogHook>,
    pub error_hook: Option<ErrorHook>,
    /// Where observer callbacks run. Defaults to a dedicated delivery thread.
    pub delivery: Option<Arc<dyn DeliveryContext>>,
    /// Runtime for transport work. Defaults to the runtime current at
    /// client construction.
    pub runtime: Option<Handle>,
}

impl Config {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_parameters: Parameters::new(),
            default_headers: Headers::new(),
            timeout: DEFAULT_TIMEOUT,
            certificate_pins: Vec::new(),
            error_message_key_path: None,
            mock_enabled: false,
            log_hook: None,
            error_hook: None,
            delivery: None,
            runtime: None,
        }
    }

    pub fn default_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.default_parameters.insert(key.into(), value.into());
        self
    }

    pub fn default_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn certificate_pin(mut self, pin: CertificatePin) -> Self {
        self.certificate_pins.push(pin);
        self
    }

    pub fn error_message_key_path(mut self, path: impl Into<String>) -> Self {
        self.error_message_key_path = Some(path.into());
        self
    }

    pub fn mock_enabled(mut self, enabled: bool) -> Self {
        self.mock_enabled = enabled;
        self
    }

    pub fn log_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HttpRequest, &HttpResponse) + Send + Sync + 'static,
    {
        self.log_hook = Some(Arc::new(hook));
        self
    }

    pub fn error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ApiError) + Send + Sync + 'static,
    {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    pub fn delivery(mut self, delivery: Arc<dyn DeliveryContext>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("default_parameters", &self.default_parameters)
            .field("default_headers", &self.default_headers)
            .field("timeout", &self.timeout)
            .field("certificate_pins", &self.certificate_pins)
            .field("error_message_key_path", &self.error_message_key_path)
            .field("mock_enabled", &self.mock_enabled)
            .field("log_hook", &self.log_hook.is_some())
            .field("error_hook", &self.error_hook.is_some())
            .finish_non_exhaustive()
    }
}

/// Data-only configuration as read from a JSON settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub base_url: String,
    #[serde(default)]
    pub default_parameters: Parameters,
    #[serde(default)]
    pub default_headers: Headers,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    #[serde(default)]
    pub certificate_pins: Vec<PinSetting>,
    #[serde(default)]
    pub error_message_key_path: Option<String>,
    #[serde(default)]
    pub mock_enabled: bool,
}

/// A certificate pin as written in a settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinSetting {
    pub hostname: String,
    pub certificate: PathBuf,
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Relative certificate paths are resolved against `base_dir`.
    pub fn into_config(self, base_dir: impl AsRef<Path>) -> Config {
        let base_dir = base_dir.as_ref();
        let mut config = Config::new(self.base_url).mock_enabled(self.mock_enabled);
        config.default_parameters = self.default_parameters;
        config.default_headers = self.default_headers;
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::try_from_secs_f64(secs).unwrap_or(DEFAULT_TIMEOUT);
        }
        config.error_message_key_path = self.error_message_key_path;
        config.certificate_pins = self
            .certificate_pins
            .into_iter()
            .map(|pin| CertificatePin {
                hostname: pin.hostname,
                certificate: CertificateSource::File(base_dir.join(pin.certificate)),
            })
            .collect();
        config
    }
}

/// Defaults first, then per-request values; the request wins on collision.
pub fn merge_parameters(defaults: &Parameters, request: Parameters) -> Parameters {
    let mut merged = defaults.clone();
    merged.extend(request);
    merged
}

/// Like `merge_parameters`, but header names compare case-insensitively and
/// the per-request spelling is kept.
pub fn merge_headers(defaults: &Headers, request: Headers) -> Headers {
    let mut merged: Headers = defaults
        .iter()
        .filter(|(k, _)| !request.keys().any(|r| r.eq_ignore_ascii_case(k)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    merged.extend(request);
    merged
}

/// Paths carrying an `http://` or `https://` scheme are used verbatim.
pub fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{base_url}{path}")
    }
}

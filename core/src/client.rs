//! The public entry point: one `ApiClient` per configured API.
//!
//! # Design
//! Construction does all fallible work up front. It loads the certificate
//! pins, builds the pin-aware TLS configuration and the shared `reqwest`
//! connection pool, and resolves the runtime and delivery context. After
//! that the client is read-only; clones share one `Shared` behind an `Arc`.
//!
//! `request` snapshots the endpoint immediately and returns a cold `Call`.
//! Nothing touches the network until the call is observed.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::runtime::Handle;

use crate::call::{Call, Dispatcher};
use crate::config::{Config, ErrorHook, LogHook};
use crate::delivery::DeliveryQueue;
use crate::endpoint::{Endpoint, Headers, Parameters};
use crate::error::{ApiError, ConfigError};
use crate::pinning::PinPolicy;
use crate::transport;

const DELIVERY_THREAD: &str = "restcall-delivery";

/// Read-only state used by every dispatch of a client.
pub(crate) struct Shared {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) default_parameters: Parameters,
    pub(crate) default_headers: Headers,
    pub(crate) error_message_key_path: Option<String>,
    pub(crate) mock_enabled: bool,
    pub(crate) log_hook: Option<LogHook>,
    pub(crate) error_hook: Option<ErrorHook>,
}

/// Executes endpoints against one API.
#[derive(Clone)]
pub struct ApiClient {
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
}

impl ApiClient {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let runtime = match config.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| ConfigError::NoRuntime)?,
        };
        let delivery = match config.delivery {
            Some(delivery) => delivery,
            None => DeliveryQueue::spawn_thread(DELIVERY_THREAD)
                .map_err(ConfigError::Delivery)?
                .into_context(),
        };

        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(policy) = PinPolicy::from_pins(&config.certificate_pins)? {
            builder = builder.use_preconfigured_tls(policy.client_config()?);
        }
        let http = builder.build()?;

        tracing::debug!(
            base_url = %config.base_url,
            timeout = ?config.timeout,
            pins = config.certificate_pins.len(),
            mock_enabled = config.mock_enabled,
            "api client ready"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                http,
                base_url: config.base_url,
                default_parameters: config.default_parameters,
                default_headers: config.default_headers,
                error_message_key_path: config.error_message_key_path,
                mock_enabled: config.mock_enabled,
                log_hook: config.log_hook,
                error_hook: config.error_hook,
            }),
            dispatcher: Dispatcher { runtime, delivery },
        })
    }

    /// A call executing `endpoint` and decoding the response into `T`.
    ///
    /// The endpoint is read once, here; later subscriptions replay the same
    /// snapshot.
    pub fn request<T, E>(&self, endpoint: &E) -> Call<T>
    where
        T: DeserializeOwned + Send + 'static,
        E: Endpoint + ?Sized,
    {
        let prepared = Arc::new(transport::prepare(&self.shared, endpoint));
        tracing::trace!(
            method = %prepared.method,
            url = %prepared.url,
            route = ?prepared.route,
            "request prepared"
        );
        let shared = self.shared.clone();
        Call::from_fn(self.dispatcher.clone(), move || {
            let shared = shared.clone();
            let prepared = prepared.clone();
            async move { transport::execute::<T>(&shared, &prepared).await }
        })
    }

    /// Wrap an arbitrary async operation in a `Call` that follows this
    /// client's dispatch and delivery rules. `f` runs once per subscription.
    pub fn defer<T, F, Fut>(&self, f: F) -> Call<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Call::from_fn(self.dispatcher.clone(), f)
    }

    /// Run every call concurrently; succeed with all results in input order.
    ///
    /// The first failure cancels the calls still in flight and becomes the
    /// error of the combined call.
    pub fn all<T: Send + 'static>(&self, calls: Vec<Call<T>>) -> Call<Vec<T>> {
        Call::join_all(self.dispatcher.clone(), calls)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.shared.base_url)
            .field("mock_enabled", &self.shared.mock_enabled)
            .finish_non_exhaustive()
    }
}

//! Request-execution core for REST API clients.
//!
//! # Overview
//! An endpoint descriptor goes in, a typed, cancelable `Call<T>` comes out.
//! Between the two the core merges client defaults into the request, picks
//! the mock or the real transport, enforces certificate pins, unwraps the
//! response envelope, decodes JSON and classifies every failure into one
//! six-way `ApiError` taxonomy.
//!
//! ```no_run
//! use restcall_core::{ApiClient, Config, Observer, Request};
//! # #[derive(serde::Deserialize)] struct User { login: String }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(
//!     Config::new("https://api.github.com").error_message_key_path("message"),
//! )?;
//! let search = Request::get("/search/users")
//!     .with_parameter("q", "rust")
//!     .with_response_key_path("items");
//! let handle = client.request::<Vec<User>, _>(&search).observe(
//!     Observer::new()
//!         .on_success(|users: Vec<User>| println!("{} users", users.len()))
//!         .on_error(|err| eprintln!("{err}")),
//! );
//! # let _ = handle;
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - Background work runs on a tokio runtime; observer callbacks run on a
//!   serial `DeliveryContext`, the same for mock and real transports.
//! - Classification is a pure function of the fault, the body and the
//!   client's error-message key path. No process-wide state.
//! - A client is immutable after `ApiClient::new`; clones share the
//!   connection pool and the pin policy.

pub mod call;
pub mod classify;
pub mod client;
pub mod config;
pub mod delivery;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod keypath;
pub mod pinning;
pub mod transport;

mod mock;
mod real;

pub use call::{Call, CancelSignal, Cancelable, Disposable, Lifetime, Observer, Outcome};
pub use client::ApiClient;
pub use config::{Config, Settings};
pub use delivery::{DeliveryContext, DeliveryQueue};
pub use endpoint::{
    mime, Endpoint, Fixture, Headers, Mockable, MockResponse, MockStatus, MultiPart, Parameters,
    Request, Uploadable, Unwrappable,
};
pub use error::{ApiError, Cause, ConfigError, DecodeError};
pub use http::{HttpRequest, HttpResponse, Method};
pub use keypath::Nothing;
pub use pinning::{CertificatePin, CertificateSource};

//! Maps raw transport faults onto the `ApiError` taxonomy.
//!
//! # Design
//! `classify` is pure and total. The error-message key path is passed in on
//! every call by the owning client, so two clients with different key paths
//! never observe each other's settings.

use std::io;

use crate::error::{ApiError, Cause, ConnectivityKind, Fault};
use crate::keypath;

/// Classify `fault`, extracting the message from `body` at `message_key_path`
/// for status-bearing variants.
pub fn classify(fault: &Fault, body: Option<&[u8]>, message_key_path: Option<&str>) -> ApiError {
    match fault {
        Fault::Status { code } => {
            let code = *code;
            let message = match (message_key_path, body) {
                (Some(path), Some(body)) => keypath::error_message(body, path),
                _ => String::new(),
            };
            match code {
                401 | 403 => ApiError::Authentication { code, message },
                400..=499 => ApiError::Client { code, message },
                500..=599 => ApiError::Server { code, message },
                _ => ApiError::Uncategorized(Some(Cause::msg(format!(
                    "unexpected HTTP status {code}"
                )))),
            }
        }
        Fault::Connectivity { kind: ConnectivityKind::Offline, cause } => {
            ApiError::Network(Some(cause.clone()))
        }
        Fault::Connectivity { kind: ConnectivityKind::Tls, cause } => {
            ApiError::Ssl(Some(cause.clone()))
        }
        Fault::Synthesized(err @ (ApiError::Network(_) | ApiError::Ssl(_))) => err.clone(),
        Fault::Synthesized(other) => ApiError::Uncategorized(Some(Cause::new(other.clone()))),
        Fault::Other(cause) => ApiError::Uncategorized(Some(cause.clone())),
    }
}

/// Translate a `reqwest` failure into a `Fault`.
///
/// TLS failures are recognised anywhere in the source chain, including a
/// `rustls::Error` wrapped inside an `io::Error`. Timeouts are not treated as
/// connectivity loss.
pub fn fault_from_transport(err: reqwest::Error) -> Fault {
    if err.is_timeout() {
        return Fault::other(err);
    }
    if is_tls_failure(&err) {
        return Fault::Connectivity {
            kind: ConnectivityKind::Tls,
            cause: Cause::new(err),
        };
    }
    if err.is_connect() || is_offline(&err) {
        return Fault::Connectivity {
            kind: ConnectivityKind::Offline,
            cause: Cause::new(err),
        };
    }
    Fault::other(err)
}

fn sources<'a>(
    err: &'a (dyn std::error::Error + 'static),
) -> impl Iterator<Item = &'a (dyn std::error::Error + 'static)> {
    std::iter::successors(Some(err), |e| e.source())
}

fn is_tls_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    sources(err).any(|e| {
        if e.downcast_ref::<rustls::Error>().is_some() {
            return true;
        }
        e.downcast_ref::<io::Error>()
            .and_then(io::Error::get_ref)
            .is_some_and(|inner| is_tls_failure(inner))
    })
}

fn is_offline(err: &(dyn std::error::Error + 'static)) -> bool {
    sources(err).any(|e| {
        e.downcast_ref::<io::Error>().is_some_and(|io| {
            matches!(
                io.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::AddrNotAvailable
                    | io::ErrorKind::NetworkUnreachable
                    | io::ErrorKind::HostUnreachable
            )
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"message": "Bad credentials"}"#;

    fn status(code: u16) -> ApiError {
        classify(&Fault::Status { code }, Some(BODY), Some("message"))
    }

    #[test]
    fn auth_statuses() {
        for code in [401, 403] {
            match status(code) {
                ApiError::Authentication { code: c, message } => {
                    assert_eq!(c, code);
                    assert_eq!(message, "Bad credentials");
                }
                other => panic!("{code}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn client_and_server_ranges() {
        assert!(matches!(status(400), ApiError::Client { code: 400, .. }));
        assert!(matches!(status(404), ApiError::Client { code: 404, .. }));
        assert!(matches!(status(499), ApiError::Client { code: 499, .. }));
        assert!(matches!(status(500), ApiError::Server { code: 500, .. }));
        assert!(matches!(status(503), ApiError::Server { code: 503, .. }));
        assert!(matches!(status(599), ApiError::Server { code: 599, .. }));
    }

    #[test]
    fn other_statuses_are_uncategorized() {
        assert!(matches!(status(302), ApiError::Uncategorized(Some(_))));
        assert!(matches!(status(600), ApiError::Uncategorized(Some(_))));
    }

    #[test]
    fn message_needs_both_key_path_and_body() {
        let fault = Fault::Status { code: 404 };
        assert_eq!(classify(&fault, Some(BODY), None).message(), Some(""));
        assert_eq!(classify(&fault, None, Some("message")).message(), Some(""));
        assert_eq!(classify(&fault, Some(b"oops"), Some("message")).message(), Some(""));
    }

    #[test]
    fn connectivity_faults() {
        let offline = Fault::Connectivity {
            kind: ConnectivityKind::Offline,
            cause: Cause::msg("refused"),
        };
        let tls = Fault::Connectivity {
            kind: ConnectivityKind::Tls,
            cause: Cause::msg("unknown issuer"),
        };
        assert!(matches!(classify(&offline, None, None), ApiError::Network(Some(_))));
        assert!(matches!(classify(&tls, None, None), ApiError::Ssl(Some(_))));
    }

    #[test]
    fn synthesized_network_and_ssl_pass_through() {
        let net = classify(&Fault::Synthesized(ApiError::Network(None)), None, None);
        assert!(matches!(net, ApiError::Network(None)));

        let nested = ApiError::Ssl(Some(Cause::msg("pin mismatch")));
        let ssl = classify(&Fault::Synthesized(nested), None, None);
        assert_eq!(ssl.cause().unwrap().to_string(), "pin mismatch");
    }

    #[test]
    fn other_synthesized_errors_are_uncategorized() {
        let err = classify(&Fault::Synthesized(ApiError::Uncategorized(None)), None, None);
        assert!(matches!(err, ApiError::Uncategorized(Some(_))));
    }

    #[test]
    fn other_faults_are_uncategorized() {
        let err = classify(&Fault::Other(Cause::msg("decode")), None, None);
        assert_eq!(err.cause().unwrap().to_string(), "decode");
    }

    #[test]
    fn classification_is_deterministic() {
        let a = status(403);
        let b = status(403);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn tls_failure_found_inside_io_error() {
        let tls = rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer);
        let io = io::Error::new(io::ErrorKind::InvalidData, tls);
        assert!(is_tls_failure(&io));
        assert!(!is_offline(&io));
    }

    #[test]
    fn refused_connection_is_offline() {
        let io = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(is_offline(&io));
        assert!(!is_tls_failure(&io));
    }
}

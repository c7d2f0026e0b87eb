//! Real HTTP transport over `reqwest`.
//!
//! # Design
//! Encoding is decided from the snapshot alone: upload parts make a
//! multipart form, GET puts parameters in the query string, every other
//! method sends them as a JSON object. The log hook sees every exchange,
//! including the ones that never produced a response.

use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::classify::fault_from_transport;
use crate::client::Shared;
use crate::endpoint::{MultiPart, Parameters};
use crate::error::Fault;
use crate::http::{Encoding, HttpRequest, HttpResponse, Method};
use crate::transport::{Failure, Payload, Prepared};

pub(crate) async fn send(shared: &Shared, prepared: &Prepared) -> Result<Payload, Failure> {
    let encoding = encoding_for(prepared);
    tracing::debug!(method = %prepared.method, url = %prepared.url, ?encoding, "sending request");
    let started = Instant::now();
    let result = match build(shared, prepared, encoding) {
        Ok(builder) => exchange(builder).await,
        Err(err) => Err(err),
    };
    let elapsed = started.elapsed();

    if let Some(hook) = &shared.log_hook {
        let request = HttpRequest {
            method: prepared.method,
            url: prepared.url.clone(),
            headers: prepared
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            encoding,
        };
        hook(&request, &logged_response(&result, elapsed));
    }

    let exchanged = result.map_err(|err| Failure::new(fault_from_transport(err)))?;
    tracing::debug!(status = exchanged.status, ?elapsed, "response received");
    if (200..300).contains(&exchanged.status) {
        Ok(Payload::Body(exchanged.body))
    } else {
        Err(Failure {
            fault: Fault::Status {
                code: exchanged.status,
            },
            body: Some(exchanged.body),
        })
    }
}

/// Response side for the log hook; `status` is `None` when nothing came back.
fn logged_response(result: &Result<Exchanged, reqwest::Error>, elapsed: Duration) -> HttpResponse {
    match result {
        Ok(exchanged) => HttpResponse {
            status: Some(exchanged.status),
            headers: exchanged.headers.clone(),
            body: exchanged.body.clone(),
            elapsed,
            error: None,
        },
        Err(err) => HttpResponse {
            status: err.status().map(|s| s.as_u16()),
            headers: Vec::new(),
            body: Bytes::new(),
            elapsed,
            error: Some(err.to_string()),
        },
    }
}

fn encoding_for(prepared: &Prepared) -> Encoding {
    match (&prepared.parts, prepared.method) {
        (Some(_), _) => Encoding::Multipart,
        (None, Method::Get) => Encoding::Query,
        (None, _) => Encoding::Json,
    }
}

fn build(
    shared: &Shared,
    prepared: &Prepared,
    encoding: Encoding,
) -> Result<reqwest::RequestBuilder, reqwest::Error> {
    let mut builder = shared
        .http
        .request(prepared.method.into(), prepared.url.as_str());
    for (key, value) in &prepared.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    let builder = match encoding {
        Encoding::Query => builder.query(&query_pairs(&prepared.parameters)),
        Encoding::Json if prepared.parameters.is_empty() => builder,
        Encoding::Json => builder.json(&prepared.parameters),
        Encoding::Multipart => {
            let parts = prepared.parts.as_deref().unwrap_or_default();
            builder.multipart(form(parts, &prepared.parameters)?)
        }
    };
    Ok(builder)
}

struct Exchanged {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

async fn exchange(builder: reqwest::RequestBuilder) -> Result<Exchanged, reqwest::Error> {
    let response = builder.send().await?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    let body = response.bytes().await?;
    Ok(Exchanged {
        status,
        headers,
        body,
    })
}

fn form(parts: &[MultiPart], parameters: &Parameters) -> Result<Form, reqwest::Error> {
    let mut form = Form::new();
    for part in parts {
        let file = Part::bytes(part.data.to_vec())
            .file_name(part.filename.clone())
            .mime_str(&part.mime_type)?;
        form = form.part(part.name.clone(), file);
    }
    for (key, value) in parameters {
        form = form.text(key.clone(), field_text(value));
    }
    Ok(form)
}

/// Strings go in raw; everything else in its JSON spelling.
fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten parameters into query pairs. Arrays repeat `key[]`, objects nest
/// as `key[sub]`, null becomes an empty value.
fn query_pairs(parameters: &Parameters) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in parameters {
        flatten(key.clone(), value, &mut pairs);
    }
    pairs
}

fn flatten(key: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Array(items) => {
            let key = format!("{key}[]");
            for item in items {
                flatten(key.clone(), item, pairs);
            }
        }
        Value::Object(fields) => {
            for (sub, item) in fields {
                flatten(format!("{key}[{sub}]"), item, pairs);
            }
        }
        Value::Null => pairs.push((key, String::new())),
        scalar => pairs.push((key, field_text(scalar))),
    }
}

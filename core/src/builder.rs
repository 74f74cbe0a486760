//! Turns a `RequestDescriptor` into a `TransportRequest`.
//!
//! # Design
//! Building is deterministic and stateless: the same descriptor always yields
//! the same request. The URL is the literal concatenation of `base_url` and
//! `path` (no slash normalisation) and must parse as an absolute URL. The
//! payload is then applied according to its kind; when the payload touches
//! the query string or path placeholders, the URL is re-serialised in its
//! percent-encoded form.

use tracing::debug;
use url::{form_urlencoded, Url};

use crate::descriptor::{FieldLocation, RequestDescriptor, TaggedField, TaskPayload};
use crate::error::RequestBuildError;
use crate::http::TransportRequest;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const APPLICATION_JSON: &str = "application/json";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Build the request for one attempt.
pub fn build_request(descriptor: &RequestDescriptor) -> Result<TransportRequest, RequestBuildError> {
    let url = format!("{}{}", descriptor.base_url, descriptor.path);
    parse_url(&url)?;

    let mut request = TransportRequest {
        url,
        method: descriptor.method,
        headers: Vec::new(),
        body: None,
        timeout: descriptor.timeout,
    };
    for (name, value) in descriptor.headers.iter().flatten() {
        validate_header(name, value)?;
        request.set_header(name.clone(), value.clone());
    }

    apply_payload(&mut request, &descriptor.task)?;
    Ok(request)
}

/// Populate body, query and headers from `payload`.
///
/// A request whose URL does not resolve is left untouched.
pub fn apply_payload(
    request: &mut TransportRequest,
    payload: &TaskPayload,
) -> Result<(), RequestBuildError> {
    if Url::parse(&request.url).is_err() {
        debug!(url = %request.url, "url does not resolve, payload not applied");
        return Ok(());
    }

    match payload {
        TaskPayload::Plain => {}
        TaskPayload::RawBytes(bytes) => request.body = Some(bytes.clone()),
        TaskPayload::Json(value) => {
            request.body = Some(serde_json::to_vec(value)?);
            request.set_header(CONTENT_TYPE, APPLICATION_JSON);
        }
        TaskPayload::FormParameters(params) => {
            let mut form = form_urlencoded::Serializer::new(String::new());
            for (key, value) in params {
                form.append_pair(key, value);
            }
            request.body = Some(form.finish().into_bytes());
            request.set_header(CONTENT_TYPE, FORM_URLENCODED);
        }
        TaskPayload::QueryParameters(params) => {
            let pairs = params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
            append_query(request, pairs)?;
        }
        TaskPayload::PropertyDriven(fields) => apply_tagged_fields(request, fields)?,
    }
    Ok(())
}

fn apply_tagged_fields(
    request: &mut TransportRequest,
    fields: &[TaggedField],
) -> Result<(), RequestBuildError> {
    let mut body = serde_json::Map::new();
    let mut query = Vec::new();

    for field in fields {
        match field.location {
            FieldLocation::Path => {
                let value = scalar_text(field)?;
                if value == "." || value == ".." {
                    return Err(mismatch(field, "dot segments are not allowed".to_string()));
                }
                let placeholder = format!("{{{}}}", field.name);
                if !request.url.contains(&placeholder) {
                    return Err(mismatch(field, format!("path has no {placeholder} placeholder")));
                }
                request.url = request.url.replace(&placeholder, &encode_segment(&value));
            }
            FieldLocation::Query => query.push((field.name.as_str(), scalar_text(field)?)),
            FieldLocation::Header => {
                let value = scalar_text(field)?;
                validate_header(&field.name, &value)?;
                request.set_header(field.name.clone(), value);
            }
            FieldLocation::Body => {
                body.insert(field.name.clone(), field.value.clone());
            }
        }
    }

    if let Some(name) = unfilled_placeholder(&request.url) {
        return Err(RequestBuildError::PropertyTagMismatch {
            field: name.to_string(),
            location: FieldLocation::Path.as_str(),
            reason: format!("no path field fills {{{name}}}"),
        });
    }

    let resolved = parse_url(&request.url)?;
    request.url = resolved.into();
    append_query(request, query)?;

    if !body.is_empty() {
        request.body = Some(serde_json::to_vec(&serde_json::Value::Object(body))?);
        request.set_header(CONTENT_TYPE, APPLICATION_JSON);
    }
    Ok(())
}

/// Percent-encode `value` so it stays a single path segment.
fn encode_segment(value: &str) -> String {
    // Spaces come back as `+`; a literal `+` is already `%2B`.
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// First `{name}` left in the URL after substitution.
fn unfilled_placeholder(url: &str) -> Option<&str> {
    let start = url.find('{')?;
    let rest = &url[start + 1..];
    let end = rest.find('}')?;
    Some(&rest[..end])
}

fn append_query(
    request: &mut TransportRequest,
    pairs: Vec<(&str, String)>,
) -> Result<(), RequestBuildError> {
    if pairs.is_empty() {
        return Ok(());
    }
    let mut url = parse_url(&request.url)?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, &value);
        }
    }
    request.url = url.into();
    Ok(())
}

fn parse_url(url: &str) -> Result<Url, RequestBuildError> {
    Url::parse(url).map_err(|err| RequestBuildError::InvalidUrl {
        url: url.to_string(),
        reason: err.to_string(),
    })
}

/// Path, query and header fields only take scalar values.
fn scalar_text(field: &TaggedField) -> Result<String, RequestBuildError> {
    match &field.value {
        serde_json::Value::String(text) => Ok(text.clone()),
        serde_json::Value::Number(number) => Ok(number.to_string()),
        serde_json::Value::Bool(flag) => Ok(flag.to_string()),
        _ => Err(mismatch(field, "value must be a string, number or boolean".to_string())),
    }
}

fn mismatch(field: &TaggedField, reason: String) -> RequestBuildError {
    RequestBuildError::PropertyTagMismatch {
        field: field.name.clone(),
        location: field.location.as_str(),
        reason,
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), RequestBuildError> {
    let valid_name = !name.is_empty() && name.bytes().all(is_token_byte);
    let valid_value = !value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0);
    if valid_name && valid_value {
        Ok(())
    } else {
        Err(RequestBuildError::InvalidHeader {
            name: name.to_string(),
        })
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

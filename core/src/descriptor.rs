//! Request descriptors and task payloads.
//!
//! # Design
//! A `RequestDescriptor` is a plain value object: destination, method,
//! headers, timeout and a `TaskPayload` saying how the body or query is
//! populated. Code generators and hand-written call sites build it the same
//! way. The expected response type travels separately as the type parameter
//! of `Endpoint<R>`, so descriptors stay non-generic and cheap to clone.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use serde::Serialize;

use crate::error::RequestBuildError;
use crate::http::HttpMethod;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a request's body or query string is populated.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TaskPayload {
    #[default]
    Plain,
    RawBytes(Vec<u8>),
    Json(serde_json::Value),
    FormParameters(BTreeMap<String, String>),
    QueryParameters(BTreeMap<String, String>),
    PropertyDriven(Vec<TaggedField>),
}

impl TaskPayload {
    /// Encode any serializable value as a JSON payload.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, RequestBuildError> {
        Ok(TaskPayload::Json(serde_json::to_value(value)?))
    }

    pub fn form<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        TaskPayload::FormParameters(collect_pairs(pairs))
    }

    pub fn query<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        TaskPayload::QueryParameters(collect_pairs(pairs))
    }
}

fn collect_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> BTreeMap<String, String>
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// Where a property-driven field ends up in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldLocation {
    /// Replaces a `{name}` placeholder in the descriptor path.
    Path,
    Query,
    Header,
    /// Becomes a member of the JSON object body.
    Body,
}

impl FieldLocation {
    pub const fn as_str(self) -> &'static str {
        match self {
            FieldLocation::Path => "path",
            FieldLocation::Query => "query",
            FieldLocation::Header => "header",
            FieldLocation::Body => "body",
        }
    }
}

impl fmt::Display for FieldLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of a property-driven payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedField {
    pub name: String,
    pub location: FieldLocation,
    pub value: serde_json::Value,
}

impl TaggedField {
    pub fn new(
        name: impl Into<String>,
        location: FieldLocation,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            name: name.into(),
            location,
            value: value.into(),
        }
    }

    pub fn path(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::new(name, FieldLocation::Path, value)
    }

    pub fn query(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::new(name, FieldLocation::Query, value)
    }

    pub fn header(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::new(name, FieldLocation::Header, value)
    }

    pub fn body(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::new(name, FieldLocation::Body, value)
    }
}

/// Everything needed to build one API call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub base_url: String,
    pub path: String,
    pub method: HttpMethod,
    pub headers: Option<Vec<(String, String)>>,
    pub timeout: Duration,
    pub task: TaskPayload,
}

impl RequestDescriptor {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
            method,
            headers: None,
            timeout: DEFAULT_TIMEOUT,
            task: TaskPayload::Plain,
        }
    }

    pub fn get(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(base_url, path, HttpMethod::Get)
    }

    pub fn post(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(base_url, path, HttpMethod::Post)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn task(mut self, task: TaskPayload) -> Self {
        self.task = task;
        self
    }

    /// Declare the response type, turning the descriptor into an `Endpoint`.
    pub fn returning<R>(self) -> Endpoint<R> {
        Endpoint {
            descriptor: self,
            shape: PhantomData,
        }
    }
}

/// A descriptor paired with the type its response decodes into.
pub struct Endpoint<R> {
    descriptor: RequestDescriptor,
    shape: PhantomData<fn() -> R>,
}

impl<R> Endpoint<R> {
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    pub fn into_descriptor(self) -> RequestDescriptor {
        self.descriptor
    }
}

impl<R> Clone for Endpoint<R> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            shape: PhantomData,
        }
    }
}

impl<R> fmt::Debug for Endpoint<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("descriptor", &self.descriptor)
            .field("shape", &std::any::type_name::<R>())
            .finish()
    }
}

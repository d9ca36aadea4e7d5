// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deterministic fakes shared by unit tests.

use crate::clock::FixedClock;
use crate::cluster::Cluster;
use crate::config::OperatorConfig;
use crate::context::Context;
use crate::errors::{RegistryError, VerificationError};
use crate::registry::{DomainLookup, IpRegistrant, NameserverInfo, RegistryClient};
use crate::verification::{DnsResolver, HttpFetcher, HttpResponse};
use chrono::{DateTime, TimeZone, Utc};
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::{Client, Config, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};

/// Fixed instant used by most tests.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// A client pointed at a closed port; any request fails fast.
pub fn offline_client() -> Client {
    let config = Config::new("http://127.0.0.1:1".parse().unwrap());
    Client::try_from(config).unwrap()
}

/// DNS answers keyed by name.
#[derive(Default)]
pub struct FakeResolver {
    pub txt: HashMap<String, Result<Vec<String>, VerificationError>>,
    pub ns: HashMap<String, Vec<String>>,
}

#[async_trait::async_trait]
impl DnsResolver for FakeResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, VerificationError> {
        self.txt.get(name).cloned().unwrap_or_else(|| {
            Err(VerificationError::RecordNotFound {
                name: name.to_string(),
            })
        })
    }

    async fn lookup_ns(&self, name: &str) -> Result<Vec<String>, VerificationError> {
        self.ns
            .get(name)
            .cloned()
            .ok_or_else(|| VerificationError::RecordNotFound {
                name: name.to_string(),
            })
    }
}

/// HTTP answers keyed by URL.
#[derive(Default)]
pub struct FakeFetcher {
    pub responses: HashMap<String, Result<HttpResponse, VerificationError>>,
}

#[async_trait::async_trait]
impl HttpFetcher for FakeFetcher {
    async fn get(&self, url: &str) -> Result<HttpResponse, VerificationError> {
        self.responses.get(url).cloned().unwrap_or(Ok(HttpResponse {
            status: 404,
            body: String::new(),
        }))
    }
}

/// Registry returning one scripted answer and counting calls.
pub struct FakeRegistry {
    pub answer: Mutex<Result<DomainLookup, RegistryError>>,
    pub calls: AtomicUsize,
}

impl FakeRegistry {
    pub fn new(answer: Result<DomainLookup, RegistryError>) -> Self {
        Self {
            answer: Mutex::new(answer),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RegistryClient for FakeRegistry {
    async fn lookup_domain(&self, _name: &str) -> Result<DomainLookup, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.lock().unwrap().clone()
    }

    async fn lookup_nameserver(&self, name: &str) -> Result<NameserverInfo, RegistryError> {
        Err(RegistryError::NotFound {
            name: name.to_string(),
        })
    }

    async fn lookup_ip_registrant(&self, ip: IpAddr) -> Result<IpRegistrant, RegistryError> {
        Err(RegistryError::NotFound {
            name: ip.to_string(),
        })
    }
}

/// A context with offline clients, a fixed clock and empty fakes.
pub fn test_context(config: OperatorConfig) -> Context {
    Context {
        cluster: Cluster::new("", offline_client()),
        downstream: Cluster::new("", offline_client()),
        config: Arc::new(config),
        clock: Arc::new(FixedClock(test_now())),
        dns_resolver: Arc::new(FakeResolver::default()),
        http_fetcher: Arc::new(FakeFetcher::default()),
        registry: Arc::new(FakeRegistry::new(Err(RegistryError::NotFound {
            name: String::new(),
        }))),
    }
}

/// A context whose upstream and downstream clients both talk to `server`.
pub fn fake_api_context(config: OperatorConfig, server: &FakeApiServer) -> Context {
    Context {
        cluster: Cluster::new("", server.client()),
        downstream: Cluster::new("", server.client()),
        ..test_context(config)
    }
}

// ============================================================================
// In-memory API server
// ============================================================================

/// Where an object lives: API prefix (`/api/v1` or `/apis/<group>/<version>`),
/// namespace, plural and name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectPath {
    prefix: String,
    namespace: Option<String>,
    plural: String,
    name: String,
}

/// What a request path addresses.
enum Target {
    Collection {
        prefix: String,
        namespace: Option<String>,
        plural: String,
    },
    Object(ObjectPath),
    Status(ObjectPath),
}

fn parse_target(path: &str) -> Option<Target> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    let prefix_len = if segments.first() == Some(&"api") { 2 } else { 3 };
    if segments.len() <= prefix_len {
        return None;
    }
    let prefix = format!("/{}", segments[..prefix_len].join("/"));
    let mut rest = &segments[prefix_len..];
    let mut namespace = None;
    if rest.len() >= 3 && rest[0] == "namespaces" {
        namespace = Some(rest[1].to_string());
        rest = &rest[2..];
    }
    let object = |name: &str| ObjectPath {
        prefix: prefix.clone(),
        namespace: namespace.clone(),
        plural: rest[0].to_string(),
        name: name.to_string(),
    };
    match rest {
        [plural] => Some(Target::Collection {
            prefix: prefix.clone(),
            namespace: namespace.clone(),
            plural: (*plural).to_string(),
        }),
        [_, name] => Some(Target::Object(object(name))),
        [_, name, "status"] => Some(Target::Status(object(name))),
        _ => None,
    }
}

#[derive(Default)]
struct FakeApiState {
    objects: BTreeMap<ObjectPath, Value>,
    requests: Vec<String>,
    patches: Vec<Value>,
    resource_version: u64,
}

impl FakeApiState {
    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn handle(&mut self, method: &Method, path: &str, query: Option<&str>, body: &[u8]) -> (StatusCode, Value) {
        self.requests.push(format!("{method} {path}"));
        let body: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        if *method == Method::PATCH {
            self.patches.push(body.clone());
        }

        match (method, parse_target(path)) {
            (&Method::GET, Some(Target::Collection { prefix, namespace, plural })) => {
                let selector = label_selector(query);
                let items: Vec<Value> = self
                    .objects
                    .iter()
                    .filter(|(key, _)| {
                        key.prefix == prefix
                            && key.plural == plural
                            && (namespace.is_none() || key.namespace == namespace)
                    })
                    .map(|(_, obj)| obj)
                    .filter(|obj| selector.iter().all(|(k, v)| obj["metadata"]["labels"][k] == json!(v)))
                    .cloned()
                    .collect();
                (
                    StatusCode::OK,
                    json!({
                        "apiVersion": "v1",
                        "kind": "List",
                        "metadata": { "resourceVersion": self.resource_version.to_string() },
                        "items": items,
                    }),
                )
            }
            (&Method::GET, Some(Target::Object(key) | Target::Status(key))) => match self.objects.get(&key) {
                Some(obj) => (StatusCode::OK, obj.clone()),
                None => not_found(&key),
            },
            (&Method::POST, Some(Target::Collection { prefix, namespace, plural })) => {
                let mut obj = body;
                let name = obj["metadata"]["name"].as_str().unwrap_or_default().to_string();
                let key = ObjectPath {
                    prefix,
                    namespace: namespace.clone(),
                    plural,
                    name: name.clone(),
                };
                if self.objects.contains_key(&key) {
                    return status_response(StatusCode::CONFLICT, "AlreadyExists", &format!("{name} already exists"));
                }
                let version = self.next_version();
                let metadata = &mut obj["metadata"];
                metadata["resourceVersion"] = json!(version);
                if metadata["uid"].is_null() {
                    metadata["uid"] = json!(format!("uid-{name}"));
                }
                if let Some(namespace) = namespace {
                    metadata["namespace"] = json!(namespace);
                }
                self.objects.insert(key, obj.clone());
                (StatusCode::CREATED, obj)
            }
            (&Method::PUT, Some(Target::Object(key))) => {
                let Some(stored) = self.objects.get(&key).cloned() else {
                    return not_found(&key);
                };
                if !versions_match(&body, &stored) {
                    return status_response(StatusCode::CONFLICT, "Conflict", "the object has been modified");
                }
                let mut obj = body;
                obj["status"] = stored["status"].clone();
                if obj["status"].is_null() {
                    if let Some(map) = obj.as_object_mut() {
                        map.remove("status");
                    }
                }
                obj["metadata"]["resourceVersion"] = json!(self.next_version());
                self.objects.insert(key, obj.clone());
                (StatusCode::OK, obj)
            }
            (&Method::PATCH, Some(Target::Object(key))) => self.patch(key, body, false),
            (&Method::PATCH, Some(Target::Status(key))) => self.patch(key, body, true),
            (&Method::DELETE, Some(Target::Object(key))) => match self.objects.remove(&key) {
                Some(obj) => (StatusCode::OK, obj),
                None => not_found(&key),
            },
            _ => status_response(StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed", path),
        }
    }
}

impl FakeApiState {
    fn patch(&mut self, key: ObjectPath, mut patch: Value, status_only: bool) -> (StatusCode, Value) {
        let Some(mut obj) = self.objects.get(&key).cloned() else {
            return not_found(&key);
        };
        if !versions_match(&patch, &obj) {
            return status_response(StatusCode::CONFLICT, "Conflict", "the object has been modified");
        }
        if let Some(metadata) = patch.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.remove("resourceVersion");
        }
        if status_only {
            if let Some(status) = patch.get("status") {
                merge_patch(&mut obj["status"], status);
            }
        } else {
            if let Some(map) = patch.as_object_mut() {
                map.remove("status");
            }
            merge_patch(&mut obj, &patch);
        }
        obj["metadata"]["resourceVersion"] = json!(self.next_version());
        self.objects.insert(key, obj.clone());
        (StatusCode::OK, obj)
    }
}

fn versions_match(body: &Value, stored: &Value) -> bool {
    match body["metadata"]["resourceVersion"].as_str() {
        Some(version) => stored["metadata"]["resourceVersion"].as_str() == Some(version),
        None => true,
    }
}

/// Equality terms of a `labelSelector` query parameter.
fn label_selector(query: Option<&str>) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .filter(|(k, _)| k == "labelSelector")
        .flat_map(|(_, selector)| {
            selector
                .split(',')
                .filter_map(|term| {
                    let (k, v) = term.split_once('=')?;
                    Some((k.to_string(), v.trim_start_matches('=').to_string()))
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// RFC 7386 JSON merge patch.
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let map = target.as_object_mut().expect("target is an object");
    for (key, value) in fields {
        if value.is_null() {
            map.remove(key);
        } else {
            merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
        }
    }
}

fn not_found(key: &ObjectPath) -> (StatusCode, Value) {
    status_response(
        StatusCode::NOT_FOUND,
        "NotFound",
        &format!("{} \"{}\" not found", key.plural, key.name),
    )
}

fn status_response(code: StatusCode, reason: &str, message: &str) -> (StatusCode, Value) {
    (
        code,
        json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": code.as_u16(),
        }),
    )
}

/// In-memory stand-in for the Kubernetes API server.
///
/// Objects are stored by path. Get, list (equality label selectors), create,
/// replace, merge patch (including `/status`) and delete are supported, with
/// `resourceVersion` checks on writes. Every request is recorded as
/// `"METHOD /path"`.
#[derive(Clone, Default)]
pub struct FakeApiServer {
    state: Arc<Mutex<FakeApiState>>,
}

impl FakeApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> Client {
        Client::new(self.clone(), "default")
    }

    fn object_path<K: Resource<DynamicType = ()>>(namespace: Option<&str>, name: &str) -> ObjectPath {
        match parse_target(&format!("{}/{name}", K::url_path(&(), namespace))) {
            Some(Target::Object(key)) => key,
            _ => panic!("{} is not an object path", K::url_path(&(), namespace)),
        }
    }

    /// Store `obj` as it would be stored after admission.
    pub fn insert<K: Resource<DynamicType = ()> + Serialize>(&self, obj: &K) {
        let mut value = serde_json::to_value(obj).unwrap();
        value["apiVersion"] = json!(K::api_version(&()));
        value["kind"] = json!(K::kind(&()));
        self.insert_value::<K>(obj.namespace().as_deref(), &obj.name_any(), value);
    }

    /// Store a raw object, e.g. one carrying server-side defaults.
    pub fn insert_value<K: Resource<DynamicType = ()>>(&self, namespace: Option<&str>, name: &str, mut value: Value) {
        let mut state = self.state.lock().unwrap();
        if value["metadata"]["resourceVersion"].is_null() {
            value["metadata"]["resourceVersion"] = json!(state.next_version());
        }
        state.objects.insert(Self::object_path::<K>(namespace, name), value);
    }

    pub fn get<K: Resource<DynamicType = ()> + DeserializeOwned>(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&Self::object_path::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    pub fn contains<K: Resource<DynamicType = ()>>(&self, namespace: Option<&str>, name: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.objects.contains_key(&Self::object_path::<K>(namespace, name))
    }

    /// Every request seen so far, as `"METHOD /path"`.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Bodies of every PATCH request, in order.
    pub fn patch_bodies(&self) -> Vec<Value> {
        self.state.lock().unwrap().patches.clone()
    }

    /// Requests other than reads.
    pub fn writes(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| !r.starts_with("GET "))
            .collect()
    }

    pub fn clear_requests(&self) {
        let mut state = self.state.lock().unwrap();
        state.requests.clear();
        state.patches.clear();
    }
}

impl tower::Service<Request<Body>> for FakeApiServer {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let state = self.state.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let bytes = body.collect().await.map(|b| b.to_bytes()).unwrap_or_default();
            let (code, value) = state.lock().unwrap().handle(
                &parts.method,
                parts.uri.path(),
                parts.uri.query(),
                &bytes,
            );
            let response = Response::builder()
                .status(code)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&value).unwrap()))
                .unwrap();
            Ok(response)
        })
    }
}

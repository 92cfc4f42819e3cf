use crate::error::OrderServiceError;
use crate::fixtures;
use crate::order::Order;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use http::Method;
use log::debug;
use serde::Serialize;
#[cfg(feature = "trace")]
use tracing::instrument;

pub const SERVICE_NAME: &str = "order-service";

const ORDERS: &str = "/orders";
const ORDERS_SLASH: &str = "/orders/";

#[derive(Debug)]
pub struct RouteRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    /// Decoded JSON body; only ever read for `POST /orders`.
    pub payload: Option<&'a Order>,
}

impl<'a> RouteRequest<'a> {
    pub fn new(method: &'a str, path: &'a str) -> Self {
        Self {
            method,
            path,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Option<&'a Order>) -> Self {
        self.payload = payload;
        self
    }
}

type Handler = fn(&RouteRequest) -> Result<Bytes, OrderServiceError>;

struct Rule {
    name: &'static str,
    matches: fn(&RouteRequest) -> bool,
    handle: Handler,
}

// Evaluated top to bottom, first match wins. The collection rule must stay ahead
// of the single-order rule.
const RULES: &[Rule] = &[
    Rule {
        name: "create_order",
        matches: is_create,
        handle: create_order,
    },
    Rule {
        name: "health",
        matches: is_health,
        handle: health,
    },
    Rule {
        name: "list_orders",
        matches: is_list,
        handle: list_orders,
    },
    Rule {
        name: "get_order",
        matches: is_get,
        handle: get_order,
    },
];

#[derive(Serialize)]
struct Health<'a> {
    status: &'a str,
    service: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct Banner<'a> {
    message: &'a str,
    service: &'a str,
}

#[cfg_attr(feature = "trace", instrument(level = "trace", skip_all))]
pub fn route(request: &RouteRequest) -> Result<Bytes, OrderServiceError> {
    for rule in RULES {
        if (rule.matches)(request) {
            debug!("{} {} -> {}", request.method, request.path, rule.name);
            return (rule.handle)(request);
        }
    }
    debug!("{} {} -> fallback", request.method, request.path);
    fallback()
}

fn is_health(request: &RouteRequest) -> bool {
    request.path == "/health"
}

fn is_list(request: &RouteRequest) -> bool {
    is_collection(request.path)
}

fn is_get(request: &RouteRequest) -> bool {
    order_id(request.path).is_some()
}

fn is_collection(path: &str) -> bool {
    path == ORDERS || path == ORDERS_SLASH
}

fn is_create(request: &RouteRequest) -> bool {
    request.method == Method::POST.as_str() && is_collection(request.path) && request.payload.is_some()
}

/// Id of `/orders/<id>`. An empty or non-integer suffix is no match.
fn order_id(path: &str) -> Option<i64> {
    let suffix = path.strip_prefix(ORDERS_SLASH)?;
    if suffix.is_empty() {
        return None;
    }
    suffix.parse().ok()
}

fn to_body<T: Serialize>(value: &T) -> Result<Bytes, OrderServiceError> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

fn health(_: &RouteRequest) -> Result<Bytes, OrderServiceError> {
    to_body(&Health {
        status: "healthy",
        service: SERVICE_NAME,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    })
}

fn list_orders(_: &RouteRequest) -> Result<Bytes, OrderServiceError> {
    to_body(&fixtures::all())
}

fn get_order(request: &RouteRequest) -> Result<Bytes, OrderServiceError> {
    match order_id(request.path) {
        Some(id) => to_body(&fixtures::synthesize(id)),
        None => fallback(),
    }
}

fn create_order(request: &RouteRequest) -> Result<Bytes, OrderServiceError> {
    match request.payload {
        Some(payload) => to_body(&fixtures::create(payload.clone())),
        None => list_orders(request),
    }
}

fn fallback() -> Result<Bytes, OrderServiceError> {
    to_body(&Banner {
        message: "Order Service is running",
        service: SERVICE_NAME,
    })
}

//! Trace-context propagation over heterogeneous carriers.
//!
//! Inbound HTTP headers, the proxy filter's header list and plain string maps
//! all implement [`Carrier`]; extraction and injection only depend on that
//! trait, so a trace started behind one carrier kind continues behind any other.

use std::collections::HashMap;

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use opentelemetry::propagation::{Extractor, Injector, TextMapCompositePropagator};
use opentelemetry::{global, Context};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use tracing::debug;

use crate::router::HeaderList;

/// W3C trace context plus baggage.
pub fn default_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}

/// Installs [`default_propagator`] process-wide.
pub fn install_propagator() {
    global::set_text_map_propagator(default_propagator());
}

/// Key/value header-like structure that trace context travels in.
pub trait Carrier {
    /// Value stored under `key`, `None` when absent.
    fn get(&self, key: &str) -> Option<&str>;

    /// Stores `value` under `key`. Extraction-only carriers ignore it.
    fn set(&mut self, key: &str, value: String);

    /// Every key currently present.
    fn keys(&self) -> Vec<&str>;
}

/// Mutable inbound/outbound HTTP headers.
#[derive(Debug)]
pub struct HttpHeaderCarrier<'a>(pub &'a mut HeaderMap);

impl Carrier for HttpHeaderCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn set(&mut self, key: &str, value: String) {
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                debug!("invalid header name for trace injection: {e}");
                return;
            }
        };
        match HeaderValue::try_from(value) {
            Ok(value) => {
                self.0.insert(name, value);
            }
            Err(e) => debug!("invalid header value for trace injection: {e}"),
        }
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Read-only view over the proxy filter's header list. Extraction only.
#[derive(Debug, Clone, Copy)]
pub struct ProxyHeaderCarrier<'a>(pub Option<&'a HeaderList>);

impl Carrier for ProxyHeaderCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.and_then(|headers| headers.get(key))
    }

    fn set(&mut self, _key: &str, _value: String) {}

    fn keys(&self) -> Vec<&str> {
        self.0.map(HeaderList::keys).unwrap_or_default()
    }
}

/// Plain string map used for outbound propagation to downstream services.
#[derive(Debug)]
pub struct MapCarrier<'a>(pub &'a mut HashMap<String, String>);

impl Carrier for MapCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

struct ExtractAdapter<'a, C: ?Sized>(&'a C);

impl<C: Carrier + ?Sized> Extractor for ExtractAdapter<'_, C> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys()
    }
}

struct InjectAdapter<'a, C: ?Sized>(&'a mut C);

impl<C: Carrier + ?Sized> Injector for InjectAdapter<'_, C> {
    fn set(&mut self, key: &str, value: String) {
        self.0.set(key, value);
    }
}

/// Reads trace context and baggage out of `carrier`, layered on `parent`.
pub fn extract_context<C: Carrier + ?Sized>(parent: &Context, carrier: &C) -> Context {
    global::get_text_map_propagator(|propagator| {
        propagator.extract_with_context(parent, &ExtractAdapter(carrier))
    })
}

/// Writes the span context and baggage of `cx` into `carrier`.
pub fn inject_context<C: Carrier + ?Sized>(cx: &Context, carrier: &mut C) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, &mut InjectAdapter(carrier))
    });
}

/// Injects `cx` into a fresh map for attachment to an outbound call.
pub fn inject_into_map(cx: &Context) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    inject_context(cx, &mut MapCarrier(&mut headers));
    headers
}

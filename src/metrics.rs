// Prometheus metrics for webhook dispatch
//
// Counters only:
// - Dispatch outcomes (delivered, or the error kind)
// - Token endpoint requests
// - Token cache hits and misses

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, Registry, TextEncoder};
use std::sync::Arc;

use crate::webhooks::error::DispatchError;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref WEBHOOK_DISPATCH_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("webhook_dispatch_total", "Total number of webhook dispatch calls"),
        &["outcome"]
    ).expect("Failed to create webhook dispatch metric");

    pub static ref OAUTH_TOKEN_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("oauth_token_requests_total", "Total number of OAuth2 token endpoint requests"),
        &["outcome"]
    ).expect("Failed to create OAuth token requests metric");

    pub static ref TOKEN_CACHE_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("token_cache_lookups_total", "Total number of token cache lookups"),
        &["result"]
    ).expect("Failed to create token cache lookups metric");
}

/// Register all collectors; safe to call more than once
pub fn init() -> prometheus::Result<()> {
    register(Box::new(WEBHOOK_DISPATCH_TOTAL.clone()))?;
    register(Box::new(OAUTH_TOKEN_REQUESTS_TOTAL.clone()))?;
    register(Box::new(TOKEN_CACHE_LOOKUPS_TOTAL.clone()))?;
    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> prometheus::Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Count a finished dispatch call
pub fn record_dispatch<T>(result: &Result<T, DispatchError>) {
    let outcome = match result {
        Ok(_) => "delivered",
        Err(e) => e.kind(),
    };
    WEBHOOK_DISPATCH_TOTAL.with_label_values(&[outcome]).inc();
}

/// Count a token endpoint exchange
pub fn record_token_request<T>(result: &Result<T, DispatchError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    OAUTH_TOKEN_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    TOKEN_CACHE_LOOKUPS_TOTAL.with_label_values(&[result]).inc();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}

//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Invocation outcomes and latency per channel and method
//! - Published events by type
//! - Nonce rejections
//! - Channel health

use crate::events::ChannelEvent;

use anyhow::{Context, Result};
use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{error, info};

lazy_static! {
    // Invocation metrics
    pub static ref INVOCATIONS: CounterVec = register_counter_vec!(
        "channel_transfer_invocations_total",
        "Total invocations by channel, method and outcome",
        &["channel", "method", "outcome"]
    ).unwrap();

    pub static ref INVOCATION_LATENCY: HistogramVec = register_histogram_vec!(
        "channel_transfer_invocation_latency_seconds",
        "Invocation processing latency",
        &["channel", "method"],
        vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5]
    ).unwrap();

    // Event metrics
    pub static ref EVENTS_PUBLISHED: CounterVec = register_counter_vec!(
        "channel_transfer_events_published_total",
        "Total events published by type",
        &["channel", "event_type"]
    ).unwrap();

    // Replay protection
    pub static ref NONCE_REJECTIONS: CounterVec = register_counter_vec!(
        "channel_transfer_nonce_rejections_total",
        "Total invocations rejected by nonce admission",
        &["channel"]
    ).unwrap();

    // Health metrics
    pub static ref CHANNEL_HEALTHY: GaugeVec = register_gauge_vec!(
        "channel_transfer_channel_healthy",
        "Channel health status (1=healthy, 0=unhealthy)",
        &["channel"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub fn router() -> Router {
        Router::new().route("/metrics", get(metrics_handler))
    }

    pub async fn run(&self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind metrics server on {}", addr))?;
        axum::serve(listener, Self::router())
            .await
            .context("Metrics server failed")?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_invocation(channel: &str, method: &str, outcome: &str) {
    INVOCATIONS
        .with_label_values(&[channel, method, outcome])
        .inc();
}

pub fn record_invocation_latency(channel: &str, method: &str, latency_secs: f64) {
    INVOCATION_LATENCY
        .with_label_values(&[channel, method])
        .observe(latency_secs);
}

pub fn record_event(channel: &str, event: &ChannelEvent) {
    EVENTS_PUBLISHED
        .with_label_values(&[channel, event.name()])
        .inc();
}

pub fn record_nonce_rejection(channel: &str) {
    NONCE_REJECTIONS.with_label_values(&[channel]).inc();
}

pub fn record_channel_health(channel: &str, healthy: bool) {
    CHANNEL_HEALTHY
        .with_label_values(&[channel])
        .set(if healthy { 1.0 } else { 0.0 });
}

//! Prometheus metrics for the transaction stream
//!
//! Counters are updated by the dispatcher, the collectors and the stream
//! listener. Applications that expose metrics call `register_metrics` once and
//! serve `encode_metrics`.

use lazy_static::lazy_static;
use prometheus::{
    histogram_opts, opts, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Requests handed to a dispatcher
    ///
    /// Labels:
    /// - mode: batched or immediate
    pub static ref REQUESTS_DISPATCHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!(
            "txstream_requests_dispatched_total",
            "Total number of requests handed to a dispatcher"
        ),
        &["mode"]
    )
    .unwrap();

    /// Client frames written to duplex channels
    pub static ref FRAMES_WRITTEN_TOTAL: IntCounter = register_int_counter!(
        opts!(
            "txstream_frames_written_total",
            "Total number of client frames written"
        )
    )
    .unwrap();

    /// Requests per written frame
    pub static ref BATCH_SIZE: Histogram = register_histogram!(
        histogram_opts!(
            "txstream_batch_size",
            "Number of requests per client frame",
            vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0]
        )
    )
    .unwrap();

    /// Bidirectional streams currently open
    pub static ref OPEN_STREAMS: IntGauge = register_int_gauge!(
        opts!(
            "txstream_open_streams",
            "Number of open bidirectional transaction streams"
        )
    )
    .unwrap();

    /// Stream closures by reason
    ///
    /// Labels:
    /// - reason: closed, channel_error, protocol_error
    pub static ref STREAM_CLOSURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!(
            "txstream_stream_closures_total",
            "Total number of closed transaction streams by reason"
        ),
        &["reason"]
    )
    .unwrap();

    /// Protocol violations observed on inbound frames
    ///
    /// Labels:
    /// - kind: unknown_request_id, invalid_request_id, illegal_server_message
    pub static ref PROTOCOL_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!(
            "txstream_protocol_errors_total",
            "Total number of protocol violations by kind"
        ),
        &["kind"]
    )
    .unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() {
    REGISTRY
        .register(Box::new(REQUESTS_DISPATCHED_TOTAL.clone()))
        .expect("Failed to register REQUESTS_DISPATCHED_TOTAL");

    REGISTRY
        .register(Box::new(FRAMES_WRITTEN_TOTAL.clone()))
        .expect("Failed to register FRAMES_WRITTEN_TOTAL");

    REGISTRY
        .register(Box::new(BATCH_SIZE.clone()))
        .expect("Failed to register BATCH_SIZE");

    REGISTRY
        .register(Box::new(OPEN_STREAMS.clone()))
        .expect("Failed to register OPEN_STREAMS");

    REGISTRY
        .register(Box::new(STREAM_CLOSURES_TOTAL.clone()))
        .expect("Failed to register STREAM_CLOSURES_TOTAL");

    REGISTRY
        .register(Box::new(PROTOCOL_ERRORS_TOTAL.clone()))
        .expect("Failed to register PROTOCOL_ERRORS_TOTAL");
}

/// Encode metrics in Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

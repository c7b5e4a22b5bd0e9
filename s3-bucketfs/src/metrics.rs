use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use bucketfs::MetricsCollector;

lazy_static! {
    static ref REGISTRY: Registry =
        Registry::new_custom(Some("bucketfs".to_string()), None).unwrap_or_default();
}

/// Prometheus-backed collector for filesystem activity.
///
/// Metrics live in a process-wide registry, so only one collector can be
/// created per process.
#[derive(Debug, Clone)]
pub struct PrometheusMetrics {
    open_channels: IntGauge,
    channels_total: IntCounter,
    transferred_bytes: IntCounterVec,
    remote_calls: IntCounterVec,
    multipart_uploads: IntCounter,
}

impl PrometheusMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let open_channels = IntGauge::new("open_channels", "Channels currently open")?;
        let channels_total = IntCounter::new("channels_total", "Channels opened in total")?;
        let transferred_bytes = IntCounterVec::new(
            Opts::new(
                "transferred_bytes_total",
                "Bytes moved between the store and staging files",
            ),
            &["direction"],
        )?;
        let remote_calls = IntCounterVec::new(
            Opts::new("remote_calls_total", "Calls made to the object store"),
            &["operation"],
        )?;
        let multipart_uploads =
            IntCounter::new("multipart_uploads_total", "Uploads sent as multipart")?;

        REGISTRY.register(Box::new(open_channels.clone()))?;
        REGISTRY.register(Box::new(channels_total.clone()))?;
        REGISTRY.register(Box::new(transferred_bytes.clone()))?;
        REGISTRY.register(Box::new(remote_calls.clone()))?;
        REGISTRY.register(Box::new(multipart_uploads.clone()))?;

        Ok(Self {
            open_channels,
            channels_total,
            transferred_bytes,
            remote_calls,
            multipart_uploads,
        })
    }
}

impl MetricsCollector for PrometheusMetrics {
    fn channel_opened(&self) {
        self.open_channels.inc();
        self.channels_total.inc();
    }

    fn channel_closed(&self) {
        self.open_channels.dec();
    }

    fn bytes_hydrated(&self, amount: u64) {
        self.transferred_bytes
            .with_label_values(&["download"])
            .inc_by(amount);
    }

    fn bytes_flushed(&self, amount: u64) {
        self.transferred_bytes
            .with_label_values(&["upload"])
            .inc_by(amount);
    }

    fn remote_call(&self, operation: &'static str) {
        self.remote_calls.with_label_values(&[operation]).inc();
    }

    fn multipart_upload(&self) {
        self.multipart_uploads.inc();
    }
}

/// Text exposition of every registered metric.
pub fn render() -> Result<String> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

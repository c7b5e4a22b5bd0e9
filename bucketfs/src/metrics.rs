use std::sync::Arc;

/// Shared metrics collector interface
///
/// This is a trait object that allows applications to plug in their own
/// metrics implementations (Prometheus, StatsD, etc.)
pub trait MetricsCollector: Send + Sync {
    fn channel_opened(&self);
    fn channel_closed(&self);
    fn bytes_hydrated(&self, amount: u64);
    fn bytes_flushed(&self, amount: u64);
    fn remote_call(&self, operation: &'static str);
    fn multipart_upload(&self);
}

/// No-op metrics collector (default)
#[derive(Debug, Clone, Default)]
pub struct NoOpMetrics;

impl MetricsCollector for NoOpMetrics {
    fn channel_opened(&self) {}
    fn channel_closed(&self) {}
    fn bytes_hydrated(&self, _amount: u64) {}
    fn bytes_flushed(&self, _amount: u64) {}
    fn remote_call(&self, _operation: &'static str) {}
    fn multipart_upload(&self) {}
}

/// Shared reference to metrics collector
#[derive(Clone)]
pub struct SharedMetrics(Arc<dyn MetricsCollector>);

impl SharedMetrics {
    pub fn new(collector: Arc<dyn MetricsCollector>) -> Self {
        Self(collector)
    }

    pub fn channel_opened(&self) {
        self.0.channel_opened();
    }

    pub fn channel_closed(&self) {
        self.0.channel_closed();
    }

    pub fn bytes_hydrated(&self, amount: u64) {
        self.0.bytes_hydrated(amount);
    }

    pub fn bytes_flushed(&self, amount: u64) {
        self.0.bytes_flushed(amount);
    }

    pub fn remote_call(&self, operation: &'static str) {
        self.0.remote_call(operation);
    }

    pub fn multipart_upload(&self) {
        self.0.multipart_upload();
    }
}

impl Default for SharedMetrics {
    fn default() -> Self {
        Self(Arc::new(NoOpMetrics))
    }
}

impl std::fmt::Debug for SharedMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedMetrics")
    }
}

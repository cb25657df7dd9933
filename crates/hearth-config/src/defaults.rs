use crate::logging::LogFormat;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default number of workers executing binding side effects.
///
/// A single worker serialises handler construction and disposal.
pub const DEFAULT_BINDING_WORKERS: usize = 1;

/// Default namespace of the device status storage.
pub const DEFAULT_STATUS_STORAGE: &str = "device_status_storage";

/// Default log filter expression used by the daemon.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default binding worker count.
#[must_use]
pub fn default_binding_workers() -> usize {
    DEFAULT_BINDING_WORKERS
}

/// Owned status storage namespace.
#[must_use]
pub fn default_status_storage() -> String {
    DEFAULT_STATUS_STORAGE.to_owned()
}

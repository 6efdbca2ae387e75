use std::{path::Path, time::Duration};

use crate::{
    domain::SourceHandle, errors::RemoteError, ports::ProgressObserver, retry::FailureClass,
    Error, Result,
};

/// Initialize the tracing subscriber for the exporter.
///
/// Default: info for our crates, warn for everything else. Can be overridden with
/// `RUST_LOG`.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,mex=info,mex_core=info,mex_telegram=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::External(format!("failed to init logging: {e}")))
}

/// [`ProgressObserver`] that reports pipeline progress as tracing events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn page_fetched(&self, source: &SourceHandle, offset: u64, returned: usize) {
        tracing::debug!(%source, offset, returned, "fetched page");
    }

    fn retry_scheduled(
        &self,
        operation: &str,
        attempt: u32,
        class: FailureClass,
        delay: Duration,
        error: &RemoteError,
    ) {
        tracing::warn!(
            operation,
            attempt = attempt + 1,
            ?class,
            delay_secs = delay.as_secs_f64(),
            %error,
            "remote call failed, backing off"
        );
    }

    fn duplicates_dropped(&self, source: &SourceHandle, count: usize) {
        tracing::warn!(%source, count, "dropped members repeated across pages");
    }

    fn name_fallback(&self, source: &SourceHandle, error: &RemoteError) {
        tracing::warn!(%source, %error, "could not resolve group name, using fallback");
    }

    fn exported(&self, source: &SourceHandle, path: &Path, count: usize) {
        tracing::info!(%source, count, path = %path.display(), "exported members");
    }

    fn export_failed(&self, source: &SourceHandle, error: &Error) {
        tracing::error!(%source, %error, "export failed");
    }
}

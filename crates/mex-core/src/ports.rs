use std::{path::Path, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{PageRequest, PageResult, SourceHandle},
    errors::RemoteError,
    retry::FailureClass,
    Error, Result,
};

/// Hexagonal port for the system we export members from.
///
/// Implementations should be idempotent for identical offsets. The core never
/// calls a source concurrently.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_page(&self, req: &PageRequest) -> std::result::Result<PageResult, RemoteError>;

    async fn resolve_display_name(
        &self,
        source: &SourceHandle,
    ) -> std::result::Result<String, RemoteError>;
}

/// Timed waits between retries, injectable so tests don't sleep for real.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration` or until `cancel` fires, whichever comes first.
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()>;
}

/// Production sleeper backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Progress events emitted by the retrieval/export pipeline.
///
/// Passed explicitly to the components that report progress; every method has a
/// no-op default so observers only implement what they care about.
pub trait ProgressObserver: Send + Sync {
    fn page_fetched(&self, _source: &SourceHandle, _offset: u64, _returned: usize) {}

    fn retry_scheduled(
        &self,
        _operation: &str,
        _attempt: u32,
        _class: FailureClass,
        _delay: Duration,
        _error: &RemoteError,
    ) {
    }

    fn duplicates_dropped(&self, _source: &SourceHandle, _count: usize) {}

    fn name_fallback(&self, _source: &SourceHandle, _error: &RemoteError) {}

    fn exported(&self, _source: &SourceHandle, _path: &Path, _count: usize) {}

    fn export_failed(&self, _source: &SourceHandle, _error: &Error) {}
}

/// Observer that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

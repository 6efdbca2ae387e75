//! Offset-cursor pagination over a [`RemoteSource`].

use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{Member, PageRequest, PageResult, SourceHandle, MAX_PAGE_SIZE},
    ports::{NoopObserver, ProgressObserver, RemoteSource},
    retry::Retrier,
    Error, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaginationConfig {
    pub page_size: u32,
    /// Hard ceiling on requests per retrieval, for sources that never signal the end.
    pub max_pages: u32,
    pub deadline: Option<Duration>,
    /// Drop members whose id was already seen on an earlier page.
    pub dedupe: bool,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            max_pages: 10_000,
            deadline: None,
            dedupe: true,
        }
    }
}

/// Drives the retrier page by page until the source is exhausted.
#[derive(Clone)]
pub struct Paginator {
    cfg: PaginationConfig,
    retrier: Retrier,
    observer: Arc<dyn ProgressObserver>,
}

impl Paginator {
    pub fn new(cfg: PaginationConfig, retrier: Retrier) -> Self {
        Self {
            cfg,
            retrier,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Fetch every member of `handle`, in source order.
    ///
    /// A page that still fails after retries aborts the whole retrieval; nothing
    /// fetched so far is returned.
    pub async fn fetch_all(
        &self,
        source: &dyn RemoteSource,
        handle: &SourceHandle,
        cancel: &CancellationToken,
    ) -> Result<Vec<Member>> {
        let started = Instant::now();
        let mut offset = 0u64;
        let mut pages = 0u32;
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut dropped = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if pages >= self.cfg.max_pages {
                return Err(Error::PageLimitExceeded { pages });
            }
            if let Some(deadline) = self.cfg.deadline {
                let elapsed = started.elapsed();
                if elapsed >= deadline {
                    return Err(Error::DeadlineExceeded { elapsed });
                }
            }

            let req = PageRequest::new(handle.clone(), offset, self.cfg.page_size);
            let operation = format!("fetch members of {handle} at offset {offset}");
            let page = self
                .retrier
                .call(&operation, cancel, || source.fetch_page(&req))
                .await?;
            pages += 1;

            let returned = page.returned();
            self.observer.page_fetched(handle, offset, returned);
            offset += returned as u64;
            let done = is_last_page(&page, req.limit, offset);

            for member in page.records {
                if self.cfg.dedupe && !seen.insert(member.id) {
                    dropped += 1;
                    continue;
                }
                out.push(member);
            }

            if done {
                break;
            }
        }

        if dropped > 0 {
            self.observer.duplicates_dropped(handle, dropped);
        }
        Ok(out)
    }
}

/// End-of-stream decision. Explicit hints from the source win; the short-page
/// heuristic is only used when the source gives none.
fn is_last_page(page: &PageResult, requested: u32, offset_after: u64) -> bool {
    if page.returned() == 0 {
        return true;
    }
    if let Some(has_more) = page.has_more {
        return !has_more;
    }
    if let Some(total) = page.total {
        return offset_after >= total;
    }
    page.returned() < requested as usize
}

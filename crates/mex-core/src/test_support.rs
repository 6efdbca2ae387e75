//! Fakes shared by the unit tests of this crate.

use std::{
    collections::VecDeque,
    path::Path,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{Member, PageRequest, PageResult, SourceHandle},
    errors::RemoteError,
    ports::{ProgressObserver, RemoteSource, Sleeper},
    Error, Result,
};

pub(crate) fn members(ids: impl IntoIterator<Item = i64>) -> Vec<Member> {
    ids.into_iter()
        .map(|id| Member {
            username: Some(format!("user{id}")),
            last_name: Some(format!("Last{id}")),
            ..Member::new(id, format!("First{id}"))
        })
        .collect()
}

#[derive(Default)]
pub(crate) struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
    cancel_on_sleep: Option<CancellationToken>,
}

impl RecordingSleeper {
    /// Sleeper that cancels `token` the first time it is asked to wait.
    pub(crate) fn cancelling(token: CancellationToken) -> Self {
        Self {
            slept: Mutex::new(Vec::new()),
            cancel_on_sleep: Some(token),
        }
    }

    pub(crate) fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        self.slept.lock().unwrap().push(duration);
        if let Some(token) = &self.cancel_on_sleep {
            token.cancel();
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Hints {
    #[default]
    None,
    Total,
    HasMore,
}

pub(crate) struct FakeSource {
    members: Vec<Member>,
    hints: Hints,
    always_full: bool,
    name: std::result::Result<String, RemoteError>,
    scripted: Mutex<VecDeque<PageResult>>,
    failures: Mutex<VecDeque<RemoteError>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl FakeSource {
    pub(crate) fn new(members: Vec<Member>) -> Self {
        Self {
            members,
            hints: Hints::None,
            always_full: false,
            name: Ok("Test Group".to_string()),
            scripted: Mutex::new(VecDeque::new()),
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_ids(n: i64) -> Self {
        Self::new(members(1..=n))
    }

    pub(crate) fn hints(mut self, hints: Hints) -> Self {
        self.hints = hints;
        self
    }

    /// Never runs dry: every page is full.
    pub(crate) fn always_full(mut self) -> Self {
        self.always_full = true;
        self
    }

    pub(crate) fn name(mut self, name: std::result::Result<String, RemoteError>) -> Self {
        self.name = name;
        self
    }

    /// Pages served verbatim, in order, before falling back to slicing `members`.
    pub(crate) fn scripted(self, pages: Vec<PageResult>) -> Self {
        *self.scripted.lock().unwrap() = pages.into();
        self
    }

    /// Errors returned by the next `fetch_page` calls, in order.
    pub(crate) fn failing_with(self, errors: Vec<RemoteError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    pub(crate) fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSource for FakeSource {
    async fn fetch_page(&self, req: &PageRequest) -> std::result::Result<PageResult, RemoteError> {
        self.requests.lock().unwrap().push(req.clone());

        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(page) = self.scripted.lock().unwrap().pop_front() {
            return Ok(page);
        }

        if self.always_full {
            let start = req.offset as i64;
            return Ok(PageResult::new(members(
                start + 1..=start + i64::from(req.limit),
            )));
        }

        let len = self.members.len();
        let start = (req.offset as usize).min(len);
        let end = (start + req.limit as usize).min(len);
        let page = PageResult::new(self.members[start..end].to_vec());
        Ok(match self.hints {
            Hints::None => page,
            Hints::Total => page.with_total(len as u64),
            Hints::HasMore => page.with_has_more(end < len),
        })
    }

    async fn resolve_display_name(
        &self,
        _source: &SourceHandle,
    ) -> std::result::Result<String, RemoteError> {
        self.name.clone()
    }
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    pub(crate) events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, ev: String) {
        self.events.lock().unwrap().push(ev);
    }
}

impl ProgressObserver for RecordingObserver {
    fn page_fetched(&self, source: &SourceHandle, offset: u64, returned: usize) {
        self.push(format!("page {source} offset={offset} returned={returned}"));
    }

    fn duplicates_dropped(&self, source: &SourceHandle, count: usize) {
        self.push(format!("dupes {source} {count}"));
    }

    fn name_fallback(&self, source: &SourceHandle, _error: &RemoteError) {
        self.push(format!("fallback {source}"));
    }

    fn exported(&self, source: &SourceHandle, path: &Path, count: usize) {
        self.push(format!("exported {source} {} {count}", path.display()));
    }

    fn export_failed(&self, source: &SourceHandle, error: &Error) {
        self.push(format!("failed {source}: {error}"));
    }
}

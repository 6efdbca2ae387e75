//! Orchestration: resolve name -> paginate -> project/export -> result record.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{Member, SourceHandle},
    export::{write_file, Exporter},
    pagination::Paginator,
    ports::{NoopObserver, ProgressObserver, RemoteSource},
    retry::Retrier,
    utils::{rfc3339, truncate_text},
    Error, Result,
};

const MAX_ERROR_MESSAGE: usize = 500;
pub const SUMMARY_FILE: &str = "summary.json";

/// Outcome of exporting one group. Never persisted except in the run summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub source_id: String,
    pub source_name: String,
    pub member_count: usize,
    pub output_file_path: Option<PathBuf>,
    pub export_time: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExportResult {
    fn ok(
        handle: &SourceHandle,
        name: String,
        count: usize,
        path: PathBuf,
        at: &DateTime<Local>,
    ) -> Self {
        Self {
            source_id: handle.to_string(),
            source_name: name,
            member_count: count,
            output_file_path: Some(path),
            export_time: rfc3339(at),
            success: true,
            error_message: None,
        }
    }

    fn failed(
        handle: &SourceHandle,
        name: String,
        message: String,
        at: &DateTime<Local>,
    ) -> Self {
        Self {
            source_id: handle.to_string(),
            source_name: name,
            member_count: 0,
            output_file_path: None,
            export_time: rfc3339(at),
            success: false,
            error_message: Some(truncate_text(&message, MAX_ERROR_MESSAGE)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    ResolveName,
    Fetch,
    Export,
}

impl Stage {
    fn label(self) -> &'static str {
        match self {
            Self::ResolveName => "resolving group name",
            Self::Fetch => "fetching members",
            Self::Export => "writing export",
        }
    }
}

/// Runs exports one group at a time against a single source.
#[derive(Clone)]
pub struct Workflow {
    source: Arc<dyn RemoteSource>,
    paginator: Paginator,
    exporter: Exporter,
    retrier: Retrier,
    observer: Arc<dyn ProgressObserver>,
}

impl Workflow {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        paginator: Paginator,
        retrier: Retrier,
        exporter: Exporter,
    ) -> Self {
        Self {
            source,
            paginator,
            exporter,
            retrier,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Export one group. Failures come back as `success = false`, never as `Err`.
    pub async fn export_group(
        &self,
        handle: &SourceHandle,
        cancel: &CancellationToken,
    ) -> ExportResult {
        self.export_one(handle, cancel, &mut HashSet::new()).await
    }

    /// Export every group in order. Once `cancel` fires the remaining groups are
    /// reported as cancelled without touching the source. Groups whose names
    /// collide get distinct files.
    pub async fn export_groups(
        &self,
        handles: &[SourceHandle],
        cancel: &CancellationToken,
    ) -> Vec<ExportResult> {
        let mut written = HashSet::new();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            if cancel.is_cancelled() {
                out.push(ExportResult::failed(
                    handle,
                    handle.fallback_name(),
                    Error::Cancelled.to_string(),
                    &Local::now(),
                ));
                continue;
            }
            out.push(self.export_one(handle, cancel, &mut written).await);
        }
        out
    }

    async fn export_one(
        &self,
        handle: &SourceHandle,
        cancel: &CancellationToken,
        written: &mut HashSet<PathBuf>,
    ) -> ExportResult {
        let started = Local::now();
        let mut name = handle.fallback_name();

        match self.run(handle, cancel, &mut name, &started, written).await {
            Ok((path, count)) => {
                self.observer.exported(handle, &path, count);
                written.insert(path.clone());
                ExportResult::ok(handle, name, count, path, &started)
            }
            Err((stage, err)) => {
                self.observer.export_failed(handle, &err);
                let message = format!("{}: {err}", stage.label());
                ExportResult::failed(handle, name, message, &started)
            }
        }
    }

    /// Display name of `handle`, or its synthesized fallback when the lookup fails.
    /// Only cancellation is reported as an error.
    pub async fn resolve_name(
        &self,
        handle: &SourceHandle,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let operation = format!("resolve name of {handle}");
        let res = self
            .retrier
            .call(&operation, cancel, || self.source.resolve_display_name(handle))
            .await;

        match res {
            Ok(name) if !name.trim().is_empty() => Ok(name),
            Ok(_) => Ok(handle.fallback_name()),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(Error::Remote { source, .. })
            | Err(Error::RetriesExhausted { last: source, .. })
            | Err(Error::FloodWaitTooLong { last: source, .. }) => {
                self.observer.name_fallback(handle, &source);
                Ok(handle.fallback_name())
            }
            Err(other) => Err(other),
        }
    }

    async fn run(
        &self,
        handle: &SourceHandle,
        cancel: &CancellationToken,
        name: &mut String,
        now: &DateTime<Local>,
        written: &HashSet<PathBuf>,
    ) -> std::result::Result<(PathBuf, usize), (Stage, Error)> {
        *name = self
            .resolve_name(handle, cancel)
            .await
            .map_err(|e| (Stage::ResolveName, e))?;

        let members: Vec<Member> = self
            .paginator
            .fetch_all(self.source.as_ref(), handle, cancel)
            .await
            .map_err(|e| (Stage::Fetch, e))?;

        let path = self
            .exporter
            .export(name, handle, &members, now, written)
            .map_err(|e| (Stage::Export, e))?;

        Ok((path, members.len()))
    }
}

/// Write the batch results as `summary.json` into `dir`.
pub fn write_summary(dir: &Path, results: &[ExportResult]) -> Result<PathBuf> {
    let path = dir.join(SUMMARY_FILE);
    let mut text = serde_json::to_string_pretty(results)?;
    text.push('\n');
    write_file(&path, text.as_bytes())?;
    Ok(path)
}

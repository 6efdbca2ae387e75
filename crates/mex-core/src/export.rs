//! Writing member lists to CSV (tabular) or JSON (structured) files.

use std::{
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::OnceLock,
};

use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{Member, SourceHandle},
    projection::{project_all, ExportOptions},
    utils::{date_stamp, rfc3339},
    Error, Result,
};

pub const CSV_HEADER: [&str; 4] = ["id", "username", "first_name", "last_name"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Fixed four-column table, ignores [`ExportOptions`].
    #[default]
    Csv,
    /// Field-projected member objects plus count and timestamp.
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" | "tabular" => Ok(Self::Csv),
            "json" | "structured" => Ok(Self::Json),
            other => Err(Error::Config(format!(
                "unknown export format {other:?} (expected csv or json)"
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

fn invalid_filename_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Windows-reserved characters plus ASCII control characters.
        Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid regex")
    })
}

/// Strip characters that are invalid in file names on common filesystems.
///
/// Also trims surrounding whitespace and trailing dots (Windows drops those
/// silently). May return an empty string; callers pick a fallback.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = invalid_filename_chars().replace_all(name, "");
    cleaned.trim().trim_end_matches('.').trim_end().to_string()
}

/// `<dir>/<sanitized name>_<YYYY-MM-DD>.<ext>`, falling back to the handle's
/// synthesized name when nothing usable is left of `name`.
pub fn output_path(
    dir: &Path,
    name: &str,
    handle: &SourceHandle,
    format: ExportFormat,
    now: &DateTime<Local>,
) -> PathBuf {
    dir.join(file_name(&stem_for(name, handle), format, now))
}

/// Like [`output_path`], but never returns a path in `taken`. On a clash the
/// handle is appended to the stem, then a counter.
pub fn unique_output_path(
    dir: &Path,
    name: &str,
    handle: &SourceHandle,
    format: ExportFormat,
    now: &DateTime<Local>,
    taken: &HashSet<PathBuf>,
) -> PathBuf {
    let base = output_path(dir, name, handle, format, now);
    if !taken.contains(&base) {
        return base;
    }

    let stem = format!(
        "{}_{}",
        stem_for(name, handle),
        sanitize_filename(&handle.to_string())
    );
    let mut candidate = dir.join(file_name(&stem, format, now));
    let mut n = 2u32;
    while taken.contains(&candidate) {
        candidate = dir.join(file_name(&format!("{stem}_{n}"), format, now));
        n += 1;
    }
    candidate
}

fn stem_for(name: &str, handle: &SourceHandle) -> String {
    let stem = sanitize_filename(name);
    if stem.is_empty() {
        return sanitize_filename(&handle.fallback_name());
    }
    stem
}

fn file_name(stem: &str, format: ExportFormat, now: &DateTime<Local>) -> String {
    format!("{stem}_{}.{}", date_stamp(now), format.extension())
}

/// Stable ordering used by every export format.
pub fn sorted_by_id(members: &[Member]) -> Vec<Member> {
    let mut out = members.to_vec();
    out.sort_by_key(|m| m.id);
    out
}

/// Render the tabular export. Rows are sorted by id.
pub fn render_csv(members: &[Member]) -> String {
    let mut out = String::new();
    push_csv_row(&mut out, CSV_HEADER.iter().copied());
    for m in sorted_by_id(members) {
        let id = m.id.to_string();
        push_csv_row(
            &mut out,
            [
                id.as_str(),
                m.username.as_deref().unwrap_or(""),
                m.first_name.as_str(),
                m.last_name.as_deref().unwrap_or(""),
            ],
        );
    }
    out
}

fn push_csv_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_csv_field(out, field);
    }
    out.push('\n');
}

fn push_csv_field(out: &mut String, field: &str) {
    let needs_quotes = field.contains([',', '"', '\r', '\n']) || field.starts_with(' ');
    if !needs_quotes {
        out.push_str(field);
        return;
    }
    out.push('"');
    out.push_str(&field.replace('"', "\"\""));
    out.push('"');
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StructuredExport {
    members: Vec<Map<String, Value>>,
    member_count: usize,
    export_time: String,
}

/// Render the structured export: projected members (sorted by id), the
/// unfiltered member count and the export time.
pub fn render_json(
    members: &[Member],
    options: &ExportOptions,
    export_time: &DateTime<Local>,
) -> Result<String> {
    let doc = StructuredExport {
        members: project_all(&sorted_by_id(members), options),
        member_count: members.len(),
        export_time: rfc3339(export_time),
    };
    let mut text = serde_json::to_string_pretty(&doc)?;
    text.push('\n');
    Ok(text)
}

/// Writes one export file per call, rendered in memory first.
#[derive(Clone, Debug)]
pub struct Exporter {
    dir: PathBuf,
    format: ExportFormat,
    options: ExportOptions,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>, format: ExportFormat, options: ExportOptions) -> Self {
        Self {
            dir: dir.into(),
            format,
            options,
        }
    }

    /// Write `members` to a file that is not in `taken` (paths already written by
    /// the current batch).
    pub fn export(
        &self,
        name: &str,
        handle: &SourceHandle,
        members: &[Member],
        now: &DateTime<Local>,
        taken: &HashSet<PathBuf>,
    ) -> Result<PathBuf> {
        let path = unique_output_path(&self.dir, name, handle, self.format, now, taken);
        let body = match self.format {
            ExportFormat::Csv => render_csv(members),
            ExportFormat::Json => render_json(members, &self.options, now)?,
        };
        write_file(&path, body.as_bytes())?;
        Ok(path)
    }
}

/// Create missing parent directories, then write the whole file in one call.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::InvalidPath {
            path: parent.to_path_buf(),
            reason: format!("cannot create directory: {e}"),
        })?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

use chrono::{DateTime, Local, SecondsFormat, TimeZone};

pub fn rfc3339<Tz: TimeZone>(t: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `YYYY-MM-DD`, the date stamp appended to export file names.
pub fn date_stamp<Tz: TimeZone>(t: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    t.format("%Y-%m-%d").to_string()
}

/// Per-run directory name, e.g. `2026-10-19 14-03-59` (no `:` so it is valid on Windows).
pub fn run_dir_name(t: &DateTime<Local>) -> String {
    t.format("%Y-%m-%d %H-%M-%S").to_string()
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    domain::{SourceHandle, MAX_PAGE_SIZE},
    errors::Error,
    export::ExportFormat,
    pagination::PaginationConfig,
    projection::ExportOptions,
    retry::RetryPolicy,
    Result,
};

/// Typed configuration for the exporter, read from the environment (and `.env`).
#[derive(Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub export_groups: Vec<SourceHandle>,

    // Output
    pub export_dir: PathBuf,
    pub export_format: ExportFormat,
    pub export_options: ExportOptions,

    // Retrieval
    pub pagination: PaginationConfig,
    pub retry: RetryPolicy,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("telegram_bot_token", &"<redacted>")
            .field("export_groups", &self.export_groups)
            .field("export_dir", &self.export_dir)
            .field("export_format", &self.export_format)
            .field("export_options", &self.export_options)
            .field("pagination", &self.pagination)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| get(key).and_then(non_empty);

        // Required
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;
        let export_groups = parse_groups(get("EXPORT_GROUPS").as_deref());
        if export_groups.is_empty() {
            return Err(Error::Config(
                "EXPORT_GROUPS environment variable is required (comma separated ids or @usernames)"
                    .to_string(),
            ));
        }

        // Output
        let export_dir = PathBuf::from(get("EXPORT_DIR").unwrap_or_else(|| "exports".to_string()));
        let export_format = match get("EXPORT_FORMAT") {
            Some(raw) => raw.parse::<ExportFormat>()?,
            None => ExportFormat::default(),
        };
        let mut export_options = ExportOptions::default();
        for field in ExportOptions::FIELDS {
            let key = format!("EXPORT_INCLUDE_{}", field.to_uppercase());
            if let Some(raw) = get(&key) {
                export_options.set(field, parse_bool(&key, &raw)?);
            }
        }

        // Retrieval
        let defaults = PaginationConfig::default();
        let page_size = parse_num::<u32>(&get, "EXPORT_PAGE_SIZE")?.unwrap_or(defaults.page_size);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "EXPORT_PAGE_SIZE must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
            )));
        }
        let max_pages = parse_num::<u32>(&get, "EXPORT_MAX_PAGES")?.unwrap_or(defaults.max_pages);
        if max_pages == 0 {
            return Err(Error::Config("EXPORT_MAX_PAGES must be at least 1".to_string()));
        }
        let deadline = parse_num::<u64>(&get, "EXPORT_DEADLINE_SECS")?.map(Duration::from_secs);
        let dedupe = match get("EXPORT_DEDUPE") {
            Some(raw) => parse_bool("EXPORT_DEDUPE", &raw)?,
            None => defaults.dedupe,
        };

        let mut retry = RetryPolicy::default();
        if let Some(n) = parse_num::<u32>(&get, "EXPORT_MAX_ATTEMPTS")? {
            if n == 0 {
                return Err(Error::Config(
                    "EXPORT_MAX_ATTEMPTS must be at least 1".to_string(),
                ));
            }
            retry = retry.with_max_attempts(n);
        }
        if let Some(secs) = parse_num::<u64>(&get, "EXPORT_MAX_FLOOD_WAIT_SECS")? {
            retry.max_flood_wait = Duration::from_secs(secs);
        }

        Ok(Self {
            telegram_bot_token,
            export_groups,
            export_dir,
            export_format,
            export_options,
            pagination: PaginationConfig {
                page_size,
                max_pages,
                deadline,
                dedupe,
            },
            retry,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }
        out.push((key.to_string(), val));
    }
    out
}

fn parse_groups(raw: Option<&str>) -> Vec<SourceHandle> {
    raw.unwrap_or_default()
        .split(',')
        .filter_map(SourceHandle::parse)
        .collect()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{key}: expected a boolean, got {other:?}"))),
    }
}

fn parse_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key}: expected a non-negative integer, got {raw:?}")))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

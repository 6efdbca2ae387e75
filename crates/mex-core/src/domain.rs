use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound the Telegram APIs accept for one participants page.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Identifies the group/channel whose members are exported.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceHandle {
    /// Numeric chat id (supergroups/channels are negative, e.g. `-1001234567890`).
    Id(i64),
    /// Public username, stored without the leading `@`.
    Username(String),
}

impl SourceHandle {
    /// Parse `-100123`, `123` or `@name` / `name`. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(id) = raw.parse::<i64>() {
            return Some(Self::Id(id));
        }
        let name = raw.trim_start_matches('@');
        if name.is_empty() {
            return None;
        }
        Some(Self::Username(name.to_string()))
    }

    /// Name used when the display name can't be resolved.
    pub fn fallback_name(&self) -> String {
        match self {
            Self::Id(id) => format!("group_{id}"),
            Self::Username(name) => format!("group_{name}"),
        }
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Username(name) => write!(f, "@{name}"),
        }
    }
}

/// One retrieved group member.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,

    // Optional flags: each may be unknown to the source.
    pub phone: Option<String>,
    pub bot: Option<bool>,
    pub scam: Option<bool>,
    pub fake: Option<bool>,
    pub verified: Option<bool>,
    pub premium: Option<bool>,
    pub deleted: Option<bool>,
}

impl Member {
    pub fn new(id: i64, first_name: impl Into<String>) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            ..Default::default()
        }
    }
}

/// One page request against a remote source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub source: SourceHandle,
    pub offset: u64,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(source: SourceHandle, offset: u64, limit: u32) -> Self {
        Self {
            source,
            offset,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

/// One page of members, in the order the source returned them.
///
/// `total` and `has_more` are optional exhaustion hints. Sources that can't
/// provide them leave both `None` and the paginator falls back to the
/// short-page heuristic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageResult {
    pub records: Vec<Member>,
    pub total: Option<u64>,
    pub has_more: Option<bool>,
}

impl PageResult {
    pub fn new(records: Vec<Member>) -> Self {
        Self {
            records,
            total: None,
            has_more: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_has_more(mut self, has_more: bool) -> Self {
        self.has_more = Some(has_more);
        self
    }

    pub fn returned(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_handles() {
        assert_eq!(
            SourceHandle::parse(" -1001234 "),
            Some(SourceHandle::Id(-1001234))
        );
        assert_eq!(
            SourceHandle::parse("@rustlang"),
            Some(SourceHandle::Username("rustlang".to_string()))
        );
        assert_eq!(SourceHandle::parse("@"), None);
        assert_eq!(SourceHandle::parse("  "), None);
    }

    #[test]
    fn fallback_name_uses_id() {
        assert_eq!(SourceHandle::Id(42).fallback_name(), "group_42");
        assert_eq!(SourceHandle::Id(42).to_string(), "42");
        assert_eq!(
            SourceHandle::Username("chat".to_string()).to_string(),
            "@chat"
        );
    }

    #[test]
    fn page_request_clamps_limit() {
        let h = SourceHandle::Id(1);
        assert_eq!(PageRequest::new(h.clone(), 0, 0).limit, 1);
        assert_eq!(PageRequest::new(h.clone(), 0, 500).limit, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(h, 0, 50).limit, 50);
    }
}

//! Per-attribute field selection for structured exports.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::Member;

/// Which member attributes end up in a structured export.
///
/// Identity fields default to on, privacy-sensitive fields to off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub id: bool,
    pub username: bool,
    pub first_name: bool,
    pub last_name: bool,
    pub phone: bool,
    pub bot: bool,
    pub scam: bool,
    pub fake: bool,
    pub verified: bool,
    pub premium: bool,
    pub deleted: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            id: true,
            username: true,
            first_name: true,
            last_name: true,
            phone: false,
            bot: false,
            scam: false,
            fake: false,
            verified: false,
            premium: false,
            deleted: false,
        }
    }
}

impl ExportOptions {
    /// Option names, in output key order. Also the config suffixes
    /// (`EXPORT_INCLUDE_<NAME>`).
    pub const FIELDS: [&'static str; 11] = [
        "id",
        "username",
        "first_name",
        "last_name",
        "phone",
        "bot",
        "scam",
        "fake",
        "verified",
        "premium",
        "deleted",
    ];

    /// Toggle a field by name. Returns `false` for unknown names.
    pub fn set(&mut self, field: &str, enabled: bool) -> bool {
        let slot = match field {
            "id" => &mut self.id,
            "username" => &mut self.username,
            "first_name" => &mut self.first_name,
            "last_name" => &mut self.last_name,
            "phone" => &mut self.phone,
            "bot" => &mut self.bot,
            "scam" => &mut self.scam,
            "fake" => &mut self.fake,
            "verified" => &mut self.verified,
            "premium" => &mut self.premium,
            "deleted" => &mut self.deleted,
            _ => return false,
        };
        *slot = enabled;
        true
    }
}

/// Project one member. Disabled attributes are omitted, not nulled; an enabled
/// attribute the source didn't provide is written as `null`.
pub fn project(member: &Member, options: &ExportOptions) -> Map<String, Value> {
    let mut out = Map::new();
    let mut put = |enabled: bool, key: &str, value: Value| {
        if enabled {
            out.insert(key.to_string(), value);
        }
    };

    put(options.id, "id", Value::from(member.id));
    put(options.username, "username", opt(member.username.clone()));
    put(
        options.first_name,
        "first_name",
        Value::from(member.first_name.clone()),
    );
    put(options.last_name, "last_name", opt(member.last_name.clone()));
    put(options.phone, "phone", opt(member.phone.clone()));
    put(options.bot, "bot", opt(member.bot));
    put(options.scam, "scam", opt(member.scam));
    put(options.fake, "fake", opt(member.fake));
    put(options.verified, "verified", opt(member.verified));
    put(options.premium, "premium", opt(member.premium));
    put(options.deleted, "deleted", opt(member.deleted));

    out
}

pub fn project_all(members: &[Member], options: &ExportOptions) -> Vec<Map<String, Value>> {
    members.iter().map(|m| project(m, options)).collect()
}

fn opt<T: Into<Value>>(v: Option<T>) -> Value {
    v.map(Into::into).unwrap_or(Value::Null)
}

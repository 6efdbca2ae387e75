//! Telegram adapter (teloxide).
//!
//! Implements the `mex-core` [`RemoteSource`] port over the Telegram Bot API.
//!
//! The Bot API does not list ordinary members of a group; it only exposes the
//! administrator list. Full member lists need a user (MTProto) session, which this
//! adapter does not attempt. Pages are therefore slices of one administrator
//! snapshot, and every page carries the snapshot size as its authoritative total.

use std::collections::HashMap;

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{Chat, Recipient, User},
    RequestError,
};
use tokio::sync::Mutex;

use mex_core::{
    domain::{Member, PageRequest, PageResult, SourceHandle},
    ports::RemoteSource,
    RemoteError,
};

pub struct TelegramSource {
    bot: Bot,
    snapshots: Mutex<HashMap<SourceHandle, Vec<Member>>>,
}

impl TelegramSource {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Build a source from a bot token and check the token with `getMe`.
    pub async fn connect(token: &str) -> anyhow::Result<Self> {
        let bot = Bot::new(token);
        let me = bot.get_me().await?;
        tracing::info!(bot = %me.username(), "connected to Telegram Bot API");
        Ok(Self::new(bot))
    }

    /// Administrator snapshot for `handle`. Refreshed whenever a retrieval starts
    /// at offset 0 so later pages of the same retrieval see a consistent list.
    async fn snapshot(
        &self,
        handle: &SourceHandle,
        offset: u64,
    ) -> std::result::Result<Vec<Member>, RemoteError> {
        if offset > 0 {
            if let Some(cached) = self.snapshots.lock().await.get(handle) {
                return Ok(cached.clone());
            }
        }

        let admins = self
            .bot
            .get_chat_administrators(recipient(handle))
            .await
            .map_err(map_request_error)?;
        let members: Vec<Member> = admins.iter().map(|m| member_from_user(&m.user)).collect();

        self.snapshots
            .lock()
            .await
            .insert(handle.clone(), members.clone());
        Ok(members)
    }
}

#[async_trait]
impl RemoteSource for TelegramSource {
    async fn fetch_page(&self, req: &PageRequest) -> std::result::Result<PageResult, RemoteError> {
        let all = self.snapshot(&req.source, req.offset).await?;
        Ok(slice_page(&all, req.offset, req.limit))
    }

    async fn resolve_display_name(
        &self,
        source: &SourceHandle,
    ) -> std::result::Result<String, RemoteError> {
        let chat = self
            .bot
            .get_chat(recipient(source))
            .await
            .map_err(map_request_error)?;
        display_name(&chat).ok_or_else(|| RemoteError::Fatal(format!("chat {source} has no title")))
    }
}

pub fn recipient(handle: &SourceHandle) -> Recipient {
    match handle {
        SourceHandle::Id(id) => Recipient::Id(teloxide::types::ChatId(*id)),
        SourceHandle::Username(name) => Recipient::ChannelUsername(format!("@{name}")),
    }
}

fn display_name(chat: &Chat) -> Option<String> {
    chat.title()
        .or_else(|| chat.username())
        .or_else(|| chat.first_name())
        .map(str::to_string)
}

pub fn member_from_user(user: &User) -> Member {
    Member {
        id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        // The Bot API never exposes phone numbers or scam/fake/verified markers.
        phone: None,
        bot: Some(user.is_bot),
        scam: None,
        fake: None,
        verified: None,
        premium: Some(user.is_premium),
        deleted: None,
    }
}

/// `[offset, offset + limit)` of `all`, with `all.len()` as the total.
pub fn slice_page(all: &[Member], offset: u64, limit: u32) -> PageResult {
    let len = all.len();
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
    let end = start.saturating_add(limit as usize).min(len);
    PageResult::new(all[start..end].to_vec()).with_total(len as u64)
}

/// Map teloxide failures onto the port's tagged error.
pub fn map_request_error(e: RequestError) -> RemoteError {
    match e {
        RequestError::RetryAfter(wait) => RemoteError::RateLimited {
            retry_after: Some(wait),
            message: format!(
                "telegram flood control: retry after {}s",
                wait.as_secs()
            ),
        },
        RequestError::Network(err) => {
            RemoteError::Transient(format!("telegram network error: {err}"))
        }
        RequestError::Io(err) => RemoteError::Transient(format!("telegram i/o error: {err}")),
        // API errors only carry a description; let the keyword classifier decide.
        RequestError::Api(err) => RemoteError::Unclassified(format!("telegram api error: {err}")),
        other => RemoteError::Fatal(format!("telegram error: {other}")),
    }
}

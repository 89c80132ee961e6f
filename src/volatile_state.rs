use crate::{
    context::Context, helper::UserHelper, log_internal, logging::AsyncPrintColor,
};
use anyhow::Result;
use serenity::all::{ChannelId, GetMessages, GuildId, Message, MessageId, UserId};
use std::collections::HashMap;

/// State which is lost across sessions
pub struct VolatileState {
    pub history: History,
}

/// Per-channel short-term message cache.  The proxy reconciliation engine
/// searches it for the original behind a ghost-post.
pub struct History(HashMap<ChannelId, Vec<HistoryEntry>>);

#[derive(Clone)]
pub struct HistoryEntry {
    pub message_id: MessageId,
    pub author_id: UserId,
    pub author_name: String,
    pub guild_id: Option<GuildId>,
    pub content: String,
}

impl HistoryEntry {
    async fn from_message(ctx: &Context<'_>, msg: &Message) -> Self {
        Self {
            message_id: msg.id,
            author_id: msg.author.id,
            author_name: msg.author.nick_in_guild(ctx, msg.guild_id).await,
            guild_id: msg.guild_id,
            content: msg.content.clone(),
        }
    }
}

impl VolatileState {
    pub async fn new() -> Self {
        Self {
            history: History::new(),
        }
    }
}

impl<'a> History {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub async fn backfill(
        &'a mut self,
        ctx: &Context<'_>,
        channel_id: ChannelId,
    ) -> Result<&'a mut Vec<HistoryEntry>> {
        use std::collections::hash_map::Entry::*;
        let vacant_entry = match self.0.entry(channel_id) {
            Occupied(occupied_entry) => return Ok(occupied_entry.into_mut()),
            Vacant(vacant_entry) => vacant_entry,
        };

        let backfill_limit = ctx.cfg.read().await.history.channel_backfill_message_count;

        log_internal!(
            "Backfilling the last {} messages in \"{}\"... ",
            backfill_limit,
            channel_id.color(ctx.http).await,
        );

        // Ignore errors here.  May be serenity crate bug?
        let backfill_messages = channel_id
            .messages(ctx.cache_http, GetMessages::new().limit(backfill_limit))
            .await
            .unwrap_or_default();

        // Messages are provided newest to oldest.  Iterate in reverse order so the messages are in chronological order.
        let mut messages = Vec::new();
        for msg in backfill_messages.iter().rev() {
            messages.push(HistoryEntry::from_message(ctx, msg).await);
        }

        let channel_history = vacant_entry.insert(messages);

        log_internal!(
            "Backfilling the last {} messages in \"{}\"... done",
            backfill_limit,
            channel_id.color(ctx.http).await,
        );

        Ok(channel_history)
    }

    pub async fn push(&mut self, ctx: &Context<'_>, msg: &Message) -> Result<()> {
        let entry = HistoryEntry::from_message(ctx, msg).await;

        let history = self.backfill(ctx, msg.channel_id).await?;
        history.push(entry);

        let history_max = ctx.cfg.read().await.history.channel_max_message_count;

        while history.len() > history_max {
            history.remove(0);
        }

        Ok(())
    }

    /// Search the newest `lookback` cached entries of a channel for a
    /// specific message.  Read-only: a channel we have never seen simply has
    /// no match.
    pub fn find_recent(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        lookback: usize,
    ) -> Option<&HistoryEntry> {
        self.0
            .get(&channel_id)?
            .iter()
            .rev()
            .take(lookback)
            .find(|entry| entry.message_id == message_id)
    }
}

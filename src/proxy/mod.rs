//! Pre-processing stage for incoming messages.  A proxy service may repost a
//! user's message through a webhook under another identity and delete the
//! original; this stage keeps the rest of the bot seeing each logical
//! message exactly once, under the best identity we can reconstruct.

pub mod api;
pub mod settings;

use crate::{event::Event, handler::Shared, log_internal};
use serenity::all::{ChannelId, GuildId, Message, MessageId, User, UserId};
use settings::{ProxySettings, TagRule};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::Mutex, task::JoinHandle};

/// One registered expectation that a ghost-post is about to arrive.
struct Pending<T> {
    token: u64,
    wait: JoinHandle<()>,
    author: T,
}

/// FIFO queues of pending expectations, keyed by the display name the
/// ghost-post will claim and the channel it will arrive in.  The oldest
/// still-waiting expectation is satisfied first.
struct PendingQueues<T>(HashMap<(String, ChannelId), VecDeque<Pending<T>>>);

impl<T> PendingQueues<T> {
    fn new() -> Self {
        Self(HashMap::new())
    }

    fn push(&mut self, name: String, channel: ChannelId, token: u64, wait: JoinHandle<()>, author: T) {
        self.0
            .entry((name, channel))
            .or_default()
            .push_back(Pending { token, wait, author });
    }

    /// Pop the oldest live expectation for this key.  Entries whose wait
    /// already finished have done their fallback dispatch; skip them.
    fn claim(&mut self, name: &str, channel: ChannelId) -> Option<Pending<T>> {
        let queue = self.0.get_mut(&(name.to_owned(), channel))?;
        while let Some(pending) = queue.pop_front() {
            if !pending.wait.is_finished() {
                return Some(pending);
            }
        }
        None
    }

    /// Remove one specific entry.  Returns whether it was still registered;
    /// a wait task that loses this race must not dispatch its fallback.
    fn withdraw(&mut self, name: &str, channel: ChannelId, token: u64) -> bool {
        let Some(queue) = self.0.get_mut(&(name.to_owned(), channel)) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|pending| pending.token != token);
        queue.len() != before
    }
}

/// Interception state: pending expectations plus the per-author prediction
/// settings the engine learns as it watches outcomes.
pub struct ProxyGate {
    pending: Mutex<PendingQueues<User>>,
    next_token: AtomicU64,
    settings: Mutex<HashMap<UserId, ProxySettings>>,
}

impl ProxyGate {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(PendingQueues::new()),
            next_token: AtomicU64::new(0),
            settings: Mutex::new(HashMap::new()),
        }
    }

    async fn clear_autoproxy(&self, author: UserId, guild: Option<GuildId>) {
        let Some(guild) = guild else { return };
        if let Some(settings) = self.settings.lock().await.get_mut(&author) {
            settings.autoproxy.remove(&guild);
        }
    }
}

/// Entry point: every incoming message-create passes through here before any
/// plugin sees it.
pub async fn intercept(shared: Arc<Shared>, sctx: serenity::all::Context, msg: Message) {
    if msg.webhook_id.is_some() {
        // Possibly a ghost-post.  Were we expecting one under this name in
        // this channel?
        let claimed = {
            let mut pending = shared.proxy.pending.lock().await;
            pending.claim(&msg.author.name, msg.channel_id)
        };
        if let Some(pending) = claimed {
            // Cancel the fallback before dispatching; the original must
            // never go out as well.
            pending.wait.abort();
            let mut msg = msg;
            msg.author = pending.author;
            dispatch(&shared, &sctx, msg).await;
            return;
        }
        // Not expected; work out after the fact what it was
        tokio::spawn(autopsy(shared.clone(), sctx, msg));
        return;
    }

    // Ghost-posts arrive in guilds only, so prediction is guild-scoped
    let prediction = match msg.guild_id {
        Some(_) => {
            let mut all = shared.proxy.settings.lock().await;
            all.entry(msg.author.id)
                .or_default()
                .predict(&msg.content, msg.guild_id)
        }
        None => None,
    };

    match prediction {
        Some(name) => {
            let token = shared.proxy.next_token.fetch_add(1, Ordering::Relaxed);
            let author = msg.author.clone();
            let channel = msg.channel_id;
            // Hold the queue lock across the spawn so the wait task cannot
            // observe the queue before its own entry is in it
            let mut pending = shared.proxy.pending.lock().await;
            let wait = tokio::spawn(expired(shared.clone(), sctx, name.clone(), token, msg));
            pending.push(name, channel, token, wait, author);
        }
        None => dispatch(&shared, &sctx, msg).await,
    }
}

/// Fallback for a predicted proxy that never arrived: after the bounded
/// wait, dispatch the original unchanged and treat the non-event as evidence
/// that the standing autoproxy is stale.
async fn expired(shared: Arc<Shared>, sctx: serenity::all::Context, name: String, token: u64, msg: Message) {
    let wait = Duration::from_millis(shared.cfg.read().await.proxy.wait_ms);
    tokio::time::sleep(wait).await;

    // Claim our own entry back; if a ghost-post got there first, stand down
    if !shared
        .proxy
        .pending
        .lock()
        .await
        .withdraw(&name, msg.channel_id, token)
    {
        return;
    }

    let author = msg.author.id;
    let guild = msg.guild_id;
    dispatch(&shared, &sctx, msg).await;
    shared.proxy.clear_autoproxy(author, guild).await;
}

/// An unannounced ghost-post: ask the lookup service what it was and bring
/// the original author's settings up to date.  A confirmed proxy is not
/// redispatched, because its original already went out before the service
/// deleted it.
async fn autopsy(shared: Arc<Shared>, sctx: serenity::all::Context, msg: Message) {
    let info = match api::message(msg.id).await {
        Ok(Some(info)) => info,
        // Not a proxy after all; pass it through untouched
        Ok(None) => return dispatch(&shared, &sctx, msg).await,
        Err(err) => {
            // Treat an unreachable service like "unknown" rather than
            // swallowing the message
            log_internal!("Proxy lookup for message {} failed: {}", msg.id, err);
            return dispatch(&shared, &sctx, msg).await;
        }
    };

    let Some(original_id) = info.original.parse::<u64>().ok().filter(|id| *id != 0) else {
        return;
    };
    let original = {
        let lookback = shared.cfg.read().await.proxy.lookback;
        let vstate = shared.vstate.read().await;
        vstate
            .history
            .find_recent(msg.channel_id, MessageId::new(original_id), lookback)
            .cloned()
    };
    let Some(original) = original else {
        // The original fell out of the cache; give up on learning from it
        return;
    };

    let members = match api::members(&info.system.id).await {
        Ok(Some(members)) => members,
        Ok(None) => Vec::new(),
        Err(err) => {
            log_internal!("Member lookup for system {} failed: {}", info.system.id, err);
            return;
        }
    };

    let mut all = shared.proxy.settings.lock().await;
    let settings = all.entry(original.author_id).or_default();
    let system = &info.system;
    settings.tags = members
        .iter()
        .flat_map(|member| {
            member.proxy_tags.iter().map(move |tag| TagRule {
                prefix: tag.prefix.clone().unwrap_or_default(),
                suffix: tag.suffix.clone().unwrap_or_default(),
                member: api::proxied_name(member, system),
            })
        })
        .collect();

    // If the fresh tags would not have predicted the original, the proxy
    // must have come from a standing autoproxy; remember it
    if settings
        .predict(&original.content, original.guild_id)
        .is_none()
    {
        if let Some(guild) = msg.guild_id {
            settings
                .autoproxy
                .insert(guild, api::proxied_name(&info.member, &info.system));
        }
    }
}

/// Forward a message past the pre-processing stage into plugin dispatch.
async fn dispatch(shared: &Arc<Shared>, sctx: &serenity::all::Context, msg: Message) {
    Event::Message(msg).handle(shared.ctx(sctx)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parked() -> JoinHandle<()> {
        tokio::spawn(std::future::pending())
    }

    async fn finished() -> JoinHandle<()> {
        let handle = tokio::spawn(async {});
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        handle
    }

    #[tokio::test]
    async fn claims_are_fifo_per_key() {
        let mut queues = PendingQueues::new();
        let channel = ChannelId::new(1);
        queues.push("Alice".into(), channel, 0, parked().await, 10u32);
        queues.push("Alice".into(), channel, 1, parked().await, 20u32);
        queues.push("Bob".into(), channel, 2, parked().await, 30u32);

        let first = queues.claim("Alice", channel).unwrap();
        assert_eq!(first.author, 10);
        first.wait.abort();
        let second = queues.claim("Alice", channel).unwrap();
        assert_eq!(second.author, 20);
        second.wait.abort();
        assert!(queues.claim("Alice", channel).is_none());

        // the other key is untouched
        let other = queues.claim("Bob", channel).unwrap();
        assert_eq!(other.author, 30);
        other.wait.abort();
    }

    #[tokio::test]
    async fn keys_are_scoped_by_channel() {
        let mut queues = PendingQueues::new();
        queues.push("Alice".into(), ChannelId::new(1), 0, parked().await, 1u32);
        assert!(queues.claim("Alice", ChannelId::new(2)).is_none());
        queues.claim("Alice", ChannelId::new(1)).unwrap().wait.abort();
    }

    #[tokio::test]
    async fn finished_waits_are_skipped() {
        let mut queues = PendingQueues::new();
        let channel = ChannelId::new(1);
        queues.push("Alice".into(), channel, 0, finished().await, 1u32);
        queues.push("Alice".into(), channel, 1, parked().await, 2u32);

        // the first entry already dispatched its fallback; the ghost-post
        // must match the still-waiting one
        let live = queues.claim("Alice", channel).unwrap();
        assert_eq!(live.author, 2);
        live.wait.abort();
        assert!(queues.claim("Alice", channel).is_none());
    }

    #[tokio::test]
    async fn withdraw_removes_exactly_one_entry_once() {
        let mut queues = PendingQueues::new();
        let channel = ChannelId::new(1);
        queues.push("Alice".into(), channel, 7, parked().await, 1u32);
        queues.push("Alice".into(), channel, 8, parked().await, 2u32);

        assert!(queues.withdraw("Alice", channel, 7));
        // a second withdrawal of the same token loses the race
        assert!(!queues.withdraw("Alice", channel, 7));
        assert!(!queues.withdraw("Alice", ChannelId::new(2), 8));

        let rest = queues.claim("Alice", channel).unwrap();
        assert_eq!(rest.author, 2);
        rest.wait.abort();
    }

    #[tokio::test]
    async fn claimed_entries_cannot_be_withdrawn() {
        // the ghost-post path and the timeout path race for the same entry;
        // whoever gets it, the other must see nothing
        let mut queues = PendingQueues::new();
        let channel = ChannelId::new(1);
        queues.push("Alice".into(), channel, 3, parked().await, 1u32);

        let claimed = queues.claim("Alice", channel).unwrap();
        claimed.wait.abort();
        assert!(!queues.withdraw("Alice", channel, 3));
    }
}

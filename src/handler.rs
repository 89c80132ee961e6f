use crate::{
    config::Config, context::Context, event::Event, proxy, proxy::ProxyGate, record::Records,
    volatile_state::VolatileState,
};
use anyhow::Result;
use serenity::all::{ChannelId, GuildId, Message, MessageId, MessageUpdateEvent, Reaction, Ready};
use std::sync::Arc;
use tokio::sync::RwLock;

/// State shared by every event and by the reconciliation engine's background
/// tasks, which outlive any single callback.
pub struct Shared {
    pub cfg: RwLock<Config>,
    pub vstate: RwLock<VolatileState>,
    pub records: Records,
    pub proxy: ProxyGate,
}

impl Shared {
    pub fn ctx<'a>(&'a self, discord_ctx: &'a serenity::all::Context) -> Context<'a> {
        Context {
            cfg: &self.cfg,
            vstate: &self.vstate,
            records: &self.records,
            cache: &discord_ctx.cache,
            http: &discord_ctx.http,
            cache_http: discord_ctx,
        }
    }
}

/// Discord event handler
pub struct Handler {
    shared: Arc<Shared>,
}

impl Handler {
    pub fn new(cfg: Config, vstate: VolatileState) -> Result<Self> {
        let records = Records::new(&cfg)?;
        Ok(Self {
            shared: Arc::new(Shared {
                cfg: RwLock::new(cfg),
                vstate: RwLock::new(vstate),
                records,
                proxy: ProxyGate::new(),
            }),
        })
    }
}

#[serenity::async_trait]
impl serenity::all::EventHandler for Handler {
    async fn ready(&self, discord_ctx: serenity::all::Context, ready: Ready) {
        Event::Ready(ready).handle(self.shared.ctx(&discord_ctx)).await;
    }

    async fn resume(&self, discord_ctx: serenity::all::Context, _: serenity::all::ResumedEvent) {
        Event::Resume.handle(self.shared.ctx(&discord_ctx)).await;
    }

    async fn message(&self, discord_ctx: serenity::all::Context, msg: Message) {
        // Message creates go through the proxy reconciliation stage first;
        // it decides whether and as whom each message reaches the plugins.
        proxy::intercept(self.shared.clone(), discord_ctx, msg).await;
    }

    async fn message_update(
        &self,
        discord_ctx: serenity::all::Context,
        _old: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        Event::MessageUpdate { new, event }
            .handle(self.shared.ctx(&discord_ctx))
            .await;
    }

    async fn message_delete(
        &self,
        discord_ctx: serenity::all::Context,
        channel_id: ChannelId,
        message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        Event::MessageDelete {
            channel_id,
            message_id,
        }
        .handle(self.shared.ctx(&discord_ctx))
        .await;
    }

    async fn reaction_add(&self, discord_ctx: serenity::all::Context, reaction: Reaction) {
        Event::ReactionAdd(reaction)
            .handle(self.shared.ctx(&discord_ctx))
            .await;
    }

    async fn reaction_remove(&self, discord_ctx: serenity::all::Context, reaction: Reaction) {
        Event::ReactionRemove(reaction)
            .handle(self.shared.ctx(&discord_ctx))
            .await;
    }
}

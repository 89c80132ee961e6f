use crate::{event::*, plugin::*};
use anyhow::Result;

/// Keeps every record store's materialized table in step with its backing
/// channel: full resync when a gateway session starts or resumes, live
/// updates for everything in between.
pub struct Chitter;

#[serenity::async_trait]
impl Plugin for Chitter {
    fn name(&self) -> &'static str {
        "chitter"
    }

    async fn usage(&self, _ctx: &Context<'_>) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        match event {
            // A new or resumed session may have missed events; whatever we
            // had indexed can no longer be trusted until replayed.
            Event::Ready(_) | Event::Resume => {
                for store in ctx.records.all() {
                    store.desync().await;
                    store.sync(ctx).await?;
                }
            }
            Event::Message(msg) => {
                for store in ctx.records.all() {
                    store.observe_message(ctx, msg).await;
                }
            }
            Event::MessageUpdate { new, event } => {
                for store in ctx.records.all() {
                    store.observe_update(ctx, new.as_ref(), event).await?;
                }
            }
            Event::MessageDelete {
                channel_id,
                message_id,
            } => {
                for store in ctx.records.all() {
                    store.observe_delete(*channel_id, *message_id).await;
                }
            }
            _ => {}
        }

        // Record bookkeeping never consumes the event
        Ok(EventHandled::No)
    }
}

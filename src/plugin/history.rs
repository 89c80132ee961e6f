use crate::{event::*, plugin::*};
use anyhow::Result;

/// Initializes and maintains the per-channel message cache
pub struct History;

#[serenity::async_trait]
impl Plugin for History {
    fn name(&self) -> &'static str {
        "history"
    }

    async fn usage(&self, _ctx: &Context<'_>) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        ctx.vstate.write().await.history.push(ctx, msg).await?;

        // Allow other plugins to consume this event
        Ok(EventHandled::No)
    }
}

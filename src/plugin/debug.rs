use crate::{event::*, helper::*, log_event, logging::*, plugin::*};
use anyhow::Result;
use std::borrow::Cow;

/// Prints debug information about event to stdout
pub struct Debug;

#[serenity::async_trait]
impl Plugin for Debug {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn usage(&self, _ctx: &Context<'_>) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        match event {
            Event::Ready(ready) => {
                log_event!(
                    "Connected to {} server(s) as {}",
                    ready.guilds.len(),
                    ctx.cache.current_user().color(),
                );
            }
            Event::Resume => {
                log_event!("Resumed gateway session");
            }
            Event::Message(msg) => {
                log_event!(
                    "{}{}{}{}{}{} {}",
                    msg.guild_id.color(ctx.http).await,
                    Glue {}.color(),
                    msg.channel_id.color(ctx.http).await,
                    Glue {}.color(),
                    msg.author.color(),
                    Glue {}.color(),
                    msg.human_format_content(ctx).await?,
                );
            }
            Event::MessageUpdate { new, event } => {
                let content = match new {
                    Some(msg) => Cow::Borrowed(msg.content.as_str()),
                    None => Cow::Owned(format!("<message-{}>", event.id)),
                };
                log_event!(
                    "Message edited in \"{}\": {}",
                    event.channel_id.color(ctx.http).await,
                    content,
                );
            }
            Event::MessageDelete {
                channel_id,
                message_id,
            } => {
                log_event!(
                    "Message {} deleted in \"{}\"",
                    message_id,
                    channel_id.color(ctx.http).await,
                );
            }
            Event::ReactionAdd(reaction) => {
                let message = match reaction.message(ctx.cache_http).await {
                    Ok(msg) => Cow::Owned(msg.human_format_content(ctx).await?),
                    Err(_) => Cow::Borrowed("<unknown-message>"),
                };

                let emoji = match &reaction.emoji {
                    serenity::all::ReactionType::Custom {
                        animated: _,
                        id: _,
                        name,
                    } => name.clone().unwrap_or("<unknown-emoji>".to_owned()),
                    serenity::all::ReactionType::Unicode(s) => s.clone(),
                    _ => "<unknown-emoji>".to_owned(),
                };

                log_event!(
                    "{} reacted to message \"{}\" with \"{}\"",
                    reaction.user_id.color(ctx.http).await,
                    message,
                    emoji
                );
            }
            Event::ReactionRemove(reaction) => {
                let message = reaction
                    .message(ctx.cache_http)
                    .await
                    .map(|msg| msg.content.clone())
                    .unwrap_or("<unknown-message>".to_string());

                let emoji = match &reaction.emoji {
                    serenity::all::ReactionType::Custom {
                        animated: _,
                        id: _,
                        name,
                    } => name.clone().unwrap_or("<unknown-emoji>".to_owned()),
                    serenity::all::ReactionType::Unicode(s) => s.clone(),
                    _ => "<unknown-emoji>".to_owned(),
                };

                log_event!(
                    "{} removed reaction \"{}\" from message \"{}\"",
                    reaction.user_id.color(ctx.http).await,
                    emoji,
                    message
                );
            }
        }

        Ok(EventHandled::No)
    }
}

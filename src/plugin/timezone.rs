use crate::{
    event::*,
    helper::UserIdHelper,
    plugin::*,
    record::{Field, FieldKind, Record, Schema, Value},
};
use anyhow::{anyhow, Result};
use chrono::Utc;
use chrono_tz::Tz;
use serenity::all::{Message, MessageId, UserId};

/// Member timezone records, one message per member in the backing channel.
pub const SCHEMA: Schema = Schema {
    name: "timezone",
    fields: &[
        Field {
            name: "member",
            kind: FieldKind::User,
        },
        Field {
            name: "timezone",
            kind: FieldKind::Str,
        },
    ],
};

/// Lets members store their timezone and look up each other's local time
pub struct Timezone;

#[serenity::async_trait]
impl Plugin for Timezone {
    fn name(&self) -> &'static str {
        "timezone"
    }

    async fn usage(&self, ctx: &Context<'_>) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!(
            "{0}timezone [member] - show a member's timezone and local time\n\
             {0}timezone set <zone> - set your timezone, e.g. `set Europe/London`\n\
             {0}timezone clear - forget your timezone",
            prefix,
        ))
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        match args.as_slice() {
            ["set", zone @ ..] if !zone.is_empty() => {
                set_timezone(ctx, msg, &zone.join(" ")).await?
            }
            ["clear"] => clear_timezone(ctx, msg).await?,
            [] => show_timezone(ctx, msg, msg.author.id).await?,
            target => {
                let text = target.join(" ");
                match resolve_member(ctx, msg, &text) {
                    Some(user_id) => show_timezone(ctx, msg, user_id).await?,
                    None => {
                        msg.reply(
                            ctx.cache_http,
                            format!("I don't know who \"{}\" is.", text),
                        )
                        .await?;
                    }
                }
            }
        }

        Ok(EventHandled::Yes)
    }
}

/// The stored row for one member, if any.
async fn row_for(ctx: &Context<'_>, user_id: UserId) -> Result<Option<(MessageId, Record)>> {
    let rows = ctx.records.timezones.rows().await?;
    Ok(rows
        .into_iter()
        .find(|(_, record)| record.get(0).and_then(Value::as_user) == Some(user_id)))
}

async fn set_timezone(ctx: &Context<'_>, msg: &Message, input: &str) -> Result<()> {
    let Ok(zone) = input.parse::<Tz>() else {
        msg.reply(
            ctx.cache_http,
            "I don't recognize that timezone.  Use a name like `Europe/London`.",
        )
        .await?;
        return Ok(());
    };

    let store = &ctx.records.timezones;
    match row_for(ctx, msg.author.id).await? {
        Some((id, mut record)) => {
            record.set(&SCHEMA, 1, Value::Str(zone.name().to_owned()))?;
            store.update(ctx, id, record).await?;
        }
        None => {
            store
                .insert(
                    ctx,
                    vec![
                        Value::User(msg.author.id),
                        Value::Str(zone.name().to_owned()),
                    ],
                )
                .await?;
        }
    }

    msg.reply(
        ctx.cache_http,
        format!("Your timezone is now {}.", zone.name()),
    )
    .await?;
    Ok(())
}

async fn clear_timezone(ctx: &Context<'_>, msg: &Message) -> Result<()> {
    match row_for(ctx, msg.author.id).await? {
        Some((id, _)) => {
            ctx.records.timezones.delete(ctx, id).await?;
            msg.reply(ctx.cache_http, "Forgotten.").await?;
        }
        None => {
            msg.reply(ctx.cache_http, "You don't have a timezone set.")
                .await?;
        }
    }
    Ok(())
}

async fn show_timezone(ctx: &Context<'_>, msg: &Message, target: UserId) -> Result<()> {
    let name = target.nick_in_guild(ctx, msg.guild_id).await;

    let Some((_, record)) = row_for(ctx, target).await? else {
        msg.reply(
            ctx.cache_http,
            format!("{} doesn't have a timezone set.", name),
        )
        .await?;
        return Ok(());
    };

    let zone_name = record
        .get(1)
        .and_then(Value::as_str)
        .ok_or(anyhow!("timezone record without a zone field"))?
        .to_owned();

    let reply = match zone_name.parse::<Tz>() {
        Ok(zone) => {
            let now = Utc::now().with_timezone(&zone);
            format!(
                "{} is in {}, where it is currently {}.",
                name,
                zone_name,
                now.format("%H:%M"),
            )
        }
        // A stale record can outlive the zone database's idea of the name
        Err(_) => format!("{} is in {}.", name, zone_name),
    };
    msg.reply(ctx.cache_http, reply).await?;
    Ok(())
}

/// Turn free text into a member: a direct mention, a raw id, or an exact
/// username/nickname in the guild.
fn resolve_member(ctx: &Context<'_>, msg: &Message, text: &str) -> Option<UserId> {
    if let Some(user) = msg.mentions.first() {
        return Some(user.id);
    }
    if let Ok(id) = text.parse::<u64>() {
        if id != 0 {
            return Some(UserId::new(id));
        }
    }
    let guild = msg.guild(ctx.cache)?;
    guild.members.iter().find_map(|(id, member)| {
        (member.user.name == text
            || member.nick.as_deref() == Some(text)
            || member.user.global_name.as_deref() == Some(text))
        .then_some(*id)
    })
}

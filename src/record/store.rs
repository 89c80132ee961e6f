//! The channel-backed record store and its in-memory materialized table.

use super::{codec, Record, RecordError, Schema, Value};
use crate::{context::Context, log_internal, logging::AsyncPrintColor};
use anyhow::Result;
use serenity::all::{
    ChannelId, EditMessage, GetMessages, Message, MessageId, MessageUpdateEvent, UserId,
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, RwLock};

const HISTORY_PAGE_LIMIT: u8 = 100;

/// Which authors' messages count as authoritative writes.  Evaluated per
/// event with the candidate author and the bot's own id.
pub type WritePolicy = Arc<dyn Fn(UserId, UserId) -> bool + Send + Sync>;

pub mod policy {
    use super::WritePolicy;
    use serenity::all::UserId;
    use std::sync::Arc;

    /// Only the bot's own messages are records.
    pub fn myself() -> WritePolicy {
        Arc::new(|author, me| author == me)
    }

    /// Only one specific author's messages are records.
    pub fn only(id: UserId) -> WritePolicy {
        Arc::new(move |author, _| author == id)
    }

    /// Anyone's messages are records.
    pub fn anyone() -> WritePolicy {
        Arc::new(|_, _| true)
    }
}

/// Materialized view of one backing channel.  Keyed by message id; insertion
/// order carries no meaning.
#[derive(Default)]
struct Table {
    rows: HashMap<MessageId, Record>,
    synced: bool,
}

impl Table {
    /// Insert or replace, skipping the write when the decoded value is
    /// already indexed.  Applying the same event twice is therefore harmless.
    fn upsert(&mut self, id: MessageId, record: Record) -> bool {
        match self.rows.get(&id) {
            Some(existing) if *existing == record => false,
            _ => {
                self.rows.insert(id, record);
                true
            }
        }
    }

    fn remove(&mut self, id: MessageId) -> bool {
        self.rows.remove(&id).is_some()
    }
}

/// One (schema, backing channel) pair.  Constructed once at startup and
/// shared by reference; all mutation goes through the table lock.
pub struct RecordStore {
    schema: Schema,
    channel: ChannelId,
    listen_to: WritePolicy,
    table: RwLock<Table>,
    // Coalesces concurrent sync() calls onto one in-flight replay.
    sync_gate: Mutex<()>,
}

impl RecordStore {
    pub fn new(schema: Schema, channel: ChannelId, listen_to: WritePolicy) -> Self {
        Self {
            schema,
            channel,
            listen_to,
            table: RwLock::new(Table::default()),
            sync_gate: Mutex::new(()),
        }
    }

    fn eligible(&self, author: UserId, me: UserId) -> bool {
        (self.listen_to)(author, me)
    }

    /// Writes are sent as the bot, so the store is writable exactly when the
    /// policy accepts the bot itself.
    fn writable_by(&self, me: UserId) -> bool {
        (self.listen_to)(me, me)
    }

    fn check_writable(&self, ctx: &Context<'_>) -> Result<(), RecordError> {
        if self.writable_by(ctx.cache.current_user().id) {
            Ok(())
        } else {
            Err(RecordError::NotWritable(self.schema.name))
        }
    }

    /// Replay the backing channel's full history into the table.  Idempotent
    /// and coalescing: a second caller awaits the in-flight replay instead of
    /// starting another, and a store that is already synchronized returns
    /// immediately.
    pub async fn sync(&self, ctx: &Context<'_>) -> Result<()> {
        let _in_flight = self.sync_gate.lock().await;
        if self.table.read().await.synced {
            return Ok(());
        }

        log_internal!(
            "Synchronizing `{}` records from \"{}\"...",
            self.schema.name,
            self.channel.color(ctx.http).await,
        );

        self.table.write().await.rows.clear();
        let me = ctx.cache.current_user().id;
        let mut before: Option<MessageId> = None;
        loop {
            let mut filter = GetMessages::new().limit(HISTORY_PAGE_LIMIT);
            if let Some(oldest) = before {
                filter = filter.before(oldest);
            }
            let page = self.channel.messages(ctx.cache_http, filter).await?;
            let Some(oldest) = page.last() else {
                break;
            };
            before = Some(oldest.id);

            let mut table = self.table.write().await;
            for msg in &page {
                if !self.eligible(msg.author.id, me) {
                    continue;
                }
                // A message that does not decode is not a record
                if let Some(record) = codec::decode(self.schema.fields, &msg.content) {
                    table.upsert(msg.id, record);
                }
            }
            drop(table);

            if page.len() < HISTORY_PAGE_LIMIT as usize {
                break;
            }
        }

        let mut table = self.table.write().await;
        table.synced = true;
        log_internal!(
            "Synchronizing `{}` records... done ({} rows)",
            self.schema.name,
            table.rows.len(),
        );
        Ok(())
    }

    /// Forget synchronization, e.g. after a gateway session resume.  Rows are
    /// kept but unreadable until the next sync completes.
    pub async fn desync(&self) {
        self.table.write().await.synced = false;
    }

    /// Snapshot of the materialized view.
    pub async fn rows(&self) -> Result<Vec<(MessageId, Record)>, RecordError> {
        let table = self.table.read().await;
        if !table.synced {
            return Err(RecordError::NotSynced(self.schema.name));
        }
        Ok(table.rows.iter().map(|(id, r)| (*id, r.clone())).collect())
    }

    /// Serialize a new record into the backing channel and index it.
    pub async fn insert(&self, ctx: &Context<'_>, values: Vec<Value>) -> Result<MessageId> {
        self.check_writable(ctx)?;
        let record = Record::new(&self.schema, values)?;
        let content = codec::encode(&record);
        let msg = self.channel.say(ctx.cache_http, content).await?;
        self.table.write().await.upsert(msg.id, record);
        Ok(msg.id)
    }

    /// Re-serialize a record over its owning message.
    pub async fn update(&self, ctx: &Context<'_>, id: MessageId, record: Record) -> Result<()> {
        self.check_writable(ctx)?;
        let record = Record::new(&self.schema, record.values().to_vec())?;
        let content = codec::encode(&record);
        self.channel
            .edit_message(ctx.cache_http, id, EditMessage::new().content(content))
            .await?;
        self.table.write().await.upsert(id, record);
        Ok(())
    }

    /// Delete a record's owning message.  The deletion event also removes the
    /// index entry, so this is idempotent with the listener path.
    pub async fn delete(&self, ctx: &Context<'_>, id: MessageId) -> Result<()> {
        self.check_writable(ctx)?;
        self.channel.delete_message(ctx.cache_http, id).await?;
        self.table.write().await.remove(id);
        Ok(())
    }

    /// Listener: message created (or refetched in full after an edit) in some
    /// channel.  Decode failure removes any stale entry for that message.
    pub async fn observe_message(&self, ctx: &Context<'_>, msg: &Message) {
        if msg.channel_id != self.channel {
            return;
        }
        let me = ctx.cache.current_user().id;
        if !self.eligible(msg.author.id, me) {
            return;
        }
        let mut table = self.table.write().await;
        match codec::decode(self.schema.fields, &msg.content) {
            Some(record) => {
                table.upsert(msg.id, record);
            }
            None => {
                table.remove(msg.id);
            }
        }
    }

    /// Listener: message edited.  Edit payloads may be partial; fall back to
    /// fetching the full message.
    pub async fn observe_update(
        &self,
        ctx: &Context<'_>,
        new: Option<&Message>,
        event: &MessageUpdateEvent,
    ) -> Result<()> {
        if event.channel_id != self.channel {
            return Ok(());
        }
        match new {
            Some(msg) => self.observe_message(ctx, msg).await,
            None => match self.channel.message(ctx.cache_http, event.id).await {
                Ok(msg) => self.observe_message(ctx, &msg).await,
                // Deleted under us; the delete event cleans up the entry
                Err(_) => {}
            },
        }
        Ok(())
    }

    /// Listener: message deleted.  No-op when no entry exists.
    pub async fn observe_delete(&self, channel_id: ChannelId, id: MessageId) {
        if channel_id != self.channel {
            return;
        }
        self.table.write().await.remove(id);
    }
}

/// Every record store in the process, constructed once at startup.
pub struct Records {
    pub timezones: RecordStore,
}

impl Records {
    pub fn new(cfg: &crate::config::Config) -> Result<Self> {
        let channel = match cfg.records.timezone_channel {
            0 => anyhow::bail!("records.timezone_channel is not set"),
            id => ChannelId::new(id),
        };
        Ok(Self {
            timezones: RecordStore::new(
                crate::plugin::timezone::SCHEMA,
                channel,
                policy::myself(),
            ),
        })
    }

    pub fn all(&self) -> impl Iterator<Item = &RecordStore> {
        std::iter::once(&self.timezones)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Field, FieldKind};

    const SCHEMA: Schema = Schema {
        name: "triple",
        fields: &[
            Field {
                name: "count",
                kind: FieldKind::Int,
            },
            Field {
                name: "label",
                kind: FieldKind::Str,
            },
            Field {
                name: "flag",
                kind: FieldKind::Bool,
            },
        ],
    };

    fn triple(count: i64, label: &str, flag: bool) -> Record {
        Record::new(
            &SCHEMA,
            vec![
                Value::Int(count),
                Value::Str(label.to_owned()),
                Value::Bool(flag),
            ],
        )
        .unwrap()
    }

    #[test]
    fn table_insert_edit_delete_scenario() {
        let mut table = Table::default();
        let id = MessageId::new(10);

        assert!(table.upsert(id, triple(42, "hello", true)));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[&id], triple(42, "hello", true));

        // edit to a new value replaces under the same key
        assert!(table.upsert(id, triple(42, "hello", false)));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[&id], triple(42, "hello", false));

        assert!(table.remove(id));
        assert!(table.rows.is_empty());
    }

    #[test]
    fn duplicate_edit_events_are_idempotent() {
        let mut table = Table::default();
        let id = MessageId::new(10);
        table.upsert(id, triple(1, "a", true));
        assert!(!table.upsert(id, triple(1, "a", true)));
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let mut table = Table::default();
        let id = MessageId::new(10);
        assert!(!table.remove(id));
        table.upsert(id, triple(1, "a", true));
        assert!(table.remove(id));
        assert!(!table.remove(id));
    }

    #[tokio::test]
    async fn rows_before_first_sync_is_an_error() {
        let store = RecordStore::new(SCHEMA, ChannelId::new(1), policy::myself());
        assert!(matches!(
            store.rows().await,
            Err(RecordError::NotSynced("triple"))
        ));
    }

    #[test]
    fn write_policies_gate_the_bot_identity() {
        let me = UserId::new(100);
        let other = UserId::new(200);

        let mine = RecordStore::new(SCHEMA, ChannelId::new(1), policy::myself());
        assert!(mine.writable_by(me));
        assert!(mine.eligible(me, me));
        assert!(!mine.eligible(other, me));

        let theirs = RecordStore::new(SCHEMA, ChannelId::new(1), policy::only(other));
        assert!(!theirs.writable_by(me));
        assert!(theirs.eligible(other, me));

        let open = RecordStore::new(SCHEMA, ChannelId::new(1), policy::anyone());
        assert!(open.writable_by(me));
        assert!(open.eligible(other, me));
    }
}

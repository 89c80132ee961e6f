//! Field values and kinds for channel-backed records.

use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, EmojiId, GuildId, MessageId, RoleId, UserId};

/// The kind of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    Int,
    Float,
    Bool,
    Stamp,
    Channel,
    User,
    Role,
    Emoji,
    MessageLink,
}

/// One named, typed slot in a schema.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// An absolute point in time.  Seconds that Discord can express but chrono
/// cannot are carried through as the raw count rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stamp {
    At(DateTime<Utc>),
    OutOfRange(i64),
}

impl Stamp {
    pub fn from_secs(secs: i64) -> Self {
        match DateTime::from_timestamp(secs, 0) {
            Some(at) => Self::At(at),
            None => Self::OutOfRange(secs),
        }
    }

    pub fn secs(&self) -> i64 {
        match self {
            Self::At(at) => at.timestamp(),
            Self::OutOfRange(secs) => *secs,
        }
    }
}

/// A custom emoji reference.  The name travels on the wire, so it survives
/// the emoji no longer being resolvable.
#[derive(Debug, Clone, PartialEq)]
pub struct EmojiRef {
    pub animated: bool,
    pub name: String,
    pub id: EmojiId,
}

/// A deep link to a message: guild, channel, message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageRef {
    pub guild: GuildId,
    pub channel: ChannelId,
    pub message: MessageId,
}

/// One field value.  Entity references carry the numeric id and their kind;
/// resolving an id against the live cache is the consumer's business, and an
/// id that no longer resolves still round-trips through the wire form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Stamp(Stamp),
    Channel(ChannelId),
    User(UserId),
    Role(RoleId),
    Emoji(EmojiRef),
    MessageLink(MessageRef),
    Null,
}

impl Value {
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::Str(_) => Some(FieldKind::Str),
            Self::Int(_) => Some(FieldKind::Int),
            Self::Float(_) => Some(FieldKind::Float),
            Self::Bool(_) => Some(FieldKind::Bool),
            Self::Stamp(_) => Some(FieldKind::Stamp),
            Self::Channel(_) => Some(FieldKind::Channel),
            Self::User(_) => Some(FieldKind::User),
            Self::Role(_) => Some(FieldKind::Role),
            Self::Emoji(_) => Some(FieldKind::Emoji),
            Self::MessageLink(_) => Some(FieldKind::MessageLink),
            Self::Null => None,
        }
    }

    pub fn fits(&self, kind: FieldKind) -> bool {
        match self.kind() {
            Some(own) => own == kind,
            None => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_wraps_out_of_range_seconds() {
        assert!(matches!(Stamp::from_secs(0), Stamp::At(_)));
        // chrono tops out around year 262143
        let far = i64::MAX / 2;
        assert_eq!(Stamp::from_secs(far), Stamp::OutOfRange(far));
        assert_eq!(Stamp::from_secs(far).secs(), far);
    }

    #[test]
    fn null_fits_every_kind() {
        for kind in [
            FieldKind::Str,
            FieldKind::Int,
            FieldKind::Float,
            FieldKind::Bool,
            FieldKind::Stamp,
            FieldKind::Channel,
            FieldKind::User,
            FieldKind::Role,
            FieldKind::Emoji,
            FieldKind::MessageLink,
        ] {
            assert!(Value::Null.fits(kind));
        }
        assert!(!Value::Int(3).fits(FieldKind::Str));
    }
}

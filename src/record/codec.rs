//! Wire grammar for records.  One record is one line of message content;
//! fields are separated by a single space.  Decoding is strict left-to-right
//! and total: any input that does not match the schema exactly yields `None`
//! rather than an error, because a message that does not parse is simply not
//! one of ours.

use super::value::{EmojiRef, Field, FieldKind, MessageRef, Stamp, Value};
use super::Record;
use serenity::all::{ChannelId, EmojiId, GuildId, MessageId, RoleId, UserId};

const TRUE_GLYPH: &str = "\u{2705}"; // ✅
const FALSE_GLYPH: &str = "\u{274c}"; // ❌
const NULL_GLYPH: &str = "\u{2753}"; // ❓

const MESSAGE_LINK_ROOT: &str = "https://discord.com/channels/";

/// Serialize a record into one line of message content.
pub fn encode(record: &Record) -> String {
    let mut out = String::new();
    for (i, value) in record.values().iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        encode_value(value, &mut out);
    }
    out
}

fn encode_value(value: &Value, out: &mut String) {
    match value {
        Value::Str(s) => encode_str(s, out),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(x) => out.push_str(&x.to_string()),
        Value::Bool(true) => out.push_str(TRUE_GLYPH),
        Value::Bool(false) => out.push_str(FALSE_GLYPH),
        Value::Stamp(stamp) => out.push_str(&format!("<t:{}:R>", stamp.secs())),
        Value::Channel(id) => out.push_str(&format!("<#{}>", id)),
        Value::User(id) => out.push_str(&format!("<@{}>", id)),
        Value::Role(id) => out.push_str(&format!("<@&{}>", id)),
        Value::Emoji(emoji) => {
            let a = if emoji.animated { "a" } else { "" };
            out.push_str(&format!("<{}:{}:{}>", a, emoji.name, emoji.id));
        }
        Value::MessageLink(link) => out.push_str(&format!(
            "{}{}/{}/{}",
            MESSAGE_LINK_ROOT, link.guild, link.channel, link.message
        )),
        Value::Null => out.push_str(NULL_GLYPH),
    }
}

fn encode_str(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Decode one line of message content against a schema.  `None` means the
/// text is not a record of this schema.
pub fn decode(fields: &[Field], text: &str) -> Option<Record> {
    let mut cursor = Cursor { rest: text };
    let mut values = Vec::with_capacity(fields.len());
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            // exactly one whitespace character between fields
            let c = cursor.bump()?;
            if !c.is_whitespace() {
                return None;
            }
        }
        values.push(decode_value(field.kind, &mut cursor)?);
    }
    cursor.rest.is_empty().then(|| Record::from_decoded(values))
}

fn decode_value(kind: FieldKind, cursor: &mut Cursor) -> Option<Value> {
    if cursor.eat(NULL_GLYPH) {
        return Some(Value::Null);
    }
    match kind {
        FieldKind::Str => decode_str(cursor).map(Value::Str),
        FieldKind::Int => decode_int(cursor).map(Value::Int),
        FieldKind::Float => decode_float(cursor).map(Value::Float),
        FieldKind::Bool => {
            if cursor.eat(TRUE_GLYPH) {
                Some(Value::Bool(true))
            } else if cursor.eat(FALSE_GLYPH) {
                Some(Value::Bool(false))
            } else {
                None
            }
        }
        FieldKind::Stamp => decode_stamp(cursor).map(Value::Stamp),
        FieldKind::Channel => {
            cursor.eat("<#").then_some(())?;
            let id = cursor.id()?;
            cursor.eat(">").then_some(())?;
            Some(Value::Channel(ChannelId::new(id)))
        }
        FieldKind::User => {
            cursor.eat("<@").then_some(())?;
            if cursor.peek() == Some('&') {
                return None;
            }
            cursor.eat("!");
            let id = cursor.id()?;
            cursor.eat(">").then_some(())?;
            Some(Value::User(UserId::new(id)))
        }
        FieldKind::Role => {
            cursor.eat("<@&").then_some(())?;
            let id = cursor.id()?;
            cursor.eat(">").then_some(())?;
            Some(Value::Role(RoleId::new(id)))
        }
        FieldKind::Emoji => decode_emoji(cursor).map(Value::Emoji),
        FieldKind::MessageLink => decode_message_link(cursor).map(Value::MessageLink),
    }
}

fn decode_str(cursor: &mut Cursor) -> Option<String> {
    cursor.eat("\"").then_some(())?;
    let mut out = String::new();
    loop {
        match cursor.bump()? {
            '"' => return Some(out),
            '\\' => match cursor.bump()? {
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                '0' => out.push('\0'),
                'x' => {
                    let hi = cursor.bump()?.to_digit(16)?;
                    let lo = cursor.bump()?.to_digit(16)?;
                    out.push(char::from_u32(hi * 16 + lo)?);
                }
                _ => return None,
            },
            c => out.push(c),
        }
    }
}

fn decode_int(cursor: &mut Cursor) -> Option<i64> {
    let token = cursor.take_while(|c| c.is_ascii_digit() || c == '-');
    token.parse().ok()
}

fn decode_float(cursor: &mut Cursor) -> Option<f64> {
    let token = cursor.take_while(|c| {
        c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')
    });
    token.parse().ok()
}

fn decode_stamp(cursor: &mut Cursor) -> Option<Stamp> {
    cursor.eat("<t:").then_some(())?;
    let token = cursor.take_while(|c| c.is_ascii_digit() || c == '-');
    let secs: i64 = token.parse().ok()?;
    if cursor.eat(":") {
        // style letter, e.g. R for relative
        let style = cursor.bump()?;
        if style == '>' {
            return None;
        }
    }
    cursor.eat(">").then_some(())?;
    Some(Stamp::from_secs(secs))
}

fn decode_emoji(cursor: &mut Cursor) -> Option<EmojiRef> {
    let animated = if cursor.eat("<a:") {
        true
    } else if cursor.eat("<:") {
        false
    } else {
        return None;
    };
    let name = cursor.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
    if name.is_empty() {
        return None;
    }
    let name = name.to_owned();
    cursor.eat(":").then_some(())?;
    let id = cursor.id()?;
    cursor.eat(">").then_some(())?;
    Some(EmojiRef {
        animated,
        name,
        id: EmojiId::new(id),
    })
}

fn decode_message_link(cursor: &mut Cursor) -> Option<MessageRef> {
    cursor.eat(MESSAGE_LINK_ROOT).then_some(())?;
    let guild = cursor.id()?;
    cursor.eat("/").then_some(())?;
    let channel = cursor.id()?;
    cursor.eat("/").then_some(())?;
    let message = cursor.id()?;
    Some(MessageRef {
        guild: GuildId::new(guild),
        channel: ChannelId::new(channel),
        message: MessageId::new(message),
    })
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn eat(&mut self, prefix: &str) -> bool {
        match self.rest.strip_prefix(prefix) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.rest = &self.rest[c.len_utf8()..];
        Some(c)
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> &'a str {
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| !keep(*c))
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (token, rest) = self.rest.split_at(end);
        self.rest = rest;
        token
    }

    /// A Discord snowflake: nonzero decimal u64.
    fn id(&mut self) -> Option<u64> {
        let token = self.take_while(|c| c.is_ascii_digit());
        match token.parse() {
            Ok(0) | Err(_) => None,
            Ok(id) => Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn field(kind: FieldKind) -> Field {
        Field { name: "f", kind }
    }

    fn roundtrip(fields: &[Field], values: Vec<Value>) {
        let record = Record::from_decoded(values);
        let line = encode(&record);
        assert_eq!(decode(fields, &line), Some(record), "line: {line:?}");
    }

    #[test]
    fn scalars_roundtrip() {
        roundtrip(&[field(FieldKind::Int)], vec![Value::Int(-42)]);
        roundtrip(&[field(FieldKind::Float)], vec![Value::Float(2.5)]);
        roundtrip(&[field(FieldKind::Float)], vec![Value::Float(-0.125)]);
        roundtrip(&[field(FieldKind::Bool)], vec![Value::Bool(true)]);
        roundtrip(&[field(FieldKind::Bool)], vec![Value::Bool(false)]);
        roundtrip(&[field(FieldKind::Str)], vec![Value::Null]);
    }

    #[test]
    fn strings_roundtrip_with_escapes() {
        for s in [
            "",
            "hello",
            "with space",
            "quote \" backslash \\",
            "newline\ntab\tcr\rnul\0",
            "control \x01\x1f",
            "unicode ❓ works",
        ] {
            roundtrip(&[field(FieldKind::Str)], vec![Value::Str(s.to_owned())]);
        }
    }

    #[test]
    fn null_glyph_inside_a_string_stays_a_string() {
        let line = format!("\"{}\"", NULL_GLYPH);
        let record = decode(&[field(FieldKind::Str)], &line).unwrap();
        assert_eq!(record.get(0).unwrap().as_str(), Some(NULL_GLYPH));
    }

    #[test]
    fn references_roundtrip() {
        roundtrip(
            &[field(FieldKind::Channel)],
            vec![Value::Channel(ChannelId::new(123456))],
        );
        roundtrip(
            &[field(FieldKind::User)],
            vec![Value::User(UserId::new(319753218592866315))],
        );
        roundtrip(&[field(FieldKind::Role)], vec![Value::Role(RoleId::new(7))]);
        roundtrip(
            &[field(FieldKind::Emoji)],
            vec![Value::Emoji(EmojiRef {
                animated: true,
                name: "blob_wave".into(),
                id: EmojiId::new(99),
            })],
        );
        roundtrip(
            &[field(FieldKind::MessageLink)],
            vec![Value::MessageLink(MessageRef {
                guild: GuildId::new(1),
                channel: ChannelId::new(2),
                message: MessageId::new(3),
            })],
        );
    }

    #[test]
    fn uncached_channel_reference_is_a_placeholder_that_reencodes_exactly() {
        let line = "<#999999999999999999>";
        let record = decode(&[field(FieldKind::Channel)], line).unwrap();
        assert_eq!(
            record.get(0),
            Some(&Value::Channel(ChannelId::new(999999999999999999)))
        );
        assert_eq!(encode(&record), line);
    }

    #[test]
    fn nickname_mention_form_decodes_too() {
        let record = decode(&[field(FieldKind::User)], "<@!42>").unwrap();
        assert_eq!(record.get(0).unwrap().as_user(), Some(UserId::new(42)));
        // canonical form on the way back out
        assert_eq!(encode(&record), "<@42>");
    }

    #[test]
    fn stamps_roundtrip_including_out_of_range() {
        roundtrip(
            &[field(FieldKind::Stamp)],
            vec![Value::Stamp(Stamp::from_secs(1690000000))],
        );
        roundtrip(
            &[field(FieldKind::Stamp)],
            vec![Value::Stamp(Stamp::from_secs(-12345))],
        );
        let far = i64::MAX / 2;
        roundtrip(
            &[field(FieldKind::Stamp)],
            vec![Value::Stamp(Stamp::OutOfRange(far))],
        );
    }

    #[test]
    fn stamp_decodes_with_or_without_style() {
        let fields = [field(FieldKind::Stamp)];
        assert_eq!(
            decode(&fields, "<t:1000:R>"),
            decode(&fields, "<t:1000>"),
        );
        assert_eq!(
            decode(&fields, "<t:1000:F>"),
            decode(&fields, "<t:1000>"),
        );
    }

    #[test]
    fn exponent_form_is_accepted_on_decode() {
        let record = decode(&[field(FieldKind::Float)], "1.5e3").unwrap();
        assert_eq!(record.get(0), Some(&Value::Float(1500.0)));
    }

    #[test]
    fn tuples_use_single_space_separators() {
        let fields = [
            field(FieldKind::Int),
            field(FieldKind::Str),
            field(FieldKind::Bool),
        ];
        let record = Record::from_decoded(vec![
            Value::Int(42),
            Value::Str("hello".into()),
            Value::Bool(true),
        ]);
        let line = encode(&record);
        assert_eq!(line, format!("42 \"hello\" {}", TRUE_GLYPH));
        assert_eq!(decode(&fields, &line), Some(record.clone()));
        // any single whitespace character separates on decode
        assert_eq!(
            decode(&fields, &line.replace(' ', "\t")),
            Some(record.clone())
        );
        // but not two
        assert_eq!(decode(&fields, &line.replace(' ', "  ")), None);
    }

    #[test]
    fn decode_is_total_over_junk() {
        let fields = [
            field(FieldKind::Int),
            field(FieldKind::Str),
            field(FieldKind::Bool),
        ];
        for junk in [
            "",
            " ",
            "hello there",
            "42",
            "42 \"unterminated",
            "42 \"hello\"",
            "42 \"hello\" maybe",
            "42 \"hello\" ✅ trailing",
            "42 \"bad escape \\q\" ✅",
            "42 \"hex \\xzz\" ✅",
            "<#0>",
            "<#not-a-number>",
            "999999999999999999999999999999 \"x\" ✅",
            "https://discord.com/channels/1/2",
            "<t:99999999999999999999999999>",
            "<@&12",
        ] {
            assert_eq!(decode(&fields, junk), None, "junk: {junk:?}");
            assert_eq!(decode(&[field(FieldKind::Channel)], junk), None);
            assert_eq!(decode(&[field(FieldKind::Stamp)], junk), None);
            assert_eq!(decode(&[field(FieldKind::MessageLink)], junk), None);
        }
    }

    #[test]
    fn mention_letters_stay_distinct() {
        // a role mention is not a user mention and vice versa
        assert_eq!(decode(&[field(FieldKind::User)], "<@&5>"), None);
        assert_eq!(decode(&[field(FieldKind::Role)], "<@5>"), None);
        assert_eq!(decode(&[field(FieldKind::Channel)], "<@5>"), None);
    }
}

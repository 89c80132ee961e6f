//! Per-author proxy prediction state.  Learned opportunistically from
//! observed outcomes and deliberately never persisted.

use serenity::all::GuildId;
use std::collections::HashMap;

/// One trigger: a prefix/suffix pair mapped to the member name the proxied
/// message will post under.  Either side may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRule {
    pub prefix: String,
    pub suffix: String,
    pub member: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    /// Trigger tags in definition order; the first match wins.
    pub tags: Vec<TagRule>,
    /// Standing per-guild "currently autoproxying as" pointer.
    pub autoproxy: HashMap<GuildId, String>,
}

impl ProxySettings {
    /// Predict the member name a message is about to be proxied as, if any.
    ///
    /// A leading `\\` drops the standing autoproxy for the guild; a leading
    /// `\` (which the `\\` case also is) suppresses prediction for this one
    /// message without touching the tag rules.
    pub fn predict(&mut self, content: &str, guild: Option<GuildId>) -> Option<String> {
        for rule in &self.tags {
            if (rule.prefix.is_empty() || content.starts_with(&rule.prefix))
                && (rule.suffix.is_empty() || content.ends_with(&rule.suffix))
            {
                return Some(rule.member.clone());
            }
        }
        if content.starts_with("\\\\") {
            if let Some(guild) = guild {
                self.autoproxy.remove(&guild);
            }
        }
        if content.starts_with('\\') {
            return None;
        }
        guild.and_then(|guild| self.autoproxy.get(&guild).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(prefix: &str, suffix: &str, member: &str) -> TagRule {
        TagRule {
            prefix: prefix.to_owned(),
            suffix: suffix.to_owned(),
            member: member.to_owned(),
        }
    }

    #[test]
    fn tags_match_prefix_and_suffix() {
        let mut settings = ProxySettings {
            tags: vec![rule("a:", "", "Alice"), rule("", "-b", "Bob")],
            autoproxy: HashMap::new(),
        };
        let guild = Some(GuildId::new(1));
        assert_eq!(settings.predict("a: hi", guild).as_deref(), Some("Alice"));
        assert_eq!(settings.predict("hi -b", guild).as_deref(), Some("Bob"));
        assert_eq!(settings.predict("plain", guild), None);
        // first matching rule wins
        assert_eq!(settings.predict("a: hi -b", guild).as_deref(), Some("Alice"));
    }

    #[test]
    fn standing_autoproxy_applies_to_untagged_messages() {
        let guild = GuildId::new(1);
        let mut settings = ProxySettings::default();
        settings.autoproxy.insert(guild, "Alice".to_owned());

        assert_eq!(
            settings.predict("hello", Some(guild)).as_deref(),
            Some("Alice")
        );
        // other guilds are unaffected
        assert_eq!(settings.predict("hello", Some(GuildId::new(2))), None);
        assert_eq!(settings.predict("hello", None), None);
    }

    #[test]
    fn single_backslash_suppresses_without_clearing() {
        let guild = GuildId::new(1);
        let mut settings = ProxySettings::default();
        settings.autoproxy.insert(guild, "Alice".to_owned());

        assert_eq!(settings.predict("\\quiet", Some(guild)), None);
        // the flag survives
        assert_eq!(
            settings.predict("hello", Some(guild)).as_deref(),
            Some("Alice")
        );
    }

    #[test]
    fn double_backslash_clears_the_standing_flag() {
        let guild = GuildId::new(1);
        let mut settings = ProxySettings::default();
        settings.autoproxy.insert(guild, "Alice".to_owned());

        assert_eq!(settings.predict("\\\\done", Some(guild)), None);
        assert_eq!(settings.predict("hello", Some(guild)), None);
    }

    #[test]
    fn tags_win_over_escapes() {
        // a tag whose prefix is a backslash still proxies
        let mut settings = ProxySettings {
            tags: vec![rule("\\", "", "Slash")],
            autoproxy: HashMap::new(),
        };
        assert_eq!(
            settings.predict("\\hi", Some(GuildId::new(1))).as_deref(),
            Some("Slash")
        );
    }
}

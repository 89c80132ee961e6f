//! Client for the proxy service's lookup API.

use anyhow::Result;
use serde::Deserialize;
use serenity::all::MessageId;
use std::time::Duration;

const API_ROOT: &str = "https://api.pluralkit.me/v2";
const USER_AGENT: &str = "chitterbot (https://github.com/qwd/chitterbot)";

/// What the service knows about a ghost-post it produced.
#[derive(Debug, Deserialize)]
pub struct ProxiedMessage {
    /// Id of the now-deleted original message, as a decimal string.
    pub original: String,
    pub member: Member,
    pub system: System,
}

#[derive(Debug, Deserialize)]
pub struct System {
    pub id: String,
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Member {
    pub name: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub proxy_tags: Vec<ProxyTag>,
}

#[derive(Debug, Deserialize)]
pub struct ProxyTag {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimited {
    /// Milliseconds to wait before retrying.
    retry_after: u64,
}

/// The display name a proxied message posts under.
pub fn proxied_name(member: &Member, system: &System) -> String {
    let name = member.display_name.as_deref().unwrap_or(&member.name);
    match system.tag.as_deref() {
        Some(tag) if !tag.is_empty() => format!("{} {}", name, tag),
        _ => name.to_owned(),
    }
}

/// Look up whether a message is a known ghost-post.  `None` means the
/// service has no record of it.
pub async fn message(id: MessageId) -> Result<Option<ProxiedMessage>> {
    get(&format!("/messages/{}", id)).await
}

/// Member list (with trigger tag definitions) for a system.
pub async fn members(system: &str) -> Result<Option<Vec<Member>>> {
    get(&format!("/systems/{}/members", system)).await
}

async fn get<T: serde::de::DeserializeOwned>(endpoint: &str) -> Result<Option<T>> {
    let client = reqwest::Client::new();
    loop {
        let response = client
            .get(format!("{}{}", API_ROOT, endpoint))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            // The service says exactly how long to back off
            let limited: RateLimited = response.json().await?;
            tokio::time::sleep(Duration::from_millis(limited.retry_after)).await;
            continue;
        }
        if !response.status().is_success() {
            return Ok(None);
        }
        return response.json().await.map(Some).map_err(Into::into);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, display_name: Option<&str>) -> Member {
        Member {
            name: name.to_owned(),
            display_name: display_name.map(str::to_owned),
            proxy_tags: Vec::new(),
        }
    }

    #[test]
    fn proxied_name_prefers_display_name_and_appends_system_tag() {
        let system = System {
            id: "abcde".to_owned(),
            tag: Some("| qwd".to_owned()),
        };
        assert_eq!(
            proxied_name(&member("alice", Some("Alice")), &system),
            "Alice | qwd"
        );
        assert_eq!(proxied_name(&member("alice", None), &system), "alice | qwd");

        let untagged = System {
            id: "abcde".to_owned(),
            tag: None,
        };
        assert_eq!(proxied_name(&member("alice", None), &untagged), "alice");
    }
}

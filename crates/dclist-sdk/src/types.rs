//! dclist API types.
//!
//! Entity fields are optional: the server only returns what the field
//! selector asked for.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DclistError;

/// Discord snowflake id.
pub type Snowflake = String;

/// Bot prefix kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrefixType {
    Static,
    Dynamic,
}

/// Comment kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommentType {
    Parent,
    Reply,
}

/// Site role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Controller,
    Mod,
    Admin,
    Root,
}

/// Subscribable push event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    /// Someone voted for the bot.
    #[serde(rename = "SDK_NEW_VOTE")]
    NewVote,
    /// Someone commented on the bot.
    #[serde(rename = "SDK_NEW_COMMENT")]
    NewComment,
}

impl Topic {
    /// Every topic, in canonical order.
    pub const ALL: [Self; 2] = [Self::NewVote, Self::NewComment];

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewVote => "SDK_NEW_VOTE",
            Self::NewComment => "SDK_NEW_COMMENT",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive parse of a wire name.
impl FromStr for Topic {
    type Err = DclistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DclistError::invalid_argument(format!("Topic \"{s}\" is invalid")))
    }
}

/// Aggregate bot statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub guild_count: Option<u64>,
    pub user_count: Option<u64>,
    pub shard_count: Option<u64>,
    /// Estimated.
    pub vote_count: Option<u64>,
    /// Estimated.
    pub comment_count: Option<u64>,
}

/// Stats reported by the bot itself (`BotStatsInput`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStats {
    pub guild_count: u64,
    pub user_count: u64,
    /// Always at least 1.
    pub shard_count: u64,
}

/// A listed bot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    pub id: Option<Snowflake>,
    pub username: Option<String>,
    /// Avatar hash.
    pub avatar: Option<String>,
    pub discriminator: Option<String>,
    #[serde(rename = "public_flags")]
    pub public_flags: Option<u64>,
    pub bot: Option<bool>,
    pub owner: Option<Box<User>>,
    pub prefix: Option<String>,
    pub prefix_type: Option<PrefixType>,
    /// Short summary.
    pub summary: Option<String>,
    /// Long description.
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Repository link.
    pub github: Option<String>,
    pub website: Option<String>,
    /// Support server invite.
    pub support: Option<String>,
    pub invite: Option<String>,
    pub stats: Option<Stats>,
}

/// A site user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Option<Snowflake>,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub discriminator: Option<String>,
    #[serde(rename = "public_flags")]
    pub public_flags: Option<u64>,
    pub bot: Option<bool>,
    pub biography: Option<String>,
    pub github: Option<String>,
    pub website: Option<String>,
    /// Ids of comments this user liked.
    pub liked_comments: Option<Vec<String>>,
    pub bots: Option<Vec<Bot>>,
    pub role: Option<Role>,
}

/// A comment on a bot page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Document id; the default subscription selector only asks for this.
    #[serde(rename = "_id")]
    pub object_id: Option<String>,
    pub author: Option<User>,
    pub subject: Option<Bot>,
    pub reply: Option<Box<Comment>>,
    #[serde(rename = "type")]
    pub kind: Option<CommentType>,
    pub content: Option<String>,
    pub like: Option<i64>,
}

/// Payload of a [`Topic::NewVote`] update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVotePayload {
    /// The voter.
    pub user: User,
}

/// Payload of a [`Topic::NewComment`] update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCommentPayload {
    pub comment: Comment,
}

/// One `sdkUpdates` item: `{ "type": <topic>, "payload": {...} }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SdkUpdate {
    #[serde(rename = "SDK_NEW_VOTE")]
    NewVote(NewVotePayload),
    #[serde(rename = "SDK_NEW_COMMENT")]
    NewComment(NewCommentPayload),
}

impl SdkUpdate {
    /// Topic this update belongs to.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::NewVote(_) => Topic::NewVote,
            Self::NewComment(_) => Topic::NewComment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn topic_parse_is_case_insensitive() {
        assert_eq!("SDK_NEW_VOTE".parse::<Topic>().unwrap(), Topic::NewVote);
        assert_eq!("sdk_new_comment".parse::<Topic>().unwrap(), Topic::NewComment);
        let err = "SDK_NEW_STAR".parse::<Topic>().unwrap_err();
        assert_eq!(err.to_string(), "Topic \"SDK_NEW_STAR\" is invalid");
    }

    #[test]
    fn update_decodes_adjacently_tagged() {
        let update: SdkUpdate = serde_json::from_value(json!({
            "type": "SDK_NEW_VOTE",
            "payload": { "user": { "id": "123456789012345678", "username": "voter" } }
        }))
        .unwrap();
        assert_eq!(update.topic(), Topic::NewVote);
        let SdkUpdate::NewVote(payload) = update else {
            panic!("expected vote");
        };
        assert_eq!(payload.user.username.as_deref(), Some("voter"));
        assert_eq!(payload.user.github, None);
    }

    #[test]
    fn unknown_update_type_does_not_decode() {
        let result = serde_json::from_value::<SdkUpdate>(json!({
            "type": "SDK_NEW_STAR",
            "payload": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn bot_stats_serialize_camel_case() {
        let stats = BotStats {
            guild_count: 10,
            user_count: 200,
            shard_count: 1,
        };
        assert_eq!(
            serde_json::to_value(stats).unwrap(),
            json!({ "guildCount": 10, "userCount": 200, "shardCount": 1 })
        );
    }

    #[test]
    fn partial_bot_decodes() {
        let bot: Bot = serde_json::from_value(json!({
            "id": "123456789012345678",
            "prefixType": "DYNAMIC",
            "stats": { "guildCount": 5 }
        }))
        .unwrap();
        assert_eq!(bot.prefix_type, Some(PrefixType::Dynamic));
        assert_eq!(bot.stats.and_then(|s| s.guild_count), Some(5));
    }
}

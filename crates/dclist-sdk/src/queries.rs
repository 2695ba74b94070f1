//! Fixed operation catalog.

use crate::selector::FieldSelector;
use crate::types::Topic;

/// Generic selection-set placeholder.
pub const FIELDS_PLACEHOLDER: &str = "$FIELDS$";

/// Placeholder for the voter selection in the subscription document.
pub const VOTE_USER_PLACEHOLDER: &str = "$FIELDS:VOTE:USER$";

/// Placeholder for the comment selection in the subscription document.
pub const COMMENT_PLACEHOLDER: &str = "$FIELDS:VOTE:COMMENT$";

/// Supported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetBotById,
    GetUserById,
    GetUserComment,
    IsUserVoted,
    PostBotStats,
    SubscribeToTopics,
}

/// One fixed operation document.
#[derive(Debug, Clone, Copy)]
pub struct QueryTemplate {
    /// GraphQL operation name.
    pub operation_name: &'static str,
    /// Document text with placeholders.
    pub document: &'static str,
    /// Key of the payload inside `data`.
    pub result_key: &'static str,
    /// Placeholders the executor fills.
    pub placeholders: &'static [&'static str],
    default_selector: Option<fn() -> FieldSelector>,
}

impl QueryTemplate {
    /// Look up the template for `operation`.
    #[must_use]
    pub fn get(operation: Operation) -> &'static Self {
        match operation {
            Operation::GetBotById => &GET_BOT_BY_ID,
            Operation::GetUserById => &GET_USER_BY_ID,
            Operation::GetUserComment => &GET_USER_COMMENT,
            Operation::IsUserVoted => &IS_USER_VOTED,
            Operation::PostBotStats => &POST_BOT_STATS,
            Operation::SubscribeToTopics => &SUBSCRIBE_TO_TOPICS,
        }
    }

    /// Selector used when the caller passes none.
    #[must_use]
    pub fn default_selector(&self) -> Option<FieldSelector> {
        self.default_selector.map(|build| build())
    }

    /// Whether the document has the generic `$FIELDS$` slot.
    #[must_use]
    pub fn has_fields_placeholder(&self) -> bool {
        self.placeholders.contains(&FIELDS_PLACEHOLDER)
    }

    /// Whether the operation is a mutation.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        self.document.starts_with("mutation")
    }
}

static GET_BOT_BY_ID: QueryTemplate = QueryTemplate {
    operation_name: "getBotById",
    document: "query getBotById($botId: String!) { getBot(botId: $botId) { $FIELDS$ } }",
    result_key: "getBot",
    placeholders: &[FIELDS_PLACEHOLDER],
    default_selector: Some(default_bot_selector),
};

static GET_USER_BY_ID: QueryTemplate = QueryTemplate {
    operation_name: "getUser",
    document: "query getUser($userId: String!) { getUser(userId: $userId) { $FIELDS$ } }",
    result_key: "getUser",
    placeholders: &[FIELDS_PLACEHOLDER],
    default_selector: Some(default_user_selector),
};

static GET_USER_COMMENT: QueryTemplate = QueryTemplate {
    operation_name: "getUserComment",
    document: "query getUserComment($userId: String!) { getUserComment(userId: $userId) { $FIELDS$ } }",
    result_key: "getUserComment",
    placeholders: &[FIELDS_PLACEHOLDER],
    default_selector: Some(default_comment_selector),
};

static IS_USER_VOTED: QueryTemplate = QueryTemplate {
    operation_name: "isUserVoted",
    document: "query isUserVoted($userId: String!) { isUserVoted(userId: $userId) }",
    result_key: "isUserVoted",
    placeholders: &[],
    default_selector: None,
};

static POST_BOT_STATS: QueryTemplate = QueryTemplate {
    operation_name: "postBotStats",
    document: "mutation postBotStats($stats: BotStatsInput!) { postBotStats(stats: $stats) }",
    result_key: "postBotStats",
    placeholders: &[],
    default_selector: None,
};

static SUBSCRIBE_TO_TOPICS: QueryTemplate = QueryTemplate {
    operation_name: "SDKUpdateSubcription",
    document: "subscription SDKUpdateSubcription($topics: [SDKUpdateTypeEnum!]!) { sdkUpdates(topics: $topics) { type payload { ... on NewVoteSDKUpdatePayload { user { $FIELDS:VOTE:USER$ } } ... on NewCommentSDKUpdatePayload { comment { $FIELDS:VOTE:COMMENT$ } } } } }",
    result_key: "sdkUpdates",
    placeholders: &[VOTE_USER_PLACEHOLDER, COMMENT_PLACEHOLDER],
    default_selector: None,
};

fn discord_user_fields() -> FieldSelector {
    FieldSelector::builder()
        .fields(["id", "username", "discriminator", "avatar"])
        .build()
}

fn default_bot_selector() -> FieldSelector {
    FieldSelector::builder()
        .fields(["id", "username", "discriminator", "avatar"])
        .nested(
            "stats",
            FieldSelector::builder()
                .fields(["userCount", "guildCount", "voteCount"])
                .build(),
        )
        .fields(["prefix", "prefixType", "website", "github", "tags"])
        .build()
}

fn default_user_selector() -> FieldSelector {
    FieldSelector::builder()
        .fields(["id", "username", "discriminator", "avatar", "website", "github"])
        .build()
}

fn default_comment_selector() -> FieldSelector {
    FieldSelector::builder()
        .nested("subject", discord_user_fields())
        .nested("author", discord_user_fields())
        .fields(["type", "like", "content"])
        .build()
}

/// Built-in selection for a topic's payload.
#[must_use]
pub fn default_topic_selector(topic: Topic) -> FieldSelector {
    match topic {
        Topic::NewVote => default_user_selector(),
        Topic::NewComment => FieldSelector::builder().field("_id").build(),
    }
}

/// Placeholder a topic's selection is spliced into.
#[must_use]
pub const fn topic_placeholder(topic: Topic) -> &'static str {
    match topic {
        Topic::NewVote => VOTE_USER_PLACEHOLDER,
        Topic::NewComment => COMMENT_PLACEHOLDER,
    }
}

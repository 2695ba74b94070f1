//! Events published by [`crate::GatewayClient`].

use crate::error::DclistError;
use crate::types::{NewCommentPayload, NewVotePayload, SdkUpdate, Topic};

/// One item on the client's event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// A user voted for the bot.
    NewVote(NewVotePayload),
    /// A user commented on the bot.
    NewComment(NewCommentPayload),
    /// A subscription document was issued on an acknowledged connection.
    Subscribed,
    /// An API error pushed by the server, an undecodable push message, or a
    /// dropped connection.
    Error(DclistError),
}

impl GatewayEvent {
    /// Topic of an update event.
    #[must_use]
    pub const fn topic(&self) -> Option<Topic> {
        match self {
            Self::NewVote(_) => Some(Topic::NewVote),
            Self::NewComment(_) => Some(Topic::NewComment),
            Self::Subscribed | Self::Error(_) => None,
        }
    }

    /// The error carried by [`GatewayEvent::Error`].
    #[must_use]
    pub const fn as_error(&self) -> Option<&DclistError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SdkUpdate> for GatewayEvent {
    fn from(update: SdkUpdate) -> Self {
        match update {
            SdkUpdate::NewVote(payload) => Self::NewVote(payload),
            SdkUpdate::NewComment(payload) => Self::NewComment(payload),
        }
    }
}

impl From<DclistError> for GatewayEvent {
    fn from(err: DclistError) -> Self {
        Self::Error(err)
    }
}

//! Topic subscriptions.
//!
//! [`SubscriptionManager`] validates topics and per-topic selectors, keeps
//! the accumulated topic set, renders the combined subscription document and
//! hands it to the connection task. Nothing is sent with the test token.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::config::TEST_TOKEN;
use crate::error::{DclistError, DclistResult};
use crate::events::GatewayEvent;
use crate::gateway::{ConnectionState, GatewayHandle, GatewaySettings};
use crate::operation::{GraphqlRequest, GraphqlResponse};
use crate::queries::{Operation, QueryTemplate, default_topic_selector, topic_placeholder};
use crate::selector::FieldSelector;
use crate::types::{SdkUpdate, Topic};
use crate::validate::dedupe_case_insensitive;

/// Per-topic field selectors, keyed by topic name as the caller spelled it.
#[derive(Debug, Clone, Default)]
pub struct TopicSelectors {
    entries: Vec<(String, FieldSelector)>,
}

impl TopicSelectors {
    /// No custom selectors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a selector for `topic`.
    #[must_use]
    pub fn with(mut self, topic: impl Into<String>, selector: FieldSelector) -> Self {
        self.insert(topic, selector);
        self
    }

    /// Add a selector for `topic`.
    pub fn insert(&mut self, topic: impl Into<String>, selector: FieldSelector) {
        self.entries.push((topic.into(), selector));
    }

    /// Whether no selectors were given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSelector)> {
        self.entries
            .iter()
            .map(|(topic, selector)| (topic.as_str(), selector))
    }
}

impl<S: Into<String>> FromIterator<(S, FieldSelector)> for TopicSelectors {
    fn from_iter<I: IntoIterator<Item = (S, FieldSelector)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(topic, selector)| (topic.into(), selector))
                .collect(),
        }
    }
}

/// Dedupe then check every topic against the closed set, keeping the
/// caller's first-seen spelling next to the parsed topic.
fn accept_topics<'a, I>(topics: I) -> DclistResult<Vec<(String, Topic)>>
where
    I: IntoIterator<Item = &'a str>,
{
    dedupe_case_insensitive(topics)
        .into_iter()
        .map(|name| name.parse::<Topic>().map(|topic| (name.to_owned(), topic)))
        .collect()
}

fn selector_topic(key: &str) -> DclistResult<Topic> {
    key.parse().map_err(|_| {
        DclistError::invalid_argument(format!("Invalid topic \"{key}\" for custom field selector"))
    })
}

fn invalid_selector(key: &str) -> DclistError {
    DclistError::invalid_argument(format!("Invalid field selector for \"{key}\" topic"))
}

/// Render the combined subscription document. Topics without a selector get
/// the built-in one.
#[must_use]
pub fn build_document(selectors: &BTreeMap<Topic, FieldSelector>) -> String {
    Topic::ALL
        .into_iter()
        .fold(
            QueryTemplate::get(Operation::SubscribeToTopics).document.to_string(),
            |document, topic| {
                let selector = selectors
                    .get(&topic)
                    .cloned()
                    .unwrap_or_else(|| default_topic_selector(topic));
                document.replacen(topic_placeholder(topic), selector.serialized(), 1)
            },
        )
}

/// Turn one `next` payload into an update.
///
/// # Errors
/// The first GraphQL error wins; a payload with neither errors nor an update
/// is [`DclistError::cannot_receive_data`].
pub fn decode_update(response: GraphqlResponse) -> DclistResult<SdkUpdate> {
    if let Some(error) = response.errors.into_iter().next() {
        return Err(error.into());
    }
    let result_key = QueryTemplate::get(Operation::SubscribeToTopics).result_key;
    let update = response
        .data
        .and_then(|mut data| data.get_mut(result_key).map(Value::take))
        .filter(|update| !update.is_null())
        .ok_or_else(DclistError::cannot_receive_data)?;
    Ok(serde_json::from_value(update)?)
}

#[derive(Debug, Default)]
struct SubscriptionState {
    topics: Vec<Topic>,
    selectors: BTreeMap<Topic, FieldSelector>,
    connection: Option<GatewayHandle>,
}

/// Owns the client's single subscription connection.
#[derive(Debug)]
pub struct SubscriptionManager {
    settings: GatewaySettings,
    events: broadcast::Sender<GatewayEvent>,
    status: Arc<watch::Sender<ConnectionState>>,
    state: Mutex<SubscriptionState>,
}

impl SubscriptionManager {
    pub(crate) fn new(settings: GatewaySettings, events: broadcast::Sender<GatewayEvent>) -> Self {
        let (status, _) = watch::channel(ConnectionState::Idle);
        Self {
            settings,
            events,
            status: Arc::new(status),
            state: Mutex::new(SubscriptionState::default()),
        }
    }

    /// Subscribe to `topics`, optionally overriding the fields each topic
    /// returns. Topics accumulate across calls; the connection is opened on
    /// the first call and reused afterwards.
    ///
    /// Returns this call's topics as spelled by the caller, deduplicated
    /// case-insensitively in first-seen order. The wire always carries the
    /// canonical topic names.
    ///
    /// # Errors
    /// Returns [`DclistError::InvalidArgument`] for an unknown topic or an
    /// unknown selector key, before any network activity. A failed call
    /// leaves the recorded topics and selectors untouched.
    pub fn subscribe_to(
        &self,
        topics: &[&str],
        selectors: &TopicSelectors,
    ) -> DclistResult<Vec<String>> {
        let accepted = accept_topics(topics.iter().copied())?;
        let selectors = selectors
            .iter()
            .map(|(key, selector)| selector_topic(key).map(|topic| (topic, selector.clone())))
            .collect::<DclistResult<Vec<_>>>()?;
        self.register(accepted, selectors)
    }

    /// Untyped variant of [`Self::subscribe_to`] for JSON-driven callers:
    /// `topics` must be an array of strings and `selectors` an object mapping
    /// topic names to selector objects (see [`FieldSelector::from_value`]).
    /// `null` selector values are ignored.
    ///
    /// # Errors
    /// Returns [`DclistError::InvalidArgument`] naming the first offending
    /// topic, key or selector.
    pub fn subscribe_to_value(
        &self,
        topics: &Value,
        selectors: Option<&Value>,
    ) -> DclistResult<Vec<String>> {
        let Some(topics) = topics.as_array() else {
            return Err(DclistError::invalid_argument(
                "You need to pass topics as an array",
            ));
        };
        let names = topics
            .iter()
            .map(|topic| {
                topic.as_str().ok_or_else(|| {
                    DclistError::invalid_argument(format!("Topic \"{topic}\" is invalid"))
                })
            })
            .collect::<DclistResult<Vec<_>>>()?;
        let accepted = accept_topics(names)?;

        let entries = match selectors {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(map)) => map
                .iter()
                .filter(|(_, selector)| !selector.is_null())
                .collect(),
            Some(_) => {
                return Err(DclistError::invalid_argument(
                    "You need to pass field selectors as an object",
                ));
            }
        };
        let keyed = entries
            .into_iter()
            .map(|(key, selector)| selector_topic(key).map(|topic| (key, topic, selector)))
            .collect::<DclistResult<Vec<_>>>()?;
        let selectors = keyed
            .into_iter()
            .map(|(key, topic, selector)| {
                FieldSelector::from_value(selector)
                    .map(|selector| (topic, selector))
                    .map_err(|_| invalid_selector(key))
            })
            .collect::<DclistResult<Vec<_>>>()?;

        self.register(accepted, selectors)
    }

    /// Every topic subscribed so far, in first-subscribed order.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        self.lock().topics.clone()
    }

    /// Watch the connection lifecycle.
    #[must_use]
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    fn register(
        &self,
        accepted: Vec<(String, Topic)>,
        selectors: Vec<(Topic, FieldSelector)>,
    ) -> DclistResult<Vec<String>> {
        let mut state = self.lock();
        let mut topics = state.topics.clone();
        for (_, topic) in &accepted {
            if !topics.contains(topic) {
                topics.push(*topic);
            }
        }
        let mut merged = state.selectors.clone();
        merged.extend(selectors);

        let request = GraphqlRequest::new(build_document(&merged))
            .with_variables(Some(json!({ "topics": topics })))
            .with_operation_name(QueryTemplate::get(Operation::SubscribeToTopics).operation_name);
        let names: Vec<String> = accepted.into_iter().map(|(name, _)| name).collect();

        if self.settings.token == TEST_TOKEN {
            state.topics = topics;
            state.selectors = merged;
            self.status.send_replace(ConnectionState::TestMode);
            debug!(topics = ?names, "Test token, subscription not sent");
            return Ok(names);
        }

        let delivered = state
            .connection
            .as_ref()
            .is_some_and(|handle| handle.send(request.clone()));
        if !delivered {
            state.connection = Some(GatewayHandle::spawn(
                &self.settings,
                request,
                self.events.clone(),
                Arc::clone(&self.status),
            )?);
        }
        state.topics = topics;
        state.selectors = merged;
        info!(topics = ?state.topics, "Subscription updated");
        Ok(names)
    }

    fn lock(&self) -> MutexGuard<'_, SubscriptionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

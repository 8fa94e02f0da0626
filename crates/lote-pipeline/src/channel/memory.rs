use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::{
    ChannelError, ChannelResult, Delivery, MessageChannel, Publisher, Subscription,
};

#[derive(Default)]
struct State {
    topics: HashMap<String, Vec<Vec<u8>>>,
    /// (topic, group) -> offset of the next unread message
    committed: HashMap<(String, String), u64>,
    unavailable: bool,
    publish_calls: usize,
    failing_calls: HashSet<usize>,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// In-memory [`MessageChannel`].
///
/// A subscription ends as soon as it has read everything currently in the
/// topic. Publish failures and cancellations can be injected by call number.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every payload published to `topic` so far.
    pub fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        lock(&self.state).topics.get(topic).cloned().unwrap_or_default()
    }

    /// Append a payload directly, bypassing publishers and failure injection.
    pub fn push_raw(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        lock(&self.state)
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(payload.into());
    }

    /// Offset of the next message `group` will read on `topic`, if it ever committed.
    pub fn committed(&self, topic: &str, group: &str) -> Option<u64> {
        lock(&self.state)
            .committed
            .get(&(topic.to_string(), group.to_string()))
            .copied()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    /// Fail the given publish calls, counted from zero across all publishers.
    pub fn fail_publish_calls(&self, calls: impl IntoIterator<Item = usize>) {
        lock(&self.state).failing_calls.extend(calls);
    }

    /// Cancel `token` right after publish call `call` has been stored.
    pub fn cancel_after_publish(&self, call: usize, token: CancellationToken) {
        lock(&self.state).cancel_after = Some((call, token));
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn publisher(&self, topic: &str) -> ChannelResult<Box<dyn Publisher>> {
        if lock(&self.state).unavailable {
            return Err(ChannelError::unavailable("memory channel switched off"));
        }
        Ok(Box::new(MemoryPublisher {
            state: Arc::clone(&self.state),
            topic: topic.to_string(),
        }))
    }

    async fn subscribe(&self, topic: &str, group: &str) -> ChannelResult<Box<dyn Subscription>> {
        let state = lock(&self.state);
        if state.unavailable {
            return Err(ChannelError::unavailable("memory channel switched off"));
        }
        let key = (topic.to_string(), group.to_string());
        let cursor = state.committed.get(&key).copied().unwrap_or(0);
        Ok(Box::new(MemorySubscription {
            state: Arc::clone(&self.state),
            key,
            cursor,
        }))
    }
}

struct MemoryPublisher {
    state: Arc<Mutex<State>>,
    topic: String,
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&mut self, payload: &[u8]) -> ChannelResult<()> {
        let mut state = lock(&self.state);
        let call = state.publish_calls;
        state.publish_calls += 1;

        if state.unavailable || state.failing_calls.contains(&call) {
            return Err(ChannelError::Publish {
                topic: self.topic.clone(),
                reason: format!("publish call {call} rejected"),
            });
        }

        state
            .topics
            .entry(self.topic.clone())
            .or_default()
            .push(payload.to_vec());
        if let Some((at, token)) = &state.cancel_after {
            if *at == call {
                token.cancel();
            }
        }
        Ok(())
    }
}

struct MemorySubscription {
    state: Arc<Mutex<State>>,
    key: (String, String),
    cursor: u64,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> ChannelResult<Option<Delivery>> {
        let state = lock(&self.state);
        if state.unavailable {
            return Err(ChannelError::unavailable("memory channel switched off"));
        }
        let payload = state
            .topics
            .get(&self.key.0)
            .and_then(|messages| messages.get(usize::try_from(self.cursor).ok()?))
            .cloned();

        Ok(payload.map(|payload| {
            let delivery = Delivery {
                offset: self.cursor,
                payload,
            };
            self.cursor += 1;
            delivery
        }))
    }

    async fn commit(&mut self, offset: u64) -> ChannelResult<()> {
        lock(&self.state).committed.insert(self.key.clone(), offset + 1);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resumes_after_commit() {
        let channel = MemoryChannel::new();
        let mut publisher = channel.publisher("t").await.unwrap();
        for payload in [b"a", b"b", b"c"] {
            publisher.publish(payload).await.unwrap();
        }

        let mut sub = channel.subscribe("t", "g").await.unwrap();
        let first = sub.next().await.unwrap().unwrap();
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!((first.offset, second.offset), (0, 1));
        sub.commit(second.offset).await.unwrap();

        let mut again = channel.subscribe("t", "g").await.unwrap();
        assert_eq!(again.next().await.unwrap().unwrap().payload, b"c".to_vec());
        assert!(again.next().await.unwrap().is_none());

        // other groups start from the beginning
        let mut other = channel.subscribe("t", "h").await.unwrap();
        assert_eq!(other.next().await.unwrap().unwrap().offset, 0);
    }

    #[tokio::test]
    async fn test_injected_publish_failures() {
        let channel = MemoryChannel::new();
        channel.fail_publish_calls([1]);
        let mut publisher = channel.publisher("t").await.unwrap();

        assert!(publisher.publish(b"0").await.is_ok());
        assert!(publisher.publish(b"1").await.is_err());
        assert!(publisher.publish(b"2").await.is_ok());
        assert_eq!(channel.messages("t"), vec![b"0".to_vec(), b"2".to_vec()]);
    }
}

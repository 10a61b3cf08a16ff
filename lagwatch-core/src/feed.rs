// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Change notifications feeding the controller.
//!
//! Every source (function definitions, topic definitions, deployment
//! status) funnels into one bounded queue of [`Event`]s so the controller
//! handles them strictly one at a time.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{LagwatchError, LagwatchResult};
use crate::types::{DeploymentStatus, Function, Topic};

/// Lifecycle notification for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent<T> {
    Added(T),
    Updated(T),
    Deleted(T),
}

impl<T> ResourceEvent<T> {
    pub fn resource(&self) -> &T {
        match self {
            Self::Added(r) | Self::Updated(r) | Self::Deleted(r) => r,
        }
    }
}

/// Tagged event on the controller queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Function(ResourceEvent<Function>),
    Topic(ResourceEvent<Topic>),
    Deployment(ResourceEvent<DeploymentStatus>),
}

impl From<ResourceEvent<Function>> for Event {
    fn from(event: ResourceEvent<Function>) -> Self {
        Self::Function(event)
    }
}

impl From<ResourceEvent<Topic>> for Event {
    fn from(event: ResourceEvent<Topic>) -> Self {
        Self::Topic(event)
    }
}

impl From<ResourceEvent<DeploymentStatus>> for Event {
    fn from(event: ResourceEvent<DeploymentStatus>) -> Self {
        Self::Deployment(event)
    }
}

/// Producer handle on the controller queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Enqueue an event, waiting while the queue is full.
    pub async fn send(&self, event: Event) -> LagwatchResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| LagwatchError::QueueClosed)
    }

    /// Enqueue without waiting. Fails when the queue is full or closed.
    pub fn try_send(&self, event: Event) -> LagwatchResult<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => LagwatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => LagwatchError::QueueClosed,
        })
    }
}

/// A source of change notifications.
///
/// Feeds are started when the controller loop starts and stopped when it
/// shuts down.
pub trait ChangeFeed: Send {
    fn name(&self) -> &'static str;

    fn start(&mut self, events: EventSender);

    fn stop(&mut self);
}

/// Feed that replays a fixed list of events once.
#[derive(Debug)]
pub struct StaticFeed {
    name: &'static str,
    events: Vec<Event>,
    task: Option<JoinHandle<()>>,
}

impl StaticFeed {
    pub fn new(name: &'static str, events: Vec<Event>) -> Self {
        Self {
            name,
            events,
            task: None,
        }
    }

    /// Feed announcing every function and topic as added.
    pub fn from_resources(functions: Vec<Function>, topics: Vec<Topic>) -> Self {
        let events = topics
            .into_iter()
            .map(|t| Event::from(ResourceEvent::Added(t)))
            .chain(
                functions
                    .into_iter()
                    .map(|f| Event::from(ResourceEvent::Added(f))),
            )
            .collect();
        Self::new("static", events)
    }
}

impl ChangeFeed for StaticFeed {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&mut self, events: EventSender) {
        let pending = std::mem::take(&mut self.events);
        let name = self.name;
        self.task = Some(tokio::spawn(async move {
            for event in pending {
                if events.send(event).await.is_err() {
                    tracing::debug!(feed = name, "Controller queue closed");
                    return;
                }
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FunctionKey, TopicKey};

    #[tokio::test]
    async fn test_static_feed_delivers_topics_first() {
        let topic = Topic::new(TopicKey::new("in").unwrap(), Some(2));
        let function = Function::new(FunctionKey::new("fn").unwrap(), TopicKey::new("in").unwrap());
        let mut feed = StaticFeed::from_resources(vec![function.clone()], vec![topic.clone()]);

        let (tx, mut rx) = mpsc::channel(4);
        feed.start(EventSender::new(tx));

        assert_eq!(rx.recv().await, Some(Event::Topic(ResourceEvent::Added(topic))));
        assert_eq!(
            rx.recv().await,
            Some(Event::Function(ResourceEvent::Added(function)))
        );
        feed.stop();
    }

    #[test]
    fn test_try_send_full_and_closed() {
        let (tx, rx) = mpsc::channel(1);
        let sender = EventSender::new(tx);
        let topic = Topic::new(TopicKey::new("in").unwrap(), None);

        sender
            .try_send(ResourceEvent::Added(topic.clone()).into())
            .unwrap();
        assert!(matches!(
            sender.try_send(ResourceEvent::Added(topic.clone()).into()),
            Err(LagwatchError::QueueFull)
        ));

        drop(rx);
        assert!(matches!(
            sender.try_send(ResourceEvent::Deleted(topic).into()),
            Err(LagwatchError::QueueClosed)
        ));
    }
}

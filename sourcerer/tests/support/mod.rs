//! A minimal aggregate fixture shared by this crate's integration tests.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use sourcerer::aggregate::{Aggregate, DomainEvent};
use sourcerer::async_trait;
use sourcerer::topic::Topic;
use sourcerer_derive::Event;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
pub enum TestEvent {
    #[event(topic = "support::Created")]
    Created,
    #[event(topic = "support::Updated")]
    Updated { value: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSnapshot {
    pub value: u64,
}

impl sourcerer::aggregate::Snapshot for TestSnapshot {}

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
#[error("test aggregate error")]
pub struct TestError;

#[derive(Debug, Clone, Default)]
pub struct TestAggregate {
    pub value: u64,
}

#[async_trait]
impl Aggregate for TestAggregate {
    type Event = TestEvent;
    type Command = TestEvent;
    type Snapshot = TestSnapshot;
    type Error = TestError;

    fn apply_state(&mut self, event: &TestEvent) {
        match event {
            TestEvent::Created => {}
            TestEvent::Updated { value } => self.value = *value,
        }
    }

    async fn handle(&self, command: TestEvent) -> Result<Vec<TestEvent>, TestError> {
        Ok(vec![command])
    }

    fn to_snapshot(&self) -> TestSnapshot {
        TestSnapshot { value: self.value }
    }

    fn from_snapshot(snapshot: TestSnapshot) -> Self {
        Self { value: snapshot.value }
    }
}

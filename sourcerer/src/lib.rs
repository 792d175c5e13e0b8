//! # Event Sourcing Runtime
//!
//! `sourcerer` provides the core building blocks for event-sourced
//! applications: aggregates that produce and replay domain events, a codec
//! pipeline that serializes/compresses/encrypts those events on the way to
//! storage, pluggable recorders for the storage layer itself, and a
//! snapshot-aware repository that ties it all together.
//!
//! ## Core concepts
//!
//! - **[`aggregate::Aggregate`]** — business state and the commands it
//!   accepts, expressed without any concern for identity or versioning.
//! - **[`aggregate::AggregateRoot`]** — wraps an `Aggregate`, owning its id,
//!   version, and the events pending since the last save. Centralizes the
//!   version-contiguity check so individual event handlers never have to.
//! - **[`aggregate::DomainEvent`]** — an immutable fact an aggregate
//!   produces, identified by a stable [`topic::Topic`]. `#[derive(Event)]`
//!   (from `sourcerer_derive`) implements this for an enum.
//! - **[`mapper::Mapper`]** — the serialize → compress → encrypt pipeline
//!   applied to every event and snapshot on the way into storage.
//! - **[`store::recorder::AggregateRecorder`]** — the storage contract every
//!   backend implements: append-only, opaque `(aggregate_id, version,
//!   topic, state)` rows.
//! - **[`event_store::EventStore`]** — appends and loads whole
//!   [`aggregate::AggregateRoot`]s through a recorder and a mapper.
//! - **[`snapshot::SnapshotStore`]** — persists whole-state snapshots on a
//!   parallel stream, keyed the same way as the primary event stream.
//! - **[`repository::Repository`]** — the snapshot-then-delta load/save
//!   façade applications use day to day.
//! - **[`notification_log::NotificationLog`]** — a paginated view over a
//!   process-wide, gapless sequence of every recorded event, for downstream
//!   consumers that read in global order.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use serde::{Deserialize, Serialize};
//! use sourcerer::aggregate::{Aggregate, AggregateRoot};
//! use sourcerer::event_store::EventStore;
//! use sourcerer::mapper::Mapper;
//! use sourcerer::repository::{GenericRepository, Repository};
//! use sourcerer::store::in_memory::InMemoryApplicationRecorder;
//! use sourcerer::transcoding::{DecimalStr, TranscoderRegistry};
//! use sourcerer_derive::Event;
//! use uuid::Uuid;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Event)]
//! enum BankAccountEvent {
//!     Opened { balance: DecimalStr },
//!     Deposited { amount: DecimalStr },
//! }
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct BankAccountSnapshot {
//!     balance: rust_decimal::Decimal,
//! }
//! impl sourcerer::aggregate::Snapshot for BankAccountSnapshot {}
//!
//! #[derive(Debug)]
//! enum BankAccountCommand {
//!     Open { balance: rust_decimal::Decimal },
//!     Deposit { amount: rust_decimal::Decimal },
//! }
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("bank account error")]
//! struct BankAccountError;
//!
//! #[derive(Debug, Clone, Default)]
//! struct BankAccount {
//!     balance: rust_decimal::Decimal,
//! }
//!
//! #[sourcerer::async_trait]
//! impl Aggregate for BankAccount {
//!     type Event = BankAccountEvent;
//!     type Command = BankAccountCommand;
//!     type Snapshot = BankAccountSnapshot;
//!     type Error = BankAccountError;
//!
//!     fn apply_state(&mut self, event: &BankAccountEvent) {
//!         match event {
//!             BankAccountEvent::Opened { balance } => self.balance = balance.0,
//!             BankAccountEvent::Deposited { amount } => self.balance += amount.0,
//!         }
//!     }
//!
//!     async fn handle(&self, command: BankAccountCommand) -> Result<Vec<BankAccountEvent>, BankAccountError> {
//!         match command {
//!             BankAccountCommand::Open { balance } => Ok(vec![BankAccountEvent::Opened { balance: DecimalStr(balance) }]),
//!             BankAccountCommand::Deposit { amount } => Ok(vec![BankAccountEvent::Deposited { amount: DecimalStr(amount) }]),
//!         }
//!     }
//!
//!     fn to_snapshot(&self) -> BankAccountSnapshot {
//!         BankAccountSnapshot { balance: self.balance }
//!     }
//!
//!     fn from_snapshot(snapshot: BankAccountSnapshot) -> Self {
//!         Self { balance: snapshot.balance }
//!     }
//! }
//!
//! async fn open_and_deposit() -> Result<(), sourcerer::error::SourceError> {
//!     let registry = Arc::new(TranscoderRegistry::with_defaults());
//!     let recorder = Arc::new(InMemoryApplicationRecorder::new());
//!     let store = Arc::new(EventStore::<BankAccount>::new(recorder, Mapper::new(registry)));
//!     let repo = GenericRepository::new(store);
//!
//!     let mut account = AggregateRoot::<BankAccount>::new(Uuid::new_v4());
//!     account.handle(BankAccountCommand::Open { balance: rust_decimal::Decimal::ZERO }).await.unwrap();
//!     repo.save(&mut account).await?;
//!
//!     let loaded = repo.load(account.id()).await?;
//!     assert_eq!(loaded.version(), 1);
//!     Ok(())
//! }
//! ```
#![deny(missing_docs)]

pub use async_trait::async_trait;

/// Identity, versioning, and the domain event model.
pub mod aggregate;
/// The environment surface read at startup.
pub mod config;
/// The error taxonomy for this crate.
pub mod error;
/// Appends and loads aggregates through a recorder and a mapper.
pub mod event_store;
/// The serialize/compress/encrypt codec pipeline.
pub mod mapper;
/// A paginated view over a process-wide notification sequence.
pub mod notification_log;
/// The snapshot-then-delta load/save façade.
pub mod repository;
/// Whole-state snapshot persistence.
pub mod snapshot;
/// Storage backends and their shared contracts.
pub mod store;
/// Stable string names for event and aggregate classes.
pub mod topic;
/// Self-describing scalar encoding for dynamically-typed payloads.
pub mod transcoding;

pub use aggregate::{Aggregate, AggregateRoot, DomainEvent, Snapshot};
pub use error::{Result, SourceError};
pub use event_store::EventStore;
pub use mapper::{Envelope, Mapper};
pub use repository::{GenericRepository, Repository};
pub use snapshot::SnapshotStore;
pub use topic::{Topic, TopicRegistry};
pub use transcoding::TranscoderRegistry;

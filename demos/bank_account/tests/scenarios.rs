//! End-to-end scenarios exercising the `sourcerer` runtime through the
//! [`bank_account`] demo aggregate.

use std::sync::Arc;

use bank_account::{BankAccount, BankAccountCommand, BankAccountError, BankAccountEvent};
use rust_decimal::Decimal;
use sourcerer::aggregate::{AggregateRoot, DomainEvent};
use sourcerer::error::{AggregateError, SourceError};
use sourcerer::event_store::EventStore;
use sourcerer::mapper::{AesGcmCipher, Envelope, GzipCompressor, Mapper};
use sourcerer::notification_log::NotificationLog;
use sourcerer::repository::{GenericRepository, Repository};
use sourcerer::snapshot::SnapshotStore;
use sourcerer::store::in_memory::InMemoryApplicationRecorder;
use sourcerer::store::recorder::{AggregateRecorder, StoredRecord};
use sourcerer::transcoding::TranscoderRegistry;
use uuid::Uuid;

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn store_and_recorder() -> (Arc<EventStore<BankAccount>>, Arc<InMemoryApplicationRecorder>) {
    let registry = Arc::new(TranscoderRegistry::with_defaults());
    let recorder = Arc::new(InMemoryApplicationRecorder::new());
    let store = Arc::new(EventStore::new(
        Arc::clone(&recorder) as Arc<dyn AggregateRecorder>,
        Mapper::new(registry),
    ));
    (store, recorder)
}

fn event_store() -> Arc<EventStore<BankAccount>> {
    store_and_recorder().0
}

#[tokio::test]
async fn open_credit_replay() {
    let store = event_store();
    let repo = GenericRepository::new(store);
    let id = Uuid::new_v4();

    let mut account = AggregateRoot::<BankAccount>::new(id);
    account
        .handle(BankAccountCommand::Open { name: "Alice".into(), email: "alice@example.com".into() })
        .await
        .unwrap();
    for amount in [d("10.00"), d("25.00"), d("30.00")] {
        account.handle(BankAccountCommand::Credit { amount }).await.unwrap();
    }
    repo.save(&mut account).await.unwrap();

    let reloaded = repo.load(id).await.unwrap();
    assert_eq!(reloaded.version(), 4);
    assert_eq!(reloaded.state().balance(), d("65.00"));
}

#[tokio::test]
async fn insufficient_funds_leaves_the_failed_command_unbuffered() {
    let store = event_store();
    let repo = GenericRepository::new(Arc::clone(&store));
    let id = Uuid::new_v4();

    let mut account = AggregateRoot::<BankAccount>::new(id);
    account
        .handle(BankAccountCommand::Open { name: "Alice".into(), email: "alice@example.com".into() })
        .await
        .unwrap();
    repo.save(&mut account).await.unwrap();

    let mut account = repo.load(id).await.unwrap();
    account.handle(BankAccountCommand::Credit { amount: d("10.00") }).await.unwrap();
    let err = account.handle(BankAccountCommand::Debit { amount: d("-25.00") }).await.unwrap_err();

    assert_eq!(err, BankAccountError::InsufficientFunds);
    assert_eq!(account.pending_len(), 1);
    assert_eq!(account.version(), 2);
}

#[tokio::test]
async fn overdraft_limit_allows_a_debit_to_exactly_reach_it() {
    let store = event_store();
    let repo = GenericRepository::new(store);
    let id = Uuid::new_v4();

    let mut account = AggregateRoot::<BankAccount>::new(id);
    account
        .handle(BankAccountCommand::Open { name: "Alice".into(), email: "alice@example.com".into() })
        .await
        .unwrap();
    account.handle(BankAccountCommand::SetOverdraftLimit { limit: d("10.00") }).await.unwrap();
    account.handle(BankAccountCommand::Debit { amount: d("-10.00") }).await.unwrap();
    assert_eq!(account.state().balance(), d("-10.00"));

    let err = account
        .handle(BankAccountCommand::SetOverdraftLimit { limit: d("-1.00") })
        .await
        .unwrap_err();
    assert_eq!(err, BankAccountError::InvalidOverdraftLimit);
    assert_eq!(account.pending_len(), 3);

    repo.save(&mut account).await.unwrap();
}

#[tokio::test]
async fn duplicate_version_rolls_back_the_whole_batch() {
    let recorder = InMemoryApplicationRecorder::new();
    let id = Uuid::new_v4();
    let first = StoredRecord { aggregate_id: id, version: 1, topic: "bank_account::Opened".into(), state: vec![0] };
    recorder.insert(vec![first]).await.unwrap();

    let conflicting = vec![
        StoredRecord { aggregate_id: id, version: 3, topic: "bank_account::Credited".into(), state: vec![1] },
        StoredRecord { aggregate_id: id, version: 1, topic: "bank_account::Opened".into(), state: vec![2] },
    ];
    let err = recorder.insert(conflicting).await.unwrap_err();
    assert!(matches!(err, sourcerer::error::RecorderError::Integrity));

    let records = recorder.select(id, Default::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].version, 1);
}

#[tokio::test]
async fn notification_pagination_advances_as_records_are_inserted() {
    let recorder = Arc::new(InMemoryApplicationRecorder::new());
    let log = NotificationLog::new(Arc::clone(&recorder) as Arc<dyn sourcerer::store::notification::ApplicationRecorder>)
        .with_section_size(5);
    let id = Uuid::new_v4();

    let batch = |range: std::ops::RangeInclusive<u64>| {
        range
            .map(|v| StoredRecord { aggregate_id: id, version: v, topic: "bank_account::Credited".into(), state: vec![v as u8] })
            .collect::<Vec<_>>()
    };
    recorder.insert(batch(1..=6)).await.unwrap();

    let section = log.section(1, 6).await.unwrap();
    assert_eq!(section.items.len(), 5);
    assert_eq!(section.section_id, Some("1,5".to_owned()));
    assert_eq!(section.next_id, Some("6,10".to_owned()));

    recorder.insert(batch(7..=10)).await.unwrap();
    let section = log.section(6, 10).await.unwrap();
    assert_eq!(section.items.len(), 5);
    assert_eq!(section.next_id, None);
}

#[tokio::test]
async fn snapshot_accelerated_read_matches_replay_from_scratch() {
    let registry = Arc::new(TranscoderRegistry::with_defaults());
    let events_recorder = Arc::new(InMemoryApplicationRecorder::new());
    let store = Arc::new(EventStore::<BankAccount>::new(events_recorder, Mapper::new(Arc::clone(&registry))));
    let snapshots_recorder = Arc::new(InMemoryApplicationRecorder::new());
    let snapshots = Arc::new(SnapshotStore::<BankAccount>::new(snapshots_recorder, Mapper::new(registry)));
    let id = Uuid::new_v4();

    let mut account = AggregateRoot::<BankAccount>::new(id);
    account.handle(BankAccountCommand::Open { name: "Alice".into(), email: "alice@example.com".into() }).await.unwrap();
    account.handle(BankAccountCommand::Credit { amount: d("10.00") }).await.unwrap();
    account.handle(BankAccountCommand::Credit { amount: d("25.00") }).await.unwrap();
    assert_eq!(account.version(), 3);
    store.append(&mut account).await.unwrap();
    snapshots.save(id, account.version(), account.modified_on(), account.to_snapshot()).await.unwrap();
    assert_eq!(account.state().balance(), d("35.00"));

    account.handle(BankAccountCommand::Credit { amount: d("30.00") }).await.unwrap();
    store.append(&mut account).await.unwrap();

    // Accelerated read: restore from the snapshot, replay only what followed it.
    let stored = snapshots.load_latest(id).await.unwrap().unwrap();
    let restored = AggregateRoot::<BankAccount>::from_snapshot(id, stored.version, stored.modified_on, stored.snapshot);
    let tail = store.load_from(id, stored.version).await.unwrap();
    let restored = restored.replay_from(tail).unwrap();
    assert_eq!(restored.version(), 4);
    assert_eq!(restored.state().balance(), d("65.00"));

    // Full replay agrees.
    let from_scratch = store.load(id).await.unwrap();
    assert_eq!(from_scratch.version(), 4);
    assert_eq!(from_scratch.state().balance(), d("65.00"));
}

#[tokio::test]
async fn point_in_time_reads_see_the_balance_as_it_stood_at_each_version() {
    let store = event_store();
    let repo = GenericRepository::new(store);
    let id = Uuid::new_v4();

    let mut account = AggregateRoot::<BankAccount>::new(id);
    account.handle(BankAccountCommand::Open { name: "Alice".into(), email: "alice@example.com".into() }).await.unwrap();
    account.handle(BankAccountCommand::Credit { amount: d("10.00") }).await.unwrap();
    account.handle(BankAccountCommand::Credit { amount: d("25.00") }).await.unwrap();
    repo.save(&mut account).await.unwrap();

    let at_three = repo.load_as_of(id, Some(3)).await.unwrap();
    assert_eq!(at_three.version(), 3);
    assert_eq!(at_three.state().balance(), d("35.00"));

    let at_two = repo.load_as_of(id, Some(2)).await.unwrap();
    assert_eq!(at_two.version(), 2);
    assert_eq!(at_two.state().balance(), d("10.00"));

    let latest = repo.load(id).await.unwrap();
    assert_eq!(latest.version(), 3);
}

#[tokio::test]
async fn point_in_time_reads_also_bound_the_replay_tail_after_a_snapshot() {
    let registry = Arc::new(TranscoderRegistry::with_defaults());
    let events_recorder = Arc::new(InMemoryApplicationRecorder::new());
    let store = Arc::new(EventStore::<BankAccount>::new(events_recorder, Mapper::new(Arc::clone(&registry))));
    let snapshots_recorder = Arc::new(InMemoryApplicationRecorder::new());
    let snapshots = Arc::new(SnapshotStore::<BankAccount>::new(snapshots_recorder, Mapper::new(registry)));
    let repo = GenericRepository::new(Arc::clone(&store)).with_snapshots(snapshots).with_snapshot_frequency(Some(2));
    let id = Uuid::new_v4();

    let mut account = AggregateRoot::<BankAccount>::new(id);
    account.handle(BankAccountCommand::Open { name: "Alice".into(), email: "alice@example.com".into() }).await.unwrap();
    account.handle(BankAccountCommand::Credit { amount: d("10.00") }).await.unwrap();
    repo.save(&mut account).await.unwrap(); // crosses version 2, takes a snapshot

    let mut account = repo.load(id).await.unwrap();
    account.handle(BankAccountCommand::Credit { amount: d("25.00") }).await.unwrap();
    account.handle(BankAccountCommand::Credit { amount: d("30.00") }).await.unwrap();
    repo.save(&mut account).await.unwrap();

    // The snapshot sits at version 2; a version-3 read must replay only the
    // tail up to 3, not the version-4 event recorded after it.
    let at_three = repo.load_as_of(id, Some(3)).await.unwrap();
    assert_eq!(at_three.version(), 3);
    assert_eq!(at_three.state().balance(), d("35.00"));

    let at_four = repo.load(id).await.unwrap();
    assert_eq!(at_four.version(), 4);
    assert_eq!(at_four.state().balance(), d("65.00"));
}

#[tokio::test]
async fn round_trips_under_cipher_and_compressor_without_leaking_the_payload() {
    let registry = Arc::new(TranscoderRegistry::with_defaults());
    let key = [9u8; 32];
    let mapper: Mapper<BankAccountEvent> = Mapper::new(registry)
        .with_compressor(GzipCompressor::new())
        .with_cipher(AesGcmCipher::new(&key));

    let envelope = Envelope {
        originator_id: Uuid::new_v4(),
        originator_version: 1,
        timestamp: chrono::Utc::now(),
        payload: BankAccountEvent::Opened { name: "Steve Magal".into(), email: "steve@example.com".into() },
    };
    let stored = mapper.from_event(&envelope).unwrap();

    assert!(!stored.windows(11).any(|w| w == b"Steve Magal"));
    assert!(!stored.windows(9).any(|w| w == b"full_name"));

    let decoded = mapper.to_event(stored).unwrap();
    assert_eq!(decoded, envelope);
}

#[tokio::test]
async fn version_error_on_a_tampered_stream() {
    let (store, recorder) = store_and_recorder();
    let id = Uuid::new_v4();
    let plain_mapper: Mapper<BankAccountEvent> = Mapper::new(Arc::new(TranscoderRegistry::with_defaults()));

    // A stream missing version 2: Opened at v1, then Credited jumps to v3.
    let envelopes = vec![
        Envelope {
            originator_id: id,
            originator_version: 1,
            timestamp: chrono::Utc::now(),
            payload: BankAccountEvent::Opened { name: "Alice".into(), email: "alice@example.com".into() },
        },
        Envelope {
            originator_id: id,
            originator_version: 3,
            timestamp: chrono::Utc::now(),
            payload: BankAccountEvent::Credited { amount: sourcerer::transcoding::DecimalStr(d("10.00")) },
        },
    ];
    for envelope in &envelopes {
        let bytes = plain_mapper.from_event(envelope).unwrap();
        recorder
            .insert(vec![StoredRecord {
                aggregate_id: id,
                version: envelope.originator_version,
                topic: envelope.payload.topic().as_str().to_owned(),
                state: bytes,
            }])
            .await
            .unwrap();
    }

    let err = store.load(id).await.unwrap_err();
    assert!(matches!(err, SourceError::Aggregate(AggregateError::Version { expected: 2, actual: 3 })));
}

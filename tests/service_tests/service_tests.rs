//! Tests for LogService
//!
//! These tests verify:
//! - Produce/consume on top of the log
//! - Translation of errors into wire responses
//! - Append notifications
//! - Waiting for offsets that do not exist yet

use std::sync::Arc;
use std::time::Duration;

use seglog::protocol::{Command, Status};
use seglog::{Log, LogService, Record, SeglogError, SegmentConfig, StreamConfig};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_service() -> (TempDir, Arc<LogService>) {
    let temp_dir = TempDir::new().unwrap();
    let log = Log::open(temp_dir.path(), SegmentConfig::default()).unwrap();
    let stream = StreamConfig {
        poll_interval_ms: 5,
        max_backoff_ms: 50,
    };
    (temp_dir, Arc::new(LogService::new(Arc::new(log), stream)))
}

// =============================================================================
// Produce/Consume Tests
// =============================================================================

#[test]
fn test_produce_consume() {
    let (_temp, service) = setup_service();

    let offset = service.produce(Record::new(b"hello world".to_vec())).unwrap();
    assert_eq!(offset, 0);

    let record = service.consume(offset).unwrap();
    assert_eq!(record.value, b"hello world");
    assert_eq!(record.offset, 0);
}

#[test]
fn test_consume_past_boundary() {
    let (_temp, service) = setup_service();
    service.produce(Record::new(b"hello world".to_vec())).unwrap();

    let err = service.consume(1).unwrap_err();
    assert!(err.is_offset_out_of_range());
}

// =============================================================================
// Execute / Error Translation Tests
// =============================================================================

#[test]
fn test_execute_produce_and_consume() {
    let (_temp, service) = setup_service();

    let produced = service.execute(Command::Produce {
        record: Record::new(b"a".to_vec()),
    });
    assert_eq!(produced.status, Status::Ok);
    assert_eq!(produced.to_offset().unwrap(), 0);

    let consumed = service.execute(Command::Consume { offset: 0 });
    assert_eq!(consumed.status, Status::Ok);
    assert_eq!(consumed.to_record().unwrap().value, b"a");
}

#[test]
fn test_execute_out_of_range_has_own_status() {
    let (_temp, service) = setup_service();

    let response = service.execute(Command::Consume { offset: 3 });
    assert_eq!(response.status, Status::OffsetOutOfRange);
    assert!(matches!(
        response.into_result(),
        Err(SeglogError::OffsetOutOfRange(3))
    ));
}

#[test]
fn test_execute_ping() {
    let (_temp, service) = setup_service();
    let response = service.execute(Command::Ping);
    assert_eq!(response.status, Status::Ok);
    assert_eq!(response.payload.as_deref(), Some(&b"PONG"[..]));
}

#[test]
fn test_execute_rejects_stream_commands() {
    let (_temp, service) = setup_service();
    assert_eq!(service.execute(Command::EndStream).status, Status::Error);
}

#[test]
fn test_internal_errors_become_error_status() {
    let response = LogService::error_response(&SeglogError::Closed);
    assert_eq!(response.status, Status::Error);
    assert!(matches!(response.into_result(), Err(SeglogError::Remote(_))));
}

#[test]
fn test_produce_after_close_is_internal_error() {
    let (_temp, service) = setup_service();
    service.log().close().unwrap();

    let response = service.execute(Command::Produce {
        record: Record::new(b"late".to_vec()),
    });
    assert_eq!(response.status, Status::Error);
}

// =============================================================================
// Notification / Waiting Tests
// =============================================================================

#[test]
fn test_produce_publishes_next_offset() {
    let (_temp, service) = setup_service();
    let appended = service.subscribe();
    assert_eq!(*appended.borrow(), 0);

    service.produce(Record::new(b"a".to_vec())).unwrap();
    service.produce(Record::new(b"b".to_vec())).unwrap();

    assert!(appended.has_changed().unwrap());
    assert_eq!(*appended.borrow(), 2);
}

#[tokio::test]
async fn test_next_record_returns_existing_record() {
    let (_temp, service) = setup_service();
    service.produce(Record::new(b"ready".to_vec())).unwrap();

    let mut appended = service.subscribe();
    let mut backoff = service.backoff();
    let record = service.next_record(0, &mut appended, &mut backoff).await.unwrap();
    assert_eq!(record.value, b"ready");
}

#[tokio::test]
async fn test_next_record_waits_for_produce() {
    let (_temp, service) = setup_service();

    let waiter = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let mut appended = service.subscribe();
            let mut backoff = service.backoff();
            service.next_record(0, &mut appended, &mut backoff).await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished());

    service.produce(Record::new(b"late".to_vec())).unwrap();

    let record = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter should finish after produce")
        .unwrap()
        .unwrap();
    assert_eq!(record.value, b"late");
    assert_eq!(record.offset, 0);
}

#[tokio::test]
async fn test_next_record_sees_direct_log_appends() {
    let (_temp, service) = setup_service();

    let waiter = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let mut appended = service.subscribe();
            let mut backoff = service.backoff();
            service.next_record(0, &mut appended, &mut backoff).await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;

    // Bypasses the notification; picked up by polling
    service.log().append(Record::new(b"direct".to_vec())).unwrap();

    let record = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter should poll the log")
        .unwrap()
        .unwrap();
    assert_eq!(record.value, b"direct");
}

#[tokio::test]
async fn test_next_record_returns_other_errors() {
    let (_temp, service) = setup_service();
    service.produce(Record::new(b"a".to_vec())).unwrap();
    service.log().close().unwrap();

    let mut appended = service.subscribe();
    let mut backoff = service.backoff();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        service.next_record(0, &mut appended, &mut backoff),
    )
    .await
    .unwrap();

    assert!(matches!(result, Err(SeglogError::Io(_))));
}

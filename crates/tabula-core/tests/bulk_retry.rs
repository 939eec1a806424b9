//! Bulk writes against the emulator: per-entry outcomes and selective retries.

mod common;

use std::time::Duration;

use common::{row_keys, set_cell, status, table};
use tabula_core::control::{CallContext, CancelToken};
use tabula_core::emulator::{Emulator, Fault, Method};
use tabula_core::mutation::{Mutation, Timestamp};
use tabula_core::retry::TableError;
use tabula_core::row::RowKey;
use tabula_core::status::Code;

fn idempotent(qualifier: &str) -> Mutation {
    let mut m = Mutation::new();
    m.set("cf", qualifier, 1, "");
    m
}

fn server_time() -> Mutation {
    let mut m = Mutation::new();
    m.set("cf", "col", Timestamp::ServerTime, "");
    m
}

fn entry_counts(emulator: &Emulator) -> Vec<usize> {
    emulator
        .mutate_rows_requests()
        .iter()
        .map(|r| r.entries.len())
        .collect()
}

#[tokio::test]
async fn whole_request_failures_are_retried() {
    let emulator = Emulator::new();
    emulator.push_faults(
        Method::MutateRows,
        (0..3).map(|_| Fault::reject(status(Code::Aborted))),
    );
    let tbl = table(&emulator);

    let errors = tbl
        .apply_bulk(
            &CallContext::background(),
            row_keys(&["row2"]),
            vec![idempotent("col")],
        )
        .await
        .unwrap();

    assert_eq!(errors, None);
    assert_eq!(emulator.call_count(Method::MutateRows), 4);
    assert!(emulator.row(&"row2".into()).is_some());
}

#[tokio::test]
async fn only_failed_entries_are_resent() {
    let emulator = Emulator::new();
    emulator.push_faults(
        Method::MutateRows,
        vec![
            Fault::reject(status(Code::Unavailable)),
            Fault::EntryStatuses(vec![
                status(Code::Unavailable),
                status(Code::Ok),
                status(Code::Aborted),
            ]),
            Fault::EntryStatuses(vec![status(Code::Ok), status(Code::Aborted)]),
        ],
    );
    let tbl = table(&emulator);

    let errors = tbl
        .apply_bulk(
            &CallContext::background(),
            row_keys(&["row1", "row2", "row3"]),
            vec![idempotent("col"), idempotent("col2"), idempotent("col3")],
        )
        .await
        .unwrap();

    assert_eq!(errors, None);
    assert_eq!(entry_counts(&emulator), [3, 3, 2, 1]);
    let last = emulator.mutate_rows_requests().pop().unwrap();
    assert_eq!(last.entries[0].row_key, RowKey::from("row3"));
    for key in ["row1", "row2", "row3"] {
        assert!(emulator.row(&key.into()).is_some(), "{} written", key);
    }
}

#[tokio::test]
async fn unretryable_and_non_idempotent_entries_fail_without_retry() {
    let emulator = Emulator::new();
    emulator.push_fault(
        Method::MutateRows,
        Fault::EntryStatuses(vec![status(Code::FailedPrecondition), status(Code::Aborted)]),
    );
    let tbl = table(&emulator);

    let errors = tbl
        .apply_bulk(
            &CallContext::background(),
            row_keys(&["row1", "row2"]),
            vec![idempotent("col"), server_time()],
        )
        .await
        .unwrap();

    assert_eq!(
        errors,
        Some(vec![
            Some(status(Code::FailedPrecondition)),
            Some(status(Code::Aborted)),
        ])
    );
    assert_eq!(emulator.call_count(Method::MutateRows), 1);
}

#[tokio::test]
async fn unretryable_request_failure_fails_every_entry() {
    let emulator = Emulator::new();
    emulator.push_fault(
        Method::MutateRows,
        Fault::reject(status(Code::PermissionDenied)),
    );
    let tbl = table(&emulator);

    let errors = tbl
        .apply_bulk(
            &CallContext::background(),
            row_keys(&["row1", "row2"]),
            vec![idempotent("col"), idempotent("col2")],
        )
        .await
        .unwrap();

    assert_eq!(
        errors,
        Some(vec![
            Some(status(Code::PermissionDenied)),
            Some(status(Code::PermissionDenied)),
        ])
    );
    assert_eq!(emulator.call_count(Method::MutateRows), 1);
    assert_eq!(emulator.row_count(), 0);
}

#[tokio::test]
async fn cancellation_while_stalled_is_an_overall_error() {
    let emulator = Emulator::new();
    emulator.push_fault(Method::MutateRows, Fault::Stall);
    let tbl = table(&emulator);
    let token = CancelToken::new();
    let ctx = CallContext::background().cancel_token(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });
    let err = tbl
        .apply_bulk(&ctx, row_keys(&["row1", "row2"]), vec![idempotent("col"), idempotent("col2")])
        .await
        .unwrap_err();

    assert_eq!(err, TableError::Cancelled);
    assert_eq!(emulator.call_count(Method::MutateRows), 1);
    canceller.await.unwrap();
}

#[tokio::test]
async fn expired_deadline_is_an_overall_error() {
    let emulator = Emulator::new();
    let tbl = table(&emulator);
    let ctx = CallContext::background()
        .deadline(tokio::time::Instant::now() - Duration::from_millis(10));

    let err = tbl
        .apply_bulk(
            &ctx,
            row_keys(&["row1", "row2", "row3"]),
            vec![idempotent("col"), idempotent("col2"), idempotent("col3")],
        )
        .await
        .unwrap_err();

    assert_eq!(err, TableError::DeadlineExceeded);
    assert_eq!(emulator.call_count(Method::MutateRows), 0);
}

#[tokio::test]
async fn deadline_after_a_completed_round_reports_per_entry() {
    let emulator = Emulator::new();
    emulator.push_faults(
        Method::MutateRows,
        vec![
            Fault::EntryStatuses(vec![
                status(Code::FailedPrecondition),
                status(Code::Ok),
                status(Code::Aborted),
            ]),
            Fault::Stall,
        ],
    );
    let tbl = table(&emulator);

    let errors = tbl
        .apply_bulk(
            &CallContext::with_timeout(Duration::from_millis(100)),
            row_keys(&["row1", "row2", "row3"]),
            vec![idempotent("col"), idempotent("col2"), idempotent("col3")],
        )
        .await
        .unwrap();

    assert_eq!(
        errors,
        Some(vec![
            Some(status(Code::FailedPrecondition)),
            None,
            Some(status(Code::Aborted)),
        ])
    );
}

#[tokio::test]
async fn stream_failure_keeps_only_idempotent_entries_pending() {
    let emulator = Emulator::new();
    emulator.push_fault(
        Method::MutateRows,
        Fault::FailStreamAfter {
            entries: 1,
            status: status(Code::Unavailable),
        },
    );
    let tbl = table(&emulator);

    let errors = tbl
        .apply_bulk(
            &CallContext::background(),
            row_keys(&["row1", "row2", "row3"]),
            vec![idempotent("col"), server_time(), idempotent("col3")],
        )
        .await
        .unwrap();

    assert_eq!(errors, Some(vec![None, Some(status(Code::Unavailable)), None]));
    assert_eq!(entry_counts(&emulator), [3, 1]);
    assert!(emulator.row(&"row2".into()).is_none());
    assert!(emulator.row(&"row3".into()).is_some());
}

#[tokio::test]
async fn missing_entry_status_is_an_internal_error() {
    let emulator = Emulator::new();
    emulator.push_fault(
        Method::MutateRows,
        Fault::EntryStatuses(vec![status(Code::Ok)]),
    );
    let tbl = table(&emulator);

    let errors = tbl
        .apply_bulk(
            &CallContext::background(),
            row_keys(&["row1", "row2"]),
            vec![idempotent("col"), idempotent("col2")],
        )
        .await
        .unwrap()
        .expect("second entry failed");

    assert_eq!(errors[0], None);
    assert_eq!(errors[1].as_ref().map(|s| s.code), Some(Code::Internal));
}

#[tokio::test]
async fn requests_are_split_by_mutation_count() {
    let emulator = Emulator::new();
    let tbl = table(&emulator).max_mutations_per_request(2);

    let errors = tbl
        .apply_bulk(
            &CallContext::background(),
            row_keys(&["a", "b", "c"]),
            vec![set_cell("1"), set_cell("2"), set_cell("3")],
        )
        .await
        .unwrap();

    assert_eq!(errors, None);
    assert_eq!(entry_counts(&emulator), [2, 1]);
    assert_eq!(emulator.row_count(), 3);
}

#[tokio::test]
async fn mismatched_lengths_fail_fast() {
    let emulator = Emulator::new();
    let tbl = table(&emulator);

    let err = tbl
        .apply_bulk(
            &CallContext::background(),
            row_keys(&["a", "b"]),
            vec![set_cell("1")],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TableError::Config(_)));
    assert!(emulator.requests().is_empty());
}

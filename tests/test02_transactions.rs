use std::sync::{Arc, Mutex};

use ado_middleware::test_utils::{MockProviderBuilder, ProviderCall};
use ado_middleware::{
    ConnectConfig, CursorLocation, ErrorKind, IsolationLevel, Message, connect_with_provider,
};

fn begins(calls: &[ProviderCall]) -> usize {
    calls
        .iter()
        .filter(|call| matches!(call, ProviderCall::BeginTransaction))
        .count()
}

#[test]
fn connect_applies_config_and_opens_the_initial_transaction() {
    let (provider, handle) = MockProviderBuilder::new().build();
    let config = ConnectConfig::default()
        .with_isolation_level(IsolationLevel::Serializable)
        .with_cursor_location(CursorLocation::UseClient);
    let connection = connect_with_provider(provider, &config).unwrap();

    assert!(connection.supports_transactions().unwrap());
    let calls = handle.calls();
    assert_eq!(
        calls,
        vec![
            ProviderCall::SetCursorLocation(CursorLocation::UseClient),
            ProviderCall::SetIsolationLevel(IsolationLevel::Serializable),
            ProviderCall::BeginTransaction,
        ]
    );
}

#[test]
fn commit_without_retaining_opens_the_next_transaction() {
    let (provider, handle) = MockProviderBuilder::new().build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();

    connection.commit().unwrap();
    let calls = handle.calls();
    assert_eq!(begins(&calls), 2);
    assert!(calls.contains(&ProviderCall::CommitTransaction));
}

#[test]
fn commit_with_retaining_leaves_the_transaction_to_the_provider() {
    let (provider, handle) = MockProviderBuilder::new().with_commit_retaining().build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();

    connection.commit().unwrap();
    assert_eq!(begins(&handle.calls()), 1);
}

#[test]
fn rollback_respects_abort_retaining() {
    let (provider, handle) = MockProviderBuilder::new().build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    connection.rollback().unwrap();
    assert_eq!(begins(&handle.calls()), 2);

    let (provider, handle) = MockProviderBuilder::new().with_abort_retaining().build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    connection.rollback().unwrap();
    assert_eq!(begins(&handle.calls()), 1);
}

#[test]
fn without_transaction_support_commit_is_a_noop_and_rollback_refuses() {
    let (provider, handle) = MockProviderBuilder::new().without_transactions().build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();

    assert!(!connection.supports_transactions().unwrap());
    assert_eq!(begins(&handle.calls()), 0);

    connection.commit().unwrap();
    let error = connection.rollback().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotSupported);
    assert_eq!(connection.messages().unwrap()[0].kind, ErrorKind::NotSupported);

    // No transaction calls reached the provider.
    assert!(
        !handle
            .calls()
            .iter()
            .any(|call| matches!(
                call,
                ProviderCall::CommitTransaction | ProviderCall::RollbackTransaction
            ))
    );
}

#[test]
fn close_rolls_back_closes_and_releases_exactly_once() {
    let (provider, handle) = MockProviderBuilder::new().build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();

    connection.close().unwrap();
    connection.close().unwrap();

    let calls = handle.calls();
    let tail = &calls[calls.len() - 3..];
    assert_eq!(
        tail,
        &[
            ProviderCall::RollbackTransaction,
            ProviderCall::Close,
            ProviderCall::Release,
        ]
    );
    assert_eq!(handle.count(|c| matches!(c, ProviderCall::Close)), 1);
    assert_eq!(handle.count(|c| matches!(c, ProviderCall::Release)), 1);
}

#[test]
fn close_failure_still_releases_and_reports_internal() {
    let (provider, handle) = MockProviderBuilder::new().fail_on_close().build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();

    let error = connection.close().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Internal);
    assert_eq!(handle.count(|c| matches!(c, ProviderCall::Release)), 1);

    // The provider reference is gone; a second close is a silent no-op.
    connection.close().unwrap();
    assert_eq!(handle.count(|c| matches!(c, ProviderCall::Close)), 1);
}

#[test]
fn close_still_closes_the_handle_when_rollback_fails() {
    let (provider, handle) = MockProviderBuilder::new().fail_on_rollback().build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();

    let error = connection.close().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Internal);
    assert_eq!(handle.count(|c| matches!(c, ProviderCall::Close)), 1);
    assert_eq!(handle.count(|c| matches!(c, ProviderCall::Release)), 1);
}

#[test]
fn dropping_an_unclosed_connection_tears_the_provider_down() {
    let (provider, handle) = MockProviderBuilder::new().build();
    {
        let _connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();
    }
    assert_eq!(handle.count(|c| matches!(c, ProviderCall::Close)), 1);
    assert_eq!(handle.count(|c| matches!(c, ProviderCall::Release)), 1);
}

#[test]
fn rollback_failures_route_through_the_error_hook() {
    let (provider, _handle) = MockProviderBuilder::new().fail_on_rollback().build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();

    let observed: Arc<Mutex<Vec<Message>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    connection
        .set_error_hook(Some(Box::new(move |message| {
            if let Ok(mut log) = sink.lock() {
                log.push(message.clone());
            }
        })))
        .unwrap();

    let error = connection.rollback().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::General);

    let snapshot: Vec<Message> = observed.lock().unwrap().clone();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].kind, ErrorKind::General);
    assert!(snapshot[0].detail.contains("rollback failed"));
}

#[test]
fn each_operation_clears_the_message_log_at_entry() {
    let (provider, _handle) = MockProviderBuilder::new().without_transactions().build();
    let connection = connect_with_provider(provider, &ConnectConfig::default()).unwrap();

    assert!(connection.rollback().is_err());
    assert_eq!(connection.messages().unwrap().len(), 1);

    // The next operation starts from a clean log.
    connection.commit().unwrap();
    assert!(connection.messages().unwrap().is_empty());
}

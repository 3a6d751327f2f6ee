//! End-to-end tests for the search loop against the scripted gateway.
//!
//! All tests run on tokio's paused clock, so backoff sleeps complete
//! instantly and timestamps are exact.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reroll_core::{Credentials, Phase, ProgressEvent, SearchRequest, TargetSet};
use reroll_gateway::mock::{Fault, MockGateway, MockOperation};
use reroll_search::{SearchConfig, SearchOrchestrator};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn orchestrator(gateway: &MockGateway, config: SearchConfig) -> SearchOrchestrator {
    SearchOrchestrator::new(Arc::new(gateway.clone()), config).expect("valid config")
}

fn token_request(targets: &str) -> SearchRequest {
    SearchRequest::new(
        Credentials::Token("T".into()),
        TargetSet::parse(targets, false).unwrap(),
    )
}

fn status(attempt: u32, phase: Phase, current: Option<&str>) -> ProgressEvent {
    ProgressEvent::Status {
        attempt,
        phase,
        current_discriminator: current.map(String::from),
    }
}

/// Collect a whole stream and check the single-terminal-event contract.
async fn collect_events(orchestrator: &SearchOrchestrator, request: SearchRequest) -> Vec<ProgressEvent> {
    let stream = orchestrator.start_search(request).expect("request accepted");
    let events: Vec<ProgressEvent> = stream.collect().await;

    let terminal = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal, 1, "expected exactly one terminal event: {:?}", events);
    assert!(events.last().unwrap().is_terminal(), "terminal event must be last");
    events
}

fn read_times(gateway: &MockGateway) -> Vec<tokio::time::Instant> {
    gateway
        .get_calls()
        .into_iter()
        .filter(|c| c.operation == MockOperation::ReadAccount)
        .map(|c| c.timestamp)
        .collect()
}

// ============================================================================
// SUCCESS PATHS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reroll_until_match_event_sequence() {
    let gateway = MockGateway::new("Foo", "5555").with_rerolls(["1234"]);
    let orch = orchestrator(&gateway, SearchConfig::default());

    let events = collect_events(&orch, token_request("1234")).await;

    assert_eq!(events.len(), 5, "{:?}", events);
    assert_eq!(events[0], status(1, Phase::Checking, Some("5555")));
    assert_eq!(events[1], status(1, Phase::Updating, None));
    assert_eq!(events[2], status(1, Phase::Waiting, None));
    assert_eq!(events[3], status(2, Phase::Checking, Some("1234")));
    match &events[4] {
        ProgressEvent::Success {
            display_name,
            discriminator,
            attempts,
            duration_ms,
        } => {
            assert_eq!(display_name, "Foo#1234");
            assert_eq!(discriminator, "1234");
            assert_eq!(*attempts, 2);
            assert!((700..800).contains(duration_ms), "duration {}", duration_ms);
        }
        other => panic!("expected success, got {:?}", other),
    }

    assert_eq!(gateway.read_count(), 2);
    assert_eq!(gateway.change_count(), 1);
    for call in gateway.get_calls() {
        assert_eq!(call.input, "T");
    }
}

#[tokio::test(start_paused = true)]
async fn test_already_matching_makes_no_write() {
    let gateway = MockGateway::new("Foo", "1234");
    let orch = orchestrator(&gateway, SearchConfig::default());

    let terminal = orch.run_to_completion(token_request("1234, 0420")).await.unwrap();

    match terminal {
        ProgressEvent::Success { attempts, .. } => assert_eq!(attempts, 1),
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(gateway.read_count(), 1);
    assert_eq!(gateway.change_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_digit_wildcard_matches() {
    let gateway = MockGateway::new("Foo", "0001").with_rerolls(["4242", "7777"]);
    let orch = orchestrator(&gateway, SearchConfig::default());
    let request = SearchRequest::new(
        Credentials::Token("T".into()),
        TargetSet::parse("", true).unwrap(),
    );

    let terminal = orch.run_to_completion(request).await.unwrap();

    match terminal {
        ProgressEvent::Success {
            discriminator,
            attempts,
            ..
        } => {
            assert_eq!(discriminator, "7777");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_password_credentials_authenticate_first() {
    let gateway = MockGateway::new("Foo", "1234")
        .with_credentials("a@b.c", "hunter2")
        .with_token("issued");
    let orch = orchestrator(&gateway, SearchConfig::default());
    let request = SearchRequest::new(
        Credentials::resolve(Some("a@b.c"), Some("hunter2"), None).unwrap(),
        TargetSet::parse("1234", false).unwrap(),
    );

    let events = collect_events(&orch, request).await;

    assert_eq!(events[0], status(0, Phase::Authenticating, None));
    assert!(matches!(events.last(), Some(ProgressEvent::Success { .. })));
    let calls = gateway.get_calls();
    assert_eq!(calls[0].operation, MockOperation::Authenticate);
    assert_eq!(calls[1].input, "issued");
}

// ============================================================================
// FAILURE PATHS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_three_failed_reads_are_fatal() {
    let gateway = MockGateway::default();
    gateway.fail_all_reads(Some(Fault::gateway("down")));
    let orch = orchestrator(&gateway, SearchConfig::default());

    let events = collect_events(&orch, token_request("1234")).await;

    assert_eq!(events.len(), 3, "{:?}", events);
    assert_eq!(
        events[0],
        ProgressEvent::Error {
            message: "Gateway error: down".into(),
            attempts: 1,
            duration_ms: 0,
            fatal: false,
            retry_in_ms: Some(1050),
        }
    );
    assert!(matches!(
        events[1],
        ProgressEvent::Error {
            attempts: 2,
            fatal: false,
            retry_in_ms: Some(1575),
            ..
        }
    ));
    match &events[2] {
        ProgressEvent::Error {
            message,
            attempts,
            fatal,
            ..
        } => {
            assert!(*fatal);
            assert_eq!(*attempts, 3);
            assert_eq!(message, "Too many consecutive errors (3): Gateway error: down");
        }
        other => panic!("expected fatal error, got {:?}", other),
    }
    assert_eq!(gateway.read_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_three_failed_writes_are_fatal() {
    let gateway = MockGateway::new("Foo", "5555");
    gateway.fail_all_changes(Some(Fault::gateway("busy")));
    let orch = orchestrator(&gateway, SearchConfig::default());

    let terminal = orch.run_to_completion(token_request("1234")).await.unwrap();

    match terminal {
        ProgressEvent::Error {
            fatal, attempts, ..
        } => {
            assert!(fatal);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected fatal error, got {:?}", other),
    }
    assert_eq!(gateway.read_count(), 3);
    assert_eq!(gateway.change_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_at_exactly_max_attempts() {
    let gateway = MockGateway::new("Foo", "5555");
    let orch = orchestrator(&gateway, SearchConfig::default());

    let terminal = orch.run_to_completion(token_request("1234")).await.unwrap();

    match terminal {
        ProgressEvent::Error {
            message,
            attempts,
            fatal,
            ..
        } => {
            assert!(fatal);
            assert_eq!(attempts, 3000);
            assert_eq!(message, "Maximum attempts reached (3000)");
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert_eq!(gateway.read_count(), 3000);
    assert_eq!(gateway.change_count(), 3000);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_token_is_fatal_without_retry() {
    let gateway = MockGateway::default();
    gateway.fail_all_reads(Some(Fault::Unauthorized));
    let orch = orchestrator(&gateway, SearchConfig::default());

    let events = collect_events(&orch, token_request("1234")).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ProgressEvent::Error { fatal: true, message, .. } if message.starts_with("Unauthorized")
    ));
    assert_eq!(gateway.read_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bad_credentials_end_stream_before_any_read() {
    let gateway = MockGateway::default().with_credentials("a@b.c", "right");
    let orch = orchestrator(&gateway, SearchConfig::default());
    let request = SearchRequest::new(
        Credentials::resolve(Some("a@b.c"), Some("wrong"), None).unwrap(),
        TargetSet::parse("1234", false).unwrap(),
    );

    let events = collect_events(&orch, request).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], status(0, Phase::Authenticating, None));
    assert_eq!(
        events[1],
        ProgressEvent::fatal("Unauthorized: Invalid credentials", 0, 0)
    );
    assert_eq!(gateway.read_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_gateway_is_a_transient_failure() {
    let gateway = MockGateway::new("Foo", "1234");
    gateway.fail_next_reads(1, Fault::Panic);
    let orch = orchestrator(&gateway, SearchConfig::default());

    let events = collect_events(&orch, token_request("1234")).await;

    assert!(matches!(
        &events[0],
        ProgressEvent::Error { fatal: false, message, .. } if message.contains("panicked")
    ));
    assert!(matches!(events.last(), Some(ProgressEvent::Success { attempts: 2, .. })));
}

// ============================================================================
// TIMING
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_interval_resets_to_base_after_successful_tick() {
    let gateway = MockGateway::new("Foo", "5555").with_rerolls(["5556", "1234"]);
    gateway.fail_next_reads(2, Fault::gateway("flaky"));
    let orch = orchestrator(&gateway, SearchConfig::default());

    let terminal = orch.run_to_completion(token_request("1234")).await.unwrap();
    assert!(matches!(terminal, ProgressEvent::Success { attempts: 5, .. }));

    let t = read_times(&gateway);
    assert_eq!(t.len(), 5);
    assert_eq!(t[1] - t[0], Duration::from_millis(1050));
    assert_eq!(t[2] - t[1], Duration::from_millis(1575));
    assert_eq!(t[3] - t[2], Duration::from_millis(700));
    assert_eq!(t[4] - t[3], Duration::from_millis(700));
}

#[tokio::test(start_paused = true)]
async fn test_request_interval_override() {
    let gateway = MockGateway::new("Foo", "5555").with_rerolls(["1234"]);
    let orch = orchestrator(&gateway, SearchConfig::default());

    orch.run_to_completion(token_request("1234").with_base_interval_ms(300))
        .await
        .unwrap();

    let t = read_times(&gateway);
    assert_eq!(t[1] - t[0], Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_after_error_is_not_shorter_than_override() {
    let gateway = MockGateway::new("Foo", "5555").with_rerolls(["5556", "1234"]);
    gateway.fail_next_reads(1, Fault::gateway("flaky"));
    let orch = orchestrator(&gateway, SearchConfig::default());

    let terminal = orch
        .run_to_completion(token_request("1234").with_base_interval_ms(10_000))
        .await
        .unwrap();
    assert!(matches!(terminal, ProgressEvent::Success { attempts: 4, .. }));

    let t = read_times(&gateway);
    assert_eq!(t[1] - t[0], Duration::from_millis(10_000));
    assert_eq!(t[2] - t[1], Duration::from_millis(10_000));
    assert_eq!(t[3] - t[2], Duration::from_millis(10_000));
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_dropping_stream_stops_gateway_calls() {
    let gateway = MockGateway::new("Foo", "5555");
    let orch = orchestrator(&gateway, SearchConfig::default());
    let mut stream = orch.start_search(token_request("1234")).unwrap();

    while let Some(event) = stream.next().await {
        if matches!(event, ProgressEvent::Status { phase: Phase::Waiting, .. }) {
            break;
        }
    }
    drop(stream);

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(gateway.read_count(), 1);
    assert_eq!(gateway.change_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_cancel_delivers_cancelled_event() {
    let gateway = MockGateway::new("Foo", "5555");
    let orch = orchestrator(&gateway, SearchConfig::default());
    let mut stream = orch.start_search(token_request("1234")).unwrap();

    let first = stream.next().await.unwrap();
    assert_eq!(first, status(1, Phase::Checking, Some("5555")));
    stream.cancel();

    let rest: Vec<ProgressEvent> = stream.collect().await;
    match rest.last() {
        Some(ProgressEvent::Error {
            message, fatal, ..
        }) => {
            assert!(*fatal);
            assert_eq!(message, "Search cancelled");
        }
        other => panic!("expected cancellation, got {:?}", other),
    }
    assert_eq!(gateway.read_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_independent_searches_share_gateway() {
    let gateway = MockGateway::new("Foo", "5555");
    let orch = orchestrator(&gateway, SearchConfig::default());

    let first = orch.start_search(token_request("1234")).unwrap();
    let mut second = orch.start_search(token_request("1234")).unwrap();
    assert_ne!(first.search_id(), second.search_id());

    first.cancel();
    let first_events: Vec<ProgressEvent> = first.collect().await;
    match first_events.last() {
        Some(ProgressEvent::Error { fatal, message, .. }) => {
            assert!(*fatal);
            assert_eq!(message, "Search cancelled");
        }
        other => panic!("expected cancellation, got {:?}", other),
    }

    let mut last_checked = 0;
    while let Some(event) = second.next().await {
        assert!(!event.is_terminal(), "second search ended early: {:?}", event);
        if let ProgressEvent::Status {
            attempt,
            phase: Phase::Checking,
            ..
        } = event
        {
            last_checked = attempt;
            if attempt == 3 {
                break;
            }
        }
    }
    assert_eq!(last_checked, 3);

    let reads = gateway
        .get_calls()
        .into_iter()
        .filter(|c| c.operation == MockOperation::ReadAccount)
        .count();
    assert!(reads >= 3);
}

// ============================================================================
// VALIDATION
// ============================================================================

#[tokio::test]
async fn test_zero_interval_rejected_synchronously() {
    let gateway = MockGateway::default();
    let orch = orchestrator(&gateway, SearchConfig::default());

    let result = orch.start_search(token_request("1234").with_base_interval_ms(0));

    assert!(matches!(result, Err(reroll_core::Error::Validation(_))));
    assert!(gateway.get_calls().is_empty());
}

#[tokio::test]
async fn test_interval_override_outside_bounds_rejected() {
    let gateway = MockGateway::default();
    let orch = orchestrator(&gateway, SearchConfig::default());

    for ms in [1, 249, 10_001, 20_000] {
        let result = orch.start_search(token_request("1234").with_base_interval_ms(ms));
        assert!(
            matches!(result, Err(reroll_core::Error::Validation(_))),
            "{}ms should be rejected",
            ms
        );
    }
    assert!(gateway.get_calls().is_empty());
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let gateway = MockGateway::default();
    let result = SearchOrchestrator::new(
        Arc::new(gateway),
        SearchConfig::default().with_max_attempts(0),
    );
    assert!(result.is_err());
}

mod common;

use common::{bridge, element, init_tracing, login_page, MockExecutor};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ui_bridge::{
    parse_nl_instruction, ActionVerb, AssertionRequest, AssertionType, BatchAssertionRequest,
    BatchMode, BridgeEvent, ErrorCode, NLActionRequest, SearchCriteria, WaitConditions,
};

#[test]
fn test_exact_text_search_finds_button() {
    let bridge = bridge(MockExecutor::new());
    let response = bridge.search(&SearchCriteria::fuzzy_text("Start Extraction"));

    let best = response.best_match.expect("best match");
    assert_eq!(best.element.id, "start-btn");
    assert!(best.confidence > 0.8, "confidence {}", best.confidence);
    assert_eq!(response.scanned_count, login_page().len());
}

#[test]
fn test_typo_matches_with_lowered_fuzzy_threshold() {
    let bridge = bridge(MockExecutor::new());
    let criteria = SearchCriteria::text("Sbumit").with_fuzzy_threshold(0.6);
    let best = bridge.find_best(&criteria).expect("best match");
    assert_eq!(best.element.id, "submit-btn");
    assert!(best.confidence >= 0.6);
}

#[test]
fn test_parse_type_instruction() {
    let parsed = parse_nl_instruction("type https://example.com into URL input").unwrap();
    assert_eq!(parsed.action, ActionVerb::Type);
    assert_eq!(parsed.value.as_deref(), Some("https://example.com"));
    assert!(parsed.target_description.contains("URL input"));
}

#[tokio::test]
async fn test_batch_stops_at_first_failure() {
    let bridge = bridge(MockExecutor::new());
    let batch = BatchAssertionRequest {
        assertions: vec![
            AssertionRequest::new("Sign in", AssertionType::Visible),
            AssertionRequest::new("Remember me", AssertionType::Checked),
            AssertionRequest::new("Cancel", AssertionType::Enabled),
        ],
        mode: BatchMode::All,
        stop_on_failure: true,
    };

    let result = bridge.assert_batch(&batch).await.unwrap();
    assert_eq!(result.results.len(), 2);
    assert!(!result.passed);
    assert_eq!(result.failed_count, 1);
    assert_eq!(result.passed_count + result.failed_count, result.results.len());
}

#[tokio::test]
async fn test_unknown_target_fails_with_suggestions() {
    let executor = MockExecutor::new();
    let bridge = bridge(executor.clone());
    let response = bridge
        .execute(&NLActionRequest::new("click Nonexistent Button").with_threshold(0.95))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.error_code, Some(ErrorCode::ElementNotFound));
    assert!(!response.suggestions.is_empty());
    assert!(executor.calls().is_empty());

    let context = response.error_context.expect("error context");
    assert_eq!(context.page_context.total_elements, login_page().len());
    assert!(context.search_results.nearest_match.is_none());
}

#[tokio::test]
async fn test_low_confidence_offers_nearest_match() {
    let bridge = bridge(MockExecutor::new());
    let response = bridge
        .execute(&NLActionRequest::new("click Submt").with_threshold(0.95))
        .await
        .unwrap();

    assert_eq!(response.error_code, Some(ErrorCode::LowConfidence));
    assert!(
        response.suggestions[0].starts_with("Did you mean button 'Submit'?"),
        "{:?}",
        response.suggestions
    );
    assert_eq!(response.alternatives[0].element_id, "submit-btn");
}

#[tokio::test]
async fn test_type_into_aliased_input() {
    init_tracing();
    let executor = MockExecutor::new();
    let bridge = bridge(executor.clone());
    let response = bridge
        .execute(&NLActionRequest::new("type https://example.com into URL input"))
        .await
        .unwrap();

    assert!(response.success, "{response:?}");
    assert_eq!(
        response.executed_action.as_deref(),
        Some("Typed 'https://example.com' into input 'URL'")
    );
    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "url-input");
    assert_eq!(calls[0].1.params["text"], "https://example.com");
}

#[tokio::test]
async fn test_facade_helpers_quote_values() {
    let executor = MockExecutor::new();
    let bridge = bridge(executor.clone());

    let response = bridge.type_text("URL", "two words into it").await.unwrap();
    assert!(response.success);
    assert_eq!(executor.calls()[0].1.params["text"], "two words into it");

    let response = bridge.click("Cancel").await.unwrap();
    assert!(response.success);
    assert_eq!(executor.calls()[1].0, "cancel-btn");
}

#[tokio::test]
async fn test_rejected_action_reports_action_failed() {
    let executor = MockExecutor::new();
    executor.reject("start-btn");
    let bridge = bridge(executor);
    let response = bridge.click("Start Extraction").await.unwrap();

    assert!(!response.success);
    assert_eq!(response.error_code, Some(ErrorCode::ActionFailed));
    assert_eq!(response.error.as_deref(), Some("click intercepted by overlay"));
    assert_eq!(response.element_used.unwrap().id, "start-btn");
    assert!(response
        .suggestions
        .iter()
        .all(|s| !s.starts_with("Did you mean")));
}

#[tokio::test]
async fn test_binding_error_keeps_its_code() {
    let executor = MockExecutor::new();
    executor.break_element("cancel-btn");
    let bridge = bridge(executor);
    let response = bridge.click("Cancel").await.unwrap();

    assert_eq!(response.error_code, Some(ErrorCode::ElementNotVisible));
    assert_eq!(
        response.suggestions[0],
        "Wait for the element to become visible"
    );
}

#[tokio::test]
async fn test_slow_action_times_out() {
    let bridge = bridge(MockExecutor::slow(Duration::from_millis(500)));
    let response = bridge
        .execute(&NLActionRequest::new("click Cancel").with_timeout(20))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.error_code, Some(ErrorCode::Timeout));
}

#[tokio::test]
async fn test_deadline_covers_wait_and_action() {
    let executor = MockExecutor::slow(Duration::from_millis(150));
    let bridge = bridge(executor.clone());
    let mut go = element("go-btn", "button", "Go");
    go.record.state.visible = false;
    bridge.index().upsert(go);

    let request = NLActionRequest::new("click Go")
        .with_timeout(200)
        .with_wait_for(WaitConditions {
            visible: Some(true),
            ..Default::default()
        });
    let response = bridge.execute(&request).await.unwrap();

    assert!(!response.success, "{response:?}");
    assert_eq!(response.error_code, Some(ErrorCode::Timeout));
    assert!(
        response.duration_ms < 290.0,
        "ran {}ms on a 200ms budget",
        response.duration_ms
    );
}

#[tokio::test]
async fn test_wait_for_gets_only_the_remaining_budget() {
    let bridge = bridge(MockExecutor::slow(Duration::from_millis(150)));
    let mut go = element("go-btn", "button", "Go");
    go.record.state.visible = false;
    bridge.index().upsert(go);

    let request = NLActionRequest::new("click Go")
        .with_timeout(50)
        .with_wait_for(WaitConditions {
            visible: Some(true),
            timeout_ms: Some(1_000),
            ..Default::default()
        });
    let response = bridge.execute(&request).await.unwrap();

    assert_eq!(response.error_code, Some(ErrorCode::Timeout));
    assert!(response.duration_ms < 140.0, "{}", response.duration_ms);
}

#[tokio::test]
async fn test_obscured_target_suggests_dismissing_the_cover() {
    let executor = MockExecutor::new();
    executor.obscure("start-btn", "div 'cookie banner'");
    let bridge = bridge(executor);
    let response = bridge.click("Start Extraction").await.unwrap();

    assert_eq!(response.error_code, Some(ErrorCode::ActionFailed));
    assert_eq!(
        response.error.as_deref(),
        Some("Element is obscured by another element: div 'cookie banner'")
    );
    assert_eq!(
        response.suggestions[0],
        "Close the dialog or overlay covering the page (div 'cookie banner')"
    );
    let context = response.error_context.unwrap();
    assert_eq!(context.page_context.possible_blockers, vec!["div 'cookie banner'"]);
}

#[tokio::test]
async fn test_snapshot_and_diff_track_page_changes() {
    let bridge = bridge(MockExecutor::new());
    assert!(bridge.diff().is_none());

    let first = bridge.snapshot();
    assert_eq!(first.total_elements, 6);
    assert_eq!(first.element_counts["button"], 3);
    let summary = bridge.summary();
    assert!(summary.starts_with("6 of 6 elements visible"), "{summary}");
    assert!(summary.contains("- [checkbox] Remember me #remember (unchecked)"));

    let mut dialog = element("cookies", "dialog", "Cookies");
    dialog.record.state.rect = ui_bridge::ElementRect::new(0.0, 0.0, 400.0, 300.0);
    bridge.index().upsert(dialog);
    bridge.index().remove("cancel-btn");

    let diff = bridge.diff().expect("diff after snapshot");
    assert_eq!(diff.from_snapshot_id, first.snapshot_id);
    assert_eq!(diff.changes.appeared[0].element_id, "cookies");
    assert_eq!(diff.changes.disappeared[0].element_id, "cancel-btn");
    assert_eq!(
        diff.suggested_actions,
        vec!["Handle dialog 'Cookies' before continuing"]
    );
    assert!(bridge.summary().contains("Blocked by Cookies #cookies"));

    let since_first = bridge.diff_since(&first);
    assert_eq!(since_first.changes.appeared.len(), 1);
    assert_eq!(bridge.diff().unwrap().summary, "No changes");
}

#[tokio::test]
async fn test_assertion_polls_until_state_changes() {
    let bridge = bridge(MockExecutor::new());
    bridge.index().upsert(element("status", "status", "Loading"));

    let index = bridge.index().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        index.upsert(element("status", "status", "Done"));
    });

    let result = bridge
        .assert(
            &AssertionRequest::new("#status", AssertionType::HasText)
                .expecting("Done")
                .with_timeout(2_000),
        )
        .await
        .unwrap();
    assert!(result.passed, "{result:?}");
}

#[tokio::test]
async fn test_wait_for_hidden_times_out_with_last_observation() {
    let bridge = bridge(MockExecutor::new());
    let result = bridge.wait_for_hidden("Cancel", 30).await.unwrap();
    assert!(!result.passed);
    assert_eq!(result.actual, serde_json::json!(true));
    assert!(result.duration_ms >= 25.0);
}

#[tokio::test]
async fn test_verify_page_state_runs_everything() {
    let bridge = bridge(MockExecutor::new());
    let result = bridge
        .verify_page_state(vec![
            AssertionRequest::new("Remember me", AssertionType::Checked),
            AssertionRequest::new("Delete account", AssertionType::NotExists),
            AssertionRequest::new("role:heading", AssertionType::HasText).expecting("Sign in"),
        ])
        .await
        .unwrap();

    assert_eq!(result.results.len(), 3);
    assert_eq!(result.passed_count, 2);
    assert!(!result.passed);
}

#[tokio::test]
async fn test_events_reach_listeners() {
    let bridge = bridge(MockExecutor::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bridge.events().subscribe(|_| panic!("faulty listener"));
    bridge
        .events()
        .subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    bridge.update_elements(login_page());
    bridge.click("Start Extraction").await.unwrap();

    let seen = seen.lock().unwrap();
    assert!(matches!(seen[0], BridgeEvent::ElementsUpdated { count: 6 }));
    assert!(matches!(seen[1], BridgeEvent::SearchCompleted { .. }));
    assert!(matches!(
        &seen[2],
        BridgeEvent::ActionExecuted { success: true, element_id: Some(id), .. } if id == "start-btn"
    ));
}

mod support;

use olivetin_e2e::lifecycle::TestStatus;
use olivetin_e2e::locators::UiSelectors;
use olivetin_e2e::suites;
use olivetin_e2e::{FailureCapture, ScenarioLifecycle};
use std::time::Duration;
use support::{olivetin_page, FakeRunner, FakeSession, BASE_URL};
use tokio::time::Instant;

fn outcome_titles(report: &olivetin_e2e::SuiteReport) -> Vec<(&str, TestStatus)> {
    report
        .outcomes
        .iter()
        .map(|o| (o.identity.title.as_str(), o.status))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn subpath_suite_passes() {
    let tmp = tempfile::tempdir().unwrap();
    let session = olivetin_page();
    let mut lifecycle = ScenarioLifecycle::new(FakeRunner::new(), FailureCapture::new(tmp.path()));

    let report = lifecycle.run_suite(&suites::subpath(), &session).await;

    assert_eq!(report.title, "config: subpath");
    assert_eq!(report.profile, "subpath");
    assert_eq!(
        outcome_titles(&report),
        vec![
            ("Page title", TestStatus::Passed),
            ("Start dir action (popup)", TestStatus::Passed),
        ]
    );
    assert!(report.is_success(), "{:?}", report);

    let root = format!("{}/", BASE_URL);
    assert_eq!(session.visited(), vec![root.clone(), root]);
    assert_eq!(session.clicks(), vec!["dir-popup".to_string()]);
    assert_eq!(session.screenshots(), 0);
    assert_eq!(lifecycle.runner().starts, vec!["subpath".to_string()]);
}

/// A visible error banner fails the popup test and leaves a screenshot
#[tokio::test(start_paused = true)]
async fn visible_error_region_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let session = olivetin_page();
    session.mutate(|dom| dom.set_displayed("big-error", true));
    let mut lifecycle = ScenarioLifecycle::new(FakeRunner::new(), FailureCapture::new(tmp.path()));

    let report = lifecycle.run_suite(&suites::subpath(), &session).await;

    assert_eq!(
        outcome_titles(&report),
        vec![
            ("Page title", TestStatus::Passed),
            ("Start dir action (popup)", TestStatus::Failed),
        ]
    );
    let failed = &report.outcomes[1];
    assert!(failed.error.as_deref().unwrap().contains("error region is displayed"));

    let shot = tmp.path().join("config-subpath-Start-dir-action-popup.png");
    assert_eq!(failed.screenshot.as_ref(), Some(&shot));
    assert!(shot.is_file());
    assert_eq!(session.screenshots(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_action_buttons_fail() {
    let session = olivetin_page();
    session.mutate(|dom| {
        dom.add(
            "dir-popup-2",
            &[UiSelectors::default().action_button("dir-popup")],
            "dir-popup",
            true,
        )
    });
    let mut lifecycle = ScenarioLifecycle::new(FakeRunner::new(), FailureCapture::disabled());

    let report = lifecycle.run_suite(&suites::subpath(), &session).await;

    let failed = &report.outcomes[1];
    assert_eq!(failed.status, TestStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("expected 1, got 2"));
    assert!(session.clicks().is_empty());
}

/// The dialog title wait is bounded at two seconds
#[tokio::test(start_paused = true)]
async fn dialog_title_never_set_times_out() {
    let ui = UiSelectors::default();
    let session = FakeSession::new("OliveTin")
        .with_node("body", &[ui.root_ready.clone()], "", true)
        .with_node("dir-popup", &[ui.action_button("dir-popup")], "dir-popup", true)
        .with_node("dialog", &[ui.results_dialog.clone()], "", false)
        .with_node("dialog-title", &[ui.dialog_title.clone()], "", true)
        .with_node("big-error", &[ui.error_region.clone()], "", false)
        .on_click("dir-popup", Duration::ZERO, |dom| {
            dom.set_displayed("dialog", true)
        });
    let mut lifecycle = ScenarioLifecycle::new(FakeRunner::new(), FailureCapture::disabled());

    let start = Instant::now();
    let report = lifecycle.run_suite(&suites::subpath(), &session).await;
    let elapsed = start.elapsed();

    let error = report.outcomes[1].error.as_deref().unwrap();
    assert!(
        error.contains(r#"Timeout waiting for element text to be "dir-popup" after 2s"#),
        "{}",
        error
    );
    assert!(error.contains(r#"last observed: text """#), "{}", error);
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_millis(2200), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn root_url_outside_subpath_fails_title_test() {
    let session = olivetin_page();
    let runner = FakeRunner::with_base_url("http://localhost:1337");
    let mut lifecycle = ScenarioLifecycle::new(runner, FailureCapture::disabled());

    let report = lifecycle.run_suite(&suites::subpath(), &session).await;

    assert_eq!(report.outcomes[0].status, TestStatus::Failed);
    assert!(report.outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("is not under /subpath"));
    assert_eq!(report.outcomes[1].status, TestStatus::Passed);
}

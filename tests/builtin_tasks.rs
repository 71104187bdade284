mod common;
use crate::common::Harness;

use blogpilot::context::AiError;
use blogpilot::engine::RunStatus;
use blogpilot::events::{EventName, RunEvent};
use blogpilot::task::TaskSpec;
use blogpilot::tasks::{
    DEFAULT_COMMENT_BOX_SELECTOR, DEFAULT_CONTENT_SELECTOR, DEFAULT_LIKE_SELECTOR,
    DEFAULT_LINK_SELECTOR, DEFAULT_SUBMIT_SELECTOR, DEFAULT_TITLE_SELECTOR, NEIGHBOR_LIST_URL_KEY,
};
use blogpilot::types::{ErrorKind, TaskKind};
use blogpilot_test_utils::builders::fast_options;
use blogpilot_test_utils::fakes::{BrowserCall, CannedComments, RecordingBrowser, element, link};
use serde_json::json;

/// A spec with pacing switched off.
fn unpaced(kind: &str) -> TaskSpec {
    TaskSpec::new(kind)
        .param("min_delay_ms", 0)
        .param("max_delay_ms", 0)
}

fn comment_page() -> std::sync::Arc<RecordingBrowser> {
    RecordingBrowser::new()
        .with_elements(DEFAULT_TITLE_SELECTOR, vec![element("title", "Hello World")])
        .with_elements(
            DEFAULT_CONTENT_SELECTOR,
            vec![element("p1", "First paragraph."), element("p2", "Second one.")],
        )
        .with_elements(DEFAULT_COMMENT_BOX_SELECTOR, vec![element("box", "")])
        .with_elements(DEFAULT_SUBMIT_SELECTOR, vec![element("send", "Post")])
}

fn comment_spec() -> TaskSpec {
    unpaced(TaskKind::COMMENT)
        .param("post_url", "https://blog.test/posts/1")
        .param("read_time_min_secs", 0)
        .param("read_time_max_secs", 0)
}

#[tokio::test]
async fn goto_url_reports_where_it_landed() {
    let h = Harness::new(fast_options(1));
    let summary = h
        .run(vec![
            TaskSpec::new(TaskKind::GOTO_URL).param("url", "https://blog.test/home"),
        ])
        .await
        .unwrap();

    let result = summary.reports()[0].result().unwrap();
    assert!(result.is_success(), "{}", result.message());
    assert_eq!(result.data(), Some(&json!({ "url": "https://blog.test/home" })));
    assert_eq!(h.browser.navigations(), vec!["https://blog.test/home"]);
}

#[tokio::test]
async fn scroll_read_scrolls_the_requested_number_of_times() {
    let h = Harness::new(fast_options(1));
    let summary = h
        .run(vec![
            unpaced(TaskKind::SCROLL_READ)
                .param("url", "https://blog.test/long-read")
                .param("scrolls", 3)
                .param("scroll_distance", 400),
        ])
        .await
        .unwrap();

    assert!(summary.reports()[0].is_success());
    assert_eq!(
        h.browser.calls(),
        vec![
            BrowserCall::Navigate("https://blog.test/long-read".into()),
            BrowserCall::Scroll(400),
            BrowserCall::Scroll(400),
            BrowserCall::Scroll(400),
            BrowserCall::Close,
        ]
    );
}

#[tokio::test]
async fn like_clicks_up_to_the_limit() {
    let browser = RecordingBrowser::new().with_elements(
        DEFAULT_LIKE_SELECTOR,
        vec![element("l1", "♡"), element("l2", "♡"), element("l3", "♡")],
    );
    let h = Harness::builder(fast_options(1)).browser(browser).build();

    let summary = h
        .run(vec![unpaced(TaskKind::LIKE).param("max_likes", 2)])
        .await
        .unwrap();

    let result = summary.reports()[0].result().unwrap();
    assert_eq!(result.data(), Some(&json!({ "liked": 2 })));
    let clicks: Vec<_> = h
        .browser
        .calls()
        .into_iter()
        .filter(|c| matches!(c, BrowserCall::Click(_)))
        .collect();
    assert_eq!(
        clicks,
        vec![BrowserCall::Click("l1".into()), BrowserCall::Click("l2".into())]
    );
}

#[tokio::test]
async fn like_without_buttons_is_a_permanent_failure() {
    let h = Harness::new(fast_options(1));
    let summary = h.run(vec![unpaced(TaskKind::LIKE)]).await.unwrap();

    let report = &summary.reports()[0];
    assert_eq!(report.error_kind(), Some(ErrorKind::Permanent));
    assert_eq!(report.attempts(), 1);
    assert!(report.result().unwrap().message().contains(DEFAULT_LIKE_SELECTOR));
}

#[tokio::test]
async fn visit_neighbors_uses_the_configured_feed() {
    let browser = RecordingBrowser::new().with_elements(
        DEFAULT_LINK_SELECTOR,
        vec![
            link("a", "https://neighbor.test/1"),
            link("b", "https://neighbor.test/1"),
            link("c", "https://neighbor.test/2"),
            link("d", "https://neighbor.test/3"),
        ],
    );
    let h = Harness::builder(fast_options(1))
        .browser(browser)
        .setting(NEIGHBOR_LIST_URL_KEY, "https://blog.test/neighbors")
        .build();

    let summary = h
        .run(vec![
            unpaced(TaskKind::VISIT_NEIGHBORS)
                .param("count", 2)
                .param("scrolls_per_post", 1),
        ])
        .await
        .unwrap();

    let result = summary.reports()[0].result().unwrap();
    assert_eq!(
        result.data(),
        Some(&json!({
            "visited": 2,
            "urls": ["https://neighbor.test/1", "https://neighbor.test/2"],
        }))
    );
    assert_eq!(
        h.browser.navigations(),
        vec![
            "https://blog.test/neighbors",
            "https://neighbor.test/1",
            "https://neighbor.test/2",
        ]
    );
    let scrolls = h
        .browser
        .calls()
        .iter()
        .filter(|c| matches!(c, BrowserCall::Scroll(_)))
        .count();
    assert_eq!(scrolls, 2);
}

#[tokio::test]
async fn visit_neighbors_with_an_empty_feed_succeeds() {
    let h = Harness::new(fast_options(1));
    let summary = h
        .run(vec![
            unpaced(TaskKind::VISIT_NEIGHBORS)
                .param(NEIGHBOR_LIST_URL_KEY, "https://blog.test/neighbors"),
        ])
        .await
        .unwrap();

    let result = summary.reports()[0].result().unwrap();
    assert!(result.is_success());
    assert_eq!(result.data().unwrap()["visited"], json!(0));
}

#[tokio::test]
async fn comment_fills_the_template() {
    let h = Harness::builder(fast_options(1))
        .browser(comment_page())
        .build();

    let summary = h
        .run(vec![
            comment_spec()
                .param("use_ai", false)
                .param("comment_text", "Nice post about {title}!"),
        ])
        .await
        .unwrap();

    assert!(summary.reports()[0].is_success());
    let calls = h.browser.calls();
    assert!(calls.contains(&BrowserCall::Fill(
        "box".into(),
        "Nice post about Hello World!".into()
    )));
    let fill_at = calls
        .iter()
        .position(|c| matches!(c, BrowserCall::Fill(..)))
        .unwrap();
    let click_at = calls
        .iter()
        .position(|c| *c == BrowserCall::Click("send".into()))
        .unwrap();
    assert!(fill_at < click_at, "submit comes after the text is entered");
}

#[tokio::test]
async fn comment_asks_the_generator_and_truncates() {
    let generator = CannedComments::replying("  What a wonderful read, thanks for sharing it!  ");
    let h = Harness::builder(fast_options(1))
        .browser(comment_page())
        .comments(generator.clone())
        .build();

    let summary = h
        .run(vec![
            comment_spec()
                .param("tone", "friendly")
                .param("max_comment_length", 22),
        ])
        .await
        .unwrap();

    assert!(summary.reports()[0].is_success());
    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].post_url, "https://blog.test/posts/1");
    assert_eq!(requests[0].post_title, "Hello World");
    assert_eq!(requests[0].post_excerpt, "First paragraph.\nSecond one.");
    assert_eq!(requests[0].tone.as_deref(), Some("friendly"));
    assert!(h.browser.calls().contains(&BrowserCall::Fill(
        "box".into(),
        "What a wonderful read,".into()
    )));
}

#[tokio::test]
async fn exhausted_generator_quota_is_fatal() {
    let h = Harness::builder(fast_options(1))
        .browser(comment_page())
        .comments(CannedComments::failing(AiError::QuotaExceeded("monthly".into())))
        .build();

    let summary = h
        .run(vec![comment_spec(), comment_spec()])
        .await
        .unwrap();

    assert_eq!(summary.status(), RunStatus::Failed);
    assert_eq!(summary.reports()[0].error_kind(), Some(ErrorKind::Fatal));
    assert!(summary.reports()[1].is_skipped());
}

#[tokio::test]
async fn comment_without_a_comment_box_fails_permanently() {
    let browser = RecordingBrowser::new()
        .with_elements(DEFAULT_TITLE_SELECTOR, vec![element("title", "Hello")]);
    let h = Harness::builder(fast_options(1)).browser(browser).build();

    let summary = h
        .run(vec![comment_spec().param("comment_text", "Hi!")])
        .await
        .unwrap();

    let report = &summary.reports()[0];
    assert_eq!(report.error_kind(), Some(ErrorKind::Permanent));
    assert!(report.result().unwrap().message().contains(DEFAULT_COMMENT_BOX_SELECTOR));
}

#[tokio::test(start_paused = true)]
async fn wait_does_not_touch_the_browser() {
    let h = Harness::new(fast_options(1));
    let summary = h
        .run(vec![
            TaskSpec::new(TaskKind::WAIT)
                .param("duration_secs", 2)
                .param("random_variance", 0.0),
        ])
        .await
        .unwrap();

    let result = summary.reports()[0].result().unwrap();
    assert_eq!(result.data(), Some(&json!({ "actual_duration_secs": 2.0 })));
    assert_eq!(h.browser.calls(), vec![BrowserCall::Close]);
}

#[tokio::test]
async fn invalid_parameters_fail_without_running() {
    let h = Harness::new(fast_options(1));
    let summary = h
        .run(vec![
            TaskSpec::new(TaskKind::WAIT).param("duration_secs", 0),
            TaskSpec::new(TaskKind::GOTO_URL).param("url", "https://blog.test/"),
        ])
        .await
        .unwrap();

    let bad = &summary.reports()[0];
    assert_eq!(bad.attempts(), 0);
    assert_eq!(bad.error_kind(), Some(ErrorKind::Permanent));
    assert!(bad.result().unwrap().message().contains("duration_secs"));
    assert!(summary.reports()[1].is_success(), "the run goes on");

    let first_task_events = h.events.for_task(0);
    assert_eq!(first_task_events.len(), 1);
    match &first_task_events[0] {
        RunEvent::TaskFailed {
            attempt,
            final_attempt,
            ..
        } => {
            assert_eq!(*attempt, 0);
            assert!(*final_attempt);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(h.events.count(EventName::TaskStarted), 1);
}

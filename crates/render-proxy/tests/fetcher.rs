//! Page rendering against the in-memory engine: headers, timeouts,
//! cancellation and page cleanup.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{FakeRenderer, PageScript};
use render_proxy::config::DEFAULT_USER_AGENT;
use render_proxy::fetcher::{self, FetchOptions};
use render_proxy::renderer::Renderer;
use render_proxy::{ProxyError, TargetRequest};

const ORIGIN: &str = "https://example.com";

fn options() -> FetchOptions {
    FetchOptions {
        navigation_timeout: Duration::from_millis(100),
        readiness_timeout: Duration::from_millis(100),
        default_user_agent: DEFAULT_USER_AGENT.to_string(),
    }
}

async fn render(
    renderer: &FakeRenderer,
    request: &TargetRequest,
) -> Result<String, ProxyError> {
    fetcher::render(
        renderer,
        request,
        ORIGIN,
        &options(),
        &CancellationToken::new(),
    )
    .await
}

#[tokio::test]
async fn returns_serialized_dom_and_closes_page() {
    let renderer = FakeRenderer::new(PageScript::serving("<html><body>hi</body></html>"));
    let request = TargetRequest::new("https://example.com/page", None);

    let html = render(&renderer, &request).await.unwrap();

    assert_eq!(html, "<html><body>hi</body></html>");
    assert_eq!(renderer.visited(), vec!["https://example.com/page".to_string()]);
    assert_eq!(renderer.opened(), 1);
    assert_eq!(renderer.active_contexts(), 0);
}

#[tokio::test]
async fn caller_user_agent_and_origin_headers_are_sent() {
    let renderer = FakeRenderer::new(PageScript::serving("<html></html>"));
    let request = TargetRequest::new(
        "https://example.com/deep/page?q=1",
        Some("Caller/9.9".into()),
    );

    render(&renderer, &request).await.unwrap();

    assert_eq!(renderer.header("user-agent").as_deref(), Some("Caller/9.9"));
    assert_eq!(renderer.header("referer").as_deref(), Some(ORIGIN));
    assert_eq!(renderer.header("origin").as_deref(), Some(ORIGIN));
    assert_eq!(renderer.header("accept").as_deref(), Some("*/*"));
    assert_eq!(
        renderer.header("accept-encoding").as_deref(),
        Some("gzip, deflate, br")
    );
}

#[tokio::test]
async fn default_user_agent_without_caller_agent() {
    let renderer = FakeRenderer::new(PageScript::serving("<html></html>"));
    let request = TargetRequest::new("https://example.com", None);

    render(&renderer, &request).await.unwrap();

    assert_eq!(
        renderer.header("user-agent").as_deref(),
        Some(DEFAULT_USER_AGENT)
    );
}

#[tokio::test]
async fn navigation_timeout_fails_and_closes_page() {
    let renderer = FakeRenderer::new(PageScript {
        navigation_delay: Duration::from_secs(5),
        ..PageScript::serving("<html></html>")
    });
    let request = TargetRequest::new("https://example.com/slow", None);

    let err = render(&renderer, &request).await.unwrap_err();

    assert!(matches!(err, ProxyError::Render(_)));
    assert!(err.to_string().contains("navigation timed out after 100ms"));
    assert_eq!(renderer.active_contexts(), 0);
}

#[tokio::test]
async fn readiness_timeout_fails_and_closes_page() {
    let renderer = FakeRenderer::new(PageScript {
        readiness_delay: Duration::from_secs(5),
        ..PageScript::serving("<html></html>")
    });
    let request = TargetRequest::new("https://example.com/never-ready", None);

    let err = render(&renderer, &request).await.unwrap_err();

    assert!(err.to_string().contains("`body`"));
    assert_eq!(renderer.active_contexts(), 0);
}

#[tokio::test]
async fn navigation_error_is_a_render_failure() {
    let renderer = FakeRenderer::new(PageScript {
        navigation_error: Some("net::ERR_NAME_NOT_RESOLVED".into()),
        ..PageScript::default()
    });
    let request = TargetRequest::new("https://nowhere.invalid", None);

    let err = render(&renderer, &request).await.unwrap_err();

    assert!(matches!(err, ProxyError::Render(_)));
    assert!(err.to_string().contains("ERR_NAME_NOT_RESOLVED"));
    assert_eq!(renderer.active_contexts(), 0);
}

#[tokio::test]
async fn cancellation_stops_render_and_closes_page() {
    let renderer = Arc::new(FakeRenderer::new(PageScript {
        navigation_delay: Duration::from_secs(5),
        ..PageScript::serving("<html></html>")
    }));
    let request = TargetRequest::new("https://example.com/slow", None);
    let cancel = CancellationToken::new();
    let opts = FetchOptions {
        navigation_timeout: Duration::from_secs(10),
        ..options()
    };

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = fetcher::render(&*renderer, &request, ORIGIN, &opts, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::Cancelled));
    assert_eq!(renderer.active_contexts(), 0);
}

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use link_guard::{
    AddressRange, DenyReason, FetchGuard, GuardConfig, GuardError, PreviewService, StaticResolver,
    DEFAULT_USER_AGENT,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOST: &str = "preview.test";

/// Guard that reaches the local mock server through `preview.test`.
///
/// Only the IPv4 loopback range is lifted; everything else stays reserved.
fn local_guard(config: GuardConfig) -> (FetchGuard, Arc<StaticResolver>) {
    let loopback: IpAddr = "127.0.0.1".parse().unwrap();
    let resolver = Arc::new(
        StaticResolver::new()
            .with_record(HOST, &[loopback])
            .with_record("internal.test", &["10.0.0.7".parse().unwrap()])
            .with_record("metadata.test", &["169.254.169.254".parse().unwrap()])
            .with_record(
                "mixed.test",
                &["93.184.216.34".parse().unwrap(), "192.168.0.10".parse().unwrap()],
            ),
    );
    let guard = FetchGuard::with_resolver(config.without_range("loopback"), resolver.clone());
    (guard, resolver)
}

fn page_url(server: &MockServer, page: &str) -> String {
    format!("http://{HOST}:{}{page}", server.address().port())
}

#[tokio::test]
async fn test_og_title_end_to_end() {
    let server = MockServer::start().await;
    let html = r#"<html><head>
        <meta property="og:title" content="X">
        <meta property="og:description" content="A public page">
        <meta property="og:image" content="/static/cover.png">
    </head><body></body></html>"#;

    Mock::given(method("GET"))
        .and(path("/article"))
        .and(header("user-agent", DEFAULT_USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
        .expect(1)
        .mount(&server)
        .await;

    let (guard, _) = local_guard(GuardConfig::default());
    let url = page_url(&server, "/article");

    let preview = guard.validate_and_fetch(&url).await.unwrap();

    assert_eq!(preview.title, "X");
    assert_eq!(preview.description, "A public page");
    assert_eq!(preview.image_url, page_url(&server, "/static/cover.png"));
    assert_eq!(preview.site_name, HOST);
    assert_eq!(preview.content_type, "text/html");
    assert_eq!(preview.status, Some(200));
    assert_eq!(preview.url, url);
}

#[tokio::test]
async fn test_non_success_status_still_extracted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_raw("<title>Not Found</title>", "text/html"),
        )
        .mount(&server)
        .await;

    let (guard, _) = local_guard(GuardConfig::default());

    let preview = guard
        .validate_and_fetch(&page_url(&server, "/missing"))
        .await
        .unwrap();

    assert_eq!(preview.status, Some(404));
    assert_eq!(preview.title, "Not Found");
}

#[tokio::test]
async fn test_json_body_is_projected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/item"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "Widget",
            "summary": "A widget",
            "instanceId": "i-1234567890abcdef0",
            "credentials": { "token": "super-secret" }
        })))
        .mount(&server)
        .await;

    let (guard, _) = local_guard(GuardConfig::default());

    let preview = guard
        .validate_and_fetch(&page_url(&server, "/api/item"))
        .await
        .unwrap();
    let rendered = serde_json::to_string(&preview).unwrap();

    assert_eq!(preview.title, "Widget");
    assert_eq!(preview.description, "A widget");
    assert_eq!(preview.content_type, "application/json");
    assert!(!rendered.contains("i-1234567890abcdef0"));
    assert!(!rendered.contains("super-secret"));
}

#[tokio::test]
async fn test_redirect_followed_after_revalidation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/short"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/landing"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/landing"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"<meta property="og:title" content="Landing">"#, "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (guard, resolver) = local_guard(GuardConfig::default());

    let result = guard.fetch(&page_url(&server, "/short")).await.unwrap();

    assert_eq!(result.status.as_u16(), 200);
    assert_eq!(result.chain.len(), 2);
    assert_eq!(result.final_url.as_str(), page_url(&server, "/landing"));
    assert_eq!(resolver.lookups(), 2);
}

#[tokio::test]
async fn test_redirect_to_metadata_endpoint_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bounce"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "http://169.254.169.254/latest/meta-data/"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (guard, _) = local_guard(GuardConfig::default());

    let result = guard.validate_and_fetch(&page_url(&server, "/bounce")).await;

    match result {
        Err(e @ GuardError::BlockedPrivateAddress { .. }) => {
            assert_eq!(e.status_class(), 403);
            assert!(!e.user_message().contains("169.254"));
        }
        other => panic!("expected redirect to be blocked, got {other:?}"),
    }
}

#[tokio::test]
async fn test_redirect_to_internal_hostname_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bounce"))
        .respond_with(
            ResponseTemplate::new(307).insert_header("Location", "http://internal.test/admin"),
        )
        .mount(&server)
        .await;

    let (guard, _) = local_guard(GuardConfig::default());

    let result = guard.fetch(&page_url(&server, "/bounce")).await;
    assert!(matches!(
        result,
        Err(GuardError::BlockedPrivateAddress { address, .. }) if address.to_string() == "10.0.0.7"
    ));
}

#[tokio::test]
async fn test_redirect_to_disallowed_scheme_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bounce"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "file:///etc/passwd"))
        .mount(&server)
        .await;

    let (guard, _) = local_guard(GuardConfig::default());

    let result = guard.fetch(&page_url(&server, "/bounce")).await;
    assert!(matches!(result, Err(GuardError::DisallowedProtocol(_))));
}

#[tokio::test]
async fn test_metadata_host_denied_before_any_request() {
    let server = MockServer::start().await;
    let (guard, resolver) = local_guard(GuardConfig::default());

    let port = server.address().port();
    let result = guard
        .validate_and_fetch(&format!("http://metadata.test:{port}/latest/meta-data/"))
        .await;

    assert!(matches!(
        result,
        Err(GuardError::BlockedPrivateAddress { .. })
    ));
    assert_eq!(resolver.lookups(), 1);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mixed_answer_denied() {
    let (guard, _) = local_guard(GuardConfig::default());

    let verdict = guard.validate("https://mixed.test/").await;
    assert_eq!(verdict.reason(), Some(DenyReason::BlockedPrivateAddress));
}

#[tokio::test]
async fn test_default_config_blocks_loopback_literal() {
    let server = MockServer::start().await;
    let resolver = Arc::new(StaticResolver::new());
    let guard = FetchGuard::with_resolver(GuardConfig::default(), resolver.clone());

    let url = format!("http://127.0.0.1:{}/anything?q=1", server.address().port());
    let result = guard.validate_and_fetch(&url).await;

    assert!(matches!(
        result,
        Err(GuardError::BlockedPrivateAddress { .. })
    ));
    assert_eq!(resolver.lookups(), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_body_size_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![b'a'; 8 * 1024], "text/plain"))
        .mount(&server)
        .await;

    let (guard, _) = local_guard(GuardConfig::default().with_max_content_size(1024));

    let result = guard.fetch(&page_url(&server, "/huge")).await;
    assert!(matches!(
        result,
        Err(GuardError::ContentTooLarge { limit: 1024 })
    ));
}

#[tokio::test]
async fn test_fetch_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<title>late</title>", "text/html")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let (guard, _) =
        local_guard(GuardConfig::default().with_fetch_timeout(Duration::from_millis(300)));

    let result = guard.fetch(&page_url(&server, "/slow")).await;
    match result {
        Err(e @ GuardError::FetchTimeout(_)) => {
            assert!(e.is_retryable());
            assert_eq!(e.status_class(), 504);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_timeout_spans_redirect_chain() {
    let server = MockServer::start().await;
    for (from, to) in [("/hop1", "/hop2"), ("/hop2", "/hop3"), ("/hop3", "/end")] {
        Mock::given(method("GET"))
            .and(path(from))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", to)
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/end"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<title>end</title>", "text/html"))
        .mount(&server)
        .await;

    // Each hop alone fits in the budget; the chain does not.
    let (guard, _) =
        local_guard(GuardConfig::default().with_fetch_timeout(Duration::from_millis(1000)));

    let started = std::time::Instant::now();
    let result = guard.fetch(&page_url(&server, "/hop1")).await;

    assert!(matches!(result, Err(GuardError::FetchTimeout(_))));
    assert!(started.elapsed() < Duration::from_millis(1400));
}

#[tokio::test]
async fn test_latin1_page_decoded_by_charset() {
    let server = MockServer::start().await;
    let html = b"<html><head><title>Caf\xe9</title>\
        <meta name=\"description\" content=\"Cr\xe8me br\xfbl\xe9e\"></head></html>"
        .to_vec();

    Mock::given(method("GET"))
        .and(path("/latin1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=iso-8859-1"),
        )
        .mount(&server)
        .await;

    let (guard, _) = local_guard(GuardConfig::default());

    let preview = guard
        .validate_and_fetch(&page_url(&server, "/latin1"))
        .await
        .unwrap();

    assert_eq!(preview.title, "Caf\u{e9}");
    assert_eq!(preview.description, "Cr\u{e8}me br\u{fb}l\u{e9}e");
    assert_eq!(preview.content_type, "text/html");
}

#[tokio::test]
async fn test_extra_reserved_range_blocks_public_looking_host() {
    let resolver = Arc::new(
        StaticResolver::new().with_record("docs.test", &["198.51.100.20".parse().unwrap()]),
    );
    let open = FetchGuard::with_resolver(GuardConfig::default(), resolver.clone());
    assert!(open.validate("https://docs.test/").await.is_allowed());

    let config = GuardConfig::default().with_reserved_range(AddressRange::v4(
        "documentation",
        [198, 51, 100, 0],
        24,
    ));
    let guard = FetchGuard::with_resolver(config, resolver);

    match guard.validate("https://docs.test/").await.into_result() {
        Err(GuardError::BlockedPrivateAddress { range, .. }) => assert_eq!(range, "documentation"),
        other => panic!("expected documentation range to block, got {other:?}"),
    }
}

#[cfg(feature = "logging")]
#[tokio::test]
async fn test_denial_audit_names_address_user_message_does_not() {
    use link_guard::{log_denial_card, LogLevelGuard};

    let logs = LogLevelGuard::capture("warn");
    let (guard, _) = local_guard(GuardConfig::default());
    let url = "http://metadata.test/latest/meta-data/";

    let e = guard.validate_and_fetch(url).await.unwrap_err();
    log_denial_card(url, &e);

    let captured = logs.captured();
    assert!(captured.contains("169.254.169.254"));
    assert!(captured.contains("link-local"));
    assert!(!e.user_message().contains("169.254.169.254"));
}

#[tokio::test]
async fn test_connection_refused_is_upstream_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let (guard, _) = local_guard(GuardConfig::default());

    let result = guard
        .fetch(&format!("http://{HOST}:{port}/gone"))
        .await;
    assert!(matches!(result, Err(GuardError::UpstreamError(_))));
}

#[tokio::test]
async fn test_preview_service_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"<meta property="og:title" content="Batch">"#, "text/html"),
        )
        .mount(&server)
        .await;

    let (guard, _) = local_guard(GuardConfig::default());
    let service = PreviewService::with_guard_and_limit(guard, 2);

    let ok = page_url(&server, "/ok");
    let urls = [
        ok.as_str(),
        "ftp://example.com/file",
        "not a url",
        "http://internal.test/",
    ];
    let results = service.generate_previews(&urls).await;

    assert_eq!(results.len(), 4);
    assert_eq!(results[0].1.as_ref().unwrap().title, "Batch");
    assert_eq!(
        results[1].1.as_ref().unwrap_err().deny_reason(),
        Some(DenyReason::DisallowedProtocol)
    );
    assert_eq!(
        results[2].1.as_ref().unwrap_err().deny_reason(),
        Some(DenyReason::InvalidUrl)
    );
    assert_eq!(results[3].1.as_ref().unwrap_err().status_class(), 403);
}

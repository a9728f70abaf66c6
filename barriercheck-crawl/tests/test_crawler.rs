//! Crawler integration tests against a mock site

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use barriercheck_core::config::CrawlerConfig;
use barriercheck_crawl::crawler::{CrawlError, Crawler};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body.to_string())
}

async fn mock_site() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html lang="en"><head><title>Home</title></head><body>
               <a href="/about">About</a>
               <a href="/contact">Contact</a>
               <a href="/about">About again</a>
               <a href="https://elsewhere.example/off">Off-site</a>
               </body></html>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(html(
            r#"<html lang="en"><head><title>About</title></head><body>
               <a href="/">Home</a><a href="/team">Team</a></body></html>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/contact"))
        .respond_with(html(
            r#"<html lang="en"><head><title>Contact</title></head><body></body></html>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/team"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    server
}

fn crawler(max_pages: usize) -> Crawler {
    Crawler::new(&CrawlerConfig::default(), max_pages)
}

#[tokio::test]
async fn breadth_first_same_origin_with_dedup() {
    let server = mock_site().await;
    let cancel = CancellationToken::new();

    let outcome = crawler(10)
        .crawl(&server.uri(), &cancel)
        .await
        .unwrap();

    // Root first, then discovery order; /about only once, off-site never.
    let urls: Vec<&str> = outcome.pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls.len(), 4);
    assert!(urls[0].ends_with('/'));
    assert!(urls.contains(&format!("{}/about", server.uri()).as_str()));
    assert!(urls.contains(&format!("{}/contact", server.uri()).as_str()));
    assert!(urls.iter().all(|u| !u.contains("elsewhere")));

    assert!(!outcome.truncated);
}

#[tokio::test]
async fn max_pages_one_yields_exactly_the_root() {
    let server = mock_site().await;
    let cancel = CancellationToken::new();

    let outcome = crawler(1)
        .crawl(&server.uri(), &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.pages.len(), 1);
    assert_eq!(outcome.pages[0].title.as_deref(), Some("Home"));
    assert!(outcome.truncated);
}

#[tokio::test]
async fn non_root_failure_is_recorded_not_fatal() {
    let server = mock_site().await;
    let cancel = CancellationToken::new();

    let outcome = crawler(10)
        .crawl(&server.uri(), &cancel)
        .await
        .unwrap();

    let team = outcome
        .pages
        .iter()
        .find(|p| p.url.ends_with("/team"))
        .expect("failed page recorded");
    assert_eq!(team.status, 500);
    assert!(!team.is_ok());
    assert_eq!(outcome.pages_failed(), 1);
    assert_eq!(outcome.pages_crawled(), 3);
}

#[tokio::test]
async fn unreachable_root_is_fatal() {
    let cancel = CancellationToken::new();

    // Nothing listens on port 1.
    let result = crawler(5).crawl("http://127.0.0.1:1/", &cancel).await;

    assert!(matches!(result, Err(CrawlError::RootUnreachable(_))));
}

#[tokio::test]
async fn root_http_error_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let result = crawler(5).crawl(&server.uri(), &cancel).await;

    assert!(matches!(result, Err(CrawlError::RootUnreachable(_))));
}

#[tokio::test]
async fn invalid_scheme_is_rejected() {
    let cancel = CancellationToken::new();
    let result = crawler(5).crawl("ftp://example.com/", &cancel).await;
    assert!(matches!(result, Err(CrawlError::InvalidUrl { .. })));
}

#[tokio::test]
async fn cancellation_stops_the_crawl() {
    let server = mock_site().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = crawler(10).crawl(&server.uri(), &cancel).await;
    assert!(matches!(result, Err(CrawlError::Cancelled)));
}

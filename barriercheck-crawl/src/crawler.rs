//! Bounded breadth-first crawler
//!
//! Starts at the submitted root, follows same-origin links discovered in
//! each page's DOM, deduplicates by canonical URL and stops when the page
//! cap is reached, the frontier empties or the crawl budget runs out.
//! Non-root fetch failures are recorded on the page and the crawl
//! continues; a root failure is fatal.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::{redirect, Client};
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use barriercheck_core::config::CrawlerConfig;
use barriercheck_core::domain::{CrawlOutcome, PageSnapshot};

/// Fatal crawl errors. Per-page failures are not errors; they are recorded
/// on the page snapshot.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Invalid root URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Root URL unreachable: {0}")]
    RootUnreachable(String),

    #[error("Crawl cancelled")]
    Cancelled,
}

/// Policy hook deciding whether a discovered URL may be fetched.
///
/// Defaults to allow-all; a robots.txt gate can be plugged in here.
pub type UrlPolicy = Arc<dyn Fn(&Url) -> bool + Send + Sync>;

/// Same-origin breadth-first crawler.
pub struct Crawler {
    client: Client,
    max_pages: usize,
    budget: Duration,
    policy: UrlPolicy,
}

impl Crawler {
    pub fn new(config: &CrawlerConfig, max_pages: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .redirect(redirect::Policy::limited(5))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build crawler HTTP client, using defaults");
                Client::new()
            });

        Self {
            client,
            max_pages: max_pages.max(1),
            budget: Duration::from_secs(config.crawl_budget_seconds),
            policy: Arc::new(|_| true),
        }
    }

    /// Replace the URL admission policy.
    pub fn with_url_policy(mut self, policy: UrlPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Crawl from `root_url`, observing cancellation between fetches.
    pub async fn crawl(
        &self,
        root_url: &str,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome, CrawlError> {
        let root = Url::parse(root_url).map_err(|e| CrawlError::InvalidUrl {
            url: root_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(root.scheme(), "http" | "https") {
            return Err(CrawlError::InvalidUrl {
                url: root_url.to_string(),
                reason: format!("unsupported scheme `{}`", root.scheme()),
            });
        }

        let started = Instant::now();
        let mut seen: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<Url> = VecDeque::new();
        let mut pages: Vec<PageSnapshot> = Vec::new();
        let mut truncated = false;

        // The root is fetched first and its failure is fatal.
        let root_page = self.fetch_page(&root, cancel).await?;
        if let Some(err) = &root_page.error {
            return Err(CrawlError::RootUnreachable(err.clone()));
        }
        // Dedup against the URL the root resolved to, not only the request.
        let resolved_root =
            Url::parse(&root_page.url).unwrap_or_else(|_| root.clone());
        seen.insert(canonical_url(&root));
        seen.insert(canonical_url(&resolved_root));

        let origin = resolved_root.clone();
        enqueue_links(
            &root_page.html,
            &resolved_root,
            &origin,
            &self.policy,
            &mut seen,
            &mut frontier,
        );
        pages.push(root_page);

        while let Some(next) = frontier.pop_front() {
            if pages.len() >= self.max_pages {
                truncated = true;
                break;
            }
            if started.elapsed() >= self.budget {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "Crawl budget consumed");
                truncated = true;
                break;
            }
            if cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            let page = self.fetch_page(&next, cancel).await?;
            if page.error.is_none() {
                if let Ok(final_url) = Url::parse(&page.url) {
                    enqueue_links(
                        &page.html,
                        &final_url,
                        &origin,
                        &self.policy,
                        &mut seen,
                        &mut frontier,
                    );
                }
            }
            pages.push(page);
        }

        if !frontier.is_empty() {
            truncated = true;
        }

        info!(
            root = %origin,
            pages = pages.len(),
            failed = pages.iter().filter(|p| !p.is_ok()).count(),
            truncated,
            "Crawl finished"
        );

        Ok(CrawlOutcome {
            base_url: origin.to_string(),
            pages,
            truncated,
        })
    }

    /// Fetch one page. Failures land in the snapshot's `error` field.
    async fn fetch_page(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<PageSnapshot, CrawlError> {
        let started = Instant::now();

        let response = tokio::select! {
            r = self.client.get(url.clone()).send() => r,
            _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
        };

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                let final_url = response.url().to_string();
                let body = tokio::select! {
                    b = response.text() => b,
                    _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
                };
                let fetch_ms = started.elapsed().as_millis() as u64;

                match body {
                    Ok(html) => {
                        debug!(url = %final_url, status, fetch_ms, "Fetched page");
                        let (title, lang) = head_metadata(&html);
                        let error = if (200..400).contains(&status) {
                            None
                        } else {
                            Some(format!("HTTP {}", status))
                        };
                        Ok(PageSnapshot {
                            url: final_url,
                            status,
                            fetched_at: Utc::now(),
                            fetch_ms,
                            title,
                            lang,
                            html,
                            error,
                        })
                    }
                    Err(e) => Ok(failed_page(url, status, started, e.to_string())),
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Page fetch failed");
                Ok(failed_page(url, 0, started, e.to_string()))
            }
        }
    }
}

fn failed_page(url: &Url, status: u16, started: Instant, error: String) -> PageSnapshot {
    PageSnapshot {
        url: url.to_string(),
        status,
        fetched_at: Utc::now(),
        fetch_ms: started.elapsed().as_millis() as u64,
        title: None,
        lang: None,
        html: String::new(),
        error: Some(error),
    }
}

/// Canonical form used for dedup: scheme + host + port + path + sorted
/// query, fragment dropped.
pub fn canonical_url(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let query = if pairs.is_empty() {
        String::new()
    } else {
        let joined: Vec<String> = pairs
            .into_iter()
            .map(|(k, v)| if v.is_empty() { k } else { format!("{}={}", k, v) })
            .collect();
        format!("?{}", joined.join("&"))
    };

    let port = url
        .port()
        .map(|p| format!(":{}", p))
        .unwrap_or_default();

    format!(
        "{}://{}{}{}{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        port,
        url.path(),
        query
    )
}

/// Discover same-origin links in a page and push the unseen ones.
fn enqueue_links(
    html: &str,
    page_url: &Url,
    origin: &Url,
    policy: &UrlPolicy,
    seen: &mut HashSet<String>,
    frontier: &mut VecDeque<Url>,
) {
    let anchor = Selector::parse("a[href]").expect("static selector");
    let document = Html::parse_document(html);

    for element in document.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(mut resolved) = page_url.join(href) else {
            continue;
        };
        resolved.set_fragment(None);

        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        if resolved.host_str() != origin.host_str() || resolved.port() != origin.port() {
            continue;
        }
        if !(policy)(&resolved) {
            continue;
        }

        let canonical = canonical_url(&resolved);
        if seen.insert(canonical) {
            frontier.push_back(resolved);
        }
    }
}

/// Title and `<html lang>` pulled out at fetch time.
fn head_metadata(html: &str) -> (Option<String>, Option<String>) {
    let document = Html::parse_document(html);

    let title_sel = Selector::parse("title").expect("static selector");
    let title = document
        .select(&title_sel)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let html_sel = Selector::parse("html").expect("static selector");
    let lang = document
        .select(&html_sel)
        .next()
        .and_then(|h| h.value().attr("lang"))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());

    (title, lang)
}

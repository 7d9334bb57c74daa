//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small WordPress site and run the
//! full discovery and scraping cycle against it end-to-end.

use chrono::NaiveDate;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wp_harvest::config::{Config, CrawlerConfig, OutputConfig, SiteConfig};
use wp_harvest::crawler::{Coordinator, CrawlMode, CrawlOptions};
use wp_harvest::state::{ArticleStatus, PageFetchStatus};
use wp_harvest::storage::{RunStatus, SqliteStorage, Storage};
use wp_harvest::RawCommentRecord;

/// Creates a test configuration covering January 2017 on the mock server
fn create_test_config(base_url: &str, dir: &Path) -> Config {
    Config {
        crawler: CrawlerConfig {
            start_date: NaiveDate::from_ymd_opt(2017, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2017, 1, 31),
            request_delay_seconds: 0.01, // Very short for testing
            max_retries: 0,
            timeout_seconds: 5,
            max_comment_depth: 32,
            worker_count: 2,
            backoff_cap_seconds: 0.05,
            claim_batch_size: 10,
            max_archive_pages: 5,
        },
        site: SiteConfig {
            base_url: base_url.to_string(),
            user_agent: "wp-harvest-test/1.0".to_string(),
        },
        output: OutputConfig {
            database_path: dir.join("progress.db").display().to_string(),
            corpus_dir: dir.join("corpus").display().to_string(),
        },
    }
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html; charset=utf-8")
}

fn comment(id: u32, parent: Option<u32>, time: &str) -> String {
    let parent_attr = parent
        .map(|p| format!(r#" data-parent-id="{}""#, p))
        .unwrap_or_default();
    format!(
        r#"<li id="comment-{id}" class="comment"{parent_attr}>
             <div class="comment-author"><b class="fn">user{id}</b></div>
             <div class="comment-metadata"><time datetime="2017-01-20T{time}:00+00:00">x</time></div>
             <div class="comment-content"><p>Comment number {id}</p></div>
           </li>"#
    )
}

fn archive_page(base_url: &str, slugs: &[&str]) -> String {
    let items: String = slugs
        .iter()
        .map(|slug| {
            format!(
                r#"<article><h2 class="entry-title"><a href="{}/2017/01/20/{}/">{}</a></h2></article>"#,
                base_url, slug, slug
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", items)
}

fn article_page(base_url: &str, slug: &str, comments: &[String], pages: u32) -> String {
    let pagination: String = (2..=pages)
        .map(|p| {
            format!(
                r#"<a class="page-numbers" href="{}/2017/01/20/{}/comment-page-{}/#comments">{}</a>"#,
                base_url, slug, p, p
            )
        })
        .collect();
    format!(
        r#"<html><body>
             <article>
               <h1 class="entry-title">Article {slug}</h1>
               <span class="byline"><a href="/author/a/">Anthony</a></span>
               <div class="entry-content"><p>Body of {slug}.</p></div>
             </article>
             <div id="comments">
               <h2 class="comments-title">4 thoughts on &ldquo;{slug}&rdquo;</h2>
               <ol class="comment-list">{comments}</ol>
               {pagination}
             </div>
           </body></html>"#,
        comments = comments.join("\n"),
    )
}

async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_rebuilds_threads_across_pages() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    let dir = tempfile::tempdir().unwrap();

    mount_page(&server, "/2017/01/", archive_page(&base_url, &["alpha", "beta"])).await;

    // Page 1 holds a reply whose parent only appears on page 2
    mount_page(
        &server,
        "/2017/01/20/alpha/",
        article_page(
            &base_url,
            "alpha",
            &[comment(10, None, "10:00"), comment(12, Some(11), "10:30")],
            2,
        ),
    )
    .await;
    // Page 2 overlaps page 1 by one comment
    mount_page(
        &server,
        "/2017/01/20/alpha/comment-page-2/",
        article_page(
            &base_url,
            "alpha",
            &[
                comment(10, None, "10:00"),
                comment(11, None, "10:10"),
                comment(13, Some(10), "10:40"),
            ],
            2,
        ),
    )
    .await;
    // beta is not mounted and answers 404

    let config = create_test_config(&base_url, dir.path());
    let coordinator = Coordinator::new(config, "test-hash").unwrap();
    let report = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    let discovery = report.discovery.unwrap();
    assert_eq!(discovery.new_articles, 2);
    assert_eq!(discovery.months_scanned, 1);

    let schedule = report.schedule.unwrap();
    assert_eq!(schedule.scraped, 1);
    assert_eq!(schedule.unavailable, 1);
    assert_eq!(schedule.comments_emitted, 4);

    assert_eq!(report.statistics.count(ArticleStatus::Scraped), 1);
    assert_eq!(report.statistics.count(ArticleStatus::Unavailable), 1);
    assert_eq!(report.statistics.comment_pages_done, 2);

    let text =
        std::fs::read_to_string(dir.path().join("corpus").join("20170120_alpha.txt")).unwrap();
    assert!(text.contains("TITLE: Article alpha"));
    assert!(text.contains("COMMENTS (4 total):"));

    let position = |id: &str| text.find(&format!("[ID]: {}\n", id)).unwrap();
    assert!(position("10") < position("13"));
    assert!(position("13") < position("11"));
    assert!(position("11") < position("12"));
    assert!(text.contains("[REPLY to Comment #3]"));
}

#[tokio::test]
async fn test_resumed_article_fetches_only_missing_pages() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    let dir = tempfile::tempdir().unwrap();
    let article_url = format!("{}/2017/01/20/gamma/", base_url);

    Mock::given(method("GET"))
        .and(path("/2017/01/20/gamma/"))
        .respond_with(html(article_page(
            &base_url,
            "gamma",
            &[comment(20, None, "09:00")],
            3,
        )))
        .expect(1)
        .mount(&server)
        .await;
    // Page 2 was recorded by the interrupted attempt and must not be refetched
    Mock::given(method("GET"))
        .and(path("/2017/01/20/gamma/comment-page-2/"))
        .respond_with(html(String::new()))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2017/01/20/gamma/comment-page-3/"))
        .respond_with(html(article_page(
            &base_url,
            "gamma",
            &[comment(22, Some(21), "09:20")],
            3,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&base_url, dir.path());
    {
        let mut storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
        let (article, _) = storage.register_article(&article_url, None).unwrap();
        let earlier = RawCommentRecord {
            comment_id: "21".to_string(),
            parent_id: Some("20".to_string()),
            author: "user21".to_string(),
            author_url: None,
            timestamp: "2017-01-20T09:10:00+00:00".to_string(),
            text: "Comment number 21".to_string(),
            upvotes: 0,
            downvotes: 0,
            page_number: 2,
            position: 0,
            image_urls: vec![],
        };
        storage
            .record_comment_page(&article.article_id, 2, PageFetchStatus::Done, &[earlier])
            .unwrap();
    }

    let coordinator = Coordinator::new(config, "test-hash").unwrap();
    let options = CrawlOptions {
        mode: CrawlMode::ScrapeOnly,
        ..Default::default()
    };
    let report = coordinator.run(&options).await.unwrap();

    let schedule = report.schedule.unwrap();
    assert_eq!(schedule.scraped, 1);
    assert_eq!(schedule.comments_emitted, 3);
    assert_eq!(schedule.partial, 0);

    let text =
        std::fs::read_to_string(dir.path().join("corpus").join("20170120_gamma.txt")).unwrap();
    let position = |id: &str| text.find(&format!("[ID]: {}\n", id)).unwrap();
    assert!(position("20") < position("21"));
    assert!(position("21") < position("22"));
    assert!(text.contains("[Depth]: 2"));
}

#[tokio::test]
async fn test_rediscovery_is_idempotent() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/2017/01/"))
        .respond_with(html(archive_page(&base_url, &["alpha", "beta", "alpha"])))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&base_url, dir.path());
    let options = CrawlOptions {
        mode: CrawlMode::DiscoverOnly,
        ..Default::default()
    };

    let coordinator = Coordinator::new(config.clone(), "test-hash").unwrap();
    let first = coordinator.run(&options).await.unwrap();
    drop(coordinator);

    let coordinator = Coordinator::new(config, "test-hash").unwrap();
    let second = coordinator.run(&options).await.unwrap();

    let first = first.discovery.unwrap();
    assert_eq!(first.new_articles, 2);
    assert_eq!(first.months_scanned, 1);

    let second_discovery = second.discovery.unwrap();
    assert_eq!(second_discovery.months_skipped, 1);
    assert_eq!(second_discovery.new_articles, 0);
    assert_eq!(second.statistics.total_articles, 2);
    assert_eq!(second.statistics.count(ArticleStatus::Pending), 2);
}

#[tokio::test]
async fn test_failed_article_is_retried_on_request() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    let dir = tempfile::tempdir().unwrap();
    let article_url = format!("{}/2017/01/20/delta/", base_url);

    // Both attempts of the first run fail, every later request succeeds
    Mock::given(method("GET"))
        .and(path("/2017/01/20/delta/"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/2017/01/20/delta/",
        article_page(&base_url, "delta", &[comment(30, None, "08:00")], 1),
    )
    .await;

    let mut config = create_test_config(&base_url, dir.path());
    config.crawler.max_retries = 1;
    {
        let mut storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
        storage.register_article(&article_url, None).unwrap();
    }

    let scrape_only = CrawlOptions {
        mode: CrawlMode::ScrapeOnly,
        ..Default::default()
    };
    let coordinator = Coordinator::new(config.clone(), "test-hash").unwrap();
    let first = coordinator.run(&scrape_only).await.unwrap();
    assert_eq!(first.schedule.unwrap().failed, 1);
    assert_eq!(first.statistics.count(ArticleStatus::Failed), 1);

    // Without --retry-failed the failure stays put
    let second = coordinator.run(&scrape_only).await.unwrap();
    assert_eq!(second.schedule.unwrap().attempted, 0);

    let retry = CrawlOptions {
        retry_failed: true,
        ..scrape_only
    };
    let third = coordinator.run(&retry).await.unwrap();
    assert_eq!(third.retried, 1);
    assert_eq!(third.schedule.unwrap().scraped, 1);
    assert_eq!(third.statistics.count(ArticleStatus::Scraped), 1);
}

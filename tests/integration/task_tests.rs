//! Integration tests for task execution
//!
//! These tests use wiremock to serve a sitemap, robots.txt and pages, and
//! run whole tasks through the scheduler: resolution, politeness, fetching,
//! extraction and hand-off to a sink.

use sitemap_harvest::config::TaskConfig;
use sitemap_harvest::crawler::{FetchClient, PolitenessGate, TaskEvent, TaskHandle, TaskScheduler};
use sitemap_harvest::extract::{ContentKind, ExtractedDocument, FieldValue, Rule};
use sitemap_harvest::storage::{
    DuplicateStrategy, MemorySink, ResultSink, SqliteSink, SqliteStorage, Storage, StorageResult,
    StoreOutcome,
};
use sitemap_harvest::{HarvestError, PageStatus, TaskStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast task configuration for the sitemap served by `server`
fn create_test_config(server: &MockServer) -> TaskConfig {
    let mut config = TaskConfig::for_sitemap(format!("{}/sitemap.xml", server.uri()));
    config.delay_min_ms = 0;
    config.delay_max_ms = 1;
    config.timeout_ms = 5_000;
    config.max_retries = 0;
    config.retry.initial_backoff_ms = 10;
    config.retry.max_backoff_ms = 50;
    config.retry.jitter = 0.0;
    config
}

fn scheduler(sink: Arc<dyn ResultSink>) -> TaskScheduler {
    let client = FetchClient::new(10).expect("Failed to build client");
    let gate = Arc::new(PolitenessGate::new(client.http().clone(), 2));
    TaskScheduler::new(gate, client, sink)
}

async fn mount_sitemap(server: &MockServer, pages: &[&str]) {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for page in pages {
        xml.push_str(&format!("<url><loc>{}{}</loc></url>", server.uri(), page));
    }
    xml.push_str("</urlset>");

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(xml))
        .mount(server)
        .await;
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, at: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html.to_string())
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn title_rule() -> Vec<Rule> {
    vec![Rule::new("title", "h1", ContentKind::Text)]
}

/// Waits for a task with a generous upper bound
async fn finish(task: &TaskHandle) -> sitemap_harvest::TaskProgress {
    tokio::time::timeout(Duration::from_secs(20), task.wait())
        .await
        .expect("task did not finish in time")
}

/// Receives events until one matches `predicate`
async fn wait_for_event(
    events: &mut mpsc::UnboundedReceiver<TaskEvent>,
    predicate: impl Fn(&TaskEvent) -> bool,
) -> TaskEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event never arrived")
}

fn drain(events: &mut mpsc::UnboundedReceiver<TaskEvent>) -> Vec<TaskEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test]
async fn test_task_extracts_heading() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_sitemap(&server, &["/article"]).await;
    mount_page(
        &server,
        "/article",
        "<html><head><title>Ignored</title></head><body><h1>Title</h1></body></html>",
    )
    .await;

    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink.clone());
    let task = scheduler
        .schedule(create_test_config(&server), title_rule())
        .unwrap();
    task.start().unwrap();

    let progress = finish(&task).await;

    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.total, 1);
    assert_eq!(progress.succeeded, 1);

    let url = format!("{}/article", server.uri());
    let document = sink.document(&url).expect("document should be stored");
    assert_eq!(document.task_id, task.id());
    assert_eq!(
        document.fields.get("title"),
        Some(&FieldValue::Single(Some("Title".to_string())))
    );
    assert!(document.errors.is_empty());

    let page = sink.page(task.id(), &url).unwrap();
    assert_eq!(page.status, PageStatus::Parsed);
    assert_eq!(page.http_status, Some(200));
    assert!(page.fetched_at.is_some());
}

#[tokio::test]
async fn test_single_worker_processes_pages_one_at_a_time() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_sitemap(&server, &["/one", "/two"]).await;
    mount_page(&server, "/one", "<h1>One</h1>").await;
    mount_page(&server, "/two", "<h1>Two</h1>").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink).with_events(tx);

    let mut config = create_test_config(&server);
    config.concurrency = 1;
    let task = scheduler.schedule(config, title_rule()).unwrap();
    task.start().unwrap();

    let progress = finish(&task).await;
    assert_eq!(progress.status, TaskStatus::Completed);

    let events = drain(&mut rx);
    let page_events: Vec<(String, PageStatus)> = events
        .iter()
        .filter_map(|event| match event {
            TaskEvent::Page(page) => Some((page.url.clone(), page.status)),
            TaskEvent::Progress(_) => None,
        })
        .collect();

    let one = format!("{}/one", server.uri());
    let two = format!("{}/two", server.uri());
    assert_eq!(
        page_events,
        vec![
            (one.clone(), PageStatus::Fetching),
            (one, PageStatus::Parsed),
            (two.clone(), PageStatus::Fetching),
            (two, PageStatus::Parsed),
        ]
    );

    // Completion is published after the last page reached a terminal status
    let last_page = events
        .iter()
        .rposition(|event| matches!(event, TaskEvent::Page(_)))
        .unwrap();
    let completed = events
        .iter()
        .position(|event| {
            matches!(event, TaskEvent::Progress(p) if p.status == TaskStatus::Completed)
        })
        .unwrap();
    assert!(completed > last_page);
}

#[tokio::test]
async fn test_pause_lets_in_flight_fetch_finish() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_sitemap(&server, &["/slow", "/next"]).await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<h1>Slow</h1>")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/next", "<h1>Next</h1>").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink).with_events(tx);

    let mut config = create_test_config(&server);
    config.concurrency = 1;
    let task = scheduler.schedule(config, title_rule()).unwrap();
    task.start().unwrap();

    let slow = format!("{}/slow", server.uri());
    let next = format!("{}/next", server.uri());

    wait_for_event(&mut rx, |event| {
        matches!(event, TaskEvent::Page(p) if p.url == slow && p.status == PageStatus::Fetching)
    })
    .await;
    task.pause().unwrap();
    assert_eq!(task.status(), TaskStatus::Paused);

    // The in-flight page still completes
    wait_for_event(&mut rx, |event| {
        matches!(event, TaskEvent::Page(p) if p.url == slow && p.status.is_terminal())
    })
    .await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|request| request.url.path() != "/next"));
    assert_eq!(task.pages_with_status(PageStatus::Pending).len(), 1);
    assert_eq!(task.pages_with_status(PageStatus::Pending)[0].url, next);
    assert_eq!(task.status(), TaskStatus::Paused);
    assert!(!task.is_finished());

    task.resume().unwrap();
    let progress = finish(&task).await;

    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.succeeded, 2);
}

#[tokio::test]
async fn test_robots_disallowed_pages_are_forbidden() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private").await;
    mount_sitemap(&server, &["/private/secret", "/public"]).await;
    mount_page(&server, "/public", "<h1>Public</h1>").await;

    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Secret</h1>"))
        .expect(0)
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink.clone());
    let task = scheduler
        .schedule(create_test_config(&server), title_rule())
        .unwrap();
    task.start().unwrap();

    let progress = finish(&task).await;

    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.forbidden, 1);
    assert_eq!(progress.succeeded, 1);

    let forbidden = task.pages_with_status(PageStatus::Forbidden);
    assert_eq!(forbidden.len(), 1);
    assert_eq!(forbidden[0].url, format!("{}/private/secret", server.uri()));
    assert!(forbidden[0].http_status.is_none());
    assert!(sink
        .document(&format!("{}/private/secret", server.uri()))
        .is_none());
}

#[tokio::test]
async fn test_robots_ignored_when_not_respected() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /").await;
    mount_sitemap(&server, &["/page"]).await;
    mount_page(&server, "/page", "<h1>Page</h1>").await;

    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink);
    let mut config = create_test_config(&server);
    config.respect_robots = false;
    let task = scheduler.schedule(config, title_rule()).unwrap();
    task.start().unwrap();

    let progress = finish(&task).await;

    assert_eq!(progress.succeeded, 1);
    assert_eq!(progress.forbidden, 0);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_sitemap(&server, &["/flaky"]).await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(&server, "/flaky", "<h1>Recovered</h1>").await;

    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink.clone());
    let mut config = create_test_config(&server);
    config.max_retries = 2;
    let task = scheduler.schedule(config, title_rule()).unwrap();
    task.start().unwrap();

    let progress = finish(&task).await;
    assert_eq!(progress.succeeded, 1);

    let page = &task.pages()[0];
    assert_eq!(page.status, PageStatus::Parsed);
    assert_eq!(page.retry_count, 1);
    assert_eq!(page.http_status, Some(200));
}

#[tokio::test]
async fn test_failed_page_records_error() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_sitemap(&server, &["/gone", "/fine"]).await;
    mount_page(&server, "/fine", "<h1>Fine</h1>").await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink);
    let mut config = create_test_config(&server);
    config.max_retries = 3;
    let task = scheduler.schedule(config, title_rule()).unwrap();
    task.start().unwrap();

    let progress = finish(&task).await;

    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.succeeded, 1);

    let errors = task.pages_with_status(PageStatus::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].http_status, Some(404));
    assert_eq!(errors[0].retry_count, 0);
    assert!(errors[0].error.is_some());
}

#[tokio::test]
async fn test_stop_leaves_remaining_pages_pending() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_sitemap(&server, &["/first", "/second", "/third"]).await;

    Mock::given(method("GET"))
        .and(path("/first"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<h1>First</h1>")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/second", "<h1>Second</h1>").await;
    mount_page(&server, "/third", "<h1>Third</h1>").await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink).with_events(tx);

    let mut config = create_test_config(&server);
    config.concurrency = 1;
    let task = scheduler.schedule(config, title_rule()).unwrap();
    task.start().unwrap();

    wait_for_event(&mut rx, |event| {
        matches!(event, TaskEvent::Page(p) if p.status == PageStatus::Fetching)
    })
    .await;
    task.stop().unwrap();

    let progress = finish(&task).await;

    assert_eq!(progress.status, TaskStatus::Stopped);
    assert_eq!(progress.processed, 1);
    assert_eq!(task.pages_with_status(PageStatus::Parsed).len(), 1);
    assert_eq!(task.pages_with_status(PageStatus::Pending).len(), 2);

    // A stopped task cannot be resumed
    assert!(task.resume().is_err());
}

#[tokio::test]
async fn test_counters_match_page_statuses() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /blocked").await;
    mount_sitemap(&server, &["/a", "/b", "/blocked", "/missing"]).await;
    mount_page(&server, "/a", "<h1>A</h1>").await;
    mount_page(&server, "/b", "<p>no heading</p>").await;

    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink.clone());
    let task = scheduler
        .schedule(create_test_config(&server), title_rule())
        .unwrap();
    task.start().unwrap();

    let progress = finish(&task).await;
    let pages = task.pages();

    assert_eq!(progress.total, pages.len() as u64);
    assert_eq!(
        progress.processed,
        progress.succeeded + progress.failed + progress.forbidden
    );
    assert_eq!(progress.processed, 4);
    assert_eq!(progress.succeeded, 2);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.forbidden, 1);
    assert!(pages.iter().all(|page| page.status.is_terminal()));

    // Optional rules with no match still produce a document
    let document = sink.document(&format!("{}/b", server.uri())).unwrap();
    assert_eq!(document.fields.get("title"), Some(&FieldValue::Single(None)));

    let history = sink.progress_history(task.id());
    assert_eq!(history.first().unwrap().status, TaskStatus::Scheduled);
    assert_eq!(history.last().unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_root_sitemap_failure_fails_task() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink);
    let task = scheduler
        .schedule(create_test_config(&server), title_rule())
        .unwrap();
    task.start().unwrap();

    let progress = finish(&task).await;

    assert_eq!(progress.status, TaskStatus::Error);
    assert!(progress
        .error
        .as_deref()
        .unwrap()
        .contains("Failed to resolve root sitemap"));
    assert!(task.pages().is_empty());
}

#[tokio::test]
async fn test_discovery_task_uses_robots_sitemap() {
    let server = MockServer::start().await;
    mount_robots(
        &server,
        &format!("User-agent: *\nAllow: /\nSitemap: {}/sitemap.xml", server.uri()),
    )
    .await;
    mount_sitemap(&server, &["/found"]).await;
    mount_page(&server, "/found", "<h1>Found</h1>").await;

    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink.clone());
    let mut config = create_test_config(&server);
    config.sitemap_url = server.uri();
    config.discover = true;
    let task = scheduler.schedule(config, title_rule()).unwrap();
    task.start().unwrap();

    let progress = finish(&task).await;

    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.succeeded, 1);
    assert!(sink.document(&format!("{}/found", server.uri())).is_some());
}

#[tokio::test]
async fn test_sqlite_sink_persists_task() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private").await;
    mount_sitemap(&server, &["/one", "/two", "/private"]).await;
    mount_page(&server, "/one", "<h1>One</h1>").await;
    mount_page(&server, "/two", "<h1>Two</h1>").await;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("harvest.db");

    let storage = SqliteStorage::new(&db_path).unwrap();
    let sink = Arc::new(SqliteSink::new(storage, DuplicateStrategy::Update));
    let scheduler = scheduler(sink);
    let task = scheduler
        .schedule(create_test_config(&server), title_rule())
        .unwrap();
    task.start().unwrap();

    let progress = finish(&task).await;
    assert_eq!(progress.status, TaskStatus::Completed);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let record = storage.get_task(task.id()).unwrap();
    assert_eq!(record.progress.status, TaskStatus::Completed);
    assert_eq!(record.progress.succeeded, 2);
    assert_eq!(record.progress.forbidden, 1);

    assert_eq!(storage.count_documents(task.id()).unwrap(), 2);
    assert_eq!(
        storage
            .get_pages_by_status(task.id(), PageStatus::Parsed)
            .unwrap()
            .len(),
        2
    );
    assert_eq!(
        storage
            .count_pages_by_status(task.id(), PageStatus::Forbidden)
            .unwrap(),
        1
    );

    let document = storage
        .get_latest_document(&format!("{}/one", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(
        document.fields.get("title"),
        Some(&FieldValue::Single(Some("One".to_string())))
    );
}

#[tokio::test]
async fn test_repeated_task_applies_duplicate_strategy() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_sitemap(&server, &["/page"]).await;
    mount_page(&server, "/page", "<h1>Page</h1>").await;

    let url = format!("{}/page", server.uri());

    for (strategy, expected_versions, expected_latest) in [
        (DuplicateStrategy::Ignore, 1, 1),
        (DuplicateStrategy::Update, 1, 2),
        (DuplicateStrategy::Version, 2, 2),
    ] {
        let sink = Arc::new(MemorySink::new(strategy));
        let scheduler = scheduler(sink.clone());

        for _ in 0..2 {
            let task = scheduler
                .schedule(create_test_config(&server), title_rule())
                .unwrap();
            task.start().unwrap();
            let progress = finish(&task).await;
            assert_eq!(progress.succeeded, 1);
        }

        let versions = sink.versions(&url);
        assert_eq!(versions.len(), expected_versions, "{:?}", strategy);
        assert_eq!(
            versions.last().unwrap().version,
            expected_latest,
            "{:?}",
            strategy
        );
    }
}

/// Sink whose document hand-off takes its worker down
struct CrashingSink;

impl ResultSink for CrashingSink {
    fn store_document(&self, document: ExtractedDocument) -> StorageResult<StoreOutcome> {
        panic!("sink crashed on {}", document.url);
    }
}

#[tokio::test]
async fn test_crashed_worker_fails_its_page() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_sitemap(&server, &["/only"]).await;
    mount_page(&server, "/only", "<h1>Only</h1>").await;

    let scheduler = scheduler(Arc::new(CrashingSink));
    let task = scheduler
        .schedule(create_test_config(&server), title_rule())
        .unwrap();
    task.start().unwrap();

    let progress = finish(&task).await;

    assert_eq!(progress.status, TaskStatus::Completed);
    assert_eq!(progress.processed, 1);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.succeeded, 0);

    let page = &task.pages()[0];
    assert_eq!(page.status, PageStatus::Error);
    assert!(page.error.as_deref().unwrap().contains("worker failed"));
}

#[tokio::test]
async fn test_crashed_last_worker_does_not_complete_task() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_sitemap(&server, &["/first", "/second"]).await;
    mount_page(&server, "/first", "<h1>First</h1>").await;
    mount_page(&server, "/second", "<h1>Second</h1>").await;

    let scheduler = scheduler(Arc::new(CrashingSink));
    let mut config = create_test_config(&server);
    config.concurrency = 1;
    let task = scheduler.schedule(config, title_rule()).unwrap();
    task.start().unwrap();

    let progress = finish(&task).await;

    assert_eq!(progress.status, TaskStatus::Error);
    assert!(progress.error.is_some());
    assert_eq!(task.pages_with_status(PageStatus::Error).len(), 1);
    assert_eq!(task.pages_with_status(PageStatus::Pending).len(), 1);
    assert!(task.pages_with_status(PageStatus::Fetching).is_empty());
}

#[tokio::test]
async fn test_retries_keep_crawl_delay() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nCrawl-delay: 0.3").await;
    mount_sitemap(&server, &["/flaky"]).await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_page(&server, "/flaky", "<h1>Recovered</h1>").await;

    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink);
    let mut config = create_test_config(&server);
    config.max_retries = 3;
    let task = scheduler.schedule(config, title_rule()).unwrap();

    let started = std::time::Instant::now();
    task.start().unwrap();
    let progress = finish(&task).await;

    // Three page attempts, each one crawl-delay apart
    assert!(started.elapsed() >= Duration::from_millis(600));
    assert_eq!(progress.succeeded, 1);

    let page = &task.pages()[0];
    assert_eq!(page.status, PageStatus::Parsed);
    assert_eq!(page.retry_count, 2);
}

#[test]
fn test_schedule_rejects_limits_the_shared_parts_cannot_apply() {
    let sink = Arc::new(MemorySink::new(DuplicateStrategy::Update));
    let scheduler = scheduler(sink);

    let mut config = TaskConfig::for_sitemap("https://example.com/sitemap.xml");
    config.per_domain_concurrency = 5;
    assert!(matches!(
        scheduler.schedule(config, Vec::new()),
        Err(HarvestError::Config(_))
    ));

    let mut config = TaskConfig::for_sitemap("https://example.com/sitemap.xml");
    config.max_redirects = 3;
    assert!(matches!(
        scheduler.schedule(config, Vec::new()),
        Err(HarvestError::Config(_))
    ));

    let config = TaskConfig::for_sitemap("https://example.com/sitemap.xml");
    assert!(scheduler.schedule(config, Vec::new()).is_ok());
}

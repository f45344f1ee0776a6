//! Integration tests for sitemap resolution
//!
//! These tests use wiremock to serve sitemaps, sitemap indexes and
//! robots.txt files and run the resolver against them end-to-end.

use flate2::write::GzEncoder;
use flate2::Compression;
use sitemap_harvest::config::TaskConfig;
use sitemap_harvest::crawler::{FetchClient, FetchSettings, PolitenessGate, PolitenessPolicy};
use sitemap_harvest::sitemap::{SitemapError, SitemapResolver};
use sitemap_harvest::{HarvestError, TaskStatus};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fetch settings without retries, so failing branches fail fast
fn test_settings() -> FetchSettings {
    let mut config = TaskConfig::for_sitemap("http://localhost/sitemap.xml");
    config.max_retries = 0;
    config.timeout_ms = 5_000;
    FetchSettings::from_task_config(&config)
}

fn resolver() -> SitemapResolver {
    SitemapResolver::new(FetchClient::new(10).unwrap(), test_settings())
}

fn urlset(locs: &[String]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for loc in locs {
        xml.push_str(&format!("<url><loc>{}</loc></url>", loc));
    }
    xml.push_str("</urlset>");
    xml
}

fn sitemap_index(locs: &[String]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for loc in locs {
        xml.push_str(&format!("<sitemap><loc>{}</loc></sitemap>", loc));
    }
    xml.push_str("</sitemapindex>");
    xml
}

fn gzip(data: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

async fn serve_xml(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "application/xml"),
        )
        .mount(server)
        .await;
}

fn url_strings(resolution: &sitemap_harvest::sitemap::Resolution) -> Vec<String> {
    resolution.urls().map(|url| url.to_string()).collect()
}

#[tokio::test]
async fn test_urlset_returns_its_locs() {
    let server = MockServer::start().await;
    let base = server.uri();

    serve_xml(
        &server,
        "/sitemap.xml",
        urlset(&[format!("{}/page1", base), format!("{}/page2", base)]),
    )
    .await;

    let root = Url::parse(&format!("{}/sitemap.xml", base)).unwrap();
    let resolution = resolver().resolve(&root, 3, 100).await.unwrap();

    assert_eq!(
        url_strings(&resolution),
        vec![format!("{}/page1", base), format!("{}/page2", base)]
    );
    assert_eq!(resolution.sitemaps_fetched, 1);
    assert!(resolution.branch_errors.is_empty());
    assert!(!resolution.truncated);
}

#[tokio::test]
async fn test_gzipped_index_and_nested_sitemap() {
    let server = MockServer::start().await;
    let base = server.uri();

    let index = sitemap_index(&[format!("{}/sitemap.xml.gz", base)]);
    let leaf = urlset(&[
        format!("{}/a", base),
        format!("{}/b", base),
        format!("{}/c", base),
    ]);

    Mock::given(method("GET"))
        .and(path("/sitemap_index.xml.gz"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(gzip(&index))
                .insert_header("content-type", "application/x-gzip"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/sitemap.xml.gz"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(gzip(&leaf))
                .insert_header("content-type", "application/x-gzip"),
        )
        .mount(&server)
        .await;

    let root = Url::parse(&format!("{}/sitemap_index.xml.gz", base)).unwrap();
    let resolution = resolver().resolve(&root, 3, 100).await.unwrap();

    assert_eq!(
        url_strings(&resolution),
        vec![
            format!("{}/a", base),
            format!("{}/b", base),
            format!("{}/c", base)
        ]
    );
    assert_eq!(resolution.sitemaps_fetched, 2);
}

#[tokio::test]
async fn test_index_cycle_fetches_each_sitemap_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/a.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sitemap_index(&[
            format!("{}/b.xml", base),
            format!("{}/pages.xml", base),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/b.xml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(sitemap_index(&[format!("{}/a.xml", base)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    serve_xml(&server, "/pages.xml", urlset(&[format!("{}/only", base)])).await;

    let root = Url::parse(&format!("{}/a.xml", base)).unwrap();
    let resolution = resolver().resolve(&root, 5, 100).await.unwrap();

    assert_eq!(url_strings(&resolution), vec![format!("{}/only", base)]);
    assert_eq!(resolution.sitemaps_fetched, 3);
}

#[tokio::test]
async fn test_depth_limit_skips_deeper_sitemaps() {
    let server = MockServer::start().await;
    let base = server.uri();

    serve_xml(
        &server,
        "/root.xml",
        sitemap_index(&[format!("{}/level1.xml", base)]),
    )
    .await;
    serve_xml(
        &server,
        "/level1.xml",
        sitemap_index(&[format!("{}/level2.xml", base)]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/level2.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[format!(
            "{}/deep",
            base
        )])))
        .expect(0)
        .mount(&server)
        .await;

    let root = Url::parse(&format!("{}/root.xml", base)).unwrap();
    let resolution = resolver().resolve(&root, 1, 100).await.unwrap();

    assert!(resolution.is_empty());
    assert_eq!(resolution.sitemaps_fetched, 2);
    assert_eq!(resolution.skipped_by_depth, 1);
}

#[tokio::test]
async fn test_url_limit_keeps_first_discovered() {
    let server = MockServer::start().await;
    let base = server.uri();

    let locs: Vec<String> = (1..=5).map(|i| format!("{}/p{}", base, i)).collect();
    serve_xml(&server, "/sitemap.xml", urlset(&locs)).await;

    let root = Url::parse(&format!("{}/sitemap.xml", base)).unwrap();
    let resolution = resolver().resolve(&root, 3, 3).await.unwrap();

    assert_eq!(url_strings(&resolution), locs[..3].to_vec());
    assert!(resolution.truncated);
}

#[tokio::test]
async fn test_duplicate_pages_across_sitemaps_kept_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    serve_xml(
        &server,
        "/index.xml",
        sitemap_index(&[format!("{}/one.xml", base), format!("{}/two.xml", base)]),
    )
    .await;
    serve_xml(
        &server,
        "/one.xml",
        urlset(&[format!("{}/shared", base), format!("{}/first", base)]),
    )
    .await;
    serve_xml(
        &server,
        "/two.xml",
        urlset(&[format!("{}/shared", base), format!("{}/second", base)]),
    )
    .await;

    let root = Url::parse(&format!("{}/index.xml", base)).unwrap();
    let resolution = resolver().resolve(&root, 3, 100).await.unwrap();

    assert_eq!(
        url_strings(&resolution),
        vec![
            format!("{}/shared", base),
            format!("{}/first", base),
            format!("{}/second", base)
        ]
    );
}

#[tokio::test]
async fn test_failed_branch_does_not_stop_siblings() {
    let server = MockServer::start().await;
    let base = server.uri();

    serve_xml(
        &server,
        "/index.xml",
        sitemap_index(&[format!("{}/missing.xml", base), format!("{}/good.xml", base)]),
    )
    .await;
    serve_xml(
        &server,
        "/good.xml",
        urlset(&[format!("{}/x", base), format!("{}/y", base)]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/missing.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let root = Url::parse(&format!("{}/index.xml", base)).unwrap();
    let resolution = resolver().resolve(&root, 3, 100).await.unwrap();

    assert_eq!(resolution.len(), 2);
    assert_eq!(resolution.branch_errors.len(), 1);

    let branch = &resolution.branch_errors[0];
    assert_eq!(branch.url, format!("{}/missing.xml", base));
    assert_eq!(branch.depth, 1);
    assert!(matches!(branch.error, SitemapError::Fetch(_)));
}

#[tokio::test]
async fn test_malformed_branch_is_reported() {
    let server = MockServer::start().await;
    let base = server.uri();

    serve_xml(
        &server,
        "/index.xml",
        sitemap_index(&[format!("{}/broken.xml", base), format!("{}/good.xml", base)]),
    )
    .await;
    serve_xml(&server, "/broken.xml", "<urlset><url><loc>".to_string()).await;
    serve_xml(&server, "/good.xml", urlset(&[format!("{}/x", base)])).await;

    let root = Url::parse(&format!("{}/index.xml", base)).unwrap();
    let resolution = resolver().resolve(&root, 3, 100).await.unwrap();

    assert_eq!(resolution.len(), 1);
    assert!(matches!(
        resolution.branch_errors[0].error,
        SitemapError::Malformed { .. }
    ));
}

#[tokio::test]
async fn test_root_failure_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let root = Url::parse(&format!("{}/sitemap.xml", server.uri())).unwrap();
    let result = resolver().resolve(&root, 3, 100).await;

    match result {
        Err(HarvestError::RootResolution { url, source }) => {
            assert_eq!(url, root.to_string());
            assert!(matches!(source, SitemapError::Fetch(_)));
        }
        other => panic!("expected a root resolution error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_nested_sitemaps_not_followed_when_disabled() {
    let server = MockServer::start().await;
    let base = server.uri();

    serve_xml(
        &server,
        "/index.xml",
        sitemap_index(&[format!("{}/one.xml", base), format!("{}/two.xml", base)]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/one.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[])))
        .expect(0)
        .mount(&server)
        .await;

    let root = Url::parse(&format!("{}/index.xml", base)).unwrap();
    let resolution = resolver()
        .follow_nested(false)
        .resolve(&root, 3, 100)
        .await
        .unwrap();

    assert!(resolution.is_empty());
    assert_eq!(resolution.skipped_nested, 2);
    assert_eq!(resolution.sitemaps_fetched, 1);
}

#[tokio::test]
async fn test_site_discovery_uses_robots_sitemap_lines() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "User-agent: *\nAllow: /\n\nSitemap: {}/declared.xml\n",
            base
        )))
        .expect(1)
        .mount(&server)
        .await;

    serve_xml(&server, "/declared.xml", urlset(&[format!("{}/from-robots", base)])).await;

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[])))
        .expect(0)
        .mount(&server)
        .await;

    let client = FetchClient::new(10).unwrap();
    let gate = PolitenessGate::new(client.http().clone(), 2);
    let resolver = SitemapResolver::new(client, test_settings());
    let site = Url::parse(&base).unwrap();

    let resolution = resolver.resolve_site(&site, &gate, 3, 100).await.unwrap();

    assert_eq!(url_strings(&resolution), vec![format!("{}/from-robots", base)]);
}

#[tokio::test]
async fn test_site_discovery_falls_back_to_well_known_paths() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /\n"))
        .mount(&server)
        .await;

    // /sitemap.xml is not mounted and answers 404
    serve_xml(
        &server,
        "/sitemap_index.xml",
        urlset(&[format!("{}/fallback", base)]),
    )
    .await;

    let client = FetchClient::new(10).unwrap();
    let gate = PolitenessGate::new(client.http().clone(), 2);
    let resolver = SitemapResolver::new(client, test_settings());
    let site = Url::parse(&base).unwrap();

    let resolution = resolver.resolve_site(&site, &gate, 3, 100).await.unwrap();

    assert_eq!(url_strings(&resolution), vec![format!("{}/fallback", base)]);
}

#[tokio::test]
async fn test_site_without_any_sitemap() {
    let server = MockServer::start().await;

    let client = FetchClient::new(10).unwrap();
    let gate = PolitenessGate::new(client.http().clone(), 2);
    let resolver = SitemapResolver::new(client, test_settings());
    let site = Url::parse(&server.uri()).unwrap();

    let result = resolver.resolve_site(&site, &gate, 3, 100).await;

    assert!(matches!(result, Err(HarvestError::NoSitemapFound { .. })));
}

#[tokio::test]
async fn test_stopped_task_fetches_no_sitemap() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[])))
        .expect(0)
        .mount(&server)
        .await;

    let (_control, rx) = watch::channel(TaskStatus::Stopped);
    let root = Url::parse(&format!("{}/sitemap.xml", server.uri())).unwrap();
    let resolution = resolver().with_control(rx).resolve(&root, 3, 100).await.unwrap();

    assert!(resolution.interrupted);
    assert_eq!(resolution.sitemaps_fetched, 0);
    assert_eq!(resolution.urls().count(), 0);
}

#[tokio::test]
async fn test_paused_resolution_waits_for_resume() {
    let server = MockServer::start().await;
    let base = server.uri();
    serve_xml(&server, "/sitemap.xml", urlset(&[format!("{}/page", base)])).await;

    let (control, rx) = watch::channel(TaskStatus::Paused);
    let root = Url::parse(&format!("{}/sitemap.xml", base)).unwrap();
    let resolving = tokio::spawn(async move {
        resolver().with_control(rx).resolve(&root, 3, 100).await
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!resolving.is_finished());
    assert!(server.received_requests().await.unwrap().is_empty());

    control.send_replace(TaskStatus::Running);
    let resolution = tokio::time::timeout(Duration::from_secs(10), resolving)
        .await
        .expect("resolution did not resume")
        .unwrap()
        .unwrap();

    assert!(!resolution.interrupted);
    assert_eq!(url_strings(&resolution), vec![format!("{}/page", base)]);
}

#[tokio::test]
async fn test_stop_between_sitemaps_skips_the_rest() {
    let server = MockServer::start().await;
    let base = server.uri();

    serve_xml(
        &server,
        "/index.xml",
        sitemap_index(&[format!("{}/a.xml", base), format!("{}/b.xml", base)]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/a.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(urlset(&[format!("{}/a", base)]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(urlset(&[])))
        .expect(0)
        .mount(&server)
        .await;

    let (control, rx) = watch::channel(TaskStatus::Running);
    let root = Url::parse(&format!("{}/index.xml", base)).unwrap();
    let resolving = tokio::spawn(async move {
        resolver().with_control(rx).resolve(&root, 3, 100).await
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    control.send_replace(TaskStatus::Stopped);

    let resolution = resolving.await.unwrap().unwrap();
    assert!(resolution.interrupted);
    assert_eq!(resolution.sitemaps_fetched, 2);
    assert_eq!(url_strings(&resolution), vec![format!("{}/a", base)]);
}

#[tokio::test]
async fn test_sitemap_fetches_go_through_the_gate() {
    let server = MockServer::start().await;
    let base = server.uri();

    serve_xml(
        &server,
        "/index.xml",
        sitemap_index(&[format!("{}/a.xml", base), format!("{}/b.xml", base)]),
    )
    .await;
    serve_xml(&server, "/a.xml", urlset(&[format!("{}/a", base)])).await;
    serve_xml(&server, "/b.xml", urlset(&[format!("{}/b", base)])).await;

    let client = FetchClient::new(10).unwrap();
    let gate = Arc::new(PolitenessGate::new(client.http().clone(), 1));
    let mut config = TaskConfig::for_sitemap(format!("{}/index.xml", base));
    config.delay_min_ms = 200;
    config.delay_max_ms = 200;
    config.respect_robots = false;
    let policy = PolitenessPolicy::from_task_config(&config);

    let root = Url::parse(&format!("{}/index.xml", base)).unwrap();
    let started = Instant::now();
    let resolution = SitemapResolver::new(client, test_settings())
        .with_politeness(gate.clone(), policy)
        .resolve(&root, 3, 100)
        .await
        .unwrap();

    assert_eq!(resolution.sitemaps_fetched, 3);
    assert!(started.elapsed() >= Duration::from_millis(400));
    let domain = sitemap_harvest::extract_domain(&root).unwrap();
    assert_eq!(gate.domain(&domain).request_count(), 3);
}

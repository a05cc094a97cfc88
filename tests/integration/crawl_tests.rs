//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test the full
//! crawl cycle end-to-end. Every mock server is its own origin.

use omnivore_crawler::output::{
    load_session_report, JsonLinesSink, MultiSink, SinkResult, SqliteSink,
};
use omnivore_crawler::{
    ContentRecord, EngineConfig, FailureCategory, RecordSink, Session, SessionReport,
    SessionStatus,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Keeps every record in memory
#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<ContentRecord>>,
    finished: Mutex<Option<SessionReport>>,
}

impl CollectingSink {
    fn records(&self) -> Vec<ContentRecord> {
        self.records.lock().unwrap().clone()
    }

    fn paths(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|r| r.address.as_url().path().to_string())
            .collect()
    }

    fn find(&self, address: &str) -> Option<ContentRecord> {
        self.records()
            .into_iter()
            .find(|r| r.address.as_str() == address)
    }
}

impl RecordSink for CollectingSink {
    fn write(&self, record: &ContentRecord) -> SinkResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn finish(&self, report: &SessionReport) -> SinkResult<()> {
        *self.finished.lock().unwrap() = Some(report.clone());
        Ok(())
    }
}

/// Responds by path from a fixed table and logs the start time of every request
struct TimedSite {
    pages: Vec<(&'static str, ResponseTemplate)>,
    log: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl Respond for TimedSite {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let path = request.url.path().to_string();
        self.log.lock().unwrap().push((path.clone(), Instant::now()));

        self.pages
            .iter()
            .find(|(p, _)| *p == path)
            .map(|(_, template)| template.clone())
            .unwrap_or_else(|| ResponseTemplate::new(404))
    }
}

/// Creates a fast test configuration: no pacing delays, short backoff
fn create_test_config(seeds: Vec<String>, max_depth: u32) -> EngineConfig {
    let mut config = EngineConfig::new(seeds);
    config.crawler.max_depth = max_depth;
    config.crawler.max_workers = 4;
    config.crawler.request_timeout_ms = 5000;
    config.politeness.min_delay_ms = 0;
    config.politeness.max_requests_per_second = 1000.0;
    config.politeness.backoff_base_ms = 10;
    config.politeness.backoff_ceiling_ms = 100;
    config.user_agent.crawler_name = "TestBot".to_string();
    config
}

fn html_page(title: &str, links: &[String]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|link| format!(r#"<a href="{}">{}</a>"#, link, link))
        .collect();
    ResponseTemplate::new(200).set_body_raw(
        format!(
            "<html><head><title>{}</title></head><body>{}</body></html>",
            title, anchors
        ),
        "text/html; charset=utf-8",
    )
}

async fn mount_page(server: &MockServer, page_path: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(template)
        .mount(server)
        .await;
}

async fn crawl(config: EngineConfig) -> (SessionReport, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::default());
    let report = Session::run(config, sink.clone())
        .await
        .expect("Session failed");
    (report, sink)
}

fn request_starts(log: &Mutex<Vec<(String, Instant)>>, prefix: &str) -> Vec<Instant> {
    let mut starts: Vec<Instant> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|(p, _)| p.starts_with(prefix))
        .map(|(_, at)| *at)
        .collect();
    starts.sort();
    starts
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fixture_graph_within_depth() {
    // a links to b and c; b links to d; d links to e, which lies beyond max depth
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    let c = MockServer::start().await;
    let d = MockServer::start().await;
    let e = MockServer::start().await;

    mount_page(&a, "/", html_page("A", &[format!("{}/", b.uri()), format!("{}/", c.uri())])).await;
    mount_page(&b, "/", html_page("B", &[format!("{}/", d.uri())])).await;
    mount_page(&c, "/", html_page("C", &[])).await;
    mount_page(&d, "/", html_page("D", &[format!("{}/", e.uri())])).await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("E", &[]))
        .expect(0)
        .mount(&e)
        .await;

    let config = create_test_config(vec![format!("{}/", a.uri())], 2);
    let (report, sink) = crawl(config).await;

    assert_eq!(report.status, SessionStatus::Completed);

    let visited: HashSet<String> = sink
        .records()
        .iter()
        .map(|r| r.address.as_str().to_string())
        .collect();
    let expected: HashSet<String> = [&a, &b, &c, &d]
        .iter()
        .map(|server| format!("{}/", server.uri()))
        .collect();
    assert_eq!(visited, expected);

    let d_record = sink.find(&format!("{}/", d.uri())).unwrap();
    assert_eq!(d_record.depth, 2);
    assert_eq!(
        d_record.discovered_from.as_ref().map(|a| a.as_str().to_string()),
        Some(format!("{}/", b.uri()))
    );
    assert_eq!(d_record.extracted_links.len(), 1);
    assert_eq!(report.stats.depth_rejected, 1);
    assert_eq!(report.stats.fetched_success, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_max_depth_zero_records_only_seeds() {
    let mut servers = Vec::new();
    for _ in 0..3 {
        servers.push(MockServer::start().await);
    }
    let other = MockServer::start().await;

    for server in &servers {
        mount_page(
            server,
            "/",
            html_page("Seed", &["/child".to_string(), format!("{}/", other.uri())]),
        )
        .await;
    }

    let seeds: Vec<String> = servers.iter().map(|s| format!("{}/", s.uri())).collect();
    let (report, sink) = crawl(create_test_config(seeds, 0)).await;

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(sink.records().len(), 3);
    assert!(sink.records().iter().all(|r| r.depth == 0));
    assert_eq!(report.stats.records_emitted, 3);
    assert_eq!(report.stats.depth_rejected, 6);
    assert!(other.received_requests().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_depth_bound_on_chain() {
    let server = MockServer::start().await;
    for i in 0..5 {
        let next = format!("/p{}", i + 1);
        mount_page(&server, &format!("/p{}", i), html_page("Chain", &[next])).await;
    }

    let config = create_test_config(vec![format!("{}/p0", server.uri())], 2);
    let (report, sink) = crawl(config).await;

    let mut paths = sink.paths();
    paths.sort();
    assert_eq!(paths, vec!["/p0", "/p1", "/p2"]);
    assert!(sink.records().iter().all(|r| r.depth <= 2));
    assert_eq!(report.stats.depth_rejected, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_addresses_are_unique_in_record_stream() {
    let server = MockServer::start().await;
    let base = server.uri();

    // Every page links to every other page in several spellings
    let links = vec![
        "/x".to_string(),
        "/x/".to_string(),
        "/x#top".to_string(),
        format!("{}/y", base),
        "/y?".to_string(),
        "/z".to_string(),
        "/".to_string(),
    ];
    for page in ["/", "/x", "/y", "/z"] {
        mount_page(&server, page, html_page(page, &links)).await;
    }

    let mut config = create_test_config(vec![format!("{}/", base)], 3);
    config.crawler.max_workers = 8;
    config.politeness.in_flight_budget = 4;
    let (report, sink) = crawl(config).await;

    let records = sink.records();
    let unique: HashSet<&str> = records.iter().map(|r| r.address.as_str()).collect();
    assert_eq!(unique.len(), records.len());
    assert_eq!(records.len(), 4);
    assert!(report.stats.duplicates_rejected > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_robots_disallowed_paths_never_fetched() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
    )
    .await;
    mount_page(
        &server,
        "/",
        html_page("Home", &["/private/secret".to_string(), "/public".to_string()]),
    )
    .await;
    mount_page(&server, "/public", html_page("Public", &[])).await;

    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(html_page("Secret", &["/hidden".to_string()]))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hidden"))
        .respond_with(html_page("Hidden", &[]))
        .expect(0)
        .mount(&server)
        .await;

    let (report, sink) = crawl(create_test_config(vec![format!("{}/", base)], 3)).await;

    let secret = sink.find(&format!("{}/private/secret", base)).unwrap();
    assert_eq!(secret.outcome.kind, "robots_disallowed");
    assert!(secret.content.is_none());
    assert!(sink.find(&format!("{}/hidden", base)).is_none());

    assert_eq!(report.stats.failures(FailureCategory::RobotsDisallowed), 1);
    assert_eq!(report.stats.robots_fetched, 1);
    assert_eq!(report.stats.fetched_success, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_robots_ignored_when_disabled() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"),
    )
    .await;
    mount_page(&server, "/", html_page("Home", &[])).await;

    let mut config = create_test_config(vec![format!("{}/", server.uri())], 0);
    config.crawler.respect_robots = false;
    let (report, sink) = crawl(config).await;

    assert_eq!(sink.records()[0].outcome.kind, "success");
    assert_eq!(report.stats.robots_fetched, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redirect_chain_too_long() {
    let server = MockServer::start().await;
    for i in 0..10 {
        mount_page(
            &server,
            &format!("/r{}", i),
            ResponseTemplate::new(302).insert_header("location", format!("/r{}", i + 1).as_str()),
        )
        .await;
    }
    mount_page(&server, "/r10", html_page("End", &[])).await;

    let mut config = create_test_config(vec![format!("{}/r0", server.uri())], 2);
    config.crawler.max_redirects = 3;
    let (report, sink) = crawl(config).await;

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome.kind, "network_error");
    assert_eq!(records[0].outcome.detail.as_deref(), Some("too many redirects"));
    assert_eq!(report.stats.failures(FailureCategory::TransientNetwork), 1);

    // Seed plus three followed hops; the fourth hop is never requested
    let requested: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .filter(|p| p.starts_with("/r") && p != "/robots.txt")
        .collect();
    assert_eq!(requested, vec!["/r0", "/r1", "/r2", "/r3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redirect_loop() {
    let server = MockServer::start().await;
    mount_page(&server, "/a", ResponseTemplate::new(301).insert_header("location", "/b")).await;
    mount_page(&server, "/b", ResponseTemplate::new(301).insert_header("location", "/a")).await;

    let (_, sink) = crawl(create_test_config(vec![format!("{}/a", server.uri())], 2)).await;

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome.detail.as_deref(), Some("redirect loop"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_followed_redirect_resolves_links_against_final_address() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/old",
        ResponseTemplate::new(301).insert_header("location", "/docs/index"),
    )
    .await;
    mount_page(&server, "/docs/index", html_page("Docs", &["intro".to_string()])).await;
    mount_page(&server, "/docs/intro", html_page("Intro", &[])).await;

    let (report, sink) = crawl(create_test_config(vec![format!("{}/old", server.uri())], 1)).await;

    let seed = sink.find(&format!("{}/old", server.uri())).unwrap();
    assert_eq!(seed.outcome.kind, "success");
    assert_eq!(
        seed.extracted_links[0].as_str(),
        format!("{}/docs/intro", server.uri())
    );
    assert!(sink.find(&format!("{}/docs/intro", server.uri())).is_some());
    assert_eq!(report.stats.redirects, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unfollowed_redirect_enqueues_target() {
    let server = MockServer::start().await;
    mount_page(&server, "/old", ResponseTemplate::new(301).insert_header("location", "/new")).await;
    mount_page(&server, "/new", html_page("New", &[])).await;

    let mut config = create_test_config(vec![format!("{}/old", server.uri())], 1);
    config.crawler.follow_redirects = false;
    let (report, sink) = crawl(config).await;

    let old = sink.find(&format!("{}/old", server.uri())).unwrap();
    assert_eq!(old.outcome.kind, "redirect");

    let new = sink.find(&format!("{}/new", server.uri())).unwrap();
    assert_eq!(new.outcome.kind, "success");
    assert_eq!(new.depth, 1);
    assert_eq!(
        new.discovered_from.map(|a| a.as_str().to_string()),
        Some(format!("{}/old", server.uri()))
    );

    // A redirect record is a finished fetch
    assert_eq!(report.stats.fetched_redirect, 1);
    assert_eq!(report.stats.total_fetched(), sink.records().len() as u64);
    assert_eq!(report.stats.total_fetched(), report.stats.records_emitted);
}

async fn requested_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redirect_to_other_origin_respects_its_robots() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;

    mount_page(
        &a,
        "/go",
        ResponseTemplate::new(302).insert_header("location", format!("{}/private", b.uri()).as_str()),
    )
    .await;
    mount_page(
        &b,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(html_page("Private", &["/deeper".to_string()]))
        .expect(0)
        .mount(&b)
        .await;

    let (report, sink) = crawl(create_test_config(vec![format!("{}/go", a.uri())], 2)).await;

    let go = sink.find(&format!("{}/go", a.uri())).unwrap();
    assert_eq!(go.outcome.kind, "redirect");
    assert!(go.content.is_none());

    let private = sink.find(&format!("{}/private", b.uri())).unwrap();
    assert_eq!(private.outcome.kind, "robots_disallowed");
    assert!(sink.find(&format!("{}/deeper", b.uri())).is_none());

    assert_eq!(requested_paths(&b).await, vec!["/robots.txt"]);
    assert_eq!(report.stats.redirects, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_origin_redirect_into_disallowed_path() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
    )
    .await;
    mount_page(
        &server,
        "/go",
        ResponseTemplate::new(301).insert_header("location", "/private/page"),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(html_page("Private", &[]))
        .expect(0)
        .mount(&server)
        .await;

    let (_, sink) = crawl(create_test_config(vec![format!("{}/go", server.uri())], 1)).await;

    assert_eq!(
        sink.find(&format!("{}/go", server.uri())).unwrap().outcome.kind,
        "redirect"
    );
    assert_eq!(
        sink.find(&format!("{}/private/page", server.uri()))
            .unwrap()
            .outcome
            .kind,
        "robots_disallowed"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redirect_to_linked_page_fetches_it_once() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        html_page("Home", &["/old".to_string(), "/new".to_string()]),
    )
    .await;
    mount_page(&server, "/old", ResponseTemplate::new(301).insert_header("location", "/new")).await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html_page("New", &[]))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(vec![format!("{}/", server.uri())], 1);
    config.politeness.in_flight_budget = 2;
    let (report, sink) = crawl(config).await;

    let records = sink.records();
    let unique: HashSet<&str> = records.iter().map(|r| r.address.as_str()).collect();
    assert_eq!(unique.len(), records.len());

    let new_requests = requested_paths(&server)
        .await
        .into_iter()
        .filter(|p| p == "/new")
        .count();
    assert_eq!(new_requests, 1);
    assert_eq!(report.stats.total_fetched(), records.len() as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_robots_txt_behind_redirect_is_honored() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/robots.txt",
        ResponseTemplate::new(301).insert_header("location", "/robots-real.txt"),
    )
    .await;
    mount_page(
        &server,
        "/robots-real.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html_page("Page", &[]))
        .expect(0)
        .mount(&server)
        .await;

    let (report, sink) = crawl(create_test_config(vec![format!("{}/page", server.uri())], 0)).await;

    assert_eq!(sink.records()[0].outcome.kind, "robots_disallowed");
    assert_eq!(
        requested_paths(&server).await,
        vec!["/robots.txt", "/robots-real.txt"]
    );
    assert_eq!(report.stats.robots_fetched, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_minimum_interval_between_request_starts() {
    let server = MockServer::start().await;
    let log = Arc::new(Mutex::new(Vec::new()));
    let links: Vec<String> = (1..=4).map(|i| format!("/p{}", i)).collect();

    let site = TimedSite {
        pages: vec![
            ("/", html_page("Home", &links)),
            ("/p1", html_page("1", &[])),
            ("/p2", html_page("2", &[])),
            ("/p3", html_page("3", &[])),
            ("/p4", html_page("4", &[])),
        ],
        log: log.clone(),
    };
    Mock::given(method("GET")).respond_with(site).mount(&server).await;

    let mut config = create_test_config(vec![format!("{}/", server.uri())], 1);
    config.politeness.min_delay_ms = 200;
    config.crawler.max_workers = 4;
    let (report, _) = crawl(config).await;
    assert_eq!(report.stats.fetched_success, 5);

    // robots.txt counts as a request start too
    let starts = request_starts(&log, "/");
    assert_eq!(starts.len(), 6);
    for pair in starts.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(gap >= Duration::from_millis(190), "gap of {:?} too short", gap);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_origin_pacing_does_not_block_other_origins() {
    let slow = MockServer::start().await;
    let fast = MockServer::start().await;

    let slow_links: Vec<String> = (1..=3).map(|i| format!("/s{}", i)).collect();
    mount_page(&slow, "/", html_page("Slow", &slow_links)).await;
    for link in &slow_links {
        mount_page(&slow, link, html_page("S", &[])).await;
    }
    mount_page(&fast, "/", html_page("Fast", &[])).await;

    let mut config = create_test_config(
        vec![format!("{}/", slow.uri()), format!("{}/", fast.uri())],
        1,
    );
    config.politeness.overrides = vec![omnivore_crawler::config::OriginOverride {
        origin: slow.uri(),
        min_delay_ms: Some(300),
        ..Default::default()
    }];

    let started = Instant::now();
    let sink = Arc::new(CollectingSink::default());
    let handle = Session::new(config).unwrap().start(sink.clone());

    // The fast origin finishes long before the slow one has been fully paced
    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.find(&format!("{}/", fast.uri())).is_none() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(started.elapsed() < Duration::from_millis(600));

    let report = handle.wait().await.unwrap();
    assert_eq!(report.stats.fetched_success, 5);
    assert!(started.elapsed() >= Duration::from_millis(4 * 285));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_backoff_grows_after_server_errors() {
    let server = MockServer::start().await;
    let log = Arc::new(Mutex::new(Vec::new()));
    let links: Vec<String> = (1..=3).map(|i| format!("/e{}", i)).collect();

    let site = TimedSite {
        pages: vec![
            ("/", html_page("Home", &links)),
            ("/e1", ResponseTemplate::new(500)),
            ("/e2", ResponseTemplate::new(500)),
            ("/e3", ResponseTemplate::new(500)),
        ],
        log: log.clone(),
    };
    Mock::given(method("GET")).respond_with(site).mount(&server).await;

    let mut config = create_test_config(vec![format!("{}/", server.uri())], 1);
    config.politeness.backoff_base_ms = 50;
    config.politeness.backoff_multiplier = 2.0;
    config.politeness.backoff_ceiling_ms = 1000;
    let (report, sink) = crawl(config).await;

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.stats.failures(FailureCategory::ServerError), 3);
    assert_eq!(report.origins.len(), 1);
    assert_eq!(report.origins[0].consecutive_failures, 3);

    // Backoff after the first failure is 100ms, after the second 200ms
    let starts = request_starts(&log, "/e");
    assert_eq!(starts.len(), 3);
    let first_gap = starts[1] - starts[0];
    let second_gap = starts[2] - starts[1];
    assert!(first_gap >= Duration::from_millis(95), "first gap {:?}", first_gap);
    assert!(second_gap >= Duration::from_millis(190), "second gap {:?}", second_gap);
    assert!(second_gap > first_gap);

    // Failed addresses are recorded once and never retried
    let failed: Vec<_> = sink
        .records()
        .into_iter()
        .filter(|r| r.outcome.kind == "server_error")
        .collect();
    assert_eq!(failed.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_client_errors_and_non_html() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        html_page("Home", &["/missing".to_string(), "/data.json".to_string()]),
    )
    .await;
    mount_page(
        &server,
        "/data.json",
        ResponseTemplate::new(200)
            .set_body_string(r#"{"link": "<a href='/never'>x</a>"}"#)
            .insert_header("content-type", "application/json"),
    )
    .await;

    let (report, sink) = crawl(create_test_config(vec![format!("{}/", server.uri())], 3)).await;

    let missing = sink.find(&format!("{}/missing", server.uri())).unwrap();
    assert_eq!(missing.outcome.kind, "client_error");
    assert_eq!(missing.outcome.status_code, Some(404));

    let data = sink.find(&format!("{}/data.json", server.uri())).unwrap();
    assert!(data.extracted_links.is_empty());
    assert!(sink.find(&format!("{}/never", server.uri())).is_none());

    assert_eq!(report.stats.failures(FailureCategory::PermanentClient), 1);
    assert_eq!(report.origins[0].consecutive_failures, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_malformed_content_is_recorded() {
    let server = MockServer::start().await;
    let mut body = b"<html><body><a href=\"/next\">".to_vec();
    body.extend_from_slice(&[0xff, 0xfe]);
    body.extend_from_slice(b"</a></body></html>");

    mount_page(
        &server,
        "/",
        ResponseTemplate::new(200)
            .set_body_raw(body, "text/html"),
    )
    .await;

    let (report, sink) = crawl(create_test_config(vec![format!("{}/", server.uri())], 2)).await;

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome.kind, "success");
    assert!(records[0].content.as_ref().unwrap().malformed);
    assert!(records[0].extracted_links.is_empty());
    assert_eq!(report.stats.malformed_content, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_drain_completes_without_new_dispatches() {
    let server = MockServer::start().await;
    let links: Vec<String> = (1..=20).map(|i| format!("/slow{}", i)).collect();
    mount_page(&server, "/", html_page("Home", &links)).await;
    for link in &links {
        mount_page(
            &server,
            link,
            html_page("Slow", &[]).set_delay(Duration::from_millis(200)),
        )
        .await;
    }

    let mut config = create_test_config(vec![format!("{}/", server.uri())], 1);
    config.crawler.max_workers = 2;
    let sink = Arc::new(CollectingSink::default());
    let handle = Session::new(config).unwrap().start(sink.clone());

    while sink.records().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    handle.drain();
    assert_eq!(handle.status(), SessionStatus::Draining);

    let report = handle.wait().await.unwrap();
    assert_eq!(report.status, SessionStatus::Completed);
    assert!(report.stats.records_emitted < 21);
    assert_eq!(report.stats.in_progress, 0);
    assert_eq!(sink.records().len() as u64, report.stats.records_emitted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_abort_cancels_in_flight_fetches() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        html_page("Stuck", &[]).set_delay(Duration::from_secs(10)),
    )
    .await;

    let mut config = create_test_config(vec![format!("{}/", server.uri())], 0);
    config.crawler.request_timeout_ms = 30_000;
    let sink = Arc::new(CollectingSink::default());
    let handle = Session::new(config).unwrap().start(sink.clone());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let started = Instant::now();
    handle.abort();

    let report = handle.wait().await.unwrap();
    assert_eq!(report.status, SessionStatus::Aborted);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(sink.records().is_empty());
    assert_eq!(
        sink.finished.lock().unwrap().as_ref().map(|r| r.status),
        Some(SessionStatus::Aborted)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_session_deadline_triggers_drain() {
    let server = MockServer::start().await;
    let links: Vec<String> = (1..=30).map(|i| format!("/p{}", i)).collect();
    mount_page(&server, "/", html_page("Home", &links)).await;
    for link in &links {
        mount_page(&server, link, html_page("P", &[])).await;
    }

    let mut config = create_test_config(vec![format!("{}/", server.uri())], 1);
    config.politeness.min_delay_ms = 200;
    config.crawler.session_deadline_secs = Some(1);

    let started = Instant::now();
    let (report, _) = crawl(config).await;

    assert_eq!(report.status, SessionStatus::Completed);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(report.stats.records_emitted < 31);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_json_lines_and_sqlite_sinks() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_page("Home", &["/a".to_string(), "/b".to_string()])).await;
    mount_page(&server, "/a", html_page("A", &[])).await;
    mount_page(&server, "/b", html_page("B", &[])).await;

    let dir = tempfile::tempdir().unwrap();
    let jsonl_path = dir.path().join("records.jsonl");
    let db_path = dir.path().join("crawl.db");

    let sinks = MultiSink::new()
        .with(Arc::new(JsonLinesSink::create(&jsonl_path).unwrap()))
        .with(Arc::new(SqliteSink::open(&db_path).unwrap()));

    let config = create_test_config(vec![format!("{}/", server.uri())], 1);
    let session = Session::new(config).unwrap().with_config_hash("deadbeef");
    let id = session.id();
    let report = session.start(Arc::new(sinks)).wait().await.unwrap();

    let content = std::fs::read_to_string(&jsonl_path).unwrap();
    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| l["session_id"] == id.to_string()));

    let stored = load_session_report(&db_path, &id).unwrap();
    assert_eq!(stored.session_id, report.session_id);
    assert_eq!(stored.stats, report.stats);
    assert_eq!(stored.config_hash.as_deref(), Some("deadbeef"));
}

#[tokio::test]
async fn test_live_stats_and_report_agree() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_page("Home", &["/a".to_string()])).await;
    mount_page(&server, "/a", html_page("A", &[])).await;

    let sink = Arc::new(CollectingSink::default());
    let config = create_test_config(vec![format!("{}/", server.uri())], 1);
    let handle = Session::new(config).unwrap().start(sink.clone());
    assert!(handle.stats().discovered >= 1);

    let report = handle.wait().await.unwrap();
    assert_eq!(report.stats.discovered, 2);
    assert_eq!(report.stats.total_fetched(), 2);
    assert_eq!(report.stats.in_progress, 0);
    assert_eq!(
        sink.finished.lock().unwrap().as_ref().map(|r| r.session_id),
        Some(report.session_id)
    );
}

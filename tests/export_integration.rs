//! Integration tests for the export walk.
//!
//! These tests serve directory listings from a mock HTTP server and check the
//! mirrored tree on disk.

use std::path::Path;
use std::time::Duration;

use dirmirror_core::{
    ExportConfig, Exporter, MAX_BUDGET, Schedule, SkipReason, remove_scheme_dirs,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Renders an Apache-style index page linking to `hrefs`.
fn index_page(hrefs: &[&str]) -> String {
    let mut html = String::from(
        "<html><head><title>Index</title></head><body><h1>Index</h1><pre>\
         <a href=\"?C=N;O=D\">Name</a> <a href=\"?C=M;O=A\">Last modified</a>\n\
         <a href=\"../\">Parent Directory</a>\n",
    );
    for href in hrefs {
        html.push_str(&format!("<a href=\"{href}\">{href}</a>\n"));
    }
    html.push_str("</pre></body></html>");
    html
}

async fn mount_listing(server: &MockServer, at: &str, hrefs: &[&str]) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(index_page(hrefs)))
        .mount(server)
        .await;
}

async fn mount_file(server: &MockServer, at: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Serves `/pub/` containing `a.txt` and `sub/b.txt`.
async fn setup_small_tree() -> MockServer {
    let server = MockServer::start().await;
    mount_listing(&server, "/pub/", &["a.txt", "sub/"]).await;
    mount_listing(&server, "/pub/sub/", &["b.txt"]).await;
    mount_file(&server, "/pub/a.txt", b"alpha").await;
    mount_file(&server, "/pub/sub/b.txt", b"bravo").await;
    server
}

fn exporter(budget: usize) -> Exporter {
    Exporter::new(ExportConfig::new(budget).expect("valid budget")).expect("client builds")
}

fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()))
}

#[tokio::test]
async fn test_export_mirrors_small_tree() {
    let server = setup_small_tree().await;
    let target = TempDir::new().expect("failed to create temp dir");

    let summary = exporter(4)
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(read(&target.path().join("a.txt")), b"alpha");
    assert_eq!(read(&target.path().join("sub/b.txt")), b"bravo");
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failure_count(), 0);
    assert_eq!(summary.directories, 2);
    assert_eq!(summary.bytes, 10);
}

#[tokio::test]
async fn test_export_accepts_root_url_without_trailing_slash() {
    let server = setup_small_tree().await;
    let target = TempDir::new().expect("failed to create temp dir");

    let summary = exporter(2)
        .export(&format!("{}/pub", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(summary.completed, 2);
    assert!(target.path().join("sub/b.txt").exists());
}

#[tokio::test]
async fn test_export_tolerates_missing_file() {
    let server = MockServer::start().await;
    mount_listing(&server, "/pub/", &["a.txt", "gone.txt", "c.txt"]).await;
    mount_file(&server, "/pub/a.txt", b"a").await;
    mount_file(&server, "/pub/c.txt", b"c").await;
    Mock::given(method("GET"))
        .and(path("/pub/gone.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let target = TempDir::new().expect("failed to create temp dir");

    let summary = exporter(3)
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert!(target.path().join("a.txt").exists());
    assert!(target.path().join("c.txt").exists());
    assert!(!target.path().join("gone.txt").exists());
    let failure = &summary.failures[0];
    assert!(failure.url.ends_with("/pub/gone.txt"));
    assert!(matches!(
        failure.reason,
        SkipReason::Download {
            status: Some(404),
            ..
        }
    ));
}

#[tokio::test]
async fn test_export_skips_subtree_with_unreadable_listing() {
    let server = MockServer::start().await;
    mount_listing(&server, "/pub/", &["broken/", "ok.txt"]).await;
    mount_file(&server, "/pub/ok.txt", b"ok").await;
    Mock::given(method("GET"))
        .and(path("/pub/broken/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let target = TempDir::new().expect("failed to create temp dir");

    let summary = exporter(2)
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(summary.listing_failures, 1);
    assert_eq!(summary.completed, 1);
    // The directory exists before its listing is read.
    assert!(target.path().join("broken").is_dir());
    assert!(target.path().join("ok.txt").exists());
}

#[tokio::test]
async fn test_export_root_listing_failure_is_not_fatal() {
    let server = MockServer::start().await;
    let target = TempDir::new().expect("failed to create temp dir");

    let summary = exporter(2)
        .export(&format!("{}/missing/", server.uri()), target.path())
        .await
        .expect("export should still succeed");

    assert_eq!(summary.listing_failures, 1);
    assert_eq!(summary.completed, 0);
    assert!(target.path().is_dir());
}

#[tokio::test]
async fn test_export_never_exceeds_download_budget() {
    let server = MockServer::start().await;
    let files = ["1.bin", "2.bin", "3.bin", "4.bin", "5.bin", "6.bin"];
    mount_listing(&server, "/pub/", &files).await;
    for name in files {
        Mock::given(method("GET"))
            .and(path(format!("/pub/{name}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"payload".to_vec())
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&server)
            .await;
    }
    let target = TempDir::new().expect("failed to create temp dir");

    let summary = exporter(2)
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(summary.completed, 6);
    assert!(summary.peak_in_flight >= 1);
    assert!(
        summary.peak_in_flight <= 2,
        "peak {} exceeds budget",
        summary.peak_in_flight
    );
}

/// Mounts `count` files named `<prefix><n>.bin` under `dir`, each answered after `delay`.
async fn mount_delayed_files(
    server: &MockServer,
    dir: &str,
    prefix: &str,
    count: usize,
    delay: Duration,
) -> Vec<String> {
    let mut names = Vec::with_capacity(count);
    for i in 0..count {
        let name = format!("{prefix}{i}.bin");
        Mock::given(method("GET"))
            .and(path(format!("{dir}{name}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"payload".to_vec())
                    .set_delay(delay),
            )
            .mount(server)
            .await;
        names.push(name);
    }
    names
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_export_caps_oversized_budget_under_load() {
    let server = MockServer::start().await;
    let names = mount_delayed_files(&server, "/pub/", "f", 60, Duration::from_millis(300)).await;
    let hrefs: Vec<&str> = names.iter().map(String::as_str).collect();
    mount_listing(&server, "/pub/", &hrefs).await;
    let target = TempDir::new().expect("failed to create temp dir");
    let exporter = exporter(1000);
    assert_eq!(exporter.config().budget(), MAX_BUDGET);

    let summary = exporter
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(summary.completed, 60);
    assert!(
        summary.peak_in_flight <= MAX_BUDGET,
        "peak {} exceeds the cap",
        summary.peak_in_flight
    );
    assert_eq!(summary.peak_in_flight, MAX_BUDGET);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_export_budget_holds_across_directory_levels() {
    let server = MockServer::start().await;
    let delay = Duration::from_millis(100);
    let top = mount_delayed_files(&server, "/pub/", "top", 3, delay).await;
    let mut root_hrefs: Vec<&str> = top.iter().map(String::as_str).collect();
    root_hrefs.extend(["d1/", "d2/"]);
    mount_listing(&server, "/pub/", &root_hrefs).await;

    let d1 = mount_delayed_files(&server, "/pub/d1/", "a", 4, delay).await;
    let mut d1_hrefs: Vec<&str> = d1.iter().map(String::as_str).collect();
    d1_hrefs.push("deep/");
    mount_listing(&server, "/pub/d1/", &d1_hrefs).await;

    let deep = mount_delayed_files(&server, "/pub/d1/deep/", "z", 4, delay).await;
    let deep_hrefs: Vec<&str> = deep.iter().map(String::as_str).collect();
    mount_listing(&server, "/pub/d1/deep/", &deep_hrefs).await;

    let d2 = mount_delayed_files(&server, "/pub/d2/", "b", 4, delay).await;
    let d2_hrefs: Vec<&str> = d2.iter().map(String::as_str).collect();
    mount_listing(&server, "/pub/d2/", &d2_hrefs).await;

    let target = TempDir::new().expect("failed to create temp dir");

    let summary = exporter(2)
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(summary.completed, 15);
    assert_eq!(summary.directories, 4);
    assert!(
        summary.peak_in_flight <= 2,
        "peak {} exceeds budget",
        summary.peak_in_flight
    );
    assert!(target.path().join("d1/deep/z3.bin").exists());
    assert!(target.path().join("d2/b0.bin").exists());
}

#[tokio::test]
async fn test_export_second_run_overwrites_with_same_content() {
    let server = setup_small_tree().await;
    let target = TempDir::new().expect("failed to create temp dir");
    std::fs::write(target.path().join("a.txt"), b"stale local content").expect("seed file");
    let url = format!("{}/pub/", server.uri());
    let exporter = exporter(2);

    let first = exporter.export(&url, target.path()).await.expect("first run");
    let second = exporter.export(&url, target.path()).await.expect("second run");

    assert_eq!(first.completed, second.completed);
    assert_eq!(read(&target.path().join("a.txt")), b"alpha");
    assert_eq!(read(&target.path().join("sub/b.txt")), b"bravo");
}

#[tokio::test]
async fn test_export_per_directory_schedule_mirrors_tree() {
    let server = MockServer::start().await;
    mount_listing(&server, "/pub/", &["top.txt", "x/", "y/"]).await;
    mount_listing(&server, "/pub/x/", &["x1.txt", "x2.txt"]).await;
    mount_listing(&server, "/pub/y/", &["z/"]).await;
    mount_listing(&server, "/pub/y/z/", &["deep.txt"]).await;
    for (at, body) in [
        ("/pub/top.txt", &b"top"[..]),
        ("/pub/x/x1.txt", &b"x1"[..]),
        ("/pub/x/x2.txt", &b"x2"[..]),
        ("/pub/y/z/deep.txt", &b"deep"[..]),
    ] {
        mount_file(&server, at, body).await;
    }
    let target = TempDir::new().expect("failed to create temp dir");
    let config = ExportConfig::new(2)
        .expect("valid budget")
        .with_schedule(Schedule::PerDirectory);
    let exporter = Exporter::new(config).expect("client builds");

    let summary = exporter
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(summary.completed, 4);
    assert_eq!(summary.directories, 4);
    assert!(summary.peak_in_flight <= 2);
    assert_eq!(read(&target.path().join("x/x2.txt")), b"x2");
    assert_eq!(read(&target.path().join("y/z/deep.txt")), b"deep");
}

#[tokio::test]
async fn test_export_decodes_percent_encoded_names() {
    let server = MockServer::start().await;
    mount_listing(&server, "/pub/", &["read%20me.txt"]).await;
    mount_file(&server, "/pub/read%20me.txt", b"spaced").await;
    let target = TempDir::new().expect("failed to create temp dir");

    let summary = exporter(1)
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(summary.completed, 1);
    assert_eq!(read(&target.path().join("read me.txt")), b"spaced");
}

#[tokio::test]
async fn test_export_skips_parent_escaping_entry() {
    let server = MockServer::start().await;
    mount_listing(&server, "/pub/", &["%2e%2e/", "safe.txt"]).await;
    mount_file(&server, "/pub/safe.txt", b"safe").await;
    let target = TempDir::new().expect("failed to create temp dir");

    let summary = exporter(1)
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.skipped_branches, 1);
    assert!(matches!(summary.failures[0].reason, SkipReason::UnsafePath));
}

#[tokio::test]
async fn test_export_keeps_encoded_separator_in_file_name() {
    let server = MockServer::start().await;
    mount_listing(&server, "/pub/", &["a%2Fb.txt"]).await;
    mount_file(&server, "/pub/a%2Fb.txt", b"data").await;
    let target = TempDir::new().expect("failed to create temp dir");

    let summary = exporter(1)
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failure_count(), 0);
    assert_eq!(read(&target.path().join("a%2Fb.txt")), b"data");
    assert!(!target.path().join("a").exists());
}

#[tokio::test]
async fn test_export_keeps_encoded_separator_in_directory_name() {
    let server = MockServer::start().await;
    mount_listing(&server, "/pub/", &["x%2Fy/"]).await;
    mount_listing(&server, "/pub/x%2Fy/", &["inner.txt"]).await;
    mount_file(&server, "/pub/x%2Fy/inner.txt", b"inner").await;
    let target = TempDir::new().expect("failed to create temp dir");

    let summary = exporter(1)
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(summary.completed, 1);
    assert_eq!(read(&target.path().join("x%2Fy/inner.txt")), b"inner");
    assert!(!target.path().join("x").exists());
}

#[tokio::test]
async fn test_export_decodes_numeric_references_in_links() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pub/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"<a href="a&#38;b.txt">a&amp;b</a>"#),
        )
        .mount(&server)
        .await;
    mount_file(&server, "/pub/a&b.txt", b"amp").await;
    let target = TempDir::new().expect("failed to create temp dir");

    let summary = exporter(1)
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");

    assert_eq!(summary.completed, 1);
    assert_eq!(read(&target.path().join("a&b.txt")), b"amp");
}

#[tokio::test]
async fn test_malformed_scheme_link_is_removed_by_cleanup() {
    let server = MockServer::start().await;
    mount_listing(&server, "/pub/", &["http:/evil.example/x/", "a.txt"]).await;
    mount_file(&server, "/pub/a.txt", b"alpha").await;
    let target = TempDir::new().expect("failed to create temp dir");

    exporter(2)
        .export(&format!("{}/pub/", server.uri()), target.path())
        .await
        .expect("export should succeed");
    assert!(target.path().join("http:/evil.example/x").is_dir());

    let report = remove_scheme_dirs(target.path());

    assert!(!target.path().join("http:").exists());
    assert!(target.path().join("a.txt").exists());
    assert_eq!(report.removed.len(), 1);
}

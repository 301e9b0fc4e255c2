//! Integration tests for the harvest pipeline
//!
//! These tests use wiremock to stand in for archive sites and exercise the
//! full run cycle end-to-end: seeding, rate-limited fetching, retry,
//! adapter parsing, image resolution and download, and idempotent
//! persistence.

use curio::config::{
    ArchiveConfig, ArchiveKind, ColumnMap, Config, HarvesterConfig, OutputConfig, SelectorMap,
    UserAgentConfig,
};
use curio::pipeline::run_harvest;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with fast limits
fn test_config(output_dir: &Path, archives: Vec<ArchiveConfig>) -> Config {
    Config {
        harvester: HarvesterConfig {
            concurrency_limit: 4,
            per_host_min_interval: 10, // very short for testing
            max_retries: 3,
            backoff_base: 10,
            backoff_cap: 100,
            grace_period: 500,
            deadline: None,
        },
        user_agent: UserAgentConfig {
            crawler_name: "CurioTest".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            output_dir: output_dir.to_string_lossy().into_owned(),
        },
        archives,
    }
}

fn gallery_archive(base_url: &str) -> ArchiveConfig {
    ArchiveConfig {
        name: "gallery-test".to_string(),
        kind: ArchiveKind::Gallery,
        base_url: base_url.to_string(),
        seed: format!("{}/indexes/", base_url),
        selectors: SelectorMap {
            item: Some(".gallery-item".to_string()),
            image_link: Some(".gallery-image a".to_string()),
            caption: Some(".gallery-caption".to_string()),
            ..SelectorMap::default()
        },
        columns: None,
    }
}

fn blog_archive(base_url: &str) -> ArchiveConfig {
    ArchiveConfig {
        name: "blog-test".to_string(),
        kind: ArchiveKind::Blog,
        base_url: base_url.to_string(),
        seed: format!("{}/", base_url),
        selectors: SelectorMap {
            post_link: Some("h3.post-title a".to_string()),
            next_page: Some("a.older-posts".to_string()),
            title: Some("h1.post-title".to_string()),
            body: Some("div.post-body".to_string()),
            image: Some("img".to_string()),
            ..SelectorMap::default()
        },
        columns: None,
    }
}

fn dataset_lines(output_dir: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(output_dir.join("dataset.jsonl"))
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).expect("dataset line is not valid JSON"))
        .collect()
}

fn stored_image_count(output_dir: &Path) -> usize {
    std::fs::read_dir(output_dir.join("images"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Mounts a gallery page with one captioned item per (path, image) pair
async fn mount_gallery_page(server: &MockServer, page_path: &str, items: &[(&str, &str)]) {
    let body: String = items
        .iter()
        .map(|(image_path, caption)| {
            format!(
                r#"<div class="gallery-item">
                    <div class="gallery-image"><a href="{}"><img src="{}"></a></div>
                    <div class="gallery-caption">{}</div>
                </div>"#,
                image_path, image_path, caption
            )
        })
        .collect();

    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("<html><body>{}</body></html>", body))
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Mounts an image path for both probes (HEAD) and downloads (GET)
async fn mount_image(server: &MockServer, image_path: &str, bytes: &[u8]) {
    Mock::given(path(image_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(bytes.to_vec())
                .insert_header("content-type", "image/jpeg"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_listing_with_flaky_detail_retries_until_success() {
    let server = MockServer::start().await;
    let base = server.uri();
    let output = TempDir::new().unwrap();

    // Index page with three category links
    Mock::given(method("GET"))
        .and(path("/indexes/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    r#"<html><body>
                    <a href="{base}/masks/">Masks</a>
                    <a href="{base}/shrines/">Shrines</a>
                    <a href="{base}/markets/">Markets</a>
                    </body></html>"#
                ))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    mount_gallery_page(&server, "/shrines/", &[("/uploads/shrine.jpg", "A shrine")]).await;
    mount_gallery_page(&server, "/markets/", &[("/uploads/market.jpg", "A market")]).await;

    // The masks page fails three times before serving
    Mock::given(method("GET"))
        .and(path("/masks/"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    mount_gallery_page(&server, "/masks/", &[("/uploads/mask.jpg", "A mask")]).await;

    for image in ["/uploads/shrine.jpg", "/uploads/market.jpg", "/uploads/mask.jpg"] {
        mount_image(&server, image, image.as_bytes()).await;
    }

    let config = test_config(output.path(), vec![gallery_archive(&base)]);
    let summary = run_harvest(config, "test-hash", false).await.unwrap();

    assert_eq!(summary.records_written, 3);
    assert_eq!(summary.images_stored, 3);
    assert_eq!(summary.total_failures(), 0);
    assert!(!summary.cancelled);

    // exactly one task needed retries, and it took three of them
    let retried: Vec<_> = summary
        .retried_tasks
        .iter()
        .filter(|task| task.url.contains("/masks/"))
        .collect();
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].attempts, 3);
    assert!(retried[0].succeeded);

    assert_eq!(dataset_lines(output.path()).len(), 3);
}

#[tokio::test]
async fn test_permanent_denial_is_terminal_and_reported() {
    let server = MockServer::start().await;
    let base = server.uri();
    let output = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/indexes/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    r#"<html><body>
                    <a href="{base}/open/">Open</a>
                    <a href="{base}/locked/">Locked</a>
                    </body></html>"#
                ))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    mount_gallery_page(&server, "/open/", &[("/uploads/open.jpg", "Open item")]).await;
    mount_image(&server, "/uploads/open.jpg", b"open bytes").await;

    Mock::given(method("GET"))
        .and(path("/locked/"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let config = test_config(output.path(), vec![gallery_archive(&base)]);
    let summary = run_harvest(config, "test-hash", false).await.unwrap();

    // the denied page failed terminally without sinking the rest of the run
    assert_eq!(summary.records_written, 1);
    assert_eq!(summary.failures_by_kind.get("permanent-denied"), Some(&1));

    // a 403 is never retried
    assert!(summary.retried_tasks.iter().all(|t| !t.url.contains("/locked/")));
}

#[tokio::test]
async fn test_per_host_spacing_is_honored() {
    let server = MockServer::start().await;
    let base = server.uri();
    let output = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    r#"<html><body>
                    <h3 class="post-title"><a href="{base}/posts/one.html">One</a></h3>
                    <h3 class="post-title"><a href="{base}/posts/two.html">Two</a></h3>
                    <h3 class="post-title"><a href="{base}/posts/three.html">Three</a></h3>
                    </body></html>"#
                ))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    for name in ["one", "two", "three"] {
        Mock::given(method("GET"))
            .and(path(format!("/posts/{}.html", name)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(
                        r#"<html><body>
                        <h1 class="post-title">Post {name}</h1>
                        <div class="post-body"><p>Body of {name}.</p></div>
                        </body></html>"#
                    ))
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;
    }

    let mut config = test_config(output.path(), vec![blog_archive(&base)]);
    config.harvester.per_host_min_interval = 200;

    let start = Instant::now();
    let summary = run_harvest(config, "test-hash", false).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(summary.records_written, 3);

    // 4 requests to one host, so at least 3 full intervals elapse
    assert!(
        elapsed.as_millis() >= 550,
        "4 spaced requests finished too quickly: {:?}",
        elapsed
    );

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
}

#[tokio::test]
async fn test_concurrency_ceiling_bounds_in_flight_fetches() {
    let server = MockServer::start().await;
    let base = server.uri();
    let output = TempDir::new().unwrap();

    let links: String = (0..4)
        .map(|i| {
            format!(
                r#"<h3 class="post-title"><a href="{base}/posts/{i}.html">Post {i}</a></h3>"#
            )
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("<html><body>{}</body></html>", links))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    for i in 0..4 {
        Mock::given(method("GET"))
            .and(path(format!("/posts/{}.html", i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(
                        r#"<html><body>
                        <h1 class="post-title">Post {i}</h1>
                        <div class="post-body"><p>Body.</p></div>
                        </body></html>"#
                    ))
                    .insert_header("content-type", "text/html")
                    .set_delay(std::time::Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
    }

    let mut config = test_config(output.path(), vec![blog_archive(&base)]);
    config.harvester.per_host_min_interval = 1;
    config.harvester.concurrency_limit = 2;

    let start = Instant::now();
    let summary = run_harvest(config, "test-hash", false).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(summary.records_written, 4);

    // 4 slow detail pages at 2 in flight take at least two waves, but
    // clearly less than fetching them one at a time
    assert!(
        elapsed.as_millis() >= 590,
        "two waves of 300ms fetches finished too quickly: {:?}",
        elapsed
    );
    assert!(
        elapsed.as_millis() < 1150,
        "fetches appear to have been serialized: {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_identical_bytes_from_different_urls_store_once() {
    let server = MockServer::start().await;
    let base = server.uri();
    let output = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/indexes/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    r#"<html><body><a href="{base}/prints/">Prints</a></body></html>"#
                ))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    mount_gallery_page(
        &server,
        "/prints/",
        &[
            ("/uploads/print-a.jpg", "First print"),
            ("/uploads/print-b.jpg", "Second print"),
        ],
    )
    .await;

    // two names, one payload
    mount_image(&server, "/uploads/print-a.jpg", b"identical payload").await;
    mount_image(&server, "/uploads/print-b.jpg", b"identical payload").await;

    let config = test_config(output.path(), vec![gallery_archive(&base)]);
    let summary = run_harvest(config, "test-hash", false).await.unwrap();

    assert_eq!(summary.records_written, 2);
    assert_eq!(summary.images_stored, 1);
    assert_eq!(summary.images_deduplicated, 1);
    assert_eq!(stored_image_count(output.path()), 1);

    // both records point at the same stored file
    let lines = dataset_lines(output.path());
    let first_paths = lines[0]["image_paths"].as_array().unwrap();
    let second_paths = lines[1]["image_paths"].as_array().unwrap();
    assert_eq!(first_paths, second_paths);
}

#[tokio::test]
async fn test_resume_on_unchanged_source_adds_nothing() {
    let server = MockServer::start().await;
    let base = server.uri();
    let output = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/indexes/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    r#"<html><body><a href="{base}/masks/">Masks</a></body></html>"#
                ))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    mount_gallery_page(
        &server,
        "/masks/",
        &[
            ("/uploads/mask-1.jpg", "First mask"),
            ("/uploads/mask-2.jpg", "Second mask"),
        ],
    )
    .await;
    mount_image(&server, "/uploads/mask-1.jpg", b"mask one").await;
    mount_image(&server, "/uploads/mask-2.jpg", b"mask two").await;

    let config = test_config(output.path(), vec![gallery_archive(&base)]);
    let first = run_harvest(config.clone(), "test-hash", false).await.unwrap();
    assert_eq!(first.records_written, 2);
    assert_eq!(first.images_stored, 2);

    let lines_before = dataset_lines(output.path());
    let images_before = stored_image_count(output.path());

    // unchanged source, resume on: zero new lines, zero new files
    let second = run_harvest(config, "test-hash", true).await.unwrap();
    assert_eq!(second.records_written, 0);
    assert_eq!(second.records_updated, 2);
    assert_eq!(second.images_stored, 0);
    assert_eq!(second.images_deduplicated, 2);

    let lines_after = dataset_lines(output.path());
    assert_eq!(lines_after.len(), lines_before.len());
    assert_eq!(stored_image_count(output.path()), images_before);
}

#[tokio::test]
async fn test_csv_seed_rows_become_records() {
    let server = MockServer::start().await;
    let base = server.uri();
    let output = TempDir::new().unwrap();
    let seed_dir = TempDir::new().unwrap();

    let seed_path = seed_dir.path().join("export.csv");
    std::fs::write(
        &seed_path,
        format!(
            "Museum number,Title,Object type,Image\n\
             Af1934.01,Carved figure,figure,{base}/media/a1.jpg\n\
             Af1934.02,Mask,mask,{base}/media/a2.jpg\n\
             Af1934.03,No image,mask,\n"
        ),
    )
    .unwrap();

    mount_image(&server, "/media/a1.jpg", b"figure bytes").await;
    mount_image(&server, "/media/a2.jpg", b"mask bytes").await;

    let mut attributes = BTreeMap::new();
    attributes.insert("Object type".to_string(), "object_type".to_string());

    let archive = ArchiveConfig {
        name: "museum".to_string(),
        kind: ArchiveKind::CsvExport,
        base_url: base.clone(),
        seed: seed_path.to_string_lossy().into_owned(),
        selectors: SelectorMap::default(),
        columns: Some(ColumnMap {
            id: "Museum number".to_string(),
            title: Some("Title".to_string()),
            description: None,
            image: "Image".to_string(),
            attributes,
        }),
    };

    let config = test_config(output.path(), vec![archive]);
    let summary = run_harvest(config, "test-hash", false).await.unwrap();

    assert_eq!(summary.records_written, 2);
    assert_eq!(summary.items_skipped, 1);
    assert_eq!(summary.images_stored, 2);

    // writes may land in any order; find the record by its key
    let lines = dataset_lines(output.path());
    assert_eq!(lines.len(), 2);
    let figure = lines
        .iter()
        .find(|line| line["source_id"] == "Af1934.01")
        .expect("record Af1934.01 missing from dataset");
    assert_eq!(figure["archive"], "museum");
    assert_eq!(figure["title"], "Carved figure");
    assert_eq!(figure["attributes"]["object_type"][0], "figure");
    assert_eq!(figure["image_paths"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancellation_flushes_already_produced_records() {
    let server = MockServer::start().await;
    let base = server.uri();
    let output = TempDir::new().unwrap();

    // two fast posts and five that never finish within the deadline
    let mut links = String::new();
    for name in ["fast-one", "fast-two"] {
        links.push_str(&format!(
            r#"<h3 class="post-title"><a href="{base}/posts/{name}.html">{name}</a></h3>"#
        ));
    }
    for i in 0..5 {
        links.push_str(&format!(
            r#"<h3 class="post-title"><a href="{base}/slow/{i}.html">slow {i}</a></h3>"#
        ));
    }
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("<html><body>{}</body></html>", links))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    for name in ["fast-one", "fast-two"] {
        Mock::given(method("GET"))
            .and(path(format!("/posts/{}.html", name)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(
                        r#"<html><body>
                        <h1 class="post-title">{name}</h1>
                        <div class="post-body"><p>Body.</p></div>
                        </body></html>"#
                    ))
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;
    }
    for i in 0..5 {
        Mock::given(method("GET"))
            .and(path(format!("/slow/{}.html", i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html></html>")
                    .set_delay(std::time::Duration::from_secs(30)),
            )
            .mount(&server)
            .await;
    }

    let mut config = test_config(output.path(), vec![blog_archive(&base)]);
    config.harvester.per_host_min_interval = 1;
    config.harvester.concurrency_limit = 8;
    config.harvester.deadline = Some(1);
    config.harvester.grace_period = 300;

    let start = Instant::now();
    let summary = run_harvest(config, "test-hash", false).await.unwrap();
    let elapsed = start.elapsed();

    // the run ended shortly after deadline + grace, not after the slow mocks
    assert!(
        elapsed.as_secs() < 10,
        "cancellation did not cut the run short: {:?}",
        elapsed
    );
    assert!(summary.cancelled);

    // exactly the records produced before cancellation were flushed
    assert_eq!(summary.records_written, 2);
    let lines = dataset_lines(output.path());
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert!(line["source_id"].as_str().unwrap().contains("fast"));
    }
}

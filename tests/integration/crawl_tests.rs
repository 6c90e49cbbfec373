//! Integration tests for the crawl engine
//!
//! These tests use wiremock to create mock HTTP servers and drive complete
//! crawl runs end-to-end through the public engine surface.

use sitelens::config::{Config, CrawlerConfig, StorageConfig, UserAgentConfig};
use sitelens::crawler::{CrawlEngine, HtmlVersion};
use sitelens::state::JobStatus;
use sitelens::storage::{JobRecord, SqliteStorage, Storage};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at `db_path`
fn create_test_config(db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            fetch_timeout: 5,
            connect_timeout: 2,
            max_concurrent_checks: 10,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        storage: StorageConfig {
            database_path: db_path.to_string(),
        },
    }
}

fn in_memory_engine() -> CrawlEngine<SqliteStorage> {
    let config = create_test_config(":memory:");
    CrawlEngine::from_config(SqliteStorage::new_in_memory().unwrap(), &config).unwrap()
}

fn add_job(engine: &CrawlEngine<SqliteStorage>, url: &str) -> String {
    engine.storage().lock().unwrap().create_job(url).unwrap().id
}

fn load_job(engine: &CrawlEngine<SqliteStorage>, id: &str) -> JobRecord {
    engine.storage().lock().unwrap().get_job(id).unwrap().unwrap()
}

async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
        .mount(server)
        .await;
}

async fn mount_head(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn crawl_to_end(engine: &CrawlEngine<SqliteStorage>, id: &str) -> JobRecord {
    engine.start_crawl(id).unwrap();
    tokio::time::timeout(Duration::from_secs(10), engine.wait_for(id))
        .await
        .expect("crawl should finish");
    load_job(engine, id)
}

#[tokio::test]
async fn test_full_crawl_records_metadata_and_broken_links() {
    let site = MockServer::start().await;
    let other = MockServer::start().await;

    mount_page(
        &site,
        "/",
        format!(
            r#"<!DOCTYPE html>
<html><head><title>Welcome</title></head>
<body>
  <h1>One</h1><h2>Two</h2><h2>Two again</h2><h6>Six</h6>
  <a href="/about">About</a>
  <a href="/missing">Missing</a>
  <a href="{other}/partner">Partner</a>
  <a>No href</a>
  <form action="/login"><input type="password" name="pw"></form>
</body></html>"#,
            other = other.uri()
        ),
    )
    .await;
    mount_head(&site, "/about", 200).await;
    mount_head(&site, "/missing", 404).await;
    mount_head(&other, "/partner", 500).await;

    let engine = in_memory_engine();
    let id = add_job(&engine, &format!("{}/", site.uri()));

    let job = crawl_to_end(&engine, &id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.last_crawled_at.is_some());
    assert!(job.error_message.is_none());

    let metadata = job.metadata.expect("completed job has metadata");
    assert_eq!(metadata.analysis.title, "Welcome");
    assert_eq!(metadata.analysis.html_version, HtmlVersion::Html5);
    assert_eq!(metadata.analysis.headings.0, [1, 2, 0, 0, 0, 1]);
    assert_eq!(metadata.analysis.internal_links, 2);
    assert_eq!(metadata.analysis.external_links, 1);
    assert!(metadata.analysis.has_login_form);
    assert_eq!(metadata.broken_links, 2);

    let mut links = engine.storage().lock().unwrap().get_broken_links(&id).unwrap();
    links.sort_by_key(|l| l.status_code);
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].status_code, 404);
    assert!(links[0].link_url.ends_with("/missing"));
    assert_eq!(links[1].status_code, 500);
    assert_eq!(links[1].error_message, "HTTP 500");

    assert!(engine.active_jobs().is_empty());
}

#[tokio::test]
async fn test_unreachable_target_becomes_error() {
    let engine = in_memory_engine();
    let id = add_job(&engine, "http://127.0.0.1:9/");

    let job = crawl_to_end(&engine, &id).await;

    assert_eq!(job.status, JobStatus::Error);
    assert!(!job.error_message.unwrap_or_default().is_empty());
    assert!(job.metadata.is_none());
    assert!(!engine.is_active(&id));
}

#[tokio::test]
async fn test_non_html_target_becomes_error() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .mount(&site)
        .await;

    let engine = in_memory_engine();
    let id = add_job(&engine, &format!("{}/data", site.uri()));

    let job = crawl_to_end(&engine, &id).await;

    assert_eq!(job.status, JobStatus::Error);
    assert!(job
        .error_message
        .unwrap()
        .starts_with("Failed to parse HTML"));
}

#[tokio::test]
async fn test_error_status_page_is_still_analyzed() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_raw("<html><title>Not Found</title></html>", "text/html"),
        )
        .mount(&site)
        .await;

    let engine = in_memory_engine();
    let id = add_job(&engine, &format!("{}/gone", site.uri()));

    let job = crawl_to_end(&engine, &id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.metadata.unwrap().analysis.title, "Not Found");
}

#[tokio::test]
async fn test_page_without_anchors() {
    let site = MockServer::start().await;
    mount_page(&site, "/", "<html><body><p>text</p></body></html>".to_string()).await;

    let engine = in_memory_engine();
    let id = add_job(&engine, &format!("{}/", site.uri()));

    let job = crawl_to_end(&engine, &id).await;

    let metadata = job.metadata.unwrap();
    assert_eq!(metadata.analysis.internal_links, 0);
    assert_eq!(metadata.analysis.external_links, 0);
    assert_eq!(metadata.broken_links, 0);
    assert_eq!(site.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_many_broken_links_all_recorded() {
    let site = MockServer::start().await;
    let anchors: String = (0..25)
        .map(|i| format!(r#"<a href="/dead/{}">{}</a>"#, i, i))
        .collect();
    mount_page(&site, "/", format!("<html><body>{}</body></html>", anchors)).await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(20)))
        .mount(&site)
        .await;

    let engine = in_memory_engine();
    let id = add_job(&engine, &format!("{}/", site.uri()));

    let job = crawl_to_end(&engine, &id).await;

    assert_eq!(job.metadata.unwrap().broken_links, 25);
    let links = engine.storage().lock().unwrap().get_broken_links(&id).unwrap();
    assert_eq!(links.len(), 25);
    assert!(links.iter().all(|l| l.status_code == 503));
}

#[tokio::test]
async fn test_recrawl_replaces_broken_links() {
    let site = MockServer::start().await;
    mount_page(&site, "/", r#"<a href="/missing">m</a>"#.to_string()).await;
    mount_head(&site, "/missing", 404).await;

    let engine = in_memory_engine();
    let id = add_job(&engine, &format!("{}/", site.uri()));

    crawl_to_end(&engine, &id).await;
    let job = crawl_to_end(&engine, &id).await;

    assert_eq!(job.status, JobStatus::Completed);
    let links = engine.storage().lock().unwrap().get_broken_links(&id).unwrap();
    assert_eq!(links.len(), 1);
}

#[tokio::test]
async fn test_double_stop_is_idempotent() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"<a href="/x">x</a>"#, "text/html")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&site)
        .await;

    let engine = in_memory_engine();
    let id = add_job(&engine, &format!("{}/", site.uri()));

    engine.start_crawl(&id).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.is_active(&id));

    engine.stop_crawl(&id);
    engine.stop_crawl(&id);

    tokio::time::timeout(Duration::from_secs(5), engine.wait_for(&id))
        .await
        .expect("stopped run should unwind");

    let job = load_job(&engine, &id);
    assert_eq!(job.status, JobStatus::Stopped);
    assert!(job.metadata.is_none());
    assert!(engine
        .storage()
        .lock()
        .unwrap()
        .get_broken_links(&id)
        .unwrap()
        .is_empty());

    // The job can be crawled again once the run has unwound
    engine.start_crawl(&id).unwrap();
    engine.stop_crawl(&id);
    engine.wait_for(&id).await;
    assert!(!engine.is_active(&id));
}

#[tokio::test]
async fn test_stop_during_link_scan_discards_results() {
    let site = MockServer::start().await;
    mount_page(
        &site,
        "/",
        r#"<a href="/missing">m</a><a href="/slow">s</a>"#.to_string(),
    )
    .await;
    mount_head(&site, "/missing", 404).await;
    Mock::given(method("HEAD"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_millis(500)))
        .mount(&site)
        .await;

    let engine = in_memory_engine();
    let id = add_job(&engine, &format!("{}/", site.uri()));

    engine.start_crawl(&id).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(engine.is_active(&id));
    assert_eq!(load_job(&engine, &id).status, JobStatus::Crawling);

    engine.stop_crawl(&id);

    tokio::time::timeout(Duration::from_secs(5), engine.wait_for(&id))
        .await
        .expect("stopped run should unwind");

    // The scan had begun when the stop arrived
    let requests = site.received_requests().await.unwrap();
    assert!(requests.iter().any(|r| r.method.to_string() == "HEAD"));

    let job = load_job(&engine, &id);
    assert_eq!(job.status, JobStatus::Stopped);
    assert!(job.metadata.is_none());
    assert!(engine
        .storage()
        .lock()
        .unwrap()
        .get_broken_links(&id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_concurrent_jobs_run_independently() {
    let site = MockServer::start().await;
    for (route, title) in [("/a", "Alpha"), ("/b", "Beta")] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(format!("<html><title>{}</title></html>", title), "text/html")
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&site)
            .await;
    }

    let engine = in_memory_engine();
    let alpha = add_job(&engine, &format!("{}/a", site.uri()));
    let beta = add_job(&engine, &format!("{}/b", site.uri()));

    engine.start_crawl(&alpha).unwrap();
    engine.start_crawl(&beta).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut expected = vec![alpha.clone(), beta.clone()];
    expected.sort();
    assert_eq!(engine.active_jobs(), expected);

    // Stopping one job leaves the other running
    engine.stop_crawl(&beta);
    assert!(engine.is_active(&alpha));

    for id in [&alpha, &beta] {
        tokio::time::timeout(Duration::from_secs(5), engine.wait_for(id))
            .await
            .expect("run should finish");
    }

    let alpha_job = load_job(&engine, &alpha);
    assert_eq!(alpha_job.status, JobStatus::Completed);
    assert_eq!(alpha_job.metadata.unwrap().analysis.title, "Alpha");

    let beta_job = load_job(&engine, &beta);
    assert_eq!(beta_job.status, JobStatus::Stopped);
    assert!(beta_job.metadata.is_none());

    assert!(engine.active_jobs().is_empty());
}

#[tokio::test]
async fn test_stop_of_idle_job_marks_stopped() {
    let engine = in_memory_engine();
    let id = add_job(&engine, "https://a.example/");

    engine.stop_crawl(&id);

    assert_eq!(load_job(&engine, &id).status, JobStatus::Stopped);
    assert!(!engine.is_active(&id));
}

#[tokio::test]
async fn test_delete_cascades_broken_links() {
    let site = MockServer::start().await;
    mount_page(&site, "/", r#"<a href="/missing">m</a>"#.to_string()).await;
    mount_head(&site, "/missing", 404).await;

    let engine = in_memory_engine();
    let id = add_job(&engine, &format!("{}/", site.uri()));
    crawl_to_end(&engine, &id).await;

    let storage = engine.storage();
    let mut storage = storage.lock().unwrap();
    assert_eq!(storage.get_broken_links(&id).unwrap().len(), 1);

    assert!(storage.delete_job(&id).unwrap());
    assert!(storage.get_job(&id).unwrap().is_none());
    assert!(storage.get_broken_links(&id).unwrap().is_empty());
}

#[tokio::test]
async fn test_results_persist_on_disk() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("sitelens.db");
    let config = create_test_config(db_path.to_str().unwrap());

    let site = MockServer::start().await;
    mount_page(&site, "/", "<html><title>Disk</title></html>".to_string()).await;

    let id = {
        let storage = SqliteStorage::new(&db_path).unwrap();
        let engine = CrawlEngine::from_config(storage, &config).unwrap();
        let id = add_job(&engine, &format!("{}/", site.uri()));
        crawl_to_end(&engine, &id).await;
        id
    };

    let storage = SqliteStorage::new(&db_path).unwrap();
    let job = storage.get_job(&id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.metadata.unwrap().analysis.title, "Disk");
}

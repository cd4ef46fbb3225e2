//! Integration tests for the registration/upload protocol.
//!
//! These tests require a running pkgindex server with a seeded directory:
//!   - user `alice` (password `alice-pw`) in exactly one group `devs`,
//!     where `devs` holds the `add_package` capability
//!   - user `mallory` (password `mallory-pw`) in one group `interlopers`
//!     with no ownership of anything
//!
//! Set TEST_BASE_URL to point at the server and run them explicitly:
//! ```sh
//! export TEST_BASE_URL="http://127.0.0.1:8080"
//! cargo test --test upload_protocol_tests -- --ignored
//! ```
//!
//! They are marked #[ignore] because they need the HTTP server and a
//! database; in CI run them separately with service containers.

use std::env;

use reqwest::multipart;
use reqwest::Client;
use reqwest::StatusCode;

struct TestServer {
    base_url: String,
}

impl TestServer {
    fn new() -> Self {
        let base_url =
            env::var("TEST_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".into());
        Self { base_url }
    }

    fn form(&self, name: &str, version: &str) -> multipart::Form {
        multipart::Form::new()
            .text(":action", "submit")
            .text("name", name.to_string())
            .text("version", version.to_string())
            .text("metadata_version", "1.0")
    }

    async fn post_form(
        &self,
        user: &str,
        password: &str,
        form: multipart::Form,
    ) -> reqwest::Response {
        Client::new()
            .post(format!("{}/", self.base_url))
            .basic_auth(user, Some(password))
            .multipart(form)
            .send()
            .await
            .expect("request failed")
    }
}

fn sdist_part(filename: &str, content: &[u8]) -> multipart::Part {
    multipart::Part::bytes(content.to_vec())
        .file_name(filename.to_string())
        .mime_str("application/gzip")
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn test_register_without_file_then_upload_then_conflict() {
    let server = TestServer::new();
    let pkg = format!("demo-lib-{}", std::process::id());

    // Register the release with no file: valid terminal state.
    let resp = server
        .post_form("alice", "alice-pw", server.form(&pkg, "1.0"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("release registered"), "body was: {}", body);

    // Same package/version, now with a file.
    let filename = format!("{}-1.0.tar.gz", pkg);
    let form = server
        .form(&pkg, "1.0")
        .text("filetype", "sdist")
        .part("content", sdist_part(&filename, b"not really a tarball"));
    let resp = server.post_form("alice", "alice-pw", form).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("upload accepted"), "body was: {}", body);

    // Re-upload of the identical filename is rejected without overwrite.
    let form = server
        .form(&pkg, "1.0")
        .part("content", sdist_part(&filename, b"second attempt"));
    let resp = server.post_form("alice", "alice-pw", form).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = resp.text().await.unwrap();
    assert!(body.contains("already been uploaded"), "body was: {}", body);
}

#[tokio::test]
#[ignore]
async fn test_first_registration_reports_download_groups() {
    let server = TestServer::new();
    let pkg = format!("onboard-{}", std::process::id());

    let resp = server
        .post_form("alice", "alice-pw", server.form(&pkg, "0.1"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("release registered"));
    assert!(body.contains("devs"), "onboarding notice missing: {}", body);
}

#[tokio::test]
#[ignore]
async fn test_non_owner_upload_is_forbidden() {
    let server = TestServer::new();
    let pkg = format!("owned-{}", std::process::id());

    let resp = server
        .post_form("alice", "alice-pw", server.form(&pkg, "1.0"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    // mallory's group owns nothing here.
    let resp = server
        .post_form("mallory", "mallory-pw", server.form(&pkg, "2.0"))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_missing_name_and_version_are_bad_requests() {
    let server = TestServer::new();

    let form = multipart::Form::new().text("version", "1.0");
    let resp = server.post_form("alice", "alice-pw", form).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let form = multipart::Form::new().text("name", format!("nover-{}", std::process::id()));
    let resp = server.post_form("alice", "alice-pw", form).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_unsupported_metadata_version_is_rejected() {
    let server = TestServer::new();
    let pkg = format!("badmeta-{}", std::process::id());

    let form = multipart::Form::new()
        .text("name", pkg)
        .text("version", "1.0")
        .text("metadata_version", "9.9");
    let resp = server.post_form("alice", "alice-pw", form).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = resp.text().await.unwrap();
    assert!(body.contains("1.0, 1.1, 1.2"), "body was: {}", body);
}

#[tokio::test]
#[ignore]
async fn test_classifiers_appear_in_listing() {
    let server = TestServer::new();
    let pkg = format!("tagged-{}", std::process::id());
    let classifier = format!("Topic :: Testing :: {}", pkg);

    // metadata_version 1.0 + classifiers: the server upgrades to 1.1 and
    // must accept the tags rather than dropping them.
    let form = server
        .form(&pkg, "1.0")
        .text("classifiers", classifier.clone());
    let resp = server.post_form("alice", "alice-pw", form).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let listing = Client::new()
        .get(format!("{}/classifiers", server.base_url))
        .send()
        .await
        .expect("request failed")
        .text()
        .await
        .unwrap();
    assert!(listing.contains(&classifier), "listing: {}", listing);
}

#[tokio::test]
#[ignore]
async fn test_unauthenticated_post_is_rejected() {
    let server = TestServer::new();

    let resp = Client::new()
        .post(format!("{}/", server.base_url))
        .multipart(server.form("anon-pkg", "1.0"))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

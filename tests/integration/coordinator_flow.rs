//! Coordinator behaviour across real worker tasks: check gating, skip-list
//! filtering and independence of checks and downloads.

use crate::helpers::{RELEASE_PATH, Sandbox, drain, release_json, zip_bytes};
use integra::update::{CheckEvent, DownloadEvent, UpdateCoordinator, Version};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_release(server: &MockServer, tag: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(RELEASE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(release_json(tag, &["integra-linux.zip"], &server.uri()))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

async fn wait_until_idle(coordinator: &UpdateCoordinator) {
    while coordinator.is_checking() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn second_check_is_ignored_while_first_runs() {
    let server = MockServer::start().await;
    mount_release(&server, "v1.2.0", Duration::from_millis(300)).await;

    let sandbox = Sandbox::new();
    let mut coordinator = UpdateCoordinator::new(sandbox.context(&server.uri()));

    assert!(coordinator.check_for_update());
    assert!(coordinator.is_checking());
    assert!(!coordinator.check_for_update());

    let event = coordinator.next_check_event().await.unwrap();
    let CheckEvent::UpdateAvailable(info) = event else {
        panic!("expected an update, got {event:?}");
    };
    assert_eq!(info.version, Version::new(1, 2, 0));

    wait_until_idle(&coordinator).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert!(coordinator.check_for_update());
    assert!(coordinator.next_check_event().await.is_some());
}

#[tokio::test]
async fn skipped_version_is_reported_as_no_update() {
    let server = MockServer::start().await;
    mount_release(&server, "v1.2.0", Duration::ZERO).await;

    let sandbox = Sandbox::new();
    let mut coordinator = UpdateCoordinator::new(sandbox.context(&server.uri()));
    coordinator.skip_version(&Version::new(1, 2, 0));

    assert!(coordinator.check_for_update());
    assert_eq!(coordinator.next_check_event().await, Some(CheckEvent::NoUpdate));

    // A different newer version is still offered.
    server.reset().await;
    mount_release(&server, "v1.3.0", Duration::ZERO).await;
    wait_until_idle(&coordinator).await;
    assert!(coordinator.check_for_update());
    assert!(matches!(
        coordinator.next_check_event().await,
        Some(CheckEvent::UpdateAvailable(info)) if info.version == Version::new(1, 3, 0)
    ));
}

#[tokio::test]
async fn persisted_skip_list_applies_after_restart() {
    let server = MockServer::start().await;
    mount_release(&server, "v1.2.0", Duration::ZERO).await;

    let sandbox = Sandbox::new();
    let persistent = || {
        let mut ctx = sandbox.context(&server.uri());
        ctx.config.persist_skipped_versions = true;
        ctx
    };

    let mut coordinator = UpdateCoordinator::new(persistent());
    coordinator.skip_version(&Version::new(1, 2, 0));
    drop(coordinator);

    let mut restarted = UpdateCoordinator::new(persistent());
    assert!(restarted.check_for_update());
    assert_eq!(restarted.next_check_event().await, Some(CheckEvent::NoUpdate));
}

#[tokio::test]
async fn check_runs_while_download_is_active() {
    let server = MockServer::start().await;
    mount_release(&server, "v1.2.0", Duration::ZERO).await;
    Mock::given(method("GET"))
        .and(path("/download/integra-linux.zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(zip_bytes(&[("integra", b"new build".as_slice())]))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let sandbox = Sandbox::new();
    let mut coordinator = UpdateCoordinator::new(sandbox.context(&server.uri()));

    assert!(coordinator.check_for_update());
    let Some(CheckEvent::UpdateAvailable(info)) = coordinator.next_check_event().await else {
        panic!("expected an update");
    };

    let mut task = coordinator.download_update(info).unwrap().start().unwrap();
    wait_until_idle(&coordinator).await;
    assert!(coordinator.is_downloading());
    assert!(coordinator.check_for_update());
    assert!(matches!(
        coordinator.next_check_event().await,
        Some(CheckEvent::UpdateAvailable(_))
    ));

    let events = drain(&mut task).await;
    assert!(matches!(events.last(), Some(DownloadEvent::Completed { .. })), "{events:?}");
}

#[tokio::test]
async fn unreachable_index_is_check_failed() {
    let sandbox = Sandbox::new();
    let mut coordinator = UpdateCoordinator::new(sandbox.context("http://127.0.0.1:9"));

    assert!(coordinator.check_for_update());
    assert!(matches!(
        coordinator.next_check_event().await,
        Some(CheckEvent::CheckFailed(_))
    ));
    assert!(!coordinator.is_downloading());
}

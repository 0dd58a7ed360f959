//! Download sessions end to end: streamed download, extraction and the
//! hand-off to the (inert) swap strategy.

use crate::helpers::{Sandbox, drain, serve_raw, update_info, zip_bytes};
use integra::update::{DownloadEvent, UpdateCoordinator, UpdateError};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve(server: &MockServer, name: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/download/{name}")))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn successful_session_emits_ordered_events() {
    let server = MockServer::start().await;
    let archive = zip_bytes(&[
        ("Integra/integra", b"new build".as_slice()),
        ("Integra/LICENSE", b"license".as_slice()),
    ]);
    let total = archive.len() as u64;
    serve(
        &server,
        "integra-linux.zip",
        ResponseTemplate::new(200).set_body_bytes(archive),
    )
    .await;

    let sandbox = Sandbox::new();
    let coordinator = UpdateCoordinator::new(sandbox.context(&server.uri()));
    let mut task = coordinator
        .download_update(update_info(&server.uri(), "integra-linux.zip"))
        .unwrap()
        .start()
        .unwrap();

    let events = drain(&mut task).await;

    let progress: Vec<(u64, Option<u64>)> = events
        .iter()
        .filter_map(|e| match e {
            DownloadEvent::Progress {
                bytes_downloaded,
                total_bytes,
            } => Some((*bytes_downloaded, *total_bytes)),
            _ => None,
        })
        .collect();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0), "{progress:?}");
    assert!(progress.iter().all(|(done, t)| *t == Some(total) && *done <= total));
    assert_eq!(progress.last().unwrap().0, total);

    let stages: Vec<&DownloadEvent> = events
        .iter()
        .filter(|e| !matches!(e, DownloadEvent::Progress { .. }))
        .collect();
    assert_eq!(stages.len(), 3, "{stages:?}");
    assert_eq!(stages[0], &DownloadEvent::ExtractionStarted);
    assert_eq!(stages[1], &DownloadEvent::InstallationStarted);
    let DownloadEvent::Completed { script } = stages[2] else {
        panic!("expected completion, got {:?}", stages[2]);
    };
    assert_eq!(script, &sandbox.exe().with_file_name("update_integra.sh"));
    assert!(script.is_file());

    // Backup taken; running executable untouched until the script runs.
    let backup = sandbox.exe().with_file_name("integra.backup");
    assert_eq!(std::fs::read(&backup).unwrap(), b"installed build");
    assert_eq!(std::fs::read(sandbox.exe()).unwrap(), b"installed build");

    let plans = sandbox.replacer.plans.lock().unwrap();
    assert_eq!(plans.len(), 1);
    assert!(plans[0].new_binary.ends_with("extracted/Integra/integra"));
    let session_dir = plans[0].new_binary.ancestors().nth(3).unwrap();
    assert!(session_dir.starts_with(sandbox.work_dir()));
    assert!(
        session_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("integra_update_")
    );
    assert!(session_dir.join("integra-linux.zip").is_file());
    drop(plans);

    assert!(!coordinator.is_downloading());
}

#[tokio::test]
async fn http_failure_stops_before_extraction() {
    let server = MockServer::start().await;
    serve(&server, "integra-linux.zip", ResponseTemplate::new(404)).await;

    let sandbox = Sandbox::new();
    let coordinator = UpdateCoordinator::new(sandbox.context(&server.uri()));
    let mut task = coordinator
        .download_update(update_info(&server.uri(), "integra-linux.zip"))
        .unwrap()
        .start()
        .unwrap();

    let events = drain(&mut task).await;

    assert!(!events.contains(&DownloadEvent::ExtractionStarted));
    let Some(DownloadEvent::Failed { message }) = events.last() else {
        panic!("expected failure, got {events:?}");
    };
    assert!(message.contains("404"), "{message}");
    assert!(!sandbox.exe().with_file_name("integra.backup").exists());
    assert!(!coordinator.is_downloading());
}

#[tokio::test]
async fn corrupt_archive_fails_before_installation() {
    let server = MockServer::start().await;
    serve(
        &server,
        "integra-linux.zip",
        ResponseTemplate::new(200).set_body_bytes(b"this is not a zip archive".to_vec()),
    )
    .await;

    let sandbox = Sandbox::new();
    let coordinator = UpdateCoordinator::new(sandbox.context(&server.uri()));
    let mut task = coordinator
        .download_update(update_info(&server.uri(), "integra-linux.zip"))
        .unwrap()
        .start()
        .unwrap();

    let events = drain(&mut task).await;

    assert!(events.contains(&DownloadEvent::ExtractionStarted));
    assert!(!events.contains(&DownloadEvent::InstallationStarted));
    assert!(matches!(events.last(), Some(DownloadEvent::Failed { .. })));
    assert_eq!(std::fs::read(sandbox.exe()).unwrap(), b"installed build");
}

#[tokio::test]
async fn archive_without_product_binary_fails_install() {
    let server = MockServer::start().await;
    serve(
        &server,
        "integra-linux.zip",
        ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[("docs/readme.txt", b"hi".as_slice())])),
    )
    .await;

    let sandbox = Sandbox::new();
    let coordinator = UpdateCoordinator::new(sandbox.context(&server.uri()));
    let mut task = coordinator
        .download_update(update_info(&server.uri(), "integra-linux.zip"))
        .unwrap()
        .start()
        .unwrap();

    let events = drain(&mut task).await;

    assert!(events.contains(&DownloadEvent::InstallationStarted));
    let Some(DownloadEvent::Failed { message }) = events.last() else {
        panic!("expected failure, got {events:?}");
    };
    assert!(message.contains("no executable"), "{message}");
    assert!(sandbox.replacer.plans.lock().unwrap().is_empty());
}

#[tokio::test]
async fn bare_appimage_is_installed_without_extraction() {
    let server = MockServer::start().await;
    serve(
        &server,
        "Integra-x86_64.AppImage",
        ResponseTemplate::new(200).set_body_bytes(b"appimage payload".to_vec()),
    )
    .await;

    let sandbox = Sandbox::new();
    let coordinator = UpdateCoordinator::new(sandbox.context(&server.uri()));
    let mut task = coordinator
        .download_update(update_info(&server.uri(), "Integra-x86_64.AppImage"))
        .unwrap()
        .start()
        .unwrap();

    let events = drain(&mut task).await;

    assert!(matches!(events.last(), Some(DownloadEvent::Completed { .. })), "{events:?}");
    let plans = sandbox.replacer.plans.lock().unwrap();
    assert!(plans[0].new_binary.ends_with("extracted/Integra-x86_64.AppImage"));
}

#[tokio::test]
async fn only_one_download_runs_at_a_time() {
    let server = MockServer::start().await;
    serve(
        &server,
        "integra-linux.zip",
        ResponseTemplate::new(200)
            .set_body_bytes(zip_bytes(&[("integra", b"new build".as_slice())]))
            .set_delay(Duration::from_millis(500)),
    )
    .await;

    let sandbox = Sandbox::new();
    let coordinator = UpdateCoordinator::new(sandbox.context(&server.uri()));
    let info = update_info(&server.uri(), "integra-linux.zip");

    // Both handed out while idle; only the first to start wins.
    let first = coordinator.download_update(info.clone()).unwrap();
    let second = coordinator.download_update(info.clone()).unwrap();
    let mut task = first.start().unwrap();
    assert!(coordinator.is_downloading());
    assert_eq!(second.start().unwrap_err(), UpdateError::DownloadInProgress);
    assert!(coordinator.download_update(info.clone()).is_none());

    let events = drain(&mut task).await;
    assert!(matches!(events.last(), Some(DownloadEvent::Completed { .. })), "{events:?}");

    assert!(!coordinator.is_downloading());
    assert!(coordinator.download_update(info).is_some());
}

fn progress_of(events: &[DownloadEvent]) -> Vec<(u64, Option<u64>)> {
    events
        .iter()
        .filter_map(|e| match e {
            DownloadEvent::Progress {
                bytes_downloaded,
                total_bytes,
            } => Some((*bytes_downloaded, *total_bytes)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn body_cut_short_of_content_length_is_incomplete() {
    let mut response =
        b"HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: 4096\r\n\r\n"
            .to_vec();
    response.extend_from_slice(&[0x50; 100]);
    let uri = serve_raw(response).await;

    let sandbox = Sandbox::new();
    let coordinator = UpdateCoordinator::new(sandbox.context(&uri));
    let mut task = coordinator
        .download_update(update_info(&uri, "integra-linux.zip"))
        .unwrap()
        .start()
        .unwrap();

    let events = drain(&mut task).await;

    let Some(DownloadEvent::Failed { message }) = events.last() else {
        panic!("expected failure, got {events:?}");
    };
    assert!(message.contains("download incomplete"), "{message}");
    assert!(message.contains("of 4096 bytes"), "{message}");
    assert!(!events.contains(&DownloadEvent::ExtractionStarted));
    assert!(
        progress_of(&events)
            .iter()
            .all(|(done, total)| *total == Some(4096) && *done <= 100)
    );
    assert!(!sandbox.exe().with_file_name("integra.backup").exists());
    assert!(!coordinator.is_downloading());
}

#[tokio::test]
async fn unknown_length_reports_progress_without_total() {
    let archive = zip_bytes(&[("integra", b"new build".as_slice())]);
    let size = archive.len() as u64;
    let mut response = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec();
    response.extend_from_slice(&archive);
    let uri = serve_raw(response).await;

    let sandbox = Sandbox::new();
    let coordinator = UpdateCoordinator::new(sandbox.context(&uri));
    let mut task = coordinator
        .download_update(update_info(&uri, "integra-linux.zip"))
        .unwrap()
        .start()
        .unwrap();

    let events = drain(&mut task).await;

    assert!(matches!(events.last(), Some(DownloadEvent::Completed { .. })), "{events:?}");
    let progress = progress_of(&events);
    assert_eq!(progress.first(), Some(&(0, None)));
    assert!(progress.iter().all(|(_, total)| total.is_none()), "{progress:?}");
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0), "{progress:?}");
    assert_eq!(progress.last().unwrap().0, size);
}

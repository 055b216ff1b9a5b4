use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use storyfetch::prelude::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/128.0";

fn client_for(server: &MockServer, temp_root: &Path) -> Storyfetch {
    let config = Config {
        base_url: format!("{}/@", server.uri()),
        user_agent: TEST_UA.to_string(),
        concurrency: 2,
        temp_root: Some(temp_root.to_path_buf()),
        ..Config::default()
    };
    Storyfetch::new(config).unwrap()
}

fn page(state: &serde_json::Value) -> String {
    format!(
        r#"<!DOCTYPE html><html><head><title>x</title></head><body><div id="__next"></div><script id="__NEXT_DATA__" type="application/json">{}</script></body></html>"#,
        state
    )
}

async fn mount_media(server: &MockServer, route: &str, body: &[u8], mime: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_vec(), mime))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetch_sends_browser_user_agent_and_parses_state() {
    let server = MockServer::start().await;
    let state = serde_json::json!({"props": {"pageProps": {"story": {"snapList": []}}}});
    Mock::given(method("GET"))
        .and(path("/@alice"))
        .and(header("user-agent", TEST_UA))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page(&state), "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let sf = client_for(&server, tmp.path());
    assert_eq!(sf.fetch_profile("alice").await, Some(state));
}

#[tokio::test]
async fn fetch_failure_kinds_are_distinct() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/@broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/@nopayload"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html><body>changed</body></html>", "text/html"))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let sf = client_for(&server, tmp.path());

    let err = sf.try_fetch_profile("ghost").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(sf.try_fetch_profile("broken").await, Err(FetchError::Status(500))));
    let err = sf.try_fetch_profile("nopayload").await.unwrap_err();
    assert!(err.is_parse_failure() && !err.is_not_found());

    for handle in ["ghost", "broken", "nopayload"] {
        assert!(sf.fetch_profile(handle).await.is_none());
    }
}

#[tokio::test]
async fn one_failing_url_does_not_stop_the_batch() {
    let server = MockServer::start().await;
    mount_media(&server, "/m/a.jpg", b"image-a", "image/jpeg").await;
    mount_media(&server, "/m/clip", b"video-bytes", "video/mp4").await;
    mount_media(&server, "/m/c.png", b"image-c", "image/png").await;
    Mock::given(method("GET"))
        .and(path("/m/gone.jpg"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let sf = client_for(&server, tmp.path());
    let urls: Vec<String> = ["/m/a.jpg", "/m/gone.jpg", "/m/clip", "/m/c.png"]
        .iter()
        .map(|p| format!("{}{}", server.uri(), p))
        .collect();
    let dest = tmp.path().join("batch");

    let files = sf.retrieve_all(&urls, &dest).await;
    assert_eq!(files.len(), 3);

    let names: Vec<String> = files.iter().map(|f| f.path.file_name().unwrap().to_string_lossy().to_string()).collect();
    assert_eq!(names, ["a.jpg", "clip.mp4", "c.png"]);
    assert_eq!(files[0].kind, MediaKind::Image);
    assert_eq!(files[1].kind, MediaKind::Video);
    assert_eq!(files[1].url, urls[2]);
    assert_eq!(std::fs::read(&files[1].path).unwrap(), b"video-bytes");
    assert!(!dest.join("gone.jpg").exists());
}

#[tokio::test]
async fn same_basename_from_different_urls_keeps_both() {
    let server = MockServer::start().await;
    mount_media(&server, "/x/media.jpg", b"first", "image/jpeg").await;
    mount_media(&server, "/y/media.jpg", b"second", "image/jpeg").await;

    let tmp = tempfile::tempdir().unwrap();
    let sf = client_for(&server, tmp.path());
    let urls = vec![format!("{}/x/media.jpg", server.uri()), format!("{}/y/media.jpg", server.uri())];

    let files = sf.retrieve_all(&urls, &tmp.path().join("dl")).await;
    assert_eq!(files.len(), 2);
    assert_ne!(files[0].path, files[1].path);
    assert_eq!(std::fs::read(&files[0].path).unwrap(), b"first");
    assert_eq!(std::fs::read(&files[1].path).unwrap(), b"second");
}

#[tokio::test]
async fn empty_batch_writes_nothing() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let sf = client_for(&server, tmp.path());
    let dest = tmp.path().join("never");
    assert!(sf.retrieve_all(&[], &dest).await.is_empty());
    assert!(!dest.exists());
    assert!(sf.build_archive(&[], "alice", "stories").await.unwrap().is_none());
}

#[tokio::test]
async fn story_download_produces_files_and_archive() {
    let server = MockServer::start().await;
    let uri = server.uri();
    let state = serde_json::json!({"props": {"pageProps": {
        "story": {"snapList": [
            {"snapUrls": {"mediaUrl": format!("{uri}/s/one.jpg")}},
            {"snapUrls": {"mediaUrl": format!("{uri}/s/missing.jpg")}},
            {"snapUrls": {"mediaUrl": format!("{uri}/s/two")}}
        ]},
        "curatedHighlights": [{"storyTitle": {"value": "Beach"}, "snapList": [
            {"snapUrls": {"mediaUrl": format!("{uri}/h/sand.jpg")}}
        ]}]
    }}});
    Mock::given(method("GET"))
        .and(path("/@alice"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page(&state), "text/html"))
        .mount(&server)
        .await;
    mount_media(&server, "/s/one.jpg", b"one", "image/jpeg").await;
    mount_media(&server, "/s/two", b"two", "video/mp4").await;

    let tmp = tempfile::tempdir().unwrap();
    let sf = client_for(&server, tmp.path());

    let Outcome::Downloaded { files, archive } = sf.download("alice", &Selection::Stories, true).await.unwrap() else {
        panic!("expected a download");
    };
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f.path.starts_with(tmp.path())));

    let archive = archive.expect("archive");
    let archive_name = archive.file_name().unwrap().to_string_lossy().to_string();
    assert!(archive_name.starts_with("alice_stories_"));
    let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
    assert_eq!(zip.len(), 2);
    for f in &files {
        let name = f.path.file_name().unwrap().to_str().unwrap();
        let mut got = Vec::new();
        zip.by_name(name).unwrap().read_to_end(&mut got).unwrap();
        assert_eq!(got, std::fs::read(&f.path).unwrap());
    }
}

#[tokio::test]
async fn download_reports_missing_profile_and_empty_selection() {
    let server = MockServer::start().await;
    let state = serde_json::json!({"props": {"pageProps": {"story": {"snapList": []}}}});
    Mock::given(method("GET"))
        .and(path("/@quiet"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page(&state), "text/html"))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let sf = client_for(&server, tmp.path());

    assert_eq!(sf.download("ghost", &Selection::Stories, true).await.unwrap(), Outcome::NoProfile);
    assert_eq!(
        sf.download("quiet", &Selection::Spotlights(AlbumChoice::All), true).await.unwrap(),
        Outcome::NothingSelected
    );
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

// --- raw socket servers for body timing and truncation ---

fn raw_client(temp_root: &Path, concurrency: usize, timeout_secs: u64) -> Storyfetch {
    let config = Config {
        user_agent: TEST_UA.to_string(),
        concurrency,
        request_timeout_secs: timeout_secs,
        temp_root: Some(temp_root.to_path_buf()),
        ..Config::default()
    };
    Storyfetch::new(config).unwrap()
}

/// Consume the request head so the client sees a well-behaved peer.
async fn read_head(sock: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        match sock.read(&mut byte).await {
            Ok(0) | Err(_) => return,
            Ok(_) => buf.push(byte[0]),
        }
    }
}

fn head(mime: &str, len: usize) -> String {
    format!("HTTP/1.1 200 OK\r\nContent-Type: {mime}\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n")
}

#[tokio::test]
async fn slow_body_within_idle_bound_is_kept() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body = b"abcdef";
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        read_head(&mut sock).await;
        sock.write_all(head("video/mp4", body.len()).as_bytes()).await.unwrap();
        // 6 x 300ms: longer than the 1s bound in total, never idle that long.
        for b in body {
            tokio::time::sleep(Duration::from_millis(300)).await;
            sock.write_all(&[*b]).await.unwrap();
            sock.flush().await.unwrap();
        }
    });

    let tmp = tempfile::tempdir().unwrap();
    let sf = raw_client(tmp.path(), 2, 1);
    let urls = vec![format!("http://{addr}/v/long")];
    let files = sf.retrieve_all(&urls, &tmp.path().join("slow")).await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].kind, MediaKind::Video);
    assert_eq!(std::fs::read(&files[0].path).unwrap(), body);
}

#[tokio::test]
async fn in_flight_downloads_never_exceed_concurrency() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    {
        let (in_flight, peak) = (in_flight.clone(), peak.clone());
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else { return };
                let (in_flight, peak) = (in_flight.clone(), peak.clone());
                tokio::spawn(async move {
                    read_head(&mut sock).await;
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    let _ = sock.write_all(head("image/jpeg", 2).as_bytes()).await;
                    let _ = sock.write_all(b"ok").await;
                    let _ = sock.flush().await;
                });
            }
        });
    }

    let tmp = tempfile::tempdir().unwrap();
    let sf = raw_client(tmp.path(), 2, 5);
    let urls: Vec<String> = (0..6).map(|i| format!("http://{addr}/v/{i}.jpg")).collect();
    let started = Instant::now();
    let files = sf.retrieve_all(&urls, &tmp.path().join("pool")).await;

    assert_eq!(files.len(), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2, "peak {}", peak.load(Ordering::SeqCst));
    assert!(peak.load(Ordering::SeqCst) >= 1);
    // three waves of two
    assert!(started.elapsed() >= Duration::from_millis(550));
}

#[tokio::test]
async fn truncated_body_leaves_no_file() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        read_head(&mut sock).await;
        sock.write_all(head("image/jpeg", 10).as_bytes()).await.unwrap();
        sock.write_all(b"abc").await.unwrap();
        sock.flush().await.unwrap();
    });

    let tmp = tempfile::tempdir().unwrap();
    let sf = raw_client(tmp.path(), 2, 5);
    let dest = tmp.path().join("cut");
    let files = sf.retrieve_all(&[format!("http://{addr}/m/cut.jpg")], &dest).await;
    assert!(files.is_empty());
    assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
}

#[tokio::test]
async fn unwritable_target_is_excluded_and_siblings_kept() {
    let server = MockServer::start().await;
    mount_media(&server, "/m/a.jpg", b"a", "image/jpeg").await;
    mount_media(&server, "/m/b.jpg", b"b", "image/jpeg").await;
    mount_media(&server, "/m/c.jpg", b"c", "image/jpeg").await;

    let tmp = tempfile::tempdir().unwrap();
    let sf = client_for(&server, tmp.path());
    let dest = tmp.path().join("blocked");
    std::fs::create_dir_all(dest.join("b.jpg")).unwrap();
    let urls: Vec<String> = ["/m/a.jpg", "/m/b.jpg", "/m/c.jpg"].iter().map(|p| format!("{}{}", server.uri(), p)).collect();

    let files = sf.retrieve_all(&urls, &dest).await;
    let names: Vec<String> = files.iter().map(|f| f.path.file_name().unwrap().to_string_lossy().to_string()).collect();
    assert_eq!(names, ["a.jpg", "c.jpg"]);
    assert!(dest.join("b.jpg").is_dir());
    assert_eq!(std::fs::read(dest.join("c.jpg")).unwrap(), b"c");
}

mod common;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{ScriptedRunner, test_client};
use udemy_downloader::config::DownloadConfig;
use udemy_downloader::parser::extractor::AssetExtractor;
use udemy_downloader::parser::models::{
    Asset, DownloadKind, EntryClass, Lecture, LectureEntry, LectureMedia, SourceKind,
};

const MASTER_PLAYLIST: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360,CODECS=\"avc1.4d401e,mp4a.40.2\"
a/360.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=900000,RESOLUTION=640x360,CODECS=\"avc1.4d401e,mp4a.40.2\"
b/360.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720,CODECS=\"avc1.4d401f,mp4a.40.2\"
a/720.m3u8
";

fn entry(id: u64, raw: Value) -> LectureEntry {
    LectureEntry {
        id,
        class: EntryClass::Lecture,
        counter: 5,
        object_index: 5,
        title: format!("005 Lecture {}", id),
        raw,
    }
}

/// 清晰源、加密源和 HTML 正文三者恰好有一个
fn exactly_one_payload(lecture: &Lecture) -> bool {
    let clear = matches!(&lecture.media, LectureMedia::Clear { sources, .. } if !sources.is_empty());
    let encrypted = matches!(&lecture.media, LectureMedia::Encrypted { sources, .. } if !sources.is_empty());
    let html = lecture.html_body().is_some();
    [clear, encrypted, html].iter().filter(|b| **b).count() == 1
}

async fn server_with_media() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/77/master.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MASTER_PLAYLIST))
        .mount(&server)
        .await;
    for variant in ["a/360.m3u8", "b/360.m3u8", "a/720.m3u8"] {
        Mock::given(method("GET"))
            .and(path(format!("/assets/77/{}", variant)))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n#EXTINF:4.0,\nseg.ts\n#EXT-X-ENDLIST\n"))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/assets/88/index.mpd"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<MPD></MPD>"))
        .mount(&server)
        .await;
    server
}

fn probe() -> String {
    json!({
        "formats": [
            {"format_id": "a1", "vcodec": "none", "acodec": "opus", "tbr": 96.0},
            {"format_id": "v2", "vcodec": "avc1", "acodec": "none", "height": 720, "width": 1280, "ext": "mp4", "tbr": 1200.0}
        ]
    })
    .to_string()
}

#[tokio::test]
async fn every_lecture_kind_has_one_payload() {
    let server = server_with_media().await;
    let base = server.uri();
    let client = test_client(&base);
    let runner = ScriptedRunner::with_probe(probe());
    let temp = tempfile::tempdir().unwrap();
    let config = DownloadConfig::default();
    let extractor = AssetExtractor::new(
        &client,
        &runner,
        &config,
        temp.path().to_path_buf(),
        CancellationToken::new(),
    );

    let clear = extractor
        .extract(&entry(1, json!({
            "asset": {"id": 77, "asset_type": "Video", "stream_urls": {"Video": [
                {"type": "application/x-mpegURL", "file": format!("{}/assets/77/master.m3u8", base), "label": "auto"},
                {"type": "video/mp4", "file": "https://cdn.example.com/77/1080.mp4", "label": "1080"},
                {"type": "audio/mp4", "file": "https://cdn.example.com/77/audio.mp4", "label": "Audio"}
            ]}}
        })))
        .await
        .unwrap();
    assert_eq!(clear.is_encrypted(), Some(false));
    assert!(exactly_one_payload(&clear));
    let kinds: Vec<(SourceKind, u32)> = clear.sources().iter().map(|s| (s.kind, s.height)).collect();
    assert_eq!(
        kinds,
        vec![(SourceKind::Hls, 360), (SourceKind::Hls, 720), (SourceKind::Progressive, 1080)]
    );
    assert!(temp.path().join("index_77_640x360.m3u8").is_file());

    let encrypted = extractor
        .extract(&entry(2, json!({
            "asset": {"id": 88, "asset_type": "Video", "media_sources": [
                {"type": "application/dash+xml", "src": format!("{}/assets/88/index.mpd", base)}
            ]}
        })))
        .await
        .unwrap();
    assert_eq!(encrypted.is_encrypted(), Some(true));
    assert!(exactly_one_payload(&encrypted));
    assert_eq!(encrypted.sources()[0].format_id.as_deref(), Some("v2,a1"));

    let article = extractor
        .extract(&entry(3, json!({
            "asset": {"id": 99, "asset_type": "Article", "body": "<p>Read me</p>"}
        })))
        .await
        .unwrap();
    assert!(exactly_one_payload(&article));
    assert_eq!(article.html_body(), Some("<p>Read me</p>"));
    assert!(matches!(article.assets.as_slice(), [Asset::Article { .. }]));

    // DASH 探测没有任何格式时不算加密课时
    let unprobed = AssetExtractor::new(
        &client,
        &ScriptedRunner::with_probe("{}"),
        &config,
        temp.path().to_path_buf(),
        CancellationToken::new(),
    )
    .extract(&entry(5, json!({
        "asset": {"id": 88, "asset_type": "Video", "media_sources": [
            {"type": "application/dash+xml", "src": format!("{}/assets/88/index.mpd", base)}
        ]}
    })))
    .await
    .unwrap();
    assert!(matches!(unprobed.media, LectureMedia::None));

    let bare = extractor.extract(&entry(4, json!({}))).await.unwrap();
    assert!(matches!(bare.media, LectureMedia::None));
    assert_eq!(bare.is_encrypted(), None);
}

#[tokio::test]
async fn skip_hls_leaves_progressive_sources() {
    let server = server_with_media().await;
    let base = server.uri();
    let client = test_client(&base);
    let runner = ScriptedRunner::default();
    let temp = tempfile::tempdir().unwrap();
    let config = DownloadConfig {
        skip_hls: true,
        ..Default::default()
    };
    let extractor = AssetExtractor::new(
        &client,
        &runner,
        &config,
        temp.path().to_path_buf(),
        CancellationToken::new(),
    );

    let lecture = extractor
        .extract(&entry(1, json!({
            "asset": {"id": 77, "asset_type": "Video", "stream_urls": {"Video": [
                {"type": "application/x-mpegURL", "file": format!("{}/assets/77/master.m3u8", base), "label": "auto"},
                {"type": "video/mp4", "file": "https://cdn.example.com/77/480.mp4", "label": "480"}
            ]}}
        })))
        .await
        .unwrap();
    let heights: Vec<u32> = lecture.sources().iter().map(|s| s.height).collect();
    assert_eq!(heights, vec![480]);
    assert!(!temp.path().join("index_77.m3u8").exists());

    let hls_only = extractor
        .extract(&entry(2, json!({
            "asset": {"id": 77, "asset_type": "Video", "stream_urls": {"Video": [
                {"type": "application/x-mpegURL", "file": format!("{}/assets/77/master.m3u8", base), "label": "auto"}
            ]}}
        })))
        .await
        .unwrap();
    assert!(matches!(hls_only.media, LectureMedia::None));
    assert!(hls_only.sources().is_empty());
}

#[tokio::test]
async fn supplementary_assets_get_counter_prefix() {
    let client = test_client("http://127.0.0.1:9");
    let runner = ScriptedRunner::default();
    let temp = tempfile::tempdir().unwrap();
    let config = DownloadConfig::default();
    let extractor = AssetExtractor::new(
        &client,
        &runner,
        &config,
        temp.path().to_path_buf(),
        CancellationToken::new(),
    );

    let lecture = extractor
        .extract(&entry(9, json!({
            "asset": {"id": 1, "asset_type": "Article", "body": ""},
            "supplementary_assets": [
                {"id": 2, "asset_type": "File", "filename": "slides.pdf",
                 "download_urls": {"File": [{"file": "https://cdn.example.com/slides.pdf", "label": "download"}]}},
                {"id": 3, "asset_type": "ExternalLink", "title": "Docs", "filename": "docs",
                 "external_url": "https://doc.rust-lang.org"}
            ]
        })))
        .await
        .unwrap();

    let names: Vec<String> = lecture
        .assets
        .iter()
        .filter_map(|a| match a {
            Asset::Download { filename, kind, .. } => {
                assert_eq!(*kind, DownloadKind::File);
                Some(filename.clone())
            }
            Asset::ExternalLink { filename, .. } => Some(filename.clone()),
            Asset::Article { .. } => None,
        })
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|n| n.starts_with("005 ")), "{:?}", names);
}

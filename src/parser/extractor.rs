use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::common::client::UdemyClient;
use crate::common::utils::sanitize_filename;
use crate::config::DownloadConfig;
use crate::downloader::commands::ToolCommands;
use crate::downloader::process::ToolRunner;

use super::api_models::{RawAsset, RawCaption, RawLecture, RawMediaSource, RawVideoSource};
use super::dash::extract_dash;
use super::errors::ParseError;
use super::hls::extract_hls;
use super::models::{
    Asset, Caption, CaptionFormat, DownloadKind, Lecture, LectureEntry, LectureMedia, Source,
    SourceKind,
};

lazy_static! {
    static ref ASSET_ID: Regex = Regex::new(r"assets/(\d+)/").unwrap();
}

/// 课时媒体与附件提取
pub struct AssetExtractor<'a> {
    client: &'a UdemyClient,
    runner: &'a dyn ToolRunner,
    config: &'a DownloadConfig,
    temp_dir: PathBuf,
    cancel: CancellationToken,
}

impl<'a> AssetExtractor<'a> {
    pub fn new(
        client: &'a UdemyClient,
        runner: &'a dyn ToolRunner,
        config: &'a DownloadConfig,
        temp_dir: PathBuf,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            runner,
            config,
            temp_dir,
            cancel,
        }
    }

    pub async fn extract(&self, entry: &LectureEntry) -> Result<Lecture, ParseError> {
        let raw: RawLecture = serde_json::from_value(entry.raw.clone())?;
        let mut lecture = Lecture {
            id: entry.id,
            counter: entry.counter,
            object_index: entry.object_index,
            title: entry.title.clone(),
            asset_id: None,
            asset_type: None,
            assets: Vec::new(),
            media: LectureMedia::None,
        };

        let Some(asset) = raw.asset else {
            debug!("课时 {} 没有主资源", entry.id);
            return Ok(lecture);
        };

        lecture.asset_id = asset.id;
        lecture.asset_type = asset.asset_type.clone();
        lecture.assets.extend(self.extract_primary_asset(&asset, entry.counter));
        if let Some(supplementary) = &raw.supplementary_assets {
            lecture
                .assets
                .extend(extract_supplementary_assets(supplementary, entry.counter));
        }

        lecture.media = if let Some(stream_urls) = asset.stream_urls.as_ref() {
            if stream_urls.is_empty() {
                LectureMedia::Html { body: asset.body.clone() }
            } else {
                let sources = self.extract_sources(&asset, &asset.video_streams()).await?;
                if sources.is_empty() {
                    warn!("课时 {} 没有可用的清晰源", entry.id);
                    LectureMedia::None
                } else {
                    LectureMedia::Clear {
                        sources,
                        captions: extract_captions(asset.captions.as_deref()),
                    }
                }
            }
        } else {
            match asset.media_sources.as_deref() {
                Some(media_sources) if !media_sources.is_empty() => {
                    let sources = self.extract_media_sources(&asset, media_sources).await?;
                    if sources.is_empty() {
                        warn!("课时 {} 没有可用的 DASH 源", entry.id);
                        LectureMedia::None
                    } else {
                        LectureMedia::Encrypted {
                            sources,
                            captions: extract_captions(asset.captions.as_deref()),
                        }
                    }
                }
                _ => LectureMedia::Html { body: asset.body.clone() },
            }
        };

        Ok(lecture)
    }

    fn extract_primary_asset(&self, asset: &RawAsset, counter: u32) -> Vec<Asset> {
        let kind = match asset.kind().as_str() {
            "article" => {
                return vec![Asset::Article {
                    id: asset.id,
                    body: asset.body.clone().unwrap_or_default(),
                }];
            }
            "video" => return Vec::new(),
            "e-book" => (DownloadKind::Ebook, "E-Book"),
            "file" => (DownloadKind::File, "File"),
            "presentation" => (DownloadKind::Presentation, "Presentation"),
            "audio" => (DownloadKind::Audio, "Audio"),
            other => {
                warn!("未知的资源类型: {}", other);
                return Vec::new();
            }
        };
        download_asset(asset, kind.0, kind.1, counter).into_iter().collect()
    }

    async fn extract_sources(
        &self,
        asset: &RawAsset,
        streams: &[RawVideoSource],
    ) -> Result<Vec<Source>, ParseError> {
        let mut sources = Vec::new();
        for stream in streams {
            let Some(url) = stream.file.as_deref() else {
                continue;
            };
            let label = stream.label.clone().unwrap_or_default();
            if label.eq_ignore_ascii_case("audio") {
                continue;
            }
            let mime = stream.mime.clone().unwrap_or_default();

            if mime == "application/x-mpegURL" || url.contains("m3u8") {
                if self.config.skip_hls {
                    debug!("跳过 HLS 流: {}", url);
                    continue;
                }
                let asset_id = asset_id_of(asset, url);
                match extract_hls(self.client, url, asset_id, &self.temp_dir).await {
                    Ok(found) => sources.extend(found),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => error!("获取 HLS 流失败: {}", e),
                }
            } else {
                let height = label.parse::<u32>().unwrap_or_default();
                sources.push(Source {
                    kind: SourceKind::Progressive,
                    height,
                    width: width_for_height(height),
                    extension: mime.replace("video/", ""),
                    url: url.to_string(),
                    format_id: None,
                });
            }
        }
        Ok(sources)
    }

    async fn extract_media_sources(
        &self,
        asset: &RawAsset,
        media_sources: &[RawMediaSource],
    ) -> Result<Vec<Source>, ParseError> {
        let commands = ToolCommands::new(&self.config.tools, self.config.concurrency);
        let mut sources = Vec::new();
        for media in media_sources {
            if media.mime.as_deref() != Some("application/dash+xml") {
                continue;
            }
            let Some(src) = media.src.as_deref() else {
                continue;
            };
            let asset_id = asset_id_of(asset, src);
            match extract_dash(
                self.client,
                self.runner,
                &commands,
                src,
                asset_id,
                &self.temp_dir,
                &self.cancel,
            )
            .await
            {
                Ok(found) => sources.extend(found),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!("获取 DASH 流失败: {}", e),
            }
        }
        // 统一按高度升序，最后一个为最高清晰度
        sources.sort_by_key(|s| s.height);
        Ok(sources)
    }
}

fn asset_id_of(asset: &RawAsset, url: &str) -> u64 {
    ASSET_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .or(asset.id)
        .unwrap_or_default()
}

/// 常见高度对应的宽度
pub fn width_for_height(height: u32) -> u32 {
    match height {
        2160 => 3840,
        1440 => 2560,
        1080 => 1920,
        720 => 1280,
        480 => 854,
        360 => 640,
        240 => 426,
        _ => 256,
    }
}

fn prefixed(counter: u32, filename: &str) -> String {
    format!("{:03} {}", counter, filename)
}

fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default()
}

fn download_asset(asset: &RawAsset, kind: DownloadKind, key: &str, counter: u32) -> Option<Asset> {
    let filename = asset.filename.clone().unwrap_or_default();
    let url = asset.download_url(key)?;
    Some(Asset::Download {
        kind,
        id: asset.id,
        title: asset.title.as_deref().map(sanitize_filename),
        extension: extension_of(&filename),
        filename: prefixed(counter, &filename),
        url,
    })
}

pub fn extract_supplementary_assets(assets: &[RawAsset], counter: u32) -> Vec<Asset> {
    let mut out = Vec::new();
    for asset in assets {
        match asset.kind().as_str() {
            "file" => out.extend(download_asset(asset, DownloadKind::File, "File", counter)),
            "sourcecode" => out.extend(download_asset(
                asset,
                DownloadKind::SourceCode,
                "SourceCode",
                counter,
            )),
            "externallink" => {
                if let Some(url) = asset.external_url.clone() {
                    out.push(Asset::ExternalLink {
                        id: asset.id,
                        title: asset.title.as_deref().map(sanitize_filename),
                        filename: prefixed(counter, &asset.filename.clone().unwrap_or_default()),
                        url,
                    });
                }
            }
            other => debug!("忽略附件类型: {}", other),
        }
    }
    out
}

/// 字幕语言依次取 language / srclang / label / locale_id 前缀
pub fn extract_captions(tracks: Option<&[Value]>) -> Vec<Caption> {
    let Some(tracks) = tracks else {
        return Vec::new();
    };
    tracks
        .iter()
        .filter_map(|t| serde_json::from_value::<RawCaption>(t.clone()).ok())
        .filter(|t| t.class.as_deref() == Some("caption"))
        .filter_map(|t| {
            let url = t.url.clone().filter(|u| !u.is_empty())?;
            let language = t
                .language
                .clone()
                .filter(|s| !s.is_empty())
                .or_else(|| t.srclang.clone().filter(|s| !s.is_empty()))
                .or_else(|| t.label.clone().filter(|s| !s.is_empty()))
                .or_else(|| {
                    t.locale_id
                        .as_deref()
                        .and_then(|l| l.split('_').next())
                        .map(str::to_string)
                })?;
            let last = url.rsplit('.').next().unwrap_or_default();
            let format = if last.contains("vtt") {
                CaptionFormat::Vtt
            } else {
                CaptionFormat::Srt
            };
            Some(Caption { language, format, url })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn caption_language_fallbacks() {
        let tracks = vec![
            json!({"_class": "caption", "url": "https://x/en.vtt", "language": "en"}),
            json!({"_class": "caption", "url": "https://x/de.srt?x=1", "srclang": "de"}),
            json!({"_class": "caption", "url": "https://x/fr.vtt", "locale_id": "fr_FR"}),
            json!({"_class": "caption", "url": ""}),
            json!({"_class": "other", "url": "https://x/es.vtt", "language": "es"}),
            json!("not an object"),
        ];
        let captions = extract_captions(Some(tracks.as_slice()));
        assert_eq!(captions.len(), 3);
        assert_eq!(captions[0].language, "en");
        assert_eq!(captions[0].format, CaptionFormat::Vtt);
        assert_eq!(captions[1].language, "de");
        assert_eq!(captions[1].format, CaptionFormat::Srt);
        assert_eq!(captions[2].language, "fr");
    }

    #[test]
    fn supplementary_assets_are_prefixed() {
        let raw: Vec<RawAsset> = serde_json::from_value(json!([
            {"id": 1, "asset_type": "File", "filename": "slides.pdf",
             "download_urls": {"File": [{"file": "https://x/slides.pdf"}]}},
            {"id": 2, "asset_type": "SourceCode", "filename": "code.zip",
             "download_urls": {"SourceCode": [{"file": "https://x/code.zip"}]}},
            {"id": 3, "asset_type": "ExternalLink", "filename": "Docs", "title": "Docs",
             "external_url": "https://docs.rs"},
            {"id": 4, "asset_type": "File", "filename": "nourl.pdf"}
        ]))
        .unwrap();

        let assets = extract_supplementary_assets(&raw, 7);
        assert_eq!(assets.len(), 3);
        match &assets[0] {
            Asset::Download { kind, filename, extension, .. } => {
                assert_eq!(*kind, DownloadKind::File);
                assert_eq!(filename, "007 slides.pdf");
                assert_eq!(extension, "pdf");
            }
            other => panic!("unexpected asset {:?}", other),
        }
        assert!(matches!(&assets[1], Asset::Download { kind: DownloadKind::SourceCode, .. }));
        assert!(matches!(&assets[2], Asset::ExternalLink { filename, .. } if filename == "007 Docs"));
    }

    #[test]
    fn widths_follow_height_table() {
        assert_eq!(width_for_height(1080), 1920);
        assert_eq!(width_for_height(144), 256);
    }
}

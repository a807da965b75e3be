use std::collections::HashSet;
use std::path::Path;

use m3u8_rs::Playlist;
use reqwest::Url;
use tracing::{debug, error, warn};

use crate::common::client::UdemyClient;

use super::errors::ParseError;
use super::models::{Source, SourceKind};

/// 下载 HLS 主播放列表，把每个清晰度的子列表保存到临时目录
///
/// 同一高度只保留第一个出现的子列表；子列表以 file:// 地址返回，后续下载阶段直接读取本地文件。
pub async fn extract_hls(
    client: &UdemyClient,
    url: &str,
    asset_id: u64,
    temp_dir: &Path,
) -> Result<Vec<Source>, ParseError> {
    tokio::fs::create_dir_all(temp_dir).await?;

    let master_text = client.get_text(url, None).await?;
    tokio::fs::write(temp_dir.join(format!("index_{}.m3u8", asset_id)), &master_text).await?;

    let master = match m3u8_rs::parse_playlist_res(master_text.as_bytes()) {
        Ok(Playlist::MasterPlaylist(pl)) => pl,
        Ok(Playlist::MediaPlaylist(_)) => {
            return Err(ParseError::Manifest(format!("期望主播放列表: {}", url)));
        }
        Err(e) => return Err(ParseError::Manifest(format!("{}: {}", url, e))),
    };
    let base = Url::parse(url).map_err(|e| ParseError::InvalidUrl(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for variant in master.variants.iter().filter(|v| !v.is_i_frame) {
        let Some(resolution) = variant.resolution else {
            continue;
        };
        if variant.codecs.is_none() {
            continue;
        }
        let (width, height) = (resolution.width as u32, resolution.height as u32);
        if !seen.insert(height) {
            debug!("跳过重复的清晰度: {}x{}", width, height);
            continue;
        }

        let variant_url = match base.join(&variant.uri) {
            Ok(u) => u,
            Err(e) => {
                warn!("无效的子列表地址 {}: {}", variant.uri, e);
                continue;
            }
        };
        let text = client.get_text(variant_url.as_str(), None).await?;
        let path = temp_dir.join(format!("index_{}_{}x{}.m3u8", asset_id, width, height));
        tokio::fs::write(&path, absolutize_media_playlist(&text, &variant_url)).await?;

        let local = Url::from_file_path(&path)
            .map_err(|_| ParseError::ParseError(format!("无法转换为 file URL: {:?}", path)))?;
        sources.push(Source {
            kind: SourceKind::Hls,
            height,
            width,
            extension: "mp4".to_string(),
            url: local.to_string(),
            format_id: None,
        });
    }

    if sources.is_empty() {
        error!("HLS 播放列表中没有可用的清晰度: {}", url);
    }
    Ok(sources)
}

/// 本地保存的子列表中，分片的相对地址需要改写为绝对地址
fn absolutize_media_playlist(text: &str, base: &Url) -> String {
    text.lines()
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || Url::parse(trimmed).is_ok() {
                line.to_string()
            } else {
                base.join(trimmed)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| line.to_string())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

use std::collections::BTreeMap;
use std::path::Path;

use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::common::client::UdemyClient;
use crate::downloader::commands::ToolCommands;
use crate::downloader::process::{ProcessOutcome, ToolRunner};

use super::api_models::{ProbeFormat, ProbeInfo};
use super::errors::ParseError;
use super::models::{Source, SourceKind};

/// 下载 DASH 清单到临时目录，并用 yt-dlp 探测可用的格式
pub async fn extract_dash(
    client: &UdemyClient,
    runner: &dyn ToolRunner,
    commands: &ToolCommands<'_>,
    url: &str,
    asset_id: u64,
    temp_dir: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<Source>, ParseError> {
    tokio::fs::create_dir_all(temp_dir).await?;

    let mpd = client.get_bytes(url).await?;
    let mpd_path = temp_dir.join(format!("index_{}.mpd", asset_id));
    tokio::fs::write(&mpd_path, &mpd).await?;
    let local = Url::from_file_path(&mpd_path)
        .map_err(|_| ParseError::ParseError(format!("无法转换为 file URL: {:?}", mpd_path)))?
        .to_string();

    let stdout = match runner.run(&commands.probe(&local), cancel).await {
        ProcessOutcome::Success { stdout } => stdout,
        ProcessOutcome::ToolMissing(tool) => return Err(ParseError::ToolMissing(tool.to_string())),
        other => {
            error!("探测 DASH 格式失败: {:?}", other);
            return Err(ParseError::Manifest(format!("无法探测 {}", url)));
        }
    };

    let info: ProbeInfo = serde_json::from_str(stdout.trim())?;
    Ok(sources_from_probe(&info, &local))
}

/// 每个视频高度一个候选，格式 id 为 "<视频>,<最佳音频>"，按高度升序
pub fn sources_from_probe(info: &ProbeInfo, url: &str) -> Vec<Source> {
    let best_audio = info
        .formats
        .iter()
        .filter(|f| f.has_audio() && !f.has_video())
        .max_by(|a, b| a.tbr.unwrap_or(0.0).total_cmp(&b.tbr.unwrap_or(0.0)));

    // 同一高度保留码率最高的视频轨
    let mut by_height: BTreeMap<u32, &ProbeFormat> = BTreeMap::new();
    for format in info.formats.iter().filter(|f| f.has_video()) {
        let Some(height) = format.height else {
            continue;
        };
        let replace = by_height
            .get(&height)
            .is_none_or(|cur| format.tbr.unwrap_or(0.0) >= cur.tbr.unwrap_or(0.0));
        if replace {
            by_height.insert(height, format);
        }
    }

    let mut sources: Vec<Source> = by_height
        .into_iter()
        .map(|(height, video)| Source {
            kind: SourceKind::Dash,
            height,
            width: video.width.unwrap_or_default(),
            extension: video.ext.clone().unwrap_or_else(|| "mp4".to_string()),
            url: url.to_string(),
            format_id: Some(match best_audio {
                Some(audio) => format!("{},{}", video.format_id, audio.format_id),
                None => video.format_id.clone(),
            }),
        })
        .collect();

    // 没有格式列表时退回到 yt-dlp 选出的默认组合
    if sources.is_empty() {
        if let Some(format_id) = &info.format_id {
            sources.push(Source {
                kind: SourceKind::Dash,
                height: info.height.unwrap_or_default(),
                width: info.width.unwrap_or_default(),
                extension: info.ext.clone().unwrap_or_else(|| "mp4".to_string()),
                url: url.to_string(),
                format_id: Some(format_id.replace('+', ",")),
            });
        }
    }

    debug!("DASH 可用清晰度: {}", sources.len());
    sources
}

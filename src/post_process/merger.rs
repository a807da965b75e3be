use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::common::constants::ID_TO_TITLE_FILE;
use crate::config::H265Options;
use crate::downloader::commands::ToolCommands;
use crate::downloader::error::DownloadError;
use crate::downloader::process::{ProcessOutcome, ToolRunner};
use crate::parser::models::lecture_file_stem;

use super::PhaseReport;
use super::decrypt::discard_partial;

lazy_static! {
    static ref CAPTION_LANG: Regex = Regex::new(r"(_[a-z]{2,3}(?:_[A-Z]{2,3})?)\.srt$").unwrap();
}

/// 在目录树中查找并读取 id -> 标题映射，找不到时返回空表
pub async fn load_id_to_title(root: &Path) -> BTreeMap<String, String> {
    let map_file = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .find(|e| e.file_type().is_file() && e.file_name() == ID_TO_TITLE_FILE);
    let Some(entry) = map_file else {
        debug!("未找到 {}", ID_TO_TITLE_FILE);
        return BTreeMap::new();
    };

    match tokio::fs::read_to_string(entry.path()).await {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(map) => {
                info!("已加载标题映射: {:?}", entry.path());
                map
            }
            Err(e) => {
                error!("标题映射格式错误: {}", e);
                BTreeMap::new()
            }
        },
        Err(e) => {
            error!("读取标题映射失败: {}", e);
            BTreeMap::new()
        }
    }
}

/// 一组待合并的解密音视频
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinePair {
    pub file_id: String,
    pub video: PathBuf,
    pub audio: PathBuf,
}

impl CombinePair {
    pub fn dir(&self) -> &Path {
        self.video.parent().unwrap_or(Path::new("."))
    }
}

/// 查找已解密、且存在同名 .m4a 的 .mp4
pub fn find_pairs(root: &Path) -> Vec<CombinePair> {
    let mut pairs: Vec<CombinePair> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            if !name.ends_with(".mp4") || name.contains(".encrypted") {
                return None;
            }
            let file_id = name.trim_end_matches(".mp4").to_string();
            let audio = e.path().with_file_name(format!("{}.m4a", file_id));
            if !audio.is_file() {
                debug!("缺少音频，跳过合并: {}", name);
                return None;
            }
            Some(CombinePair {
                file_id,
                video: e.into_path(),
                audio,
            })
        })
        .collect();
    pairs.sort_by(|a, b| a.video.cmp(&b.video));
    pairs
}

/// 合并输出的文件名（不含扩展名）；没有标题时用 id 加前缀，避免与输入同名
pub fn final_base_name(file_id: &str, titles: &BTreeMap<String, String>) -> String {
    match titles.get(file_id) {
        Some(title) => lecture_file_stem(title),
        None => {
            warn!("没有找到 id {} 对应的标题，使用 id 命名", file_id);
            format!("lecture_{}", file_id)
        }
    }
}

pub struct MediaMerger<'a> {
    runner: &'a dyn ToolRunner,
    commands: &'a ToolCommands<'a>,
    h265: &'a H265Options,
    cancel: &'a CancellationToken,
}

impl<'a> MediaMerger<'a> {
    pub fn new(
        runner: &'a dyn ToolRunner,
        commands: &'a ToolCommands<'a>,
        h265: &'a H265Options,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            runner,
            commands,
            h265,
            cancel,
        }
    }

    pub async fn combine_tree(&self, root: &Path) -> Result<PhaseReport, DownloadError> {
        info!("开始合并音视频: {:?}", root);
        let titles = load_id_to_title(root).await;
        let mut report = PhaseReport::default();

        for pair in find_pairs(root) {
            if self.cancel.is_cancelled() {
                info!("合并阶段被取消");
                return Err(DownloadError::Cancelled);
            }

            let base = final_base_name(&pair.file_id, &titles);
            let output = pair.dir().join(format!("{}.mp4", base));
            if output.exists() {
                info!("已合并，跳过: {}", base);
                report.skipped += 1;
                continue;
            }

            info!("合并并校正时间戳: {}", pair.file_id);
            let invocation = self.commands.combine(&pair.video, &pair.audio, &output, self.h265);
            match self.runner.run(&invocation, self.cancel).await {
                ProcessOutcome::Success { .. } => {
                    self.finish_pair(&pair, &base).await;
                    crate::log_success!("合并完成: {}.mp4", base);
                    report.processed += 1;
                }
                ProcessOutcome::ToolMissing(tool) => return Err(DownloadError::ToolMissing(tool)),
                ProcessOutcome::Cancelled => {
                    discard_partial(&output).await;
                    return Err(DownloadError::Cancelled);
                }
                failure => {
                    error!("合并失败，保留中间文件 {}: {:?}", pair.file_id, failure);
                    discard_partial(&output).await;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// 删除中间文件并重命名字幕
    async fn finish_pair(&self, pair: &CombinePair, base: &str) {
        let dir = pair.dir();
        let leftovers = [
            pair.video.clone(),
            pair.audio.clone(),
            dir.join(format!("{}.encrypted.mp4", pair.file_id)),
            dir.join(format!("{}.encrypted.m4a", pair.file_id)),
        ];
        for path in leftovers.iter().filter(|p| p.exists()) {
            if let Err(e) = tokio::fs::remove_file(path).await {
                error!("删除中间文件失败 {:?}: {}", path, e);
            }
        }

        if let Err(e) = rename_captions(dir, &pair.file_id, base).await {
            error!("重命名字幕失败: {}", e);
        }
    }
}

/// 把 <id>_<lang>.srt 重命名为 <base>_<lang>.srt
pub async fn rename_captions(dir: &Path, file_id: &str, base: &str) -> Result<usize, DownloadError> {
    let prefix = format!("{}_", file_id);
    let mut renamed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with(&prefix) {
            continue;
        }
        let Some(lang) = CAPTION_LANG.captures(&name).and_then(|c| c.get(1)) else {
            continue;
        };
        let target = dir.join(format!("{}{}.srt", base, lang.as_str()));
        debug!("重命名字幕: {} -> {:?}", name, target.file_name().unwrap_or_default());
        tokio::fs::rename(entry.path(), &target).await?;
        renamed += 1;
    }
    Ok(renamed)
}

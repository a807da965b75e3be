use std::path::{Path, PathBuf};

use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DownloadConfig;
use crate::parser::models::{Lecture, LectureMedia, Source, SourceKind};
use crate::parser::stream_selector::StreamSelector;

use super::commands::ToolCommands;
use super::error::DownloadError;
use super::process::{ProcessOutcome, ToolRunner, is_non_empty_file};

/// 单个课时的下载结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(PathBuf),
    /// 目标文件或中间文件已存在
    AlreadyPresent(PathBuf),
    NoSource,
}

/// 加密课时的中间文件名
pub fn encrypted_name(lecture_id: u64, ext: &str) -> String {
    format!("{}.encrypted.{}", lecture_id, ext)
}

/// 某条轨的加密文件或解密文件是否已存在且非空
async fn track_present(chapter_dir: &Path, lecture_id: u64, ext: &str) -> bool {
    is_non_empty_file(&chapter_dir.join(encrypted_name(lecture_id, ext))).await
        || is_non_empty_file(&chapter_dir.join(format!("{}.{}", lecture_id, ext))).await
}

pub struct MediaFetcher<'a> {
    runner: &'a dyn ToolRunner,
    commands: &'a ToolCommands<'a>,
    config: &'a DownloadConfig,
    cancel: &'a CancellationToken,
}

impl<'a> MediaFetcher<'a> {
    pub fn new(
        runner: &'a dyn ToolRunner,
        commands: &'a ToolCommands<'a>,
        config: &'a DownloadConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            runner,
            commands,
            config,
            cancel,
        }
    }

    pub async fn fetch(&self, lecture: &Lecture, chapter_dir: &Path) -> Result<FetchOutcome, DownloadError> {
        let Some(source) = StreamSelector::select(lecture.sources(), self.config.quality) else {
            warn!("课时 {} 没有可用的媒体地址", lecture.title);
            return Ok(FetchOutcome::NoSource);
        };
        info!("选择清晰度: {}", source.quality_label());

        match &lecture.media {
            LectureMedia::Encrypted { .. } => self.fetch_encrypted(lecture, source, chapter_dir).await,
            _ => self.fetch_clear(lecture, source, chapter_dir).await,
        }
    }

    async fn fetch_clear(&self, lecture: &Lecture, source: &Source, chapter_dir: &Path) -> Result<FetchOutcome, DownloadError> {
        let final_path = chapter_dir.join(format!("{}.mp4", lecture.file_stem()));
        if final_path.exists() {
            info!("课时已下载，跳过: {}", lecture.title);
            return Ok(FetchOutcome::AlreadyPresent(final_path));
        }

        let invocation = match source.kind {
            SourceKind::Progressive => {
                let filename = final_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                self.commands.aria2c_file(&source.url, chapter_dir, &filename)
            }
            _ => self.commands.fetch_clear(&source.url, &final_path),
        };
        info!("课时没有 DRM，开始下载...");
        self.runner
            .run(&invocation, self.cancel)
            .await
            .into_result(invocation.tool)?;
        crate::log_success!("下载完成: {}", lecture.title);

        if self.config.h265.enabled && source.kind == SourceKind::Hls {
            self.transcode_in_place(&final_path).await?;
        }
        Ok(FetchOutcome::Fetched(final_path))
    }

    /// 先转码到 .tmp，成功后替换原文件；失败时保留原文件
    async fn transcode_in_place(&self, path: &Path) -> Result<(), DownloadError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        info!("转码为 H.265: {:?}", path.file_name().unwrap_or_default());
        let invocation = self.commands.transcode(path, &tmp, &self.config.h265);
        match self.runner.run(&invocation, self.cancel).await {
            ProcessOutcome::Success { .. } => {
                tokio::fs::remove_file(path).await?;
                tokio::fs::rename(&tmp, path).await?;
                info!("转码完成");
                Ok(())
            }
            ProcessOutcome::Cancelled => Err(DownloadError::Cancelled),
            ProcessOutcome::ToolMissing(tool) => Err(DownloadError::ToolMissing(tool)),
            other => {
                error!("转码失败，保留原文件: {:?}", other);
                let _ = tokio::fs::remove_file(&tmp).await;
                Ok(())
            }
        }
    }

    async fn fetch_encrypted(&self, lecture: &Lecture, source: &Source, chapter_dir: &Path) -> Result<FetchOutcome, DownloadError> {
        let final_path = chapter_dir.join(format!("{}.mp4", lecture.file_stem()));
        if is_non_empty_file(&final_path).await {
            info!("课时已下载，跳过: {}", lecture.title);
            return Ok(FetchOutcome::AlreadyPresent(final_path));
        }
        // 音视频两条轨都有加密或已解密的文件时才跳过，只有一条时重新下载
        if track_present(chapter_dir, lecture.id, "mp4").await
            && track_present(chapter_dir, lecture.id, "m4a").await
        {
            info!("课时已有中间文件，跳过下载: {}", lecture.id);
            return Ok(FetchOutcome::AlreadyPresent(chapter_dir.join(encrypted_name(lecture.id, "mp4"))));
        }

        let Some(format_id) = source.format_id.as_deref() else {
            error!("DASH 源缺少格式 id: {}", lecture.title);
            return Ok(FetchOutcome::NoSource);
        };

        info!("课时有 DRM，下载加密音视频轨...");
        let invocation = self
            .commands
            .fetch_dash(&source.url, format_id, lecture.id, chapter_dir);
        self.runner
            .run(&invocation, self.cancel)
            .await
            .into_result(invocation.tool)?;

        let video = chapter_dir.join(encrypted_name(lecture.id, "mp4"));
        if !is_non_empty_file(&video).await {
            return Err(DownloadError::OutputMissing {
                tool: invocation.tool,
                path: video,
            });
        }
        crate::log_success!("加密音视频轨下载完成: {}", lecture.id);

        // 本地清单已用完
        if let Some(local) = Url::parse(&source.url)
            .ok()
            .filter(|u| u.scheme() == "file")
            .and_then(|u| u.to_file_path().ok())
        {
            if let Err(e) = tokio::fs::remove_file(&local).await {
                debug!("删除本地清单失败 {:?}: {}", local, e);
            }
        }
        Ok(FetchOutcome::Fetched(video))
    }
}

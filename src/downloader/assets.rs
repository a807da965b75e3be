use std::path::Path;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::constants::EXTERNAL_LINKS_FILE;
use crate::parser::models::{Asset, Lecture, LectureEntry, lecture_file_stem};
use crate::parser::quiz::{QuizFetcher, render_article_page, render_quiz_page};

use super::commands::ToolCommands;
use super::error::DownloadError;
use super::process::ToolRunner;

/// 附件、外链、文章和测验页面
pub struct SupplementDownloader<'a> {
    runner: &'a dyn ToolRunner,
    commands: &'a ToolCommands<'a>,
    cancel: &'a CancellationToken,
}

impl<'a> SupplementDownloader<'a> {
    pub fn new(runner: &'a dyn ToolRunner, commands: &'a ToolCommands<'a>, cancel: &'a CancellationToken) -> Self {
        Self {
            runner,
            commands,
            cancel,
        }
    }

    /// 返回成功保存的附件数；单个附件失败只记录日志
    pub async fn save_assets(&self, lecture: &Lecture, chapter_dir: &Path) -> Result<usize, DownloadError> {
        if lecture.assets.is_empty() {
            return Ok(0);
        }
        info!("处理 {} 个附件...", lecture.assets.len());

        let mut saved = 0;
        for asset in &lecture.assets {
            let result = match asset {
                Asset::Article { body, .. } => {
                    let path = chapter_dir.join(format!("{}.html", lecture_file_stem(&lecture.title)));
                    tokio::fs::write(&path, render_article_page(&lecture.title, body))
                        .await
                        .map_err(DownloadError::from)
                }
                Asset::Download { filename, url, .. } => self.download_file(url, chapter_dir, filename).await,
                Asset::ExternalLink { filename, url, .. } => write_external_link(chapter_dir, filename, url).await,
            };
            match result {
                Ok(()) => saved += 1,
                Err(e) if e.is_fatal() || matches!(e, DownloadError::Cancelled) => return Err(e),
                Err(e) => error!("附件处理失败: {}", e),
            }
        }
        Ok(saved)
    }

    async fn download_file(&self, url: &str, dir: &Path, filename: &str) -> Result<(), DownloadError> {
        if dir.join(filename).is_file() {
            debug!("附件已存在: {}", filename);
            return Ok(());
        }
        let invocation = self.commands.aria2c_file(url, dir, filename);
        self.runner
            .run(&invocation, self.cancel)
            .await
            .into_result(invocation.tool)?;
        debug!("附件下载完成: {}", filename);
        Ok(())
    }

    /// 写入无媒体课时的 HTML 正文，空正文不生成文件
    pub async fn save_html_lecture(&self, lecture: &Lecture, chapter_dir: &Path) -> Result<bool, DownloadError> {
        let Some(body) = lecture.html_body().filter(|b| !b.is_empty()) else {
            debug!("课时 {} 没有正文", lecture.title);
            return Ok(false);
        };
        let path = chapter_dir.join(format!("{}.html", lecture.file_stem()));
        if path.is_file() {
            info!("课时已下载，跳过: {}", lecture.title);
            return Ok(false);
        }
        tokio::fs::write(&path, body).await?;
        Ok(true)
    }

    pub async fn save_quiz(
        &self,
        fetcher: &QuizFetcher<'_>,
        entry: &LectureEntry,
        chapter_dir: &Path,
    ) -> Result<bool, DownloadError> {
        let path = chapter_dir.join(format!("{}.html", lecture_file_stem(&entry.title)));
        if path.is_file() {
            info!("测验已保存，跳过: {}", entry.title);
            return Ok(false);
        }

        let content = fetcher.fetch(entry.id).await?;
        if content.is_coding() {
            info!("处理测验 {} (编程练习)", entry.counter);
        } else {
            info!("处理测验 {}", entry.counter);
        }
        tokio::fs::write(&path, render_quiz_page(entry, &content)?).await?;
        Ok(true)
    }
}

/// 写 .url 快捷方式，并把链接追加到章节目录的汇总文件（按名称去重）
pub async fn write_external_link(dir: &Path, filename: &str, url: &str) -> Result<(), DownloadError> {
    let shortcut = dir.join(format!("{}.url", filename));
    tokio::fs::write(&shortcut, format!("[InternetShortcut]\nURL={}", url)).await?;

    let summary = dir.join(EXTERNAL_LINKS_FILE);
    let existing = match tokio::fs::read(&summary).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let name = filename.to_lowercase();
    if existing.lines().any(|l| l.trim().to_lowercase() == name) {
        warn!("外链已记录: {}", filename);
        return Ok(());
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&summary)
        .await?;
    file.write_all(format!("\n{}\n{}\n", filename, url).as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

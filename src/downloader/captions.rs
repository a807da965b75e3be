use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DownloadConfig;
use crate::parser::models::{Caption, CaptionFormat};

use super::commands::ToolCommands;
use super::error::DownloadError;
use super::process::{ProcessOutcome, ToolRunner};

// 每个字幕最多尝试的次数（含第一次）
const MAX_CAPTION_ATTEMPTS: u32 = 3;

lazy_static! {
    static ref TAG: Regex = Regex::new(r"</?[^>]+>").unwrap();
    static ref TIMESTAMP: Regex =
        Regex::new(r"^(?:(\d+):)?(\d{1,2}):(\d{2})[.,](\d{1,3})$").unwrap();
}

/// 字幕文件名（不含扩展名）: <base>_<lang>
pub fn caption_stem(base: &str, language: &str) -> String {
    format!("{}_{}", base, language)
}

/// 下载单个课时的字幕，返回成功的数量
pub struct CaptionDownloader<'a> {
    runner: &'a dyn ToolRunner,
    commands: &'a ToolCommands<'a>,
    config: &'a DownloadConfig,
    cancel: &'a CancellationToken,
}

impl<'a> CaptionDownloader<'a> {
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

    pub async fn download_all(
        &self,
        captions: &[Caption],
        base: &str,
        chapter_dir: &Path,
    ) -> Result<usize, DownloadError> {
        let wanted: Vec<&Caption> = captions
            .iter()
            .filter(|c| self.config.wants_caption(&c.language))
            .collect();
        if wanted.is_empty() {
            debug!("没有符合语言 {} 的字幕", self.config.caption_lang);
            return Ok(0);
        }
        info!("处理 {} 个字幕...", wanted.len());

        let mut done = 0;
        for caption in wanted {
            match self.download_one(caption, base, chapter_dir).await {
                Ok(()) => done += 1,
                Err(e) if e.is_fatal() || matches!(e, DownloadError::Cancelled) => return Err(e),
                Err(e) => error!("字幕 {} 下载失败: {}", caption.language, e),
            }
        }
        Ok(done)
    }

    async fn download_one(&self, caption: &Caption, base: &str, chapter_dir: &Path) -> Result<(), DownloadError> {
        let stem = caption_stem(base, &caption.language);
        let filename = format!("{}.{}", stem, caption.format.extension());
        let path = chapter_dir.join(&filename);
        let srt_path = chapter_dir.join(format!("{}.srt", stem));

        if path.is_file() || srt_path.is_file() {
            info!("字幕已存在，跳过: {}", filename);
            return Ok(());
        }

        info!("下载字幕: {}", filename);
        let mut attempt = 1;
        loop {
            let invocation = self.commands.aria2c_file(&caption.url, chapter_dir, &filename);
            match self.runner.run(&invocation, self.cancel).await {
                ProcessOutcome::Success { .. } => break,
                ProcessOutcome::NonZeroExit { stderr_tail, .. }
                    if stderr_tail.contains("status=403") || stderr_tail.contains("Forbidden") =>
                {
                    error!("字幕访问被拒绝 (403)，不再重试: {}", filename);
                    return Err(DownloadError::ToolFailed {
                        tool: invocation.tool,
                        code: None,
                        stderr: stderr_tail,
                    });
                }
                outcome @ (ProcessOutcome::NonZeroExit { .. } | ProcessOutcome::OutputMissing(_)) => {
                    if attempt >= MAX_CAPTION_ATTEMPTS {
                        error!("字幕下载 {} 次均失败: {}", attempt, filename);
                        return outcome.into_result(invocation.tool).map(|_| ());
                    }
                    attempt += 1;
                    warn!("字幕下载失败，重试 ({}/{})", attempt, MAX_CAPTION_ATTEMPTS);
                }
                other => return other.into_result(invocation.tool).map(|_| ()),
            }
        }

        if caption.format == CaptionFormat::Vtt {
            info!("转换字幕为 SRT 格式...");
            convert_vtt_file(&path).await?;
            if !self.config.keep_vtt {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

/// 把 VTT 文件转换为同名的 SRT 文件
pub async fn convert_vtt_file(vtt: &Path) -> Result<PathBuf, DownloadError> {
    let text = tokio::fs::read_to_string(vtt).await?;
    let srt = vtt.with_extension("srt");
    tokio::fs::write(&srt, vtt_to_srt(&text)).await?;
    debug!("字幕转换完成: {:?}", srt);
    Ok(srt)
}

fn srt_timestamp(raw: &str) -> Option<String> {
    let caps = TIMESTAMP.captures(raw.trim())?;
    let hours: u32 = caps.get(1).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let minutes: u32 = caps[2].parse().ok()?;
    let seconds: u32 = caps[3].parse().ok()?;
    let millis = format!("{:0<3}", &caps[4]);
    Some(format!("{:02}:{:02}:{:02},{}", hours, minutes, seconds, millis))
}

/// WebVTT -> SRT: 重新编号、毫秒分隔符改为逗号、去掉样式标签和 cue 设置
pub fn vtt_to_srt(vtt: &str) -> String {
    let normalized = vtt.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::new();
    let mut index = 0;

    for block in normalized.split("\n\n") {
        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        let Some(timing_pos) = lines.iter().position(|l| l.contains("-->")) else {
            // WEBVTT 头、NOTE、STYLE 等块
            continue;
        };

        let mut parts = lines[timing_pos].split("-->");
        let start = parts.next().and_then(srt_timestamp);
        let end = parts
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(srt_timestamp);
        let (Some(start), Some(end)) = (start, end) else {
            continue;
        };

        index += 1;
        out.push_str(&format!("{}\n{} --> {}\n", index, start, end));
        for line in &lines[timing_pos + 1..] {
            out.push_str(&TAG.replace_all(line, ""));
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

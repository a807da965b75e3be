use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::common::client::Credentials;
use crate::common::utils::find_executable;
use crate::downloader::process::Tool;

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const MAX_CONCURRENCY: usize = 30;

/// 外部程序路径，启动时解析一次
#[derive(Debug, Clone, Default)]
pub struct ToolPaths {
    pub ffmpeg: Option<PathBuf>,
    pub yt_dlp: Option<PathBuf>,
    pub aria2c: Option<PathBuf>,
}

impl ToolPaths {
    /// 优先使用用户指定的路径，其次是项目 bin 目录和 PATH
    pub fn resolve(
        ffmpeg: Option<PathBuf>,
        yt_dlp: Option<PathBuf>,
        aria2c: Option<PathBuf>,
    ) -> Self {
        let pick = |tool: Tool, custom: Option<PathBuf>| match custom {
            Some(path) => Some(path),
            None => {
                let found = find_executable(tool.binary_name());
                debug!("{} -> {:?}", tool, found);
                found
            }
        };
        Self {
            ffmpeg: pick(Tool::Ffmpeg, ffmpeg),
            yt_dlp: pick(Tool::YtDlp, yt_dlp),
            aria2c: pick(Tool::Aria2c, aria2c),
        }
    }

    pub fn get(&self, tool: Tool) -> Option<&Path> {
        match tool {
            Tool::Ffmpeg => self.ffmpeg.as_deref(),
            Tool::YtDlp => self.yt_dlp.as_deref(),
            Tool::Aria2c => self.aria2c.as_deref(),
        }
    }

    /// 启动前检查，缺失只警告，真正用到时才报错
    pub fn preflight(&self, skip_lectures: bool) -> Vec<Tool> {
        let mut missing = Vec::new();
        if self.aria2c.is_none() {
            warn!("未找到 aria2c，附件和字幕下载将无法进行: https://github.com/aria2/aria2/");
            missing.push(Tool::Aria2c);
        }
        if !skip_lectures {
            if self.ffmpeg.is_none() {
                warn!("未找到 ffmpeg，解密与合并将无法进行: https://www.ffmpeg.org/");
                missing.push(Tool::Ffmpeg);
            }
            if self.yt_dlp.is_none() {
                warn!("未找到 yt-dlp，视频下载将无法进行: https://github.com/yt-dlp/yt-dlp");
                missing.push(Tool::YtDlp);
            }
        }
        missing
    }
}

#[derive(Debug, Clone)]
pub struct H265Options {
    pub enabled: bool,
    pub crf: u32,
    pub preset: String,
    pub nvenc: bool,
}

impl Default for H265Options {
    fn default() -> Self {
        Self {
            enabled: false,
            crf: 28,
            preset: "medium".to_string(),
            nvenc: false,
        }
    }
}

impl H265Options {
    pub fn codec(&self) -> &'static str {
        if self.nvenc { "hevc_nvenc" } else { "libx265" }
    }
}

/// 一次运行的全部配置，构建后不再修改
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub course_url: String,
    pub credentials: Credentials,
    pub quality: Option<u32>,
    pub caption_lang: String,
    pub concurrency: usize,
    pub skip_lectures: bool,
    pub download_assets: bool,
    pub download_captions: bool,
    pub download_quizzes: bool,
    pub keep_vtt: bool,
    pub skip_hls: bool,
    pub info: bool,
    pub id_as_course_name: bool,
    pub subscription_course: bool,
    pub save_to_file: bool,
    pub load_from_file: bool,
    pub continuous_numbering: bool,
    pub h265: H265Options,
    pub output_dir: PathBuf,
    pub chapter_filter: Option<BTreeSet<u32>>,
    pub lecture_filter: Option<BTreeSet<u32>>,
    pub decryption_key: Option<String>,
    pub tools: ToolPaths,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            course_url: String::new(),
            credentials: Credentials::default(),
            quality: None,
            caption_lang: "en".to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            skip_lectures: false,
            download_assets: false,
            download_captions: false,
            download_quizzes: false,
            keep_vtt: false,
            skip_hls: false,
            info: false,
            id_as_course_name: false,
            subscription_course: false,
            save_to_file: false,
            load_from_file: false,
            continuous_numbering: false,
            h265: H265Options::default(),
            output_dir: PathBuf::from("out_dir"),
            chapter_filter: None,
            lecture_filter: None,
            decryption_key: None,
            tools: ToolPaths::default(),
        }
    }
}

impl DownloadConfig {
    pub fn wants_chapter(&self, index: u32) -> bool {
        self.chapter_filter.as_ref().is_none_or(|f| f.contains(&index))
    }

    pub fn wants_lecture(&self, index: u32) -> bool {
        self.lecture_filter.as_ref().is_none_or(|f| f.contains(&index))
    }

    pub fn wants_caption(&self, language: &str) -> bool {
        self.caption_lang == "all" || self.caption_lang == language
    }

    pub fn saved_dir(&self) -> PathBuf {
        self.output_dir.join(crate::common::constants::SAVED_DIR_NAME)
    }
}

/// 并发数限制在安全范围内
pub fn clamp_concurrency(requested: i64) -> usize {
    if requested <= 0 {
        warn!("并发数 {} 无效，使用默认值 {}", requested, DEFAULT_CONCURRENCY);
        DEFAULT_CONCURRENCY
    } else if requested as usize > MAX_CONCURRENCY {
        warn!("并发数 {} 过大，限制为 {}", requested, MAX_CONCURRENCY);
        MAX_CONCURRENCY
    } else {
        requested as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_is_clamped() {
        assert_eq!(clamp_concurrency(0), 10);
        assert_eq!(clamp_concurrency(-3), 10);
        assert_eq!(clamp_concurrency(16), 16);
        assert_eq!(clamp_concurrency(64), 30);
    }

    #[test]
    fn filters_default_to_everything() {
        let mut config = DownloadConfig::default();
        assert!(config.wants_chapter(7));
        assert!(config.wants_lecture(7));

        config.chapter_filter = Some([1, 3, 4].into_iter().collect());
        assert!(config.wants_chapter(3));
        assert!(!config.wants_chapter(2));
    }

    #[test]
    fn caption_language_filter() {
        let mut config = DownloadConfig::default();
        assert!(config.wants_caption("en"));
        assert!(!config.wants_caption("de"));
        config.caption_lang = "all".into();
        assert!(config.wants_caption("de"));
    }
}

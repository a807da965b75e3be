use clap::Parser;
use std::path::PathBuf;
use tracing::Level;

use crate::common::client::Credentials;
use crate::config::{DownloadConfig, H265Options, ToolPaths, clamp_concurrency};
use crate::parser::errors::ParseError;
use crate::parser::range::parse_index_range;

/// Udemy课程下载器
#[derive(Parser, Debug)]
#[command(name = "udemydl")]
#[command(version = "0.1.0")]
#[command(author = "rpeng252@gmail.com")]
#[command(about = "下载已购买的Udemy课程，支持DRM解密与音视频合并", long_about = None)]
pub struct Cli {
    /// 课程链接
    #[arg(short = 'c', long, value_name = "URL")]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub course_url: String,

    /// Bearer Token
    #[arg(short = 'b', long = "bearer", value_name = "TOKEN", env = "UDEMY_BEARER")]
    pub bearer_token: Option<String>,

    /// Cookie字符串
    #[arg(long, value_name = "COOKIE")]
    #[arg(help = "从浏览器复制的 Cookie 请求头")]
    pub cookie: Option<String>,

    /// 视频质量
    #[arg(short = 'q', long, value_name = "HEIGHT")]
    #[arg(help = "期望的视频高度，如 720；不指定时下载最高清晰度")]
    pub quality: Option<u32>,

    /// 字幕语言
    #[arg(short = 'l', long = "lang", value_name = "LANG", default_value = "en")]
    #[arg(help = "字幕语言代码，all 表示全部")]
    pub lang: String,

    /// 分片并发数
    #[arg(long = "concurrent-downloads", visible_alias = "cd", value_name = "N", default_value_t = 10)]
    #[arg(allow_negative_numbers = true)]
    pub concurrent_downloads: i64,

    #[arg(long, help = "不下载视频")]
    pub skip_lectures: bool,
    #[arg(long, help = "下载附件")]
    pub download_assets: bool,
    #[arg(long, help = "下载字幕")]
    pub download_captions: bool,
    #[arg(long, help = "下载测验")]
    pub download_quizzes: bool,
    #[arg(long, help = "转换后保留 VTT 字幕")]
    pub keep_vtt: bool,
    #[arg(long, help = "跳过 HLS 流")]
    pub skip_hls: bool,
    #[arg(long, help = "只显示课程信息，不下载")]
    pub info: bool,
    #[arg(long, help = "使用课程 id 作为目录名")]
    pub id_as_course_name: bool,
    #[arg(long = "subscription-course", visible_alias = "sc", help = "订阅制课程")]
    pub subscription_course: bool,
    #[arg(long, help = "把课程目录保存到本地文件")]
    pub save_to_file: bool,
    #[arg(long, help = "从本地文件加载课程目录")]
    pub load_from_file: bool,

    /// 日志级别
    #[arg(long, value_name = "LEVEL", default_value = "INFO")]
    #[arg(help = "DEBUG, INFO, WARNING, ERROR, CRITICAL")]
    pub log_level: String,

    #[arg(long = "use-h265", help = "合并时转码为 H.265")]
    pub use_h265: bool,
    #[arg(long, value_name = "CRF", default_value_t = 28)]
    pub h265_crf: u32,
    #[arg(long, value_name = "PRESET", default_value = "medium")]
    pub h265_preset: String,
    #[arg(long, help = "使用 NVIDIA 硬件编码")]
    pub use_nvenc: bool,

    /// 保存目录
    #[arg(short = 'o', long = "out", value_name = "DIR", default_value = "out_dir")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    #[arg(short = 'n', long = "continue-lecture-numbers", help = "课时编号跨章节连续")]
    pub continuous_numbering: bool,

    /// 章节范围
    #[arg(long = "chapter", value_name = "RANGE")]
    #[arg(help = "指定要下载的章节，如: 1,3-5")]
    pub chapter_filter: Option<String>,

    /// 课时范围
    #[arg(long = "lecture", value_name = "RANGE")]
    #[arg(help = "指定要下载的课时，如: 1-3,5")]
    pub lecture_filter: Option<String>,

    /// 解密密钥
    #[arg(long, value_name = "HEX")]
    #[arg(help = "DRM 解密密钥 (十六进制)")]
    pub key: Option<String>,

    #[arg(long, value_name = "PATH", env = "FFMPEG_PATH")]
    pub ffmpeg: Option<PathBuf>,
    #[arg(long = "yt-dlp", value_name = "PATH", env = "YTDLP_PATH")]
    pub yt_dlp: Option<PathBuf>,
    #[arg(long, value_name = "PATH", env = "ARIA2C_PATH")]
    pub aria2c: Option<PathBuf>,
}

impl Cli {
    /// 构建运行配置，范围格式错误时返回错误
    pub fn to_config(&self) -> Result<DownloadConfig, ParseError> {
        let chapter_filter = self.chapter_filter.as_deref().map(parse_index_range).transpose()?;
        let lecture_filter = self.lecture_filter.as_deref().map(parse_index_range).transpose()?;

        Ok(DownloadConfig {
            course_url: self.course_url.clone(),
            credentials: Credentials {
                bearer_token: self.bearer_token.clone(),
                cookie: self.cookie.clone(),
            },
            quality: self.quality,
            caption_lang: self.lang.clone(),
            concurrency: clamp_concurrency(self.concurrent_downloads),
            skip_lectures: self.skip_lectures,
            download_assets: self.download_assets,
            download_captions: self.download_captions,
            download_quizzes: self.download_quizzes,
            keep_vtt: self.keep_vtt,
            skip_hls: self.skip_hls,
            info: self.info,
            id_as_course_name: self.id_as_course_name,
            subscription_course: self.subscription_course,
            save_to_file: self.save_to_file,
            load_from_file: self.load_from_file,
            continuous_numbering: self.continuous_numbering,
            h265: H265Options {
                enabled: self.use_h265,
                crf: self.h265_crf,
                preset: self.h265_preset.clone(),
                nvenc: self.use_nvenc,
            },
            output_dir: self.output_dir.clone(),
            chapter_filter,
            lecture_filter,
            decryption_key: self.key.clone().filter(|k| !k.is_empty()),
            tools: ToolPaths::resolve(self.ffmpeg.clone(), self.yt_dlp.clone(), self.aria2c.clone()),
        })
    }
}

/// 日志级别名称转换，无效时返回 None
pub fn parse_log_level(name: &str) -> Option<Level> {
    match name.to_uppercase().as_str() {
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARNING" | "WARN" => Some(Level::WARN),
        "ERROR" | "CRITICAL" => Some(Level::ERROR),
        _ => None,
    }
}

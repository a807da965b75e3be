// 外部程序参数构造，参数顺序与下游工具兼容，不要随意调整
use std::path::Path;

use crate::config::{H265Options, ToolPaths};

use super::process::{Tool, ToolInvocation};

pub struct ToolCommands<'a> {
    tools: &'a ToolPaths,
    concurrency: usize,
}

impl<'a> ToolCommands<'a> {
    pub fn new(tools: &'a ToolPaths, concurrency: usize) -> Self {
        Self { tools, concurrency }
    }

    fn invocation(&self, tool: Tool) -> ToolInvocation {
        ToolInvocation::new(tool, self.tools.get(tool))
    }

    fn aria2c_name(&self) -> String {
        self.tools
            .aria2c
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| "aria2c".to_string())
    }

    fn yt_dlp_common(&self) -> ToolInvocation {
        self.invocation(Tool::YtDlp).args([
            "--enable-file-urls".to_string(),
            "--force-generic-extractor".to_string(),
        ])
    }

    fn yt_dlp_downloader_args(&self, inv: ToolInvocation) -> ToolInvocation {
        inv.args([
            "--concurrent-fragments".to_string(),
            self.concurrency.to_string(),
            "--downloader".to_string(),
            self.aria2c_name(),
            "--downloader-args".to_string(),
            "aria2c:\"--disable-ipv6\"".to_string(),
        ])
    }

    /// 清晰流 (HLS/MP4) 直接下载到最终文件
    pub fn fetch_clear(&self, url: &str, final_path: &Path) -> ToolInvocation {
        let template = final_path.with_extension("%(ext)s");
        self.yt_dlp_downloader_args(self.yt_dlp_common())
            .arg("-o")
            .path_arg(&template)
            .arg(url)
            .expect_output(final_path)
    }

    /// DASH 加密流，输出 <id>.encrypted.mp4 / <id>.encrypted.m4a
    pub fn fetch_dash(&self, url: &str, format_id: &str, lecture_id: u64, chapter_dir: &Path) -> ToolInvocation {
        self.yt_dlp_downloader_args(self.yt_dlp_common().arg("--allow-unplayable-formats"))
            .args([
                "--fixup".to_string(),
                "never".to_string(),
                "-k".to_string(),
                "-o".to_string(),
                format!("{}.encrypted.%(ext)s", lecture_id),
                "-f".to_string(),
                format_id.to_string(),
                url.to_string(),
            ])
            .current_dir(chapter_dir)
    }

    /// 只探测格式信息，不下载
    pub fn probe(&self, url: &str) -> ToolInvocation {
        self.yt_dlp_common()
            .args([
                "--allow-unplayable-formats".to_string(),
                "--no-warnings".to_string(),
                "-J".to_string(),
                url.to_string(),
            ])
            .capture_stdout()
    }

    /// 单文件下载 (附件、字幕、MP4)
    pub fn aria2c_file(&self, url: &str, dir: &Path, filename: &str) -> ToolInvocation {
        self.invocation(Tool::Aria2c)
            .arg(url)
            .arg("-o")
            .arg(filename)
            .arg("-d")
            .path_arg(dir)
            .args([
                "-j16",
                "-s20",
                "-x16",
                "-c",
                "--auto-file-renaming=false",
                "--summary-interval=0",
                "--disable-ipv6",
                "--follow-torrent=false",
            ])
            .expect_output(&dir.join(filename))
    }

    pub fn decrypt(&self, key: &str, input: &Path, output: &Path) -> ToolInvocation {
        self.invocation(Tool::Ffmpeg)
            .args(["-nostdin", "-loglevel", "error", "-decryption_key"])
            .arg(key)
            .arg("-i")
            .path_arg(input)
            .args(["-c", "copy"])
            .path_arg(output)
            .expect_output(output)
    }

    /// 音视频合并；时间戳归零，默认不重新编码
    pub fn combine(&self, video: &Path, audio: &Path, output: &Path, h265: &H265Options) -> ToolInvocation {
        let mut inv = self
            .invocation(Tool::Ffmpeg)
            .args(["-nostdin", "-loglevel", "error"]);
        if h265.enabled && h265.nvenc {
            inv = inv.args(["-hwaccel", "cuda", "-hwaccel_output_format", "cuda"]);
        }
        inv = inv
            .arg("-i")
            .path_arg(video)
            .arg("-i")
            .path_arg(audio)
            .args(["-copyts", "-start_at_zero", "-map", "0:v:0", "-map", "1:a:0"]);
        inv = if h265.enabled {
            Self::h265_video_args(inv, h265)
        } else {
            inv.args(["-c:v", "copy"])
        };
        inv.args(["-c:a", "copy", "-shortest"])
            .path_arg(output)
            .expect_output(output)
    }

    /// 已下载的清晰视频转码为 H.265
    pub fn transcode(&self, input: &Path, output: &Path, h265: &H265Options) -> ToolInvocation {
        let mut inv = self
            .invocation(Tool::Ffmpeg)
            .args(["-nostdin", "-loglevel", "error"]);
        if h265.nvenc {
            inv = inv.args(["-hwaccel", "cuda", "-hwaccel_output_format", "cuda"]);
        }
        Self::h265_video_args(inv.arg("-y").arg("-i").path_arg(input), h265)
            .args(["-c:a", "copy", "-f", "mp4"])
            .path_arg(output)
            .expect_output(output)
    }

    fn h265_video_args(inv: ToolInvocation, h265: &H265Options) -> ToolInvocation {
        inv.args([
            "-c:v".to_string(),
            h265.codec().to_string(),
            "-vtag".to_string(),
            "hvc1".to_string(),
            "-crf".to_string(),
            h265.crf.to_string(),
            "-preset".to_string(),
            h265.preset.clone(),
        ])
    }
}

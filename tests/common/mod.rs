#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use udemy_downloader::common::client::{Credentials, Portal, RetryPolicy, UdemyClient};
use udemy_downloader::downloader::process::{ProcessOutcome, Tool, ToolInvocation, ToolRunner};

pub const SAMPLE_VTT: &str = "WEBVTT\n\n00:00.000 --> 00:01.500\nHello <b>world</b>\n";

/// 按参数模拟 yt-dlp / ffmpeg / aria2c 的输出文件
#[derive(Default)]
pub struct ScriptedRunner {
    pub calls: Mutex<Vec<ToolInvocation>>,
    pub probe_json: String,
    pub fail_decrypt: bool,
    pub fail_combine: bool,
}

impl ScriptedRunner {
    pub fn with_probe(probe_json: impl Into<String>) -> Self {
        Self {
            probe_json: probe_json.into(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, tool: Tool) -> Vec<ToolInvocation> {
        self.calls().into_iter().filter(|c| c.tool == tool).collect()
    }
}

pub fn arg_after<'a>(invocation: &'a ToolInvocation, flag: &str) -> Option<&'a str> {
    let pos = invocation.args.iter().position(|a| a == flag)?;
    invocation.args.get(pos + 1).map(String::as_str)
}

fn failure() -> ProcessOutcome {
    ProcessOutcome::NonZeroExit {
        code: Some(1),
        stderr_tail: "simulated failure".to_string(),
    }
}

fn write(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation, cancel: &CancellationToken) -> ProcessOutcome {
        self.calls.lock().unwrap().push(invocation.clone());
        if cancel.is_cancelled() {
            return ProcessOutcome::Cancelled;
        }

        match invocation.tool {
            Tool::YtDlp if invocation.capture_stdout => ProcessOutcome::Success {
                stdout: self.probe_json.clone(),
            },
            Tool::YtDlp => {
                if let Some(expected) = &invocation.expected_output {
                    write(expected, b"clear video");
                } else {
                    let dir = invocation.cwd.clone().unwrap_or_default();
                    let template = arg_after(invocation, "-o").unwrap_or_default();
                    write(&dir.join(template.replace("%(ext)s", "mp4")), b"encrypted video");
                    write(&dir.join(template.replace("%(ext)s", "m4a")), b"encrypted audio");
                }
                ProcessOutcome::Success { stdout: String::new() }
            }
            Tool::Ffmpeg => {
                let decrypting = invocation.args.iter().any(|a| a == "-decryption_key");
                if (decrypting && self.fail_decrypt) || (!decrypting && self.fail_combine) {
                    return failure();
                }
                let output = PathBuf::from(invocation.args.last().cloned().unwrap_or_default());
                let contents: &[u8] = if decrypting { b"decrypted" } else { b"muxed" };
                write(&output, contents);
                ProcessOutcome::Success { stdout: String::new() }
            }
            Tool::Aria2c => {
                let dir = PathBuf::from(arg_after(invocation, "-d").unwrap_or_default());
                let name = arg_after(invocation, "-o").unwrap_or_default();
                let contents: &[u8] = if name.ends_with(".vtt") {
                    SAMPLE_VTT.as_bytes()
                } else {
                    b"attachment"
                };
                write(&dir.join(name), contents);
                ProcessOutcome::Success { stdout: String::new() }
            }
        }
    }
}

pub fn test_client(base_url: &str) -> UdemyClient {
    let credentials = Credentials {
        bearer_token: Some("test-token".to_string()),
        cookie: None,
    };
    let retry = RetryPolicy {
        max_attempts: 2,
        delay: Duration::from_millis(10),
    };
    UdemyClient::new(Portal::with_base_url("www", base_url).unwrap(), &credentials, retry).unwrap()
}

/// 相对路径列表，按字典序
pub fn tree(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

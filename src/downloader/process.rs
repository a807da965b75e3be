use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::DownloadError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const TERMINATE_GRACE: Duration = Duration::from_secs(5);
const OUTPUT_CHANNEL_SIZE: usize = 256;
const STDERR_TAIL_LINES: usize = 20;

/// 需要调用的外部程序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    YtDlp,
    Aria2c,
    Ffmpeg,
}

impl Tool {
    pub fn binary_name(&self) -> &'static str {
        match self {
            Tool::YtDlp => "yt-dlp",
            Tool::Aria2c => "aria2c",
            Tool::Ffmpeg => "ffmpeg",
        }
    }

    fn log_prefix(&self) -> &'static str {
        match self {
            Tool::YtDlp => "YTDLP",
            Tool::Aria2c => "ARIA2",
            Tool::Ffmpeg => "FFMPEG",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binary_name())
    }
}

/// 一次外部程序调用
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: Tool,
    /// None 表示没有找到可执行文件
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// 退出码为 0 时还要求该文件存在且非空
    pub expected_output: Option<PathBuf>,
    pub capture_stdout: bool,
}

impl ToolInvocation {
    pub fn new(tool: Tool, program: Option<&Path>) -> Self {
        Self {
            tool,
            program: program.map(Path::to_path_buf),
            args: Vec::new(),
            cwd: None,
            expected_output: None,
            capture_stdout: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().to_string())
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn expect_output(mut self, path: &Path) -> Self {
        self.expected_output = Some(path.to_path_buf());
        self
    }

    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    pub fn command_line(&self) -> String {
        let program = self
            .program
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| self.tool.binary_name().to_string());
        std::iter::once(program)
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 调用结果分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Success { stdout: String },
    ToolMissing(Tool),
    NonZeroExit { code: Option<i32>, stderr_tail: String },
    OutputMissing(PathBuf),
    Cancelled,
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Success { .. })
    }

    /// 转换为 Result，取消单独作为错误分支
    pub fn into_result(self, tool: Tool) -> Result<String, DownloadError> {
        match self {
            ProcessOutcome::Success { stdout } => Ok(stdout),
            ProcessOutcome::ToolMissing(tool) => Err(DownloadError::ToolMissing(tool)),
            ProcessOutcome::NonZeroExit { code, stderr_tail } => Err(DownloadError::ToolFailed {
                tool,
                code,
                stderr: stderr_tail,
            }),
            ProcessOutcome::OutputMissing(path) => Err(DownloadError::OutputMissing { tool, path }),
            ProcessOutcome::Cancelled => Err(DownloadError::Cancelled),
        }
    }
}

/// 外部程序执行接口，测试中可替换为模拟实现
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation, cancel: &CancellationToken) -> ProcessOutcome;
}

#[derive(Debug)]
struct RegisteredProcess {
    label: String,
    pid: Option<u32>,
    token: CancellationToken,
}

/// 正在运行的外部进程登记表，终止时统一遍历
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    processes: Arc<DashMap<u64, RegisteredProcess>>,
    next_id: Arc<AtomicU64>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, label: String, pid: Option<u32>, parent: &CancellationToken) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = parent.child_token();
        self.processes.insert(
            id,
            RegisteredProcess {
                label,
                pid,
                token: token.clone(),
            },
        );
        (id, token)
    }

    fn unregister(&self, id: u64) {
        self.processes.remove(&id);
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// 请求终止所有登记的进程，返回数量
    pub fn terminate_all(&self) -> usize {
        let mut count = 0;
        for entry in self.processes.iter() {
            match entry.pid {
                Some(pid) => info!("终止外部进程: {} (pid {})", entry.label, pid),
                None => info!("终止外部进程: {}", entry.label),
            }
            entry.token.cancel();
            count += 1;
        }
        count
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// 基于 tokio::process 的真实执行器
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    registry: ProcessRegistry,
}

impl ProcessRunner {
    pub fn new(registry: ProcessRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    fn spawn_reader<R>(pipe: R, stream: Stream, tx: mpsc::Sender<(Stream, String)>) -> tokio::task::JoinHandle<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut lines = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send((stream, line)).await.is_err() {
                    break;
                }
            }
        })
    }

    async fn terminate(child: &mut Child) {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                // 先发 SIGTERM，给进程机会清理
                // SAFETY: kill 只读取两个整数参数，不涉及内存；pid 来自仍由本进程持有、
                // 尚未被 wait 回收的子进程，不会指向其他进程
                let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
                if rc != 0 {
                    debug!("发送 SIGTERM 失败: {}", std::io::Error::last_os_error());
                    let _ = child.start_kill();
                }
            } else {
                let _ = child.start_kill();
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match timeout(TERMINATE_GRACE, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("进程未在 {:?} 内退出，强制结束", TERMINATE_GRACE);
                let _ = child.kill().await;
            }
        }
    }

    async fn supervise(
        &self,
        invocation: &ToolInvocation,
        mut child: Child,
        token: &CancellationToken,
    ) -> Result<(ExitStatus, String, VecDeque<String>), ()> {
        let tool = invocation.tool;
        let (tx, mut rx) = mpsc::channel::<(Stream, String)>(OUTPUT_CHANNEL_SIZE);
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(Self::spawn_reader(stdout, Stream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(Self::spawn_reader(stderr, Stream::Stderr, tx.clone()));
        }
        drop(tx);

        let mut stdout_buf = String::new();
        let mut stderr_tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut handle_line = |stream: Stream, line: String| match stream {
            Stream::Stdout => {
                if invocation.capture_stdout {
                    stdout_buf.push_str(&line);
                    stdout_buf.push('\n');
                } else {
                    debug!("[{}-STDOUT] {}", tool.log_prefix(), line);
                }
            }
            Stream::Stderr => {
                debug!("[{}-STDERR] {}", tool.log_prefix(), line);
                if stderr_tail.len() == STDERR_TAIL_LINES {
                    stderr_tail.pop_front();
                }
                stderr_tail.push_back(line);
            }
        };

        let mut pipes_open = true;
        let status = loop {
            if token.is_cancelled() {
                info!("收到取消信号，终止 {}", tool);
                Self::terminate(&mut child).await;
                readers.iter().for_each(|r| r.abort());
                return Err(());
            }

            if pipes_open {
                match timeout(POLL_INTERVAL, rx.recv()).await {
                    Ok(Some((stream, line))) => {
                        handle_line(stream, line);
                        continue;
                    }
                    Ok(None) => pipes_open = false,
                    Err(_) => {}
                }
            } else {
                tokio::time::sleep(POLL_INTERVAL).await;
            }

            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    error!("等待 {} 退出失败: {}", tool, e);
                    Self::terminate(&mut child).await;
                    return Err(());
                }
            }
        };

        // 子进程可能把管道留给了孙进程，等待片刻后放弃
        for reader in readers {
            if timeout(Duration::from_secs(1), reader).await.is_err() {
                debug!("{} 的输出读取未能及时结束", tool);
            }
        }
        while let Ok((stream, line)) = rx.try_recv() {
            handle_line(stream, line);
        }

        Ok((status, stdout_buf, stderr_tail))
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation, cancel: &CancellationToken) -> ProcessOutcome {
        let tool = invocation.tool;
        let Some(program) = &invocation.program else {
            error!("未找到 {}，无法继续", tool);
            return ProcessOutcome::ToolMissing(tool);
        };
        if cancel.is_cancelled() {
            return ProcessOutcome::Cancelled;
        }

        debug!("执行: {}", invocation.command_line());
        let mut command = Command::new(program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("未找到 {}: {:?}", tool, program);
                return ProcessOutcome::ToolMissing(tool);
            }
            Err(e) => {
                error!("启动 {} 失败: {}", tool, e);
                return ProcessOutcome::NonZeroExit {
                    code: None,
                    stderr_tail: e.to_string(),
                };
            }
        };

        let (handle, token) = self.registry.register(tool.to_string(), child.id(), cancel);
        let supervised = self.supervise(invocation, child, &token).await;
        self.registry.unregister(handle);

        let Ok((status, stdout, stderr_tail)) = supervised else {
            return ProcessOutcome::Cancelled;
        };

        if !status.success() {
            let tail = stderr_tail.into_iter().collect::<Vec<_>>().join("\n");
            error!("{} 退出码异常: {:?}\n{}", tool, status.code(), tail);
            return ProcessOutcome::NonZeroExit {
                code: status.code(),
                stderr_tail: tail,
            };
        }

        if let Some(expected) = &invocation.expected_output {
            if !is_non_empty_file(expected).await {
                error!("{} 未生成有效输出: {:?}", tool, expected);
                return ProcessOutcome::OutputMissing(expected.clone());
            }
        }

        ProcessOutcome::Success { stdout }
    }
}

pub async fn is_non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

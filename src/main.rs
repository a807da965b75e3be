use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};

use udemy_downloader::cli::{Cli, parse_log_level};
use udemy_downloader::common::client::{Portal, RetryPolicy, UdemyClient};
use udemy_downloader::common::logger::PrettyLogger;
use udemy_downloader::downloader::{PipelineManager, ProcessRegistry, ProcessRunner, RunSummary, SelectAll};
use udemy_downloader::parser::course::parse_course_url;

// 课时数超过该值时，--info 需要确认
const INFO_CONFIRM_THRESHOLD: usize = 100;

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let args = Cli::parse();

    // 初始化日志
    let level = parse_log_level(&args.log_level);
    tracing_subscriber::fmt()
        .with_max_level(level.unwrap_or(Level::INFO))
        .init();
    if level.is_none() {
        warn!("无效的日志级别 {}，使用 INFO", args.log_level);
    }

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        PrettyLogger::error(format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(args: Cli) -> Result<()> {
    let config = args.to_config().context("参数错误")?;
    config.tools.preflight(config.skip_lectures);
    if config.decryption_key.is_none() && !config.skip_lectures {
        warn!("未提供解密密钥 (--key)，DRM 课时只会下载加密文件");
    }

    let (portal_name, _) = parse_course_url(&config.course_url)?;
    let portal = Portal::new(&portal_name)?;
    info!("门户: {} (企业版: {})", portal.name, portal.is_enterprise());
    let client = UdemyClient::new(portal, &config.credentials, RetryPolicy::default())
        .context("创建客户端失败")?;

    let registry = ProcessRegistry::new();
    let runner = ProcessRunner::new(registry.clone());
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("收到中断信号，正在停止...");
                cancel.cancel();
                let stopped = registry.terminate_all();
                info!("已请求终止 {} 个外部进程", stopped);
            }
        });
    }

    let manager = PipelineManager::new(&client, &runner, &config, cancel.clone());
    let course = manager.prepare_course().await?;

    if config.info {
        if course.total_lectures() > INFO_CONFIRM_THRESHOLD
            && !confirm(&format!(
                "课程共有 {} 个课时，获取详细信息需要较长时间，是否继续? [y/N] ",
                course.total_lectures()
            ))
            .await?
        {
            PrettyLogger::info("已取消");
            return Ok(());
        }
        manager.show_info(&course).await?;
        return Ok(());
    }

    PrettyLogger::file_info("保存目录", manager.course_dir(&course).to_string_lossy());
    let summary = manager.run(&course, &SelectAll).await?;
    print_summary(&summary);
    Ok(())
}

async fn confirm(prompt: &str) -> Result<bool> {
    PrettyLogger::prompt(prompt);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_summary(summary: &RunSummary) {
    if summary.cancelled {
        PrettyLogger::warning("下载已取消，已完成的部分会在下次运行时跳过");
    }
    let lectures = summary.lectures;
    PrettyLogger::completion_summary(
        "处理完成！",
        &[
            format!("📁 {}", summary.course_dir.display()),
            format!(
                "课时: {} 完成, {} 跳过, {} 失败 (共 {})",
                lectures.completed, lectures.skipped, lectures.failed, lectures.total
            ),
            PrettyLogger::phase_counts(
                "解密",
                summary.decrypted.processed,
                summary.decrypted.skipped,
                summary.decrypted.failed,
            ),
            PrettyLogger::phase_counts(
                "合并",
                summary.combined.processed,
                summary.combined.skipped,
                summary.combined.failed,
            ),
        ],
    );
    if lectures.failed == 0 && summary.decrypted.failed == 0 && summary.combined.failed == 0 {
        println!("{}", "下载完成！".green());
    }
}

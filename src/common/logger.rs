use std::io::Write;

use colored::*;

// 标题行宽度（字符数）
const BANNER_WIDTH: usize = 48;

/// 控制台展示工具，日志仍然走 tracing
pub struct PrettyLogger;

impl PrettyLogger {
    fn emit(symbol: ColoredString, message: &str) {
        println!("{} {}", symbol, message);
    }

    pub fn success(message: impl AsRef<str>) {
        Self::emit("✓".green().bold(), message.as_ref());
    }

    pub fn info(message: impl AsRef<str>) {
        Self::emit("ℹ".blue().bold(), message.as_ref());
    }

    pub fn warning(message: impl AsRef<str>) {
        Self::emit("⚠".yellow().bold(), message.as_ref());
    }

    pub fn error(message: impl AsRef<str>) {
        Self::emit("✗".red().bold(), message.as_ref());
    }

    /// 阶段开始，前面空一行
    pub fn step_start(step: impl AsRef<str>) {
        println!();
        Self::emit("▶".cyan().bold(), &step.as_ref().bold().to_string());
    }

    pub fn step_complete(step: impl AsRef<str>) {
        Self::emit("✓".green().bold(), &step.as_ref().green().to_string());
    }

    pub fn file_info(label: impl AsRef<str>, path: impl AsRef<str>) {
        Self::emit(
            "📁".blue().bold(),
            &format!("{}: {}", label.as_ref().bold(), path.as_ref()),
        );
    }

    /// 课程标题横幅，附带章节与课时数
    pub fn course_banner(title: impl AsRef<str>, chapters: usize, lectures: usize) {
        let title = title.as_ref();
        let width = title.chars().count().min(BANNER_WIDTH);
        let left = (BANNER_WIDTH - width) / 2;
        let right = BANNER_WIDTH - left - width;
        println!(
            "{} {} {}",
            "─".repeat(left).bright_black(),
            title.bold(),
            "─".repeat(right).bright_black()
        );
        Self::info(format!("章节: {}  课时: {}", chapters, lectures));
    }

    pub fn chapter(title: impl AsRef<str>, index: usize, total: usize) {
        Self::emit(
            "📚".magenta().bold(),
            &format!("{} ({}/{})", title.as_ref().bold(), index, total),
        );
    }

    /// 课时标题及其属性，属性逐行缩进显示
    pub fn lecture(title: impl AsRef<str>, details: &[(String, String)]) {
        println!("  {} {}", "🎬".magenta().bold(), title.as_ref().bold());
        for (key, value) in details {
            println!("      {}: {}", key.bright_black(), value.cyan());
        }
    }

    pub fn separator() {
        println!("{}", "─".repeat(BANNER_WIDTH + 2).bright_black());
    }

    /// 一个后处理阶段的计数
    pub fn phase_counts(phase: &str, processed: usize, skipped: usize, failed: usize) -> String {
        let failed = if failed > 0 {
            failed.to_string().red().to_string()
        } else {
            failed.to_string()
        };
        format!("{}: {} 完成, {} 跳过, {} 失败", phase, processed, skipped, failed)
    }

    pub fn completion_summary(heading: impl AsRef<str>, items: &[String]) {
        println!("\n{}", format!("🎉 {}", heading.as_ref()).green().bold());
        for item in items {
            println!("  {}", item);
        }
    }

    /// 不换行的提示，等待用户输入
    pub fn prompt(message: impl AsRef<str>) {
        print!("{} {}", "⏳".yellow().bold(), message.as_ref());
        let _ = std::io::stdout().flush();
    }
}

/// 便捷宏用于漂亮的日志输出
#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::success(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::warning(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::error(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_step {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::step_start(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_complete {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::step_complete(format!($($arg)*))
    };
}

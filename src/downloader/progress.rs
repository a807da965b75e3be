use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

/// 课时级进度：计数器可以从取消路径并发读取
#[derive(Debug, Clone)]
pub struct PipelineProgress {
    bar: ProgressBar,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicUsize,
    completed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ProgressSnapshot {
    pub fn finished(&self) -> usize {
        self.completed + self.skipped + self.failed
    }
}

impl PipelineProgress {
    pub fn new(total: usize) -> Self {
        let bar = if std::io::stdout().is_terminal() {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let counters = Counters::default();
        counters.total.store(total, Ordering::Relaxed);
        Self {
            bar,
            counters: Arc::new(counters),
        }
    }

    pub fn hidden(total: usize) -> Self {
        let progress = Self::new(total);
        progress.bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        progress
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.bar.set_message(msg.into());
    }

    pub fn lecture_completed(&self) {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        self.bar.inc(1);
    }

    pub fn lecture_skipped(&self) {
        self.counters.skipped.fetch_add(1, Ordering::Relaxed);
        self.bar.inc(1);
    }

    pub fn lecture_failed(&self) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        self.bar.inc(1);
    }

    /// 在进度条下方输出，避免画面错乱
    pub fn println(&self, f: impl FnOnce()) {
        self.bar.suspend(f);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.counters.total.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("完成");
    }

    pub fn abandon(&self) {
        self.bar.abandon_with_message("已取消");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_shared_between_clones() {
        let progress = PipelineProgress::hidden(3);
        let other = progress.clone();
        progress.lecture_completed();
        other.lecture_failed();
        other.lecture_skipped();

        let snap = progress.snapshot();
        assert_eq!(snap.total, 3);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.finished(), 3);
    }
}

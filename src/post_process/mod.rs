pub mod cleanup;
pub mod decrypt;
pub mod merger;

/// 一次后处理阶段的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PhaseReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PhaseReport {
    pub fn merge(&mut self, other: PhaseReport) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

use tracing::debug;

use super::models::Source;

/// 清晰度选择: 不指定目标时取最高，否则取高度最接近的
pub struct StreamSelector;

impl StreamSelector {
    pub fn select(sources: &[Source], quality: Option<u32>) -> Option<&Source> {
        let selected = match quality {
            None => Self::best(sources),
            Some(target) => sources
                .iter()
                .min_by_key(|s| (i64::from(s.height) - i64::from(target)).abs()),
        };

        if let Some(source) = selected {
            debug!(
                "选择清晰度: {} (目标: {:?}, 候选: {})",
                source.quality_label(),
                quality,
                sources.len()
            );
        }
        selected
    }

    /// 按高度取最大值，高度相同时取列表中靠后的
    pub fn best(sources: &[Source]) -> Option<&Source> {
        sources.iter().max_by_key(|s| s.height)
    }
}

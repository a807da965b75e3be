use std::collections::BTreeSet;

use super::errors::ParseError;

/// 解析形如 "1,3-4" 的章节/课时范围
pub fn parse_index_range(range_str: &str) -> Result<BTreeSet<u32>, ParseError> {
    let mut indices = BTreeSet::new();

    for part in range_str.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if part.contains('-') {
            let range: Vec<&str> = part.split('-').map(str::trim).collect();
            if range.len() != 2 {
                return Err(ParseError::InvalidRange(format!("无效的范围格式: {}", part)));
            }

            let start: u32 = range[0]
                .parse()
                .map_err(|_| ParseError::InvalidRange(format!("无效的起始序号: {}", part)))?;
            let end: u32 = range[1]
                .parse()
                .map_err(|_| ParseError::InvalidRange(format!("无效的结束序号: {}", part)))?;

            if start > end {
                return Err(ParseError::InvalidRange(format!(
                    "起始序号不能大于结束序号: {}",
                    part
                )));
            }

            indices.extend(start..=end);
        } else {
            let index: u32 = part
                .parse()
                .map_err(|_| ParseError::InvalidRange(format!("无效的序号: {}", part)))?;
            indices.insert(index);
        }
    }

    if indices.is_empty() {
        return Err(ParseError::InvalidRange("没有有效的序号".to_string()));
    }

    Ok(indices)
}

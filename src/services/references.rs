//! Best-effort scraping of the trailing references section of an answer.

use crate::api::models::Citation;

/// Marker introducing the references section.
pub const REFERENCES_MARKER: &str = "参考资料";

/// Extract citations from a complete answer.
///
/// Only the region after the last marker is considered. Each non-empty line is
/// split on ASCII or full-width commas; lines with fewer than two parts are
/// skipped and an unparseable year is left unset. Never fails.
pub fn extract_references(text: &str) -> Vec<Citation> {
    let Some(pos) = text.rfind(REFERENCES_MARKER) else {
        return Vec::new();
    };

    text[pos + REFERENCES_MARKER.len()..]
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(parse_citation)
        .collect()
}

fn parse_citation(line: &str) -> Option<Citation> {
    let parts: Vec<&str> = line.split([',', '，']).map(str::trim).collect();
    if parts.len() < 2 {
        return None;
    }

    let title = parts[0]
        .strip_prefix("- ")
        .or_else(|| parts[0].strip_prefix('-'))
        .unwrap_or(parts[0])
        .trim();

    Some(Citation {
        title: title.to_string(),
        source: Some(parts[1].to_string()),
        year: parts.get(2).and_then(|year| year.parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn citation(title: &str, source: &str, year: Option<i32>) -> Citation {
        Citation {
            title: title.to_string(),
            source: Some(source.to_string()),
            year,
        }
    }

    #[test]
    fn test_extracts_after_marker() {
        let text = "...参考资料\n- A, Source1, 2020\n- B, Source2\n";
        assert_eq!(
            extract_references(text),
            vec![citation("A", "Source1", Some(2020)), citation("B", "Source2", None)]
        );
    }

    #[test]
    fn test_no_marker_returns_empty() {
        assert!(extract_references("没有引用的回答, 带逗号, 2020").is_empty());
        assert!(extract_references("").is_empty());
    }

    #[test]
    fn test_uses_last_marker() {
        let text = "参考资料\n- Old, Early, 1999\n正文再次提到参考资料：\n-New，中华医学会，2021\n";
        assert_eq!(
            extract_references(text),
            vec![citation("New", "中华医学会", Some(2021))]
        );
    }

    #[test]
    fn test_skips_single_part_lines_and_bad_years() {
        let text = "参考资料：\n\n  \n- 只有标题\n- 眼科学, 人民卫生出版社, 第九版\n";
        assert_eq!(
            extract_references(text),
            vec![citation("眼科学", "人民卫生出版社", None)]
        );
    }

    #[test]
    fn test_marker_at_end_of_text() {
        assert!(extract_references("回答正文 参考资料").is_empty());
    }
}

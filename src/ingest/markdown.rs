//! Splitting Markdown notes into ingestible segments.

/// Split on horizontal rules (`---`) and level-2+ headings. Empty segments
/// are dropped and each segment is trimmed.
pub fn split_markdown_segments(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        let is_rule = trimmed.trim_end() == "---";
        let is_heading = trimmed.starts_with("##");
        if is_rule || is_heading {
            push_segment(&mut segments, &mut current);
            if is_rule {
                continue;
            }
        }
        current.push_str(line);
        current.push('\n');
    }
    push_segment(&mut segments, &mut current);
    segments
}

fn push_segment(segments: &mut Vec<String>, current: &mut String) {
    let segment = current.trim();
    if !segment.is_empty() {
        segments.push(segment.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_rules_and_headings() {
        let text = "# Notes\nintro\n\n## Deploy\nfailed twice\n---\nfollow up\n\n---\n";
        let parts = split_markdown_segments(text);
        assert_eq!(parts, vec!["# Notes\nintro", "## Deploy\nfailed twice", "follow up"]);
    }
}

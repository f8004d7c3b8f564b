//! Line-positional files. An item's key is the zero-based line number.

use crate::Merged;
use weaver_types::ConfigurationItem;

/// How far past the current end of the file a line key may reach
const MAX_LINE_GROWTH: usize = 100_000;

pub(crate) fn merge(existing: Option<&str>, items: &[ConfigurationItem], load_existing: bool) -> Merged {
    let base = if load_existing { existing.unwrap_or("") } else { "" };
    let newline = if base.contains("\r\n") { "\r\n" } else { "\n" };
    let mut lines: Vec<String> = base.lines().map(str::to_string).collect();
    let mut item_errors = Vec::new();

    for item in items {
        let index: usize = match item.key.trim().parse() {
            Ok(index) => index,
            Err(_) => {
                item_errors.push(format!(
                    "Raw item '{}' does not have a line number key",
                    item.key
                ));
                continue;
            }
        };

        let limit = lines.len().saturating_add(MAX_LINE_GROWTH);
        let len = match index.checked_add(1) {
            Some(len) if len <= limit => len,
            _ => {
                item_errors.push(format!(
                    "Raw item '{}' is more than {} lines past the end of the file",
                    item.key, MAX_LINE_GROWTH
                ));
                continue;
            }
        };
        if len > lines.len() {
            lines.resize(len, String::new());
        }

        let current = &mut lines[index];
        if load_existing && !current.is_empty() && item.value.is_empty() {
            continue;
        }
        *current = item.value.clone();
    }

    let mut contents = lines.join(newline);
    if !lines.is_empty() && (base.is_empty() || base.ends_with('\n')) {
        contents.push_str(newline);
    }

    Merged {
        contents,
        item_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(index: usize, value: &str) -> ConfigurationItem {
        ConfigurationItem::new(index.to_string(), value)
    }

    #[test]
    fn test_gaps_are_backfilled() {
        let merged = merge(None, &[line(0, "first"), line(3, "fourth")], false);
        let lines: Vec<&str> = merged.contents.lines().collect();
        assert_eq!(lines, vec!["first", "", "", "fourth"]);
        assert!(merged.item_errors.is_empty());
    }

    #[test]
    fn test_empty_value_keeps_existing_line_when_loading() {
        let existing = "hostname\nmotd\n";
        let merged = merge(Some(existing), &[line(0, ""), line(1, "welcome")], true);
        assert_eq!(merged.contents, "hostname\nwelcome\n");
    }

    #[test]
    fn test_fresh_file_ignores_existing_content() {
        let merged = merge(Some("old\nstuff\n"), &[line(0, "")], false);
        assert_eq!(merged.contents, "\n");
    }

    #[test]
    fn test_non_numeric_key_is_item_error() {
        let merged = merge(None, &[ConfigurationItem::new("hostname", "x"), line(0, "ok")], false);
        assert_eq!(merged.item_errors.len(), 1);
        assert!(merged.item_errors[0].contains("hostname"));
        assert_eq!(merged.contents, "ok\n");
    }

    #[test]
    fn test_crlf_is_preserved() {
        let merged = merge(Some("a\r\nb\r\n"), &[line(1, "c")], true);
        assert_eq!(merged.contents, "a\r\nc\r\n");
    }

    #[test]
    fn test_far_out_line_key_is_item_error() {
        let merged = merge(
            None,
            &[
                ConfigurationItem::new(usize::MAX.to_string(), "x"),
                line(MAX_LINE_GROWTH, "too far"),
                line(1, "kept"),
            ],
            false,
        );
        assert_eq!(merged.item_errors.len(), 2);
        assert!(merged.item_errors[0].contains(&usize::MAX.to_string()));
        assert_eq!(merged.contents, "\nkept\n");

        // The limit is relative to the file being merged
        let existing = "a\n".repeat(3);
        let merged = merge(Some(&existing), &[line(MAX_LINE_GROWTH + 2, "end")], true);
        assert!(merged.item_errors.is_empty());
        assert_eq!(merged.contents.lines().count(), MAX_LINE_GROWTH + 3);
    }
}

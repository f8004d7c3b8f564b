//! Sectioned `key=value` files.
//!
//! The document keeps every line it does not understand verbatim, so
//! comments and odd formatting in game-shipped configs survive a merge.

use crate::Merged;
use weaver_types::ConfigurationItem;

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Entry { key: String, value: String },
    Verbatim(String),
}

#[derive(Debug, Clone)]
struct Section {
    /// Empty for the preamble before the first header
    name: String,
    lines: Vec<Line>,
}

#[derive(Debug, Clone)]
struct IniDocument {
    sections: Vec<Section>,
}

impl IniDocument {
    fn empty() -> Self {
        Self {
            sections: vec![Section {
                name: String::new(),
                lines: Vec::new(),
            }],
        }
    }

    fn parse(text: &str) -> Self {
        let mut document = Self::empty();
        for raw in text.lines() {
            let trimmed = raw.trim();
            if trimmed.starts_with('[') && trimmed.ends_with(']') && trimmed.len() >= 2 {
                document.sections.push(Section {
                    name: trimmed[1..trimmed.len() - 1].trim().to_string(),
                    lines: Vec::new(),
                });
                continue;
            }

            let line = match raw.split_once('=') {
                Some((key, value))
                    if !trimmed.starts_with(';') && !trimmed.starts_with('#') =>
                {
                    Line::Entry {
                        key: key.trim().to_string(),
                        value: value.trim().to_string(),
                    }
                }
                _ => Line::Verbatim(raw.to_string()),
            };

            if let Some(section) = document.sections.last_mut() {
                section.lines.push(line);
            }
        }
        document
    }

    fn section_mut(&mut self, name: &str) -> &mut Section {
        let index = match self.sections.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.sections.push(Section {
                    name: name.to_string(),
                    lines: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }

    fn set(&mut self, section: &str, key: &str, value: &str, duplicate: bool) {
        let section = self.section_mut(section);

        if !duplicate {
            for line in section.lines.iter_mut() {
                if let Line::Entry { key: k, value: v } = line {
                    if k == key {
                        *v = value.to_string();
                        return;
                    }
                }
            }
        }

        // New entries go after the last entry, ahead of trailing blanks or comments
        let insert_at = section
            .lines
            .iter()
            .rposition(|l| matches!(l, Line::Entry { .. }))
            .map(|i| i + 1)
            .unwrap_or(section.lines.len());
        section.lines.insert(
            insert_at,
            Line::Entry {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
    }

    fn render(&self, newline: &str) -> String {
        let mut out = String::new();
        for section in &self.sections {
            if !section.name.is_empty() {
                out.push('[');
                out.push_str(&section.name);
                out.push(']');
                out.push_str(newline);
            }
            for line in &section.lines {
                match line {
                    Line::Entry { key, value } => {
                        out.push_str(key);
                        out.push('=');
                        out.push_str(value);
                    }
                    Line::Verbatim(text) => out.push_str(text),
                }
                out.push_str(newline);
            }
        }
        out
    }
}

/// A write produced from one plain item or one `(path, category)` group
struct Assignment {
    section: String,
    key: String,
    value: String,
    duplicate: bool,
}

/// Plain items map one to one; items sharing a `(path, category)` fold into
/// a single `(k1=v1,k2=v2)` value keyed by `path`, in collection order.
fn assignments(items: &[ConfigurationItem]) -> Vec<Assignment> {
    let mut out: Vec<Assignment> = Vec::new();
    let mut groups: Vec<((String, String), usize, Vec<String>)> = Vec::new();

    for item in items {
        if item.path.is_empty() {
            out.push(Assignment {
                section: item.category.clone(),
                key: item.key.clone(),
                value: item.value.clone(),
                duplicate: item.duplicate_key,
            });
            continue;
        }

        let group_key = (item.path.clone(), item.category.clone());
        let pair = format!("{}={}", item.key, item.value);
        match groups.iter_mut().find(|(k, _, _)| *k == group_key) {
            Some((_, _, pairs)) => pairs.push(pair),
            None => {
                out.push(Assignment {
                    section: item.category.clone(),
                    key: item.path.clone(),
                    value: String::new(),
                    duplicate: item.duplicate_key,
                });
                groups.push((group_key, out.len() - 1, vec![pair]));
            }
        }
    }

    for (_, slot, pairs) in groups {
        out[slot].value = format!("({})", pairs.join(","));
    }
    out
}

pub(crate) fn merge(existing: Option<&str>, items: &[ConfigurationItem], load_existing: bool) -> Merged {
    let (mut document, newline) = match existing {
        Some(text) if load_existing => {
            let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
            (IniDocument::parse(text), newline)
        }
        _ => (IniDocument::empty(), "\n"),
    };

    for assignment in assignments(items) {
        document.set(
            &assignment.section,
            &assignment.key,
            &assignment.value,
            assignment.duplicate,
        );
    }

    Merged {
        contents: document.render(newline),
        item_errors: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_render_in_collection_order() {
        let items = vec![
            ConfigurationItem::new("Name", "Alpha")
                .with_category("/Script/Game.Settings")
                .with_path("ServerSettings"),
            ConfigurationItem::new("Port", "7777").with_category("Network"),
            ConfigurationItem::new("Slots", "16")
                .with_category("/Script/Game.Settings")
                .with_path("ServerSettings"),
        ];

        let merged = merge(None, &items, false);
        assert_eq!(
            merged.contents,
            "[/Script/Game.Settings]\nServerSettings=(Name=Alpha,Slots=16)\n[Network]\nPort=7777\n"
        );
    }

    #[test]
    fn test_existing_key_overwritten_and_comments_kept() {
        let existing = "; header\n[Server]\nPort=1\n\n[Other]\nA=b\n";
        let items = vec![
            ConfigurationItem::new("Port", "2").with_category("Server"),
            ConfigurationItem::new("Motd", "hi").with_category("Server"),
        ];
        let merged = merge(Some(existing), &items, true);
        assert_eq!(
            merged.contents,
            "; header\n[Server]\nPort=2\nMotd=hi\n\n[Other]\nA=b\n"
        );
    }

    #[test]
    fn test_duplicate_keys_only_when_flagged() {
        let existing = "[Mods]\nMod=one\n";
        let items = vec![
            ConfigurationItem::new("Mod", "two").with_category("Mods").duplicated(),
            ConfigurationItem::new("Mod", "three").with_category("Mods").duplicated(),
        ];
        let merged = merge(Some(existing), &items, true);
        assert_eq!(merged.contents, "[Mods]\nMod=one\nMod=two\nMod=three\n");

        let overwrite = vec![ConfigurationItem::new("Mod", "only").with_category("Mods")];
        let merged = merge(Some(existing), &overwrite, true);
        assert_eq!(merged.contents, "[Mods]\nMod=only\n");
    }

    #[test]
    fn test_empty_category_goes_to_preamble() {
        let existing = "Global=1\n[Server]\nPort=1\n";
        let items = vec![ConfigurationItem::new("Global", "2")];
        let merged = merge(Some(existing), &items, true);
        assert_eq!(merged.contents, "Global=2\n[Server]\nPort=1\n");
    }
}

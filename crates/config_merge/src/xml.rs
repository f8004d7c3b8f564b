//! Element-tree files.
//!
//! `path` is a `/`-separated element chain under the root, `key` names the
//! leaf element and `category` holds `name:value` attribute pairs.

use crate::{MergeError, Merged};
use std::path::Path;
use weaver_types::ConfigurationItem;
use xmltree::{Element, EmitterConfig, XMLNode};

fn segments(path: &str) -> Vec<&str> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn fresh_root(items: &[ConfigurationItem]) -> Element {
    let name = items
        .first()
        .and_then(|item| segments(&item.path).first().map(|s| s.to_string()))
        .unwrap_or_else(|| "root".to_string());
    Element::new(&name)
}

fn has_child(parent: &Element, name: &str) -> bool {
    parent
        .children
        .iter()
        .any(|node| matches!(node, XMLNode::Element(child) if child.name == name))
}

fn child_or_insert<'a>(parent: &'a mut Element, name: &str) -> Option<&'a mut Element> {
    if !has_child(parent, name) {
        parent.children.push(XMLNode::Element(Element::new(name)));
    }
    parent.children.iter_mut().find_map(|node| match node {
        XMLNode::Element(child) if child.name == name => Some(child),
        _ => None,
    })
}

fn parse_attributes(category: &str) -> Result<Vec<(String, String)>, String> {
    category
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(format!("Attribute '{}' is not a name:value pair", pair)),
        })
        .collect()
}

fn apply_item(root: &mut Element, item: &ConfigurationItem) -> Result<(), String> {
    let attributes = parse_attributes(&item.category)
        .map_err(|e| format!("Xml item '{}': {}", item.key, e))?;

    let mut chain = segments(&item.path);
    if chain.first() == Some(&root.name.as_str()) {
        chain.remove(0);
    }

    let mut current = root;
    for segment in chain {
        current = child_or_insert(current, segment)
            .ok_or_else(|| format!("Xml item '{}': could not create '{}'", item.key, segment))?;
    }

    let leaf = child_or_insert(current, &item.key)
        .ok_or_else(|| format!("Xml item '{}': could not create element", item.key))?;

    leaf.children
        .retain(|node| !matches!(node, XMLNode::Text(_) | XMLNode::CData(_)));
    if !item.value.is_empty() {
        leaf.children.push(XMLNode::Text(item.value.clone()));
    }

    leaf.attributes.clear();
    for (name, value) in attributes {
        leaf.attributes.insert(name, value);
    }
    Ok(())
}

pub(crate) fn merge(
    path: &Path,
    existing: Option<&str>,
    items: &[ConfigurationItem],
    load_existing: bool,
) -> Result<Merged, MergeError> {
    let mut root = match existing {
        Some(text) if load_existing && !text.trim().is_empty() => Element::parse(text.as_bytes())
            .map_err(|e| MergeError::InvalidXml(path.to_path_buf(), e))?,
        _ => fresh_root(items),
    };

    let mut item_errors = Vec::new();
    for item in items {
        if let Err(message) = apply_item(&mut root, item) {
            item_errors.push(message);
        }
    }

    let mut buffer = Vec::new();
    root.write_with_config(
        &mut buffer,
        EmitterConfig::new()
            .perform_indent(true)
            .indent_string("  "),
    )
    .map_err(|e| MergeError::XmlWrite(path.to_path_buf(), e))?;

    let mut contents = String::from_utf8_lossy(&buffer).into_owned();
    contents.push('\n');

    Ok(Merged {
        contents,
        item_errors,
    })
}

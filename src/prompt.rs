//! Trigger-character completion: prompt items, the sources they come from
//! and the menu that offers them.

use quick_xml::Reader;
use quick_xml::name::QName;
use quick_xml::events::{BytesStart, Event};
use unicode_normalization::UnicodeNormalization;

use crate::error::{EditorError, Result};
use crate::markup;

pub mod menu;
pub mod source;

pub use menu::{Placement, PromptConfig, PromptMenu};
pub use source::{DeferredSource, InlineSource, PromptFetcher, PromptSource, RemoteSource};

/// One completion candidate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptItem {
    /// Text matched against the filter.
    pub search: String,
    pub sgid: Option<String>,
    /// Markup shown in the menu.
    pub menu_markup: String,
    /// Markup inserted into the document.
    pub editor_markup: String,
}

/// A menu row built from a [`PromptItem`]. `id` indexes the source's
/// current items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListItem {
    pub id: usize,
    pub label: String,
}

impl ListItem {
    pub fn from_prompt_item(id: usize, item: &PromptItem) -> Self {
        let label = markup::plain_text(&item.menu_markup).trim().to_string();
        let label = if label.is_empty() { item.search.clone() } else { label };
        Self { id, label }
    }
}

/// Lowercase, decomposed, combining marks stripped.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|ch| !('\u{0300}'..='\u{036f}').contains(ch))
        .collect()
}

pub fn filter_matches(search: &str, filter: &str) -> bool {
    normalize(search).contains(&normalize(filter))
}

fn name_of(name: QName<'_>) -> String {
    String::from_utf8_lossy(name.as_ref()).to_ascii_lowercase()
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Option<String> {
    element
        .html_attributes()
        .flatten()
        .find(|attr| attr.key.as_ref().eq_ignore_ascii_case(name.as_bytes()))
        .map(|attr| {
            attr.unescape_value()
                .map(|value| value.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned())
        })
}

/// Reads every `<prompt-item search=".." sgid="..">` with its
/// `<template type="menu">` and `<template type="editor">` children.
pub fn parse_prompt_items(source: &str) -> Result<Vec<PromptItem>> {
    let mut reader = Reader::from_reader(source.as_bytes());
    reader.trim_text(false);
    reader.check_end_names(false);

    let mut items = Vec::new();
    let mut current: Option<PromptItem> = None;
    // (template type, where its content starts, nesting depth)
    let mut template: Option<(String, usize, usize)> = None;
    let mut buf = Vec::new();
    loop {
        let before = reader.buffer_position();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match name_of(e.name()).as_str() {
                "prompt-item" if template.is_none() => {
                    current = Some(PromptItem {
                        search: attribute(e, "search").unwrap_or_default(),
                        sgid: attribute(e, "sgid").filter(|sgid| !sgid.is_empty()),
                        ..PromptItem::default()
                    });
                }
                "template" => match template.as_mut() {
                    Some((_, _, depth)) => *depth += 1,
                    None => {
                        let kind = attribute(e, "type").unwrap_or_default();
                        template = Some((kind, reader.buffer_position(), 0));
                    }
                },
                _ => {}
            },
            Ok(Event::Empty(ref e)) if template.is_none() && name_of(e.name()) == "prompt-item" => {
                items.push(PromptItem {
                    search: attribute(e, "search").unwrap_or_default(),
                    sgid: attribute(e, "sgid").filter(|sgid| !sgid.is_empty()),
                    ..PromptItem::default()
                });
            }
            Ok(Event::End(ref e)) => match name_of(e.name()).as_str() {
                "template" => match template.take() {
                    Some((kind, start, 0)) => {
                        let content = source.get(start..before).unwrap_or_default().trim().to_string();
                        if let Some(item) = current.as_mut() {
                            match kind.as_str() {
                                "menu" => item.menu_markup = content,
                                "editor" => item.editor_markup = content,
                                _ => {}
                            }
                        }
                    }
                    Some((kind, start, depth)) => template = Some((kind, start, depth - 1)),
                    None => {}
                },
                "prompt-item" if template.is_none() => {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(EditorError::Source(format!(
                    "prompt items unreadable at position {}: {err}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(items)
}

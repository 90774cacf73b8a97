//! Layout-to-text fusion.
//!
//! The downstream index only embeds text, so layout structure is made
//! visible to the embedding and LLM stages as natural-language sentences
//! appended to each page rather than as structured metadata. Each
//! detected element contributes one sentence from a fixed per-label
//! template; the sentences are sorted lexicographically after generation
//! so fusion is deterministic regardless of detection order.
//!
//! Caption and footnote wording is driven by page-level *presence* of the
//! corresponding caption labels, not by association to a specific
//! table/figure box.

use crate::layout::{ElementLabel, LayoutElement};

/// Caption-ish labels present anywhere on the page.
#[derive(Debug, Default, Clone, Copy)]
struct PagePresence {
    table_caption: bool,
    table_footnote: bool,
    figure_caption: bool,
}

impl PagePresence {
    fn of(elements: &[LayoutElement]) -> Self {
        let mut presence = Self::default();
        for element in elements {
            match element.label {
                ElementLabel::TableCaption => presence.table_caption = true,
                ElementLabel::TableFootnote => presence.table_footnote = true,
                ElementLabel::FigureCaption => presence.figure_caption = true,
                _ => {}
            }
        }
        presence
    }
}

/// One descriptive sentence per detected element, sorted lexicographically.
pub fn page_descriptions(elements: &[LayoutElement]) -> Vec<String> {
    let presence = PagePresence::of(elements);
    let mut descriptions: Vec<String> = elements
        .iter()
        .map(|e| describe(e.label, presence))
        .collect();
    descriptions.sort();
    descriptions
}

/// Append the element descriptions beneath the page text. With no
/// elements the page text is returned unchanged.
pub fn fuse_page(page_text: &str, elements: &[LayoutElement]) -> String {
    let descriptions = page_descriptions(elements);
    if descriptions.is_empty() {
        return page_text.to_string();
    }
    format!("{}\n{}", page_text, descriptions.join("\n"))
}

fn describe(label: ElementLabel, page: PagePresence) -> String {
    match label {
        ElementLabel::Table => {
            let mut s = String::from("This page contains a table.");
            if page.table_caption {
                s.push_str(" The table is accompanied by a caption.");
            }
            if page.table_footnote {
                s.push_str(" The table has a footnote beneath it.");
            }
            s
        }
        ElementLabel::Figure => {
            let mut s = String::from("This page contains a figure.");
            if page.figure_caption {
                s.push_str(" The figure is accompanied by a caption.");
            }
            s
        }
        ElementLabel::Title => "This page contains a title heading.".to_string(),
        ElementLabel::PlainText => "This page contains a block of body text.".to_string(),
        ElementLabel::Abandon => "This page contains a header or footer region.".to_string(),
        ElementLabel::FigureCaption => {
            "This page contains a caption describing a figure.".to_string()
        }
        ElementLabel::TableCaption => {
            "This page contains a caption describing a table.".to_string()
        }
        ElementLabel::TableFootnote => {
            "This page contains a footnote attached to a table.".to_string()
        }
        ElementLabel::IsolateFormula => {
            "This page contains a standalone formula.".to_string()
        }
        ElementLabel::FormulaCaption => {
            "This page contains a caption describing a formula.".to_string()
        }
    }
}

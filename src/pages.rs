//! PDF page manipulation: keep, drop, rotate or reorder a selection of
//! pages, split a document into single pages and merge several into one.

use crate::{
    error::{ConvertError, ErrorKind},
    page_range,
};
use lopdf::{Document, Object, ObjectId, dictionary};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PageEdit {
    /// Keep only the selected pages.
    Extract { pages: String },
    /// Drop the selected pages.
    Remove { pages: String },
    /// Rotate the selected pages (all when unset) clockwise.
    Rotate { pages: Option<String>, degrees: i64 },
    /// Write the listed pages in the listed order; unlisted pages are dropped.
    Reorder { order: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEditSummary {
    pub pages_in: u32,
    pub pages_written: u32,
    pub selected: Vec<u32>,
}

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

const MAX_TREE_DEPTH: usize = 64;

fn pdf_failure(detail: String) -> ConvertError {
    ConvertError::ExhaustedFailed {
        attempts: 1,
        kind: ErrorKind::EngineFailure,
        detail,
    }
}

fn load(input: &Path) -> Result<Document, ConvertError> {
    Document::load(input).map_err(|e| pdf_failure(format!("cannot read {}: {e}", input.display())))
}

fn save(mut doc: Document, output: &Path) -> Result<(), ConvertError> {
    doc.compress();
    doc.save(output)
        .map_err(|e| pdf_failure(format!("cannot write {}: {e}", output.display())))?;
    Ok(())
}

pub fn page_count(input: &Path) -> Result<u32, ConvertError> {
    Ok(load(input)?.get_pages().len() as u32)
}

pub fn apply(input: &Path, output: &Path, edit: &PageEdit) -> Result<PageEditSummary, ConvertError> {
    let mut doc = load(input)?;
    let pages = doc.get_pages();
    let total = pages.len() as u32;

    let (selected, pages_written) = match edit {
        PageEdit::Extract { pages: spec } => {
            let sel = page_range::resolve(Some(spec.as_str()), total)?;
            let dropped: Vec<u32> = (1..=total).filter(|p| !sel.contains(*p)).collect();
            if !dropped.is_empty() {
                doc.delete_pages(&dropped);
                doc.prune_objects();
            }
            let kept = sel.len() as u32;
            (sel.pages().to_vec(), kept)
        }
        PageEdit::Remove { pages: spec } => {
            let sel = page_range::parse(spec, total);
            if sel.is_empty() || sel.len() as u32 >= total {
                return Err(ConvertError::PageSpecInvalid {
                    spec: spec.clone(),
                    total,
                });
            }
            doc.delete_pages(sel.pages());
            doc.prune_objects();
            let kept = total - sel.len() as u32;
            (sel.pages().to_vec(), kept)
        }
        PageEdit::Rotate { pages: spec, degrees } => {
            let degrees = degrees.rem_euclid(360);
            if !matches!(degrees, 90 | 180 | 270) {
                return Err(ConvertError::InvalidOption(format!(
                    "rotation must be a multiple of 90 degrees, got {degrees}"
                )));
            }
            let sel = page_range::resolve(spec.as_deref(), total)?;
            for (number, id) in &pages {
                if sel.contains(*number) {
                    rotate(&mut doc, *id, degrees)?;
                }
            }
            (sel.pages().to_vec(), total)
        }
        PageEdit::Reorder { order } => {
            let order = page_range::parse_order(order, total)?;
            flatten_page_tree(&mut doc);
            let ids: Vec<ObjectId> = order.iter().filter_map(|n| pages.get(n).copied()).collect();
            set_kids(&mut doc, &ids)?;
            doc.prune_objects();
            let written = order.len() as u32;
            (order, written)
        }
    };

    debug!("page edit selected {:?} of {}", selected, total);
    save(doc, output)?;

    Ok(PageEditSummary {
        pages_in: total,
        pages_written,
        selected,
    })
}

/// Writes every page of `input` to its own PDF under `out_dir`, named
/// `page-N.pdf` with N zero padded so lexical order is page order.
pub fn split(input: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    let pages = load(input)?.get_pages();
    if pages.is_empty() {
        return Err(pdf_failure(format!("{} has no pages", input.display())));
    }

    let width = pages.len().to_string().len();
    let mut written = Vec::with_capacity(pages.len());
    for (number, id) in &pages {
        // object ids are stable across loads of the same file
        let mut doc = load(input)?;
        flatten_page_tree(&mut doc);
        set_kids(&mut doc, &[*id])?;
        doc.prune_objects();
        let path = out_dir.join(format!("page-{number:0width$}.pdf"));
        save(doc, &path)?;
        written.push(path);
    }
    debug!("split {} into {} pages", input.display(), written.len());
    Ok(written)
}

/// Concatenates the pages of `inputs`, in order, into one PDF.
pub fn merge(inputs: &[PathBuf], output: &Path) -> Result<PageEditSummary, ConvertError> {
    if inputs.len() < 2 {
        return Err(ConvertError::InvalidOption(format!(
            "merge needs at least two PDFs, got {}",
            inputs.len()
        )));
    }

    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut kids: Vec<ObjectId> = Vec::new();

    for input in inputs {
        let mut doc = load(input)?;
        flatten_page_tree(&mut doc);
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;
        kids.extend(doc.get_pages().into_values());

        for (id, object) in doc.objects {
            // the merged document gets a fresh catalog and page tree
            let tree_node = matches!(
                object.type_name().unwrap_or_default(),
                b"Catalog" | b"Pages"
            );
            if !tree_node {
                merged.objects.insert(id, object);
            }
        }
    }

    let pages_id = (next_id, 0);
    let catalog_id = (next_id + 1, 0);
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => Object::Integer(0),
        }),
    );
    merged.objects.insert(
        catalog_id,
        Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        }),
    );
    merged.trailer.set("Root", Object::Reference(catalog_id));
    merged.max_id = catalog_id.0;

    set_kids(&mut merged, &kids)?;
    merged.prune_objects();

    let total = kids.len() as u32;
    debug!("merged {} files into {} pages", inputs.len(), total);
    save(merged, output)?;

    Ok(PageEditSummary {
        pages_in: total,
        pages_written: total,
        selected: (1..=total).collect(),
    })
}

fn rotate(doc: &mut Document, id: ObjectId, degrees: i64) -> Result<(), ConvertError> {
    let dict = doc
        .get_object_mut(id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| pdf_failure(format!("page object {id:?}: {e}")))?;
    let current = dict.get(b"Rotate").and_then(Object::as_i64).unwrap_or(0);
    dict.set(
        "Rotate",
        Object::Integer((current.rem_euclid(360) + degrees).rem_euclid(360)),
    );
    Ok(())
}

/// Nearest ancestor value of an inheritable attribute.
fn inherited(doc: &Document, page: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = doc.get_dictionary(page).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
    }
    None
}

/// Copies inherited attributes onto every page so pages can be re-parented
/// without changing how they render.
fn flatten_page_tree(doc: &mut Document) {
    for id in doc.get_pages().into_values() {
        let missing: Vec<(&[u8], Object)> = INHERITABLE
            .iter()
            .filter(|key| !doc.get_dictionary(id).is_ok_and(|d| d.has(key)))
            .filter_map(|key| inherited(doc, id, key).map(|value| (*key, value)))
            .collect();
        if missing.is_empty() {
            continue;
        }
        if let Ok(dict) = doc.get_object_mut(id).and_then(Object::as_dict_mut) {
            for (key, value) in missing {
                dict.set(key, value);
            }
        }
    }
}

/// Makes `pages` the only children of the root page tree node. Nodes and
/// pages no longer reachable are left for `prune_objects`.
fn set_kids(doc: &mut Document, pages: &[ObjectId]) -> Result<(), ConvertError> {
    let root = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .and_then(|catalog| doc.get_dictionary(catalog))
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|e| pdf_failure(format!("page tree root: {e}")))?;

    let kids: Vec<Object> = pages.iter().map(|id| Object::Reference(*id)).collect();
    let node = doc
        .get_object_mut(root)
        .and_then(Object::as_dict_mut)
        .map_err(|e| pdf_failure(format!("page tree root {root:?}: {e}")))?;
    node.set("Kids", kids);
    node.set("Count", Object::Integer(pages.len() as i64));

    for id in pages {
        let page = doc
            .get_object_mut(*id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| pdf_failure(format!("page object {id:?}: {e}")))?;
        page.set("Parent", Object::Reference(root));
    }
    Ok(())
}

//! Permissive page-selection parsing.
//!
//! Grammar: comma separated tokens, each a page number or an `a-b` range
//! (reversed bounds are swapped). Tokens outside the grammar are dropped.
//! A spec without commas or hyphens is scanned for digit runs instead, so
//! `"1 3 5"` and `"page 4"` both work. The result is sorted, deduplicated
//! and clamped to `1..=total_pages`.

use crate::error::ConvertError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::num::IntErrorKind;
use std::sync::OnceLock;

/// Strictly increasing, 1-based page numbers within the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRangeSpec {
    pages: Vec<u32>,
}

impl PageRangeSpec {
    pub fn all(total_pages: u32) -> Self {
        Self {
            pages: (1..=total_pages).collect(),
        }
    }

    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pages.binary_search(&page).is_ok()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

fn digits() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("static regex"))
}

/// Page number as written, saturating numbers too large for any document.
fn page_number(raw: &str) -> Option<u64> {
    match raw.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => Some(u64::MAX),
        Err(_) => None,
    }
}

pub fn parse(spec: &str, total_pages: u32) -> PageRangeSpec {
    let mut set = BTreeSet::new();
    if total_pages == 0 {
        return PageRangeSpec { pages: Vec::new() };
    }

    if !spec.contains(',') && !spec.contains('-') {
        for m in digits().find_iter(spec) {
            if let Some(n) = page_number(m.as_str()) {
                if (1..=u64::from(total_pages)).contains(&n) {
                    set.insert(n as u32);
                }
            }
        }
        return PageRangeSpec {
            pages: set.into_iter().collect(),
        };
    }

    for token in spec.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some((a, b)) = token.split_once('-') {
            let (Some(a), Some(b)) = (page_number(a), page_number(b)) else {
                continue;
            };
            let (lo, hi) = if a > b { (b, a) } else { (a, b) };
            let lo = lo.max(1);
            let hi = hi.min(u64::from(total_pages));
            if lo <= hi {
                set.extend(lo as u32..=hi as u32);
            }
        } else if let Some(n) = page_number(token) {
            if (1..=u64::from(total_pages)).contains(&n) {
                set.insert(n as u32);
            }
        }
    }

    PageRangeSpec {
        pages: set.into_iter().collect(),
    }
}

/// Explicit page order, e.g. `"3,1,2"` or `"4-2, 1"`.
///
/// Unlike [`parse`] this is strict: every token must name pages inside the
/// document, ranges expand in the direction written and no page may appear
/// twice. Pages left out of the order are dropped.
pub fn parse_order(spec: &str, total_pages: u32) -> Result<Vec<u32>, ConvertError> {
    let invalid = || ConvertError::PageSpecInvalid {
        spec: spec.to_string(),
        total: total_pages,
    };
    let in_doc = |n: u64| (1..=u64::from(total_pages)).contains(&n);

    let mut order = Vec::new();
    let mut seen = BTreeSet::new();
    for token in spec.split(|c: char| c == ',' || c.is_whitespace()) {
        if token.is_empty() {
            continue;
        }
        let run: Vec<u32> = match token.split_once('-') {
            Some((a, b)) => {
                let (Some(a), Some(b)) = (page_number(a), page_number(b)) else {
                    return Err(invalid());
                };
                if !in_doc(a) || !in_doc(b) {
                    return Err(invalid());
                }
                let (a, b) = (a as u32, b as u32);
                if a <= b {
                    (a..=b).collect()
                } else {
                    (b..=a).rev().collect()
                }
            }
            None => match page_number(token) {
                Some(n) if in_doc(n) => vec![n as u32],
                _ => return Err(invalid()),
            },
        };
        for page in run {
            if !seen.insert(page) {
                return Err(invalid());
            }
            order.push(page);
        }
    }

    if order.is_empty() {
        return Err(invalid());
    }
    Ok(order)
}

/// Call-site resolution of an optional user selection.
///
/// Absent, blank or digit-free specs select every page. A spec that named
/// pages but none of them survived clamping is rejected.
pub fn resolve(spec: Option<&str>, total_pages: u32) -> Result<PageRangeSpec, ConvertError> {
    let raw = spec.map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return Ok(PageRangeSpec::all(total_pages));
    }
    let parsed = parse(raw, total_pages);
    if !parsed.is_empty() {
        return Ok(parsed);
    }
    if digits().is_match(raw) {
        Err(ConvertError::PageSpecInvalid {
            spec: raw.to_string(),
            total: total_pages,
        })
    } else {
        Ok(PageRangeSpec::all(total_pages))
    }
}

//! Page range expressions and page selections
//!
//! Turns free text such as `"1, 3-5, 8"` into zero-based page indices. Page
//! numbers in the text are 1-based, the way they are shown to the user.
//! Malformed or out-of-range tokens contribute nothing: parsing never fails.

use serde::Serialize;
use std::collections::BTreeSet;

/// Parse a page range expression into sorted unique zero-based page indices.
///
/// Comma-separated tokens are either a single page (`"5"`) or a range
/// (`"3-8"`, `"8-3"`). Range portions outside `[1, max_page]` are clipped.
pub fn parse_page_range(input: &str, max_page: u32) -> Vec<u32> {
    let mut pages = BTreeSet::new();
    let max = i64::from(max_page);

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if part.contains('-') {
            // Only the first two pieces count: "1-4-9" reads as "1-4"
            let mut bounds = part.split('-');
            let start = bounds.next().and_then(leading_integer);
            let end = bounds.next().and_then(leading_integer);
            let (Some(start), Some(end)) = (start, end) else {
                continue;
            };

            let low = start.min(end).max(1);
            let high = start.max(end).min(max);
            for page in low..=high {
                pages.insert((page - 1) as u32);
            }
        } else if let Some(page) = leading_integer(part) {
            if (1..=max).contains(&page) {
                pages.insert((page - 1) as u32);
            }
        }
    }

    pages.into_iter().collect()
}

/// Read the integer at the start of `text`.
///
/// Leading whitespace and one sign are accepted, then the longest run of
/// decimal digits; anything after it is ignored. `None` when there are no
/// digits.
fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let run = digits.bytes().take_while(u8::is_ascii_digit).count();
    if run == 0 {
        return None;
    }

    let value = digits[..run].bytes().fold(0i64, |acc, d| {
        acc.saturating_mul(10).saturating_add(i64::from(d - b'0'))
    });
    Some(if negative { -value } else { value })
}

/// A set of selected pages (zero-based) within a document of known length
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageSelection {
    pages: BTreeSet<u32>,
    page_count: u32,
}

impl PageSelection {
    /// Empty selection for a document with `page_count` pages
    pub fn new(page_count: u32) -> Self {
        Self {
            pages: BTreeSet::new(),
            page_count,
        }
    }

    /// Selection described by a page range expression
    pub fn from_expression(input: &str, page_count: u32) -> Self {
        let mut selection = Self::new(page_count);
        selection.replace_with(parse_page_range(input, page_count));
        selection
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Flip membership of `index`. Indices outside the document are ignored.
    pub fn toggle(&mut self, index: u32) {
        if index >= self.page_count {
            return;
        }
        if !self.pages.remove(&index) {
            self.pages.insert(index);
        }
    }

    pub fn select_all(&mut self) {
        self.pages = (0..self.page_count).collect();
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// Replace the selection, dropping indices outside the document
    pub fn replace_with<I: IntoIterator<Item = u32>>(&mut self, indices: I) {
        let page_count = self.page_count;
        self.pages = indices.into_iter().filter(|&i| i < page_count).collect();
    }

    pub fn contains(&self, index: u32) -> bool {
        self.pages.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Selected indices in ascending order
    pub fn indices(&self) -> Vec<u32> {
        self.pages.iter().copied().collect()
    }
}

//! Reference to the immutable source document

use crate::coords::Size;
use serde::{Deserialize, Serialize};

/// What the overlay needs to know about the source PDF: its pages and their
/// intrinsic sizes in page-space units. The bytes themselves live elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub title: String,
    #[serde(default)]
    pub source_url: Option<String>,
    pub page_sizes: Vec<Size>,
}

impl DocumentRef {
    pub fn new(title: impl Into<String>, page_sizes: Vec<Size>) -> Self {
        Self {
            title: title.into(),
            source_url: None,
            page_sizes,
        }
    }

    /// A document whose pages all share one size
    pub fn uniform(title: impl Into<String>, page_count: u32, size: Size) -> Self {
        Self::new(title, vec![size; page_count as usize])
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    /// Size of a 1-based page
    pub fn page_size(&self, page: u32) -> Option<Size> {
        let index = page.checked_sub(1)? as usize;
        self.page_sizes.get(index).copied()
    }

    pub fn contains_page(&self, page: u32) -> bool {
        page >= 1 && page <= self.page_count()
    }
}

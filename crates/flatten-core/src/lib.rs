//! Flattening of overlay fields into PDF page content
//!
//! Text values are drawn with a standard font, checked boxes get a tick and
//! signature images become image XObjects. The source bytes are never
//! modified; a new document is returned.

pub mod encoding;
pub mod error;
pub mod flatten;
pub mod image;
pub mod page;

#[cfg(test)]
mod fixtures;

pub use error::FlattenError;
pub use flatten::{flatten, flatten_async, flatten_with, FlattenOptions};
pub use page::inspect;

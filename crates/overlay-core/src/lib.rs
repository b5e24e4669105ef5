//! PDF field overlay model
//!
//! Fields are placed on top of a source document in page space (origin at
//! the top-left of each page, y growing downward). The [`FieldRegistry`] owns
//! the field set and validates every mutation, and the [`Reconciler`] keeps
//! it in sync with a remote [`FieldStore`].
//!
//! ```
//! use overlay_core::{DocumentRef, FieldRegistry, FieldType, Point, RecipientId, Size};
//!
//! let mut registry = FieldRegistry::new(DocumentRef::uniform("Lease", 2, Size::letter()));
//! let field = registry
//!     .add(FieldType::Signature, 1, Point::new(72.0, 600.0), RecipientId::new("tenant"))
//!     .unwrap();
//! assert!(field.id.is_local());
//! assert_eq!(registry.by_page(1).len(), 1);
//! ```

pub mod coords;
pub mod document;
pub mod error;
pub mod field;
pub mod interaction;
pub mod reconcile;
pub mod registry;
pub mod store;

pub use coords::{DragGrab, Point, ResizeGrab, Size};
pub use document::DocumentRef;
pub use error::{StoreError, ValidationError};
pub use field::{
    is_checked, Field, FieldAttributes, FieldId, FieldPatch, FieldRecord, FieldType, LocalId,
    RecipientId, RemoteId, SignatureImage,
};
pub use interaction::{DragItem, DropEvent, PageView};
pub use reconcile::{shared, Reconciler, SaveReport, SharedRegistry, SyncFailure, SyncOp};
pub use registry::{Access, FieldRegistry};
pub use store::{DocumentId, FieldStore, MemoryStore, StoreCall};

#[cfg(feature = "http")]
pub use store::HttpFieldStore;

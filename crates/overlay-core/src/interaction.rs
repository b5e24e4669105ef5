//! Glue between the drag-and-drop layer and the registry
//!
//! The interaction layer reports pointer positions in viewport space. These
//! helpers convert them with the page's current origin and zoom before
//! touching the registry.

use crate::coords::{to_page_space, DragGrab, Point, ResizeGrab};
use crate::error::ValidationError;
use crate::field::{FieldId, FieldType, RecipientId};
use crate::registry::FieldRegistry;
use serde::{Deserialize, Serialize};

/// Where a rendered page currently sits and how it is zoomed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageView {
    /// Top-left corner of the page element in viewport space
    pub origin: Point,
    pub scale: f64,
}

impl PageView {
    pub fn new(origin: Point, scale: f64) -> Self {
        Self { origin, scale }
    }
}

/// What is being dragged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DragItem {
    /// A field type from the palette
    Palette {
        field_type: FieldType,
        recipient_id: RecipientId,
    },
    /// A field already on a page, with the grab offset taken at drag start
    Placed { id: FieldId, grab: DragGrab },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropEvent {
    pub page: u32,
    pub pointer: Point,
    pub item: DragItem,
}

impl FieldRegistry {
    /// Start dragging a placed field. Returns `None` when the id is unknown.
    pub fn begin_drag(&self, id: &FieldId, pointer: Point, view: PageView) -> Option<DragItem> {
        let field = self.get(id)?;
        Some(DragItem::Placed {
            id: id.clone(),
            grab: DragGrab::begin(pointer, field.position, view.origin, view.scale),
        })
    }

    /// Apply a drop onto `event.page` rendered with `view`.
    ///
    /// Palette drops create a field with its top-left at the pointer; placed
    /// fields keep the offset at which they were grabbed. Returns the id of
    /// the created or moved field.
    pub fn apply_drop(
        &mut self,
        event: &DropEvent,
        view: PageView,
    ) -> Result<FieldId, ValidationError> {
        match &event.item {
            DragItem::Palette {
                field_type,
                recipient_id,
            } => {
                let position = to_page_space(event.pointer, view.origin, view.scale);
                let field = self.add(*field_type, event.page, position, recipient_id.clone())?;
                Ok(field.id)
            }
            DragItem::Placed { id, grab } => {
                let position = grab.drop_position(event.pointer, view.origin, view.scale);
                self.move_to(id, event.page, position)?;
                Ok(id.clone())
            }
        }
    }

    /// Grab a field's resize handle. Returns `None` when the id is unknown.
    pub fn begin_resize(&self, id: &FieldId) -> Option<ResizeGrab> {
        self.get(id).map(|field| ResizeGrab::begin(field.size))
    }

    /// Resize from a pointer drag on the resize handle. `pointer_delta` is
    /// measured from where the handle was grabbed, so repeated updates during
    /// one gesture do not accumulate.
    pub fn resize_with_pointer(
        &mut self,
        id: &FieldId,
        grab: ResizeGrab,
        pointer_delta: Point,
        scale: f64,
    ) -> Result<(), ValidationError> {
        self.resize(id, grab.size_for(pointer_delta, scale))
    }
}

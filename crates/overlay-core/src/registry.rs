//! In-memory field registry
//!
//! The registry is the single owner of the field set for one document. Every
//! mutation goes through it so page bounds, geometry clamping and recipient
//! ownership are checked in one place. A rejected mutation leaves the
//! registry untouched.

use crate::coords::{clamp_size, clamp_to_page, Point, Size};
use crate::document::DocumentRef;
use crate::error::ValidationError;
use crate::field::{
    Field, FieldId, FieldPatch, FieldRecord, FieldType, LocalId, RecipientId, RemoteId,
    SignatureImage,
};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Who is mutating the registry
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Access {
    /// Document owner: may place, edit and remove any field
    #[default]
    Editor,
    /// A signer or public-form user: limited to fields assigned to them
    Recipient(RecipientId),
}

#[derive(Debug, Clone)]
pub struct FieldRegistry {
    document: DocumentRef,
    access: Access,
    roster: Option<BTreeSet<RecipientId>>,
    fields: Vec<Field>,
}

impl FieldRegistry {
    pub fn new(document: DocumentRef) -> Self {
        Self {
            document,
            access: Access::Editor,
            roster: None,
            fields: Vec::new(),
        }
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Restrict assignments to a known set of recipients
    pub fn with_recipients<I>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = RecipientId>,
    {
        self.roster = Some(recipients.into_iter().collect());
        self
    }

    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    pub fn access(&self) -> &Access {
        &self.access
    }

    /// Place a new field. It gets a fresh local id, the default size for its
    /// type and no value.
    pub fn add(
        &mut self,
        field_type: FieldType,
        page: u32,
        position: Point,
        recipient_id: RecipientId,
    ) -> Result<Field, ValidationError> {
        let page_size = self.page_size(page)?;
        self.check_assignment(&recipient_id)?;

        let position = clamp_to_page(position, page_size);
        let mut field = Field::new(
            FieldId::Local(LocalId::generate()),
            field_type,
            page,
            position,
            recipient_id,
        );
        field.size = clamp_size(position, field.size, page_size);

        debug!(id = %field.id, %field_type, page, "Field added");
        self.fields.push(field.clone());
        Ok(field)
    }

    /// Merge `patch` into a field
    pub fn update(&mut self, id: &FieldId, patch: FieldPatch) -> Result<(), ValidationError> {
        let index = self
            .index_of(id)
            .ok_or_else(|| ValidationError::UnknownField(id.clone()))?;
        let current = &self.fields[index];
        self.check_ownership(current)?;

        let updated = self.apply_patch(current, patch)?;
        debug!(%id, page = updated.page, "Field updated");
        self.fields[index] = updated;
        Ok(())
    }

    /// Delete a field. Removing an id that is not present is a no-op.
    pub fn remove(&mut self, id: &FieldId) -> Result<Option<Field>, ValidationError> {
        let Some(index) = self.index_of(id) else {
            return Ok(None);
        };
        self.check_ownership(&self.fields[index])?;
        debug!(%id, "Field removed");
        Ok(Some(self.fields.remove(index)))
    }

    pub fn move_to(
        &mut self,
        id: &FieldId,
        page: u32,
        position: Point,
    ) -> Result<(), ValidationError> {
        self.update(id, FieldPatch::default().page(page).position(position))
    }

    pub fn resize(&mut self, id: &FieldId, size: Size) -> Result<(), ValidationError> {
        self.update(id, FieldPatch::default().size(size))
    }

    pub fn set_value(&mut self, id: &FieldId, value: Option<String>) -> Result<(), ValidationError> {
        self.update(id, FieldPatch::default().value(value))
    }

    pub fn set_signature(
        &mut self,
        id: &FieldId,
        signature: Option<SignatureImage>,
    ) -> Result<(), ValidationError> {
        self.update(id, FieldPatch::default().signature(signature))
    }

    pub fn get(&self, id: &FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| &f.id == id)
    }

    /// Fields on one page, in insertion order
    pub fn by_page(&self, page: u32) -> Vec<&Field> {
        self.fields.iter().filter(|f| f.page == page).collect()
    }

    /// Fields assigned to one recipient, in insertion order
    pub fn by_recipient(&self, recipient: &RecipientId) -> Vec<&Field> {
        self.fields
            .iter()
            .filter(|f| &f.recipient_id == recipient)
            .collect()
    }

    /// Required fields of `recipient` that have nothing filled in yet
    pub fn missing_required(&self, recipient: &RecipientId) -> Vec<&Field> {
        self.fields
            .iter()
            .filter(|f| &f.recipient_id == recipient && f.required && !f.is_filled())
            .collect()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Replace a local id with the id the store assigned.
    ///
    /// Returns false when the field was removed in the meantime.
    pub(crate) fn migrate_id(&mut self, local: LocalId, remote: RemoteId) -> bool {
        let local = FieldId::Local(local);
        match self.fields.iter_mut().find(|f| f.id == local) {
            Some(field) => {
                debug!(%local, %remote, "Field id migrated");
                field.id = FieldId::Remote(remote);
                true
            }
            None => false,
        }
    }

    /// Replace the whole field set with stored records.
    ///
    /// Records on pages the document does not have are skipped. Returns the
    /// ids that were loaded.
    pub fn load_records<I>(&mut self, records: I) -> Vec<RemoteId>
    where
        I: IntoIterator<Item = FieldRecord>,
    {
        let mut loaded = Vec::new();
        self.fields.clear();
        for record in records {
            if !self.document.contains_page(record.attributes.page) {
                warn!(
                    id = %record.id,
                    page = record.attributes.page,
                    "Skipping stored field on a page the document does not have"
                );
                continue;
            }
            loaded.push(record.id.clone());
            self.fields.push(Field::from_record(record));
        }
        loaded
    }

    fn index_of(&self, id: &FieldId) -> Option<usize> {
        self.fields.iter().position(|f| &f.id == id)
    }

    fn page_size(&self, page: u32) -> Result<Size, ValidationError> {
        self.document
            .page_size(page)
            .ok_or(ValidationError::PageOutOfRange {
                page,
                page_count: self.document.page_count(),
            })
    }

    fn check_assignment(&self, recipient: &RecipientId) -> Result<(), ValidationError> {
        if let Access::Recipient(actor) = &self.access {
            if actor != recipient {
                return Err(ValidationError::RecipientMismatch {
                    owner: recipient.clone(),
                    actor: actor.clone(),
                });
            }
        }
        match &self.roster {
            Some(roster) if !roster.contains(recipient) => {
                Err(ValidationError::UnknownRecipient(recipient.clone()))
            }
            _ => Ok(()),
        }
    }

    fn check_ownership(&self, field: &Field) -> Result<(), ValidationError> {
        match &self.access {
            Access::Recipient(actor) if actor != &field.recipient_id => {
                Err(ValidationError::RecipientMismatch {
                    owner: field.recipient_id.clone(),
                    actor: actor.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn apply_patch(&self, current: &Field, patch: FieldPatch) -> Result<Field, ValidationError> {
        let mut field = current.clone();

        if let Some(requested) = patch.field_type {
            if requested != field.field_type {
                return Err(ValidationError::ImmutableType {
                    current: field.field_type,
                    requested,
                });
            }
        }

        if let Some(recipient) = patch.recipient_id {
            if recipient != field.recipient_id {
                self.check_assignment(&recipient)?;
                field.recipient_id = recipient;
            }
        }

        let geometry_changed =
            patch.page.is_some() || patch.position.is_some() || patch.size.is_some();
        if let Some(page) = patch.page {
            field.page = page;
        }
        if geometry_changed {
            let page_size = self.page_size(field.page)?;
            field.position = clamp_to_page(patch.position.unwrap_or(field.position), page_size);
            field.size = clamp_size(field.position, patch.size.unwrap_or(field.size), page_size);
        }

        if let Some(value) = patch.value {
            if value.is_some() && field.field_type.is_signature() {
                return Err(ValidationError::ValueNotAllowed(field.field_type));
            }
            field.value = value;
        }

        if let Some(signature) = patch.signature_data {
            if signature.is_some() && !field.field_type.is_signature() {
                return Err(ValidationError::SignatureNotAllowed(field.field_type));
            }
            field.signature_data = signature;
        }

        if let Some(label) = patch.label {
            field.label = label;
        }
        if let Some(required) = patch.required {
            field.required = required;
        }
        if let Some(options) = patch.options {
            field.options = options;
        }

        if field.field_type == FieldType::Dropdown && !field.options.is_empty() {
            if let Some(value) = &field.value {
                if !field.options.iter().any(|o| o == value) {
                    return Err(ValidationError::InvalidOption {
                        value: value.clone(),
                    });
                }
            }
        }

        Ok(field)
    }
}

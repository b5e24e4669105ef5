//! Field data model
//!
//! A [`Field`] is identified by a [`FieldId`] that is either local (generated
//! here, never persisted) or remote (assigned by the field store on create).
//! The tag is explicit so nothing has to guess from the shape of the string.

use crate::coords::{Point, Size};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Client-side id for a field the store has not seen yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(Uuid);

impl LocalId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id assigned by the remote field store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FieldId {
    Local(LocalId),
    Remote(RemoteId),
}

impl FieldId {
    pub fn is_local(&self) -> bool {
        matches!(self, FieldId::Local(_))
    }

    pub fn as_remote(&self) -> Option<&RemoteId> {
        match self {
            FieldId::Remote(id) => Some(id),
            FieldId::Local(_) => None,
        }
    }
}

impl From<LocalId> for FieldId {
    fn from(id: LocalId) -> Self {
        FieldId::Local(id)
    }
}

impl From<RemoteId> for FieldId {
    fn from(id: RemoteId) -> Self {
        FieldId::Remote(id)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldId::Local(id) => write!(f, "local:{}", id),
            FieldId::Remote(id) => write!(f, "{}", id),
        }
    }
}

/// The party a field is assigned to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(String);

impl RecipientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Date,
    Signature,
    Checkbox,
    Dropdown,
    Name,
    Email,
}

impl FieldType {
    pub const ALL: [FieldType; 7] = [
        FieldType::Text,
        FieldType::Date,
        FieldType::Signature,
        FieldType::Checkbox,
        FieldType::Dropdown,
        FieldType::Name,
        FieldType::Email,
    ];

    /// Default dimensions for a freshly dropped field (width, height)
    pub fn default_size(&self) -> Size {
        match self {
            FieldType::Signature => Size::new(200.0, 60.0),
            FieldType::Text | FieldType::Name | FieldType::Dropdown => Size::new(150.0, 30.0),
            FieldType::Email => Size::new(180.0, 30.0),
            FieldType::Date => Size::new(120.0, 30.0),
            FieldType::Checkbox => Size::new(24.0, 24.0),
        }
    }

    pub fn is_signature(&self) -> bool {
        matches!(self, FieldType::Signature)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Date => "date",
            FieldType::Signature => "signature",
            FieldType::Checkbox => "checkbox",
            FieldType::Dropdown => "dropdown",
            FieldType::Name => "name",
            FieldType::Email => "email",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a checkbox value means "checked"
pub fn is_checked(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "checked" | "yes" | "on" | "1" | "x"
    )
}

/// Encoded raster produced by the signature capture surface.
///
/// Held as a data URL (`data:image/png;base64,...`); bare base64 is accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureImage(String);

impl SignatureImage {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn from_png(bytes: &[u8]) -> Self {
        Self(format!("data:image/png;base64,{}", BASE64.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Media type declared by the data URL, if any
    pub fn media_type(&self) -> Option<&str> {
        let rest = self.0.strip_prefix("data:")?;
        let end = rest.find([';', ','])?;
        Some(&rest[..end])
    }

    /// Decode the base64 payload into raw image bytes
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let payload = match self.0.split_once(',') {
            Some((header, data)) if header.starts_with("data:") => data,
            _ => self.0.as_str(),
        };
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        BASE64.decode(compact)
    }
}

/// Everything about a field except its identity; this is what the store persists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldAttributes {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub page: u32,
    #[serde(flatten)]
    pub position: Point,
    #[serde(flatten)]
    pub size: Size,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub signature_data: Option<SignatureImage>,
    pub recipient_id: RecipientId,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

/// A field as listed by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub id: RemoteId,
    #[serde(flatten)]
    pub attributes: FieldAttributes,
}

/// A placed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: FieldId,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub page: u32,
    pub position: Point,
    pub size: Size,
    pub value: Option<String>,
    pub signature_data: Option<SignatureImage>,
    pub recipient_id: RecipientId,
    pub label: Option<String>,
    pub required: bool,
    pub options: Vec<String>,
}

impl Field {
    /// An unfilled field with the default size for its type
    pub fn new(
        id: FieldId,
        field_type: FieldType,
        page: u32,
        position: Point,
        recipient_id: RecipientId,
    ) -> Self {
        Self {
            id,
            field_type,
            page,
            position,
            size: field_type.default_size(),
            value: None,
            signature_data: None,
            recipient_id,
            label: None,
            required: false,
            options: Vec::new(),
        }
    }

    pub fn from_record(record: FieldRecord) -> Self {
        let FieldRecord { id, attributes } = record;
        Self {
            id: FieldId::Remote(id),
            field_type: attributes.field_type,
            page: attributes.page,
            position: attributes.position,
            size: attributes.size,
            value: attributes.value,
            signature_data: attributes.signature_data,
            recipient_id: attributes.recipient_id,
            label: attributes.label,
            required: attributes.required,
            options: attributes.options,
        }
    }

    pub fn attributes(&self) -> FieldAttributes {
        FieldAttributes {
            field_type: self.field_type,
            page: self.page,
            position: self.position,
            size: self.size,
            value: self.value.clone(),
            signature_data: self.signature_data.clone(),
            recipient_id: self.recipient_id.clone(),
            label: self.label.clone(),
            required: self.required,
            options: self.options.clone(),
        }
    }

    /// Whether the field carries something to draw
    pub fn is_filled(&self) -> bool {
        match self.field_type {
            FieldType::Signature => self.signature_data.is_some(),
            FieldType::Checkbox => self.value.as_deref().is_some_and(is_checked),
            _ => self
                .value
                .as_deref()
                .is_some_and(|v| !v.trim().is_empty()),
        }
    }
}

/// Partial update for [`crate::FieldRegistry::update`]
///
/// `value`, `signature_data` and `label` are doubly optional: `Some(None)` clears.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPatch {
    pub field_type: Option<FieldType>,
    pub page: Option<u32>,
    pub position: Option<Point>,
    pub size: Option<Size>,
    pub value: Option<Option<String>>,
    pub signature_data: Option<Option<SignatureImage>>,
    pub recipient_id: Option<RecipientId>,
    pub label: Option<Option<String>>,
    pub required: Option<bool>,
    pub options: Option<Vec<String>>,
}

impl FieldPatch {
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn position(mut self, position: Point) -> Self {
        self.position = Some(position);
        self
    }

    pub fn size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn value(mut self, value: Option<String>) -> Self {
        self.value = Some(value);
        self
    }

    pub fn signature(mut self, signature: Option<SignatureImage>) -> Self {
        self.signature_data = Some(signature);
        self
    }

    pub fn recipient(mut self, recipient: RecipientId) -> Self {
        self.recipient_id = Some(recipient);
        self
    }

    pub fn label(mut self, label: Option<String>) -> Self {
        self.label = Some(label);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }
}

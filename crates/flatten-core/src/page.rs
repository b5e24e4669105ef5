//! Page geometry and resources

use crate::error::FlattenError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use overlay_core::{DocumentRef, Size};

/// US Letter, used when a page has no usable MediaBox
const DEFAULT_MEDIA_BOX: PageBox = PageBox {
    llx: 0.0,
    lly: 0.0,
    width: 612.0,
    height: 792.0,
};

/// A page's MediaBox as origin plus extent, in PDF units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub llx: f64,
    pub lly: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// PDF-space bottom edge of a box whose top edge sits at page-space `y`
    pub fn bottom_of(&self, y: f64, height: f64) -> f64 {
        self.lly + overlay_core::coords::invert_y(y, height, self.height)
    }
}

/// Walk up the page tree until a MediaBox is found
pub fn media_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let Ok(dict) = doc.get_object(id).and_then(|o| o.as_dict()) else {
            break;
        };
        if let Some(found) = extract_media_box(doc, dict) {
            return found;
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
    }
    DEFAULT_MEDIA_BOX
}

fn extract_media_box(doc: &Document, dict: &Dictionary) -> Option<PageBox> {
    let raw = dict.get(b"MediaBox").ok()?;
    let arr = resolve(doc, raw).as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let llx = obj_to_f64(resolve(doc, &arr[0]))?;
    let lly = obj_to_f64(resolve(doc, &arr[1]))?;
    let urx = obj_to_f64(resolve(doc, &arr[2]))?;
    let ury = obj_to_f64(resolve(doc, &arr[3]))?;
    let (width, height) = ((urx - llx).abs(), (ury - lly).abs());
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    Some(PageBox {
        llx: llx.min(urx),
        lly: lly.min(ury),
        width,
        height,
    })
}

fn obj_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some((*f).into()),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// The page's effective resources as an owned dictionary.
///
/// Inherited and indirect dictionaries are copied, and so are the `Font`
/// and `XObject` sub-dictionaries, so adding entries never touches objects
/// other pages may share.
pub fn owned_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|obj| resolve(doc, obj).as_dict().ok())
        .cloned()
        .unwrap_or_default();

    for key in [&b"Font"[..], &b"XObject"[..]] {
        let owned = resources
            .get(key)
            .ok()
            .and_then(|obj| resolve(doc, obj).as_dict().ok())
            .cloned();
        if let Some(dict) = owned {
            resources.set(key.to_vec(), Object::Dictionary(dict));
        }
    }
    resources
}

fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let dict = doc.get_object(id).and_then(|o| o.as_dict()).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict.get(b"Parent").and_then(|p| p.as_reference()).ok();
    }
    None
}

/// Return the sub-dictionary under `key`, creating it when absent or malformed
pub fn ensure_sub_dict<'a>(
    resources: &'a mut Dictionary,
    key: &[u8],
) -> Result<&'a mut Dictionary, FlattenError> {
    if !matches!(resources.get(key), Ok(Object::Dictionary(_))) {
        resources.set(key.to_vec(), Object::Dictionary(Dictionary::new()));
    }
    match resources.get_mut(key) {
        Ok(Object::Dictionary(dict)) => Ok(dict),
        _ => Err(FlattenError::OperationError(format!(
            "resources entry {} is not a dictionary",
            String::from_utf8_lossy(key)
        ))),
    }
}

/// First name of the form `{prefix}{n}` not yet used in `dict`
pub fn unused_name(dict: &Dictionary, prefix: &str) -> String {
    (1..)
        .map(|n| format!("{}{}", prefix, n))
        .find(|name| !dict.has(name.as_bytes()))
        .unwrap_or_else(|| prefix.to_string())
}

/// Page count, page sizes and title of a PDF
pub fn inspect(bytes: &[u8]) -> Result<DocumentRef, FlattenError> {
    let doc = Document::load_mem(bytes).map_err(|e| FlattenError::ParseError(e.to_string()))?;
    let page_sizes = doc
        .get_pages()
        .values()
        .map(|&id| media_box(&doc, id).size())
        .collect();
    let title = document_title(&doc).unwrap_or_else(|| "Untitled".to_string());
    Ok(DocumentRef::new(title, page_sizes))
}

fn document_title(doc: &Document) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let info = resolve(doc, info).as_dict().ok()?;
    let Object::String(raw, _) = resolve(doc, info.get(b"Title").ok()?) else {
        return None;
    };
    let title = decode_text_string(raw);
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// UTF-16BE when the BOM is present, otherwise one char per byte
fn decode_text_string(raw: &[u8]) -> String {
    match raw.strip_prefix(&[0xFE, 0xFF]) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => raw.iter().map(|&b| b as char).collect(),
    }
}

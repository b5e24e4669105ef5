//! Burn field values into page content

use crate::encoding::to_win_ansi;
use crate::error::FlattenError;
use crate::image::{add_image_xobject, decode_png};
use crate::page::{ensure_sub_dict, media_box, owned_resources, unused_name, PageBox};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use overlay_core::{Field, FieldType};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// How text and check marks are drawn
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenOptions {
    pub font_size: f64,
    /// Inset of the text baseline from the field's left and bottom edges
    pub padding: f64,
    /// One of the standard 14 fonts
    pub base_font: String,
    /// RGB, each component in 0..=1
    pub text_color: [f64; 3],
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            font_size: 10.0,
            padding: 2.0,
            base_font: "Helvetica".to_string(),
            text_color: [0.0, 0.0, 0.0],
        }
    }
}

/// Flatten with [`FlattenOptions::default`]
pub fn flatten(source: &[u8], fields: &[Field]) -> Result<Vec<u8>, FlattenError> {
    flatten_with(source, fields, &FlattenOptions::default())
}

/// Draw every filled field onto its page and return the new document.
///
/// Fields on pages the document does not have, and fields with nothing to
/// draw, are skipped. `source` is only read.
pub fn flatten_with(
    source: &[u8],
    fields: &[Field],
    options: &FlattenOptions,
) -> Result<Vec<u8>, FlattenError> {
    let mut doc =
        Document::load_mem(source).map_err(|e| FlattenError::ParseError(e.to_string()))?;
    let pages = doc.get_pages();

    let mut by_page: BTreeMap<u32, Vec<&Field>> = BTreeMap::new();
    for field in fields {
        if !pages.contains_key(&field.page) {
            warn!(
                id = %field.id,
                page = field.page,
                page_count = pages.len(),
                "Skipping field on a page the document does not have"
            );
            continue;
        }
        if !field.is_filled() {
            debug!(id = %field.id, "Skipping empty field");
            continue;
        }
        by_page.entry(field.page).or_default().push(field);
    }

    let mut drawn = 0;
    for (number, page_fields) in &by_page {
        let Some(&page_id) = pages.get(number) else {
            continue;
        };
        drawn += overlay_page(&mut doc, page_id, page_fields, options)?;
    }

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| FlattenError::SerializationError(e.to_string()))?;

    info!(
        pages = by_page.len(),
        fields = drawn,
        bytes = output.len(),
        "Document flattened"
    );
    Ok(output)
}

/// [`flatten_with`] on the blocking thread pool
pub async fn flatten_async(
    source: Vec<u8>,
    fields: Vec<Field>,
    options: FlattenOptions,
) -> Result<Vec<u8>, FlattenError> {
    tokio::task::spawn_blocking(move || flatten_with(&source, &fields, &options))
        .await
        .map_err(|e| FlattenError::TaskError(e.to_string()))?
}

fn overlay_page(
    doc: &mut Document,
    page_id: ObjectId,
    fields: &[&Field],
    options: &FlattenOptions,
) -> Result<usize, FlattenError> {
    let page_box = media_box(doc, page_id);
    let mut resources = owned_resources(doc, page_id);
    let mut font: Option<String> = None;

    // Restores the graphics state saved before the page's own content
    let mut operations = vec![Operation::new("Q", vec![])];
    let mut drawn = 0;

    for field in fields {
        match field.field_type {
            FieldType::Signature => {
                let Some(signature) = &field.signature_data else {
                    continue;
                };
                if let Some(media_type) = signature.media_type() {
                    if media_type != "image/png" {
                        return Err(signature_error(
                            field,
                            format!("unsupported image type {}", media_type),
                        ));
                    }
                }
                let bytes = signature
                    .decode()
                    .map_err(|e| signature_error(field, e.to_string()))?;
                let image = decode_png(&bytes).map_err(|reason| signature_error(field, reason))?;
                let image_id =
                    add_image_xobject(doc, &image).map_err(FlattenError::OperationError)?;

                let xobjects = ensure_sub_dict(&mut resources, b"XObject")?;
                let name = unused_name(xobjects, "OvSig");
                xobjects.set(name.clone(), image_id);
                operations.extend(image_operations(&name, field, page_box));
            }
            FieldType::Checkbox => {
                operations.extend(check_mark_operations(field, page_box, options));
            }
            _ => {
                let Some(value) = field.value.as_deref() else {
                    continue;
                };
                let font_name = match &font {
                    Some(name) => name.clone(),
                    None => {
                        let name = add_font(doc, &mut resources, options)?;
                        font = Some(name.clone());
                        name
                    }
                };
                operations.extend(text_operations(&font_name, value, field, page_box, options));
            }
        }
        debug!(id = %field.id, field_type = %field.field_type, page = field.page, "Field drawn");
        drawn += 1;
    }

    let overlay = Content { operations }
        .encode()
        .map_err(|e| FlattenError::OperationError(e.to_string()))?;
    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay));

    let mut contents = vec![Object::Reference(open_id)];
    contents.extend(existing_contents(doc, page_id));
    contents.push(Object::Reference(overlay_id));

    let page = doc
        .get_object_mut(page_id)
        .and_then(|o| o.as_dict_mut())
        .map_err(|e| FlattenError::OperationError(e.to_string()))?;
    page.set("Contents", Object::Array(contents));
    page.set("Resources", Object::Dictionary(resources));
    Ok(drawn)
}

fn signature_error(field: &Field, reason: String) -> FlattenError {
    FlattenError::SignatureImage {
        field: field.id.clone(),
        reason,
    }
}

fn add_font(
    doc: &mut Document,
    resources: &mut Dictionary,
    options: &FlattenOptions,
) -> Result<String, FlattenError> {
    let fonts = ensure_sub_dict(resources, b"Font")?;
    let name = unused_name(fonts, "OvF");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => options.base_font.as_str(),
        "Encoding" => "WinAnsiEncoding",
    });
    fonts.set(name.clone(), font_id);
    Ok(name)
}

/// Content stream references of a page, flattened to a list
fn existing_contents(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Ok(page) = doc.get_object(page_id).and_then(|o| o.as_dict()) else {
        return Vec::new();
    };
    match page.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn text_operations(
    font: &str,
    value: &str,
    field: &Field,
    page_box: PageBox,
    options: &FlattenOptions,
) -> Vec<Operation> {
    let x = page_box.llx + field.position.x + options.padding;
    let y = page_box.bottom_of(field.position.y, field.size.height) + options.padding;
    let [r, g, b] = options.text_color;
    vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font.as_bytes().to_vec()), real(options.font_size)],
        ),
        Operation::new("rg", vec![real(r), real(g), real(b)]),
        Operation::new(
            "Tm",
            vec![1.into(), 0.into(), 0.into(), 1.into(), real(x), real(y)],
        ),
        Operation::new(
            "Tj",
            vec![Object::String(to_win_ansi(value), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

fn image_operations(name: &str, field: &Field, page_box: PageBox) -> Vec<Operation> {
    let x = page_box.llx + field.position.x;
    let y = page_box.bottom_of(field.position.y, field.size.height);
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                real(field.size.width),
                0.into(),
                0.into(),
                real(field.size.height),
                real(x),
                real(y),
            ],
        ),
        Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}

/// Tick inside the largest square that fits the field, anchored bottom-left
fn check_mark_operations(
    field: &Field,
    page_box: PageBox,
    options: &FlattenOptions,
) -> Vec<Operation> {
    let s = field.size.width.min(field.size.height);
    let x = page_box.llx + field.position.x;
    let y = page_box.bottom_of(field.position.y, field.size.height);
    let [r, g, b] = options.text_color;
    vec![
        Operation::new("q", vec![]),
        Operation::new("RG", vec![real(r), real(g), real(b)]),
        Operation::new("w", vec![real((s * 0.1).max(1.0))]),
        Operation::new("m", vec![real(x + s * 0.2), real(y + s * 0.5)]),
        Operation::new("l", vec![real(x + s * 0.4), real(y + s * 0.3)]),
        Operation::new("l", vec![real(x + s * 0.8), real(y + s * 0.8)]),
        Operation::new("S", vec![]),
        Operation::new("Q", vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{encode_png, pdf_with_pages, PageSpec};
    use overlay_core::{FieldId, LocalId, Point, RecipientId, SignatureImage, Size};
    use pretty_assertions::assert_eq;

    fn field(field_type: FieldType, page: u32, x: f64, y: f64) -> Field {
        Field::new(
            FieldId::Local(LocalId::generate()),
            field_type,
            page,
            Point::new(x, y),
            RecipientId::new("r1"),
        )
    }

    fn text(page: u32, x: f64, y: f64, value: &str) -> Field {
        let mut f = field(FieldType::Text, page, x, y);
        f.value = Some(value.to_string());
        f
    }

    fn signature(page: u32, x: f64, y: f64, height: f64) -> Field {
        let mut f = field(FieldType::Signature, page, x, y);
        f.size = Size::new(200.0, height);
        let png = encode_png(2, 2, png::ColorType::Rgba, &[0, 0, 0, 255, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 255]);
        f.signature_data = Some(SignatureImage::from_png(&png));
        f
    }

    fn page_dict(doc: &Document, page: u32) -> &Dictionary {
        let id = doc.get_pages()[&page];
        doc.get_object(id).unwrap().as_dict().unwrap()
    }

    /// Operations of the overlay stream (the last entry of the page's Contents)
    fn overlay_ops(bytes: &[u8], page: u32) -> Vec<Operation> {
        let doc = Document::load_mem(bytes).unwrap();
        let contents = page_dict(&doc, page).get(b"Contents").unwrap().as_array().unwrap();
        let last = contents.last().unwrap().as_reference().unwrap();
        let stream = doc.get_object(last).unwrap().as_stream().unwrap();
        Content::decode(&stream.content).unwrap().operations
    }

    fn num(obj: &Object) -> f64 {
        match obj {
            Object::Integer(i) => *i as f64,
            Object::Real(r) => (*r).into(),
            other => panic!("not a number: {:?}", other),
        }
    }

    fn find<'a>(ops: &'a [Operation], operator: &str) -> Vec<&'a Operation> {
        ops.iter().filter(|op| op.operator == operator).collect()
    }

    #[test]
    fn test_jane_doe_drawn_near_expected_position() {
        let source = pdf_with_pages(&[PageSpec::letter()]);
        let out = flatten(&source, &[text(1, 100.0, 150.0, "Jane Doe")]).unwrap();

        let ops = overlay_ops(&out, 1);
        let tj = find(&ops, "Tj");
        assert_eq!(tj.len(), 1);
        assert_eq!(tj[0].operands[0].as_str().unwrap(), b"Jane Doe");

        let tm = find(&ops, "Tm")[0];
        assert!((num(&tm.operands[4]) - 102.0).abs() < 0.01);
        assert!((num(&tm.operands[5]) - 614.0).abs() < 0.01);

        assert!(String::from_utf8_lossy(&out).contains("Jane Doe"));
    }

    #[test]
    fn test_signature_y_is_inverted() {
        let source = pdf_with_pages(&[PageSpec::letter()]);
        let out = flatten(&source, &[signature(1, 50.0, 100.0, 30.0)]).unwrap();

        let ops = overlay_ops(&out, 1);
        let cm = find(&ops, "cm")[0];
        let operands: Vec<f64> = cm.operands.iter().map(num).collect();
        assert_eq!(operands, vec![200.0, 0.0, 0.0, 30.0, 50.0, 662.0]);
        assert_eq!(find(&ops, "Do").len(), 1);
    }

    #[test]
    fn test_signature_xobject_with_soft_mask() {
        let source = pdf_with_pages(&[PageSpec::letter()]);
        let out = flatten(&source, &[signature(1, 0.0, 0.0, 60.0)]).unwrap();
        let doc = Document::load_mem(&out).unwrap();

        let resources = page_dict(&doc, 1).get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let image_id = xobjects.get(b"OvSig1").unwrap().as_reference().unwrap();
        let image = doc.get_object(image_id).unwrap().as_stream().unwrap();
        assert_eq!(image.dict.get(b"Width").unwrap(), &Object::Integer(2));
        assert!(image.dict.get(b"SMask").is_ok());
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let source = pdf_with_pages(&[PageSpec::letter(), PageSpec::letter()]);
        let fields = vec![
            text(1, 100.0, 150.0, "Jane Doe"),
            signature(2, 72.0, 600.0, 60.0),
            text(2, 10.0, 10.0, "2026-10-17"),
        ];
        let first = flatten(&source, &fields).unwrap();
        let second = flatten(&source, &fields).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_skips_out_of_range_and_empty_fields() {
        let source = pdf_with_pages(&[PageSpec::letter()]);
        let fields = vec![
            text(3, 10.0, 10.0, "nowhere"),
            field(FieldType::Date, 1, 10.0, 10.0),
            field(FieldType::Signature, 1, 10.0, 10.0),
            text(1, 10.0, 10.0, "   "),
        ];
        let out = flatten(&source, &fields).unwrap();
        let doc = Document::load_mem(&out).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert!(page_dict(&doc, 1).get(b"Contents").is_err());
    }

    #[test]
    fn test_checkbox_draws_only_when_checked() {
        let source = pdf_with_pages(&[PageSpec::letter()]);
        let mut checked = field(FieldType::Checkbox, 1, 10.0, 10.0);
        checked.value = Some("yes".to_string());
        let mut unchecked = field(FieldType::Checkbox, 1, 50.0, 10.0);
        unchecked.value = Some("false".to_string());

        let out = flatten(&source, &[checked, unchecked]).unwrap();
        let ops = overlay_ops(&out, 1);
        assert_eq!(find(&ops, "S").len(), 1);
        assert!(find(&ops, "Tj").is_empty());
    }

    #[test]
    fn test_overflowing_field_still_draws() {
        let source = pdf_with_pages(&[PageSpec::letter()]);
        let out = flatten(&source, &[text(1, 600.0, 780.0, "edge")]).unwrap();
        let tm = find(&overlay_ops(&out, 1), "Tm")[0].clone();
        assert!(num(&tm.operands[5]) < 0.0);
    }

    #[test]
    fn test_existing_content_is_isolated() {
        let source = pdf_with_pages(&[PageSpec::letter().with_unbalanced_transform()]);
        let out = flatten(&source, &[text(1, 100.0, 150.0, "Jane Doe")]).unwrap();
        let doc = Document::load_mem(&out).unwrap();

        let contents = page_dict(&doc, 1).get(b"Contents").unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 3);
        let first = doc
            .get_object(contents[0].as_reference().unwrap())
            .unwrap()
            .as_stream()
            .unwrap();
        assert_eq!(first.content, b"q\n".to_vec());
        assert_eq!(overlay_ops(&out, 1)[0].operator, "Q");
    }

    #[test]
    fn test_shared_resources_untouched() {
        let source = pdf_with_pages(&[PageSpec::letter(), PageSpec::letter()]);
        let out = flatten(&source, &[text(1, 10.0, 10.0, "only page one")]).unwrap();
        let doc = Document::load_mem(&out).unwrap();

        let page_one = page_dict(&doc, 1).get(b"Resources").unwrap().as_dict().unwrap();
        let fonts = page_one.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.has(b"F1"));
        assert!(fonts.has(b"OvF1"));

        // Page two still inherits the untouched shared dictionary
        assert!(page_dict(&doc, 2).get(b"Resources").is_err());
        let parent = page_dict(&doc, 2).get(b"Parent").unwrap().as_reference().unwrap();
        let shared = doc.get_object(parent).unwrap().as_dict().unwrap();
        let shared_res = doc
            .get_object(shared.get(b"Resources").unwrap().as_reference().unwrap())
            .unwrap()
            .as_dict()
            .unwrap();
        let shared_fonts = shared_res.get(b"Font").unwrap().as_dict().unwrap();
        assert!(!shared_fonts.has(b"OvF1"));
    }

    #[test]
    fn test_media_box_origin_is_honoured() {
        let source = pdf_with_pages(&[PageSpec::sized([0, 100, 612, 892])]);
        let out = flatten(&source, &[text(1, 100.0, 150.0, "Jane Doe")]).unwrap();
        let tm = find(&overlay_ops(&out, 1), "Tm")[0].clone();
        assert!((num(&tm.operands[5]) - 714.0).abs() < 0.01);
    }

    #[test]
    fn test_bad_signature_image_is_an_error() {
        let source = pdf_with_pages(&[PageSpec::letter()]);
        let mut bad = field(FieldType::Signature, 1, 0.0, 0.0);
        bad.signature_data = Some(SignatureImage::from_png(b"not a png"));
        let err = flatten(&source, &[bad.clone()]).unwrap_err();
        assert!(
            matches!(err, FlattenError::SignatureImage { ref field, .. } if *field == bad.id)
        );

        bad.signature_data = Some(SignatureImage::new("data:image/jpeg;base64,AAAA"));
        assert!(matches!(
            flatten(&source, &[bad]),
            Err(FlattenError::SignatureImage { .. })
        ));
    }

    #[test]
    fn test_invalid_source_is_an_error() {
        assert!(matches!(
            flatten(b"%PDF-1.7 truncated", &[]),
            Err(FlattenError::ParseError(_))
        ));
    }

    #[test]
    fn test_options_change_font_and_size() {
        let source = pdf_with_pages(&[PageSpec::letter()]);
        let options = FlattenOptions {
            font_size: 14.0,
            base_font: "Times-Roman".to_string(),
            ..FlattenOptions::default()
        };
        let out = flatten_with(&source, &[text(1, 0.0, 0.0, "x")], &options).unwrap();
        let tf = find(&overlay_ops(&out, 1), "Tf")[0].clone();
        assert_eq!(num(&tf.operands[1]), 14.0);

        let doc = Document::load_mem(&out).unwrap();
        let resources = page_dict(&doc, 1).get(b"Resources").unwrap().as_dict().unwrap();
        let font_id = resources
            .get(b"Font")
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"OvF1")
            .unwrap()
            .as_reference()
            .unwrap();
        let font = doc.get_object(font_id).unwrap().as_dict().unwrap();
        assert_eq!(font.get(b"BaseFont").unwrap().as_name().unwrap(), b"Times-Roman");
    }

    #[tokio::test]
    async fn test_flatten_async_matches_sync() {
        let source = pdf_with_pages(&[PageSpec::letter()]);
        let fields = vec![text(1, 100.0, 150.0, "Jane Doe")];
        let sync = flatten(&source, &fields).unwrap();
        let async_out = flatten_async(source, fields, FlattenOptions::default())
            .await
            .unwrap();
        assert_eq!(sync, async_out);
    }
}

//! In-memory PDFs and PNGs for tests

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

pub struct PageSpec {
    pub media_box: [i64; 4],
    pub content: Option<Content>,
}

impl PageSpec {
    pub fn letter() -> Self {
        Self::sized([0, 0, 612, 792])
    }

    pub fn sized(media_box: [i64; 4]) -> Self {
        Self {
            media_box,
            content: None,
        }
    }

    /// Page whose content leaves a scaling transform in effect
    pub fn with_unbalanced_transform(mut self) -> Self {
        self.content = Some(Content {
            operations: vec![Operation::new(
                "cm",
                vec![2.into(), 0.into(), 0.into(), 2.into(), 0.into(), 0.into()],
            )],
        });
        self
    }
}

pub fn pdf_with_pages(pages: &[PageSpec]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for spec in pages {
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => spec.media_box.iter().map(|&v| Object::Integer(v)).collect::<Vec<_>>(),
        };
        if let Some(content) = &spec.content {
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().unwrap(),
            ));
            page.set("Contents", content_id);
        }
        kids.push(Object::Reference(doc.add_object(page)));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
            "Resources" => resources_id,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn encode_png(width: u32, height: u32, color: png::ColorType, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(data).unwrap();
    }
    out
}

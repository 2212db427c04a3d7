//! PDF emission with printpdf, followed by a lopdf pass that strips the
//! run-dependent parts (random document ID, wall-clock dates, XMP packet) so
//! identical inputs give identical bytes.

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Object, StringFormat};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference};

use super::layout::Page;
use super::metrics::FontFace;
use super::stylesheet::PageGeometry;
use crate::error::RenderError;

const PRODUCER: &str = "atom2remarkable";

pub struct PdfMeta<'a> {
    pub title: &'a str,
    pub generated_at: DateTime<Utc>,
    /// Digest of everything that went into the document.
    pub fingerprint: [u8; 32],
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    oblique: IndirectFontRef,
    mono: IndirectFontRef,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference) -> Result<Self, RenderError> {
        let add = |font| doc.add_builtin_font(font).map_err(pdf_error);
        Ok(Self {
            regular: add(BuiltinFont::Helvetica)?,
            bold: add(BuiltinFont::HelveticaBold)?,
            oblique: add(BuiltinFont::HelveticaOblique)?,
            mono: add(BuiltinFont::Courier)?,
        })
    }

    fn get(&self, face: FontFace) -> &IndirectFontRef {
        match face {
            FontFace::Regular => &self.regular,
            FontFace::Bold => &self.bold,
            FontFace::Oblique => &self.oblique,
            FontFace::Mono => &self.mono,
        }
    }
}

fn mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

fn pdf_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Pdf(e.to_string())
}

pub fn write_pdf(
    pages: &[Page],
    geometry: &PageGeometry,
    meta: &PdfMeta<'_>,
) -> Result<Vec<u8>, RenderError> {
    let (width, height) = (mm(geometry.width_pt), mm(geometry.height_pt));
    let (doc, first_page, first_layer) = PdfDocument::new(meta.title, width, height, "Layer 1");
    let fonts = Fonts::load(&doc)?;

    for (i, page) in pages.iter().enumerate() {
        let (page_idx, layer_idx) = if i == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(width, height, format!("Page {}, Layer 1", i + 1))
        };
        let layer = doc.get_page(page_idx).get_layer(layer_idx);
        for line in &page.lines {
            layer.use_text(
                line.text.as_str(),
                line.size_pt,
                mm(line.x_pt),
                mm(line.y_pt),
                fonts.get(line.face),
            );
        }
    }

    let raw = doc.save_to_bytes().map_err(pdf_error)?;
    normalize(&raw, meta).map_err(pdf_error)
}

fn normalize(raw: &[u8], meta: &PdfMeta<'_>) -> Result<Vec<u8>, lopdf::Error> {
    let mut doc = lopdf::Document::load_mem(raw)?;

    let stamp = format!("D:{}+00'00'", meta.generated_at.format("%Y%m%d%H%M%S"));
    let mut info = Dictionary::new();
    info.set("Title", Object::string_literal(meta.title));
    info.set("Producer", Object::string_literal(PRODUCER));
    info.set("CreationDate", Object::string_literal(stamp.as_str()));
    info.set("ModDate", Object::string_literal(stamp.as_str()));
    let info_id = doc.add_object(info);
    doc.trailer.set("Info", info_id);

    let root_id = doc.trailer.get(b"Root")?.as_reference()?;
    doc.get_object_mut(root_id)?.as_dict_mut()?.remove(b"Metadata");

    let id = Object::String(meta.fingerprint[..16].to_vec(), StringFormat::Hexadecimal);
    doc.trailer.set("ID", Object::Array(vec![id.clone(), id]));
    doc.prune_objects();

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

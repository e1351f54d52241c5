//! Visible signature stamps
//!
//! The builder produces an [`AppearanceStream`] that the preparer adds to
//! the document and references from the widget's `/AP /N` entry.

use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use shared_types::PdfRect;

use crate::error::PdfError;
use crate::text::{escape_pdf_string, ucs2_hex};

/// Signer names longer than this are cut and suffixed with "..."
pub const NAME_DISPLAY_LIMIT: usize = 10;

/// Font used for the fallback text stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StampFont {
    /// Standard 14 Helvetica; non-ASCII characters render as `?`
    #[default]
    Helvetica,
    /// Predefined CJK font `HYGoThic-Medium` with `UniKS-UCS2-H` encoding
    KoreanGothic,
}

impl StampFont {
    /// Helvetica for plain ASCII, the Korean CID font otherwise
    pub fn for_text(text: &str) -> Self {
        if text.is_ascii() {
            Self::Helvetica
        } else {
            Self::KoreanGothic
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppearanceOptions {
    pub font: StampFont,
    pub background: [f64; 3],
    pub border: [f64; 3],
}

impl Default for AppearanceOptions {
    fn default() -> Self {
        Self {
            font: StampFont::Helvetica,
            background: [0.95, 0.95, 1.0],
            border: [0.2, 0.2, 0.6],
        }
    }
}

/// A form XObject ready to be added to a document
#[derive(Debug, Clone)]
pub struct AppearanceStream {
    width: f64,
    height: f64,
    content: Vec<u8>,
    resources: Dictionary,
    image: Option<StampImage>,
}

#[derive(Debug, Clone)]
struct StampImage {
    image: Stream,
    smask: Option<Stream>,
}

impl AppearanceStream {
    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Add the stream and any image XObjects to `doc`, returning the form id
    pub fn add_to(self, doc: &mut Document) -> ObjectId {
        let mut resources = self.resources;

        if let Some(stamp) = self.image {
            let mut image = stamp.image;
            if let Some(smask) = stamp.smask {
                let smask_id = doc.add_object(smask);
                image.dict.set("SMask", Object::Reference(smask_id));
            }
            let image_id = doc.add_object(image);
            resources.set(
                "XObject",
                dictionary! { "Im1" => Object::Reference(image_id) },
            );
        }

        let stream_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => vec![
                0.into(),
                0.into(),
                Object::Real(self.width as f32),
                Object::Real(self.height as f32),
            ],
            "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), 0.into()],
            "Resources" => resources,
        };
        doc.add_object(Stream::new(stream_dict, self.content))
    }
}

/// Renders signature appearances independently of any cryptography
#[derive(Debug, Clone, Default)]
pub struct AppearanceBuilder {
    options: AppearanceOptions,
}

impl AppearanceBuilder {
    pub fn new(options: AppearanceOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AppearanceOptions {
        &self.options
    }

    /// Image stamp when one is given and loads, text stamp otherwise
    pub fn build(
        &self,
        rect: &PdfRect,
        signer_name: &str,
        signing_date: &str,
        stamp_image: Option<&Path>,
    ) -> AppearanceStream {
        if let Some(path) = stamp_image {
            match self.image_stamp_from_path(rect, path) {
                Ok(stream) => return stream,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "stamp image unusable, falling back to text stamp"
                    );
                }
            }
        }
        self.text_stamp(rect, signer_name, signing_date)
    }

    /// Bordered box with the signer name and signing date
    pub fn text_stamp(&self, rect: &PdfRect, signer_name: &str, signing_date: &str) -> AppearanceStream {
        let width = rect.width.abs();
        let height = rect.height.abs();
        let name = truncate_name(signer_name, NAME_DISPLAY_LIMIT);

        let font_size = (height * 0.25).clamp(6.0, 12.0);
        let line1_y = height - font_size - 4.0;
        let [br, bg, bb] = self.options.background;
        let [lr, lg, lb] = self.options.border;

        let content = format!(
            "q\n\
{br} {bg} {bb} rg\n\
0 0 {w} {h} re f\n\
{lr} {lg} {lb} RG\n\
1 w\n\
0.5 0.5 {w2} {h2} re S\n\
0 0 0 rg\n\
BT\n\
/F1 {fs} Tf\n\
4 {y1} Td\n\
{name} Tj\n\
0 -{fs2} Td\n\
{date} Tj\n\
ET\n\
Q",
            w = width,
            h = height,
            w2 = width - 1.0,
            h2 = height - 1.0,
            fs = font_size,
            y1 = line1_y,
            fs2 = font_size + 4.0,
            name = self.show_operand(&name),
            date = self.show_operand(signing_date),
        );

        let resources = dictionary! {
            "Font" => dictionary! { "F1" => font_dictionary(self.options.font) },
        };

        AppearanceStream {
            width,
            height,
            content: content.into_bytes(),
            resources,
            image: None,
        }
    }

    pub fn image_stamp_from_path(&self, rect: &PdfRect, path: &Path) -> Result<AppearanceStream, PdfError> {
        let bytes = std::fs::read(path)
            .map_err(|e| PdfError::Appearance(format!("{}: {}", path.display(), e)))?;
        self.image_stamp(rect, &bytes)
    }

    /// Scale an image to fit the rectangle, keeping its aspect ratio, centered
    pub fn image_stamp(&self, rect: &PdfRect, image_bytes: &[u8]) -> Result<AppearanceStream, PdfError> {
        let width = rect.width.abs();
        let height = rect.height.abs();
        if width <= 0.0 || height <= 0.0 {
            return Err(PdfError::Appearance("empty stamp rectangle".to_string()));
        }

        let decoded = image::load_from_memory(image_bytes)
            .map_err(|e| PdfError::Appearance(e.to_string()))?
            .to_rgba8();
        let (img_w, img_h) = decoded.dimensions();
        if img_w == 0 || img_h == 0 {
            return Err(PdfError::Appearance("image has no pixels".to_string()));
        }

        let mut rgb = Vec::with_capacity((img_w * img_h * 3) as usize);
        let mut alpha = Vec::with_capacity((img_w * img_h) as usize);
        for pixel in decoded.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let image = image_xobject(img_w, img_h, "DeviceRGB", &rgb)?;
        let smask = if alpha.iter().all(|&a| a == u8::MAX) {
            None
        } else {
            Some(image_xobject(img_w, img_h, "DeviceGray", &alpha)?)
        };

        let scale = (width / img_w as f64).min(height / img_h as f64);
        let draw_w = img_w as f64 * scale;
        let draw_h = img_h as f64 * scale;
        let offset_x = (width - draw_w) / 2.0;
        let offset_y = (height - draw_h) / 2.0;

        let content = format!(
            "q\n{dw:.3} 0 0 {dh:.3} {ox:.3} {oy:.3} cm\n/Im1 Do\nQ",
            dw = draw_w,
            dh = draw_h,
            ox = offset_x,
            oy = offset_y,
        );

        Ok(AppearanceStream {
            width,
            height,
            content: content.into_bytes(),
            resources: Dictionary::new(),
            image: Some(StampImage { image, smask }),
        })
    }

    /// Operand for `Tj` in the configured font's encoding
    fn show_operand(&self, text: &str) -> String {
        match self.options.font {
            StampFont::Helvetica => format!("({})", escape_pdf_string(text)),
            StampFont::KoreanGothic => ucs2_hex(text),
        }
    }
}

/// First `limit` characters of `name`, with "..." when anything was cut
pub fn truncate_name(name: &str, limit: usize) -> String {
    if name.chars().count() <= limit {
        return name.to_string();
    }
    let mut cut: String = name.chars().take(limit).collect();
    cut.push_str("...");
    cut
}

fn font_dictionary(font: StampFont) -> Dictionary {
    match font {
        StampFont::Helvetica => dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        },
        StampFont::KoreanGothic => dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "HYGoThic-Medium",
            "Encoding" => "UniKS-UCS2-H",
            "DescendantFonts" => vec![Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "CIDFontType0",
                "BaseFont" => "HYGoThic-Medium",
                "CIDSystemInfo" => dictionary! {
                    "Registry" => Object::string_literal("Adobe"),
                    "Ordering" => Object::string_literal("Korea1"),
                    "Supplement" => 1,
                },
                "FontDescriptor" => dictionary! {
                    "Type" => "FontDescriptor",
                    "FontName" => "HYGoThic-Medium",
                    "Flags" => 4,
                    "FontBBox" => vec![(-6).into(), (-145).into(), 1003.into(), 880.into()],
                    "ItalicAngle" => 0,
                    "Ascent" => 880,
                    "Descent" => -120,
                    "CapHeight" => 880,
                    "StemV" => 93,
                },
                "DW" => 1000,
            })],
        },
    }
}

fn image_xobject(width: u32, height: u32, color_space: &str, samples: &[u8]) -> Result<Stream, PdfError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(samples)
        .and_then(|_| encoder.finish())
        .map_err(|e| PdfError::Appearance(format!("compressing image: {}", e)))
        .map(|compressed| {
            let dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            };
            Stream::new(dict, compressed).with_compression(false)
        })
}

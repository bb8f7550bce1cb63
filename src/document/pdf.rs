//! PDF output through PDFium.
//!
//! Laid-out pages are drawn onto a fresh PDFium document with the base-14
//! standard fonts (not embedded), then saved to bytes. The library is
//! located, and downloaded on first use if needed, by `pdfium-auto`.
//!
//! PDFium is not re-entrant: every document is built under one process-wide
//! lock, and the binding is created and released inside it.
//!
//! PDFium stamps each saved file with a random `/ID`. It is replaced by a
//! digest of the rest of the file so that identical pages always produce
//! identical bytes.

use super::layout::{Op, Page, Rgb};
use super::metrics::{self, Font};
use crate::error::ConversionError;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::bytes::Regex;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

static ENGINE_LOCK: Mutex<()> = Mutex::new(());

static FILE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/ID\s*\[\s*<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>").unwrap()
});

fn lock_engine() -> MutexGuard<'static, ()> {
    ENGINE_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

fn bind() -> Result<Pdfium, ConversionError> {
    pdfium_auto::bind_pdfium_silent().map_err(|e| ConversionError::Engine(e.to_string()))
}

/// Make sure PDFium can be loaded, downloading it into the cache if needed.
///
/// Conversions do this on their own; callers use it to fail early, before
/// any remote work starts.
pub fn ensure_engine() -> Result<(), ConversionError> {
    let _guard = lock_engine();
    bind().map(drop)
}

/// Draw `pages` and return the saved PDF.
pub fn write_pdf(
    pages: &[Page],
    page_width: f32,
    page_height: f32,
) -> Result<Vec<u8>, ConversionError> {
    let blank = [Page::default()];
    let pages = if pages.is_empty() { &blank[..] } else { pages };

    let bytes = {
        let _guard = lock_engine();
        let pdfium = bind()?;
        render(&pdfium, pages, page_width, page_height)
            .map_err(|e| ConversionError::Render(e.to_string()))?
    };
    debug!("PDFium saved {} page(s), {} bytes", pages.len(), bytes.len());
    Ok(stable_file_id(bytes))
}

fn render(
    pdfium: &Pdfium,
    pages: &[Page],
    page_width: f32,
    page_height: f32,
) -> Result<Vec<u8>, PdfiumError> {
    let mut document = pdfium.create_new_pdf()?;
    let fonts = FontSet::load(&mut document);
    for page in pages {
        let size = PdfPagePaperSize::Custom(PdfPoints::new(page_width), PdfPoints::new(page_height));
        let mut target = document.pages_mut().create_page_at_end(size)?;
        target.set_content_regeneration_strategy(PdfPageContentRegenerationStrategy::Manual);
        for op in &page.ops {
            draw(&document, &mut target, &fonts, op)?;
        }
        target.regenerate_content()?;
    }

    document.save_to_bytes()
}

fn draw<'a>(
    document: &PdfDocument<'a>,
    target: &mut PdfPage<'a>,
    fonts: &FontSet,
    op: &Op,
) -> Result<(), PdfiumError> {
    match op {
        Op::Rect { x, y, w, h, color } => {
            let rect = PdfRect::new(
                PdfPoints::new(*y),
                PdfPoints::new(*x),
                PdfPoints::new(y + h),
                PdfPoints::new(x + w),
            );
            target
                .objects_mut()
                .create_path_object_rect(rect, None, None, Some(pdf_color(*color)))?;
        }
        Op::Line {
            x1,
            y1,
            x2,
            y2,
            width,
            color,
        } => {
            target.objects_mut().create_path_object_line(
                PdfPoints::new(*x1),
                PdfPoints::new(*y1),
                PdfPoints::new(*x2),
                PdfPoints::new(*y2),
                pdf_color(*color),
                PdfPoints::new(*width),
            )?;
        }
        Op::Text {
            x,
            y,
            font,
            size,
            rise,
            color,
            bytes,
        } => {
            let text = metrics::decode(*font, bytes);
            if text.is_empty() {
                return Ok(());
            }
            let mut object =
                PdfPageTextObject::new(document, text, fonts.token(*font), PdfPoints::new(*size))?;
            object.set_fill_color(pdf_color(*color))?;
            object.translate(PdfPoints::new(*x), PdfPoints::new(y + rise))?;
            target.objects_mut().add_text_object(object)?;
        }
    }
    Ok(())
}

/// One standard-font token per [`Font`], loaded once per document.
struct FontSet {
    tokens: Vec<(Font, PdfFontToken)>,
}

impl FontSet {
    fn load(document: &mut PdfDocument) -> Self {
        let fonts = document.fonts_mut();
        let tokens = Font::ALL
            .iter()
            .map(|font| {
                let token = match font {
                    Font::Helvetica => fonts.helvetica(),
                    Font::HelveticaBold => fonts.helvetica_bold(),
                    Font::HelveticaOblique => fonts.helvetica_oblique(),
                    Font::HelveticaBoldOblique => fonts.helvetica_bold_oblique(),
                    Font::TimesRoman => fonts.times_roman(),
                    Font::TimesBold => fonts.times_bold(),
                    Font::TimesItalic => fonts.times_italic(),
                    Font::TimesBoldItalic => fonts.times_bold_italic(),
                    Font::Courier => fonts.courier(),
                    Font::CourierBold => fonts.courier_bold(),
                    Font::Symbol => fonts.symbol(),
                };
                (*font, token)
            })
            .collect();
        Self { tokens }
    }

    fn token(&self, font: Font) -> PdfFontToken {
        self.tokens
            .iter()
            .find(|(f, _)| *f == font)
            .map_or(self.tokens[0].1, |(_, t)| *t)
    }
}

fn pdf_color(c: Rgb) -> PdfColor {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    PdfColor::new(channel(c.0), channel(c.1), channel(c.2), 255)
}

/// Overwrite both halves of the trailer `/ID` with a digest of everything
/// else in the file. Lengths are unchanged, so offsets stay valid.
fn stable_file_id(mut bytes: Vec<u8>) -> Vec<u8> {
    let spans: Vec<std::ops::Range<usize>> = match FILE_ID.captures(&bytes) {
        Some(caps) => (1..=2).filter_map(|i| caps.get(i)).map(|m| m.range()).collect(),
        None => return bytes,
    };

    let mut hasher = DefaultHasher::new();
    let mut last = 0;
    for span in &spans {
        hasher.write(&bytes[last..span.start]);
        last = span.end;
    }
    hasher.write(&bytes[last..]);
    let digest = format!("{:016X}", hasher.finish());

    for span in spans {
        for (i, b) in bytes[span].iter_mut().enumerate() {
            *b = digest.as_bytes()[i % digest.len()];
        }
    }
    bytes
}

//! PDF deck writer built on lopdf.
//!
//! Layout is intentionally plain: a title page followed by one landscape
//! page per slide, Helvetica throughout.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::db::slide_repo::SlideRow;

use super::RenderError;

// 10 x 7.5 inch landscape pages, in points.
const PAGE_WIDTH: i64 = 720;
const PAGE_HEIGHT: i64 = 540;

const TITLE_SIZE: i64 = 36;
const HEADING_SIZE: i64 = 28;
const BODY_SIZE: i64 = 16;
const LINE_SPACING: i64 = 26;
const MARGIN: i64 = 60;

pub fn write_pdf(path: &Path, title: &str, slides: &[SlideRow]) -> Result<(), RenderError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_font,
            "F2" => bold_font,
        },
    });

    let mut page_ids: Vec<Object> = Vec::with_capacity(slides.len() + 1);

    let cover = title_page_content(title, slides.len());
    page_ids.push(add_page(&mut doc, pages_id, resources_id, cover)?.into());

    for slide in slides {
        let content = slide_page_content(slide);
        page_ids.push(add_page(&mut doc, pages_id, resources_id, content)?.into());
    }

    let count = page_ids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    doc.save(path)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    Ok(())
}

fn add_page(
    doc: &mut Document,
    pages_id: lopdf::ObjectId,
    resources_id: lopdf::ObjectId,
    content: Content,
) -> Result<lopdf::ObjectId, RenderError> {
    let encoded = content
        .encode()
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    });
    Ok(page_id)
}

fn title_page_content(title: &str, slide_count: usize) -> Content {
    let mut ops = Vec::new();
    text(&mut ops, "F2", TITLE_SIZE, MARGIN, PAGE_HEIGHT / 2 + 20, title);
    text(
        &mut ops,
        "F1",
        BODY_SIZE,
        MARGIN,
        PAGE_HEIGHT / 2 - 30,
        &format!("{} slides", slide_count),
    );
    Content { operations: ops }
}

fn slide_page_content(slide: &SlideRow) -> Content {
    let mut ops = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN - HEADING_SIZE;
    text(&mut ops, "F2", HEADING_SIZE, MARGIN, y, &slide.title);
    y -= 2 * LINE_SPACING;

    for bullet in slide.bullets() {
        if y < MARGIN {
            break;
        }
        text(
            &mut ops,
            "F1",
            BODY_SIZE,
            MARGIN + 20,
            y,
            &format!("- {}", bullet),
        );
        y -= LINE_SPACING;
    }
    Content { operations: ops }
}

fn text(ops: &mut Vec<Operation>, font: &str, size: i64, x: i64, y: i64, line: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(line)]));
    ops.push(Operation::new("ET", vec![]));
}

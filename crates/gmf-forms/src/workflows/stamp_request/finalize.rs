use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;

use super::domain::OutputArtifact;
use super::image::EmbeddedImage;
use super::template::FormTemplate;

pub(crate) const OUTPUT_PREFIX: &str = "GMF-Form-Q-063M";
const NAME_PLACEHOLDER: &str = "no-name";
const FLATTEN_FONT: &str = "GfF1";
const FONT_SIZE: f64 = 10.0;

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("could not flatten filled form: {0}")]
    Flatten(#[source] lopdf::Error),
    #[error("could not serialize filled form: {0}")]
    Serialize(#[source] lopdf::Error),
}

/// Lock the populated form into static page content and serialize it.
pub(crate) fn finalize(
    form: FormTemplate,
    applicant_name: &str,
) -> Result<OutputArtifact, FinalizeError> {
    let (mut doc, images) = form.into_parts();
    flatten(&mut doc, &images).map_err(FinalizeError::Flatten)?;

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|err| FinalizeError::Serialize(err.into()))?;

    Ok(OutputArtifact {
        filename: output_filename(applicant_name),
        bytes,
    })
}

/// Derive the artifact filename from the applicant name and a unique
/// millisecond stamp: `GMF-Form-Q-063M-<sanitized>-<millis>.pdf`.
pub fn output_filename(applicant_name: &str) -> String {
    format!(
        "{OUTPUT_PREFIX}-{}-{}.pdf",
        sanitize_name(applicant_name),
        unique_millis()
    )
}

/// Collapse each maximal whitespace run to one underscore; a blank name
/// falls back to the documented placeholder.
fn sanitize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return NAME_PLACEHOLDER.to_string();
    }
    trimmed.split_whitespace().collect::<Vec<_>>().join("_")
}

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// Wall-clock milliseconds, bumped past the last value handed out so two
/// submissions in the same physical millisecond still get distinct stamps.
fn unique_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut stamped = now;
    let _ = LAST_STAMP.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
        stamped = if now > last { now } else { last + 1 };
        Some(stamped)
    });
    stamped
}

/// Replace every widget annotation with drawn page content, then strip the
/// interactive form so the output renders as a static document.
fn flatten(doc: &mut Document, images: &[(ObjectId, EmbeddedImage)]) -> lopdf::Result<()> {
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    let mut image_counter = 0usize;

    for page_id in page_ids {
        let plan = plan_page(doc, page_id, images, &mut image_counter)?;

        if plan.widgets_removed {
            let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
            if plan.kept_annotations.is_empty() {
                page.remove(b"Annots");
            } else {
                page.set("Annots", Object::Array(plan.kept_annotations));
            }
        }

        if !plan.ops.is_empty() {
            upsert_resources(doc, page_id, font_id, &plan.used_images)?;
            append_page_content(doc, page_id, plan.ops)?;
        }
    }

    let root_id = doc.trailer.get(b"Root").and_then(Object::as_reference)?;
    let catalog = doc.get_object_mut(root_id)?.as_dict_mut()?;
    catalog.remove(b"AcroForm");

    Ok(())
}

struct PagePlan {
    ops: String,
    used_images: Vec<(String, ObjectId)>,
    kept_annotations: Vec<Object>,
    widgets_removed: bool,
}

/// Read-only pass over one page: decide what to draw for each widget and
/// which annotations survive.
fn plan_page(
    doc: &Document,
    page_id: ObjectId,
    images: &[(ObjectId, EmbeddedImage)],
    image_counter: &mut usize,
) -> lopdf::Result<PagePlan> {
    let mut plan = PagePlan {
        ops: String::new(),
        used_images: Vec::new(),
        kept_annotations: Vec::new(),
        widgets_removed: false,
    };

    let entries: Vec<Object> = {
        let page = doc.get_object(page_id)?.as_dict()?;
        match page.get(b"Annots") {
            Ok(Object::Array(entries)) => entries.clone(),
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(entries)) => entries.clone(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    };

    for entry in entries {
        let widget = entry
            .as_reference()
            .ok()
            .and_then(|id| doc.get_object(id).ok().map(|obj| (id, obj)))
            .and_then(|(id, obj)| obj.as_dict().ok().map(|dict| (id, dict)))
            .filter(|(_, dict)| {
                matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name.as_slice() == b"Widget")
            });

        let Some((widget_id, widget_dict)) = widget else {
            plan.kept_annotations.push(entry);
            continue;
        };

        plan.widgets_removed = true;
        draw_widget(doc, widget_id, widget_dict, images, &mut plan, image_counter);
    }

    Ok(plan)
}

fn draw_widget(
    doc: &Document,
    widget_id: ObjectId,
    widget: &Dictionary,
    images: &[(ObjectId, EmbeddedImage)],
    plan: &mut PagePlan,
    image_counter: &mut usize,
) {
    let Some(rect) = chain_entry(doc, widget, b"Rect").and_then(|obj| parse_rect(doc, obj)) else {
        return;
    };

    match chain_entry(doc, widget, b"FT") {
        Some(Object::Name(ft)) if ft.as_slice() == b"Tx" => {
            if let Some(Object::String(value, _)) = chain_entry(doc, widget, b"V") {
                let text = String::from_utf8_lossy(value);
                if !text.is_empty() {
                    draw_text(&mut plan.ops, &rect, &text);
                }
            }
        }
        Some(Object::Name(ft)) if ft.as_slice() == b"Btn" => {
            let owners = field_ids(doc, widget_id);
            if let Some((_, embedded)) = images
                .iter()
                .find(|(field_id, _)| owners.contains(field_id))
            {
                let name = format!("GfImg{image_counter}");
                *image_counter += 1;
                draw_image(&mut plan.ops, &rect, &name, embedded);
                plan.used_images.push((name, embedded.xobject));
            } else if is_checked(widget) {
                draw_check(&mut plan.ops, &rect);
            }
        }
        _ => {}
    }
}

fn is_checked(widget: &Dictionary) -> bool {
    matches!(widget.get(b"AS"), Ok(Object::Name(state)) if state.as_slice() != b"Off")
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl Rect {
    fn width(self) -> f64 {
        self.x1 - self.x0
    }

    fn height(self) -> f64 {
        self.y1 - self.y0
    }
}

fn parse_rect(doc: &Document, object: &Object) -> Option<Rect> {
    let entries = match object {
        Object::Array(entries) => entries,
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Array(entries) => entries,
            _ => return None,
        },
        _ => return None,
    };
    if entries.len() != 4 {
        return None;
    }
    let values: Vec<f64> = entries.iter().filter_map(number).collect();
    if values.len() != 4 {
        return None;
    }
    Some(Rect {
        x0: values[0].min(values[2]),
        y0: values[1].min(values[3]),
        x1: values[0].max(values[2]),
        y1: values[1].max(values[3]),
    })
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

fn draw_text(ops: &mut String, rect: &Rect, value: &str) {
    let x = rect.x0 + 2.0;
    let y = rect.y0 + ((rect.height() - FONT_SIZE).max(0.0) / 2.0) + 2.0;
    writeln!(
        ops,
        "BT /{FLATTEN_FONT} {FONT_SIZE} Tf {x:.2} {y:.2} Td ({}) Tj ET",
        escape_pdf_text(value)
    )
    .expect("write text op");
}

fn draw_image(ops: &mut String, rect: &Rect, name: &str, image: &EmbeddedImage) {
    let scale = (rect.width() / f64::from(image.width))
        .min(rect.height() / f64::from(image.height));
    let width = f64::from(image.width) * scale;
    let height = f64::from(image.height) * scale;
    let x = rect.x0 + (rect.width() - width) / 2.0;
    let y = rect.y0 + (rect.height() - height) / 2.0;
    writeln!(
        ops,
        "q {width:.2} 0 0 {height:.2} {x:.2} {y:.2} cm /{name} Do Q"
    )
    .expect("write image op");
}

fn draw_check(ops: &mut String, rect: &Rect) {
    let inset = (rect.width().min(rect.height()) * 0.25).max(1.0);
    let (x0, y0) = (rect.x0 + inset, rect.y0 + inset);
    let (x1, y1) = (rect.x1 - inset, rect.y1 - inset);
    writeln!(
        ops,
        "q 1.5 w {x0:.2} {y0:.2} m {x1:.2} {y1:.2} l S {x0:.2} {y1:.2} m {x1:.2} {y0:.2} l S Q"
    )
    .expect("write check op");
}

fn escape_pdf_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\r' | '\n' => out.push(' '),
            other => out.push(other),
        }
    }
    out
}

/// Look up `key` on the widget itself or up its `/Parent` chain (bounded,
/// in case of a cyclic template).
fn chain_entry<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = dict;
    for _ in 0..4 {
        if let Ok(object) = current.get(key) {
            return Some(object);
        }
        let parent_id = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_object(parent_id).ok()?.as_dict().ok()?;
    }
    None
}

/// The widget plus every ancestor field object that may own it.
fn field_ids(doc: &Document, widget_id: ObjectId) -> Vec<ObjectId> {
    let mut ids = vec![widget_id];
    let mut current = widget_id;
    for _ in 0..4 {
        let Ok(dict) = doc.get_object(current).and_then(Object::as_dict) else {
            break;
        };
        let Some(parent_id) = dict
            .get(b"Parent")
            .ok()
            .and_then(|object| object.as_reference().ok())
        else {
            break;
        };
        ids.push(parent_id);
        current = parent_id;
    }
    ids
}

/// Materialize the page's resources inline and register the flattening
/// font plus any drawn image XObjects. Cloning referenced dictionaries
/// keeps sibling pages that share a resources object untouched.
fn upsert_resources(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
    used_images: &[(String, ObjectId)],
) -> lopdf::Result<()> {
    let mut resources = materialize_dict(doc, page_id, b"Resources")?;

    let mut fonts = materialize_entry(doc, &resources, b"Font")?;
    fonts.set(FLATTEN_FONT, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));

    if !used_images.is_empty() {
        let mut xobjects = materialize_entry(doc, &resources, b"XObject")?;
        for (name, id) in used_images {
            xobjects.set(name.as_bytes().to_vec(), Object::Reference(*id));
        }
        resources.set("XObject", Object::Dictionary(xobjects));
    }

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

fn materialize_dict(doc: &Document, owner_id: ObjectId, key: &[u8]) -> lopdf::Result<Dictionary> {
    let owner = doc.get_object(owner_id)?.as_dict()?;
    materialize_entry(doc, owner, key)
}

fn materialize_entry(doc: &Document, dict: &Dictionary, key: &[u8]) -> lopdf::Result<Dictionary> {
    Ok(match dict.get(key) {
        Ok(Object::Reference(id)) => doc.get_object(*id)?.as_dict()?.clone(),
        Ok(Object::Dictionary(inner)) => inner.clone(),
        _ => Dictionary::new(),
    })
}

/// Append the drawn ops as an extra content stream, preserving whatever
/// content the page already has.
fn append_page_content(doc: &mut Document, page_id: ObjectId, ops: String) -> lopdf::Result<()> {
    let stream_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));
    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;

    let current = page.get(b"Contents").map(Object::clone).ok();
    let contents = match current {
        Some(Object::Array(mut entries)) => {
            entries.push(Object::Reference(stream_id));
            Object::Array(entries)
        }
        Some(Object::Reference(existing)) => Object::Array(vec![
            Object::Reference(existing),
            Object::Reference(stream_id),
        ]),
        _ => Object::Array(vec![Object::Reference(stream_id)]),
    };
    page.set("Contents", contents);
    Ok(())
}

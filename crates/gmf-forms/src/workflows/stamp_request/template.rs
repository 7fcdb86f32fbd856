use std::collections::HashMap;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use thiserror::Error;

use super::image::EmbeddedImage;

/// Text fields the template contract guarantees. A variant missing one of
/// these would produce a mislabeled document, so their absence is fatal.
pub const MANDATORY_TEXT_FIELDS: [&str; 5] = ["name", "id", "unit", "jobTitle", "additionalInfo"];

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template PDF not found at {path}")]
    NotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("template PDF could not be parsed: {0}")]
    Unreadable(#[from] lopdf::Error),
    #[error("template PDF has no interactive form")]
    NoForm,
    #[error("template field '{name}' is missing")]
    FieldMissing { name: String },
    #[error("template field '{name}' is not a text field")]
    NotTextField { name: String },
    #[error("template field '{name}' is not a button field")]
    NotButtonField { name: String },
    #[error("option '{option}' is not available in group '{group}'")]
    OptionMissing { group: String, option: String },
}

/// Read the template bytes from disk, mapping a missing file onto the
/// dedicated contract error so the caller sees `TemplateNotFound`, not a
/// bare io error.
pub fn load_template_file(path: &Path) -> Result<Vec<u8>, TemplateError> {
    std::fs::read(path).map_err(|source| TemplateError::NotFound {
        path: path.display().to_string(),
        source,
    })
}

/// What the schema knows about a named field, derived from `/FT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Button,
    Other,
}

/// Typed handle onto one named form field.
#[derive(Debug, Clone, Copy)]
pub struct FieldHandle {
    pub id: ObjectId,
    pub kind: FieldKind,
}

/// The per-request working copy of the template: a parsed document plus a
/// name -> handle schema built once at load. All field access goes through
/// the schema instead of ad-hoc name lookups.
pub struct FormTemplate {
    doc: Document,
    fields: HashMap<String, FieldHandle>,
    images: Vec<(ObjectId, EmbeddedImage)>,
}

impl FormTemplate {
    /// Parse template bytes and validate the mandatory text-field contract.
    pub fn load(bytes: &[u8]) -> Result<Self, TemplateError> {
        let doc = Document::load_mem(bytes)?;
        let fields = index_fields(&doc)?;

        for name in MANDATORY_TEXT_FIELDS {
            match fields.get(name) {
                Some(handle) if handle.kind == FieldKind::Text => {}
                Some(_) => {
                    return Err(TemplateError::NotTextField {
                        name: name.to_string(),
                    })
                }
                None => {
                    return Err(TemplateError::FieldMissing {
                        name: name.to_string(),
                    })
                }
            }
        }

        Ok(Self {
            doc,
            fields,
            images: Vec::new(),
        })
    }

    pub fn field(&self, name: &str) -> Option<FieldHandle> {
        self.fields.get(name).copied()
    }

    /// Write a text field the contract guarantees; missing or mistyped
    /// fields are a broken contract, never a silent skip.
    pub fn set_mandatory_text(&mut self, name: &str, value: &str) -> Result<(), TemplateError> {
        let handle = self.field(name).ok_or_else(|| TemplateError::FieldMissing {
            name: name.to_string(),
        })?;
        if handle.kind != FieldKind::Text {
            return Err(TemplateError::NotTextField {
                name: name.to_string(),
            });
        }
        self.write_text(handle.id, value)
    }

    /// Write an approval-block field if this template variant carries it.
    pub fn set_optional_text(&mut self, name: &str, value: &str) {
        match self.field(name) {
            Some(handle) if handle.kind == FieldKind::Text => {
                if let Err(err) = self.write_text(handle.id, value) {
                    tracing::debug!(field = name, error = %err, "optional field write failed");
                }
            }
            _ => tracing::debug!(field = name, "optional field absent from template"),
        }
    }

    /// Current `/V` of a named text field, mostly useful to tests.
    pub fn text_value(&self, name: &str) -> Option<String> {
        let handle = self.field(name)?;
        let dict = self.doc.get_object(handle.id).ok()?.as_dict().ok()?;
        match dict.get(b"V") {
            Ok(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    /// Record an embedded image against a named button field; it is drawn
    /// into the field's widget rectangle at flatten time.
    pub fn attach_button_image(
        &mut self,
        name: &str,
        image: EmbeddedImage,
    ) -> Result<(), TemplateError> {
        let handle = self.field(name).ok_or_else(|| TemplateError::FieldMissing {
            name: name.to_string(),
        })?;
        if handle.kind != FieldKind::Button {
            return Err(TemplateError::NotButtonField {
                name: name.to_string(),
            });
        }
        self.images.push((handle.id, image));
        Ok(())
    }

    /// Select `option` inside the mutually exclusive group `group`: the kid
    /// widget carrying that appearance state is switched on, every other
    /// kid is switched off, and the group value records the choice.
    pub fn select_group_option(&mut self, group: &str, option: &str) -> Result<(), TemplateError> {
        let handle = self.field(group).ok_or_else(|| TemplateError::FieldMissing {
            name: group.to_string(),
        })?;
        if handle.kind != FieldKind::Button {
            return Err(TemplateError::NotButtonField {
                name: group.to_string(),
            });
        }

        let kids = self.kid_ids(handle.id);
        let states: Vec<(ObjectId, bool)> = kids
            .iter()
            .map(|&kid| (kid, self.widget_has_state(kid, option)))
            .collect();
        if !states.iter().any(|(_, has)| *has) {
            return Err(TemplateError::OptionMissing {
                group: group.to_string(),
                option: option.to_string(),
            });
        }

        for (kid, has) in states {
            let state: &[u8] = if has { option.as_bytes() } else { b"Off" };
            if let Ok(dict) = self.dict_mut(kid) {
                dict.set("AS", Object::Name(state.to_vec()));
            }
        }
        let dict = self.dict_mut(handle.id)?;
        dict.set("V", Object::Name(option.as_bytes().to_vec()));
        Ok(())
    }

    /// Toggle an independent checkbox-style field to its on-state.
    pub fn check_toggle(&mut self, name: &str) -> Result<(), TemplateError> {
        let handle = self.field(name).ok_or_else(|| TemplateError::FieldMissing {
            name: name.to_string(),
        })?;
        if handle.kind != FieldKind::Button {
            return Err(TemplateError::NotButtonField {
                name: name.to_string(),
            });
        }

        let on_state = self.toggle_on_state(handle.id);
        let dict = self.dict_mut(handle.id)?;
        dict.set("V", Object::Name(on_state.clone()));
        dict.set("AS", Object::Name(on_state));
        Ok(())
    }

    pub(crate) fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub(crate) fn into_parts(self) -> (Document, Vec<(ObjectId, EmbeddedImage)>) {
        (self.doc, self.images)
    }

    fn write_text(&mut self, id: ObjectId, value: &str) -> Result<(), TemplateError> {
        let dict = self.dict_mut(id)?;
        dict.set(
            "V",
            Object::String(value.as_bytes().to_vec(), StringFormat::Literal),
        );
        // Drop any stale appearance so the old rendering cannot survive.
        dict.remove(b"AP");
        Ok(())
    }

    fn dict_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary, TemplateError> {
        Ok(self.doc.get_object_mut(id)?.as_dict_mut()?)
    }

    fn kid_ids(&self, id: ObjectId) -> Vec<ObjectId> {
        let Ok(dict) = self.doc.get_object(id).and_then(Object::as_dict) else {
            return Vec::new();
        };
        match dict.get(b"Kids") {
            Ok(Object::Array(entries)) => entries
                .iter()
                .filter_map(|entry| entry.as_reference().ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Does this widget's normal appearance define `state`?
    fn widget_has_state(&self, id: ObjectId, state: &str) -> bool {
        self.appearance_states(id)
            .iter()
            .any(|known| known.as_slice() == state.as_bytes())
    }

    /// On-state of a standalone toggle: the first normal-appearance state
    /// that is not `Off`, defaulting to the conventional `Yes`.
    fn toggle_on_state(&self, id: ObjectId) -> Vec<u8> {
        self.appearance_states(id)
            .into_iter()
            .find(|state| state.as_slice() != b"Off")
            .unwrap_or_else(|| b"Yes".to_vec())
    }

    fn appearance_states(&self, id: ObjectId) -> Vec<Vec<u8>> {
        let Ok(dict) = self.doc.get_object(id).and_then(Object::as_dict) else {
            return Vec::new();
        };
        let Some(appearance) = self.resolve_dict(dict.get(b"AP").ok()) else {
            return Vec::new();
        };
        let Some(normal) = self.resolve_dict(appearance.get(b"N").ok()) else {
            return Vec::new();
        };
        normal.iter().map(|(key, _)| key.to_vec()).collect()
    }

    fn resolve_dict<'a>(&'a self, object: Option<&'a Object>) -> Option<&'a Dictionary> {
        match object? {
            Object::Reference(id) => self.doc.get_object(*id).ok()?.as_dict().ok(),
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }
}

impl std::fmt::Debug for FormTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormTemplate")
            .field("fields", &self.fields.len())
            .field("images", &self.images.len())
            .finish_non_exhaustive()
    }
}

/// Walk `/Root /AcroForm /Fields` into the name -> handle schema. Only
/// top-level fields carry names in this template family; radio kids are
/// reached through their parent.
fn index_fields(doc: &Document) -> Result<HashMap<String, FieldHandle>, TemplateError> {
    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(TemplateError::Unreadable)?;
    let catalog = doc.get_object(root_id)?.as_dict()?;

    let acro_form = match catalog.get(b"AcroForm") {
        Ok(Object::Reference(id)) => doc.get_object(*id)?.as_dict()?,
        Ok(Object::Dictionary(dict)) => dict,
        _ => return Err(TemplateError::NoForm),
    };
    let entries = match acro_form.get(b"Fields") {
        Ok(Object::Array(entries)) => entries,
        Ok(Object::Reference(id)) => match doc.get_object(*id)? {
            Object::Array(entries) => entries,
            _ => return Err(TemplateError::NoForm),
        },
        _ => return Err(TemplateError::NoForm),
    };

    let mut fields = HashMap::new();
    for entry in entries {
        let Ok(id) = entry.as_reference() else {
            continue;
        };
        let Ok(dict) = doc.get_object(id).and_then(Object::as_dict) else {
            continue;
        };
        let Ok(Object::String(name, _)) = dict.get(b"T") else {
            continue;
        };
        let kind = match dict.get(b"FT") {
            Ok(Object::Name(ft)) if ft.as_slice() == b"Tx" => FieldKind::Text,
            Ok(Object::Name(ft)) if ft.as_slice() == b"Btn" => FieldKind::Button,
            _ => FieldKind::Other,
        };
        fields.insert(
            String::from_utf8_lossy(name).into_owned(),
            FieldHandle { id, kind },
        );
    }
    Ok(fields)
}

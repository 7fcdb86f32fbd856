use std::fmt;

use thiserror::Error;

use super::domain::{SignatureSlot, SubmissionFiles, UploadedFile};
use super::image::{self, ImageError};
use super::template::{FormTemplate, TemplateError};

/// Why a single signature slot could not be embedded.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// A recovered per-slot failure. A bad or missing signature never aborts
/// the submission; it is reported alongside the successful result.
#[derive(Debug)]
pub struct SignatureWarning {
    pub slot: SignatureSlot,
    pub error: SignatureError,
}

impl fmt::Display for SignatureWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.slot, self.error)
    }
}

/// Attempt every signature slot in its fixed order, collecting failures
/// instead of short-circuiting. Empty slots are skipped silently.
pub(crate) fn attach_signatures(
    form: &mut FormTemplate,
    files: &SubmissionFiles,
) -> Vec<SignatureWarning> {
    let mut warnings = Vec::new();

    for slot in SignatureSlot::ALL {
        let Some(upload) = files.signature(slot) else {
            continue;
        };
        if let Err(error) = attach_slot(form, slot, upload) {
            tracing::warn!(slot = %slot, error = %error, "signature skipped");
            warnings.push(SignatureWarning { slot, error });
        }
    }

    warnings
}

fn attach_slot(
    form: &mut FormTemplate,
    slot: SignatureSlot,
    upload: &UploadedFile,
) -> Result<(), SignatureError> {
    let embedded = image::embed_from_path(form.doc_mut(), &upload.filepath)?;
    form.attach_button_image(slot.field_name(), embedded)?;
    Ok(())
}

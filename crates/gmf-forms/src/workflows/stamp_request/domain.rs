use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Text values captured from the submission form. Every field is optional
/// on the wire and defaults to empty; only `email` is validated (non-empty)
/// before the pipeline runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionFields {
    pub request_choice: String,
    pub name: String,
    pub id: String,
    pub unit: String,
    pub job_title: String,
    pub additional_info: String,
    pub email: String,
    pub division_head_name: String,
    pub division_head_date: String,
    pub user_name: String,
    pub user_date: String,
    pub qa_name: String,
    pub qa_date: String,
}

impl SubmissionFields {
    /// Accept one multipart text part under its wire name. Unknown names
    /// are ignored so template-side form tweaks do not break intake.
    pub fn apply(&mut self, field: &str, value: String) {
        match field {
            "requestChoice" => self.request_choice = value,
            "name" => self.name = value,
            "id" => self.id = value,
            "unit" => self.unit = value,
            "jobTitle" => self.job_title = value,
            "additionalInfo" => self.additional_info = value,
            "email" => self.email = value,
            "divisionHeadName" => self.division_head_name = value,
            "divisionHeadDate" => self.division_head_date = value,
            "userName" => self.user_name = value,
            "userDate" => self.user_date = value,
            "qaName" => self.qa_name = value,
            "qaDate" => self.qa_date = value,
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }
}

/// A file staged on local disk by the upload layer. The pipeline only ever
/// reads the staged path; lifetime and cleanup stay with the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub original_filename: Option<String>,
    pub filepath: PathBuf,
}

impl UploadedFile {
    /// Name to show in attachments: the browser-supplied filename when
    /// available, otherwise the staged file's basename.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.original_filename {
            if !name.is_empty() {
                return name.clone();
            }
        }
        self.filepath
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string())
    }
}

/// The three signature positions on the form, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureSlot {
    DivisionHead,
    User,
    Qa,
}

impl SignatureSlot {
    pub const ALL: [SignatureSlot; 3] =
        [SignatureSlot::DivisionHead, SignatureSlot::User, SignatureSlot::Qa];

    /// Button-field name in the template contract.
    pub fn field_name(self) -> &'static str {
        match self {
            SignatureSlot::DivisionHead => "divisionHeadSign",
            SignatureSlot::User => "userSign",
            SignatureSlot::Qa => "qaSign",
        }
    }
}

impl std::fmt::Display for SignatureSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

/// The file slots a submission may carry: three signatures plus three
/// supporting documents that ride along as plain mail attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionFiles {
    pub division_head_sign: Option<UploadedFile>,
    pub user_sign: Option<UploadedFile>,
    pub qa_sign: Option<UploadedFile>,
    pub license: Option<UploadedFile>,
    pub cv: Option<UploadedFile>,
    pub auth_letter: Option<UploadedFile>,
}

impl SubmissionFiles {
    /// Accept one staged upload under its wire name; unknown names are
    /// dropped (and logged) rather than treated as an error.
    pub fn apply(&mut self, field: &str, file: UploadedFile) {
        match field {
            "divisionHeadSign" => self.division_head_sign = Some(file),
            "userSign" => self.user_sign = Some(file),
            "qaSign" => self.qa_sign = Some(file),
            "license" => self.license = Some(file),
            "cv" => self.cv = Some(file),
            "authLetter" => self.auth_letter = Some(file),
            other => tracing::debug!(field = other, "ignoring unknown file field"),
        }
    }

    pub fn signature(&self, slot: SignatureSlot) -> Option<&UploadedFile> {
        match slot {
            SignatureSlot::DivisionHead => self.division_head_sign.as_ref(),
            SignatureSlot::User => self.user_sign.as_ref(),
            SignatureSlot::Qa => self.qa_sign.as_ref(),
        }
    }

    /// Supporting documents present on this submission, in attachment order.
    pub fn supporting_documents(&self) -> Vec<&UploadedFile> {
        [&self.license, &self.cv, &self.auth_letter]
            .into_iter()
            .filter_map(|slot| slot.as_ref())
            .collect()
    }
}

/// The "request type" radio choice. The wire codes come from the public
/// form; each maps onto exactly one checkbox identifier in the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestChoice {
    InitialStamp,
    InitialCoc,
    RenewalCoc,
    ChangeRating,
}

impl RequestChoice {
    /// Parse a wire code. Unrecognized codes yield `None`; the resolver
    /// skips selection for those rather than failing the submission.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "initial-stamp" => Some(Self::InitialStamp),
            "initial-coc" => Some(Self::InitialCoc),
            "renewal-coc" => Some(Self::RenewalCoc),
            "change-rating" => Some(Self::ChangeRating),
            _ => None,
        }
    }

    /// The template-side field identifier, total over the enum.
    pub fn checkbox_field(self) -> &'static str {
        match self {
            Self::InitialStamp => "CheckBox1",
            Self::InitialCoc => "CheckBox2",
            Self::RenewalCoc => "CheckBox3",
            Self::ChangeRating => "CheckBox4",
        }
    }
}

/// The finished product: flattened PDF bytes plus the generated filename.
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl OutputArtifact {
    /// Write the artifact under `dir`, returning the full path.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_choice_mapping_is_total() {
        let cases = [
            ("initial-stamp", RequestChoice::InitialStamp, "CheckBox1"),
            ("initial-coc", RequestChoice::InitialCoc, "CheckBox2"),
            ("renewal-coc", RequestChoice::RenewalCoc, "CheckBox3"),
            ("change-rating", RequestChoice::ChangeRating, "CheckBox4"),
        ];
        for (code, choice, field) in cases {
            assert_eq!(RequestChoice::parse(code), Some(choice));
            assert_eq!(choice.checkbox_field(), field);
        }
    }

    #[test]
    fn unrecognized_choice_parses_to_none() {
        assert_eq!(RequestChoice::parse("bogus"), None);
        assert_eq!(RequestChoice::parse(""), None);
        assert_eq!(RequestChoice::parse("Initial-Stamp"), None);
    }

    #[test]
    fn fields_apply_matches_wire_names() {
        let mut fields = SubmissionFields::default();
        fields.apply("jobTitle", "Inspector".to_string());
        fields.apply("email", "a@b.c".to_string());
        fields.apply("somethingElse", "dropped".to_string());
        assert_eq!(fields.job_title, "Inspector");
        assert_eq!(fields.email, "a@b.c");
        assert_eq!(fields.name, "");
    }

    #[test]
    fn display_name_prefers_original_filename() {
        let staged = UploadedFile {
            original_filename: Some("License Scan.pdf".to_string()),
            filepath: PathBuf::from("/tmp/upload-123.pdf"),
        };
        assert_eq!(staged.display_name(), "License Scan.pdf");

        let anonymous = UploadedFile {
            original_filename: None,
            filepath: PathBuf::from("/tmp/upload-456.pdf"),
        };
        assert_eq!(anonymous.display_name(), "upload-456.pdf");
    }
}

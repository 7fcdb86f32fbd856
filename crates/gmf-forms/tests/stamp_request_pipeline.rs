use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gmf_forms::workflows::stamp_request::{
    MailError, MailMessage, MailSender, SelectionOutcome, SignatureSlot, SubmissionError,
    SubmissionFields, SubmissionFiles, SubmissionService, TemplateError, UploadedFile,
};
use lopdf::{dictionary, Document, Object, ObjectId, StringFormat};

// --- synthetic template construction -----------------------------------

struct TemplateVariant {
    include_optional_fields: bool,
    linked_request_group: bool,
    skip_mandatory: Option<&'static str>,
}

impl Default for TemplateVariant {
    fn default() -> Self {
        Self {
            include_optional_fields: true,
            linked_request_group: true,
            skip_mandatory: None,
        }
    }
}

fn pdf_string(value: &str) -> Object {
    Object::String(value.as_bytes().to_vec(), StringFormat::Literal)
}

fn text_field(doc: &mut Document, name: &str, y: i64) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Tx",
        "T" => pdf_string(name),
        "Rect" => vec![50.into(), y.into(), 320.into(), (y + 18).into()],
    })
}

fn button_field(doc: &mut Document, name: &str, y: i64) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Btn",
        "T" => pdf_string(name),
        "Rect" => vec![350.into(), y.into(), 470.into(), (y + 40).into()],
    })
}

fn appearance(on_state: &str) -> Object {
    Object::Dictionary(dictionary! {
        "N" => dictionary! { on_state => Object::Null, "Off" => Object::Null },
    })
}

fn toggle_field(doc: &mut Document, name: &str, on_state: &str, y: i64) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Btn",
        "T" => pdf_string(name),
        "Rect" => vec![50.into(), y.into(), 66.into(), (y + 16).into()],
        "AS" => Object::Name(b"Off".to_vec()),
        "AP" => appearance(on_state),
    })
}

fn radio_group(doc: &mut Document) -> (ObjectId, Vec<ObjectId>) {
    let states = ["CheckBox1", "CheckBox2", "CheckBox3", "CheckBox4"];
    let kid_ids: Vec<ObjectId> = states
        .iter()
        .enumerate()
        .map(|(index, state)| {
            let y = 700 - (index as i64) * 20;
            doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "Rect" => vec![50.into(), y.into(), 66.into(), (y + 16).into()],
                "AS" => Object::Name(b"Off".to_vec()),
                "AP" => appearance(state),
            })
        })
        .collect();

    let kids: Vec<Object> = kid_ids.iter().map(|id| Object::Reference(*id)).collect();
    let group_id = doc.add_object(dictionary! {
        "FT" => "Btn",
        "T" => pdf_string("Request"),
        "Ff" => 32768_i64,
        "Kids" => kids,
    });
    for kid in &kid_ids {
        doc.get_object_mut(*kid)
            .expect("kid exists")
            .as_dict_mut()
            .expect("kid is a dict")
            .set("Parent", Object::Reference(group_id));
    }
    (group_id, kid_ids)
}

/// Build a one-page AcroForm template matching the Q-063M field contract.
fn build_template(variant: TemplateVariant) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");

    let mut field_ids: Vec<ObjectId> = Vec::new();
    let mut annot_ids: Vec<ObjectId> = Vec::new();

    let mandatory = ["name", "id", "unit", "jobTitle", "additionalInfo"];
    for (index, name) in mandatory.iter().enumerate() {
        if variant.skip_mandatory == Some(*name) {
            continue;
        }
        let id = text_field(&mut doc, name, 640 - (index as i64) * 24);
        field_ids.push(id);
        annot_ids.push(id);
    }

    if variant.include_optional_fields {
        let optional = [
            "divisionHeadName",
            "divisionHeadDate",
            "userName",
            "userDate",
            "qaName",
            "qaDate",
        ];
        for (index, name) in optional.iter().enumerate() {
            let id = text_field(&mut doc, name, 500 - (index as i64) * 24);
            field_ids.push(id);
            annot_ids.push(id);
        }
    }

    for (index, name) in ["divisionHeadSign", "userSign", "qaSign"]
        .iter()
        .enumerate()
    {
        let id = button_field(&mut doc, name, 500 - (index as i64) * 50);
        field_ids.push(id);
        annot_ids.push(id);
    }

    if variant.linked_request_group {
        let (group_id, kid_ids) = radio_group(&mut doc);
        field_ids.push(group_id);
        annot_ids.extend(kid_ids);
    } else {
        for (index, name) in ["CheckBox1", "CheckBox2", "CheckBox3", "CheckBox4"]
            .iter()
            .enumerate()
        {
            let id = toggle_field(&mut doc, name, name, 700 - (index as i64) * 20);
            field_ids.push(id);
            annot_ids.push(id);
        }
    }

    let annots: Vec<Object> = annot_ids.iter().map(|id| Object::Reference(*id)).collect();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Annots" => annots,
    });

    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => vec![Object::Reference(page_id)],
        "Count" => 1_i64,
    });
    doc.get_object_mut(page_id)
        .expect("page exists")
        .as_dict_mut()
        .expect("page is a dict")
        .set("Parent", Object::Reference(pages_id));

    let fields: Vec<Object> = field_ids.iter().map(|id| Object::Reference(*id)).collect();
    let acro_form_id = doc.add_object(dictionary! {
        "Fields" => fields,
    });

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
        "AcroForm" => Object::Reference(acro_form_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("template serializes");
    bytes
}

// --- mail doubles -------------------------------------------------------

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    fn messages(&self) -> Vec<MailMessage> {
        self.sent.lock().expect("mail mutex").clone()
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        self.sent.lock().expect("mail mutex").push(message);
        Ok(())
    }
}

struct FailingMailer;

#[async_trait]
impl MailSender for FailingMailer {
    async fn send(&self, _message: MailMessage) -> Result<(), MailError> {
        Err(MailError::Transport("connection refused".to_string()))
    }
}

// --- helpers ------------------------------------------------------------

fn contains(haystack: &[u8], needle: &str) -> bool {
    let needle = needle.as_bytes();
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn count_occurrences(haystack: &[u8], needle: &str) -> usize {
    let needle = needle.as_bytes();
    haystack
        .windows(needle.len())
        .filter(|window| *window == needle)
        .count()
}

fn service_with(
    variant: TemplateVariant,
    mailer: Arc<RecordingMailer>,
) -> SubmissionService<RecordingMailer> {
    SubmissionService::new(build_template(variant), mailer)
}

fn jane_fields() -> SubmissionFields {
    SubmissionFields {
        name: "Jane Smith".to_string(),
        email: "jane@x.com".to_string(),
        request_choice: "initial-stamp".to_string(),
        ..SubmissionFields::default()
    }
}

fn upload(path: PathBuf) -> UploadedFile {
    UploadedFile {
        original_filename: None,
        filepath: path,
    }
}

fn write_png(dir: &std::path::Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    image::RgbaImage::from_pixel(6, 4, image::Rgba([20, 20, 140, 255]))
        .save(&path)
        .expect("test png written");
    path
}

// --- pipeline tests -----------------------------------------------------

#[tokio::test]
async fn end_to_end_submission_mails_the_flattened_pdf() {
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(TemplateVariant::default(), mailer.clone());

    let outcome = service
        .submit(jane_fields(), SubmissionFiles::default())
        .await
        .expect("submission succeeds");

    let stamp = outcome
        .pdf_filename
        .strip_prefix("GMF-Form-Q-063M-Jane_Smith-")
        .and_then(|rest| rest.strip_suffix(".pdf"))
        .expect("filename keeps the documented shape");
    assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    assert!(outcome.warnings.is_empty());
    assert_eq!(
        outcome.selection,
        SelectionOutcome::Group { field: "CheckBox1" }
    );

    let messages = mailer.messages();
    assert_eq!(messages.len(), 1);
    let message = &messages[0];
    assert_eq!(message.to, "jane@x.com");
    assert_eq!(message.subject, "Your GMF Q-063M Submission - Jane Smith");
    assert!(message.body.contains("Dear Jane Smith"));
    assert_eq!(message.attachments.len(), 1);
    assert_eq!(message.attachments[0].filename, outcome.pdf_filename);

    let pdf = &message.attachments[0].content;
    assert!(pdf.starts_with(b"%PDF"));
    assert!(contains(pdf, "(Jane Smith) Tj"));
    // Free-text note defaults to a dash.
    assert!(contains(pdf, "(-) Tj"));
    // Exactly one check cross: the selected request type.
    assert_eq!(count_occurrences(pdf, "q 1.5 w"), 1);
    // Flattened output carries no interactive form.
    assert!(!contains(pdf, "/AcroForm"));
}

#[tokio::test]
async fn missing_email_rejects_before_any_processing() {
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(TemplateVariant::default(), mailer.clone());

    let mut fields = jane_fields();
    fields.email = "   ".to_string();

    let err = service
        .submit(fields, SubmissionFiles::default())
        .await
        .expect_err("email is mandatory");
    assert!(matches!(err, SubmissionError::MissingEmail));
    assert!(mailer.messages().is_empty());
}

#[test]
fn missing_mandatory_field_breaks_the_template_contract() {
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(
        TemplateVariant {
            skip_mandatory: Some("name"),
            ..TemplateVariant::default()
        },
        mailer,
    );

    let err = service
        .process(&jane_fields(), &SubmissionFiles::default())
        .expect_err("contract violation is fatal");
    assert!(matches!(
        err,
        SubmissionError::Template(TemplateError::FieldMissing { ref name }) if name == "name"
    ));
}

#[test]
fn missing_optional_fields_are_tolerated() {
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(
        TemplateVariant {
            include_optional_fields: false,
            ..TemplateVariant::default()
        },
        mailer,
    );

    let mut fields = jane_fields();
    fields.division_head_name = "Head of Division".to_string();
    fields.qa_date = "2025-11-01".to_string();

    let (artifact, warnings, _) = service
        .process(&fields, &SubmissionFiles::default())
        .expect("optional absence never blocks finalization");
    assert!(warnings.is_empty());
    assert!(contains(&artifact.bytes, "(Jane Smith) Tj"));
}

#[test]
fn bad_signature_is_isolated_from_the_rest_of_the_document() {
    let dir = tempfile::tempdir().expect("temp dir");
    let gif_path = dir.path().join("qa-sign.gif");
    std::fs::write(&gif_path, b"GIF89a not really").expect("gif written");
    let png_path = write_png(dir.path(), "user-sign.png");

    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(TemplateVariant::default(), mailer);

    let files = SubmissionFiles {
        user_sign: Some(upload(png_path)),
        qa_sign: Some(upload(gif_path)),
        ..SubmissionFiles::default()
    };

    let (artifact, warnings, selection) = service
        .process(&jane_fields(), &files)
        .expect("a bad signature never aborts the submission");

    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].slot, SignatureSlot::Qa);
    assert_eq!(selection, SelectionOutcome::Group { field: "CheckBox1" });

    // Everything else still landed: text fields, the good signature, and
    // the request-type selection.
    assert!(contains(&artifact.bytes, "(Jane Smith) Tj"));
    assert!(contains(&artifact.bytes, "/GfImg0 Do"));
    assert_eq!(count_occurrences(&artifact.bytes, "q 1.5 w"), 1);
}

#[test]
fn renewal_coc_selects_checkbox3_through_the_group() {
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(TemplateVariant::default(), mailer);

    let mut fields = jane_fields();
    fields.request_choice = "renewal-coc".to_string();

    let (artifact, _, selection) = service
        .process(&fields, &SubmissionFiles::default())
        .expect("submission succeeds");
    assert_eq!(selection, SelectionOutcome::Group { field: "CheckBox3" });
    assert_eq!(count_occurrences(&artifact.bytes, "q 1.5 w"), 1);
}

#[test]
fn renewal_coc_falls_back_to_the_independent_checkbox() {
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(
        TemplateVariant {
            linked_request_group: false,
            ..TemplateVariant::default()
        },
        mailer,
    );

    let mut fields = jane_fields();
    fields.request_choice = "renewal-coc".to_string();

    let (artifact, _, selection) = service
        .process(&fields, &SubmissionFiles::default())
        .expect("submission succeeds");
    assert_eq!(
        selection,
        SelectionOutcome::Checkbox { field: "CheckBox3" }
    );
    assert_eq!(count_occurrences(&artifact.bytes, "q 1.5 w"), 1);
}

#[test]
fn unrecognized_request_choice_selects_nothing() {
    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(TemplateVariant::default(), mailer);

    let mut fields = jane_fields();
    fields.request_choice = "bogus".to_string();

    let (artifact, warnings, selection) = service
        .process(&fields, &SubmissionFiles::default())
        .expect("unknown codes are not an error");
    assert_eq!(selection, SelectionOutcome::Unresolved);
    assert!(warnings.is_empty());
    assert_eq!(count_occurrences(&artifact.bytes, "q 1.5 w"), 0);
}

#[tokio::test]
async fn supporting_documents_ride_along_under_their_display_names() {
    let dir = tempfile::tempdir().expect("temp dir");
    let license_path = dir.path().join("staged-license.pdf");
    std::fs::write(&license_path, b"%PDF-1.4 fake license").expect("license written");

    let mailer = Arc::new(RecordingMailer::default());
    let service = service_with(TemplateVariant::default(), mailer.clone());

    let files = SubmissionFiles {
        license: Some(UploadedFile {
            original_filename: Some("Company License.pdf".to_string()),
            filepath: license_path,
        }),
        ..SubmissionFiles::default()
    };

    let outcome = service
        .submit(jane_fields(), files)
        .await
        .expect("submission succeeds");

    let messages = mailer.messages();
    assert_eq!(messages.len(), 1);
    let names: Vec<&str> = messages[0]
        .attachments
        .iter()
        .map(|attachment| attachment.filename.as_str())
        .collect();
    assert_eq!(names, vec![outcome.pdf_filename.as_str(), "Company License.pdf"]);
}

#[tokio::test]
async fn mail_failure_surfaces_even_though_the_pdf_was_generated() {
    let service =
        SubmissionService::new(build_template(TemplateVariant::default()), Arc::new(FailingMailer));

    let err = service
        .submit(jane_fields(), SubmissionFiles::default())
        .await
        .expect_err("transport failure must be visible to the caller");
    assert!(matches!(err, SubmissionError::Mail(MailError::Transport(_))));
}

#[test]
fn unreadable_template_bytes_fail_cleanly() {
    let mailer = Arc::new(RecordingMailer::default());
    let service = SubmissionService::new(b"this is not a pdf".to_vec(), mailer);

    let err = service
        .process(&jane_fields(), &SubmissionFiles::default())
        .expect_err("garbage bytes cannot load");
    assert!(matches!(
        err,
        SubmissionError::Template(TemplateError::Unreadable(_))
    ));
}

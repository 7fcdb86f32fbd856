use std::sync::Arc;

use super::domain::{OutputArtifact, SubmissionFields, SubmissionFiles};
use super::finalize::{self, FinalizeError};
use super::mailer::{MailAttachment, MailError, MailMessage, MailSender};
use super::selection::{self, SelectionOutcome};
use super::signatures::{self, SignatureWarning};
use super::template::{FormTemplate, TemplateError};
use super::{populate, template};

/// Orchestrates one submission end to end. Template bytes and the mail
/// transport are injected; the service itself holds no environment state
/// and nothing survives a request beyond the returned outcome.
pub struct SubmissionService<M> {
    template_bytes: Arc<Vec<u8>>,
    mailer: Arc<M>,
}

/// What the caller learns about a processed submission.
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub pdf_filename: String,
    pub warnings: Vec<SignatureWarning>,
    pub selection: SelectionOutcome,
}

/// Fatal submission failures. Per-signature trouble and unresolved
/// request-type selection are not here: those are carried as warnings and
/// outcomes on the success path.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("email is required")]
    MissingEmail,
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
    #[error("could not write output artifact: {0}")]
    Artifact(#[source] std::io::Error),
    #[error("could not read attachment '{name}': {source}")]
    Attachment {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Mail(#[from] MailError),
}

impl<M> SubmissionService<M>
where
    M: MailSender + 'static,
{
    pub fn new(template_bytes: Vec<u8>, mailer: Arc<M>) -> Self {
        Self {
            template_bytes: Arc::new(template_bytes),
            mailer,
        }
    }

    /// Convenience constructor reading the template from disk, so callers
    /// get the dedicated `TemplateError::NotFound` on a bad path.
    pub fn from_template_path(
        path: &std::path::Path,
        mailer: Arc<M>,
    ) -> Result<Self, TemplateError> {
        Ok(Self::new(template::load_template_file(path)?, mailer))
    }

    /// Run the document pipeline (populate, sign, select, flatten) without
    /// dispatching mail. Used by `submit`, the offline fill command, and
    /// tests.
    pub fn process(
        &self,
        fields: &SubmissionFields,
        files: &SubmissionFiles,
    ) -> Result<(OutputArtifact, Vec<SignatureWarning>, SelectionOutcome), SubmissionError> {
        let mut form = FormTemplate::load(&self.template_bytes)?;
        populate::populate_text_fields(&mut form, fields)?;
        let warnings = signatures::attach_signatures(&mut form, files);
        let selection = selection::resolve_request_type(&mut form, &fields.request_choice);
        let artifact = finalize::finalize(form, &fields.name)?;
        Ok((artifact, warnings, selection))
    }

    /// Process the submission and mail the flattened PDF plus any
    /// supporting documents back to the submitter.
    pub async fn submit(
        &self,
        fields: SubmissionFields,
        files: SubmissionFiles,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        if fields.email.trim().is_empty() {
            return Err(SubmissionError::MissingEmail);
        }

        let (artifact, warnings, selection) = self.process(&fields, &files)?;

        let staged = artifact
            .write_to(&std::env::temp_dir())
            .map_err(SubmissionError::Artifact)?;
        tracing::debug!(path = %staged.display(), "output artifact staged");

        let pdf_filename = artifact.filename.clone();
        let mut attachments = vec![MailAttachment {
            filename: artifact.filename,
            content: artifact.bytes,
        }];
        for upload in files.supporting_documents() {
            let content =
                std::fs::read(&upload.filepath).map_err(|source| SubmissionError::Attachment {
                    name: upload.display_name(),
                    source,
                })?;
            attachments.push(MailAttachment {
                filename: upload.display_name(),
                content,
            });
        }

        let message = MailMessage {
            to: fields.email.clone(),
            subject: format!("Your GMF Q-063M Submission - {}", fields.name),
            body: format!(
                "Dear {},\n\nThank you for submitting!\n\nRegards,\nGMF AeroAsia",
                fields.name
            ),
            attachments,
        };
        self.mailer.send(message).await?;

        tracing::info!(to = %fields.email, pdf = %pdf_filename, "submission processed and mailed");
        Ok(SubmissionOutcome {
            pdf_filename,
            warnings,
            selection,
        })
    }
}

impl<M> std::fmt::Debug for SubmissionService<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionService")
            .field("template_bytes", &self.template_bytes.len())
            .finish_non_exhaustive()
    }
}

//! Q-063M stamp/CoC request intake: merge a submission into the template
//! PDF, flatten it, and mail the result back to the submitter.
//!
//! The pipeline runs in a fixed order: populate text fields, attach
//! signature images, resolve the request-type selection, flatten.
//! Per-signature failures are collected as warnings instead of aborting
//! the run; only a broken template contract or a failed mail dispatch is
//! fatal.

pub mod domain;
mod finalize;
mod image;
pub mod mailer;
mod populate;
mod selection;
pub mod service;
mod signatures;
pub mod template;

pub use domain::{
    OutputArtifact, RequestChoice, SignatureSlot, SubmissionFields, SubmissionFiles, UploadedFile,
};
pub use finalize::{output_filename, FinalizeError};
pub use image::ImageError;
pub use mailer::{HttpApiMailer, MailAttachment, MailError, MailMessage, MailSender, NullMailer};
pub use selection::SelectionOutcome;
pub use service::{SubmissionError, SubmissionOutcome, SubmissionService};
pub use signatures::{SignatureError, SignatureWarning};
pub use template::{FormTemplate, TemplateError};

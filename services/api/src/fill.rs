use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use gmf_forms::config::AppConfig;
use gmf_forms::error::AppError;
use gmf_forms::workflows::stamp_request::{
    NullMailer, SubmissionFields, SubmissionFiles, SubmissionService, UploadedFile,
};

#[derive(Args, Debug)]
pub(crate) struct FillArgs {
    /// Template PDF to fill (defaults to the configured PDF_TEMPLATE)
    #[arg(long)]
    template: Option<PathBuf>,
    /// Applicant name
    #[arg(long, default_value = "")]
    name: String,
    /// Employee id
    #[arg(long, default_value = "")]
    id: String,
    /// Unit
    #[arg(long, default_value = "")]
    unit: String,
    /// Job title
    #[arg(long, default_value = "")]
    job_title: String,
    /// Free-text note (renders as "-" when omitted)
    #[arg(long, default_value = "")]
    additional_info: String,
    /// Request type code: initial-stamp, initial-coc, renewal-coc, change-rating
    #[arg(long, default_value = "")]
    request_choice: String,
    /// Signature image for the division head slot
    #[arg(long)]
    division_head_sign: Option<PathBuf>,
    /// Signature image for the user slot
    #[arg(long)]
    user_sign: Option<PathBuf>,
    /// Signature image for the QA slot
    #[arg(long)]
    qa_sign: Option<PathBuf>,
    /// Directory to write the flattened PDF into
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

/// Run the document pipeline against a template on disk and write the
/// flattened result locally. No email involved.
pub(crate) fn run_fill(args: FillArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let template_path = args.template.unwrap_or(config.template.path);

    let service = SubmissionService::from_template_path(&template_path, Arc::new(NullMailer))
        .map_err(|err| AppError::Submission(err.into()))?;

    let fields = SubmissionFields {
        request_choice: args.request_choice,
        name: args.name,
        id: args.id,
        unit: args.unit,
        job_title: args.job_title,
        additional_info: args.additional_info,
        ..SubmissionFields::default()
    };
    let files = SubmissionFiles {
        division_head_sign: args.division_head_sign.map(staged),
        user_sign: args.user_sign.map(staged),
        qa_sign: args.qa_sign.map(staged),
        ..SubmissionFiles::default()
    };

    let (artifact, warnings, selection) = service
        .process(&fields, &files)
        .map_err(AppError::Submission)?;
    let written = artifact.write_to(&args.out_dir)?;

    println!("Wrote {}", written.display());
    for warning in &warnings {
        println!("warning: {warning}");
    }
    println!("request-type selection: {selection:?}");
    Ok(())
}

fn staged(path: PathBuf) -> UploadedFile {
    UploadedFile {
        original_filename: None,
        filepath: path,
    }
}

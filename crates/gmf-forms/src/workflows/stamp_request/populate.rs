use super::domain::SubmissionFields;
use super::template::{FormTemplate, TemplateError};

/// Merge the submission's text values into the template. The five contract
/// fields must land; the approval block is written only where this template
/// variant carries it.
pub(crate) fn populate_text_fields(
    form: &mut FormTemplate,
    fields: &SubmissionFields,
) -> Result<(), TemplateError> {
    form.set_mandatory_text("name", &fields.name)?;
    form.set_mandatory_text("id", &fields.id)?;
    form.set_mandatory_text("unit", &fields.unit)?;
    form.set_mandatory_text("jobTitle", &fields.job_title)?;

    // The free-text note renders a dash rather than an empty box.
    let info: &str = if fields.additional_info.is_empty() {
        "-"
    } else {
        &fields.additional_info
    };
    form.set_mandatory_text("additionalInfo", info)?;

    let approval_block = [
        ("divisionHeadName", &fields.division_head_name),
        ("divisionHeadDate", &fields.division_head_date),
        ("userName", &fields.user_name),
        ("userDate", &fields.user_date),
        ("qaName", &fields.qa_name),
        ("qaDate", &fields.qa_date),
    ];
    for (name, value) in approval_block {
        form.set_optional_text(name, value);
    }

    Ok(())
}

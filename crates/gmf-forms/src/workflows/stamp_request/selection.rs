use super::domain::RequestChoice;
use super::template::FormTemplate;

/// Name of the mutually exclusive option group in templates that link the
/// four request checkboxes together.
pub(crate) const REQUEST_GROUP: &str = "Request";

/// How the request-type selection landed in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// Selected through the linked `Request` group.
    Group { field: &'static str },
    /// Group lookup failed; the same-named independent checkbox was
    /// toggled instead.
    Checkbox { field: &'static str },
    /// Unrecognized choice or no matching field; the document is untouched.
    Unresolved,
}

/// Resolve the submitted request-type code against the template.
///
/// Template authors implement "pick one of four" either as a single linked
/// group or as four independent toggles, so resolution runs two ordered
/// strategies and degrades to a logged no-op when neither applies.
pub(crate) fn resolve_request_type(form: &mut FormTemplate, code: &str) -> SelectionOutcome {
    let Some(choice) = RequestChoice::parse(code) else {
        tracing::info!(code, "no checkbox mapping for request choice");
        return SelectionOutcome::Unresolved;
    };
    let field = choice.checkbox_field();

    match form.select_group_option(REQUEST_GROUP, field) {
        Ok(()) => {
            tracing::debug!(field, group = REQUEST_GROUP, "request type selected in group");
            return SelectionOutcome::Group { field };
        }
        Err(err) => {
            tracing::debug!(field, error = %err, "group selection failed, trying checkbox");
        }
    }

    match form.check_toggle(field) {
        Ok(()) => {
            tracing::debug!(field, "request type checked individually");
            SelectionOutcome::Checkbox { field }
        }
        Err(err) => {
            tracing::warn!(field, error = %err, "checkbox/radio field not found");
            SelectionOutcome::Unresolved
        }
    }
}

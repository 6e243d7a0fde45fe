use bureau_core::{AppError, AppResult, UserId};
use bureau_domain::lookup_path;
use serde::Deserialize;
use serde_json::Value;

use super::ExecutorError;

/// Recipient selection shared by notifying executors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct RecipientParams {
    pub(crate) recipient_id: Option<UserId>,
    pub(crate) recipient_field: Option<String>,
}

impl RecipientParams {
    pub(crate) fn validate(&self) -> AppResult<()> {
        match (&self.recipient_id, self.recipient_field.as_deref()) {
            (Some(_), None) => Ok(()),
            (None, Some(field)) if !field.trim().is_empty() => Ok(()),
            _ => Err(AppError::Validation(
                "exactly one of recipient_id or recipient_field is required".to_owned(),
            )),
        }
    }

    pub(crate) fn resolve(&self, trigger_context: &Value) -> Result<UserId, ExecutorError> {
        if let Some(recipient_id) = self.recipient_id {
            return Ok(recipient_id);
        }

        let field = self.recipient_field.as_deref().unwrap_or_default();
        let value = lookup_path(trigger_context, field)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ExecutorError::Fatal(format!("trigger context has no recipient at '{field}'"))
            })?;

        UserId::parse(value).map_err(|error| ExecutorError::Fatal(error.to_string()))
    }
}

/// Replaces `{{path}}` placeholders with values from the trigger context.
///
/// Missing paths render as an empty string.
pub(crate) fn interpolate(template: &str, trigger_context: &Value) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            rendered.push_str(&rest[start..]);
            return rendered;
        };

        let path = after_open[..end].trim();
        match lookup_path(trigger_context, path) {
            Some(Value::String(value)) => rendered.push_str(value),
            Some(Value::Null) | None => {}
            Some(value) => rendered.push_str(&value.to_string()),
        }
        rest = &after_open[end + 2..];
    }

    rendered.push_str(rest);
    rendered
}

#[cfg(test)]
mod tests {
    use bureau_core::UserId;
    use serde_json::json;

    use super::{RecipientParams, interpolate};

    #[test]
    fn interpolate_replaces_known_paths_and_blanks_missing_ones() {
        let context = json!({"customer": {"name": "ACME"}, "count": 3});
        assert_eq!(
            interpolate("Hi {{ customer.name }}, {{count}} items{{missing}}!", &context),
            "Hi ACME, 3 items!"
        );
    }

    #[test]
    fn interpolate_keeps_unterminated_placeholder() {
        assert_eq!(interpolate("broken {{name", &json!({})), "broken {{name");
    }

    #[test]
    fn recipient_requires_exactly_one_source() {
        let both = RecipientParams {
            recipient_id: Some(UserId::new()),
            recipient_field: Some("owner_id".to_owned()),
        };
        let neither = RecipientParams {
            recipient_id: None,
            recipient_field: None,
        };
        assert!(both.validate().is_err());
        assert!(neither.validate().is_err());
    }

    #[test]
    fn recipient_field_is_resolved_from_trigger_context() {
        let user_id = UserId::new();
        let params = RecipientParams {
            recipient_id: None,
            recipient_field: Some("appointment.owner_id".to_owned()),
        };

        let resolved = params.resolve(&json!({"appointment": {"owner_id": user_id.to_string()}}));
        assert_eq!(resolved.ok(), Some(user_id));
        assert!(params.resolve(&json!({})).is_err());
    }
}

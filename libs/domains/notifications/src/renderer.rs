//! Multipart email rendering.

use crate::error::{NotificationError, NotificationResult};
use crate::models::NotificationEvent;
use crate::templates::{EmailTemplate, TemplateVars};
use serde_json::Value;

/// A fully rendered email, ready for transmission. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub from: String,
    pub to: String,
    /// Empty means no Cc header.
    pub cc: Vec<String>,
    /// Empty means no Bcc recipients.
    pub bcc: Vec<String>,
    pub subject: String,
    pub plaintext: String,
    pub html: String,
}

/// Renders events through a plaintext and an HTML template.
///
/// Values substituted into the HTML template are escaped; the plaintext
/// template receives them verbatim.
#[derive(Debug, Clone)]
pub struct EmailRenderer {
    from_address: String,
    plaintext: EmailTemplate,
    html: EmailTemplate,
}

impl EmailRenderer {
    pub fn new(
        from_address: impl Into<String>,
        plaintext_template: impl Into<String>,
        html_template: impl Into<String>,
    ) -> Self {
        Self {
            from_address: from_address.into(),
            plaintext: EmailTemplate::plaintext(plaintext_template),
            html: EmailTemplate::html(html_template),
        }
    }

    pub fn render(&self, event: &NotificationEvent) -> NotificationResult<RenderedEmail> {
        let fields = event_fields(event)?;

        let plaintext = self
            .plaintext
            .substitute(&template_vars(&fields, |value| value.to_string()))?;
        let html = self
            .html
            .substitute(&template_vars(&fields, |value| {
                handlebars::html_escape(value)
            }))?;

        Ok(RenderedEmail {
            from: self.from_address.clone(),
            to: event.recipient_email.clone(),
            cc: event.email_cc.clone(),
            bcc: event.email_bcc.clone(),
            subject: event.subject.clone(),
            plaintext,
            html,
        })
    }
}

fn event_fields(event: &NotificationEvent) -> NotificationResult<serde_json::Map<String, Value>> {
    match serde_json::to_value(event) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(NotificationError::InvalidEvent(format!(
            "expected an object, got {}",
            other
        ))),
        Err(err) => Err(NotificationError::InvalidEvent(err.to_string())),
    }
}

/// Flatten event fields into template values, passing each scalar through
/// `escape`. Lists are escaped element-wise then joined with ", ".
fn template_vars(
    fields: &serde_json::Map<String, Value>,
    escape: impl Fn(&str) -> String,
) -> TemplateVars {
    let scalar = |value: &Value| match value {
        Value::String(s) => escape(s),
        Value::Null => String::new(),
        other => escape(&other.to_string()),
    };

    fields
        .iter()
        .map(|(name, value)| {
            let rendered = match value {
                Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(", "),
                other => scalar(other),
            };
            (name.clone(), rendered)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{DEFAULT_HTML_TEMPLATE, DEFAULT_PLAINTEXT_TEMPLATE, TemplateKind};

    fn event() -> NotificationEvent {
        NotificationEvent {
            recipient_email: "test@example.com".to_string(),
            email_cc: vec!["test2@test.com".to_string(), "test3@test.com".to_string()],
            email_bcc: vec!["test4@test.com".to_string(), "test5@test.com".to_string()],
            subject: "Test123".to_string(),
            recipient_name: "Yolanda Martinez".to_string(),
            plaintext_body: "Where are you, where are you, Yolanda?".to_string(),
        }
    }

    fn default_renderer() -> EmailRenderer {
        EmailRenderer::new(
            "notifications@example.com",
            DEFAULT_PLAINTEXT_TEMPLATE,
            DEFAULT_HTML_TEMPLATE,
        )
    }

    #[test]
    fn test_render_headers() {
        let email = default_renderer().render(&event()).unwrap();

        assert_eq!(email.from, "notifications@example.com");
        assert_eq!(email.to, "test@example.com");
        assert_eq!(email.cc, vec!["test2@test.com", "test3@test.com"]);
        assert_eq!(email.bcc, vec!["test4@test.com", "test5@test.com"]);
        assert_eq!(email.subject, "Test123");
    }

    #[test]
    fn test_render_default_templates() {
        let email = default_renderer().render(&event()).unwrap();

        assert_eq!(
            email.plaintext,
            "Dear Yolanda Martinez,\n\nWhere are you, where are you, Yolanda?\n\nWarm regards,\n\nThe Team"
        );
        assert!(email.html.contains("<h2>Dear Yolanda Martinez,</h2>"));
        assert!(email.html.contains("<p>Where are you, where are you, Yolanda?</p>"));
    }

    #[test]
    fn test_html_part_is_escaped_plaintext_is_not() {
        let mut event = event();
        event.recipient_name = "<p>Yolanda Martinez</p>".to_string();
        event.plaintext_body = "<script>alert('x')</script>".to_string();

        let email = default_renderer().render(&event).unwrap();

        assert!(email.plaintext.contains("<p>Yolanda Martinez</p>"));
        assert!(email.plaintext.contains("<script>alert('x')</script>"));

        assert!(email.html.contains("&lt;p&gt;Yolanda Martinez&lt;/p&gt;"));
        assert!(email.html.contains("&lt;script&gt;"));
        assert!(!email.html.contains("<script>"));
        assert!(!email.html.contains("<p>Yolanda"));
    }

    #[test]
    fn test_list_fields_are_joined_and_escaped_per_element() {
        let mut event = event();
        event.email_cc = vec!["a@x.com".to_string(), "<b>@x.com".to_string()];
        let renderer = EmailRenderer::new("from@example.com", "cc: $email_cc", "cc: $email_cc");

        let email = renderer.render(&event).unwrap();

        assert_eq!(email.plaintext, "cc: a@x.com, <b>@x.com");
        assert_eq!(email.html, "cc: a@x.com, &lt;b&gt;@x.com");
    }

    #[test]
    fn test_every_event_field_is_available() {
        let renderer = EmailRenderer::new(
            "from@example.com",
            "$recipient_email|$subject|$email_bcc",
            "${subject}",
        );

        let email = renderer.render(&event()).unwrap();
        assert_eq!(
            email.plaintext,
            "test@example.com|Test123|test4@test.com, test5@test.com"
        );
        assert_eq!(email.html, "Test123");
    }

    #[test]
    fn test_missing_variable_fails_render() {
        let renderer = EmailRenderer::new("from@example.com", "Hi $unknown_field", "<p></p>");

        let err = renderer.render(&event()).unwrap_err();
        match err {
            NotificationError::MissingTemplateVariable {
                variable,
                template_type,
            } => {
                assert_eq!(variable, "unknown_field");
                assert_eq!(template_type, TemplateKind::Plaintext);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_html_template_reports_html() {
        let renderer = EmailRenderer::new("from@example.com", "ok", "<p>costs 5$</p>");

        let err = renderer.render(&event()).unwrap_err();
        assert!(matches!(
            err,
            NotificationError::MalformedTemplate {
                template_type: TemplateKind::Html,
                ..
            }
        ));
    }
}

//! Server-rendered HTML for the client-facing flow.
//!
//! Every user-supplied value goes through [`escape_html`]. Template bodies
//! are staff-authored HTML and are inserted as-is.

use super::form::ConsentFormInput;
use super::model::{ConsentTemplate, Submission};
use super::questions::{answer_label, QuestionKind, HEALTH_QUESTIONS};
use super::validation::ValidationErrors;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 46rem; margin: 2rem auto; padding: 0 1rem; color: #222; }
label { display: block; margin-top: 1rem; font-weight: 600; }
input[type=text], input[type=email], input[type=date], textarea, select { width: 100%; padding: .4rem; }
.errors { color: #b00020; margin: .25rem 0; padding-left: 1.2rem; }
.terms { border: 1px solid #ddd; padding: 1rem; background: #fafafa; }
#signature-pad { border: 1px solid #999; touch-action: none; background: #fff; }
dt { font-weight: 600; margin-top: .5rem; }
"#;

/// Signature pad: strokes on the canvas are exported as a PNG data URI into
/// the hidden `signature_data` field when the form is submitted.
const SIGNATURE_SCRIPT: &str = r#"
(function () {
  var canvas = document.getElementById('signature-pad');
  var field = document.getElementById('signature_data');
  var ctx = canvas.getContext('2d');
  var drawing = false, dirty = false;
  ctx.lineWidth = 2; ctx.lineCap = 'round';
  function pos(e) { var r = canvas.getBoundingClientRect(); return { x: e.clientX - r.left, y: e.clientY - r.top }; }
  canvas.addEventListener('pointerdown', function (e) { drawing = true; var p = pos(e); ctx.beginPath(); ctx.moveTo(p.x, p.y); });
  canvas.addEventListener('pointermove', function (e) { if (!drawing) return; var p = pos(e); ctx.lineTo(p.x, p.y); ctx.stroke(); dirty = true; });
  window.addEventListener('pointerup', function () { drawing = false; });
  document.getElementById('signature-clear').addEventListener('click', function () {
    ctx.clearRect(0, 0, canvas.width, canvas.height); dirty = false; field.value = '';
  });
  canvas.closest('form').addEventListener('submit', function () { if (dirty) field.value = canvas.toDataURL('image/png'); });
})();
"#;

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        STYLE,
        body
    )
}

pub fn template_list(templates: &[ConsentTemplate]) -> String {
    let mut body = String::from("<h1>Consent forms</h1>\n");
    if templates.is_empty() {
        body.push_str("<p>No consent forms are available yet.</p>\n");
    } else {
        body.push_str("<ul>\n");
        for template in templates {
            body.push_str(&format!(
                "<li><a href=\"/form/{}\">{}</a></li>\n",
                escape_html(&template.slug),
                escape_html(&template.title)
            ));
        }
        body.push_str("</ul>\n");
    }
    page("Consent forms", &body)
}

fn field_errors(errors: Option<&ValidationErrors>, field: &str) -> String {
    let messages: Vec<String> = errors
        .map(|e| e.for_field(field).map(escape_html).collect())
        .unwrap_or_default();
    if messages.is_empty() {
        return String::new();
    }
    format!(
        "<ul class=\"errors\">{}</ul>",
        messages
            .iter()
            .map(|m| format!("<li>{}</li>", m))
            .collect::<String>()
    )
}

fn text_input(
    name: &str,
    label: &str,
    kind: &str,
    value: &str,
    errors: Option<&ValidationErrors>,
) -> String {
    format!(
        "<label for=\"{name}\">{label}</label>\n\
         <input type=\"{kind}\" id=\"{name}\" name=\"{name}\" value=\"{value}\">\n{errors}\n",
        name = name,
        label = escape_html(label),
        kind = kind,
        value = escape_html(value),
        errors = field_errors(errors, name)
    )
}

fn question_input(
    key: &str,
    label: &str,
    kind: QuestionKind,
    value: &str,
    errors: Option<&ValidationErrors>,
) -> String {
    let control = match kind {
        QuestionKind::Choice(choices) => {
            let mut select = format!(
                "<select id=\"{key}\" name=\"{key}\">\n<option value=\"\">---------</option>\n",
                key = key
            );
            for (choice, choice_label) in choices {
                let selected = if *choice == value { " selected" } else { "" };
                select.push_str(&format!(
                    "<option value=\"{}\"{}>{}</option>\n",
                    choice, selected, choice_label
                ));
            }
            select.push_str("</select>");
            select
        }
        QuestionKind::Text => format!(
            "<textarea id=\"{key}\" name=\"{key}\" rows=\"2\">{value}</textarea>",
            key = key,
            value = escape_html(value)
        ),
    };
    format!(
        "<label for=\"{}\">{}</label>\n{}\n{}\n",
        key,
        escape_html(label),
        control,
        field_errors(errors, key)
    )
}

/// The fill form, re-rendered with `errors` and the posted values after a
/// failed submission.
pub fn consent_form(
    template: &ConsentTemplate,
    values: &ConsentFormInput,
    errors: Option<&ValidationErrors>,
    action: &str,
) -> String {
    let mut body = format!(
        "<h1>{}</h1>\n<div class=\"terms\">{}</div>\n",
        escape_html(&template.title),
        template.body
    );

    if let Some(errors) = errors {
        let general: Vec<String> = errors.non_field().map(escape_html).collect();
        if !general.is_empty() {
            body.push_str(&format!(
                "<ul class=\"errors\">{}</ul>\n",
                general
                    .iter()
                    .map(|m| format!("<li>{}</li>", m))
                    .collect::<String>()
            ));
        }
    }

    body.push_str(&format!(
        "<form method=\"post\" action=\"{}\">\n",
        escape_html(action)
    ));
    body.push_str(&text_input("full_name", "Full name", "text", &values.full_name, errors));
    body.push_str(&text_input("email", "Email", "email", &values.email, errors));
    body.push_str(&text_input("phone", "Phone", "text", &values.phone, errors));
    body.push_str(&text_input(
        "treatment_date",
        "Treatment date",
        "date",
        &values.treatment_date,
        errors,
    ));
    body.push_str(&text_input(
        "treatment_type",
        "Treatment type",
        "text",
        &values.treatment_type,
        errors,
    ));

    body.push_str("<h2>Health questions</h2>\n");
    for question in HEALTH_QUESTIONS {
        body.push_str(&question_input(
            question.key,
            question.label,
            question.kind,
            values.answer(question.key).unwrap_or_default(),
            errors,
        ));
    }

    body.push_str(
        "<h2>Signature</h2>\n\
         <canvas id=\"signature-pad\" width=\"500\" height=\"160\"></canvas>\n\
         <button type=\"button\" id=\"signature-clear\">Clear</button>\n\
         <input type=\"hidden\" id=\"signature_data\" name=\"signature_data\" value=\"\">\n",
    );
    body.push_str(&field_errors(errors, "signature_data"));
    body.push_str(&text_input(
        "typed_signature",
        "Or type your full name as your signature",
        "text",
        &values.typed_signature,
        errors,
    ));

    let checked = if values.consent_checked() { " checked" } else { "" };
    body.push_str(&format!(
        "<label><input type=\"checkbox\" name=\"consent_given\" value=\"on\"{}> \
         I have read and agree to the terms above.</label>\n{}\n",
        checked,
        field_errors(errors, "consent_given")
    ));
    body.push_str("<p><button type=\"submit\">Sign and submit</button></p>\n</form>\n");
    body.push_str(&format!("<script>{}</script>\n", SIGNATURE_SCRIPT));

    page(&template.title, &body)
}

/// Confirmation page. `document_url` is set once a document was generated.
pub fn thank_you(
    submission: &Submission,
    template_title: &str,
    document_url: Option<&str>,
) -> String {
    let mut body = format!(
        "<h1>Thank you, {}</h1>\n<p>Your consent for <strong>{}</strong> has been recorded.</p>\n<dl>\n",
        escape_html(&submission.full_name),
        escape_html(template_title)
    );

    let rows = [
        ("Treatment date", submission.treatment_date.format("%d %B %Y").to_string()),
        ("Treatment type", submission.treatment_type.clone()),
        ("Signed at", submission.signed_at.format("%d %B %Y %H:%M UTC").to_string()),
        ("Reference", submission.id.to_string()),
    ];
    for (label, value) in rows {
        body.push_str(&format!(
            "<dt>{}</dt><dd>{}</dd>\n",
            label,
            escape_html(&value)
        ));
    }
    for (key, value) in &submission.answers {
        let shown = if value.is_empty() { "-" } else { value.as_str() };
        body.push_str(&format!(
            "<dt>{}</dt><dd>{}</dd>\n",
            escape_html(&answer_label(key)),
            escape_html(shown)
        ));
    }
    body.push_str("</dl>\n");

    match document_url {
        Some(url) => body.push_str(&format!(
            "<p><a href=\"{}\">Download your signed consent (PDF)</a></p>\n",
            escape_html(url)
        )),
        None => body.push_str("<p>A copy of your consent will be available from the clinic.</p>\n"),
    }

    page("Thank you", &body)
}

pub fn not_found(message: &str) -> String {
    page(
        "Not found",
        &format!(
            "<h1>Not found</h1>\n<p>{}</p>\n<p><a href=\"/\">Back to consent forms</a></p>\n",
            escape_html(message)
        ),
    )
}

pub fn server_error() -> String {
    page(
        "Something went wrong",
        "<h1>Something went wrong</h1>\n<p>Please try again in a moment.</p>\n",
    )
}

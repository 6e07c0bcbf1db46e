use chrono::{Datelike, NaiveDateTime, Timelike};
use uuid::Uuid;

use super::sanitize::escape_html;
use crate::models::enums::Language;

/// Document shell. Placeholders are `{{name}}`; `{{content}}` receives
/// already-sanitized HTML, every other slot receives escaped text.
pub const HISTORY_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{lang}}">
<head>
<meta charset="utf-8">
<title>{{title}}</title>
<style>
body { font-family: Helvetica, Arial, sans-serif; font-size: 11pt; color: #222; margin: 2cm; }
header { border-bottom: 2px solid #2c5282; margin-bottom: 1.5em; padding-bottom: 0.5em; }
header h1 { font-size: 18pt; color: #2c5282; margin: 0; }
.meta { font-size: 9pt; color: #555; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ccc; padding: 4px 6px; text-align: left; }
footer { margin-top: 2em; font-size: 8pt; color: #777; border-top: 1px solid #ccc; padding-top: 0.5em; }
</style>
</head>
<body>
<header>
<h1>{{title}}</h1>
<p class="meta">{{organization}}</p>
<p class="meta">{{patient_label}}: {{patient_name}}</p>
<p class="meta">{{generated_label}}: {{generated_at}}</p>
</header>
<main>
{{content}}
</main>
<footer>
<p>{{generator}} | {{document_label}}: {{document_id}}</p>
</footer>
</body>
</html>
"#;

/// Values injected around the sanitized body.
#[derive(Debug, Clone)]
pub struct RenderMetadata {
    pub patient_name: String,
    pub organization: String,
    pub generated_at: NaiveDateTime,
    pub generator: String,
    pub document_id: Uuid,
    pub language: Language,
}

struct TemplateLabels {
    title: &'static str,
    patient: &'static str,
    generated: &'static str,
    document: &'static str,
}

fn template_labels(language: Language) -> TemplateLabels {
    match language {
        Language::Es => TemplateLabels {
            title: "Historia Clínica",
            patient: "Paciente",
            generated: "Generado",
            document: "Documento",
        },
        Language::En => TemplateLabels {
            title: "Medical History",
            patient: "Patient",
            generated: "Generated",
            document: "Document",
        },
    }
}

pub fn document_title(language: Language) -> &'static str {
    template_labels(language).title
}

const MONTHS_ES: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto", "septiembre",
    "octubre", "noviembre", "diciembre",
];

const MONTHS_EN: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// "13 de diciembre de 2025, 14:30" / "December 13, 2025 at 14:30".
pub fn format_timestamp(at: &NaiveDateTime, language: Language) -> String {
    let month = at.month0() as usize;
    match language {
        Language::Es => format!(
            "{} de {} de {}, {:02}:{:02}",
            at.day(),
            MONTHS_ES[month],
            at.year(),
            at.hour(),
            at.minute()
        ),
        Language::En => format!(
            "{} {}, {} at {:02}:{:02}",
            MONTHS_EN[month],
            at.day(),
            at.year(),
            at.hour(),
            at.minute()
        ),
    }
}

/// Fill the template. `sanitized_body` must already have passed the
/// allow-list; it is inserted as-is.
pub fn render_template(sanitized_body: &str, meta: &RenderMetadata) -> String {
    let labels = template_labels(meta.language);

    // `content` goes last so placeholder-like text inside the body is
    // never expanded.
    HISTORY_TEMPLATE
        .replace("{{lang}}", meta.language.as_str())
        .replace("{{title}}", labels.title)
        .replace("{{patient_label}}", labels.patient)
        .replace("{{generated_label}}", labels.generated)
        .replace("{{document_label}}", labels.document)
        .replace("{{organization}}", &escape_html(&meta.organization))
        .replace("{{patient_name}}", &escape_html(&meta.patient_name))
        .replace("{{generated_at}}", &format_timestamp(&meta.generated_at, meta.language))
        .replace("{{generator}}", &escape_html(&meta.generator))
        .replace("{{document_id}}", &meta.document_id.to_string())
        .replace("{{content}}", sanitized_body)
}

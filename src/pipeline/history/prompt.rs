//! Prompt construction for history generation.
//!
//! Output is a pure function of `(Facts, GenerationOptions)`: no clock, no
//! randomness, no map iteration order. The same inputs always yield the
//! same prompt text.

use unicode_normalization::UnicodeNormalization;

use super::aggregate::Facts;
use crate::models::enums::{HistoryFormat, HistoryType, Language};
use crate::models::{AppointmentRecord, ConsultationRecord, GenerationOptions, VitalSigns};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Per-language fixed strings.
struct Labels {
    role: &'static str,
    grounding: &'static str,
    patient_section: &'static str,
    name: &'static str,
    birth_date: &'static str,
    gender: &'static str,
    blood_type: &'static str,
    allergies: &'static str,
    chronic_conditions: &'static str,
    period: &'static str,
    period_all: &'static str,
    period_from: &'static str,
    period_until: &'static str,
    appointments: &'static str,
    consultations: &'static str,
    timeline: &'static str,
    no_records: &'static str,
    doctor: &'static str,
    reason: &'static str,
    status: &'static str,
    complaint: &'static str,
    symptoms: &'static str,
    diagnosis: &'static str,
    treatment: &'static str,
    vitals: &'static str,
    latest_vitals: &'static str,
    prescriptions: &'static str,
    notes: &'static str,
    requester_notes: &'static str,
    appointment_kind: &'static str,
    consultation_kind: &'static str,
    general_system: &'static str,
    unknown: &'static str,
    blood_pressure: &'static str,
    heart_rate: &'static str,
    respiratory_rate: &'static str,
    per_minute: &'static str,
    weight: &'static str,
    height: &'static str,
}

const ES: Labels = Labels {
    role: "Eres un asistente médico que redacta historias clínicas para profesionales de la salud.",
    grounding: "Usa únicamente los datos proporcionados. No inventes diagnósticos, fechas ni tratamientos. Si falta información, indícalo.",
    patient_section: "DATOS DEL PACIENTE",
    name: "Nombre",
    birth_date: "Fecha de nacimiento",
    gender: "Sexo",
    blood_type: "Grupo sanguíneo",
    allergies: "Alergias",
    chronic_conditions: "Condiciones crónicas",
    period: "Período",
    period_all: "todo el historial disponible",
    period_from: "desde",
    period_until: "hasta",
    appointments: "CITAS",
    consultations: "CONSULTAS",
    timeline: "LÍNEA DE TIEMPO",
    no_records: "Sin registros en el período.",
    doctor: "Médico",
    reason: "Motivo",
    status: "Estado",
    complaint: "Motivo de consulta",
    symptoms: "Síntomas",
    diagnosis: "Diagnóstico",
    treatment: "Plan de tratamiento",
    vitals: "Signos vitales",
    latest_vitals: "SIGNOS VITALES MÁS RECIENTES",
    prescriptions: "Prescripciones",
    notes: "Notas",
    requester_notes: "NOTAS ADICIONALES DEL SOLICITANTE",
    appointment_kind: "Cita",
    consultation_kind: "Consulta",
    general_system: "General",
    unknown: "no registrado",
    blood_pressure: "PA",
    heart_rate: "FC",
    respiratory_rate: "FR",
    per_minute: "/min",
    weight: "Peso",
    height: "Talla",
};

const EN: Labels = Labels {
    role: "You are a medical assistant who writes clinical histories for healthcare professionals.",
    grounding: "Use only the data provided. Do not invent diagnoses, dates or treatments. If information is missing, say so.",
    patient_section: "PATIENT DATA",
    name: "Name",
    birth_date: "Date of birth",
    gender: "Sex",
    blood_type: "Blood type",
    allergies: "Allergies",
    chronic_conditions: "Chronic conditions",
    period: "Period",
    period_all: "entire available record",
    period_from: "from",
    period_until: "until",
    appointments: "APPOINTMENTS",
    consultations: "CONSULTATIONS",
    timeline: "TIMELINE",
    no_records: "No records in this period.",
    doctor: "Doctor",
    reason: "Reason",
    status: "Status",
    complaint: "Chief complaint",
    symptoms: "Symptoms",
    diagnosis: "Diagnosis",
    treatment: "Treatment plan",
    vitals: "Vital signs",
    latest_vitals: "MOST RECENT VITAL SIGNS",
    prescriptions: "Prescriptions",
    notes: "Notes",
    requester_notes: "ADDITIONAL NOTES FROM THE REQUESTER",
    appointment_kind: "Appointment",
    consultation_kind: "Consultation",
    general_system: "General",
    unknown: "not recorded",
    blood_pressure: "BP",
    heart_rate: "HR",
    respiratory_rate: "RR",
    per_minute: "/min",
    weight: "Weight",
    height: "Height",
};

fn labels(language: Language) -> &'static Labels {
    match language {
        Language::Es => &ES,
        Language::En => &EN,
    }
}

fn type_instruction(history_type: HistoryType, language: Language) -> &'static str {
    match (history_type, language) {
        (HistoryType::Complete, Language::Es) => "Redacta una historia clínica completa en español que cubra todas las secciones: datos del paciente, antecedentes, citas y cada consulta con su evolución.",
        (HistoryType::Complete, Language::En) => "Write a complete clinical history in English covering every section: patient data, background, appointments and each consultation with its progress.",
        (HistoryType::Summary, Language::Es) => "Redacta un resumen clínico breve en español centrado en diagnósticos, planes de tratamiento y los signos vitales más recientes.",
        (HistoryType::Summary, Language::En) => "Write a brief clinical summary in English focused on diagnoses, treatment plans and the most recent vital signs.",
        (HistoryType::Chronological, Language::Es) => "Redacta una historia clínica en español como relato cronológico, del evento más antiguo al más reciente.",
        (HistoryType::Chronological, Language::En) => "Write a clinical history in English as a chronological narrative, from the oldest event to the most recent.",
        (HistoryType::BySystems, Language::Es) => "Redacta una historia clínica en español organizada por aparatos y sistemas, con una sección por sistema.",
        (HistoryType::BySystems, Language::En) => "Write a clinical history in English organized by body system, with one section per system.",
    }
}

fn format_instruction(format: HistoryFormat, language: Language) -> &'static str {
    match (format, language) {
        (HistoryFormat::Markdown, Language::Es) => "Formato de salida: Markdown, con encabezados (#, ##), listas y tablas cuando ayuden. No envuelvas la respuesta en bloques de código.",
        (HistoryFormat::Markdown, Language::En) => "Output format: Markdown, with headings (#, ##), lists and tables where helpful. Do not wrap the answer in a code block.",
        (HistoryFormat::Html, Language::Es) => "Formato de salida: HTML simple usando solo h1-h3, p, ul, ol, li, strong, em y table. Sin estilos, scripts ni atributos.",
        (HistoryFormat::Html, Language::En) => "Output format: simple HTML using only h1-h3, p, ul, ol, li, strong, em and table. No styles, scripts or attributes.",
        (HistoryFormat::Json, Language::Es) => "Formato de salida: un único objeto JSON válido con una clave por sección. Sin texto fuera del JSON.",
        (HistoryFormat::Json, Language::En) => "Output format: a single valid JSON object with one key per section. No text outside the JSON.",
        (HistoryFormat::PlainText, Language::Es) => "Formato de salida: texto plano sin marcado, con títulos de sección en mayúsculas.",
        (HistoryFormat::PlainText, Language::En) => "Output format: plain text without markup, with section titles in capitals.",
    }
}

// ═══════════════════════════════════════════════════════════
// Body-system taxonomy (by_systems)
// ═══════════════════════════════════════════════════════════

struct BodySystem {
    es: &'static str,
    en: &'static str,
    /// Lowercase, accent-free word prefixes in both languages.
    stems: &'static [&'static str],
}

const BODY_SYSTEMS: &[BodySystem] = &[
    BodySystem {
        es: "Cardiovascular",
        en: "Cardiovascular",
        stems: &[
            "cardi", "corazon", "heart", "pecho", "chest", "hipertens", "hypertens", "arritm",
            "arrhythm", "palpitac", "palpitat", "angina", "taquicard", "tachycard", "presion",
        ],
    },
    BodySystem {
        es: "Respiratorio",
        en: "Respiratory",
        stems: &[
            "tos", "cough", "disnea", "dyspnea", "asma", "asthma", "bronqu", "bronch", "neumon",
            "pneumon", "pulmon", "lung", "respir", "sibilan", "wheez",
        ],
    },
    BodySystem {
        es: "Digestivo",
        en: "Digestive",
        stems: &[
            "abdom", "gastr", "nause", "vomit", "diarre", "diarrh", "estren", "constip", "hepat",
            "liver", "higado", "colon", "reflu", "dispeps", "dyspeps",
        ],
    },
    BodySystem {
        es: "Neurológico",
        en: "Neurological",
        stems: &[
            "cefale", "headache", "migra", "mareo", "dizz", "vertig", "convuls", "seizure",
            "neuro", "parest", "numb", "sincop", "syncop", "epilep",
        ],
    },
    BodySystem {
        es: "Musculoesquelético",
        en: "Musculoskeletal",
        stems: &[
            "artr", "arthr", "lumbal", "lumbalg", "back", "espalda", "fractur", "muscul",
            "rodilla", "knee", "hombro", "shoulder", "esguince", "sprain", "osteo",
        ],
    },
    BodySystem {
        es: "Endocrino",
        en: "Endocrine",
        stems: &[
            "diabet", "tiroid", "thyroid", "glucos", "insulin", "obesi", "hipotiroid",
            "hypothyroid", "hipertiroid", "hyperthyroid",
        ],
    },
    BodySystem {
        es: "Genitourinario",
        en: "Genitourinary",
        stems: &[
            "urin", "renal", "rinon", "kidney", "cistit", "cystit", "prostat", "disuria",
            "dysuria", "vagin", "menstru",
        ],
    },
    BodySystem {
        es: "Dermatológico",
        en: "Dermatological",
        stems: &[
            "piel", "skin", "derma", "erupc", "rash", "prurit", "itch", "eccem", "eczem",
            "urticar", "acne", "lesion",
        ],
    },
    BodySystem {
        es: "Salud mental",
        en: "Mental health",
        stems: &[
            "ansied", "anxiet", "depres", "insomn", "estres", "stress", "panic", "panico",
        ],
    },
];

/// Lowercase, strip combining marks and split into alphanumeric words.
fn normalized_words(text: &str) -> Vec<String> {
    let folded: String = text
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Indices into `BODY_SYSTEMS` that a consultation touches, in taxonomy
/// order. Empty when nothing matches.
fn systems_for(c: &ConsultationRecord) -> Vec<usize> {
    let mut text = c.chief_complaint.clone();
    for extra in [&c.symptoms, &c.diagnosis].into_iter().flatten() {
        text.push(' ');
        text.push_str(extra);
    }
    let words = normalized_words(&text);

    BODY_SYSTEMS
        .iter()
        .enumerate()
        .filter(|(_, system)| {
            words
                .iter()
                .any(|w| system.stems.iter().any(|stem| w.starts_with(stem)))
        })
        .map(|(i, _)| i)
        .collect()
}

// ═══════════════════════════════════════════════════════════
// Prompt assembly
// ═══════════════════════════════════════════════════════════

/// Build the generation prompt for one history request.
pub fn build_history_prompt(facts: &Facts, options: &GenerationOptions) -> String {
    let l = labels(options.language);
    let mut prompt = String::new();

    prompt.push_str(l.role);
    prompt.push('\n');
    prompt.push_str(type_instruction(options.history_type, options.language));
    prompt.push('\n');
    prompt.push_str(format_instruction(options.format, options.language));
    prompt.push('\n');
    prompt.push_str(l.grounding);
    prompt.push_str("\n\n");

    write_patient(&mut prompt, facts, l);
    write_period(&mut prompt, facts, l);

    match options.history_type {
        HistoryType::Complete => write_complete(&mut prompt, facts, l),
        HistoryType::Summary => write_summary(&mut prompt, facts, l),
        HistoryType::Chronological => write_chronological(&mut prompt, facts, l),
        HistoryType::BySystems => write_by_systems(&mut prompt, facts, options.language, l),
    }

    if let Some(notes) = options.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        prompt.push_str(&format!("\n{}:\n{notes}\n", l.requester_notes));
    }

    prompt
}

fn or_unknown<'a>(value: Option<&'a str>, l: &'a Labels) -> &'a str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(l.unknown)
}

fn write_patient(out: &mut String, facts: &Facts, l: &Labels) {
    let p = &facts.patient;
    let birth = p.birth_date.map(|d| d.format(DATE_FORMAT).to_string());

    out.push_str(&format!("{}\n", l.patient_section));
    out.push_str(&format!("- {}: {}\n", l.name, p.display_name()));
    out.push_str(&format!("- {}: {}\n", l.birth_date, or_unknown(birth.as_deref(), l)));
    out.push_str(&format!("- {}: {}\n", l.gender, or_unknown(p.gender.as_deref(), l)));
    out.push_str(&format!("- {}: {}\n", l.blood_type, or_unknown(p.blood_type.as_deref(), l)));
    out.push_str(&format!("- {}: {}\n", l.allergies, or_unknown(p.allergies.as_deref(), l)));
    out.push_str(&format!(
        "- {}: {}\n",
        l.chronic_conditions,
        or_unknown(p.chronic_conditions.as_deref(), l)
    ));
}

fn write_period(out: &mut String, facts: &Facts, l: &Labels) {
    let period = match (facts.start_date, facts.end_date) {
        (None, None) => l.period_all.to_string(),
        (Some(s), None) => format!("{} {}", l.period_from, s.format(DATE_FORMAT)),
        (None, Some(e)) => format!("{} {}", l.period_until, e.format(DATE_FORMAT)),
        (Some(s), Some(e)) => format!(
            "{} {} {} {}",
            l.period_from,
            s.format(DATE_FORMAT),
            l.period_until,
            e.format(DATE_FORMAT)
        ),
    };
    out.push_str(&format!("- {}: {period}\n\n", l.period));
}

fn write_appointment(out: &mut String, a: &AppointmentRecord, l: &Labels) {
    out.push_str(&format!(
        "- {} | {}: {}",
        a.scheduled_at.format(DATETIME_FORMAT),
        l.doctor,
        a.doctor_name
    ));
    if let Some(specialty) = a.specialty.as_deref() {
        out.push_str(&format!(" ({specialty})"));
    }
    if let Some(reason) = a.reason.as_deref() {
        out.push_str(&format!(" | {}: {reason}", l.reason));
    }
    out.push_str(&format!(" | {}: {}\n", l.status, a.status));
}

fn format_vitals(v: &VitalSigns, l: &Labels) -> String {
    let mut parts = Vec::new();
    if let Some(bp) = v.blood_pressure.as_deref() {
        parts.push(format!("{} {bp} mmHg", l.blood_pressure));
    }
    if let Some(hr) = v.heart_rate {
        parts.push(format!("{} {hr}{}", l.heart_rate, l.per_minute));
    }
    if let Some(rr) = v.respiratory_rate {
        parts.push(format!("{} {rr}{}", l.respiratory_rate, l.per_minute));
    }
    if let Some(t) = v.temperature_c {
        parts.push(format!("T {t:.1} °C"));
    }
    if let Some(sat) = v.oxygen_saturation {
        parts.push(format!("SpO2 {sat}%"));
    }
    if let Some(w) = v.weight_kg {
        parts.push(format!("{} {w:.1} kg", l.weight));
    }
    if let Some(h) = v.height_cm {
        parts.push(format!("{} {h:.1} cm", l.height));
    }
    parts.join(", ")
}

fn write_consultation(out: &mut String, c: &ConsultationRecord, l: &Labels) {
    out.push_str(&format!(
        "- {} | {}: {}",
        c.consulted_at.format(DATETIME_FORMAT),
        l.doctor,
        c.doctor_name
    ));
    if let Some(specialty) = c.specialty.as_deref() {
        out.push_str(&format!(" ({specialty})"));
    }
    out.push('\n');
    out.push_str(&format!("  {}: {}\n", l.complaint, c.chief_complaint));

    let optional = [
        (l.symptoms, c.symptoms.as_deref()),
        (l.diagnosis, c.diagnosis.as_deref()),
        (l.treatment, c.treatment_plan.as_deref()),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            out.push_str(&format!("  {label}: {value}\n"));
        }
    }
    if let Some(vitals) = c.vital_signs.as_ref().filter(|v| !v.is_empty()) {
        out.push_str(&format!("  {}: {}\n", l.vitals, format_vitals(vitals, l)));
    }
    if let Some(rx) = c.prescriptions.as_deref() {
        out.push_str(&format!("  {}: {rx}\n", l.prescriptions));
    }
    if let Some(notes) = c.notes.as_deref() {
        out.push_str(&format!("  {}: {notes}\n", l.notes));
    }
}

fn write_complete(out: &mut String, facts: &Facts, l: &Labels) {
    out.push_str(&format!("{}\n", l.appointments));
    if facts.appointments.is_empty() {
        out.push_str(&format!("{}\n", l.no_records));
    }
    for a in &facts.appointments {
        write_appointment(out, a, l);
    }
    out.push('\n');

    out.push_str(&format!("{}\n", l.consultations));
    if facts.consultations.is_empty() {
        out.push_str(&format!("{}\n", l.no_records));
    }
    for c in &facts.consultations {
        write_consultation(out, c, l);
    }
}

fn write_summary(out: &mut String, facts: &Facts, l: &Labels) {
    out.push_str(&format!("{}\n", l.consultations));
    if facts.consultations.is_empty() {
        out.push_str(&format!("{}\n", l.no_records));
    }
    for c in &facts.consultations {
        out.push_str(&format!("- {}\n", c.consulted_at.format(DATE_FORMAT)));
        out.push_str(&format!(
            "  {}: {}\n",
            l.diagnosis,
            or_unknown(c.diagnosis.as_deref(), l)
        ));
        out.push_str(&format!(
            "  {}: {}\n",
            l.treatment,
            or_unknown(c.treatment_plan.as_deref(), l)
        ));
    }

    // Latest by date; among equal dates the last in source order wins.
    let latest = facts
        .consultations
        .iter()
        .filter_map(|c| c.vital_signs.as_ref().filter(|v| !v.is_empty()).map(|v| (c.consulted_at, v)))
        .max_by_key(|(when, _)| *when);
    if let Some((when, vitals)) = latest {
        out.push_str(&format!(
            "\n{}\n- {}: {}\n",
            l.latest_vitals,
            when.format(DATETIME_FORMAT),
            format_vitals(vitals, l)
        ));
    }
}

enum TimelineEntry<'a> {
    Appointment(&'a AppointmentRecord),
    Consultation(&'a ConsultationRecord),
}

fn write_chronological(out: &mut String, facts: &Facts, l: &Labels) {
    let mut entries: Vec<(chrono::NaiveDateTime, TimelineEntry<'_>)> = facts
        .appointments
        .iter()
        .map(|a| (a.scheduled_at, TimelineEntry::Appointment(a)))
        .chain(
            facts
                .consultations
                .iter()
                .map(|c| (c.consulted_at, TimelineEntry::Consultation(c))),
        )
        .collect();
    // Stable: on equal timestamps appointments precede consultations and
    // source order is kept within each kind.
    entries.sort_by_key(|(when, _)| *when);

    out.push_str(&format!("{}\n", l.timeline));
    if entries.is_empty() {
        out.push_str(&format!("{}\n", l.no_records));
    }
    for (_, entry) in entries {
        match entry {
            TimelineEntry::Appointment(a) => {
                out.push_str(&format!("[{}] ", l.appointment_kind));
                write_appointment(out, a, l);
            }
            TimelineEntry::Consultation(c) => {
                out.push_str(&format!("[{}] ", l.consultation_kind));
                write_consultation(out, c, l);
            }
        }
    }
}

fn write_by_systems(out: &mut String, facts: &Facts, language: Language, l: &Labels) {
    let mut groups: Vec<Vec<&ConsultationRecord>> = vec![Vec::new(); BODY_SYSTEMS.len()];
    let mut general = Vec::new();

    for c in &facts.consultations {
        let systems = systems_for(c);
        if systems.is_empty() {
            general.push(c);
        }
        for i in systems {
            groups[i].push(c);
        }
    }

    for (system, members) in BODY_SYSTEMS.iter().zip(&groups) {
        if members.is_empty() {
            continue;
        }
        let name = match language {
            Language::Es => system.es,
            Language::En => system.en,
        };
        out.push_str(&format!("{}\n", name.to_uppercase()));
        for c in members {
            write_consultation(out, c, l);
        }
        out.push('\n');
    }
    if !general.is_empty() {
        out.push_str(&format!("{}\n", l.general_system.to_uppercase()));
        for c in general {
            write_consultation(out, c, l);
        }
        out.push('\n');
    }
    if facts.consultations.is_empty() {
        out.push_str(&format!("{}\n{}\n\n", l.consultations, l.no_records));
    }

    if !facts.appointments.is_empty() {
        out.push_str(&format!("{}\n", l.appointments));
        for a in &facts.appointments {
            write_appointment(out, a, l);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::history::aggregate::tests::{make_appointment, make_consultation, make_patient};

    fn facts() -> Facts {
        let p = make_patient();
        Facts {
            start_date: None,
            end_date: None,
            appointments: vec![make_appointment(p.id, "2025-06-01 09:00")],
            consultations: vec![
                make_consultation(p.id, "2025-06-01 09:30", "Dolor de pecho", "Angina estable"),
                make_consultation(p.id, "2025-01-15 10:00", "Tos seca", "Bronquitis"),
                make_consultation(p.id, "2025-03-31 23:59", "Control", "Sin hallazgos"),
            ],
            patient: p,
        }
    }

    fn options(history_type: HistoryType, language: Language) -> GenerationOptions {
        GenerationOptions {
            history_type,
            language,
            ..Default::default()
        }
    }

    #[test]
    fn prompt_is_deterministic() {
        let f = facts();
        for t in [
            HistoryType::Complete,
            HistoryType::Summary,
            HistoryType::Chronological,
            HistoryType::BySystems,
        ] {
            let o = options(t, Language::Es);
            assert_eq!(build_history_prompt(&f, &o), build_history_prompt(&f, &o));
        }
    }

    #[test]
    fn uses_birth_date_and_requested_language() {
        let f = facts();
        let es = build_history_prompt(&f, &options(HistoryType::Complete, Language::Es));
        assert!(es.contains("Fecha de nacimiento: 1970-05-02"));
        assert!(es.contains("en español"));
        let en = build_history_prompt(&f, &options(HistoryType::Complete, Language::En));
        assert!(en.contains("Date of birth: 1970-05-02"));
        assert!(en.contains("in English"));
    }

    #[test]
    fn complete_keeps_source_order() {
        let prompt = build_history_prompt(&facts(), &options(HistoryType::Complete, Language::Es));
        let chest = prompt.find("Dolor de pecho").unwrap();
        let cough = prompt.find("Tos seca").unwrap();
        assert!(chest < cough);
        assert!(prompt.contains("Losartán 50 mg"));
    }

    #[test]
    fn chronological_sorts_ascending() {
        let prompt = build_history_prompt(&facts(), &options(HistoryType::Chronological, Language::Es));
        let cough = prompt.find("Tos seca").unwrap();
        let control = prompt.find("Motivo de consulta: Control").unwrap();
        let chest = prompt.find("Dolor de pecho").unwrap();
        let appointment = prompt.find("[Cita]").unwrap();
        assert!(cough < control);
        assert!(control < appointment);
        assert!(appointment < chest);
    }

    #[test]
    fn summary_only_diagnosis_treatment_and_latest_vitals() {
        let prompt = build_history_prompt(&facts(), &options(HistoryType::Summary, Language::Es));
        assert!(prompt.contains("Diagnóstico: Angina estable"));
        assert!(prompt.contains("Plan de tratamiento: Control en 1 mes"));
        assert!(prompt.contains("SIGNOS VITALES MÁS RECIENTES\n- 2025-06-01 09:30: PA 130/85 mmHg, FC 78/min"));
        assert!(!prompt.contains("Losartán"));
        assert!(!prompt.contains("Dolor de pecho"));
    }

    #[test]
    fn by_systems_groups_in_taxonomy_order_with_general_fallback() {
        let prompt = build_history_prompt(&facts(), &options(HistoryType::BySystems, Language::Es));
        let cardio = prompt.find("CARDIOVASCULAR").unwrap();
        let resp = prompt.find("RESPIRATORIO").unwrap();
        let general = prompt.find("GENERAL").unwrap();
        assert!(cardio < resp);
        assert!(resp < general);
        assert!(prompt[cardio..resp].contains("Dolor de pecho"));
        assert!(prompt[resp..general].contains("Tos seca"));
        assert!(prompt[general..].contains("Sin hallazgos"));
    }

    #[test]
    fn consultation_matching_two_systems_appears_in_both() {
        let p = make_patient();
        let mut c = make_consultation(p.id, "2025-02-01 10:00", "Disnea y palpitaciones", "En estudio");
        c.symptoms = Some("Tos nocturna".into());
        let f = Facts {
            start_date: None,
            end_date: None,
            appointments: vec![],
            consultations: vec![c],
            patient: p,
        };
        let prompt = build_history_prompt(&f, &options(HistoryType::BySystems, Language::En));
        assert_eq!(prompt.matches("Disnea y palpitaciones").count(), 2);
        assert!(prompt.contains("CARDIOVASCULAR"));
        assert!(prompt.contains("RESPIRATORY"));
        assert!(!prompt.contains("GENERAL"));
    }

    #[test]
    fn notes_are_appended_verbatim() {
        let mut o = options(HistoryType::Complete, Language::Es);
        o.notes = Some("Para interconsulta con *cardiología*.".into());
        let prompt = build_history_prompt(&facts(), &o);
        assert!(prompt.ends_with("NOTAS ADICIONALES DEL SOLICITANTE:\nPara interconsulta con *cardiología*.\n"));
    }

    #[test]
    fn excluded_vitals_never_reach_the_prompt() {
        let mut f = facts();
        for c in &mut f.consultations {
            c.vital_signs = None;
            c.prescriptions = None;
        }
        let prompt = build_history_prompt(&f, &options(HistoryType::Complete, Language::Es));
        assert!(!prompt.contains("Signos vitales"));
        assert!(!prompt.contains("Prescripciones"));
    }

    #[test]
    fn word_normalization_strips_accents() {
        assert_eq!(normalized_words("Cefalea, MIGRAÑA"), vec!["cefalea", "migrana"]);
    }
}

use chrono::NaiveDateTime;
use unicode_normalization::UnicodeNormalization;

const FALLBACK_NAME: &str = "Paciente";

/// Download filename for a history PDF:
/// `Historial_Medico_<Name>_<YYYYMMDD>.pdf`.
///
/// The name loses its diacritics and anything that is not a letter, digit
/// or whitespace; whitespace runs become a single `_`.
pub fn filename_for(patient_name: &str, generated_at: &NaiveDateTime) -> String {
    let ascii_ish: String = patient_name
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    let name = ascii_ish.split_whitespace().collect::<Vec<_>>().join("_");
    let name = if name.is_empty() { FALLBACK_NAME } else { name.as_str() };

    format!(
        "Historial_Medico_{}_{}.pdf",
        name,
        generated_at.format("%Y%m%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn strips_diacritics_and_joins_words() {
        assert_eq!(
            filename_for("José Núñez", &at("2025-12-13 14:30:00")),
            "Historial_Medico_Jose_Nunez_20251213.pdf"
        );
    }

    #[test]
    fn drops_punctuation_and_collapses_whitespace() {
        assert_eq!(
            filename_for("  María-José   O'Brien\t(2) ", &at("2024-02-29 08:00:00")),
            "Historial_Medico_MariaJose_OBrien_2_20240229.pdf"
        );
    }

    #[test]
    fn empty_name_falls_back() {
        assert_eq!(
            filename_for("!!!", &at("2025-01-01 00:00:00")),
            "Historial_Medico_Paciente_20250101.pdf"
        );
    }
}

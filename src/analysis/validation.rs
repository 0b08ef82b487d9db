//! Text cleaning and field-specific validation
//!
//! Recognized text is normalized per field: dates, document numbers and the
//! personal identification number get OCR confusion repair and checksum
//! verification. A failed checksum is logged; it never blanks the value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::analysis::SideResult;
use crate::config::ValidationSettings;

/// Cleans recognized text and applies field-specific rules
pub trait TextValidator: Send + Sync {
    /// Collapse whitespace and normalize case
    fn clean_text(&self, text: &str) -> String;

    /// Field-specific correction over a whole side
    fn validate_all(&self, fields: SideResult) -> SideResult;
}

/// Validation rule applied to a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRule {
    /// Cleaned text, nothing else
    FreeText,
    /// Letters, spaces, hyphens and apostrophes
    Name,
    /// Calendar date, normalized to DD.MM.YYYY
    Date,
    /// K (female) or M (male)
    Sex,
    /// Snapped to a known nationality spelling
    Nationality,
    /// Three letters and six digits with a check digit
    DocumentNumber,
    /// Letters only
    Series,
    /// Digits only
    Digits,
    /// 11-digit national identification number with checksum
    Pesel,
    /// Machine-readable zone characters
    Mrz,
}

impl FieldRule {
    /// Rules for the Polish identity card fields
    pub fn polish_id_card() -> BTreeMap<String, FieldRule> {
        [
            ("f_nazwisko", FieldRule::Name),
            ("f_imiona", FieldRule::Name),
            ("f_obywatelstwo", FieldRule::Nationality),
            ("f_data_urodzenia", FieldRule::Date),
            ("f_plec", FieldRule::Sex),
            ("f_numer_ID", FieldRule::DocumentNumber),
            ("f_data_waznosci", FieldRule::Date),
            ("f_numer_kodu", FieldRule::Digits),
            ("b_seria_id", FieldRule::Series),
            ("b_numer_id", FieldRule::Digits),
            ("b_numer_ident", FieldRule::Pesel),
            ("b_data_wydania", FieldRule::Date),
            ("b_kto_wydal", FieldRule::FreeText),
            ("b_imiona_rodzicow", FieldRule::Name),
            ("b_nazwisko_rodowe", FieldRule::Name),
            ("b_miejsce_urodzenia", FieldRule::FreeText),
            ("MRZ", FieldRule::Mrz),
        ]
        .into_iter()
        .map(|(field, rule)| (field.to_string(), rule))
        .collect()
    }
}

/// Rule-table validator for identity card fields
#[derive(Debug, Clone)]
pub struct IdCardValidator {
    rules: BTreeMap<String, FieldRule>,
    nationalities: Vec<String>,
    similarity_threshold: f64,
}

impl Default for IdCardValidator {
    fn default() -> Self {
        Self::new(&ValidationSettings::default())
    }
}

impl IdCardValidator {
    pub fn new(settings: &ValidationSettings) -> Self {
        Self {
            rules: settings.rules.clone(),
            nationalities: settings
                .nationalities
                .iter()
                .map(|n| n.to_uppercase())
                .collect(),
            similarity_threshold: settings.similarity_threshold,
        }
    }

    /// Rule for a field; unknown fields are free text
    pub fn rule(&self, field: &str) -> FieldRule {
        self.rules.get(field).copied().unwrap_or(FieldRule::FreeText)
    }

    /// Validate one cleaned value
    pub fn validate_field(&self, field: &str, value: &str) -> String {
        match self.rule(field) {
            FieldRule::FreeText => value.to_string(),
            FieldRule::Name => normalize_name(value),
            FieldRule::Date => normalize_date(value).unwrap_or_else(|| value.to_string()),
            FieldRule::Sex => normalize_sex(value),
            FieldRule::Nationality => self.snap_nationality(value),
            FieldRule::DocumentNumber => {
                let number = normalize_document_number(value);
                if number.len() == 9 && !id_number_is_valid(&number) {
                    warn!("Field {}: document number {} fails its check digit", field, number);
                }
                number
            }
            FieldRule::Series => value
                .chars()
                .map(to_letter)
                .filter(|c| c.is_alphabetic())
                .collect(),
            FieldRule::Digits => digits_only(value),
            FieldRule::Pesel => {
                let pesel = digits_only(value);
                if pesel.len() == 11 && !pesel_is_valid(&pesel) {
                    warn!("Field {}: identification number fails its checksum", field);
                }
                pesel
            }
            FieldRule::Mrz => normalize_mrz(value),
        }
    }

    fn snap_nationality(&self, value: &str) -> String {
        let best = self
            .nationalities
            .iter()
            .map(|known| (known, strsim::normalized_levenshtein(value, known)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((known, score)) if score >= self.similarity_threshold => {
                if known != value {
                    debug!("Snapped nationality {:?} to {:?} ({:.2})", value, known, score);
                }
                known.clone()
            }
            _ => value.to_string(),
        }
    }
}

impl TextValidator for IdCardValidator {
    fn clean_text(&self, text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed
            .trim_matches(|c: char| c.is_whitespace() || EDGE_NOISE.contains(&c))
            .to_uppercase()
    }

    fn validate_all(&self, fields: SideResult) -> SideResult {
        fields
            .into_iter()
            .map(|(field, value)| {
                if value.is_empty() {
                    return (field, value);
                }
                let validated = self.validate_field(&field, &value);
                (field, validated)
            })
            .collect()
    }
}

/// Characters tesseract tends to emit at crop borders
const EDGE_NOISE: &[char] = &['|', '_', '~', '—', '-', '.', ',', ':', ';', '\'', '"', '`', '*'];

/// Letter read where a digit is expected
fn to_digit(c: char) -> char {
    match c {
        'O' | 'Q' | 'D' => '0',
        'I' | 'L' | '|' | '!' => '1',
        'Z' => '2',
        'S' => '5',
        'G' => '6',
        'T' => '7',
        'B' => '8',
        other => other,
    }
}

/// Digit read where a letter is expected
fn to_letter(c: char) -> char {
    match c {
        '0' => 'O',
        '1' => 'I',
        '2' => 'Z',
        '3' => 'E',
        '4' => 'A',
        '5' => 'S',
        '6' => 'G',
        '7' => 'T',
        '8' => 'B',
        other => other,
    }
}

fn digits_only(value: &str) -> String {
    value
        .chars()
        .map(to_digit)
        .filter(|c| c.is_ascii_digit())
        .collect()
}

fn normalize_name(value: &str) -> String {
    let kept: String = value
        .chars()
        .map(to_letter)
        .filter(|c| c.is_alphabetic() || c.is_whitespace() || *c == '-' || *c == '\'')
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// DD.MM.YYYY from any separator style; `None` when not a plausible date
pub fn normalize_date(value: &str) -> Option<String> {
    let digits = digits_only(value);
    if digits.len() != 8 {
        return None;
    }
    let day: u32 = digits[0..2].parse().ok()?;
    let month: u32 = digits[2..4].parse().ok()?;
    let year: u32 = digits[4..8].parse().ok()?;
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) || !(1900..=2100).contains(&year) {
        return None;
    }
    Some(format!("{:02}.{:02}.{:04}", day, month, year))
}

fn normalize_sex(value: &str) -> String {
    match value.chars().find(|c| c.is_alphabetic()) {
        Some('K') | Some('F') => "K".to_string(),
        Some('M') => "M".to_string(),
        _ => value.to_string(),
    }
}

/// Repair letter/digit confusion by position in `AAA999999`
pub fn normalize_document_number(value: &str) -> String {
    let compact: Vec<char> = value.chars().filter(|c| c.is_alphanumeric()).collect();
    if compact.len() != 9 {
        return compact.into_iter().collect();
    }
    compact
        .iter()
        .enumerate()
        .map(|(i, &c)| if i < 3 { to_letter(c) } else { to_digit(c) })
        .collect()
}

fn char_value(c: char) -> Option<u32> {
    match c {
        '0'..='9' => c.to_digit(10),
        'A'..='Z' => Some(c as u32 - 'A' as u32 + 10),
        '<' => Some(0),
        _ => None,
    }
}

/// Polish identity card number check (the fourth character is the check digit)
pub fn id_number_is_valid(number: &str) -> bool {
    const WEIGHTS: [u32; 9] = [7, 3, 1, 9, 7, 3, 1, 7, 3];
    let chars: Vec<char> = number.chars().collect();
    if chars.len() != 9
        || !chars[..3].iter().all(|c| c.is_ascii_uppercase())
        || !chars[3..].iter().all(|c| c.is_ascii_digit())
    {
        return false;
    }
    let sum: u32 = chars
        .iter()
        .zip(WEIGHTS)
        .filter_map(|(&c, w)| char_value(c).map(|v| v * w))
        .sum();
    sum % 10 == 0
}

/// PESEL checksum
pub fn pesel_is_valid(pesel: &str) -> bool {
    const WEIGHTS: [u32; 10] = [1, 3, 7, 9, 1, 3, 7, 9, 1, 3];
    let digits: Vec<u32> = pesel.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 || pesel.len() != 11 {
        return false;
    }
    let sum: u32 = digits.iter().zip(WEIGHTS).map(|(d, w)| d * w).sum();
    (10 - sum % 10) % 10 == digits[10]
}

/// ICAO 9303 check digit over `A-Z0-9<`
pub fn mrz_check_digit(data: &str) -> Option<u32> {
    const WEIGHTS: [u32; 3] = [7, 3, 1];
    let mut sum = 0;
    for (i, c) in data.chars().enumerate() {
        sum += char_value(c)? * WEIGHTS[i % 3];
    }
    Some(sum % 10)
}

fn normalize_mrz(value: &str) -> String {
    let mrz: String = value
        .chars()
        .map(|c| match c {
            '«' | '‹' | '(' | '{' | '[' => '<',
            other => other,
        })
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '<')
        .collect();

    // TD1 first line: document number at 5..14, check digit at 14
    if mrz.len() >= 15 && mrz.starts_with('I') {
        let number = &mrz[5..14];
        let expected = mrz_check_digit(number);
        let found = mrz[14..15].chars().next().and_then(|c| c.to_digit(10));
        if expected.is_some() && expected != found {
            debug!("MRZ document number {} fails its check digit", number);
        }
    }
    mrz
}

use chrono::NaiveDate;
use scraper::{ElementRef, Selector};

const MONTHS: [&str; 12] = [
    "janvier",
    "fevrier",
    "mars",
    "avril",
    "mai",
    "juin",
    "juillet",
    "aout",
    "septembre",
    "octobre",
    "novembre",
    "decembre",
];

/// Compiles one of the selector literals the parsers are written against.
pub fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css}: {e}"))
}

pub fn extract_text(node: ElementRef) -> String {
    node.text().collect::<String>()
}

/// Text with runs of whitespace (nbsp included) collapsed and trimmed.
pub fn clean_text(node: ElementRef) -> String {
    extract_text(node).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `"1 234,56 €"` -> `Some(1234.56)`. Empty cells read as zero, anything else
/// that is not a number is `None`.
pub fn try_parse_amount(text: &str) -> Option<f64> {
    let normalized: String = text
        .chars()
        .filter(|c| *c != '€' && !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if normalized.is_empty() {
        return Some(0.0);
    }
    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Lenient variant used for display amounts: unparseable text reads as zero.
pub fn parse_amount(text: &str) -> f64 {
    try_parse_amount(text).unwrap_or(0.0)
}

/// French display convention, e.g. `123,40 €`.
pub fn format_amount(value: f64) -> String {
    format!("{value:.2} €").replace('.', ",")
}

/// `DD/MM/YYYY`, as found in detail tables.
pub fn parse_slash_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%d/%m/%Y").ok()
}

/// Builds a date from the listing labels: a day (`"3"`, `"03"`, `"1er"`), a
/// French month name (`"août"`, `"févr."`) and a year.
pub fn parse_french_date(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let day: u32 = day
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()?;
    let month = month_number(month)?;
    let year: i32 = year.trim().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    let folded: String = name
        .trim()
        .trim_end_matches('.')
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'é' | 'è' | 'ê' => 'e',
            'û' | 'ù' => 'u',
            'ô' => 'o',
            'à' | 'â' => 'a',
            other => other,
        })
        .collect();
    if folded.len() < 3 {
        return None;
    }
    // "juin" and "juillet" share "jui", so an abbreviation must be unambiguous.
    let mut candidates = MONTHS
        .iter()
        .enumerate()
        .filter(|(_, month)| month.starts_with(folded.as_str()));
    let (index, _) = candidates.next()?;
    if candidates.next().is_some() {
        return None;
    }
    Some(index as u32 + 1)
}

/// The trailing four-digit token of a label such as `"Août 2024"`.
pub fn extract_year(label: &str) -> Option<String> {
    let token = label.split_whitespace().last()?;
    (token.len() == 4 && token.chars().all(|c| c.is_ascii_digit())).then(|| token.to_string())
}

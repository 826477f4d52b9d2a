//! Value normalization: raw cell text → KPI numbers and calendar periods
//!
//! Both conversions are total. Anything that cannot be understood becomes
//! `None` and the caller treats the cell as blank.

use crate::types::KpiField;
use chrono::Datelike;
use regex::Regex;
use std::sync::OnceLock;

/// Lower-case month names (English then Norwegian); index mod 12 is the month
const MONTH_NAMES: [&str; 24] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "januar", "februar", "mars", "april", "mai", "juni", "juli",
    "august", "september", "oktober", "november", "desember",
];

const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

fn date_like_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$").ok())
        .as_ref()
}

fn iso_period_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d{4})-(\d{1,2})(?:-(\d{1,2}))?(?:[T ].*)?$").ok())
        .as_ref()
}

//==============================================================================
// Amounts
//==============================================================================

/// Parse a KPI cell into a number.
///
/// Handles currency glyphs (`$ € £ ¥ kr`), thousands separators, trailing
/// `%`, leading `-` and accounting-style `(1,200)` negatives. Percentages
/// stay as whole points for churn and growth and become fractions for every
/// other field. Unsuffixed numbers are never rescaled.
///
/// # Example
/// ```
/// use kpisync::ingest::parse_amount;
/// use kpisync::KpiField;
///
/// assert_eq!(parse_amount("5%", KpiField::Churn), Some(5.0));
/// assert_eq!(parse_amount("5%", KpiField::Mrr), Some(0.05));
/// assert_eq!(parse_amount("(1,200)", KpiField::BurnRate), Some(-1200.0));
/// ```
pub fn parse_amount(raw: &str, field: KpiField) -> Option<f64> {
    let mut text = raw.trim();
    if text.is_empty() {
        return None;
    }

    // Runway cells sometimes carry two figures ("10.4 4.0"); the first one counts
    if field == KpiField::RunwayMonths {
        text = text.split_whitespace().next()?;
    }

    let cleaned = strip_currency(text);
    let cleaned = repair_date_like(&cleaned).unwrap_or(cleaned);

    let (negative, body) = split_negative(&cleaned);
    let (percent, body) = match body.strip_suffix('%') {
        Some(rest) => (true, rest),
        None => (false, body),
    };

    let mut value = parse_number(body)?;
    if negative && value > 0.0 {
        value = -value;
    }

    if percent && !field.is_percentage_points() {
        value /= 100.0;
    }
    Some(value)
}

/// Remove currency glyphs, the `kr` token and all whitespace
fn strip_currency(text: &str) -> String {
    text.to_lowercase()
        .replace("kr.", "")
        .replace("kr", "")
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥') && !c.is_whitespace())
        .collect()
}

/// Undo a spreadsheet turning a percentage like `11.1` into the date `11.01.2026`.
///
/// The first group is the integer part. The second group yields one decimal
/// digit: used as-is below 10, otherwise its tens digit. This is a heuristic
/// inverse of one auto-format quirk, not an exact one.
fn repair_date_like(text: &str) -> Option<String> {
    let caps = date_like_pattern()?.captures(text)?;
    let whole: u32 = caps.get(1)?.as_str().parse().ok()?;
    let second: u32 = caps.get(2)?.as_str().parse().ok()?;
    let decimal = if second < 10 { second } else { second / 10 };
    Some(format!("{}.{}", whole, decimal))
}

/// Detect `(…)` or a leading `-`, returning the unsigned body
fn split_negative(text: &str) -> (bool, &str) {
    if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        return (true, inner);
    }
    (text.starts_with('-'), text)
}

/// Parse a number whose commas are either thousands or decimal separators.
///
/// A single comma followed by one or two trailing digits, with no `.`, is a
/// decimal comma (`12,5` -> 12.5). Every other comma is a thousands separator.
///
/// This departs from the plain "strip every comma" rule, which would read
/// `12,5` as 125. Norwegian sheets write runway and churn with a decimal
/// comma, so the plain rule inflates them tenfold.
// TODO: get product sign-off on decimal-comma handling before relying on it for imported history
fn parse_number(text: &str) -> Option<f64> {
    let normalized = match text.split_once(',') {
        Some((int_part, frac))
            if !text.contains('.')
                && !frac.contains(',')
                && (1..=2).contains(&frac.len())
                && frac.chars().all(|c| c.is_ascii_digit())
                && !int_part.is_empty() =>
        {
            format!("{}.{}", int_part, frac)
        }
        _ => text.replace(',', ""),
    };

    if normalized.is_empty() || !normalized.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

//==============================================================================
// Periods
//==============================================================================

/// Resolve a month cell (plus optional Year column value) to `YYYY-MM-01`.
///
/// Accepts `YYYY-MM`, `YYYY-MM-DD` and free text such as `Jan 2024`,
/// `januar`, `Sept-2023`. The year comes from the text itself first, then
/// `explicit_year`, then the current calendar year.
pub fn parse_period(month: &str, explicit_year: Option<i32>) -> Option<String> {
    parse_period_with_default(month, explicit_year, chrono::Local::now().year())
}

/// [`parse_period`] with the last-resort year supplied by the caller
pub fn parse_period_with_default(
    month: &str,
    explicit_year: Option<i32>,
    default_year: i32,
) -> Option<String> {
    let text = month.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = iso_period_pattern().and_then(|p| p.captures(text)) {
        let year: i32 = caps.get(1)?.as_str().parse().ok()?;
        let month: u32 = caps.get(2)?.as_str().parse().ok()?;
        if (1..=12).contains(&month) {
            return Some(format_period(year, month));
        }
    }

    let mut month_index: Option<u32> = None;
    let mut embedded_year: Option<i32> = None;

    for token in text
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | '/' | ',' | '.' | '\''))
        .filter(|t| !t.is_empty())
    {
        if month_index.is_none() {
            month_index = month_from_name(token);
        }
        if embedded_year.is_none() {
            embedded_year = year_from_token(token);
        }
    }

    let month = month_index?;
    let year = embedded_year.or(explicit_year).unwrap_or(default_year);
    Some(format_period(year, month + 1))
}

/// Parse a Year column cell (`2024`, `2024.0`)
pub fn parse_year(cell: &str) -> Option<i32> {
    let value: f64 = cell.trim().parse().ok()?;
    if value.fract() != 0.0 {
        return None;
    }
    let year = value as i32;
    (MIN_YEAR..=MAX_YEAR).contains(&year).then_some(year)
}

fn month_from_name(token: &str) -> Option<u32> {
    let token = token.to_lowercase();
    if token.chars().count() < 3 || !token.chars().all(char::is_alphabetic) {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|name| name.starts_with(&token))
        .map(|i| (i % 12) as u32)
}

fn year_from_token(token: &str) -> Option<i32> {
    if token.len() != 4 || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year: i32 = token.parse().ok()?;
    (MIN_YEAR..=MAX_YEAR).contains(&year).then_some(year)
}

fn format_period(year: i32, month: u32) -> String {
    format!("{:04}-{:02}-01", year, month)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // parse_amount Tests
    // =========================================================================

    #[test]
    fn test_plain_numbers() {
        assert_eq!(parse_amount("120000", KpiField::Arr), Some(120000.0));
        assert_eq!(parse_amount("  42.5 ", KpiField::Customers), Some(42.5));
        assert_eq!(parse_amount("-300", KpiField::BurnRate), Some(-300.0));
    }

    #[test]
    fn test_percent_semantics() {
        assert_eq!(parse_amount("5%", KpiField::Churn), Some(5.0));
        assert_eq!(parse_amount("5%", KpiField::GrowthPercent), Some(5.0));
        assert_eq!(parse_amount("5%", KpiField::Mrr), Some(0.05));
        assert_eq!(parse_amount("3.5 %", KpiField::Churn), Some(3.5));
        assert_eq!(parse_amount("-2%", KpiField::GrowthPercent), Some(-2.0));
    }

    #[test]
    fn test_unsuffixed_churn_is_not_rescaled() {
        assert_eq!(parse_amount("5", KpiField::Churn), Some(5.0));
        assert_eq!(parse_amount("0.05", KpiField::Churn), Some(0.05));
    }

    #[test]
    fn test_currency_and_thousands() {
        assert_eq!(parse_amount("$1,200,000", KpiField::Arr), Some(1_200_000.0));
        assert_eq!(parse_amount("€ 950", KpiField::Mrr), Some(950.0));
        assert_eq!(parse_amount("£12", KpiField::Mrr), Some(12.0));
        assert_eq!(parse_amount("¥7", KpiField::Mrr), Some(7.0));
        assert_eq!(parse_amount("150 000 kr", KpiField::CashBalance), Some(150000.0));
        assert_eq!(parse_amount("KR 2500", KpiField::CashBalance), Some(2500.0));
        assert_eq!(parse_amount("kr. 10", KpiField::CashBalance), Some(10.0));
    }

    #[test]
    fn test_parenthesized_negative() {
        assert_eq!(parse_amount("(1,200)", KpiField::BurnRate), Some(-1200.0));
        assert_eq!(parse_amount("($500)", KpiField::CashBalance), Some(-500.0));
        assert_eq!(parse_amount("(5%)", KpiField::GrowthPercent), Some(-5.0));
    }

    #[test]
    fn test_decimal_comma() {
        assert_eq!(parse_amount("12,5", KpiField::RunwayMonths), Some(12.5));
        assert_eq!(parse_amount("3,25%", KpiField::Churn), Some(3.25));
        assert_eq!(parse_amount("1,200", KpiField::Mrr), Some(1200.0));
        assert_eq!(parse_amount("1,200.50", KpiField::Mrr), Some(1200.5));
    }

    #[test]
    fn test_comma_before_three_digits_is_grouping() {
        assert_eq!(parse_amount("12,500", KpiField::Mrr), Some(12500.0));
        assert_eq!(parse_amount("1,234,56", KpiField::Mrr), Some(123456.0));
        assert_eq!(parse_amount("12,5.0", KpiField::Mrr), Some(125.0));
    }

    #[test]
    fn test_date_corruption_repair() {
        assert_eq!(parse_amount("11.01.2026", KpiField::GrowthPercent), Some(11.1));
        assert_eq!(parse_amount("5.3.2025", KpiField::Churn), Some(5.3));
        assert_eq!(parse_amount("7.12.2025", KpiField::Churn), Some(7.1));
    }

    #[test]
    fn test_runway_uses_first_token() {
        assert_eq!(parse_amount("10.4 4.0", KpiField::RunwayMonths), Some(10.4));
        assert_eq!(parse_amount("18", KpiField::RunwayMonths), Some(18.0));
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(parse_amount("", KpiField::Mrr), None);
        assert_eq!(parse_amount("   ", KpiField::Mrr), None);
        assert_eq!(parse_amount("n/a", KpiField::Mrr), None);
        assert_eq!(parse_amount("$", KpiField::Mrr), None);
        assert_eq!(parse_amount("%", KpiField::Churn), None);
        assert_eq!(parse_amount("()", KpiField::Mrr), None);
        assert_eq!(parse_amount("inf", KpiField::Mrr), None);
        assert_eq!(parse_amount("NaN", KpiField::Mrr), None);
    }

    // =========================================================================
    // parse_period Tests
    // =========================================================================

    #[test]
    fn test_iso_periods() {
        assert_eq!(parse_period("2024-03", None), Some("2024-03-01".to_string()));
        assert_eq!(parse_period("2024-3-17", None), Some("2024-03-01".to_string()));
        assert_eq!(
            parse_period("2024-11-30T00:00:00", Some(1999)),
            Some("2024-11-01".to_string())
        );
    }

    #[test]
    fn test_month_names() {
        assert_eq!(
            parse_period("Jan 2024", None),
            Some("2024-01-01".to_string())
        );
        assert_eq!(
            parse_period("September 2023", None),
            Some("2023-09-01".to_string())
        );
        assert_eq!(parse_period("Sept-2023", None), Some("2023-09-01".to_string()));
        assert_eq!(parse_period("des. 2022", None), Some("2022-12-01".to_string()));
        assert_eq!(parse_period("Mai 2025", None), Some("2025-05-01".to_string()));
        assert_eq!(parse_period("oktober 2025", None), Some("2025-10-01".to_string()));
    }

    #[test]
    fn test_embedded_year_beats_explicit_year() {
        assert_eq!(
            parse_period("Jan 2023", Some(2024)),
            Some("2023-01-01".to_string())
        );
    }

    #[test]
    fn test_explicit_year_beats_default() {
        assert_eq!(
            parse_period_with_default("mars", Some(2024), 2030),
            Some("2024-03-01".to_string())
        );
        assert_eq!(
            parse_period_with_default("mars", None, 2030),
            Some("2030-03-01".to_string())
        );
    }

    #[test]
    fn test_out_of_range_year_is_ignored() {
        assert_eq!(
            parse_period_with_default("Feb 1999", None, 2026),
            Some("2026-02-01".to_string())
        );
    }

    #[test]
    fn test_no_month_is_none() {
        assert_eq!(parse_period("", Some(2024)), None);
        assert_eq!(parse_period("Total", Some(2024)), None);
        assert_eq!(parse_period("2024", None), None);
        assert_eq!(parse_period("ja 2024", None), None);
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("2024"), Some(2024));
        assert_eq!(parse_year(" 2024.0 "), Some(2024));
        assert_eq!(parse_year("1999"), None);
        assert_eq!(parse_year("24"), None);
        assert_eq!(parse_year("abc"), None);
    }
}

//! Deterministic pattern extraction over raw chat or document text.
//!
//! This is the safety net under the model path: it never fails and never
//! calls out, so every message yields at least a best-effort set of fields.

use std::ops::Range;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::domain::extraction::ExtractedFinancialData;

pub const FALLBACK_DESCRIPTION: &str = "Professional services";

const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";

const SERVICE_KEYWORDS: &[&str] = &[
    "consulting",
    "development",
    "design",
    "marketing",
    "writing",
    "copywriting",
    "editing",
    "photography",
    "training",
    "maintenance",
    "support",
    "hosting",
    "bookkeeping",
    "website",
    "app",
    "logo",
    "seo",
];

const CLIENT_STOP_WORDS: &[&str] = &[
    "for", "to", "from", "on", "at", "by", "with", "of", "about", "regarding", "due", "invoice",
    "dollars",
];

const CLIENT_REJECTED_WORDS: &[&str] =
    &["me", "my", "the", "a", "an", "this", "that", "it", "us", "you", "your", "our", "last"];

const LEADING_FILLER: &[&str] = &[
    "a",
    "an",
    "the",
    "for",
    "on",
    "of",
    "to",
    "from",
    "please",
    "invoice",
    "spent",
    "paid",
    "received",
    "record",
    "log",
    "add",
    "expense",
    "income",
    "transaction",
];

static DOLLAR_AMOUNT: OnceLock<Option<Regex>> = OnceLock::new();
static BARE_AMOUNT: OnceLock<Option<Regex>> = OnceLock::new();
static DATE: OnceLock<Option<Regex>> = OnceLock::new();
static CLIENT: OnceLock<Option<Regex>> = OnceLock::new();
static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
static INVOICE_NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
static INVOICE_PHRASE: OnceLock<Option<Regex>> = OnceLock::new();
static FOR_AMOUNT: OnceLock<Option<Regex>> = OnceLock::new();
static PARTY_PHRASE: OnceLock<Option<Regex>> = OnceLock::new();

/// Compiles a pattern once. A pattern that fails to compile disables only
/// its own field.
fn pattern(cell: &'static OnceLock<Option<Regex>>, source: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(source).ok()).as_ref()
}

#[derive(Clone, Debug, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> ExtractedFinancialData {
        let invoice_match = extract_invoice_number(text);
        let amount = extract_amount(text, invoice_match.as_ref().map(|(_, range)| range.clone()));
        let client = extract_client(text);
        let description = extract_description(text, client.as_deref(), amount.as_deref());

        ExtractedFinancialData {
            amount,
            date: extract_date(text),
            client,
            email: extract_email(text),
            invoice_number: invoice_match.map(|(number, _)| number),
            description: Some(description),
        }
    }
}

/// Normalizes `YYYY-MM-DD`, `D/M/Y` and a few spelled-out forms to a calendar
/// date. Returns `None` for anything that is not a real date.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(date) = parse_day_month_year(trimmed) {
        return Some(date);
    }

    ["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

fn parse_day_month_year(raw: &str) -> Option<NaiveDate> {
    let parts = raw.split('/').collect::<Vec<_>>();
    let [day, month, year] = parts.as_slice() else {
        return None;
    };
    if year.len() == 4 && day.len() <= 2 {
        let year = year.parse::<i32>().ok()?;
        return NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?);
    }
    if year.len() == 2 {
        let year = 2000 + year.parse::<i32>().ok()?;
        return NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?);
    }
    None
}

fn extract_amount(text: &str, excluded: Option<Range<usize>>) -> Option<String> {
    if let Some(regex) = pattern(&DOLLAR_AMOUNT, r"\$\s?(\d+(?:,\d{3})*(?:\.\d{2})?)") {
        if let Some(captures) = regex.captures(text) {
            return captures.get(1).map(|value| value.as_str().replace(',', ""));
        }
    }

    let regex = pattern(&BARE_AMOUNT, r"\d+(?:,\d{3})*(?:\.\d{2})?")?;
    regex
        .find_iter(text)
        .filter(|candidate| {
            excluded.as_ref().map_or(true, |range| {
                candidate.start() >= range.end || candidate.end() <= range.start
            })
        })
        .find(|candidate| is_standalone_number(text, candidate.start(), candidate.end()))
        .map(|candidate| candidate.as_str().replace(',', ""))
}

/// Rejects digits that belong to dates, identifiers or words.
fn is_standalone_number(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();

    let before_ok = before.map_or(true, |ch| {
        !(ch.is_alphanumeric() || matches!(ch, '/' | '-' | '#' | '.' | ':' | '_'))
    });
    let after_ok = after.map_or(true, |ch| {
        !(ch.is_alphanumeric() || matches!(ch, '/' | '-' | ':' | '_' | '@'))
    });
    before_ok && after_ok
}

fn extract_date(text: &str) -> Option<NaiveDate> {
    let regex = pattern(&DATE, r"\b\d{1,2}/\d{1,2}/\d{2,4}\b|\b\d{4}-\d{1,2}-\d{1,2}\b")?;
    regex.find(text).and_then(|found| normalize_date(found.as_str()))
}

fn extract_client(text: &str) -> Option<String> {
    let regex = pattern(&CLIENT, r"(?i)\b(?:for|to|from)\s+([a-z][a-z ]{1,29})")?;

    // "to billing@acme.io" must not yield a client named "billing".
    let without_emails = match pattern(&EMAIL, EMAIL_PATTERN) {
        Some(email) => email.replace_all(text, " ").into_owned(),
        None => text.to_string(),
    };

    for captures in regex.captures_iter(&without_emails) {
        let Some(raw) = captures.get(1) else {
            continue;
        };

        let words = raw
            .as_str()
            .split_whitespace()
            .take_while(|word| !CLIENT_STOP_WORDS.contains(&word.to_ascii_lowercase().as_str()))
            .collect::<Vec<_>>();

        let Some(first) = words.first() else {
            continue;
        };
        if CLIENT_REJECTED_WORDS.contains(&first.to_ascii_lowercase().as_str()) {
            continue;
        }

        let candidate = words.join(" ");
        if candidate.len() >= 2 {
            return Some(candidate);
        }
    }

    None
}

fn extract_email(text: &str) -> Option<String> {
    let regex = pattern(&EMAIL, EMAIL_PATTERN)?;
    regex.find(text).map(|found| found.as_str().to_string())
}

fn extract_invoice_number(text: &str) -> Option<(String, Range<usize>)> {
    let regex = pattern(&INVOICE_NUMBER, r"(?i)\b(?:invoice|inv)[#\s]*(\d+)")?;
    let captures = regex.captures(text)?;
    let number = captures.get(1)?;
    Some((number.as_str().to_string(), number.range()))
}

fn extract_description(text: &str, client: Option<&str>, amount: Option<&str>) -> String {
    let mut cleaned = text.to_lowercase();

    if let Some(regex) = pattern(
        &INVOICE_PHRASE,
        r"\b(?:please\s+)?(?:create|make|generate|send|draft|raise)\s+(?:an?\s+)?(?:new\s+)?invoice\b",
    ) {
        cleaned = regex.replace_all(&cleaned, " ").into_owned();
    }
    if let Some(regex) = pattern(&FOR_AMOUNT, r"\bfor\s+\$?\d[\d,]*(?:\.\d+)?") {
        cleaned = regex.replace_all(&cleaned, " ").into_owned();
    }

    if let Some(client) = client.map(str::to_lowercase) {
        let escaped = regex::escape(&client);
        if let Ok(regex) = Regex::new(&format!(r"\b(?:to|from|for)\s+{escaped}\b")) {
            cleaned = regex.replace_all(&cleaned, " ").into_owned();
        }
        cleaned = cleaned.replace(&client, " ");
    }
    if let Some(regex) = pattern(&PARTY_PHRASE, r"\b(?:to|from)\s+([a-z][a-z ]{1,29})") {
        cleaned = regex
            .replace_all(&cleaned, |captures: &regex::Captures<'_>| {
                let words = captures.get(1).map_or("", |words| words.as_str());
                let tail = words
                    .split_whitespace()
                    .skip_while(|word| !CLIENT_STOP_WORDS.contains(word))
                    .collect::<Vec<_>>();
                format!(" {} ", tail.join(" "))
            })
            .into_owned();
    }
    if let Some(amount) = amount {
        cleaned = strip_amount_token(&cleaned, text, amount);
    }

    let mut words = cleaned
        .split_whitespace()
        .map(|word| word.trim_matches(|ch: char| matches!(ch, ',' | '.' | '!' | '?' | ';' | ':')))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();
    let leading = words.iter().take_while(|word| LEADING_FILLER.contains(word)).count();
    words.drain(..leading);

    if let Some(keyword) = words.iter().find(|word| SERVICE_KEYWORDS.contains(word)) {
        return (*keyword).to_string();
    }

    let collapsed = words.join(" ");
    let length = collapsed.chars().count();
    if length > 3 && length < 100 {
        return collapsed;
    }

    FALLBACK_DESCRIPTION.to_string()
}

/// Removes the one token the amount was read from. Digits inside other
/// numbers stay put.
fn strip_amount_token(cleaned: &str, text: &str, amount: &str) -> String {
    let digits = amount
        .chars()
        .map(|ch| regex::escape(&ch.to_string()))
        .collect::<Vec<_>>()
        .join(",?");
    let dollar = Regex::new(&format!(r"\$\s?{digits}\b")).ok();
    let from_dollar_token = dollar.as_ref().is_some_and(|regex| regex.is_match(text));

    let token = if from_dollar_token {
        dollar
    } else {
        Regex::new(&format!(r"\b{digits}\b")).ok()
    };
    match token {
        Some(regex) => regex.replacen(cleaned, 1, " ").into_owned(),
        None => cleaned.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{normalize_date, PatternExtractor, FALLBACK_DESCRIPTION};

    #[test]
    fn extracts_core_fields_from_invoice_request() {
        let data = PatternExtractor::new().extract("Create an invoice for Jane for $500");

        assert_eq!(data.client.as_deref(), Some("Jane"));
        assert_eq!(data.amount.as_deref(), Some("500"));
        assert_eq!(data.description.as_deref(), Some(FALLBACK_DESCRIPTION));
        assert!(data.email.is_none());
        assert!(data.invoice_number.is_none());
    }

    #[test]
    fn dollar_amounts_drop_currency_symbol_and_separators() {
        let extractor = PatternExtractor::new();
        assert_eq!(
            extractor.extract("Bill Acme Corp $1,250.00 for hosting").amount.as_deref(),
            Some("1250.00")
        );
        assert_eq!(
            extractor.extract("invoice #88 due 15/01/2024 for $75").amount.as_deref(),
            Some("75")
        );
    }

    #[test]
    fn bare_amount_skips_dates_and_invoice_numbers() {
        let data = PatternExtractor::new().extract("invoice 1042 on 2024-03-05 for 300");
        assert_eq!(data.invoice_number.as_deref(), Some("1042"));
        assert_eq!(data.amount.as_deref(), Some("300"));
        assert_eq!(data.date, NaiveDate::from_ymd_opt(2024, 3, 5));
    }

    #[test]
    fn dates_are_normalized_day_first() {
        assert_eq!(normalize_date("15/01/2024"), NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(normalize_date("3/4/24"), NaiveDate::from_ymd_opt(2024, 4, 3));
        assert_eq!(normalize_date("2024-12-31"), NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(normalize_date("March 5, 2024"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(normalize_date("31/02/2024"), None);
        assert_eq!(normalize_date("soon"), None);
    }

    #[test]
    fn unparsable_first_date_is_omitted() {
        let data = PatternExtractor::new().extract("paid $10 on 2024-02-30");
        assert!(data.date.is_none());
        assert_eq!(data.amount.as_deref(), Some("10"));
    }

    #[test]
    fn extracts_email_and_invoice_number() {
        let data = PatternExtractor::new()
            .extract("Send INV#2041 to billing@acme.io for $1,000 of consulting");
        assert_eq!(data.email.as_deref(), Some("billing@acme.io"));
        assert_eq!(data.invoice_number.as_deref(), Some("2041"));
        assert_eq!(data.amount.as_deref(), Some("1000"));
        assert!(data.client.is_none());
        assert_eq!(data.description.as_deref(), Some("consulting"));
    }

    #[test]
    fn client_stops_at_connective_words() {
        let extractor = PatternExtractor::new();
        assert_eq!(
            extractor.extract("Received $500 from Acme Corp on 1/2/2024").client.as_deref(),
            Some("Acme Corp")
        );
        assert_eq!(
            extractor.extract("make an invoice to Bob Smith for $40").client.as_deref(),
            Some("Bob Smith")
        );
        assert_eq!(extractor.extract("what can you do for me?").client, None);
    }

    #[test]
    fn description_prefers_service_keywords() {
        let data = PatternExtractor::new()
            .extract("Create an invoice for Jane for $500 for website design");
        assert_eq!(data.description.as_deref(), Some("website"));
    }

    #[test]
    fn description_keeps_short_free_text() {
        let data = PatternExtractor::new().extract("Spent $20 on coffee");
        assert_eq!(data.description.as_deref(), Some("coffee"));
        assert_eq!(data.amount.as_deref(), Some("20"));
        assert!(data.client.is_none());
    }

    #[test]
    fn description_strips_only_the_amount_token() {
        let data = PatternExtractor::new().extract("Spent $5 on 25 pens and 15 pads");
        assert_eq!(data.amount.as_deref(), Some("5"));
        assert_eq!(data.description.as_deref(), Some("25 pens and 15 pads"));

        let data = PatternExtractor::new().extract("paid 40 on 140 stamps");
        assert_eq!(data.amount.as_deref(), Some("40"));
        assert_eq!(data.description.as_deref(), Some("140 stamps"));
    }

    #[test]
    fn description_drops_party_phrase_without_client() {
        let data = PatternExtractor::new().extract("Spent $15 on flowers to me");
        assert!(data.client.is_none());
        assert_eq!(data.description.as_deref(), Some("flowers"));
    }

    #[test]
    fn description_falls_back_when_too_long() {
        let text = format!("spent $5 on {}", "very long words ".repeat(10));
        let data = PatternExtractor::new().extract(&text);
        assert_eq!(data.description.as_deref(), Some(FALLBACK_DESCRIPTION));
    }

    #[test]
    fn any_dollar_token_is_reported_as_amount() {
        let cases = [
            ("charge them $12", "12"),
            ("$3,400 received yesterday", "3400"),
            ("expense of $9.99 for lunch", "9.99"),
            ("please bill $ 80 to Carol", "80"),
            ("refund of $1,000,000.00", "1000000.00"),
            ("on 12/12/2023 we paid $45", "45"),
            ("inv 77 for $600", "600"),
        ];

        let extractor = PatternExtractor::new();
        for (index, (text, expected)) in cases.iter().enumerate() {
            assert_eq!(
                extractor.extract(text).amount.as_deref(),
                Some(*expected),
                "case {index}: {text}"
            );
        }
    }

    #[test]
    fn empty_text_yields_only_fallback_description() {
        let data = PatternExtractor::new().extract("");
        assert!(data.amount.is_none());
        assert!(data.client.is_none());
        assert_eq!(data.description.as_deref(), Some(FALLBACK_DESCRIPTION));
    }
}

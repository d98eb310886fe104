//! Scrubbing of raw strings scraped off the page: amounts, currency codes,
//! day labels and URL query parameters.

use chrono::{Datelike, Duration, NaiveDate};

/// Day labels as the bank renders them.
const LABEL_TODAY: &str = "Сегодня";
const LABEL_YESTERDAY: &str = "Вчера";

/// Formats a date in the `YYYY.MM.DD` form used for transaction times.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y.%m.%d").to_string()
}

/// Formats a date the way the transaction filter form expects (`DDMMYYYY`).
pub fn filter_date(date: NaiveDate) -> String {
    date.format("%d%m%Y").to_string()
}

/// Strips grouping spaces (including NBSP) and swaps the decimal comma for a
/// dot, keeping the amount as a string to avoid precision loss.
pub fn normalize_amount(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ' ' && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect()
}

/// Maps the bank's currency spellings to 3-letter codes; unknown currencies
/// pass through uppercased with punctuation removed.
pub fn normalize_currency(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect::<String>()
        .trim()
        .to_uppercase();
    match cleaned.as_str() {
        "РУБ" => "RUB".to_string(),
        "ЕВРО" => "EUR".to_string(),
        "ДОЛЛАР США" => "USD".to_string(),
        _ => cleaned,
    }
}

/// Parses a row's day label into `YYYY.MM.DD`. Accepts the relative labels,
/// `D.M` (year defaults to the current one) and `D.M.Y`. An unparseable or
/// calendar-invalid label is logged and passed through unmodified; the row is
/// kept, only its date stays uncanonicalized.
pub fn parse_day_label(raw: &str, today: NaiveDate) -> String {
    let raw = raw.trim();
    if raw == LABEL_TODAY {
        return date_key(today);
    }
    if raw == LABEL_YESTERDAY {
        return date_key(today - Duration::days(1));
    }
    match numeric_date(raw, today) {
        Some(date) => date_key(date),
        None => {
            log::warn!("unparseable transaction date label: {raw:?}");
            raw.to_string()
        }
    }
}

fn numeric_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let mut parts = raw.split('.');
    let day: u32 = parts.next()?.trim().parse().ok()?;
    let month: u32 = parts.next()?.trim().parse().ok()?;
    let year: i32 = match parts.next() {
        Some(y) => y.trim().parse().ok()?,
        None => today.year(),
    };
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Extracts a query parameter from a URL, percent-decoded.
pub fn query_attr(url: &str, name: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or(query);
    for pair in query.split('&') {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if k == name {
            return Some(urlencoding::decode(v).map(|c| c.into_owned()).unwrap_or_else(|_| v.to_string()));
        }
    }
    None
}

//! Small text helpers shared by the HTML extractors.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;

static ENTRIES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"of\s+([\d,]+)\s+entries").expect("valid regex"));
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"));

/// Text of an element with every text node trimmed and concatenated.
pub fn strip_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).collect()
}

/// Full text with whitespace runs collapsed to single spaces.
pub fn squash_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Concatenated stripped text of several elements.
pub fn concat_text<'a>(els: impl IntoIterator<Item = ElementRef<'a>>) -> String {
    els.into_iter().map(strip_text).collect()
}

/// Drop the TAO currency markers the site renders next to amounts.
pub fn clean_bittensor(s: &str) -> String {
    s.replace("Bittensor", "").replace('τ', "").trim().to_string()
}

/// Drop the first percent sign only.
pub fn clean_emission(s: &str) -> String {
    s.replacen('%', "", 1).trim().to_string()
}

/// First integer or decimal number appearing in `s`.
pub fn first_number(s: &str) -> Option<&str> {
    NUMBER_RE.find(s).map(|m| m.as_str())
}

/// `Showing 1 to 25 of 64 entries` -> 64.
pub fn parse_total_entries(s: &str) -> Option<usize> {
    let caps = ENTRIES_RE.captures(s)?;
    caps[1].replace(',', "").parse().ok()
}

/// True when the `class` attribute contains `needle` as a substring.
pub fn class_contains(el: ElementRef<'_>, needle: &str) -> bool {
    el.value().attr("class").is_some_and(|c| c.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn strip_text_joins_trimmed_nodes() {
        let doc = Html::parse_fragment("<p>  0.0<span> 123 </span>\n</p>");
        let sel = Selector::parse("p").unwrap();
        let p = doc.select(&sel).next().unwrap();
        assert_eq!(strip_text(p), "0.0123");
    }

    #[test]
    fn squash_text_keeps_word_breaks() {
        let doc = Html::parse_fragment("<p>Showing <b>1</b> to\n <b>25</b> of <b>64</b> entries</p>");
        let sel = Selector::parse("p").unwrap();
        let p = doc.select(&sel).next().unwrap();
        assert_eq!(squash_text(p), "Showing 1 to 25 of 64 entries");
    }

    #[test]
    fn cleaners() {
        assert_eq!(clean_bittensor("τ 1.234 Bittensor"), "1.234");
        assert_eq!(clean_emission("2.5%%"), "2.5%");
        assert_eq!(first_number("Reg Cost τ 1,203.55"), Some("1"));
        assert_eq!(first_number("emission 0.75%"), Some("0.75"));
        assert_eq!(first_number("none"), None);
    }

    #[test]
    fn total_entries() {
        assert_eq!(parse_total_entries("Showing 1 to 25 of 64 entries"), Some(64));
        assert_eq!(parse_total_entries("Showing 1 to 25 of 1,024 entries"), Some(1024));
        assert_eq!(parse_total_entries("Showing 1 to 25"), None);
    }
}

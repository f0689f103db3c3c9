use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::extract::text::{class_contains, clean_bittensor, clean_emission, concat_text, first_number, strip_text};
use crate::types::SubnetRecord;

static P: Lazy<Selector> = Lazy::new(|| sel("p"));
static DIV: Lazy<Selector> = Lazy::new(|| sel("div"));
static TITLE: Lazy<Selector> = Lazy::new(|| sel("p.font-bold.text-2xl"));
static ACCOUNT_SPAN: Lazy<Selector> = Lazy::new(|| sel("a[href^='/account/'] span"));
static DISCORD_LOGO: Lazy<Selector> = Lazy::new(|| sel("img[src='/images/logo/discord.svg']"));
static GITHUB_LOGO: Lazy<Selector> = Lazy::new(|| sel("img[src='/images/logo/github.svg']"));
static DISCORD_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href*='discord']"));
static GITHUB_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href*='github.com']"));

fn sel(s: &str) -> Selector {
    Selector::parse(s).expect("valid selector")
}

/// Parse one subnet metagraph page.
///
/// `requested` is the netuid the page was fetched for; it is used when the
/// page itself does not print one. A page carrying none of the known labels
/// (bot wall, error page) is an error.
pub fn parse_detail(html: &str, requested: u16) -> Result<SubnetRecord> {
    let doc = Html::parse_document(html);

    let netuid = label_p(&doc, |t| t == "Netuid:")
        .and_then(next_sibling_p)
        .map(strip_text)
        .and_then(|t| first_number(&t).and_then(|n| n.parse::<u16>().ok()))
        .unwrap_or(requested);

    let mut record = SubnetRecord::new(netuid);

    record.name = doc.select(&TITLE).next().map(strip_text).unwrap_or_default();

    record.registration_date = label_p(&doc, |t| t == "Reg:")
        .and_then(next_sibling_p)
        .map(strip_text)
        .unwrap_or_default();

    record.key = doc.select(&ACCOUNT_SPAN).next().map(strip_text).unwrap_or_default();

    record.emission = labelled_block(&doc, "Emissions")
        .map(|t| clean_emission(&t))
        .unwrap_or_default();

    record.price = price(&doc).map(|t| clean_bittensor(&t)).unwrap_or_default();

    record.registration_cost = labelled_block(&doc, "Reg Cost")
        .map(|t| clean_bittensor(&t))
        .unwrap_or_default();

    record.discord = logo_link(&doc, &DISCORD_LOGO)
        .or_else(|| first_link(&doc, &DISCORD_LINK))
        .unwrap_or_default();
    record.github = logo_link(&doc, &GITHUB_LOGO)
        .or_else(|| first_link(&doc, &GITHUB_LINK))
        .unwrap_or_default();

    let found_any = [
        &record.name,
        &record.registration_date,
        &record.key,
        &record.emission,
        &record.price,
        &record.registration_cost,
    ]
    .iter()
    .any(|v| !v.is_empty());
    if !found_any {
        return Err(AppError::Extract(format!("no subnet fields found on metagraph page for netuid {requested}")));
    }

    Ok(record)
}

fn label_p<'a>(doc: &'a Html, matches: impl Fn(&str) -> bool) -> Option<ElementRef<'a>> {
    doc.select(&P).find(|p| matches(&strip_text(*p)))
}

fn next_sibling_p(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "p")
}

fn ancestor_div<'a>(el: ElementRef<'a>, class_needle: &str) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "div" && class_contains(*a, class_needle))
}

/// Label `<p>` → enclosing flex div → next sibling div → all its `<p>` texts.
fn labelled_block(doc: &Html, label: &str) -> Option<String> {
    let label_el = label_p(doc, |t| t.contains(label))?;
    let holder = ancestor_div(label_el, "flex")?;
    let values = holder
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "div")?;
    Some(concat_text(values.select(&P)))
}

/// The "Price" card: `flex-col gap-4` container → `flex-row items-end` row → direct `<p>` children.
fn price(doc: &Html) -> Option<String> {
    let label_el = label_p(doc, |t| t == "Price")?;
    let card = ancestor_div(label_el, "flex-col gap-4")?;
    let row = card.select(&DIV).find(|d| class_contains(*d, "flex-row items-end"))?;
    let parts = row
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "p");
    Some(concat_text(parts))
}

fn logo_link(doc: &Html, logo: &Selector) -> Option<String> {
    doc.select(logo).find_map(|img| {
        let parent = img.parent().and_then(ElementRef::wrap)?;
        if parent.value().name() != "a" {
            return None;
        }
        parent.value().attr("href").map(str::to_string)
    })
}

fn first_link(doc: &Html, links: &Selector) -> Option<String> {
    doc.select(links)
        .find_map(|a| a.value().attr("href"))
        .map(str::to_string)
}

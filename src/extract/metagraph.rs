use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::config::neuron_columns;
use crate::extract::text::{class_contains, strip_text};
use crate::types::{NeuronRole, NeuronRow, ValidatorMetrics};

static TABLE: Lazy<Selector> = Lazy::new(|| sel("table"));
static TR: Lazy<Selector> = Lazy::new(|| sel("tr"));
static TD: Lazy<Selector> = Lazy::new(|| sel("td"));
static SVG: Lazy<Selector> = Lazy::new(|| sel("svg"));
static NEXT_PAGE: Lazy<Selector> =
    Lazy::new(|| sel("nav[aria-label='pagination'] a[aria-label='Go to next page']"));

fn sel(s: &str) -> Selector {
    Selector::parse(s).expect("valid selector")
}

/// Data rows of the first `<table>` on a metagraph page, tagged by role icon.
/// Header rows (no `<td>`) are dropped.
pub fn parse_neuron_rows(html: &str) -> Vec<NeuronRow> {
    let doc = Html::parse_document(html);
    let Some(table) = doc.select(&TABLE).next() else {
        return Vec::new();
    };

    table
        .select(&TR)
        .filter_map(|tr| {
            let tds: Vec<ElementRef<'_>> = tr.select(&TD).collect();
            if tds.is_empty() {
                return None;
            }
            let role = tds
                .get(neuron_columns::ICON)
                .and_then(|cell| cell.select(&SVG).next())
                .map(role_of)
                .unwrap_or(NeuronRole::Other);
            Some(NeuronRow {
                role,
                cells: tds.into_iter().map(strip_text).collect(),
            })
        })
        .collect()
}

fn role_of(svg: ElementRef<'_>) -> NeuronRole {
    if class_contains(svg, "lucide-shield") {
        NeuronRole::Validator
    } else if class_contains(svg, "lucide-pickaxe") && class_contains(svg, "text-[#F90]") {
        NeuronRole::OrangeMiner
    } else if class_contains(svg, "lucide-pickaxe") && class_contains(svg, "text-[#00DBBC]") {
        NeuronRole::GreenMiner
    } else {
        NeuronRole::Other
    }
}

/// `href` of the pagination "next" link, unless the link is disabled.
pub fn next_page_href(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let link = doc.select(&NEXT_PAGE).next()?;
    let disabled = class_contains(link, "pointer-events-none")
        || link.value().attr("aria-disabled") == Some("true");
    if disabled {
        return None;
    }
    link.value()
        .attr("href")
        .filter(|h| !h.is_empty() && *h != "#")
        .map(str::to_string)
}

/// VTrust mean over validators, Incentive min/max over orange and green miners.
pub fn aggregate(rows: &[NeuronRow]) -> ValidatorMetrics {
    let mut vtrust = Vec::new();
    let mut orange = Vec::new();
    let mut green = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        if row.cells.len() < neuron_columns::MIN_WIDTH {
            debug!(row = idx, cells = row.cells.len(), "neuron row too narrow, skipped");
            continue;
        }
        let (column, bucket) = match row.role {
            NeuronRole::Validator => (neuron_columns::VTRUST, &mut vtrust),
            NeuronRole::OrangeMiner => (neuron_columns::INCENTIVE, &mut orange),
            NeuronRole::GreenMiner => (neuron_columns::INCENTIVE, &mut green),
            NeuronRole::Other => continue,
        };
        let Some(text) = row.cells.get(column) else {
            debug!(row = idx, cells = row.cells.len(), "neuron row has no value column, skipped");
            continue;
        };
        match text.replace(',', "").parse::<f64>() {
            Ok(v) => bucket.push(v),
            Err(_) => debug!(row = idx, value = %text, "unparseable neuron value, skipped"),
        }
    }

    ValidatorMetrics {
        vtrust_avg: mean(&vtrust).map(round6),
        inc_orange_max: max(&orange),
        inc_orange_min: min(&orange),
        inc_green_max: max(&green),
        inc_green_min: min(&green),
    }
}

fn mean(v: &[f64]) -> Option<f64> {
    (!v.is_empty()).then(|| v.iter().sum::<f64>() / v.len() as f64)
}

fn max(v: &[f64]) -> Option<f64> {
    v.iter().copied().reduce(f64::max)
}

fn min(v: &[f64]) -> Option<f64> {
    v.iter().copied().reduce(f64::min)
}

fn round6(x: f64) -> f64 {
    (x * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(icon_class: &str, vtrust: &str, incentive: &str) -> String {
        format!(
            r#"<tr><td>0</td><td><svg class="{icon_class}"></svg></td><td>5F…</td><td>1.0</td><td>0.1</td><td>{vtrust}</td><td>0</td><td>0</td><td>0</td><td>{incentive}</td></tr>"#
        )
    }

    fn page(rows: &[String], next: &str) -> String {
        format!(
            r#"<html><body><table id="taostats-table"><thead><tr><th>UID</th><th>Type</th></tr></thead><tbody>{}</tbody></table>
<nav aria-label="pagination"><a aria-label="Go to previous page" href="?page=1">Prev</a>{next}</nav></body></html>"#,
            rows.concat()
        )
    }

    const SHIELD: &str = "lucide lucide-shield text-indigo-400";
    const ORANGE: &str = "lucide lucide-pickaxe text-[#F90]";
    const GREEN: &str = "lucide lucide-pickaxe text-[#00DBBC]";

    #[test]
    fn classifies_rows_by_icon() {
        let html = page(
            &[
                row(SHIELD, "0.9", "0"),
                row(ORANGE, "0", "0.004"),
                row(GREEN, "0", "0.002"),
                row("lucide lucide-user", "0", "0"),
            ],
            "",
        );
        let rows = parse_neuron_rows(&html);
        let roles: Vec<NeuronRole> = rows.iter().map(|r| r.role).collect();
        assert_eq!(
            roles,
            vec![NeuronRole::Validator, NeuronRole::OrangeMiner, NeuronRole::GreenMiner, NeuronRole::Other]
        );
        assert_eq!(rows[0].cells.len(), 10);
    }

    #[test]
    fn aggregates_metrics() {
        let html = page(
            &[
                row(SHIELD, "0.9", "0"),
                row(SHIELD, "0.8", "0"),
                row(SHIELD, "0.7", "0"),
                row(ORANGE, "0", "0.004"),
                row(ORANGE, "0", "0.001"),
                row(GREEN, "0", "0.002"),
                row(GREEN, "0", "not-a-number"),
            ],
            "",
        );
        let m = aggregate(&parse_neuron_rows(&html));
        assert_eq!(m.vtrust_avg, Some(0.8));
        assert_eq!(m.inc_orange_max, Some(0.004));
        assert_eq!(m.inc_orange_min, Some(0.001));
        assert_eq!(m.inc_green_max, Some(0.002));
        assert_eq!(m.inc_green_min, Some(0.002));
    }

    #[test]
    fn narrow_rows_are_skipped() {
        let narrow = format!(r#"<tr><td>1</td><td><svg class="{SHIELD}"></svg></td><td>x</td></tr>"#);
        let m = aggregate(&parse_neuron_rows(&page(&[narrow], "")));
        assert_eq!(m, ValidatorMetrics::default());
    }

    #[test]
    fn validator_row_shorter_than_min_width_is_ignored() {
        let seven = format!(
            r#"<tr><td>4</td><td><svg class="{SHIELD}"></svg></td><td>5G…</td><td>1.0</td><td>0.1</td><td>0.5</td><td>0</td></tr>"#
        );
        let rows = parse_neuron_rows(&page(&[seven, row(SHIELD, "0.9", "0")], ""));
        assert_eq!(rows[0].cells.len(), 7);
        assert_eq!(aggregate(&rows).vtrust_avg, Some(0.9));

        let only_short = format!(
            r#"<tr><td>4</td><td><svg class="{SHIELD}"></svg></td><td>5G…</td><td>1.0</td><td>0.1</td><td>0.5</td><td>0</td></tr>"#
        );
        assert_eq!(aggregate(&parse_neuron_rows(&page(&[only_short], ""))).vtrust_avg, None);
    }

    #[test]
    fn vtrust_average_is_rounded() {
        let html = page(&[row(SHIELD, "0.1", "0"), row(SHIELD, "0.2", "0"), row(SHIELD, "0.2", "0")], "");
        let m = aggregate(&parse_neuron_rows(&html));
        assert_eq!(m.vtrust_avg, Some(0.166667));
    }

    #[test]
    fn next_link_enabled_and_disabled() {
        let enabled = page(&[], r#"<a aria-label="Go to next page" href="?page=2">Next</a>"#);
        assert_eq!(next_page_href(&enabled).as_deref(), Some("?page=2"));

        let disabled = page(
            &[],
            r#"<a aria-label="Go to next page" class="pointer-events-none opacity-50" href="?page=3">Next</a>"#,
        );
        assert_eq!(next_page_href(&disabled), None);

        assert_eq!(next_page_href(&page(&[], "")), None);
    }

    #[test]
    fn page_without_table() {
        assert!(parse_neuron_rows("<p>loading</p>").is_empty());
    }
}

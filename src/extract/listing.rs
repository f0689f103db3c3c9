use std::collections::HashSet;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::extract::text::{clean_bittensor, clean_emission, first_number, parse_total_entries, squash_text, strip_text};
use crate::types::{Field, SubnetRecord, LISTING_COLUMNS};

static P: Lazy<Selector> = Lazy::new(|| sel("p"));
static TABLE_ROW: Lazy<Selector> = Lazy::new(|| sel("table tbody tr"));
static TD: Lazy<Selector> = Lazy::new(|| sel("td"));
static GRID_ROW: Lazy<Selector> = Lazy::new(|| sel("[role='row']"));
static GRID_CELL: Lazy<Selector> = Lazy::new(|| sel("[role='cell'], [role='gridcell']"));
static LINK: Lazy<Selector> = Lazy::new(|| sel("a[href]"));

fn sel(s: &str) -> Selector {
    Selector::parse(s).expect("valid selector")
}

/// Number of subnets announced by the listing footer (`Showing … of N entries`).
pub fn total_entries(html: &str) -> Result<usize> {
    let doc = Html::parse_document(html);
    doc.select(&P)
        .map(squash_text)
        .filter(|t| t.contains("Showing"))
        .find_map(|t| parse_total_entries(&t))
        .ok_or_else(|| AppError::Extract("subnet counter ('Showing … of N entries') not found".to_string()))
}

/// Subnet rows from the listing page, read by column position.
///
/// Handles both a classic `<table>` body and an ARIA data grid. Rows without a
/// numeric first cell are skipped; a repeated netuid keeps its first row.
pub fn parse_listing(html: &str) -> Vec<SubnetRecord> {
    let doc = Html::parse_document(html);

    let mut rows: Vec<Vec<ElementRef<'_>>> = doc
        .select(&TABLE_ROW)
        .map(|tr| tr.select(&TD).collect())
        .collect();
    if rows.iter().all(|cells| cells.is_empty()) {
        rows = doc
            .select(&GRID_ROW)
            .map(|row| row.select(&GRID_CELL).collect())
            .collect();
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for cells in &rows {
        let Some(record) = record_from_cells(cells) else {
            continue;
        };
        if seen.insert(record.netuid) {
            out.push(record);
        } else {
            debug!(netuid = record.netuid, "duplicate listing row skipped");
        }
    }
    out
}

fn record_from_cells(cells: &[ElementRef<'_>]) -> Option<SubnetRecord> {
    let first = cells.first()?;
    let netuid: u16 = first_number(&strip_text(*first))?.parse().ok()?;
    let mut record = SubnetRecord::new(netuid);

    for (idx, &field) in LISTING_COLUMNS.iter().enumerate().skip(1) {
        let Some(cell) = cells.get(idx) else {
            break;
        };
        let raw = match field {
            Field::Github | Field::Discord => first_href(*cell).unwrap_or_else(|| strip_text(*cell)),
            _ => strip_text(*cell),
        };
        let value = match field {
            Field::Price | Field::RegistrationCost => clean_bittensor(&raw),
            Field::Emission => clean_emission(&raw),
            _ => raw,
        };
        if let Some(slot) = record.slot_mut(field) {
            *slot = value;
        }
    }

    // Link columns move around between layouts; pick them up by host instead.
    for cell in cells {
        for a in cell.select(&LINK) {
            let Some(href) = a.value().attr("href") else {
                continue;
            };
            if record.github.is_empty() && href.contains("github.com") {
                record.github = href.to_string();
            } else if record.discord.is_empty() && href.contains("discord") {
                record.discord = href.to_string();
            }
        }
    }

    Some(record)
}

fn first_href(cell: ElementRef<'_>) -> Option<String> {
    cell.select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .find(|h| !h.is_empty() && !h.starts_with('#'))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE_PAGE: &str = r##"
<html><body>
<table id="taostats-table">
  <thead><tr><th>NetUID</th><th>Name</th><th>Reg</th><th>Price</th><th>Emission</th><th>Reg Cost</th><th>GitHub</th><th>Discord</th><th>Key</th><th>VTrust</th></tr></thead>
  <tbody>
    <tr>
      <td>1</td><td><span>Apex</span></td><td>2023-03-01</td><td><p>τ 0.0231</p></td><td>2.51%</td>
      <td>1.05 Bittensor</td><td><a href="https://github.com/macrocosm-os/prompting">repo</a></td>
      <td><a href="https://discord.gg/apex">chat</a></td><td>5HCFWv…</td><td>0.98</td>
    </tr>
    <tr><td></td><td></td><td></td></tr>
    <tr>
      <td>SN 4</td><td>Targon</td><td>2023-04-11</td><td>0.0153</td><td>1.2%</td>
      <td>0.9</td><td></td><td></td><td>5Ex…</td><td>0.91</td>
    </tr>
    <tr>
      <td>1</td><td>Apex duplicate</td><td></td><td></td><td></td><td></td><td></td><td></td><td></td><td></td>
    </tr>
  </tbody>
</table>
<p>Showing <span>1</span> to <span>25</span> of <span>64</span> entries</p>
</body></html>"##;

    const GRID_PAGE: &str = r##"
<div class="MuiDataGrid-virtualScroller">
  <div role="row"><div role="columnheader">NetUID</div></div>
  <div role="row">
    <div role="cell">19</div><div role="cell">Nineteen</div><div role="cell">2024-01-02</div>
    <div role="cell">0.0087</div><div role="cell">0.77%</div><div role="cell">2.2</div>
    <div role="cell"></div><div role="cell"><a href="https://discord.com/invite/19">d</a></div>
    <div role="cell">5Fn…</div><div role="cell">0.88</div>
  </div>
  <div role="row">
    <div role="gridcell">21</div><div role="gridcell">Omega</div>
  </div>
</div>"##;

    #[test]
    fn reads_counter() {
        assert_eq!(total_entries(TABLE_PAGE).unwrap(), 64);
    }

    #[test]
    fn missing_counter_is_an_error() {
        let err = total_entries("<p>nothing here</p>").unwrap_err();
        assert!(matches!(err, AppError::Extract(_)), "got {err:?}");
    }

    #[test]
    fn table_rows_by_position() {
        let records = parse_listing(TABLE_PAGE);
        assert_eq!(records.len(), 2, "skeleton and duplicate rows must be dropped");

        let apex = &records[0];
        assert_eq!(apex.netuid, 1);
        assert_eq!(apex.name, "Apex");
        assert_eq!(apex.registration_date, "2023-03-01");
        assert_eq!(apex.price, "0.0231");
        assert_eq!(apex.emission, "2.51");
        assert_eq!(apex.registration_cost, "1.05");
        assert_eq!(apex.github, "https://github.com/macrocosm-os/prompting");
        assert_eq!(apex.discord, "https://discord.gg/apex");
        assert_eq!(apex.key, "5HCFWv…");
        assert_eq!(apex.vtrust, "0.98");

        let targon = &records[1];
        assert_eq!(targon.netuid, 4);
        assert_eq!(targon.name, "Targon");
        assert!(targon.github.is_empty());
    }

    #[test]
    fn aria_grid_fallback() {
        let records = parse_listing(GRID_PAGE);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].netuid, 19);
        assert_eq!(records[0].emission, "0.77");
        assert_eq!(records[0].discord, "https://discord.com/invite/19");
        assert_eq!(records[0].vtrust, "0.88");
        assert_eq!(records[1].netuid, 21);
        assert_eq!(records[1].name, "Omega");
        assert!(records[1].price.is_empty());
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(parse_listing("<html><body><p>Just a moment...</p></body></html>").is_empty());
    }
}

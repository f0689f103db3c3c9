use std::collections::{BTreeMap, HashSet};
use std::future::Future;

use reqwest::Url;
use tracing::{error, info, warn};

use crate::config::{Config, MAX_METAGRAPH_PAGES};
use crate::error::{AppError, Result};
use crate::extract::{detail, listing, metagraph};
use crate::fetcher::Fetcher;
use crate::sources::{collect_subnets, tao_api, ListingPage};
use crate::types::{
    headers, NeuronRow, ScrapeMode, Source, SubnetRecord, Table, ValidatorMetrics, DETAIL_COLUMNS,
    LISTING_COLUMNS, MERGED_COLUMNS, METRICS_HEADER,
};

/// Build the output table for the configured mode.
pub async fn build_table(cfg: &Config, fetcher: &Fetcher) -> Result<Table> {
    let mut page = ListingPage::default();
    match cfg.mode {
        ScrapeMode::Listing => listing_table(cfg, fetcher, &mut page).await,
        ScrapeMode::Detail => detail_table(cfg, fetcher, &mut page).await,
        ScrapeMode::Metrics => metrics_table(cfg, fetcher, &mut page).await,
        ScrapeMode::Merged => merged_table(cfg, fetcher, &mut page).await,
    }
}

async fn listing_table(cfg: &Config, fetcher: &Fetcher, page: &mut ListingPage) -> Result<Table> {
    let (records, source) = collect_subnets(cfg, fetcher, page, &cfg.sources).await?;
    info!(source = %source, "Found {} subnets", records.len());
    Ok(records_table(LISTING_COLUMNS, &records))
}

async fn detail_table(cfg: &Config, fetcher: &Fetcher, page: &mut ListingPage) -> Result<Table> {
    let netids = resolve_netids(cfg, fetcher, page).await?;
    let mut table = Table::new(headers(DETAIL_COLUMNS));
    let mut failed = 0usize;

    for (i, &netuid) in netids.iter().enumerate() {
        let url = cfg.metagraph_url(netuid);
        info!(netuid, "[{}/{}] Parsing {url}", i + 1, netids.len());
        let parsed = match fetcher.fetch_html(&url).await {
            Ok(html) => detail::parse_detail(&html, netuid),
            Err(e) => Err(e),
        };
        match parsed {
            Ok(record) => {
                info!(netuid, name = %record.name, "  {} {}", record.netuid, record.name);
                table.push(record.row(DETAIL_COLUMNS));
            }
            Err(e) => {
                error!(netuid, "Failed to parse {url}: {e}");
                failed += 1;
                table.push(SubnetRecord::error_row(netuid, DETAIL_COLUMNS.len()));
            }
        }
    }

    info!(total = netids.len(), failed, "Detail pass complete");
    Ok(table)
}

async fn metrics_table(cfg: &Config, fetcher: &Fetcher, page: &mut ListingPage) -> Result<Table> {
    let netids = resolve_netids(cfg, fetcher, page).await?;
    let mut header = vec!["netuid".to_string()];
    header.extend(METRICS_HEADER.iter().map(|h| h.to_string()));
    let mut table = Table::new(header);

    for (i, &netuid) in netids.iter().enumerate() {
        info!(netuid, "[{}/{}] Collecting neuron table", i + 1, netids.len());
        let metrics_row = match neuron_rows(cfg, fetcher, netuid).await {
            Ok(rows) => {
                let m = metagraph::aggregate(&rows);
                info!(
                    netuid,
                    rows = rows.len(),
                    "  VTrust avg={:?} | orange max={:?} min={:?} | green max={:?} min={:?}",
                    m.vtrust_avg, m.inc_orange_max, m.inc_orange_min, m.inc_green_max, m.inc_green_min,
                );
                m.row()
            }
            Err(e) => {
                error!(netuid, "Failed to collect metagraph: {e}");
                ValidatorMetrics::error_row()
            }
        };
        let mut row = vec![netuid.to_string()];
        row.extend(metrics_row);
        table.push(row);
    }

    Ok(table)
}

async fn neuron_rows(cfg: &Config, fetcher: &Fetcher, netuid: u16) -> Result<Vec<NeuronRow>> {
    let first = cfg.metagraph_url(netuid);
    collect_neuron_pages(netuid, first, move |url| async move { fetcher.fetch_html(&url).await }).await
}

/// Every neuron row of a subnet, following the table's "next page" link.
/// Stops when the link is gone, a URL repeats or `MAX_METAGRAPH_PAGES` are read.
/// An empty first page is an error.
async fn collect_neuron_pages<F, Fut>(netuid: u16, first_url: String, mut fetch_page: F) -> Result<Vec<NeuronRow>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let mut url = first_url;
    let mut visited = HashSet::new();
    let mut rows = Vec::new();

    for page_no in 1..=MAX_METAGRAPH_PAGES {
        if !visited.insert(url.clone()) {
            break;
        }
        let html = fetch_page(url.clone()).await?;
        let batch = metagraph::parse_neuron_rows(&html);
        if batch.is_empty() && page_no == 1 {
            return Err(AppError::Extract(format!("no neuron table on {url}")));
        }
        info!(netuid, page = page_no, rows = batch.len(), "  page {page_no}: {} rows", batch.len());
        rows.extend(batch);

        match metagraph::next_page_href(&html) {
            Some(href) => url = resolve_href(&url, &href)?,
            None => break,
        }
    }

    Ok(rows)
}

/// Absolute URL for a link found on `base`.
pub fn resolve_href(base: &str, href: &str) -> Result<String> {
    let base = Url::parse(base).map_err(|e| AppError::Extract(format!("bad page URL {base}: {e}")))?;
    let joined = base
        .join(href)
        .map_err(|e| AppError::Extract(format!("bad pagination link {href}: {e}")))?;
    Ok(joined.to_string())
}

async fn merged_table(cfg: &Config, fetcher: &Fetcher, page: &mut ListingPage) -> Result<Table> {
    let onchain = tao_api::fetch_subnets(cfg, fetcher).await?;

    let offchain = match collect_subnets(cfg, fetcher, page, &[Source::NextData, Source::Html]).await {
        Ok((records, _)) => records,
        Err(e) => {
            warn!("Off-chain metadata unavailable, writing API data only: {e}");
            Vec::new()
        }
    };

    let merged = merge_records(onchain, &offchain);
    info!(count = merged.len(), with_metadata = offchain.len(), "Merged on-chain and listing data");
    Ok(records_table(MERGED_COLUMNS, &merged))
}

/// On-chain records keyed by netuid, gaps filled from the listing records.
/// Listing-only subnets are not added. A subnet with no name anywhere is `SN{netuid}`.
pub fn merge_records(onchain: Vec<SubnetRecord>, offchain: &[SubnetRecord]) -> Vec<SubnetRecord> {
    let by_netuid: BTreeMap<u16, &SubnetRecord> = offchain.iter().map(|r| (r.netuid, r)).collect();
    let mut merged: BTreeMap<u16, SubnetRecord> = BTreeMap::new();
    for mut record in onchain {
        if let Some(meta) = by_netuid.get(&record.netuid) {
            record.fill_missing(meta);
        }
        if record.name.is_empty() {
            record.name = format!("SN{}", record.netuid);
        }
        merged.entry(record.netuid).or_insert(record);
    }
    merged.into_values().collect()
}

/// NETID_RANGE when given, otherwise `0..N` from the listing's entry counter.
async fn resolve_netids(cfg: &Config, fetcher: &Fetcher, page: &mut ListingPage) -> Result<Vec<u16>> {
    if let Some(ids) = &cfg.netids {
        info!(count = ids.len(), "Using NETID_RANGE");
        return Ok(ids.clone());
    }
    let total = listing::total_entries(page.get(cfg, fetcher).await?)?;
    info!(total, "Total subnets: {total}");
    let total = u16::try_from(total)
        .map_err(|_| AppError::Extract(format!("implausible subnet count {total}")))?;
    Ok((0..total).collect())
}

fn records_table(columns: &[crate::types::Field], records: &[SubnetRecord]) -> Table {
    let mut table = Table::new(headers(columns));
    for r in records {
        table.push(r.row(columns));
    }
    table
}

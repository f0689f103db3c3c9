use serde_json::Value;
use tracing::{debug, info};

use crate::config::{Config, TAO_API_PAGE_LIMIT};
use crate::error::{AppError, Result};
use crate::extract::next_data::record_from_json;
use crate::fetcher::Fetcher;
use crate::types::SubnetRecord;

/// Safety stop for pagination; the network has far fewer subnets than this covers.
const MAX_PAGES: u64 = 16;

/// Latest per-subnet state from the taostats API. Requires TAO_API_KEY.
pub async fn fetch_subnets(cfg: &Config, fetcher: &Fetcher) -> Result<Vec<SubnetRecord>> {
    let Some(api_key) = cfg.tao_api_key.as_deref() else {
        return Err(AppError::Config("TAO_API_KEY not set".to_string()));
    };

    let mut records = Vec::new();
    let mut page = 1u64;
    loop {
        let url = format!(
            "{}/api/subnet/latest/v1?limit={}&page={}",
            cfg.tao_api_url, TAO_API_PAGE_LIMIT, page
        );
        let body = fetcher.fetch_json(&url, Some(api_key)).await?;
        let (batch, next) = parse_page(&body)?;
        debug!(page, count = batch.len(), "taostats API page");
        records.extend(batch);

        match next {
            Some(n) if n > page && n <= MAX_PAGES => page = n,
            _ => break,
        }
    }

    records.sort_by_key(|r| r.netuid);
    records.dedup_by_key(|r| r.netuid);
    info!(count = records.len(), "taostats API returned {} subnets", records.len());
    Ok(records)
}

/// Records and the next page number (if any) from one API response.
/// Accepts `{ "data": [...], "pagination": { "next_page": n } }` or a bare array.
pub fn parse_page(body: &Value) -> Result<(Vec<SubnetRecord>, Option<u64>)> {
    let items = match body {
        Value::Array(items) => items,
        _ => body
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| AppError::Extract("taostats API response has no data array".to_string()))?,
    };
    let records = items.iter().filter_map(record_from_json).collect();
    let next = body
        .pointer("/pagination/next_page")
        .and_then(|n| n.as_u64());
    Ok((records, next))
}

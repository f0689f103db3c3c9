pub mod tao_api;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::extract::{listing, next_data};
use crate::fetcher::Fetcher;
use crate::types::{Source, SubnetRecord};

/// The listing page is shared by the Next.js and HTML sources; it is fetched
/// at most once per run, and a failed fetch is not repeated.
#[derive(Default)]
pub struct ListingPage {
    state: Option<std::result::Result<String, String>>,
}

impl ListingPage {
    #[cfg(test)]
    pub fn preloaded(html: &str) -> Self {
        Self { state: Some(Ok(html.to_string())) }
    }

    pub async fn get(&mut self, cfg: &Config, fetcher: &Fetcher) -> Result<&str> {
        if self.state.is_none() {
            let url = cfg.listing_url();
            info!(url = %url, "Fetching subnets listing");
            self.state = Some(fetcher.fetch_html(&url).await.map_err(|e| e.to_string()));
        }
        match &self.state {
            Some(Ok(html)) => Ok(html.as_str()),
            Some(Err(e)) => Err(AppError::Extract(format!("listing page unavailable: {e}"))),
            None => Err(AppError::Extract("listing page not fetched".to_string())),
        }
    }
}

/// Try each source in `sources` order; the first non-empty result wins.
/// Failures are logged and the next source is tried. No source is retried.
pub async fn collect_subnets(
    cfg: &Config,
    fetcher: &Fetcher,
    page: &mut ListingPage,
    sources: &[Source],
) -> Result<(Vec<SubnetRecord>, Source)> {
    let mut failures = Vec::new();

    for &source in sources {
        let result = match source {
            Source::NextData => match page.get(cfg, fetcher).await {
                Ok(html) => next_data::parse_next_data(html),
                Err(e) => Err(e),
            },
            Source::Html => page.get(cfg, fetcher).await.map(listing::parse_listing),
            Source::Api => tao_api::fetch_subnets(cfg, fetcher).await,
        };

        match result {
            Ok(records) if !records.is_empty() => {
                info!(source = %source, count = records.len(), "Source {source} produced {} subnets", records.len());
                return Ok((records, source));
            }
            Ok(_) => {
                warn!(source = %source, "Source {source} returned no subnets, trying next");
                failures.push(format!("{source}: no subnets"));
            }
            Err(e) => {
                warn!(source = %source, "Source {source} failed: {e}");
                failures.push(format!("{source}: {e}"));
            }
        }
    }

    Err(AppError::SourcesExhausted(failures.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> Config {
        Config::from_lookup(|key| match key {
            "OUTPUT" => Some("csv".to_string()),
            "BASE_URL" => Some("http://127.0.0.1:9".to_string()),
            "REQUEST_TIMEOUT_SECS" => Some("2".to_string()),
            "REQUEST_DELAY_MS" => Some("0".to_string()),
            _ => None,
        })
        .unwrap()
    }

    const TABLE_PAGE: &str = r#"<table><tbody>
<tr><td>2</td><td>Omron</td><td>2023-05-01</td><td>0.019</td><td>0.8%</td><td>0.5</td></tr>
</tbody></table>"#;

    #[tokio::test]
    async fn falls_through_to_html_table() {
        let cfg = offline_config();
        let fetcher = Fetcher::new(&cfg).unwrap();
        let mut page = ListingPage::preloaded(TABLE_PAGE);

        let (records, source) = collect_subnets(&cfg, &fetcher, &mut page, &[Source::NextData, Source::Html])
            .await
            .unwrap();
        assert_eq!(source, Source::Html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Omron");
    }

    #[tokio::test]
    async fn every_failure_is_reported() {
        let cfg = offline_config();
        let fetcher = Fetcher::new(&cfg).unwrap();
        let mut page = ListingPage::preloaded("<html><body>Just a moment...</body></html>");

        let err = collect_subnets(&cfg, &fetcher, &mut page, &[Source::Html, Source::Api])
            .await
            .unwrap_err();
        let msg = match err {
            AppError::SourcesExhausted(msg) => msg,
            other => panic!("expected SourcesExhausted, got {other:?}"),
        };
        assert!(msg.contains("html: no subnets"), "{msg}");
        assert!(msg.contains("api: Configuration error: TAO_API_KEY not set"), "{msg}");
    }

    #[tokio::test]
    async fn unreachable_listing_is_fetched_once() {
        let cfg = offline_config();
        let fetcher = Fetcher::new(&cfg).unwrap();
        let mut page = ListingPage::default();

        let err = collect_subnets(&cfg, &fetcher, &mut page, &[Source::NextData, Source::Html])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SourcesExhausted(_)));
        assert!(matches!(page.state, Some(Err(_))));
        assert_eq!(fetcher.request_count(), 1);
    }
}

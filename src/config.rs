use std::path::PathBuf;

use crate::error::{AppError, Result};
use crate::types::{OutputKind, ScrapeMode, Source};

pub const BASE_URL: &str = "https://taostats.io";
pub const TAO_API_URL: &str = "https://api.taostats.io";

pub const LISTING_PATH: &str = "/subnets";

/// Browser-like profile; the site serves a bot wall to obvious clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Worksheet used by the listing and merged runs.
pub const STATS_SHEET: &str = "taostats stats";
/// Worksheet used by the per-subnet detail and metrics runs.
pub const SUBNETS_SHEET: &str = "taostats subnets";

/// Metric columns sit to the right of the detail columns (A..I).
pub const METRICS_ANCHOR: &str = "J1";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DELAY_MS: u64 = 500;

/// Max records per taostats API page.
pub const TAO_API_PAGE_LIMIT: usize = 256;

/// Hard stop for metagraph pagination; a subnet has at most 256 UIDs.
pub const MAX_METAGRAPH_PAGES: usize = 8;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Column layout of the metagraph neuron table.
pub mod neuron_columns {
    /// Second cell carries the role icon (shield / pickaxe).
    pub const ICON: usize = 1;
    pub const VTRUST: usize = 5;
    pub const INCENTIVE: usize = 9;
    /// Rows with fewer cells are partial or placeholder rows.
    pub const MIN_WIDTH: usize = 9;
}

/// Relative path of a subnet's metagraph page, largest stake first.
pub fn metagraph_path(netuid: u16) -> String {
    format!("/subnets/{netuid}/metagraph?order=stake%3Adesc&limit=100")
}

/// Where the Google service-account key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Raw JSON held in an env var (GOOGLE_SERVICE_ACCOUNT_JSON / GSPREAD_CREDS_JSON).
    Inline(String),
    /// Key file on disk (GOOGLE_APPLICATION_CREDENTIALS).
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub tao_api_url: String,
    /// Optional key for the taostats API source (TAO_API_KEY)
    pub tao_api_key: Option<String>,
    pub log_level: String,
    pub mode: ScrapeMode,
    /// Fallback order for the listing sources (SOURCES, comma-separated)
    pub sources: Vec<Source>,
    pub output: OutputKind,
    pub csv_path: PathBuf,
    pub spreadsheet_id: Option<String>,
    pub credentials: Option<Credentials>,
    pub sheet_name: String,
    /// Top-left cell for anchored writes; None means replace the whole sheet (SHEET_ANCHOR)
    pub sheet_anchor: Option<String>,
    /// Explicit netuids to process (NETID_RANGE, e.g. "1-32" or "0,3,5-7")
    pub netids: Option<Vec<u16>>,
    /// Pause between consecutive requests (REQUEST_DELAY_MS)
    pub request_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = match var("SCRAPE_MODE") {
            Some(v) => v.parse::<ScrapeMode>().map_err(AppError::Config)?,
            None => ScrapeMode::Listing,
        };

        let sources = match var("SOURCES") {
            Some(v) => parse_sources(&v)?,
            None => vec![Source::NextData, Source::Html, Source::Api],
        };

        let output = match var("OUTPUT") {
            Some(v) => v.parse::<OutputKind>().map_err(AppError::Config)?,
            None => OutputKind::Sheets,
        };

        let credentials = var("GOOGLE_SERVICE_ACCOUNT_JSON")
            .or_else(|| var("GSPREAD_CREDS_JSON"))
            .map(Credentials::Inline)
            .or_else(|| var("GOOGLE_APPLICATION_CREDENTIALS").map(|p| Credentials::File(PathBuf::from(p))));
        let spreadsheet_id = var("SPREADSHEET_ID");

        if output == OutputKind::Sheets && (spreadsheet_id.is_none() || credentials.is_none()) {
            return Err(AppError::Config(
                "SPREADSHEET_ID or GOOGLE_SERVICE_ACCOUNT_JSON not set (use OUTPUT=csv to write a file instead)"
                    .to_string(),
            ));
        }

        let default_sheet = match mode {
            ScrapeMode::Listing | ScrapeMode::Merged => STATS_SHEET,
            ScrapeMode::Detail | ScrapeMode::Metrics => SUBNETS_SHEET,
        };
        let sheet_anchor = var("SHEET_ANCHOR").or_else(|| {
            (mode == ScrapeMode::Metrics).then(|| METRICS_ANCHOR.to_string())
        });

        let netids = var("NETID_RANGE").map(|v| parse_netid_range(&v)).transpose()?;

        Ok(Self {
            base_url: var("BASE_URL")
                .unwrap_or_else(|| BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            tao_api_url: var("TAO_API_URL")
                .unwrap_or_else(|| TAO_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            tao_api_key: var("TAO_API_KEY"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            mode,
            sources,
            output,
            csv_path: var("CSV_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(format!("subnets_{mode}.csv"))),
            spreadsheet_id,
            credentials,
            sheet_name: var("SHEET_NAME").unwrap_or_else(|| default_sheet.to_string()),
            sheet_anchor,
            netids,
            request_delay_ms: parse_num(var("REQUEST_DELAY_MS"), "REQUEST_DELAY_MS", DEFAULT_DELAY_MS)?,
            request_timeout_secs: parse_num(
                var("REQUEST_TIMEOUT_SECS"),
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?,
        })
    }

    pub fn listing_url(&self) -> String {
        format!("{}{}", self.base_url, LISTING_PATH)
    }

    pub fn metagraph_url(&self, netuid: u16) -> String {
        format!("{}{}", self.base_url, metagraph_path(netuid))
    }
}

fn parse_num(raw: Option<String>, key: &str, default: u64) -> Result<u64> {
    match raw {
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| AppError::Config(format!("{key} must be a non-negative integer, got {v:?}"))),
        None => Ok(default),
    }
}

fn parse_sources(s: &str) -> Result<Vec<Source>> {
    let mut out = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let source = part.parse::<Source>().map_err(AppError::Config)?;
        if !out.contains(&source) {
            out.push(source);
        }
    }
    if out.is_empty() {
        return Err(AppError::Config("SOURCES must name at least one source".to_string()));
    }
    Ok(out)
}

/// Parse "5", "1-32" or "0,3,5-7" into a sorted, deduplicated netuid list.
pub fn parse_netid_range(s: &str) -> Result<Vec<u16>> {
    let bad = |part: &str| AppError::Config(format!("Invalid NETID_RANGE entry: {part:?}"));
    let mut out = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((a, b)) = part.split_once('-') {
            let a: u16 = a.trim().parse().map_err(|_| bad(part))?;
            let b: u16 = b.trim().parse().map_err(|_| bad(part))?;
            if a > b {
                return Err(bad(part));
            }
            out.extend(a..=b);
        } else {
            out.push(part.parse().map_err(|_| bad(part))?);
        }
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn sheets_output_requires_spreadsheet_and_credentials() {
        let err = Config::from_lookup(lookup(&[("SPREADSHEET_ID", "abc")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)), "got {err:?}");

        let err = Config::from_lookup(lookup(&[("GOOGLE_SERVICE_ACCOUNT_JSON", "{}")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)), "got {err:?}");
    }

    #[test]
    fn csv_output_needs_no_credentials() {
        let cfg = Config::from_lookup(lookup(&[("OUTPUT", "csv")])).unwrap();
        assert_eq!(cfg.output, OutputKind::Csv);
        assert_eq!(cfg.mode, ScrapeMode::Listing);
        assert_eq!(cfg.csv_path, PathBuf::from("subnets_listing.csv"));
        assert_eq!(cfg.sources, vec![Source::NextData, Source::Html, Source::Api]);
        assert_eq!(cfg.sheet_name, STATS_SHEET);
        assert!(cfg.sheet_anchor.is_none());
    }

    #[test]
    fn credentials_prefer_inline_json_over_key_file() {
        let cfg = Config::from_lookup(lookup(&[
            ("SPREADSHEET_ID", "sheet"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/tmp/key.json"),
            ("GSPREAD_CREDS_JSON", "{\"a\":1}"),
        ]))
        .unwrap();
        assert_eq!(cfg.credentials, Some(Credentials::Inline("{\"a\":1}".to_string())));

        let cfg = Config::from_lookup(lookup(&[
            ("SPREADSHEET_ID", "sheet"),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/tmp/key.json"),
        ]))
        .unwrap();
        assert_eq!(cfg.credentials, Some(Credentials::File(PathBuf::from("/tmp/key.json"))));
    }

    #[test]
    fn metrics_mode_defaults_to_anchored_subnets_sheet() {
        let cfg = Config::from_lookup(lookup(&[("OUTPUT", "stdout"), ("SCRAPE_MODE", "metrics")])).unwrap();
        assert_eq!(cfg.sheet_name, SUBNETS_SHEET);
        assert_eq!(cfg.sheet_anchor.as_deref(), Some(METRICS_ANCHOR));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let cfg = Config::from_lookup(lookup(&[("OUTPUT", "csv"), ("BASE_URL", "http://localhost:8080/")])).unwrap();
        assert_eq!(cfg.listing_url(), "http://localhost:8080/subnets");
        assert_eq!(
            cfg.metagraph_url(7),
            "http://localhost:8080/subnets/7/metagraph?order=stake%3Adesc&limit=100"
        );
    }

    #[test]
    fn rejects_bad_numbers_and_sources() {
        assert!(Config::from_lookup(lookup(&[("OUTPUT", "csv"), ("REQUEST_DELAY_MS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("OUTPUT", "csv"), ("SOURCES", "browser")])).is_err());
        assert!(Config::from_lookup(lookup(&[("OUTPUT", "excel")])).is_err());
    }

    #[test]
    fn sources_keep_order_and_drop_repeats() {
        let cfg = Config::from_lookup(lookup(&[("OUTPUT", "csv"), ("SOURCES", "api, html,api")])).unwrap();
        assert_eq!(cfg.sources, vec![Source::Api, Source::Html]);
    }

    #[test]
    fn netid_range_forms() {
        assert_eq!(parse_netid_range("3").unwrap(), vec![3]);
        assert_eq!(parse_netid_range("1-4").unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(parse_netid_range("5-6, 0,5").unwrap(), vec![0, 5, 6]);
        assert!(parse_netid_range("9-2").is_err());
        assert!(parse_netid_range("x").is_err());
    }
}

pub mod csv_out;
pub mod sheets;

use tracing::info;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetcher::Fetcher;
use crate::types::{OutputKind, Table};

use self::sheets::{Layout, ServiceAccountKey, SheetsClient};

/// Deliver the finished table to the configured output.
pub async fn write(cfg: &Config, fetcher: &Fetcher, table: &Table) -> Result<()> {
    match cfg.output {
        OutputKind::Csv => {
            let n = csv_out::write_file(&cfg.csv_path, table)?;
            info!(rows = n, path = %cfg.csv_path.display(), "Wrote {n} rows to {}", cfg.csv_path.display());
        }
        OutputKind::Stdout => {
            csv_out::write_to(std::io::stdout().lock(), table)?;
        }
        OutputKind::Sheets => {
            let (Some(spreadsheet_id), Some(creds)) = (&cfg.spreadsheet_id, &cfg.credentials) else {
                return Err(AppError::Config("SPREADSHEET_ID or GOOGLE_SERVICE_ACCOUNT_JSON not set".to_string()));
            };
            let key = ServiceAccountKey::load(creds)?;
            let client = SheetsClient::connect(fetcher.client(), &key, spreadsheet_id).await?;
            let layout = match &cfg.sheet_anchor {
                Some(cell) => Layout::Anchored(cell.clone()),
                None => Layout::Replace,
            };
            let n = client.write_table(&cfg.sheet_name, &layout, table).await?;
            info!(
                rows = n,
                sheet = %cfg.sheet_name,
                "Wrote {n} rows to sheet '{}' ({layout:?})",
                cfg.sheet_name,
            );
        }
    }
    Ok(())
}

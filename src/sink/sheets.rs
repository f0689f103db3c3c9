//! Google Sheets v4 over plain REST, authenticated as a service account.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::config::{Credentials, GOOGLE_TOKEN_URI, SHEETS_API_URL, SHEETS_SCOPE};
use crate::error::{AppError, Result};
use crate::types::Table;

const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;

/// The fields of a service-account key file this client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(creds: &Credentials) -> Result<Self> {
        match creds {
            Credentials::Inline(raw) => Self::from_json(raw),
            Credentials::File(path) => Self::from_json(&std::fs::read_to_string(path)?),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// RS256 assertion exchanged for an access token at `token_uri`.
pub fn sign_assertion(key: &ServiceAccountKey, now: i64) -> Result<String> {
    let claims = Claims {
        iss: key.client_email.clone(),
        scope: SHEETS_SCOPE.to_string(),
        aud: key.token_uri.clone(),
        iat: now,
        exp: now + TOKEN_LIFETIME_SECS,
    };
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// How a table lands on the worksheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Clear the whole worksheet, then write from A1.
    Replace,
    /// Write from the given cell without clearing anything else.
    Anchored(String),
}

/// A1 range on a named worksheet: `'taostats stats'!A1`.
pub fn sheet_range(sheet: &str, cell: &str) -> String {
    format!("{}!{}", quote_sheet(sheet), cell)
}

fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

pub struct SheetsClient<'a> {
    http: &'a reqwest::Client,
    api_url: String,
    spreadsheet_id: String,
    token: String,
}

impl<'a> SheetsClient<'a> {
    /// Exchange a signed assertion for a bearer token.
    pub async fn connect(http: &'a reqwest::Client, key: &ServiceAccountKey, spreadsheet_id: &str) -> Result<Self> {
        let assertion = sign_assertion(key, chrono::Utc::now().timestamp())?;
        let resp = http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let token: TokenResponse = check(resp).await?.json().await?;
        debug!(client = %key.client_email, "service account token acquired");

        Ok(Self {
            http,
            api_url: SHEETS_API_URL.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            token: token.access_token,
        })
    }

    /// Add the worksheet if the spreadsheet does not have it yet.
    pub async fn ensure_sheet(&self, title: &str) -> Result<()> {
        let mut url = self.spreadsheet_url(None)?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");
        let resp = self.http.get(url).bearer_auth(&self.token).send().await?;
        let meta: serde_json::Value = check(resp).await?.json().await?;

        if sheet_titles(&meta).iter().any(|t| t == title) {
            return Ok(());
        }

        let url = self.spreadsheet_url(Some(":batchUpdate"))?;
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": title } } }]
        });
        let resp = self.http.post(url).bearer_auth(&self.token).json(&body).send().await?;
        check(resp).await?;
        info!(sheet = title, "worksheet created");
        Ok(())
    }

    pub async fn clear(&self, range: &str) -> Result<()> {
        let url = self.values_url(range, ":clear")?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({}))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn update(&self, range: &str, values: &[Vec<String>]) -> Result<()> {
        let mut url = self.values_url(range, "")?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": values });
        let resp = self.http.put(url).bearer_auth(&self.token).json(&body).send().await?;
        check(resp).await?;
        Ok(())
    }

    /// Header + rows onto `sheet`. Returns the number of data rows written.
    pub async fn write_table(&self, sheet: &str, layout: &Layout, table: &Table) -> Result<usize> {
        self.ensure_sheet(sheet).await?;
        let anchor = match layout {
            Layout::Replace => {
                self.clear(&quote_sheet(sheet)).await?;
                "A1"
            }
            Layout::Anchored(cell) => cell.as_str(),
        };
        let range = sheet_range(sheet, anchor);
        self.update(&range, &table.values()).await?;
        Ok(table.rows.len())
    }

    fn spreadsheet_url(&self, suffix: Option<&str>) -> Result<Url> {
        let mut url = parse_url(&self.api_url)?;
        let last = format!("{}{}", self.spreadsheet_id, suffix.unwrap_or_default());
        push_segments(&mut url, &[&last])?;
        Ok(url)
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url> {
        values_url(&self.api_url, &self.spreadsheet_id, range, suffix)
    }
}

/// `{api}/{id}/values/{range}{suffix}` with the range percent-encoded as one segment.
pub fn values_url(api_url: &str, spreadsheet_id: &str, range: &str, suffix: &str) -> Result<Url> {
    let mut url = parse_url(api_url)?;
    push_segments(&mut url, &[spreadsheet_id, "values", &format!("{range}{suffix}")])?;
    Ok(url)
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| AppError::Sheets(format!("bad API URL {raw}: {e}")))
}

fn push_segments(url: &mut Url, segments: &[&str]) -> Result<()> {
    url.path_segments_mut()
        .map_err(|_| AppError::Sheets("API URL cannot take a path".to_string()))?
        .extend(segments);
    Ok(())
}

fn sheet_titles(meta: &serde_json::Value) -> Vec<String> {
    meta.get("sheets")
        .and_then(|s| s.as_array())
        .map(|sheets| {
            sheets
                .iter()
                .filter_map(|s| s.pointer("/properties/title").and_then(|t| t.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Turn a non-2xx Google response into `AppError::Sheets` carrying its body.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    Err(AppError::Sheets(format!("{status} from {url}: {}", body.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    const TEST_KEY: &str = include_str!("../../testdata/service_account_test_key.pem");
    const TEST_PUB: &str = include_str!("../../testdata/service_account_test_key.pub.pem");

    fn key_json() -> String {
        json!({
            "type": "service_account",
            "project_id": "scraper-test",
            "client_email": "scraper@scraper-test.iam.gserviceaccount.com",
            "private_key": TEST_KEY,
        })
        .to_string()
    }

    #[test]
    fn key_defaults_token_uri() {
        let key = ServiceAccountKey::from_json(&key_json()).unwrap();
        assert_eq!(key.token_uri, GOOGLE_TOKEN_URI);
        assert_eq!(key.client_email, "scraper@scraper-test.iam.gserviceaccount.com");
    }

    #[test]
    fn key_without_private_key_is_rejected() {
        let err = ServiceAccountKey::from_json(r#"{"client_email":"x"}"#).unwrap_err();
        assert!(matches!(err, AppError::Json(_)), "got {err:?}");
    }

    #[test]
    fn assertion_carries_sheets_claims() {
        let key = ServiceAccountKey::from_json(&key_json()).unwrap();
        let now = chrono::Utc::now().timestamp();
        let token = sign_assertion(&key, now).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[GOOGLE_TOKEN_URI]);
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_rsa_pem(TEST_PUB.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();

        assert_eq!(
            decoded.claims,
            Claims {
                iss: key.client_email.clone(),
                scope: SHEETS_SCOPE.to_string(),
                aud: GOOGLE_TOKEN_URI.to_string(),
                iat: now,
                exp: now + TOKEN_LIFETIME_SECS,
            }
        );
    }

    #[test]
    fn garbage_private_key_fails_to_sign() {
        let key = ServiceAccountKey {
            client_email: "x".to_string(),
            private_key: "not a pem".to_string(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
        };
        assert!(matches!(sign_assertion(&key, 0), Err(AppError::Jwt(_))));
    }

    #[test]
    fn ranges_are_quoted() {
        assert_eq!(sheet_range("taostats stats", "A1"), "'taostats stats'!A1");
        assert_eq!(sheet_range("Bob's", "J1"), "'Bob''s'!J1");
    }

    #[test]
    fn values_url_encodes_range_as_one_segment() {
        let url = values_url(SHEETS_API_URL, "sheet123", &sheet_range("taostats stats", "A1"), ":clear").unwrap();
        let s = url.as_str();
        assert!(s.starts_with("https://sheets.googleapis.com/v4/spreadsheets/sheet123/values/"), "{s}");
        assert!(s.contains("taostats%20stats"), "{s}");
        assert!(s.ends_with("!A1:clear"), "{s}");
        assert!(!s.contains(' '));
    }

    #[test]
    fn titles_from_metadata() {
        let meta = json!({"sheets": [
            {"properties": {"title": "Sheet1"}},
            {"properties": {"title": "taostats stats"}}
        ]});
        assert_eq!(sheet_titles(&meta), vec!["Sheet1", "taostats stats"]);
        assert!(sheet_titles(&json!({})).is_empty());
    }
}

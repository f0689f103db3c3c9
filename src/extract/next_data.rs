//! Subnet records from the JSON that Next.js inlines into the page, either as
//! a `__NEXT_DATA__` script (pages router) or as `self.__next_f.push` flight
//! chunks (app router).

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::extract::text::{clean_bittensor, clean_emission};
use crate::types::{Field, SubnetRecord};

static NEXT_DATA: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script#__NEXT_DATA__").expect("valid selector"));

const FLIGHT_NEEDLE: &str = "self.__next_f.push([1,\"";

/// Key aliases seen across page and API revisions, most specific first.
const ALIASES: &[(Field, &[&str])] = &[
    (Field::Name, &["name", "subnet_name", "subnetName"]),
    (
        Field::RegistrationDate,
        &["registration_date", "registered_at", "registration_timestamp", "regDate", "created_at"],
    ),
    (Field::Price, &["price", "alpha_price", "token_price"]),
    (Field::Emission, &["emission", "emission_percentage", "emissions"]),
    (
        Field::RegistrationCost,
        &["registration_cost", "reg_cost", "burn_cost", "neuron_registration_cost", "recycle_cost"],
    ),
    (Field::Github, &["github", "github_repo", "githubRepo"]),
    (Field::Discord, &["discord", "discord_url", "discordUrl"]),
    (Field::Key, &["key", "owner", "owner_ss58", "owner_hotkey", "hotkey", "coldkey"]),
    (Field::Vtrust, &["vtrust", "validator_trust"]),
    (Field::MarketCap, &["market_cap", "marketCap"]),
    (Field::Volume, &["volume", "tao_volume_24_hr", "volume_24h"]),
    (Field::Liquidity, &["liquidity"]),
];

/// Nested objects some payloads use for subnet identity/metadata.
const NESTED: &[&str] = &["identity", "metadata", "subnet_identity"];

/// Records from whichever inline payload the page carries.
pub fn parse_next_data(html: &str) -> Result<Vec<SubnetRecord>> {
    if let Some(json) = next_data_json(html) {
        if let Some(items) = find_subnet_array(&json) {
            return Ok(records_from_array(items));
        }
    }

    let payload = flight_payload(html)?;
    let items = find_array_in_text(&payload)
        .ok_or_else(|| AppError::Extract("no subnet array in Next.js flight payload".to_string()))?;
    Ok(records_from_array(&items))
}

/// Contents of `<script id="__NEXT_DATA__">`, if present and valid JSON.
pub fn next_data_json(html: &str) -> Option<Value> {
    let doc = Html::parse_document(html);
    let script = doc.select(&NEXT_DATA).next()?;
    let raw: String = script.text().collect();
    serde_json::from_str(raw.trim()).ok()
}

/// All `self.__next_f.push([1,"…"])` string chunks, unescaped and joined.
pub fn flight_payload(html: &str) -> Result<String> {
    let mut out = String::new();
    let mut rest = html;

    while let Some(start) = rest.find(FLIGHT_NEEDLE) {
        let after = &rest[start + FLIGHT_NEEDLE.len()..];
        let Some(end) = closing_quote(after) else {
            break;
        };
        let decoded: String = serde_json::from_str(&format!("\"{}\"", &after[..end]))?;
        out.push_str(&decoded);
        rest = &after[end + 1..];
    }

    if out.is_empty() {
        return Err(AppError::Extract("no Next.js payload (__NEXT_DATA__ or flight chunks) in page".to_string()));
    }
    Ok(out)
}

/// Byte offset of the first unescaped `"` in `s`.
fn closing_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, b) in s.bytes().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' => escaped = true,
            b'"' => return Some(i),
            _ => {}
        }
    }
    None
}

/// Depth-first search for the first array whose first element is an object
/// carrying a `netuid` key.
pub fn find_subnet_array(v: &Value) -> Option<&Vec<Value>> {
    match v {
        Value::Array(items) => {
            if items.first().is_some_and(|f| f.get("netuid").is_some()) {
                return Some(items);
            }
            items.iter().find_map(find_subnet_array)
        }
        Value::Object(map) => map.values().find_map(find_subnet_array),
        _ => None,
    }
}

/// Scan free text for a balanced `[{…}]` JSON array holding subnet objects.
fn find_array_in_text(text: &str) -> Option<Vec<Value>> {
    let mut from = 0;
    while let Some(pos) = text[from..].find("[{") {
        let start = from + pos;
        if let Some(len) = balanced_len(&text[start..]) {
            if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&text[start..start + len]) {
                if let Some(found) = find_subnet_array(&Value::Array(items)) {
                    return Some(found.clone());
                }
            }
        }
        from = start + 1;
    }
    None
}

/// Length of the bracketed JSON value starting at `s[0]`, honouring strings.
fn balanced_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    for (i, b) in s.bytes().enumerate() {
        if in_str {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_str = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_str = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn records_from_array(items: &[Value]) -> Vec<SubnetRecord> {
    let mut out: Vec<SubnetRecord> = items.iter().filter_map(record_from_json).collect();
    out.sort_by_key(|r| r.netuid);
    out.dedup_by_key(|r| r.netuid);
    out
}

/// Map one JSON object onto a record. None without a usable `netuid`.
pub fn record_from_json(obj: &Value) -> Option<SubnetRecord> {
    let netuid = match obj.get("netuid")? {
        Value::Number(n) => u16::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };

    let mut record = SubnetRecord::new(netuid);
    for (field, keys) in ALIASES {
        let Some(value) = lookup(obj, keys) else {
            continue;
        };
        let value = match field {
            Field::Price | Field::RegistrationCost => clean_bittensor(&value),
            Field::Emission => clean_emission(&value),
            _ => value,
        };
        if let Some(slot) = record.slot_mut(*field) {
            *slot = value;
        }
    }
    Some(record)
}

fn lookup(obj: &Value, keys: &[&str]) -> Option<String> {
    let direct = keys.iter().find_map(|k| obj.get(*k).and_then(render));
    direct.or_else(|| {
        NESTED
            .iter()
            .filter_map(|n| obj.get(*n))
            .find_map(|nested| keys.iter().find_map(|k| nested.get(*k).and_then(render)))
    })
}

/// Scalar as displayed text; `{ "ss58": … }`-style wrappers are unwrapped.
fn render(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => ["ss58", "value", "address"]
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(render),
        _ => None,
    }
}

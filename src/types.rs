// ---------------------------------------------------------------------------
// Subnet record
// ---------------------------------------------------------------------------

/// One subnet as shown by the site. Values are kept exactly as displayed
/// (after light cleaning); an empty string means the field was not found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetRecord {
    pub netuid: u16,
    pub name: String,
    pub registration_date: String,
    pub price: String,
    pub emission: String,
    pub registration_cost: String,
    pub github: String,
    pub discord: String,
    pub key: String,
    pub vtrust: String,
    pub market_cap: String,
    pub volume: String,
    pub liquidity: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Netuid,
    Name,
    RegistrationDate,
    Price,
    Emission,
    RegistrationCost,
    Github,
    Discord,
    Key,
    Vtrust,
    MarketCap,
    Volume,
    Liquidity,
}

impl Field {
    pub fn header(self) -> &'static str {
        match self {
            Field::Netuid => "netuid",
            Field::Name => "name",
            Field::RegistrationDate => "reg_date",
            Field::Price => "price",
            Field::Emission => "emission",
            Field::RegistrationCost => "reg_cost",
            Field::Github => "github",
            Field::Discord => "discord",
            Field::Key => "key",
            Field::Vtrust => "vtrust",
            Field::MarketCap => "market_cap",
            Field::Volume => "volume",
            Field::Liquidity => "liquidity",
        }
    }
}

/// Column order of the subnets listing table (and of listing output).
pub const LISTING_COLUMNS: &[Field] = &[
    Field::Netuid,
    Field::Name,
    Field::RegistrationDate,
    Field::Price,
    Field::Emission,
    Field::RegistrationCost,
    Field::Github,
    Field::Discord,
    Field::Key,
    Field::Vtrust,
];

/// Columns produced from a metagraph detail page.
pub const DETAIL_COLUMNS: &[Field] = &[
    Field::Netuid,
    Field::Name,
    Field::RegistrationDate,
    Field::Key,
    Field::Discord,
    Field::Github,
    Field::Emission,
    Field::Price,
    Field::RegistrationCost,
];

/// On-chain values joined with off-chain listing metadata, plus market columns.
pub const MERGED_COLUMNS: &[Field] = &[
    Field::Netuid,
    Field::Name,
    Field::Price,
    Field::Emission,
    Field::RegistrationCost,
    Field::Github,
    Field::Discord,
    Field::Key,
    Field::MarketCap,
    Field::Volume,
    Field::Liquidity,
];

impl SubnetRecord {
    pub fn new(netuid: u16) -> Self {
        Self { netuid, ..Self::default() }
    }

    pub fn get(&self, field: Field) -> String {
        match field {
            Field::Netuid => self.netuid.to_string(),
            Field::Name => self.name.clone(),
            Field::RegistrationDate => self.registration_date.clone(),
            Field::Price => self.price.clone(),
            Field::Emission => self.emission.clone(),
            Field::RegistrationCost => self.registration_cost.clone(),
            Field::Github => self.github.clone(),
            Field::Discord => self.discord.clone(),
            Field::Key => self.key.clone(),
            Field::Vtrust => self.vtrust.clone(),
            Field::MarketCap => self.market_cap.clone(),
            Field::Volume => self.volume.clone(),
            Field::Liquidity => self.liquidity.clone(),
        }
    }

    /// Mutable access to a text field. `Netuid` is typed and has no slot.
    pub fn slot_mut(&mut self, field: Field) -> Option<&mut String> {
        let slot = match field {
            Field::Netuid => return None,
            Field::Name => &mut self.name,
            Field::RegistrationDate => &mut self.registration_date,
            Field::Price => &mut self.price,
            Field::Emission => &mut self.emission,
            Field::RegistrationCost => &mut self.registration_cost,
            Field::Github => &mut self.github,
            Field::Discord => &mut self.discord,
            Field::Key => &mut self.key,
            Field::Vtrust => &mut self.vtrust,
            Field::MarketCap => &mut self.market_cap,
            Field::Volume => &mut self.volume,
            Field::Liquidity => &mut self.liquidity,
        };
        Some(slot)
    }

    pub fn row(&self, columns: &[Field]) -> Vec<String> {
        columns.iter().map(|&f| self.get(f)).collect()
    }

    /// Copy every non-empty field of `other` into the fields still empty here.
    pub fn fill_missing(&mut self, other: &SubnetRecord) {
        for &field in MERGE_FIELDS {
            let theirs = other.get(field);
            if theirs.is_empty() {
                continue;
            }
            if let Some(mine) = self.slot_mut(field) {
                if mine.is_empty() {
                    *mine = theirs;
                }
            }
        }
    }

    /// Placeholder for a subnet whose page could not be scraped.
    pub fn error_row(netuid: u16, width: usize) -> Vec<String> {
        let mut row = vec![String::new(); width.max(2)];
        row[0] = netuid.to_string();
        row[1] = "ERROR".to_string();
        row.truncate(width.max(1));
        row
    }
}

const MERGE_FIELDS: &[Field] = &[
    Field::Name,
    Field::RegistrationDate,
    Field::Price,
    Field::Emission,
    Field::RegistrationCost,
    Field::Github,
    Field::Discord,
    Field::Key,
    Field::Vtrust,
    Field::MarketCap,
    Field::Volume,
    Field::Liquidity,
];

pub fn headers(columns: &[Field]) -> Vec<String> {
    columns.iter().map(|f| f.header().to_string()).collect()
}

// ---------------------------------------------------------------------------
// Metagraph neurons
// ---------------------------------------------------------------------------

/// Role of a neuron row, read from the icon in its second cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeuronRole {
    /// Shield icon.
    Validator,
    /// Orange pickaxe (`text-[#F90]`).
    OrangeMiner,
    /// Green pickaxe (`text-[#00DBBC]`).
    GreenMiner,
    Other,
}

#[derive(Debug, Clone)]
pub struct NeuronRow {
    pub role: NeuronRole,
    pub cells: Vec<String>,
}

/// Aggregates over one subnet's neuron table. `None` renders as an empty cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatorMetrics {
    pub vtrust_avg: Option<f64>,
    pub inc_orange_max: Option<f64>,
    pub inc_orange_min: Option<f64>,
    pub inc_green_max: Option<f64>,
    pub inc_green_min: Option<f64>,
}

pub const METRICS_HEADER: &[&str] = &[
    "vtrust_avg",
    "inc_orange_max",
    "inc_orange_min",
    "inc_green_max",
    "inc_green_min",
];

impl ValidatorMetrics {
    pub fn row(&self) -> Vec<String> {
        [
            self.vtrust_avg,
            self.inc_orange_max,
            self.inc_orange_min,
            self.inc_green_max,
            self.inc_green_min,
        ]
        .iter()
        .map(|v| v.map(|x| x.to_string()).unwrap_or_default())
        .collect()
    }

    pub fn error_row() -> Vec<String> {
        vec!["ERROR".to_string(); METRICS_HEADER.len()]
    }
}

// ---------------------------------------------------------------------------
// Output table
// ---------------------------------------------------------------------------

/// Header plus rows; what every sink writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(header: Vec<String>) -> Self {
        Self { header, rows: Vec::new() }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Header first, then the data rows.
    pub fn values(&self) -> Vec<Vec<String>> {
        std::iter::once(self.header.clone())
            .chain(self.rows.iter().cloned())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Run selection
// ---------------------------------------------------------------------------

/// Where listing records come from; tried in the configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Inline Next.js JSON (`__NEXT_DATA__` or flight chunks).
    NextData,
    /// Server-rendered listing table.
    Html,
    /// taostats REST API (needs TAO_API_KEY).
    Api,
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "next-data" | "next_data" | "nextdata" => Ok(Source::NextData),
            "html" => Ok(Source::Html),
            "api" => Ok(Source::Api),
            other => Err(format!("Unknown source: {other} (expected next-data, html or api)")),
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Source::NextData => "next-data",
            Source::Html => "html",
            Source::Api => "api",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeMode {
    /// Subnets listing through the source fallback chain.
    Listing,
    /// One metagraph detail page per subnet.
    Detail,
    /// Neuron-table aggregates per subnet.
    Metrics,
    /// API records joined with listing metadata by netuid.
    Merged,
}

impl std::str::FromStr for ScrapeMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "listing" => Ok(ScrapeMode::Listing),
            "detail" => Ok(ScrapeMode::Detail),
            "metrics" => Ok(ScrapeMode::Metrics),
            "merged" => Ok(ScrapeMode::Merged),
            other => Err(format!("Unknown SCRAPE_MODE: {other}")),
        }
    }
}

impl std::fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScrapeMode::Listing => "listing",
            ScrapeMode::Detail => "detail",
            ScrapeMode::Metrics => "metrics",
            ScrapeMode::Merged => "merged",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Sheets,
    Csv,
    Stdout,
}

impl std::str::FromStr for OutputKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sheets" | "gsheets" => Ok(OutputKind::Sheets),
            "csv" => Ok(OutputKind::Csv),
            "stdout" => Ok(OutputKind::Stdout),
            other => Err(format!("Unknown OUTPUT: {other} (expected sheets, csv or stdout)")),
        }
    }
}

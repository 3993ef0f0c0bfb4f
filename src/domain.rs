use std::time::Duration;

use derive_setters::Setters;
use polars::error::PolarsError;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

pub const HELP_TEXT: &str = "\
Tab / 1 2 3   switch page
m / M         next / previous marketing group
c / C         next / previous category
Up Down       scroll table
PgUp PgDn     scroll table by a page
g             generate AI insights
y             copy insights to clipboard
r             reload all datasets
?             this help
Esc           close popup
q             quit";

/// Raised when a source cannot be fetched or parsed. The dataset becomes absent.
#[derive(Debug, Error)]
#[error("failed to load {source_id}: {cause}")]
pub struct LoadError {
    pub source_id: String,
    pub cause: LoadCause,
}

#[derive(Debug, Error)]
pub enum LoadCause {
    #[error("file not found")]
    FileNotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("unknown file type {0:?}")]
    UnknownFileType(Option<String>),
    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("workbook has no worksheet")]
    NoWorksheet,
    #[error("dataframe error: {0}")]
    Frame(#[from] PolarsError),
}

impl LoadError {
    pub fn new(source_id: impl Into<String>, cause: impl Into<LoadCause>) -> Self {
        Self {
            source_id: source_id.into(),
            cause: cause.into(),
        }
    }
}

/// Raised when the text-generation call fails. Shown inline, never fatal.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no API key configured (set OPENAI_API_KEY)")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("invalid response format")]
    InvalidResponse,
    #[error("could not serialize data: {0}")]
    Payload(#[from] PolarsError),
}

#[derive(Debug, Error)]
pub enum RtvError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("logging setup failed: {0}")]
    Logging(String),
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct DashConfig {
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub cache_ttl: Duration,
    pub model: String,
    pub api_base: String,
    #[setters(strip_option)]
    pub api_key: Option<String>,
    pub sales_max_tokens: u32,
    pub executive_max_tokens: u32,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            max_column_width: 24,
            cache_ttl: Duration::from_secs(3600),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            sales_max_tokens: 300,
            executive_max_tokens: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Sales,
    Inventory,
    Executive,
}

impl Page {
    pub const ALL: [Page; 3] = [Page::Sales, Page::Inventory, Page::Executive];

    pub fn title(&self) -> &'static str {
        match self {
            Page::Sales => "Sales Dashboard",
            Page::Inventory => "Inventory Management",
            Page::Executive => "Executive Insights",
        }
    }

    pub fn next(&self) -> Page {
        match self {
            Page::Sales => Page::Inventory,
            Page::Inventory => Page::Executive,
            Page::Executive => Page::Sales,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    NextPage,
    GoToPage(Page),
    NextMarketingGroup,
    PrevMarketingGroup,
    NextCategory,
    PrevCategory,
    MoveUp,
    MoveDown,
    MovePageUp,
    MovePageDown,
    GenerateInsights,
    CopyInsights,
    Reload,
    Help,
    Exit,
    Resize(usize, usize),
}

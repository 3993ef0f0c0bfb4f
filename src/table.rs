use chrono::NaiveDateTime;
use std::fmt;

/// A single spreadsheet cell as produced by the loader.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl Cell {
    /// Missing, or text that is empty once whitespace is trimmed.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Exact match against a text cell. Non-text cells never match.
    pub fn is_text(&self, literal: &str) -> bool {
        matches!(self, Cell::Text(s) if s == literal)
    }

    /// Infer a cell from a raw text field (CSV and friends).
    pub fn from_field(field: &str) -> Self {
        if field.trim().is_empty() {
            return Cell::Empty;
        }
        let trimmed = field.trim();
        if let Ok(v) = trimmed.parse::<i64>() {
            return Cell::Int(v);
        }
        // f64 parsing also accepts words such as "nan" and "inf"
        if trimmed.bytes().any(|b| b.is_ascii_digit())
            && let Ok(v) = trimmed.parse::<f64>()
        {
            return Cell::Float(v);
        }
        Cell::Text(field.to_string())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => write!(f, "{s}"),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Bool(v) => write!(f, "{v}"),
            Cell::Date(d) => {
                if d.time() == chrono::NaiveTime::MIN {
                    write!(f, "{}", d.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S"))
                }
            }
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<i32> for Cell {
    fn from(v: i32) -> Self {
        Cell::Int(v.into())
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

pub type Row = Vec<Cell>;

/// Unvalidated rows as read from a spreadsheet. Rows may be ragged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    rows: Vec<Row>,
}

impl RawTable {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Normalized rows. Row 0 is the header, every other row is data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanTable {
    rows: Vec<Row>,
}

impl CleanTable {
    pub(crate) fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn header(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn data_rows(&self) -> &[Row] {
        if self.rows.is_empty() {
            &[]
        } else {
            &self.rows[1..]
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Widest row, used when promoting the header to column names.
    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }
}

impl From<CleanTable> for RawTable {
    fn from(table: CleanTable) -> Self {
        RawTable::new(table.rows)
    }
}

/// Cell at `idx`, reading past the end of a ragged row as `Empty`.
pub fn cell_at(row: &Row, idx: usize) -> &Cell {
    const EMPTY: &Cell = &Cell::Empty;
    row.get(idx).unwrap_or(EMPTY)
}

/// Build a row from mixed literals, mostly for tests and fixtures.
#[macro_export]
macro_rules! row {
    ($($cell:expr),* $(,)?) => {
        vec![$($crate::table::Cell::from($cell)),*]
    };
}

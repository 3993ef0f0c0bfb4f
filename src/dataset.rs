use chrono::{Duration, Month, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::table::{Cell, CleanTable, Row, cell_at};

pub const ENTRY_DATE: &str = "Entry Date";
pub const MONTH: &str = "Month";
pub const BRAND: &str = "Brand";
pub const CATEGORY: &str = "Category";
pub const MARKETING_GROUP: &str = "Marketing Group";
pub const SALES_QTY: &str = "Qty(Unit1)";
pub const QTY_IN_STOCK: &str = "Quantity In Stock";

const DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%d-%b-%Y", "%d.%m.%Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Sales,
    Purchase,
    Stock,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [DatasetKind::Sales, DatasetKind::Purchase, DatasetKind::Stock];

    pub fn label(&self) -> &'static str {
        match self {
            DatasetKind::Sales => "Sales",
            DatasetKind::Purchase => "Purchase",
            DatasetKind::Stock => "Stock",
        }
    }

    pub fn cleaned_file_name(&self) -> String {
        format!("cleaned_{}_data.csv", self.label().to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Int,
    Float,
    Text,
}

/// Promote the header row to column names and type each column.
pub fn to_frame(table: &CleanTable) -> PolarsResult<DataFrame> {
    let Some(header) = table.header() else {
        return Ok(DataFrame::empty());
    };
    let names = column_names(header, table.width());
    let rows = table.data_rows();

    let columns = names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let cells: Vec<&Cell> = rows.iter().map(|r| cell_at(r, idx)).collect();
            build_column(name, &cells)
        })
        .collect::<Vec<Column>>();
    DataFrame::new(columns)
}

fn column_names(header: &Row, width: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    (0..width)
        .map(|idx| {
            let cell = cell_at(header, idx);
            let base = if cell.is_blank() {
                format!("column_{idx}")
            } else {
                cell.to_string().trim().to_string()
            };
            let mut name = base.clone();
            let mut k = 1;
            while !seen.insert(name.clone()) {
                name = format!("{base}_{k}");
                k += 1;
            }
            name
        })
        .collect()
}

fn infer_kind(cells: &[&Cell]) -> ColumnKind {
    let mut kind = ColumnKind::Int;
    for cell in cells.iter().filter(|c| !c.is_blank()) {
        match cell {
            Cell::Int(_) => {}
            Cell::Float(_) => kind = ColumnKind::Float,
            _ => return ColumnKind::Text,
        }
    }
    kind
}

fn build_column(name: String, cells: &[&Cell]) -> Column {
    match infer_kind(cells) {
        ColumnKind::Int => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Int(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), values).into_column()
        }
        ColumnKind::Float => {
            let values: Vec<Option<f64>> = cells
                .iter()
                .map(|c| match c {
                    Cell::Int(v) => Some(*v as f64),
                    Cell::Float(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Series::new(name.into(), values).into_column()
        }
        ColumnKind::Text => {
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|c| if c.is_blank() { None } else { Some(c.to_string()) })
                .collect();
            Series::new(name.into(), values).into_column()
        }
    }
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

/// Parse the textual forms an "Entry Date" cell shows up in.
pub fn parse_entry_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return Some(d);
        }
    }
    // Spreadsheet serial day numbers, epoch 1899-12-30
    match value.parse::<f64>() {
        Ok(serial) if (1.0..2_958_466.0).contains(&serial) => NaiveDate::from_ymd_opt(1899, 12, 30)
            .and_then(|epoch| epoch.checked_add_signed(Duration::days(serial.trunc() as i64))),
        _ => None,
    }
}

/// Add "Month" from "Entry Date" and rewrite "Entry Date" as `%Y-%m-%d`.
/// Values that do not parse keep their text and get a null month.
pub fn derive_month(df: &mut DataFrame) -> PolarsResult<()> {
    if !has_column(df, ENTRY_DATE) {
        return Ok(());
    }
    let values = df.column(ENTRY_DATE)?.cast(&DataType::String)?;
    let mut dates: Vec<Option<String>> = Vec::with_capacity(values.len());
    let mut months: Vec<Option<String>> = Vec::with_capacity(values.len());
    let mut unparsed = 0;

    for value in values.str()?.into_iter() {
        match value.and_then(parse_entry_date) {
            Some(date) => {
                dates.push(Some(date.format(DATE_OUTPUT_FORMAT).to_string()));
                months.push(Some(date.format("%B").to_string()));
            }
            None => {
                unparsed += value.is_some() as usize;
                dates.push(value.map(str::to_string));
                months.push(None);
            }
        }
    }
    if unparsed > 0 {
        warn!("{unparsed} \"{ENTRY_DATE}\" values could not be parsed as dates");
    }

    df.with_column(Series::new(ENTRY_DATE.into(), dates))?;
    df.with_column(Series::new(MONTH.into(), months))?;
    Ok(())
}

/// Stock tables without a quantity column get one filled with 0.
pub fn ensure_stock_quantity(df: &mut DataFrame) -> PolarsResult<()> {
    if !has_column(df, QTY_IN_STOCK) {
        debug!("\"{QTY_IN_STOCK}\" missing, defaulting to 0");
        let zeros = Series::new(QTY_IN_STOCK.into(), vec![0i64; df.height()]);
        df.with_column(zeros)?;
    }
    Ok(())
}

/// Apply the derived column contract for a dataset kind.
pub fn apply_derived_columns(df: &mut DataFrame, kind: DatasetKind) -> PolarsResult<()> {
    derive_month(df)?;
    if kind == DatasetKind::Stock {
        ensure_stock_quantity(df)?;
    }
    Ok(())
}

/// Distinct non-null values in first-appearance order. Unknown columns give nothing.
pub fn unique_values(df: &DataFrame, column: &str) -> PolarsResult<Vec<String>> {
    if !has_column(df, column) {
        return Ok(Vec::new());
    }
    let values = df.column(column)?.cast(&DataType::String)?;
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for v in values.str()?.into_iter().flatten() {
        if seen.insert(v) {
            out.push(v.to_string());
        }
    }
    Ok(out)
}

/// Keep rows whose columns equal the given values, compared as strings.
pub fn filter_eq(df: &DataFrame, filters: &[(&str, &str)]) -> PolarsResult<DataFrame> {
    if filters.iter().any(|(c, _)| !has_column(df, c)) {
        return Ok(df.clear());
    }
    let predicate = filters
        .iter()
        .map(|(c, v)| col(*c).cast(DataType::String).eq(lit(*v)))
        .reduce(|a, b| a.and(b));
    match predicate {
        Some(p) => df.clone().lazy().filter(p).collect(),
        None => Ok(df.clone()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSum {
    pub keys: Vec<String>,
    pub total: f64,
}

/// Sum `value` grouped by `keys`. Non-numeric values count as null, null keys are skipped.
pub fn sum_by(df: &DataFrame, keys: &[&str], value: &str) -> PolarsResult<Vec<GroupSum>> {
    if keys.iter().chain(std::iter::once(&value)).any(|c| !has_column(df, c)) {
        return Ok(Vec::new());
    }
    let key_exprs: Vec<Expr> = keys
        .iter()
        .map(|k| col(*k).cast(DataType::String))
        .collect();
    let grouped = df
        .clone()
        .lazy()
        .group_by_stable(key_exprs)
        .agg([col(value).cast(DataType::Float64).sum()])
        .collect()?;

    let key_columns = keys
        .iter()
        .map(|k| grouped.column(k).and_then(|c| c.str().cloned()))
        .collect::<PolarsResult<Vec<StringChunked>>>()?;
    let totals = grouped.column(value)?.f64()?;

    // Rows with a null key form no group
    let mut out: Vec<GroupSum> = (0..grouped.height())
        .filter_map(|i| {
            let keys = key_columns
                .iter()
                .map(|c| c.get(i).map(str::to_string))
                .collect::<Option<Vec<String>>>()?;
            Some(GroupSum {
                keys,
                total: totals.get(i).unwrap_or(0.0),
            })
        })
        .collect();
    out.sort_by(|a, b| a.keys.cmp(&b.keys));
    Ok(out)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trend {
    pub months: Vec<String>,
    pub series: Vec<(String, Vec<f64>)>,
}

impl Trend {
    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    pub fn max(&self) -> f64 {
        self.series
            .iter()
            .flat_map(|(_, v)| v.iter().copied())
            .fold(0.0, f64::max)
    }
}

fn month_rank(name: &str) -> u32 {
    name.parse::<Month>()
        .map(|m| m.number_from_month())
        .unwrap_or(13)
}

/// Month x Brand sums of `qty`, one series per brand, months in calendar order.
pub fn monthly_trend(df: &DataFrame, qty: &str) -> PolarsResult<Trend> {
    let sums = sum_by(df, &[MONTH, BRAND], qty)?;

    let mut months: Vec<String> = Vec::new();
    let mut by_brand: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for s in sums {
        let (month, brand) = (s.keys[0].clone(), s.keys[1].clone());
        if !months.contains(&month) {
            months.push(month.clone());
        }
        *by_brand.entry(brand).or_default().entry(month).or_insert(0.0) += s.total;
    }
    months.sort_by(|a, b| month_rank(a).cmp(&month_rank(b)).then_with(|| a.cmp(b)));

    let series = by_brand
        .into_iter()
        .map(|(brand, values)| {
            let points = months
                .iter()
                .map(|m| values.get(m).copied().unwrap_or(0.0))
                .collect();
            (brand, points)
        })
        .collect();
    Ok(Trend { months, series })
}

fn column_json_values(column: &Column) -> PolarsResult<Vec<Value>> {
    let values = match column.dtype() {
        DataType::Int64 => column
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::from))
            .collect(),
        DataType::Float64 => column
            .f64()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::from))
            .collect(),
        _ => {
            let strings = column.cast(&DataType::String)?;
            strings
                .str()?
                .into_iter()
                .map(|v| v.map_or(Value::Null, Value::from))
                .collect()
        }
    };
    Ok(values)
}

/// The frame as an array of row objects keyed by column name.
pub fn to_records(df: &DataFrame) -> PolarsResult<Value> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let columns = df
        .get_columns()
        .iter()
        .map(column_json_values)
        .collect::<PolarsResult<Vec<Vec<Value>>>>()?;

    let records = (0..df.height())
        .map(|i| {
            let mut record = Map::new();
            for (name, values) in names.iter().zip(columns.iter()) {
                record.insert(name.clone(), values[i].clone());
            }
            Value::Object(record)
        })
        .collect();
    Ok(Value::Array(records))
}

pub fn to_records_json(df: &DataFrame) -> PolarsResult<String> {
    Ok(to_records(df)?.to_string())
}

/// Console preview of the first `n` rows.
pub fn head_summary(kind: DatasetKind, df: &DataFrame, n: usize) -> String {
    format!("Cleaned {} Data:\n{}", kind.label(), df.head(Some(n)))
}

pub fn write_csv(df: &mut DataFrame, dir: &Path, kind: DatasetKind) -> PolarsResult<PathBuf> {
    let path = dir.join(kind.cleaned_file_name());
    let mut file = File::create(&path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(path)
}

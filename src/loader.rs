use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::DataFrame;
use reqwest::Url;
use std::fmt;
use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::dataset::{self, DatasetKind};
use crate::domain::{LoadCause, LoadError};
use crate::normalizer::TableNormalizer;
use crate::table::{Cell, CleanTable, RawTable, Row};

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileType {
    CSV,
    XLS,
    XLSX,
    ODS,
}

/// Where a dataset comes from: a local file or a (pre-signed) URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Local(PathBuf),
    Remote(String),
}

impl Source {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.starts_with("http://") || input.starts_with("https://") {
            return Source::Remote(input.to_string());
        }
        let expanded = shellexpand::full(input)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| shellexpand::tilde(input).into_owned());
        Source::Local(PathBuf::from(expanded))
    }

    /// Full identifier, used as the cache key.
    pub fn id(&self) -> String {
        match self {
            Source::Local(path) => path.to_string_lossy().to_string(),
            Source::Remote(url) => url.clone(),
        }
    }

    fn extension(&self) -> Option<String> {
        let path = match self {
            Source::Local(path) => path.clone(),
            Source::Remote(url) => Url::parse(url)
                .map(|u| PathBuf::from(u.path()))
                .unwrap_or_else(|_| PathBuf::from(url.split('?').next().unwrap_or(url))),
        };
        path.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
    }
}

impl fmt::Display for Source {
    // Query strings carry access tokens and stay out of logs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Local(path) => write!(f, "{}", path.display()),
            Source::Remote(url) => write!(f, "{}", url.split('?').next().unwrap_or(url)),
        }
    }
}

fn detect_file_type(source: &Source) -> Result<FileType, LoadCause> {
    let ext = source.extension();
    match ext.as_deref() {
        Some("CSV") => Ok(FileType::CSV),
        Some("XLS") => Ok(FileType::XLS),
        Some("XLSX") | Some("XLSM") | Some("XLSB") => Ok(FileType::XLSX),
        Some("ODS") => Ok(FileType::ODS),
        _ => Err(LoadCause::UnknownFileType(ext)),
    }
}

pub struct Loader {
    client: reqwest::blocking::Client,
    normalizer: TableNormalizer,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            normalizer: TableNormalizer,
        }
    }

    fn fetch_bytes(&self, source: &Source) -> Result<Vec<u8>, LoadCause> {
        match source {
            Source::Local(path) => read_local(path),
            Source::Remote(url) => {
                let response = self.client.get(url).send()?;
                let status = response.status();
                if !status.is_success() {
                    return Err(LoadCause::HttpStatus(status.as_u16()));
                }
                Ok(response.bytes()?.to_vec())
            }
        }
    }

    pub fn load_raw(&self, source: &Source) -> Result<RawTable, LoadError> {
        let start_time = Instant::now();
        let raw = detect_file_type(source)
            .and_then(|file_type| {
                let bytes = self.fetch_bytes(source)?;
                debug!("Fetched {} bytes from {source}", bytes.len());
                parse_raw(bytes, file_type)
            })
            .map_err(|cause| LoadError::new(source.to_string(), cause))?;
        if raw.is_empty() {
            warn!("{source} contains no rows");
        }
        info!(
            "Loaded {} raw rows from {source} in {}ms",
            raw.len(),
            start_time.elapsed().as_millis()
        );
        Ok(raw)
    }

    pub fn load_clean(&self, source: &Source) -> Result<CleanTable, LoadError> {
        let raw = self.load_raw(source)?;
        let (clean, report) = self.normalizer.normalize_with_report(raw);
        if clean.is_empty() {
            warn!("Nothing in {source} survived normalization");
        }
        info!(
            "Normalized {source}: {} rows kept, anchor {:?}, {} invalid rows dropped",
            clean.len(),
            report.anchor,
            report.invalid_rows
        );
        Ok(clean)
    }

    /// Load, normalize and apply the derived columns for `kind`.
    pub fn load_dataset(&self, source: &Source, kind: DatasetKind) -> Result<DataFrame, LoadError> {
        let clean = self.load_clean(source)?;
        let mut df = dataset::to_frame(&clean).map_err(|e| LoadError::new(source.to_string(), e))?;
        dataset::apply_derived_columns(&mut df, kind)
            .map_err(|e| LoadError::new(source.to_string(), e))?;
        Ok(df)
    }
}

fn read_local(path: &Path) -> Result<Vec<u8>, LoadCause> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => LoadCause::FileNotFound,
        ErrorKind::PermissionDenied => LoadCause::PermissionDenied,
        _ => LoadCause::Io(e),
    })?;
    if !metadata.is_file() {
        return Err(LoadCause::FileNotFound);
    }
    Ok(fs::read(path)?)
}

fn parse_raw(bytes: Vec<u8>, file_type: FileType) -> Result<RawTable, LoadCause> {
    match file_type {
        FileType::CSV => read_csv(&bytes),
        FileType::XLS | FileType::XLSX | FileType::ODS => read_spreadsheet(bytes),
    }
}

fn read_csv(bytes: &[u8]) -> Result<RawTable, LoadCause> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(Cell::from_field).collect::<Row>());
    }
    Ok(RawTable::new(rows))
}

/// First worksheet of any workbook calamine understands.
fn read_spreadsheet(bytes: Vec<u8>) -> Result<RawTable, LoadCause> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(LoadCause::NoWorksheet)??;

    // Ranges start at the first used cell; pad so column indices match the sheet
    let leading_columns = range.start().map(|(_, c)| c as usize).unwrap_or(0);
    trace!("Worksheet range starts at column {leading_columns}");

    let rows = range
        .rows()
        .map(|r| {
            std::iter::repeat_n(Cell::Empty, leading_columns)
                .chain(r.iter().map(convert_cell))
                .collect::<Row>()
        })
        .collect();
    Ok(RawTable::new(rows))
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) if s.is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(v) => Cell::Int(*v),
        Data::Float(v) => Cell::Float(*v),
        Data::Bool(v) => Cell::Bool(*v),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(Cell::Date)
            .unwrap_or(Cell::Float(dt.as_f64())),
        Data::DateTimeIso(s) => parse_iso(s).map(Cell::Date).unwrap_or(Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => {
            trace!("Cell error {e:?} read as empty");
            Cell::Empty
        }
    }
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{MONTH, QTY_IN_STOCK};
    use crate::row;
    use crate::table::cell_at;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn fixture(name: &str) -> Source {
        Source::Local(
            Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("tests/fixtures")
                .join(name),
        )
    }

    #[test]
    fn remote_sources_hide_their_token() {
        let source = Source::parse(
            "https://store.example.net/input/cleaned_sales_data.xlsx?sp=r&sig=abc%3D",
        );
        assert_eq!(
            source.to_string(),
            "https://store.example.net/input/cleaned_sales_data.xlsx"
        );
        assert!(source.id().ends_with("sig=abc%3D"));
        assert_eq!(detect_file_type(&source).unwrap(), FileType::XLSX);
    }

    #[test]
    fn local_file_types() {
        assert_eq!(detect_file_type(&Source::parse("sales.xls")).unwrap(), FileType::XLS);
        assert_eq!(detect_file_type(&Source::parse("stock.ODS")).unwrap(), FileType::ODS);
        assert!(matches!(
            detect_file_type(&Source::parse("notes.txt")),
            Err(LoadCause::UnknownFileType(Some(ext))) if ext == "TXT"
        ));
    }

    #[test]
    fn csv_cells_are_typed() {
        let raw = read_csv(b"Banner,,\nEntry No.,Entry Date,Qty\n1,2024-01-05,10\n2,2024-01-06,2.5,extra\n")
            .unwrap();
        assert_eq!(raw.len(), 4);
        let rows = raw.into_rows();
        assert_eq!(rows[0], row!["Banner", "", ""]);
        assert_eq!(rows[2], row![1, "2024-01-05", 10]);
        assert_eq!(rows[3].len(), 4);
        assert_eq!(rows[3][2], Cell::Float(2.5));
    }

    #[test]
    fn calamine_cells_convert() {
        assert_eq!(convert_cell(&Data::String(String::new())), Cell::Empty);
        assert_eq!(convert_cell(&Data::String("Entry No.".into())), Cell::Text("Entry No.".into()));
        assert_eq!(convert_cell(&Data::Float(3.0)), Cell::Float(3.0));
        assert_eq!(convert_cell(&Data::Int(4)), Cell::Int(4));
        assert_eq!(
            convert_cell(&Data::DateTimeIso("2024-03-14".into())),
            Cell::Date(NaiveDate::from_ymd_opt(2024, 3, 14).unwrap().and_hms_opt(0, 0, 0).unwrap())
        );
    }

    /// Answer a single HTTP request with `response`, returning the base URL.
    fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 4096];
                let _ = stream.read(&mut request);
                let _ = stream.write_all(&response);
            }
        });
        format!("http://{addr}")
    }

    fn direct_loader() -> Loader {
        Loader {
            client: reqwest::blocking::Client::builder().no_proxy().build().unwrap(),
            normalizer: TableNormalizer,
        }
    }

    #[test]
    fn workbook_first_sheet_is_cleaned() {
        let loader = Loader::new();
        let raw = loader.load_raw(&fixture("sales_raw.xlsx")).unwrap();
        // Sheet "Sales" only, the trailing "Notes" sheet is ignored
        assert_eq!(raw.len(), 7);
        assert!(raw.into_rows().iter().all(|r| r.len() == 6));

        let clean = loader.load_clean(&fixture("sales_raw.xlsx")).unwrap();
        assert_eq!(
            clean.header(),
            Some(&row!["Entry No.", "Entry Date", "Marketing Group", "Category", "Brand", "Qty(Unit1)"])
        );
        assert_eq!(
            clean.data_rows(),
            &[
                row![1.0, "2024-01-05", "Mens", "Shirts", "Acme", 10.0],
                row![2.0, "2024-02-11", "Womens", "Kurtis", "Zephyr", 7.0],
            ]
        );

        let df = loader.load_dataset(&fixture("sales_raw.xlsx"), DatasetKind::Sales).unwrap();
        let months: Vec<Option<&str>> = df.column(MONTH).unwrap().str().unwrap().into_iter().collect();
        assert_eq!(months, [Some("January"), Some("February")]);
    }

    #[test]
    fn workbook_columns_keep_their_sheet_position() {
        let loader = Loader::new();
        let raw = loader.load_raw(&fixture("stock_offset.xlsx")).unwrap();
        let rows = raw.into_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], row!["", "Entry No.", "Entry Date", "Category", "Brand"]);

        // Column A is empty, so the anchor is not found and every row with a column B value stays
        let clean = loader.load_clean(&fixture("stock_offset.xlsx")).unwrap();
        assert_eq!(clean.len(), 3);
        assert_eq!(clean.header().map(|h| cell_at(h, 1).clone()), Some(Cell::from("Stock Summary")));
        assert_eq!(cell_at(&clean.data_rows()[1], 1), &Cell::Float(1.0));
    }

    #[test]
    fn remote_status_errors_are_reported() {
        let base = serve_once(
            b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
        );
        let source = Source::parse(&format!("{base}/input/sales.xlsx?sig=expired"));
        let err = direct_loader().load_clean(&source).unwrap_err();
        assert!(matches!(err.cause, LoadCause::HttpStatus(403)));
        assert_eq!(err.source_id, format!("{base}/input/sales.xlsx"));
    }

    #[test]
    fn remote_workbook_is_downloaded() {
        let body = std::fs::read(
            Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sales_raw.xlsx"),
        )
        .unwrap();
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(&body);

        let base = serve_once(response);
        let source = Source::parse(&format!("{base}/input/sales_raw.xlsx?sp=r"));
        let clean = direct_loader().load_clean(&source).unwrap();
        assert_eq!(clean.len(), 3);
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = Loader::new().load_raw(&fixture("does_not_exist.csv")).unwrap_err();
        assert!(matches!(err.cause, LoadCause::FileNotFound));
        assert!(err.source_id.ends_with("does_not_exist.csv"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn sales_fixture_is_cleaned() {
        let loader = Loader::new();
        let clean = loader.load_clean(&fixture("sales_raw.csv")).unwrap();
        assert_eq!(clean.header().map(|h| h[0].clone()), Some(Cell::from("Entry No.")));
        assert_eq!(clean.len(), 7);

        let df = loader.load_dataset(&fixture("sales_raw.csv"), DatasetKind::Sales).unwrap();
        assert_eq!(df.height(), 6);
        assert!(df.column(MONTH).is_ok());
    }

    #[test]
    fn stock_fixture_gains_quantity() {
        let df = Loader::new()
            .load_dataset(&fixture("stock_raw.csv"), DatasetKind::Stock)
            .unwrap();
        assert_eq!(df.height(), 3);
        let qty = df.column(QTY_IN_STOCK).unwrap().i64().unwrap();
        assert!(qty.into_iter().all(|q| q == Some(0)));
    }
}

use arboard::Clipboard;
use polars::prelude::*;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::cache::SourceCache;
use crate::dataset::{
    self, BRAND, CATEGORY, DatasetKind, GroupSum, MARKETING_GROUP, MONTH, QTY_IN_STOCK,
    SALES_QTY, Trend,
};
use crate::domain::{DashConfig, HELP_TEXT, Message, Page};
use crate::insights::{self, TextGenerator};
use crate::loader::{Loader, Source};
use crate::ui::{COLUMN_WIDTH_MARGIN, STATUSLINE_HEIGHT, TABLE_HEADER_HEIGHT};

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    GENERATING,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    PAGE,
    POPUP,
}

#[derive(Clone, Debug)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

/// A frame rendered to strings, plus its scroll position.
#[derive(Debug)]
pub struct TableView {
    pub name: String,
    pub columns: Vec<ColumnView>,
    pub nrows: usize,
    pub offset_row: usize,
}

impl TableView {
    fn empty(name: &str) -> Self {
        TableView {
            name: name.to_string(),
            columns: Vec::new(),
            nrows: 0,
            offset_row: 0,
        }
    }

    fn from_frame(name: &str, df: &DataFrame, max_column_width: usize) -> PolarsResult<Self> {
        let columns = df
            .get_columns()
            .iter()
            .map(|c| Self::load_column(c, max_column_width))
            .collect::<PolarsResult<Vec<ColumnView>>>()?;
        Ok(TableView {
            name: name.to_string(),
            columns,
            nrows: df.height(),
            offset_row: 0,
        })
    }

    fn load_column(column: &Column, max_column_width: usize) -> PolarsResult<ColumnView> {
        let name = column.name().to_string();
        let col = column.cast(&DataType::String)?;
        let series = col.str()?;
        let mut data = Vec::with_capacity(series.len());

        let mut max_width = name.chars().count();
        for value in series.into_iter() {
            let ss = match value {
                Some(s) => s.replace("\r\n", " ↵ ").replace('\n', " ↵ "),
                None => String::from("∅"),
            };
            max_width = max_width.max(ss.chars().count());
            data.push(ss);
        }

        Ok(ColumnView {
            name,
            width: std::cmp::min(max_width + COLUMN_WIDTH_MARGIN, max_column_width),
            data,
        })
    }

    fn from_rows(name: &str, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let columns = headers
            .into_iter()
            .enumerate()
            .map(|(idx, header)| {
                let data: Vec<String> = rows
                    .iter()
                    .map(|r| r.get(idx).cloned().unwrap_or_default())
                    .collect();
                let width = data
                    .iter()
                    .map(|d| d.chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
                    + COLUMN_WIDTH_MARGIN;
                ColumnView {
                    name: header,
                    width,
                    data,
                }
            })
            .collect();
        TableView {
            name: name.to_string(),
            columns,
            nrows: rows.len(),
            offset_row: 0,
        }
    }

    fn from_sums(name: &str, keys: &[&str], value: &str, sums: &[GroupSum]) -> Self {
        let headers = keys
            .iter()
            .chain(std::iter::once(&value))
            .map(|h| h.to_string())
            .collect();
        let rows = sums
            .iter()
            .map(|s| {
                let mut row = s.keys.clone();
                row.push(format_quantity(s.total));
                row
            })
            .collect();
        Self::from_rows(name, headers, rows)
    }

    fn from_trend(name: &str, trend: &Trend) -> Self {
        let headers = std::iter::once(MONTH.to_string())
            .chain(trend.series.iter().map(|(brand, _)| brand.clone()))
            .collect();
        let rows = trend
            .months
            .iter()
            .enumerate()
            .map(|(i, month)| {
                std::iter::once(month.clone())
                    .chain(trend.series.iter().map(|(_, v)| format_quantity(v[i])))
                    .collect()
            })
            .collect();
        Self::from_rows(name, headers, rows)
    }

    pub fn is_empty(&self) -> bool {
        self.nrows == 0
    }

    /// Rows `offset_row..offset_row + height` of every column.
    pub fn visible_columns(&self, height: usize) -> Vec<ColumnView> {
        let rbegin = std::cmp::min(self.offset_row, self.nrows);
        let rend = std::cmp::min(rbegin + height, self.nrows);
        self.columns
            .iter()
            .map(|c| ColumnView {
                name: c.name.clone(),
                width: c.width,
                data: c.data[rbegin..rend].to_vec(),
            })
            .collect()
    }

    fn scroll_up(&mut self, size: usize) {
        self.offset_row = self.offset_row.saturating_sub(size);
    }

    fn scroll_down(&mut self, size: usize) {
        self.offset_row = std::cmp::min(self.offset_row + size, self.nrows.saturating_sub(1));
    }
}

fn format_quantity(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}

/// One of the sales page drop downs.
#[derive(Debug)]
pub struct Selector {
    pub label: &'static str,
    pub options: Vec<String>,
    selected: usize,
}

impl Selector {
    fn new(label: &'static str) -> Self {
        Selector {
            label,
            options: Vec::new(),
            selected: 0,
        }
    }

    /// Replace the options, keeping the current choice when it still exists.
    fn set_options(&mut self, options: Vec<String>) {
        let current = self.current().map(str::to_string);
        self.selected = current
            .and_then(|c| options.iter().position(|o| *o == c))
            .unwrap_or(0);
        self.options = options;
    }

    fn next(&mut self) {
        if !self.options.is_empty() {
            self.selected = (self.selected + 1) % self.options.len();
        }
    }

    fn prev(&mut self) {
        if !self.options.is_empty() {
            self.selected = (self.selected + self.options.len() - 1) % self.options.len();
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.options.get(self.selected).map(String::as_str)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Insight {
    Idle,
    Pending,
    Ready(String),
    Failed(String),
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_height: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let table_height = ui_height.saturating_sub(STATUSLINE_HEIGHT + TABLE_HEADER_HEIGHT);
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_height,
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct Model {
    config: DashConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    page: Page,
    sources: Vec<(DatasetKind, Source)>,
    loader: Loader,
    cache: SourceCache<DataFrame>,
    datasets: HashMap<DatasetKind, DataFrame>,
    load_errors: HashMap<DatasetKind, String>,
    marketing_group: Selector,
    category: Selector,
    sales_table: TableView,
    trend: Trend,
    trend_table: TableView,
    stock_table: TableView,
    stock_summary: TableView,
    sales_insight: Insight,
    executive_insight: Insight,
    pending: Option<Page>,
    uilayout: UILayout,
    clipboard: Option<Clipboard>,
    popup_message: String,
    status_message: String,
    last_status_message_update: Instant,
}

impl Model {
    pub fn init(
        config: &DashConfig,
        sources: Vec<(DatasetKind, Source)>,
        loader: Loader,
        ui_width: usize,
        ui_height: usize,
    ) -> Self {
        let mut model = Self {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::PAGE,
            previous_modus: Modus::PAGE,
            page: Page::Sales,
            sources,
            loader,
            cache: SourceCache::new(config.cache_ttl),
            datasets: HashMap::new(),
            load_errors: HashMap::new(),
            marketing_group: Selector::new(MARKETING_GROUP),
            category: Selector::new(CATEGORY),
            sales_table: TableView::empty("Sales"),
            trend: Trend::default(),
            trend_table: TableView::empty("Monthly sales"),
            stock_table: TableView::empty("Inventory Overview"),
            stock_summary: TableView::empty("Stock-Out Summary by Category"),
            sales_insight: Insight::Idle,
            executive_insight: Insight::Idle,
            pending: None,
            uilayout: UILayout::from_values(ui_width, ui_height),
            clipboard: None,
            popup_message: String::new(),
            status_message: "Started rtv!".to_string(),
            last_status_message_update: Instant::now(),
        };
        model.load_datasets();
        model
    }

    // -------------------- Data handling ---------------------- //

    /// (Re)load every source through the cache. Failures leave the dataset absent.
    fn load_datasets(&mut self) {
        let start_time = Instant::now();
        self.datasets.clear();
        self.load_errors.clear();

        for (kind, source) in self.sources.iter() {
            let loader = &self.loader;
            let result = self
                .cache
                .get_or_load(&source.id(), || loader.load_dataset(source, *kind));
            match result {
                Ok(df) => {
                    info!("{} data ready: {} rows", kind.label(), df.height());
                    self.datasets.insert(*kind, df);
                }
                Err(e) => {
                    error!("Error loading {} data: {e}", kind.label());
                    self.load_errors.insert(*kind, e.to_string());
                }
            }
        }

        self.refresh_views();
        let (hits, misses) = self.cache.stats();
        debug!("Dataset cache: {} entries, {hits} hits, {misses} misses", self.cache.len());
        let message = match self.load_errors.len() {
            0 => format!("Loaded data in {}ms ...", start_time.elapsed().as_millis()),
            n => format!("{n} dataset(s) failed to load, see the pages for details"),
        };
        self.set_status_message(message);
    }

    fn refresh_views(&mut self) {
        let sales_options = match self.datasets.get(&DatasetKind::Sales) {
            Some(sales) => (
                dataset::unique_values(sales, MARKETING_GROUP),
                dataset::unique_values(sales, CATEGORY),
            ),
            None => (Ok(Vec::new()), Ok(Vec::new())),
        };
        match sales_options {
            (Ok(groups), Ok(categories)) => {
                self.marketing_group.set_options(groups);
                self.category.set_options(categories);
            }
            (Err(e), _) | (_, Err(e)) => self.report_frame_error("sales filters", e),
        }

        if let Err(e) = self.refresh_sales_view() {
            self.report_frame_error("sales view", e);
        }
        if let Err(e) = self.refresh_inventory_view() {
            self.report_frame_error("inventory view", e);
        }
    }

    fn refresh_sales_view(&mut self) -> PolarsResult<()> {
        let Some(sales) = self.datasets.get(&DatasetKind::Sales) else {
            self.sales_table = TableView::empty("Sales");
            self.trend = Trend::default();
            self.trend_table = TableView::empty("Monthly sales");
            return Ok(());
        };

        let filters = [
            (self.marketing_group.label, self.marketing_group.current().unwrap_or_default()),
            (self.category.label, self.category.current().unwrap_or_default()),
        ];
        let filtered = dataset::filter_eq(sales, &filters)?;
        trace!("Filter {filters:?} kept {} rows", filtered.height());

        self.trend = dataset::monthly_trend(&filtered, SALES_QTY)?;
        self.sales_table = TableView::from_frame("Sales", &filtered, self.config.max_column_width)?;
        self.trend_table = TableView::from_trend("Monthly sales", &self.trend);
        Ok(())
    }

    fn refresh_inventory_view(&mut self) -> PolarsResult<()> {
        let Some(stock) = self.datasets.get(&DatasetKind::Stock) else {
            self.stock_table = TableView::empty("Inventory Overview");
            self.stock_summary = TableView::empty("Stock-Out Summary by Category");
            return Ok(());
        };
        let sums = dataset::sum_by(stock, &[CATEGORY, BRAND], QTY_IN_STOCK)?;
        self.stock_table =
            TableView::from_frame("Inventory Overview", stock, self.config.max_column_width)?;
        self.stock_summary = TableView::from_sums(
            "Stock-Out Summary by Category",
            &[CATEGORY, BRAND],
            QTY_IN_STOCK,
            &sums,
        );
        Ok(())
    }

    fn report_frame_error(&mut self, what: &str, e: PolarsError) {
        error!("Failed to build {what}: {e}");
        self.set_status_message(format!("Failed to build {what}: {e}"));
    }

    // -------------------- Insights ---------------------- //

    fn request_insights(&mut self) {
        let insight = match self.page {
            Page::Sales => &mut self.sales_insight,
            Page::Executive => &mut self.executive_insight,
            Page::Inventory => return,
        };
        *insight = Insight::Pending;
        self.pending = Some(self.page);
        self.status = Status::GENERATING;
        self.set_status_message("Generating insights ...");
    }

    pub fn has_pending_generation(&self) -> bool {
        self.pending.is_some()
    }

    /// Run a requested generation. Called by the main loop after the pending state was drawn.
    pub fn run_pending(&mut self, generator: &dyn TextGenerator) {
        let Some(page) = self.pending.take() else {
            return;
        };
        let start_time = Instant::now();
        let result = match page {
            Page::Sales => self.generate_sales_insights(generator),
            Page::Executive => self.generate_executive_insights(generator),
            Page::Inventory => return,
        };

        let insight = match result {
            Ok(text) => {
                self.set_status_message(format!(
                    "Insights generated in {}ms",
                    start_time.elapsed().as_millis()
                ));
                Insight::Ready(text)
            }
            Err(message) => {
                warn!("Insight generation failed: {message}");
                self.set_status_message("Insight generation failed");
                Insight::Failed(message)
            }
        };
        match page {
            Page::Sales => self.sales_insight = insight,
            _ => self.executive_insight = insight,
        }
        self.status = Status::READY;
    }

    fn generate_sales_insights(&self, generator: &dyn TextGenerator) -> Result<String, String> {
        let sales = self
            .datasets
            .get(&DatasetKind::Sales)
            .ok_or("No sales data available.")?;
        let prompt = insights::sales_prompt(sales).map_err(|e| e.to_string())?;
        generator
            .generate(&prompt, self.config.sales_max_tokens)
            .map_err(|e| format!("Error generating AI insights: {e}"))
    }

    fn generate_executive_insights(&self, generator: &dyn TextGenerator) -> Result<String, String> {
        let (Some(sales), Some(stock)) = (
            self.datasets.get(&DatasetKind::Sales),
            self.datasets.get(&DatasetKind::Stock),
        ) else {
            return Err("Error generating insight: sales and stock data are required".to_string());
        };
        let prompt = insights::executive_prompt(sales, stock).map_err(|e| e.to_string())?;
        generator
            .generate(&prompt, self.config.executive_max_tokens)
            .map_err(|e| format!("Error generating insight: {e}"))
    }

    fn copy_insights(&mut self) {
        let text = match (self.page, &self.sales_insight, &self.executive_insight) {
            (Page::Sales, Insight::Ready(t), _) | (Page::Executive, _, Insight::Ready(t)) => {
                t.clone()
            }
            _ => {
                self.set_status_message("Nothing to copy");
                return;
            }
        };
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(c) => self.clipboard = Some(c),
                Err(e) => {
                    warn!("Clipboard unavailable: {e:?}");
                    self.set_status_message("Clipboard unavailable");
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(text) {
                Ok(_) => self.set_status_message("Copied insights to clipboard."),
                Err(e) => trace!("Error copying to clipboard: {:?}", e),
            }
        }
    }

    // -------------------- Accessors for the ui ---------------------- //

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn dataset(&self, kind: DatasetKind) -> Option<&DataFrame> {
        self.datasets.get(&kind)
    }

    pub fn load_error(&self, kind: DatasetKind) -> Option<&str> {
        self.load_errors.get(&kind).map(String::as_str)
    }

    pub fn selectors(&self) -> [&Selector; 2] {
        [&self.marketing_group, &self.category]
    }

    pub fn sales_table(&self) -> &TableView {
        &self.sales_table
    }

    pub fn trend(&self) -> &Trend {
        &self.trend
    }

    pub fn trend_table(&self) -> &TableView {
        &self.trend_table
    }

    pub fn stock_table(&self) -> &TableView {
        &self.stock_table
    }

    pub fn stock_summary(&self) -> &TableView {
        &self.stock_summary
    }

    pub fn insight(&self, page: Page) -> &Insight {
        match page {
            Page::Executive => &self.executive_insight,
            _ => &self.sales_insight,
        }
    }

    pub fn popup(&self) -> Option<&str> {
        (self.modus == Modus::POPUP).then_some(self.popup_message.as_str())
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn last_status_message_update(&self) -> Instant {
        self.last_status_message_update
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
    }

    // -------------------- Control handling functions ---------------------- //

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(width, height);
    }

    pub fn update(&mut self, message: Option<Message>) {
        let Some(msg) = message else {
            return;
        };
        trace!("Update: Modus {:?}, Message {:?}", self.modus, msg);
        match self.modus {
            Modus::PAGE => match msg {
                Message::Quit => self.quit(),
                Message::NextPage => self.go_to_page(self.page.next()),
                Message::GoToPage(page) => self.go_to_page(page),
                Message::NextMarketingGroup => self.change_filter(|m| m.marketing_group.next()),
                Message::PrevMarketingGroup => self.change_filter(|m| m.marketing_group.prev()),
                Message::NextCategory => self.change_filter(|m| m.category.next()),
                Message::PrevCategory => self.change_filter(|m| m.category.prev()),
                Message::MoveUp => self.scroll_up(1),
                Message::MoveDown => self.scroll_down(1),
                Message::MovePageUp => self.scroll_up(self.uilayout.table_height.max(1)),
                Message::MovePageDown => self.scroll_down(self.uilayout.table_height.max(1)),
                Message::GenerateInsights => self.request_insights(),
                Message::CopyInsights => self.copy_insights(),
                Message::Reload => self.reload(),
                Message::Help => self.show_help(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Exit => (),
            },
            Modus::POPUP => match msg {
                Message::Quit => self.quit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Exit | Message::Help => self.exit(),
                _ => (),
            },
        }
    }

    fn go_to_page(&mut self, page: Page) {
        debug!("Switching to page {}", page.title());
        self.page = page;
    }

    fn change_filter(&mut self, change: impl FnOnce(&mut Self)) {
        if self.page != Page::Sales {
            return;
        }
        change(self);
        if let Err(e) = self.refresh_sales_view() {
            self.report_frame_error("sales view", e);
        }
    }

    fn focused_table(&mut self) -> Option<&mut TableView> {
        match self.page {
            Page::Sales => Some(&mut self.sales_table),
            Page::Inventory => Some(&mut self.stock_table),
            Page::Executive => None,
        }
    }

    fn scroll_up(&mut self, size: usize) {
        if let Some(table) = self.focused_table() {
            table.scroll_up(size);
        }
    }

    fn scroll_down(&mut self, size: usize) {
        if let Some(table) = self.focused_table() {
            table.scroll_down(size);
        }
    }

    fn reload(&mut self) {
        info!("Reloading all datasets");
        self.cache.clear();
        self.load_datasets();
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.popup_message = HELP_TEXT.to_string();
    }

    fn exit(&mut self) {
        if self.modus == Modus::POPUP {
            trace!("Close popup ...");
            self.modus = self.previous_modus;
            self.previous_modus = Modus::POPUP;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GenerationError;
    use std::cell::RefCell;
    use std::path::Path;

    struct StubGenerator {
        reply: Result<String, u16>,
        prompts: RefCell<Vec<(String, u32)>>,
    }

    impl StubGenerator {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                prompts: RefCell::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl TextGenerator for StubGenerator {
        fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
            self.prompts.borrow_mut().push((prompt.to_string(), max_tokens));
            self.reply.clone().map_err(|status| GenerationError::Api {
                status,
                body: "quota exceeded".to_string(),
            })
        }
    }

    fn fixture(name: &str) -> Source {
        Source::Local(
            Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("tests/fixtures")
                .join(name),
        )
    }

    fn model_with(stock: &str) -> Model {
        let sources = vec![
            (DatasetKind::Purchase, fixture("purchase_raw.csv")),
            (DatasetKind::Sales, fixture("sales_raw.csv")),
            (DatasetKind::Stock, fixture(stock)),
        ];
        Model::init(&DashConfig::default(), sources, Loader::new(), 120, 40)
    }

    #[test]
    fn selectors_start_at_first_value() {
        let model = model_with("stock_raw.csv");
        let [groups, categories] = model.selectors();
        assert_eq!(groups.options, ["Mens", "Womens"]);
        assert_eq!(groups.current(), Some("Mens"));
        assert_eq!(categories.options, ["Shirts", "Trousers", "Kurtis"]);
        // Mens + Shirts
        assert_eq!(model.sales_table().nrows, 3);
        assert_eq!(model.trend().months, ["January", "March"]);
        assert_eq!(model.trend_table().columns[0].data, ["January", "March"]);
    }

    #[test]
    fn cycling_filters_refreshes_sales() {
        let mut model = model_with("stock_raw.csv");
        model.update(Some(Message::NextMarketingGroup));
        model.update(Some(Message::PrevCategory));
        let [groups, categories] = model.selectors();
        assert_eq!(groups.current(), Some("Womens"));
        assert_eq!(categories.current(), Some("Kurtis"));
        assert_eq!(model.sales_table().nrows, 2);
        assert_eq!(model.trend().series, vec![
            ("Acme".to_string(), vec![0.0, 5.0]),
            ("Zephyr".to_string(), vec![7.0, 0.0]),
        ]);

        model.update(Some(Message::NextCategory));
        assert_eq!(model.sales_table().nrows, 0);
        assert!(model.trend().is_empty());
    }

    #[test]
    fn filters_only_change_on_sales_page() {
        let mut model = model_with("stock_raw.csv");
        model.update(Some(Message::GoToPage(Page::Inventory)));
        model.update(Some(Message::NextMarketingGroup));
        assert_eq!(model.selectors()[0].current(), Some("Mens"));
    }

    #[test]
    fn inventory_summary_uses_default_quantity() {
        let model = model_with("stock_raw.csv");
        let summary = model.stock_summary();
        assert_eq!(summary.nrows, 3);
        let names: Vec<&str> = summary.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, [CATEGORY, BRAND, QTY_IN_STOCK]);
        assert_eq!(summary.columns[2].data, ["0", "0", "0"]);
    }

    #[test]
    fn missing_dataset_is_an_empty_state() {
        let model = model_with("no_such_stock.xls");
        assert!(model.dataset(DatasetKind::Stock).is_none());
        assert!(model.load_error(DatasetKind::Stock).unwrap().contains("file not found"));
        assert!(model.stock_table().is_empty());
        assert!(model.dataset(DatasetKind::Sales).is_some());
        assert!(model.status_message().contains("failed to load"));
    }

    #[test]
    fn sales_insights_are_shown_verbatim() {
        let mut model = model_with("stock_raw.csv");
        let generator = StubGenerator::ok("Acme sells best in January.");

        model.update(Some(Message::GenerateInsights));
        assert_eq!(model.insight(Page::Sales), &Insight::Pending);
        assert_eq!(model.status, Status::GENERATING);
        assert!(model.has_pending_generation());

        model.run_pending(&generator);
        assert_eq!(
            model.insight(Page::Sales),
            &Insight::Ready("Acme sells best in January.".to_string())
        );
        assert_eq!(model.status, Status::READY);

        let prompts = generator.prompts.borrow();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].1, 300);
        // Full sales data, not the filtered view
        assert!(prompts[0].0.contains("Zephyr"));
        assert!(prompts[0].0.contains("\"Month\":\"January\""));
    }

    #[test]
    fn generation_errors_stay_inline() {
        let mut model = model_with("stock_raw.csv");
        model.update(Some(Message::GoToPage(Page::Executive)));
        model.update(Some(Message::GenerateInsights));
        model.run_pending(&StubGenerator::failing(429));

        match model.insight(Page::Executive) {
            Insight::Failed(msg) => assert!(msg.contains("429")),
            other => panic!("unexpected insight {other:?}"),
        }
        assert_eq!(model.insight(Page::Sales), &Insight::Idle);
        assert_eq!(model.status, Status::READY);
    }

    #[test]
    fn executive_insights_need_stock() {
        let mut model = model_with("no_such_stock.csv");
        let generator = StubGenerator::ok("unused");
        model.update(Some(Message::GoToPage(Page::Executive)));
        model.update(Some(Message::GenerateInsights));
        model.run_pending(&generator);
        assert!(matches!(model.insight(Page::Executive), Insight::Failed(_)));
        assert!(generator.prompts.borrow().is_empty());
    }

    #[test]
    fn inventory_page_has_no_insights() {
        let mut model = model_with("stock_raw.csv");
        model.update(Some(Message::GoToPage(Page::Inventory)));
        model.update(Some(Message::GenerateInsights));
        assert!(!model.has_pending_generation());
    }

    #[test]
    fn help_popup_blocks_navigation() {
        let mut model = model_with("stock_raw.csv");
        model.update(Some(Message::Help));
        assert_eq!(model.popup(), Some(HELP_TEXT));
        model.update(Some(Message::NextPage));
        assert_eq!(model.page(), Page::Sales);
        model.update(Some(Message::Exit));
        assert!(model.popup().is_none());
        model.update(Some(Message::NextPage));
        assert_eq!(model.page(), Page::Inventory);
    }

    #[test]
    fn scrolling_is_clamped() {
        let mut model = model_with("stock_raw.csv");
        model.update(Some(Message::MoveDown));
        model.update(Some(Message::MovePageDown));
        assert_eq!(model.sales_table().offset_row, 2);
        model.update(Some(Message::MovePageUp));
        assert_eq!(model.sales_table().offset_row, 0);
        assert_eq!(model.sales_table().visible_columns(2)[0].data.len(), 2);
    }

    #[test]
    fn reload_and_quit() {
        let mut model = model_with("stock_raw.csv");
        model.update(Some(Message::Reload));
        assert!(model.dataset(DatasetKind::Purchase).is_some());
        model.update(Some(Message::Quit));
        assert_eq!(model.status, Status::QUITTING);
    }

    #[test]
    fn quantities_print_compactly() {
        assert_eq!(format_quantity(7.0), "7");
        assert_eq!(format_quantity(2.5), "2.50");
    }
}

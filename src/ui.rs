use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::{self, border},
    text::{Line, Span, Text},
    widgets::{Axis, Block, Cell, Chart, Clear, Dataset, GraphType, Paragraph, Row, Table, Wrap},
};

use crate::dataset::{DatasetKind, Trend};
use crate::domain::{DashConfig, Page};
use crate::model::{ColumnView, Insight, Model, TableView};

pub const SIDEBAR_WIDTH: u16 = 26;
pub const STATUSLINE_HEIGHT: usize = 1;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 1;
const SELECTOR_HEIGHT: u16 = 3;
const TREND_HEIGHT: u16 = 14;
const INSIGHT_HEIGHT: u16 = 8;

const SERIES_COLORS: [Color; 6] = [
    Color::Cyan,
    Color::Yellow,
    Color::Magenta,
    Color::Green,
    Color::LightRed,
    Color::LightBlue,
];

#[derive(Debug)]
pub struct DashboardUI {
    max_column_width: usize,
}

impl DashboardUI {
    pub fn new(config: &DashConfig) -> Self {
        Self {
            max_column_width: config.max_column_width,
        }
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let [main, statusline] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(STATUSLINE_HEIGHT as u16),
        ])
        .areas(frame.area());
        let [sidebar, page] =
            Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Fill(1)]).areas(main);

        self.draw_sidebar(model, frame, sidebar);
        match model.page() {
            Page::Sales => self.draw_sales(model, frame, page),
            Page::Inventory => self.draw_inventory(model, frame, page),
            Page::Executive => self.draw_executive(model, frame, page),
        }
        self.draw_statusline(model, frame, statusline);

        if let Some(message) = model.popup() {
            self.draw_popup(message, frame);
        }
    }

    fn draw_sidebar(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let mut lines: Vec<Line> = Page::ALL
            .iter()
            .enumerate()
            .map(|(idx, page)| {
                let label = format!(" {} {}", idx + 1, page.title());
                if *page == model.page() {
                    Line::from(label.black().on_yellow().bold())
                } else {
                    Line::from(label)
                }
            })
            .collect();

        lines.push(Line::from(""));
        lines.push(Line::from(" About".bold()));
        lines.push(Line::from(" Retail sales analytics over"));
        lines.push(Line::from(" the loaded sales, purchase"));
        lines.push(Line::from(" and stock spreadsheets."));

        for kind in DatasetKind::ALL {
            let state = match model.dataset(kind) {
                Some(df) => format!("{} rows", df.height()).green(),
                None => "absent".red(),
            };
            lines.push(Line::from(vec![format!(" {:<9}", kind.label()).into(), state]));
        }

        let block = Block::bordered()
            .title(Line::from(" Navigation ".bold()))
            .border_set(border::THICK);
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn draw_sales(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let block = Block::bordered()
            .title(Line::from(" Sales Dashboard ".bold()).centered())
            .title_bottom(Line::from(" Analyze sales trends and performance metrics. ").centered());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if !model
            .dataset(DatasetKind::Sales)
            .is_some_and(|df| df.height() > 0)
        {
            self.draw_empty(
                "No sales data available.",
                model.load_error(DatasetKind::Sales),
                frame,
                inner,
            );
            return;
        }

        let [selectors, table, trend, insight] = Layout::vertical([
            Constraint::Length(SELECTOR_HEIGHT),
            Constraint::Fill(1),
            Constraint::Length(TREND_HEIGHT),
            Constraint::Length(INSIGHT_HEIGHT),
        ])
        .areas(inner);

        self.draw_selectors(model, frame, selectors);
        self.draw_table(model.sales_table(), frame, table);

        let trend_block = Block::bordered().title(" Sales Trend Analysis ");
        let trend_inner = trend_block.inner(trend);
        frame.render_widget(trend_block, trend);
        if model.trend().is_empty() {
            self.draw_empty("No data available for the selected filters.", None, frame, trend_inner);
        } else {
            let [chart, pivot] =
                Layout::horizontal([Constraint::Fill(2), Constraint::Fill(1)]).areas(trend_inner);
            self.draw_trend_chart(model.trend(), frame, chart);
            self.draw_table(model.trend_table(), frame, pivot);
        }

        self.draw_insight(
            " AI-Powered Insights from Sales Data ",
            model.insight(Page::Sales),
            frame,
            insight,
        );
    }

    fn draw_selectors(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let areas = Layout::horizontal([Constraint::Fill(1), Constraint::Fill(1)]).split(area);
        let keys = ["m/M", "c/C"];
        for ((selector, key), area) in model.selectors().iter().zip(keys).zip(areas.iter()) {
            let value = match selector.current() {
                Some(v) => format!(
                    "{v}  ({}/{})",
                    selector.selected_index() + 1,
                    selector.options.len()
                ),
                None => "-".to_string(),
            };
            let block = Block::bordered().title(format!(" Select {} <{key}> ", selector.label));
            frame.render_widget(Paragraph::new(value.yellow()).block(block), *area);
        }
    }

    fn draw_table(&self, view: &TableView, frame: &mut Frame, area: Rect) {
        let block = Block::bordered().title(format!(
            " {} [{}/{}] ",
            view.name,
            std::cmp::min(view.offset_row + 1, view.nrows),
            view.nrows
        ));
        let height = area.height.saturating_sub(2 + TABLE_HEADER_HEIGHT as u16) as usize;
        let columns = view.visible_columns(height);

        let header = Row::new(
            columns
                .iter()
                .map(|c| Cell::from(Self::get_visible_name(&c.name, c.width)).bold()),
        )
        .style(Style::default().fg(Color::Yellow));
        let rows = Self::transpose(&columns);
        let widths: Vec<Constraint> = columns
            .iter()
            .map(|c| Constraint::Length(std::cmp::min(c.width, self.max_column_width) as u16))
            .collect();

        frame.render_widget(Table::new(rows, widths).header(header).block(block), area);
    }

    fn transpose(columns: &[ColumnView]) -> Vec<Row<'static>> {
        let nrows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        (0..nrows)
            .map(|r| {
                Row::new(
                    columns
                        .iter()
                        .map(|c| Cell::from(Self::get_visible_name(&c.data[r], c.width))),
                )
            })
            .collect()
    }

    fn get_visible_name(name: &str, width: usize) -> String {
        if width < 3 {
            return String::new();
        }
        if name.chars().count() > width {
            let mut reduced: String = name.chars().take(width - 3).collect();
            reduced.push_str("...");
            reduced
        } else {
            name.to_string()
        }
    }

    fn draw_trend_chart(&self, trend: &Trend, frame: &mut Frame, area: Rect) {
        let points: Vec<Vec<(f64, f64)>> = trend
            .series
            .iter()
            .map(|(_, values)| {
                values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i as f64, *v))
                    .collect()
            })
            .collect();

        let datasets = trend
            .series
            .iter()
            .zip(points.iter())
            .enumerate()
            .map(|(idx, ((brand, _), data))| {
                Dataset::default()
                    .name(brand.clone())
                    .marker(symbols::Marker::Braille)
                    .graph_type(GraphType::Line)
                    .style(Style::default().fg(SERIES_COLORS[idx % SERIES_COLORS.len()]))
                    .data(data)
            })
            .collect::<Vec<Dataset>>();

        let x_max = (trend.months.len().saturating_sub(1)).max(1) as f64;
        let y_max = (trend.max() * 1.1).max(1.0);
        let x_labels: Vec<Line> = trend
            .months
            .iter()
            .map(|m| Line::from(m.chars().take(3).collect::<String>()))
            .collect();
        let y_labels = vec![
            Line::from("0"),
            Line::from(format!("{:.0}", y_max / 2.0)),
            Line::from(format!("{y_max:.0}")),
        ];

        let chart = Chart::new(datasets)
            .x_axis(
                Axis::default()
                    .title("Month")
                    .bounds([0.0, x_max])
                    .labels(x_labels),
            )
            .y_axis(
                Axis::default()
                    .title("Qty")
                    .bounds([0.0, y_max])
                    .labels(y_labels),
            );
        frame.render_widget(chart, area);
    }

    fn draw_inventory(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let block = Block::bordered()
            .title(Line::from(" Inventory Management ".bold()).centered())
            .title_bottom(Line::from(" Monitor stock levels and inventory turnover. ").centered());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if model.dataset(DatasetKind::Stock).is_none() {
            self.draw_empty(
                "No stock data available.",
                model.load_error(DatasetKind::Stock),
                frame,
                inner,
            );
            return;
        }

        let [overview, summary] =
            Layout::vertical([Constraint::Fill(2), Constraint::Fill(1)]).areas(inner);
        self.draw_table(model.stock_table(), frame, overview);
        self.draw_table(model.stock_summary(), frame, summary);
    }

    fn draw_executive(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let block = Block::bordered()
            .title(Line::from(" Executive Insights ".bold()).centered())
            .title_bottom(Line::from(" Gain insights and recommendations powered by AI. ").centered());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        self.draw_insight(
            " AI-Powered Insights from Sales and Inventory Data ",
            model.insight(Page::Executive),
            frame,
            inner,
        );
    }

    fn draw_insight(&self, title: &str, insight: &Insight, frame: &mut Frame, area: Rect) {
        let text = match insight {
            Insight::Idle => Text::from(Line::from(vec![
                "Press ".into(),
                "<g>".blue().bold(),
                " to generate insights.".into(),
            ])),
            Insight::Pending => Text::from("Generating insights ...".italic()),
            Insight::Ready(answer) => Text::from(answer.as_str()),
            Insight::Failed(message) => Text::from(message.as_str().red()),
        };
        let block = Block::bordered().title(title.to_string());
        frame.render_widget(
            Paragraph::new(text).wrap(Wrap { trim: false }).block(block),
            area,
        );
    }

    fn draw_empty(&self, message: &str, error: Option<&str>, frame: &mut Frame, area: Rect) {
        let mut lines = vec![Line::from(message)];
        if let Some(error) = error {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                error.to_string(),
                Style::default().fg(Color::Red),
            )));
        }
        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), area);
    }

    fn draw_statusline(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let age = model.last_status_message_update().elapsed().as_secs();
        let style = if age < 5 {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let line = Line::from(vec![
            Span::styled(format!(" {} ", model.status_message()), style),
            " | Help ".into(),
            "<?>".blue().bold(),
            " Quit ".into(),
            "<q> ".blue().bold(),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_popup(&self, message: &str, frame: &mut Frame) {
        let height = message.lines().count() as u16 + 2;
        let width = message.lines().map(|l| l.len()).max().unwrap_or(0) as u16 + 4;
        let area = Self::centered(frame.area(), width, height);
        let block = Block::bordered()
            .title(Line::from(" Help ".bold()).centered())
            .title_bottom(Line::from(" <Esc> close ").centered())
            .border_set(border::THICK);
        frame.render_widget(Clear, area);
        frame.render_widget(Paragraph::new(message.to_string()).block(block), area);
    }

    fn centered(area: Rect, width: u16, height: u16) -> Rect {
        let [area] = Layout::horizontal([Constraint::Length(width)])
            .flex(Flex::Center)
            .areas(area);
        let [area] = Layout::vertical([Constraint::Length(height)])
            .flex(Flex::Center)
            .areas(area);
        area
    }
}

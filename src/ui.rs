use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, BarChart, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table,
        TableState, Wrap,
    },
    Frame, Terminal,
};
use std::io;

use urban_insights::schema::YEAR;
use urban_insights::views::{self, DEFAULT_HISTOGRAM_BINS};
use urban_insights::{
    Dashboard, DatasetKind, DatasetView, SeedEvent, StoreQuery, Table as DataTable, Value, YearRange,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Overview,
    Cleaning,
    Analysis,
    Trends,
    Database,
}

impl Page {
    pub fn all() -> [Page; 5] {
        [Page::Overview, Page::Cleaning, Page::Analysis, Page::Trends, Page::Database]
    }

    pub fn next(&self) -> Self {
        match self {
            Page::Overview => Page::Cleaning,
            Page::Cleaning => Page::Analysis,
            Page::Analysis => Page::Trends,
            Page::Trends => Page::Database,
            Page::Database => Page::Overview,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Overview => Page::Database,
            Page::Cleaning => Page::Overview,
            Page::Analysis => Page::Cleaning,
            Page::Trends => Page::Analysis,
            Page::Database => Page::Trends,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Overview => "Overview",
            Page::Cleaning => "Cleaning",
            Page::Analysis => "Analysis",
            Page::Trends => "Trends",
            Page::Database => "Database",
        }
    }
}

/// What the Database page can show; the store may not exist yet
pub enum StoreStatus {
    Unknown,
    Unavailable(String),
    Ready {
        rows: i64,
        averages: Option<DataTable>,
        events: Vec<SeedEvent>,
    },
}

pub struct App {
    pub dashboard: Dashboard,
    pub dataset: DatasetKind,
    pub current_page: Page,
    pub view: Option<DatasetView>,
    pub error: Option<String>,
    pub full_range: Option<YearRange>,
    pub year_range: Option<YearRange>,
    pub selected_column: usize,
    pub state: TableState,
    pub store_status: StoreStatus,
    pub message: Option<String>,
}

impl App {
    pub fn new(dashboard: Dashboard) -> Self {
        Self {
            dashboard,
            dataset: DatasetKind::Trends,
            current_page: Page::Overview,
            view: None,
            error: None,
            full_range: None,
            year_range: None,
            selected_column: 0,
            state: TableState::default(),
            store_status: StoreStatus::Unknown,
            message: None,
        }
    }

    /// Reload the current dataset (cached when the file is unchanged)
    pub fn refresh(&mut self) {
        match self.dashboard.view(self.dataset) {
            Ok(view) => {
                let full = YearRange::of(&view.cleaned.table, YEAR);
                if self.full_range != full {
                    self.year_range = full;
                }
                self.full_range = full;
                self.state.select(if view.cleaned.table.is_empty() { None } else { Some(0) });
                let columns = view.numeric_columns().len();
                if self.selected_column >= columns {
                    self.selected_column = 0;
                }
                self.view = Some(view);
                self.error = None;
            }
            Err(e) => {
                self.view = None;
                self.error = Some(e.to_string());
            }
        }
        self.refresh_store();
    }

    pub fn refresh_store(&mut self) {
        let layout = self.dataset.schema().store;
        let store = self.dashboard.store();

        self.store_status = match store.row_count(&layout) {
            Ok(rows) => StoreStatus::Ready {
                rows,
                averages: if rows > 0 {
                    store.query(&layout, &StoreQuery::Averages).ok()
                } else {
                    None
                },
                events: store
                    .events()
                    .map(|events| {
                        events
                            .into_iter()
                            .filter(|e| e.table_name == layout.table)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            Err(e) => StoreStatus::Unavailable(e.to_string()),
        };
    }

    pub fn switch_dataset(&mut self) {
        self.dataset = match self.dataset {
            DatasetKind::Trends => DatasetKind::Social,
            DatasetKind::Social => DatasetKind::Trends,
        };
        self.full_range = None;
        self.year_range = None;
        self.selected_column = 0;
        self.message = None;
        self.refresh();
    }

    pub fn seed_store(&mut self) {
        self.message = Some(match self.dashboard.seed(self.dataset) {
            Ok(outcome) => format!("🌱 {}", outcome),
            Err(e) => format!("❌ Seed failed: {}", e),
        });
        self.refresh_store();
    }

    pub fn export(&mut self) {
        self.message = Some(match self.dashboard.export(self.dataset) {
            Ok(paths) => format!(
                "💾 {} + {}",
                paths.csv.display(),
                paths.spreadsheet.display()
            ),
            Err(e) => format!("❌ Export failed: {}", e),
        });
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    /// Shift one end of the year window, staying inside the data's span
    pub fn adjust_range(&mut self, start_delta: i64, end_delta: i64) {
        let (Some(full), Some(range)) = (self.full_range, self.year_range) else {
            return;
        };
        let start = (range.start + start_delta).clamp(full.start, full.end);
        let end = (range.end + end_delta).clamp(full.start, full.end);
        if start <= end {
            self.year_range = Some(YearRange::new(start, end));
        }
    }

    pub fn reset_range(&mut self) {
        self.year_range = self.full_range;
    }

    pub fn next_column(&mut self) {
        let count = self.numeric_columns().len();
        if count > 0 {
            self.selected_column = (self.selected_column + 1) % count;
        }
    }

    pub fn previous_column(&mut self) {
        let count = self.numeric_columns().len();
        if count > 0 {
            self.selected_column = (self.selected_column + count - 1) % count;
        }
    }

    pub fn numeric_columns(&self) -> Vec<String> {
        self.view
            .as_ref()
            .map(|v| v.numeric_columns().iter().map(|c| c.to_string()).collect())
            .unwrap_or_default()
    }

    /// Cleaned rows inside the current year window
    pub fn filtered_table(&self) -> Option<DataTable> {
        let view = self.view.as_ref()?;
        match self.year_range {
            Some(range) => views::filter_years(&view.cleaned.table, YEAR, range).ok(),
            None => Some(view.cleaned.table.clone()),
        }
    }

    pub fn row_count(&self) -> usize {
        self.view.as_ref().map(|v| v.cleaned.table.len()).unwrap_or(0)
    }

    pub fn next(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i >= len - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i == 0 {
                    len - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('d') => app.switch_dataset(),
                KeyCode::Char('r') => app.refresh(),
                KeyCode::Char('[') => app.adjust_range(-1, 0),
                KeyCode::Char(']') => app.adjust_range(1, 0),
                KeyCode::Char('-') => app.adjust_range(0, -1),
                KeyCode::Char('=') | KeyCode::Char('+') => app.adjust_range(0, 1),
                KeyCode::Char('0') => app.reset_range(),
                KeyCode::Char('s') if app.current_page == Page::Database => app.seed_store(),
                KeyCode::Char('e') => app.export(),
                KeyCode::Left | KeyCode::Char('h') => app.previous_column(),
                KeyCode::Right | KeyCode::Char('l') => app.next_column(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if let Some(error) = &app.error {
        render_error(f, chunks[1], error);
    } else {
        match app.current_page {
            Page::Overview => render_overview(f, chunks[1], app),
            Page::Cleaning => render_cleaning(f, chunks[1], app),
            Page::Analysis => render_analysis(f, chunks[1], app),
            Page::Trends => render_trends(f, chunks[1], app),
            Page::Database => render_database(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

// ============================================================================
// CHROME
// ============================================================================

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in Page::all().iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        app.dataset.name().to_string(),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ));
    if let Some(range) = app.year_range {
        tab_spans.push(Span::raw("  |  "));
        tab_spans.push(Span::styled(
            format!("{}–{}", range.start, range.end),
            Style::default().fg(Color::White),
        ));
    }

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![Span::styled(
        format!(" Rows: {} ", app.row_count()),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(message) = &app.message {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(message.clone(), Style::default().fg(Color::Green)));
    }

    let keys = [
        ("Tab", " Page"),
        ("d", " Dataset"),
        ("[ ] - =", " Years"),
        ("←/→", " Column"),
        ("e", " Export"),
        ("s", " Seed"),
        ("q", " Quit"),
    ];
    for (key, label) in keys {
        status_spans.push(Span::raw(" | "));
        let color = if key == "q" { Color::Red } else { Color::Yellow };
        status_spans.push(Span::styled(key, Style::default().fg(color)));
        status_spans.push(Span::raw(label));
    }

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_error(f: &mut Frame, area: Rect, error: &str) {
    let text = vec![
        Line::from(""),
        Line::from(Span::styled(
            "  ❌ Dataset unavailable",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("  {}", error)),
        Line::from(""),
        Line::from("  Check the source paths in urban_insights.toml, then press r to retry."),
    ];
    let panel = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" Error "));
    f.render_widget(panel, area);
}

fn block(title: &str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(format!(" {} ", title))
}

fn header_row(cells: &[&str]) -> Row<'static> {
    Row::new(cells.iter().map(|h| {
        Cell::from(h.to_string()).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    }))
    .style(Style::default().bg(Color::DarkGray))
    .height(1)
}

fn fmt_number(value: f64) -> String {
    if value.is_finite() {
        format!("{:.2}", value)
    } else {
        "n/a".to_string()
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

// ============================================================================
// PAGES
// ============================================================================

fn render_overview(f: &mut Frame, area: Rect, app: &App) {
    let Some(view) = &app.view else { return };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(0)])
        .split(area);

    // KPI cards
    let columns: Vec<&str> = view.numeric_columns();
    let kpis = views::latest_kpis(&view.cleaned.table, YEAR, &columns).unwrap_or_default();
    let constraints = vec![Constraint::Ratio(1, kpis.len().max(1) as u32); kpis.len().max(1)];
    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(chunks[0]);
    for (kpi, card) in kpis.iter().zip(cards.iter()) {
        let text = vec![
            Line::from(Span::styled(
                format!("{:.2}%", kpi.value),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                format!("latest ({})", kpi.year),
                Style::default().fg(Color::DarkGray),
            )),
        ];
        f.render_widget(Paragraph::new(text).block(block(&kpi.column)), *card);
    }

    let report = &view.cleaned.report;
    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("  {}", app.dataset.name()),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("  Source:   {}", app.dashboard.settings().source_path(app.dataset).display())),
        Line::from(format!("  Policy:   {}", app.dashboard.settings().policy_for(app.dataset))),
        Line::from(format!("  Rows:     {} raw → {} clean", report.rows_in, report.rows_out)),
        Line::from(format!("  Columns:  {}", view.coverage.present.join(", "))),
    ];
    if !view.coverage.missing.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("  Missing:  {}", view.coverage.missing.join(", ")),
            Style::default().fg(Color::Red),
        )));
    }
    if !view.coverage.passthrough.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("  Passed through: {}", view.coverage.passthrough.join(", ")),
            Style::default().fg(Color::DarkGray),
        )));
    }

    f.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }).block(block("Dataset")),
        chunks[1],
    );
}

fn render_cleaning(f: &mut Frame, area: Rect, app: &mut App) {
    let Some(view) = &app.view else { return };

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    let report = &view.cleaned.report;
    let mut lines = vec![
        Line::from(format!("Duplicates removed:  {}", report.duplicates_removed)),
        Line::from(format!("Sentinels replaced:  {}", report.sentinels_replaced)),
        Line::from(format!("Unparseable values:  {}", report.coerced_to_missing)),
        Line::from(format!("Rows dropped:        {}", report.rows_dropped)),
        Line::from(format!("Empty rows dropped:  {}", report.empty_rows_dropped)),
        Line::from(""),
        Line::from(Span::styled("Missing before", Style::default().fg(Color::Yellow))),
    ];
    for (column, count) in &report.missing_before {
        lines.push(Line::from(format!("  {:<28} {}", truncate(column, 28), count)));
    }
    if !report.fill_values.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Filled with", Style::default().fg(Color::Yellow))));
        for (column, value) in &report.fill_values {
            lines.push(Line::from(format!("  {:<28} {:.3}", truncate(column, 28), value)));
        }
    }
    for warning in &report.warnings {
        lines.push(Line::from(Span::styled(
            format!("⚠ {}", warning),
            Style::default().fg(Color::Red),
        )));
    }
    f.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }).block(block("Cleaning Report")),
        chunks[0],
    );

    let table = &view.cleaned.table;
    let header: Vec<&str> = table.columns.iter().map(|c| c.as_str()).collect();
    let rows = table.rows.iter().map(|row| {
        Row::new(row.iter().map(|value| {
            let text = match value {
                Value::Number(v) => format!("{:.3}", v),
                other => other.to_string(),
            };
            Cell::from(truncate(&text, 18))
        }))
        .height(1)
    });
    let widths = vec![Constraint::Length(14); header.len()];

    let cleaned = Table::new(rows, widths)
        .header(header_row(&header))
        .block(block("Cleaned Data"))
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(cleaned, chunks[1], &mut app.state);
}

fn render_analysis(f: &mut Frame, area: Rect, app: &App) {
    let Some(view) = &app.view else { return };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[0]);

    // Descriptive statistics
    let rows = view.summary.stats.iter().map(|s| {
        Row::new(vec![
            Cell::from(truncate(&s.column, 30)),
            Cell::from(s.count.to_string()),
            Cell::from(fmt_number(s.mean)),
            Cell::from(fmt_number(s.std_dev)),
            Cell::from(fmt_number(s.min)),
            Cell::from(fmt_number(s.max)),
        ])
    });
    let stats_table = Table::new(
        rows,
        [
            Constraint::Length(31),
            Constraint::Length(6),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
        ],
    )
    .header(header_row(&["Column", "N", "Mean", "Std", "Min", "Max"]))
    .block(block("Summary Statistics"));
    f.render_widget(stats_table, top[0]);

    // Correlation matrix
    let labels: Vec<String> = view.summary.columns.iter().map(|c| truncate(c, 10)).collect();
    let mut corr_header = vec![String::new()];
    corr_header.extend(labels.iter().cloned());
    let corr_rows = view.summary.correlation.iter().enumerate().map(|(i, row)| {
        let mut cells = vec![Cell::from(labels[i].clone())];
        cells.extend(row.iter().map(|r| {
            let color = if !r.is_finite() {
                Color::DarkGray
            } else if *r >= 0.0 {
                Color::Green
            } else {
                Color::Red
            };
            Cell::from(fmt_number(*r)).style(Style::default().fg(color))
        }));
        Row::new(cells)
    });
    let header_refs: Vec<&str> = corr_header.iter().map(|s| s.as_str()).collect();
    let corr_table = Table::new(corr_rows, vec![Constraint::Length(11); corr_header.len()])
        .header(header_row(&header_refs))
        .block(block("Correlation"));
    f.render_widget(corr_table, top[1]);

    // Histogram + box summary for the selected column
    let columns = app.numeric_columns();
    let Some(column) = columns.get(app.selected_column) else { return };
    let Some(filtered) = app.filtered_table() else { return };

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(chunks[1]);

    match views::histogram(&filtered, column, DEFAULT_HISTOGRAM_BINS) {
        Ok(hist) => {
            let labels: Vec<String> = hist.bins.iter().map(|b| format!("{:.0}", b.lower)).collect();
            let data: Vec<(&str, u64)> = labels
                .iter()
                .zip(&hist.bins)
                .map(|(label, bin)| (label.as_str(), bin.count as u64))
                .collect();
            let chart = BarChart::default()
                .block(block(&format!("Distribution · {}", column)))
                .data(data.as_slice())
                .bar_width(4)
                .bar_gap(1)
                .bar_style(Style::default().fg(Color::Green))
                .value_style(Style::default().fg(Color::Black).bg(Color::Green));
            f.render_widget(chart, bottom[0]);
        }
        Err(e) => f.render_widget(Paragraph::new(e.to_string()).block(block("Distribution")), bottom[0]),
    }

    let box_lines = match views::box_summary(&filtered, column) {
        Ok(b) => vec![
            Line::from(format!("max     {}", fmt_number(b.max))),
            Line::from(format!("q3      {}", fmt_number(b.q3))),
            Line::from(Span::styled(
                format!("median  {}", fmt_number(b.median)),
                Style::default().fg(Color::Yellow),
            )),
            Line::from(format!("q1      {}", fmt_number(b.q1))),
            Line::from(format!("min     {}", fmt_number(b.min))),
            Line::from(""),
            Line::from(format!("IQR     {}", fmt_number(b.iqr()))),
            Line::from(format!("n       {}", b.count)),
        ],
        Err(e) => vec![Line::from(e.to_string())],
    };
    f.render_widget(Paragraph::new(box_lines).block(block("Box Plot")), bottom[1]);
}

fn render_trends(f: &mut Frame, area: Rect, app: &App) {
    let Some(view) = &app.view else { return };
    let Some(filtered) = app.filtered_table() else { return };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    let columns = view.numeric_columns();
    let series = views::trend_series(&filtered, YEAR, &columns).unwrap_or_default();
    let points: Vec<Vec<(f64, f64)>> = series
        .iter()
        .map(|s| s.points.iter().map(|(y, v)| (*y as f64, *v)).collect())
        .collect();

    let (x_min, x_max) = app
        .year_range
        .map(|r| (r.start as f64, r.end as f64))
        .unwrap_or((0.0, 1.0));
    let all_values = points.iter().flatten().map(|(_, v)| *v);
    let y_max = all_values.clone().fold(f64::MIN, f64::max).max(1.0);
    let y_min = all_values.fold(f64::MAX, f64::min).min(0.0);

    let palette = [Color::Cyan, Color::Yellow, Color::Magenta, Color::Green];
    let datasets: Vec<Dataset> = series
        .iter()
        .zip(&points)
        .enumerate()
        .map(|(i, (s, data))| {
            Dataset::default()
                .name(s.column.clone())
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(palette[i % palette.len()]))
                .data(data)
        })
        .collect();

    let chart = Chart::new(datasets)
        .block(block("Trends Over Time"))
        .x_axis(
            Axis::default()
                .title("Year")
                .style(Style::default().fg(Color::DarkGray))
                .bounds([x_min, x_max])
                .labels(vec![
                    Span::raw(format!("{:.0}", x_min)),
                    Span::raw(format!("{:.0}", (x_min + x_max) / 2.0)),
                    Span::raw(format!("{:.0}", x_max)),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("%")
                .style(Style::default().fg(Color::DarkGray))
                .bounds([y_min, y_max])
                .labels(vec![
                    Span::raw(format!("{:.0}", y_min)),
                    Span::raw(format!("{:.0}", (y_min + y_max) / 2.0)),
                    Span::raw(format!("{:.0}", y_max)),
                ]),
        );
    f.render_widget(chart, chunks[0]);

    // Decade roll-up for the whole dataset
    let Some(decades) = &view.decades else { return };
    let decade_table = decades.to_table();
    let header: Vec<&str> = decade_table.columns.iter().map(|c| c.as_str()).collect();
    let rows = decade_table.rows.iter().map(|row| {
        Row::new(row.iter().map(|v| Cell::from(v.to_string())))
    });
    let table = Table::new(rows, vec![Constraint::Length(22); header.len()])
        .header(header_row(&header))
        .block(block("Averages by Decade"));
    f.render_widget(table, chunks[1]);
}

fn render_database(f: &mut Frame, area: Rect, app: &App) {
    let layout = app.dataset.schema().store;
    let path = app.dashboard.store().path().display().to_string();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Length(5), Constraint::Min(0)])
        .split(area);

    match &app.store_status {
        StoreStatus::Unknown => {
            f.render_widget(Paragraph::new("  Loading...").block(block("Store")), area);
        }
        StoreStatus::Unavailable(reason) => {
            let text = vec![
                Line::from(""),
                Line::from(Span::styled(
                    "  Store not available",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
                Line::from(format!("  {}", reason)),
                Line::from(""),
                Line::from("  Press s to create and seed it."),
            ];
            f.render_widget(
                Paragraph::new(text).wrap(Wrap { trim: false }).block(block("Store")),
                area,
            );
        }
        StoreStatus::Ready {
            rows,
            averages,
            events,
        } => {
            let text = vec![
                Line::from(format!("  Database: {}", path)),
                Line::from(format!("  Table:    {}", layout.table)),
                Line::from(format!("  Rows:     {}", rows)),
                Line::from(if *rows == 0 {
                    "  Empty - press s to seed it from the cleaned data."
                } else {
                    "  Seeded - further seeding is skipped."
                }),
            ];
            f.render_widget(Paragraph::new(text).block(block("Store")), chunks[0]);

            if let Some(averages) = averages {
                let header: Vec<&str> = averages.columns.iter().map(|c| c.as_str()).collect();
                let rows = averages.rows.iter().map(|row| {
                    Row::new(row.iter().map(|v| Cell::from(v.to_string())))
                });
                let table = Table::new(rows, vec![Constraint::Length(32); header.len()])
                    .header(header_row(&header))
                    .block(block("Stored Averages"));
                f.render_widget(table, chunks[1]);
            }

            let rows = events.iter().map(|e| {
                Row::new(vec![
                    Cell::from(e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
                    Cell::from(e.row_count.to_string()),
                    Cell::from(e.actor.clone()),
                    Cell::from(truncate(&e.event_id, 12)),
                ])
            });
            let table = Table::new(
                rows,
                [
                    Constraint::Length(21),
                    Constraint::Length(8),
                    Constraint::Length(24),
                    Constraint::Length(14),
                ],
            )
            .header(header_row(&["Seeded at", "Rows", "Actor", "Event"]))
            .block(block("Seed History"));
            f.render_widget(table, chunks[2]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use urban_insights::Settings;

    #[test]
    fn test_page_cycle() {
        let mut page = Page::Overview;
        for _ in 0..Page::all().len() {
            page = page.next();
        }
        assert_eq!(page, Page::Overview);
        assert_eq!(Page::Overview.previous(), Page::Database);
        assert_eq!(Page::Trends.title(), "Trends");
    }

    #[test]
    fn test_year_window_stays_inside_data() {
        let mut app = App::new(Dashboard::new(Settings::default()));
        app.full_range = Some(YearRange::new(1990, 2000));
        app.year_range = app.full_range;

        app.adjust_range(-5, 0);
        assert_eq!(app.year_range, Some(YearRange::new(1990, 2000)));

        app.adjust_range(3, -2);
        assert_eq!(app.year_range, Some(YearRange::new(1993, 1998)));

        // Start may not pass end
        app.adjust_range(10, 0);
        assert_eq!(app.year_range, Some(YearRange::new(1993, 1998)));

        app.reset_range();
        assert_eq!(app.year_range, app.full_range);
    }
}

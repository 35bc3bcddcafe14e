use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pathogen_dashboard::{
    build_view, headline, CaseFilter, Cell as DataCell, Dataset, Headline, HospitalSelection,
    PathogenProfile, Table as DataTable, View, ViewOutput,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        BarChart, Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table,
        TableState, Wrap,
    },
    Frame, Terminal,
};
use std::collections::BTreeSet;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Sidebar,
    Content,
}

pub struct App {
    pub dataset: Dataset,
    pub profile: PathogenProfile,
    pub hospitals: Vec<String>,
    pub selected: BTreeSet<String>,
    pub sidebar_state: ListState,
    pub table_state: TableState,
    pub current_view: View,
    pub focus: Focus,
    pub show_info: bool,
    pub output: ViewOutput,
    pub headline: Headline,
}

impl App {
    pub fn new(dataset: Dataset, profile: PathogenProfile) -> Self {
        let hospitals = dataset.cases.hospitals();
        // Sidebar starts with every hospital selected
        let selected: BTreeSet<String> = hospitals.iter().cloned().collect();

        let mut sidebar_state = ListState::default();
        if !hospitals.is_empty() {
            sidebar_state.select(Some(0));
        }

        let filter = CaseFilter::hospitals(selected.iter().cloned());
        let current_view = View::InfectionTrends;
        let output = build_view(current_view, &dataset, &filter);
        let headline = headline(&dataset, &filter);

        let mut app = Self {
            dataset,
            profile,
            hospitals,
            selected,
            sidebar_state,
            table_state: TableState::default(),
            current_view,
            focus: Focus::Sidebar,
            show_info: false,
            output,
            headline,
        };
        app.reset_table_selection();
        app
    }

    pub fn filter(&self) -> CaseFilter {
        CaseFilter {
            hospitals: HospitalSelection::Only(self.selected.clone()),
            ..CaseFilter::default()
        }
    }

    /// Re-run the current view against the data and filter
    pub fn refresh(&mut self) {
        let filter = self.filter();
        self.output = build_view(self.current_view, &self.dataset, &filter);
        self.headline = headline(&self.dataset, &filter);
        self.reset_table_selection();
    }

    fn reset_table_selection(&mut self) {
        if self.output.table.is_empty() {
            self.table_state.select(None);
        } else {
            self.table_state.select(Some(0));
        }
    }

    pub fn next_view(&mut self) {
        self.current_view = self.current_view.next();
        self.refresh();
    }

    pub fn previous_view(&mut self) {
        self.current_view = self.current_view.previous();
        self.refresh();
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Sidebar => Focus::Content,
            Focus::Content => Focus::Sidebar,
        };
    }

    pub fn toggle_info(&mut self) {
        self.show_info = !self.show_info;
    }

    /// Toggle the hospital under the sidebar cursor
    pub fn toggle_hospital(&mut self) {
        let Some(name) = self
            .sidebar_state
            .selected()
            .and_then(|i| self.hospitals.get(i))
            .cloned()
        else {
            return;
        };

        if !self.selected.remove(&name) {
            self.selected.insert(name);
        }
        self.refresh();
    }

    pub fn select_all(&mut self) {
        self.selected = self.hospitals.iter().cloned().collect();
        self.refresh();
    }

    pub fn select_none(&mut self) {
        self.selected.clear();
        self.refresh();
    }

    pub fn next(&mut self) {
        match self.focus {
            Focus::Sidebar => step(&mut self.sidebar_state, self.hospitals.len(), 1),
            Focus::Content => step_table(&mut self.table_state, self.output.table.row_count(), 1),
        }
    }

    pub fn previous(&mut self) {
        match self.focus {
            Focus::Sidebar => step(&mut self.sidebar_state, self.hospitals.len(), -1),
            Focus::Content => step_table(&mut self.table_state, self.output.table.row_count(), -1),
        }
    }

    pub fn page_down(&mut self) {
        let len = self.output.table.row_count();
        if len == 0 {
            return;
        }
        let i = self.table_state.selected().map_or(0, |i| (i + 20).min(len - 1));
        self.table_state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let i = self.table_state.selected().map_or(0, |i| i.saturating_sub(20));
        self.table_state.select(Some(i));
    }
}

/// Move a wrapping cursor by `delta` over `len` items
fn wrap_index(current: Option<usize>, len: usize, delta: isize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let i = match current {
        Some(i) => (i as isize + delta).rem_euclid(len as isize) as usize,
        None => 0,
    };
    Some(i)
}

fn step(state: &mut ListState, len: usize, delta: isize) {
    state.select(wrap_index(state.selected(), len, delta));
}

fn step_table(state: &mut TableState, len: usize, delta: isize) {
    state.select(wrap_index(state.selected(), len, delta));
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

    res.map_err(Into::into)
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_view();
                    } else {
                        app.next_view();
                    }
                }
                KeyCode::BackTab => app.previous_view(),
                KeyCode::Left | KeyCode::Right => app.toggle_focus(),
                KeyCode::Char(' ') | KeyCode::Enter if app.focus == Focus::Sidebar => {
                    app.toggle_hospital()
                }
                KeyCode::Char('a') => app.select_all(),
                KeyCode::Char('n') => app.select_none(),
                KeyCode::Char('i') => app.toggle_info(),
                KeyCode::Char(c @ '1'..='4') => {
                    let idx = c as usize - '1' as usize;
                    app.current_view = View::ALL[idx];
                    app.refresh();
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.table_state.select(Some(0)),
                KeyCode::End => {
                    let len = app.output.table.row_count();
                    if len > 0 {
                        app.table_state.select(Some(len - 1));
                    }
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with view tabs
            Constraint::Min(0),    // Sidebar + content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(30), Constraint::Min(0)])
        .split(chunks[1]);

    render_sidebar(f, body[0], app);

    if app.show_info {
        render_info(f, body[1], &app.profile);
    } else {
        render_view(f, body[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, view) in View::ALL.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *view == app.current_view {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(format!("{} {}", i + 1, view.title()), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Cases: {}", app.headline.total_cases),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("🏥 {}", app.headline.hospitals),
        Style::default().fg(Color::Green),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(" 🦠 {} ", app.profile.name)),
    );

    f.render_widget(header, area);
}

fn render_sidebar(f: &mut Frame, area: Rect, app: &mut App) {
    let items: Vec<ListItem> = app
        .hospitals
        .iter()
        .map(|name| {
            let checked = app.selected.contains(name);
            let (mark, color) = if checked {
                ("[x] ", Color::Green)
            } else {
                ("[ ] ", Color::DarkGray)
            };
            ListItem::new(Line::from(vec![
                Span::styled(mark, Style::default().fg(color)),
                Span::raw(truncate(name, 22)),
            ]))
        })
        .collect();

    let border = if app.focus == Focus::Sidebar {
        Color::Yellow
    } else {
        Color::White
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(" 🔍 Hospitals "),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(list, area, &mut app.sidebar_state);
}

fn render_view(f: &mut Frame, area: Rect, app: &mut App) {
    let warning_height = app.output.warnings.len() as u16;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(if warning_height > 0 { warning_height + 2 } else { 0 }),
            Constraint::Min(0),
        ])
        .split(area);

    if warning_height > 0 {
        let lines: Vec<Line> = app
            .output
            .warnings
            .iter()
            .map(|w| Line::from(Span::styled(format!("⚠️  {}", w), Style::default().fg(Color::Yellow))))
            .collect();
        let warnings = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Yellow)));
        f.render_widget(warnings, chunks[0]);
    }

    let content = chunks[1];
    match app.current_view {
        View::HospitalComparisons if !app.output.table.is_empty() => {
            let split = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(content);
            render_bar_chart(f, split[0], &app.output.table);
            render_data_table(f, split[1], app.output.title, &app.output.table, &mut app.table_state, app.focus);
        }
        View::MortalityRecovery => {
            let split = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
                .split(content);
            render_data_table(f, split[0], "Outcomes", &app.output.table, &mut app.table_state, app.focus);
            let mut pivot_state = TableState::default();
            let empty = DataTable::default();
            let pivot = app.output.detail.as_ref().unwrap_or(&empty);
            render_data_table(f, split[1], "Mortality Rate by Date", pivot, &mut pivot_state, Focus::Sidebar);
        }
        _ => {
            render_data_table(f, content, app.output.title, &app.output.table, &mut app.table_state, app.focus);
        }
    }
}

fn render_bar_chart(f: &mut Frame, area: Rect, table: &DataTable) {
    let (Some(labels), Some(values)) = (table.column("Hospital"), table.column("Number_of_Cases")) else {
        return;
    };

    let label_text: Vec<String> = labels.iter().map(|c| truncate(&c.to_string(), 10)).collect();
    let data: Vec<(&str, u64)> = label_text
        .iter()
        .zip(values)
        .map(|(label, value)| (label.as_str(), value.as_f64().unwrap_or(0.0) as u64))
        .collect();

    let chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Hospital-wise Infection Cases "),
        )
        .data(&data[..])
        .bar_width(10)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));

    f.render_widget(chart, area);
}

fn render_data_table(
    f: &mut Frame,
    area: Rect,
    title: &str,
    data: &DataTable,
    state: &mut TableState,
    focus: Focus,
) {
    let header_cells = data.column_names().into_iter().map(|h| {
        Cell::from(h.to_string()).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = data.rows().map(|row| {
        let cells = row.into_iter().map(|cell| {
            let style = match cell {
                DataCell::Number(_) => Style::default().fg(Color::Green),
                DataCell::Date(_) => Style::default().fg(Color::Cyan),
                DataCell::Empty => Style::default().fg(Color::DarkGray),
                DataCell::Text(_) => Style::default(),
            };
            let text = if cell.is_empty() { "-".to_string() } else { truncate(&cell.to_string(), 24) };
            Cell::from(text).style(style)
        });
        Row::new(cells).height(1)
    });

    let widths: Vec<Constraint> = data
        .column_names()
        .iter()
        .map(|name| Constraint::Length((name.len().max(10) + 2) as u16))
        .collect();

    let border = if focus == Focus::Content {
        Color::Yellow
    } else {
        Color::White
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(format!(" {} ({} rows) ", title, data.row_count())),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, state);
}

fn render_info(f: &mut Frame, area: Rect, profile: &PathogenProfile) {
    let heading = |text: &str| {
        Line::from(Span::styled(
            format!("  {}", text),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        ))
    };

    let mut content = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("  {}", profile.name),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("  {}", profile.summary)),
        Line::from(""),
        heading("TRANSMISSION"),
        Line::from(format!("  {}", profile.transmission)),
        Line::from(""),
        heading("SYMPTOMS"),
    ];
    content.extend(profile.symptoms.iter().map(|s| Line::from(format!("  • {}", s))));
    content.push(Line::from(""));
    content.push(heading("PREVENTION"));
    content.extend(profile.prevention.iter().map(|s| Line::from(format!("  • {}", s))));
    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press i to close",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    let panel = Paragraph::new(content).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" About the Pathogen "),
    );

    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![Span::styled(
        format!(
            " Selected: {}/{} ",
            app.selected.len(),
            app.hospitals.len()
        ),
        Style::default().fg(Color::Cyan),
    )];

    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    status_spans.push(Span::raw("| "));
    status_spans.push(key("Space"));
    status_spans.push(Span::raw(" Toggle | "));
    status_spans.push(key("a/n"));
    status_spans.push(Span::raw(" All/None | "));
    status_spans.push(key("Tab"));
    status_spans.push(Span::raw(" View | "));
    status_spans.push(key("←/→"));
    status_spans.push(Span::raw(" Focus | "));
    status_spans.push(key("i"));
    status_spans.push(Span::raw(" Info | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pathogen_dashboard::{CaseRecord, CaseTable, LoadReport, WarningKind};
    use std::sync::Arc;

    fn app() -> App {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let records = vec![
            CaseRecord::new(day, "General", 10),
            CaseRecord::new(day, "North", 4),
        ];
        let cases = CaseTable {
            records,
            report: LoadReport::default(),
        };
        App::new(Dataset::new(Arc::new(cases), None), PathogenProfile::default())
    }

    #[test]
    fn test_wrap_index() {
        assert_eq!(wrap_index(Some(0), 3, -1), Some(2));
        assert_eq!(wrap_index(Some(2), 3, 1), Some(0));
        assert_eq!(wrap_index(None, 3, 1), Some(0));
        assert_eq!(wrap_index(Some(1), 0, 1), None);
    }

    #[test]
    fn test_toggle_hospital_refilters() {
        let mut app = app();
        assert_eq!(app.headline.total_cases, 14);

        app.toggle_hospital(); // cursor on "General"
        assert_eq!(app.headline.total_cases, 4);
        assert!(!app.selected.contains("General"));

        app.toggle_hospital();
        assert_eq!(app.headline.total_cases, 14);
    }

    #[test]
    fn test_select_none_warns() {
        let mut app = app();
        app.select_none();

        assert!(app.output.table.is_empty());
        assert_eq!(app.output.warnings[0].kind, WarningKind::EmptySelection);
        assert_eq!(app.table_state.selected(), None);
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("Hôpital Saint-Éloi", 10), "Hôpital...");
        assert_eq!(truncate("short", 10), "short");
    }
}

// Interactive review screen for proposed matches.
// This layer is the only place match statuses change: accept, reject or
// reset the engine's pending proposals, pair missing bank rows manually,
// and save reconciled markers back to the personal CSV.

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::collections::HashSet;
use std::io;

use statement_recon::{
    manual_match, ConfidenceTier, MatchConfig, MatchReport, MatchStatus, MatchStrategy,
    Transaction,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Matches,
    Missing,
    Unmatched,
}

impl Pane {
    pub fn next(&self) -> Self {
        match self {
            Pane::Matches => Pane::Missing,
            Pane::Missing => Pane::Unmatched,
            Pane::Unmatched => Pane::Matches,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Pane::Matches => Pane::Unmatched,
            Pane::Missing => Pane::Matches,
            Pane::Unmatched => Pane::Missing,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Pane::Matches => "Matches",
            Pane::Missing => "Missing from Personal",
            Pane::Unmatched => "Unmatched Personal",
        }
    }
}

pub struct App {
    pub bank: Vec<Transaction>,
    pub personal: Vec<Transaction>,
    pub report: MatchReport,
    pub config: MatchConfig,
    pub pane: Pane,
    pub matches_state: TableState,
    pub missing_state: TableState,
    pub unmatched_state: TableState,
    pub show_detail: bool,
    /// Bank index being manually paired, when the reviewer is picking a
    /// personal row for it
    pub manual_pick: Option<usize>,
    pub status_line: String,
    pub save_requested: bool,
}

impl App {
    pub fn new(
        bank: Vec<Transaction>,
        personal: Vec<Transaction>,
        report: MatchReport,
        config: MatchConfig,
    ) -> Self {
        let mut matches_state = TableState::default();
        if !report.matches.is_empty() {
            matches_state.select(Some(0));
        }
        let mut missing_state = TableState::default();
        if !report.missing.is_empty() {
            missing_state.select(Some(0));
        }
        let mut unmatched_state = TableState::default();
        if !report.unmatched_personal.is_empty() {
            unmatched_state.select(Some(0));
        }

        Self {
            bank,
            personal,
            report,
            config,
            pane: Pane::Matches,
            matches_state,
            missing_state,
            unmatched_state,
            show_detail: false,
            manual_pick: None,
            status_line: String::new(),
            save_requested: false,
        }
    }

    fn pane_len(&self, pane: Pane) -> usize {
        match pane {
            Pane::Matches => self.report.matches.len(),
            Pane::Missing => self.report.missing.len(),
            Pane::Unmatched => self.report.unmatched_personal.len(),
        }
    }

    fn pane_state(&mut self, pane: Pane) -> &mut TableState {
        match pane {
            Pane::Matches => &mut self.matches_state,
            Pane::Missing => &mut self.missing_state,
            Pane::Unmatched => &mut self.unmatched_state,
        }
    }

    pub fn next(&mut self) {
        let len = self.pane_len(self.pane);
        if len == 0 {
            return;
        }
        let state = self.pane_state(self.pane);
        let i = match state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.pane_len(self.pane);
        if len == 0 {
            return;
        }
        let state = self.pane_state(self.pane);
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn next_pane(&mut self) {
        self.pane = self.pane.next();
    }

    pub fn previous_pane(&mut self) {
        self.pane = self.pane.previous();
    }

    /// Set the decision on the selected match. Only valid on the Matches
    /// pane; other panes ignore it.
    pub fn set_status(&mut self, status: MatchStatus) {
        if self.pane != Pane::Matches {
            return;
        }
        if let Some(i) = self.matches_state.selected() {
            if let Some(m) = self.report.matches.get_mut(i) {
                m.status = status;
                self.status_line = format!(
                    "Match for bank row {} marked {}",
                    m.bank_idx + 1,
                    status_name(status)
                );
            }
        }
    }

    /// Begin manual pairing for the selected missing bank row: jump to the
    /// unmatched pane and wait for Enter.
    pub fn start_manual_pick(&mut self) {
        if self.pane != Pane::Missing {
            return;
        }
        if self.report.unmatched_personal.is_empty() {
            self.status_line = "No unmatched personal records to pair with".to_string();
            return;
        }
        if let Some(i) = self.missing_state.selected() {
            if let Some(&bank_idx) = self.report.missing.get(i) {
                self.manual_pick = Some(bank_idx);
                self.pane = Pane::Unmatched;
                self.status_line = format!(
                    "Pick a personal record for bank row {} (Enter to pair, Esc to cancel)",
                    bank_idx + 1
                );
            }
        }
    }

    /// Complete a manual pick against the selected unmatched personal row.
    pub fn apply_manual_pick(&mut self) {
        let Some(bank_idx) = self.manual_pick else {
            return;
        };
        let Some(sel) = self.unmatched_state.selected() else {
            return;
        };
        let Some(&personal_idx) = self.report.unmatched_personal.get(sel) else {
            return;
        };

        match manual_match(&self.bank, &self.personal, bank_idx, personal_idx, &self.config) {
            Ok(result) => {
                self.report.missing.retain(|&b| b != bank_idx);
                self.report.unmatched_personal.retain(|&p| p != personal_idx);

                let insert_at = self
                    .report
                    .matches
                    .partition_point(|m| m.bank_idx < result.bank_idx);
                self.report.matches.insert(insert_at, result);

                self.manual_pick = None;
                self.pane = Pane::Matches;
                self.matches_state.select(Some(insert_at));
                clamp_selection(&mut self.missing_state, self.report.missing.len());
                clamp_selection(
                    &mut self.unmatched_state,
                    self.report.unmatched_personal.len(),
                );
                self.status_line = format!(
                    "Manually paired bank row {} with personal row {}",
                    bank_idx + 1,
                    personal_idx + 1
                );
            }
            Err(err) => {
                self.manual_pick = None;
                self.status_line = format!("Manual match failed: {err}");
            }
        }
    }

    pub fn cancel_manual_pick(&mut self) {
        if self.manual_pick.take().is_some() {
            self.pane = Pane::Missing;
            self.status_line = "Manual pairing cancelled".to_string();
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_match(&self) -> Option<&statement_recon::MatchResult> {
        self.matches_state
            .selected()
            .and_then(|i| self.report.matches.get(i))
    }

    /// Source lines of personal rows claimed by accepted matches, for the
    /// reconciled write-back.
    pub fn accepted_personal_lines(&self) -> HashSet<usize> {
        self.report
            .matches
            .iter()
            .filter(|m| m.status == MatchStatus::Accepted)
            .filter_map(|m| m.personal_idx)
            .map(|pi| self.personal[pi].line_number)
            .collect()
    }

    pub fn accepted_count(&self) -> usize {
        self.report
            .matches
            .iter()
            .filter(|m| m.status == MatchStatus::Accepted)
            .count()
    }
}

fn clamp_selection(state: &mut TableState, len: usize) {
    match (state.selected(), len) {
        (_, 0) => state.select(None),
        (Some(i), _) if i >= len => state.select(Some(len - 1)),
        (None, _) => state.select(Some(0)),
        _ => {}
    }
}

fn status_name(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::Pending => "pending",
        MatchStatus::Accepted => "accepted",
        MatchStatus::Rejected => "rejected",
    }
}

// ============================================================================
// TERMINAL LOOP
// ============================================================================

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
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Esc => {
                    if app.manual_pick.is_some() {
                        app.cancel_manual_pick();
                    } else {
                        return Ok(());
                    }
                }
                KeyCode::Char('s') => {
                    app.save_requested = true;
                    return Ok(());
                }
                KeyCode::Tab => app.next_pane(),
                KeyCode::BackTab => app.previous_pane(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::Char('a') => app.set_status(MatchStatus::Accepted),
                KeyCode::Char('r') => app.set_status(MatchStatus::Rejected),
                KeyCode::Char('p') => app.set_status(MatchStatus::Pending),
                KeyCode::Char('m') => app.start_manual_pick(),
                KeyCode::Char('d') => app.toggle_detail(),
                KeyCode::Enter => {
                    if app.manual_pick.is_some() && app.pane == Pane::Unmatched {
                        app.apply_manual_pick();
                    } else if app.pane == Pane::Matches {
                        app.toggle_detail();
                    }
                }
                _ => {}
            }
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with pane tabs
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.pane == Pane::Matches {
        let content = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        render_matches(f, content[0], app);
        render_detail(f, content[1], app);
    } else {
        match app.pane {
            Pane::Matches => render_matches(f, chunks[1], app),
            Pane::Missing => render_missing(f, chunks[1], app),
            Pane::Unmatched => render_unmatched(f, chunks[1], app),
        }
    }

    render_footer(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let accepted = app.accepted_count();
    let tabs: Vec<Span> = [Pane::Matches, Pane::Missing, Pane::Unmatched]
        .iter()
        .flat_map(|pane| {
            let style = if *pane == app.pane {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            [
                Span::styled(format!(" {} ({}) ", pane.title(), app.pane_len(*pane)), style),
                Span::raw("|"),
            ]
        })
        .collect();

    let mut line = vec![Span::styled(
        "Statement Reconciliation ",
        Style::default().add_modifier(Modifier::BOLD),
    )];
    line.extend(tabs);
    line.push(Span::raw(format!(" accepted: {accepted}")));

    let header = Paragraph::new(Line::from(line)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn tier_style(tier: ConfidenceTier) -> Style {
    match tier {
        ConfidenceTier::High => Style::default().fg(Color::Green),
        ConfidenceTier::Medium => Style::default().fg(Color::Yellow),
        ConfidenceTier::Low => Style::default().fg(Color::DarkGray),
        ConfidenceTier::None => Style::default().fg(Color::Red),
    }
}

fn strategy_name(strategy: MatchStrategy) -> &'static str {
    match strategy {
        MatchStrategy::Intelligent => "intelligent",
        MatchStrategy::Fuzzy => "fuzzy",
        MatchStrategy::Manual => "manual",
    }
}

fn render_matches(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .report
        .matches
        .iter()
        .map(|m| {
            let bank_tx = &app.bank[m.bank_idx];
            let (personal_date, personal_desc) = match m.personal_idx {
                Some(pi) => {
                    let tx = &app.personal[pi];
                    (tx.date.to_string(), tx.description.clone())
                }
                None => ("-".to_string(), "(no match)".to_string()),
            };

            let status_cell = match m.status {
                MatchStatus::Accepted => {
                    Cell::from("accepted").style(Style::default().fg(Color::Green))
                }
                MatchStatus::Rejected => {
                    Cell::from("rejected").style(Style::default().fg(Color::Red))
                }
                MatchStatus::Pending => Cell::from("pending"),
            };

            Row::new(vec![
                Cell::from(m.tier.name().to_string()).style(tier_style(m.tier)),
                Cell::from(format!("{:.2}", m.confidence)),
                status_cell,
                Cell::from(bank_tx.date.to_string()),
                Cell::from(format!("${}", bank_tx.amount)),
                Cell::from(bank_tx.description.clone()),
                Cell::from(personal_date),
                Cell::from(personal_desc),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(5),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Percentage(25),
            Constraint::Length(10),
            Constraint::Percentage(25),
        ],
    )
    .header(
        Row::new(vec![
            "Tier", "Conf", "Status", "Date", "Amount", "Bank", "Date", "Personal",
        ])
        .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title("Matches"))
    .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    f.render_stateful_widget(table, area, &mut app.matches_state);
}

fn transaction_rows<'a>(indices: &'a [usize], transactions: &'a [Transaction]) -> Vec<Row<'a>> {
    indices
        .iter()
        .map(|&idx| {
            let tx = &transactions[idx];
            Row::new(vec![
                Cell::from(tx.date.to_string()),
                Cell::from(format!("${}", tx.amount)),
                Cell::from(tx.description.clone()),
            ])
        })
        .collect()
}

fn render_missing(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = transaction_rows(&app.report.missing, &app.bank);
    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Percentage(70),
        ],
    )
    .header(
        Row::new(vec!["Date", "Amount", "Description"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Bank rows missing from personal records (m = pair manually)"),
    )
    .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    f.render_stateful_widget(table, area, &mut app.missing_state);
}

fn render_unmatched(f: &mut Frame, area: Rect, app: &mut App) {
    let title = if app.manual_pick.is_some() {
        "Pick a personal record (Enter to pair, Esc to cancel)"
    } else {
        "Personal rows no bank row claimed"
    };

    let rows = transaction_rows(&app.report.unmatched_personal, &app.personal);
    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Percentage(70),
        ],
    )
    .header(
        Row::new(vec!["Date", "Amount", "Description"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title(title))
    .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    f.render_stateful_widget(table, area, &mut app.unmatched_state);
}

fn render_detail(f: &mut Frame, area: Rect, app: &App) {
    let mut lines: Vec<Line> = Vec::new();

    if let Some(m) = app.selected_match() {
        let bank_tx = &app.bank[m.bank_idx];
        lines.push(Line::from(Span::styled(
            "Bank",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(format!("  date:   {}", bank_tx.date)));
        lines.push(Line::from(format!("  amount: ${}", bank_tx.amount)));
        lines.push(Line::from(format!("  desc:   {}", bank_tx.description)));
        lines.push(Line::from(""));

        if let Some(pi) = m.personal_idx {
            let personal_tx = &app.personal[pi];
            lines.push(Line::from(Span::styled(
                "Personal",
                Style::default().add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(format!("  date:   {}", personal_tx.date)));
            lines.push(Line::from(format!("  amount: ${}", personal_tx.amount)));
            lines.push(Line::from(format!("  desc:   {}", personal_tx.description)));
            lines.push(Line::from(format!("  line:   {}", personal_tx.line_number)));
            lines.push(Line::from(""));
        }

        lines.push(Line::from(format!(
            "confidence: {:.4} ({})",
            m.confidence,
            m.tier.name()
        )));
        lines.push(Line::from(format!("strategy:   {}", strategy_name(m.strategy))));
        lines.push(Line::from(format!("status:     {}", status_name(m.status))));
        lines.push(Line::from(format!("reason:     {}", m.reason)));
    } else {
        lines.push(Line::from("No match selected"));
    }

    let detail =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Detail"));
    f.render_widget(detail, area);
}

fn render_footer(f: &mut Frame, area: Rect, app: &App) {
    let help = "Tab panes | j/k move | a accept | r reject | p pending | m manual | d detail | s save+quit | q quit";
    let text = if app.status_line.is_empty() {
        help.to_string()
    } else {
        format!("{} — {}", app.status_line, help)
    };

    let footer = Paragraph::new(text).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use statement_recon::{reconcile, Source};

    fn tx(source: Source, day: u32, cents: i64, description: &str, line: usize) -> Transaction {
        Transaction::new(
            source,
            NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            Decimal::new(cents, 2),
            description.to_string(),
        )
        .with_line_number(line)
    }

    fn fixture() -> App {
        let bank = vec![
            tx(Source::Bank, 15, -4250, "trader joes #123", 2),
            tx(Source::Bank, 16, -999, "parking garage", 3),
        ];
        let mut personal = vec![
            tx(Source::Personal, 15, -4250, "trader joes #123", 2),
            // Far outside any date window so it stays unmatched
            tx(Source::Personal, 10, -1500, "book store", 3),
        ];
        let config = MatchConfig::default();
        let report = reconcile(&bank, &mut personal, &config).unwrap();
        App::new(bank, personal, report, config)
    }

    #[test]
    fn test_fixture_shape() {
        let app = fixture();
        assert_eq!(app.report.matches.len(), 1);
        assert_eq!(app.report.missing, vec![1]);
        assert_eq!(app.report.unmatched_personal, vec![1]);
    }

    #[test]
    fn test_accept_and_reject_selected_match() {
        let mut app = fixture();

        app.set_status(MatchStatus::Accepted);
        assert_eq!(app.report.matches[0].status, MatchStatus::Accepted);
        assert_eq!(app.accepted_count(), 1);

        app.set_status(MatchStatus::Rejected);
        assert_eq!(app.report.matches[0].status, MatchStatus::Rejected);
        assert_eq!(app.accepted_count(), 0);
    }

    #[test]
    fn test_status_keys_ignored_outside_matches_pane() {
        let mut app = fixture();
        app.pane = Pane::Missing;
        app.set_status(MatchStatus::Accepted);
        assert_eq!(app.report.matches[0].status, MatchStatus::Pending);
    }

    #[test]
    fn test_accepted_personal_lines() {
        let mut app = fixture();
        assert!(app.accepted_personal_lines().is_empty());

        app.set_status(MatchStatus::Accepted);
        let lines = app.accepted_personal_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines.contains(&2));
    }

    #[test]
    fn test_manual_pick_flow() {
        let mut app = fixture();

        app.pane = Pane::Missing;
        app.start_manual_pick();
        assert_eq!(app.manual_pick, Some(1));
        assert_eq!(app.pane, Pane::Unmatched);

        app.apply_manual_pick();
        assert_eq!(app.manual_pick, None);
        assert_eq!(app.pane, Pane::Matches);
        assert_eq!(app.report.matches.len(), 2);
        assert!(app.report.missing.is_empty());
        assert!(app.report.unmatched_personal.is_empty());

        let manual = app
            .report
            .matches
            .iter()
            .find(|m| m.strategy == MatchStrategy::Manual)
            .expect("manual match present");
        assert_eq!(manual.bank_idx, 1);
        assert_eq!(manual.personal_idx, Some(1));
        assert_eq!(manual.status, MatchStatus::Pending);
    }

    #[test]
    fn test_manual_pick_cancel() {
        let mut app = fixture();
        app.pane = Pane::Missing;
        app.start_manual_pick();
        app.cancel_manual_pick();

        assert_eq!(app.manual_pick, None);
        assert_eq!(app.pane, Pane::Missing);
        assert_eq!(app.report.matches.len(), 1);
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = fixture();
        app.pane = Pane::Matches;
        assert_eq!(app.matches_state.selected(), Some(0));

        app.next();
        assert_eq!(app.matches_state.selected(), Some(0)); // single row wraps onto itself

        app.pane = Pane::Missing;
        app.previous();
        assert_eq!(app.missing_state.selected(), Some(0));
    }

    #[test]
    fn test_pane_cycle() {
        let mut app = fixture();
        assert_eq!(app.pane, Pane::Matches);
        app.next_pane();
        assert_eq!(app.pane, Pane::Missing);
        app.next_pane();
        assert_eq!(app.pane, Pane::Unmatched);
        app.next_pane();
        assert_eq!(app.pane, Pane::Matches);
        app.previous_pane();
        assert_eq!(app.pane, Pane::Unmatched);
    }
}

use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, Tabs};

use crate::events::{ServerEvent, Severity};
use crate::server::{EntityInfo, ServerStats};

const MAX_LOG_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Overview,
    Entities,
    Log,
}

impl Tab {
    const ALL: [Tab; 3] = [Tab::Overview, Tab::Entities, Tab::Log];

    fn title(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::Entities => "Entities",
            Tab::Log => "Log",
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|&t| t == self).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
struct LogLine {
    severity: Severity,
    text: String,
}

#[derive(Debug)]
pub struct TuiState {
    tab: Tab,
    log: VecDeque<LogLine>,
    /// Lines scrolled up from the bottom of the log.
    scroll: usize,
}

impl Default for TuiState {
    fn default() -> Self {
        Self::new()
    }
}

impl TuiState {
    pub fn new() -> Self {
        Self {
            tab: Tab::Overview,
            log: VecDeque::new(),
            scroll: 0,
        }
    }

    pub fn active_tab(&self) -> Tab {
        self.tab
    }

    pub fn next_tab(&mut self) {
        self.tab = Tab::ALL[(self.tab.index() + 1) % Tab::ALL.len()];
    }

    pub fn prev_tab(&mut self) {
        self.tab = Tab::ALL[(self.tab.index() + Tab::ALL.len() - 1) % Tab::ALL.len()];
    }

    pub fn scroll_up(&mut self) {
        self.scroll = (self.scroll + 10).min(self.log.len().saturating_sub(1));
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(10);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }

    pub fn log_info(&mut self, text: impl Into<String>) {
        self.push(Severity::Info, text.into());
    }

    pub fn log_warn(&mut self, text: impl Into<String>) {
        self.push(Severity::Warn, text.into());
    }

    pub fn log_event(&mut self, event: &ServerEvent) {
        self.push(event.severity(), event.to_string());
    }

    fn push(&mut self, severity: Severity, text: String) {
        if self.log.len() == MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(LogLine { severity, text });
    }
}

pub fn render(frame: &mut Frame, state: &TuiState, stats: &ServerStats, entities: &[EntityInfo]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], stats);
    render_tabs(frame, chunks[1], state.tab);
    match state.tab {
        Tab::Overview => render_overview(frame, chunks[2], stats),
        Tab::Entities => render_entities(frame, chunks[2], entities),
        Tab::Log => render_log(frame, chunks[2], state),
    }
    render_help(frame, chunks[3]);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let title = format!(" Hopper Server - Uptime: {} ", format_duration(stats.uptime_secs));
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let text = format!(
        "Tick: {}  |  Peers: {}  |  Entities: {}/{}",
        stats.tick, stats.peer_count, stats.entity_count, stats.capacity
    );
    frame.render_widget(
        Paragraph::new(text)
            .block(block)
            .style(Style::default().fg(Color::White)),
        area,
    );
}

fn render_tabs(frame: &mut Frame, area: Rect, active: Tab) {
    let tabs = Tabs::new(Tab::ALL.iter().map(|tab| tab.title()))
        .block(Block::default().borders(Borders::ALL))
        .select(active.index())
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, area);
}

fn render_overview(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let ratio = if stats.capacity == 0 {
        0.0
    } else {
        stats.entity_count as f64 / stats.capacity as f64
    };
    let gauge = Gauge::default()
        .block(
            Block::default()
                .title(" Slots ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Green)),
        )
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio.min(1.0))
        .label(format!("{}/{} entities", stats.entity_count, stats.capacity));
    frame.render_widget(gauge, chunks[0]);

    let net = &stats.network_stats;
    let counters = &stats.counters;
    let lines = vec![
        stat_line(
            "Packets: ",
            format!("{} sent / {} recv", net.packets_sent, net.packets_received),
        ),
        stat_line(
            "Bytes: ",
            format!(
                "{} sent / {} recv",
                format_bytes(net.bytes_sent),
                format_bytes(net.bytes_received)
            ),
        ),
        stat_line(
            "Reliability: ",
            format!(
                "{} resends, {} stale, {} invalid",
                net.resends, net.dropped_stale, net.dropped_invalid
            ),
        ),
        stat_line(
            "Sessions: ",
            format!(
                "{} joined, {} left, {} refused",
                counters.connects, counters.disconnects, counters.refused
            ),
        ),
        stat_line(
            "Updates: ",
            format!(
                "{} broadcast, {} corrections, {} bad packets",
                counters.updates_sent, counters.corrections, counters.protocol_errors
            ),
        ),
    ];

    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    frame.render_widget(Paragraph::new(lines).block(block), chunks[1]);
}

fn stat_line(label: &'static str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(label, Style::default().fg(Color::Gray)),
        Span::styled(value, Style::default().fg(Color::White)),
    ])
}

fn render_entities(frame: &mut Frame, area: Rect, entities: &[EntityInfo]) {
    let header = Row::new(["Id", "Peer", "Position", "Yaw", "Phase", "RTT"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let rows = entities.iter().map(|entity| {
        Row::new([
            Cell::from(entity.id.to_string()),
            Cell::from(entity.peer.to_string()),
            Cell::from(format!(
                "{:.1} {:.1} {:.1}",
                entity.position.x, entity.position.y, entity.position.z
            )),
            Cell::from(format!("{:.0}°", entity.rotation.to_degrees())),
            Cell::from(format!("{:?}", entity.phase)),
            Cell::from(format!("{}ms", entity.rtt.as_millis())),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(10),
            Constraint::Length(22),
            Constraint::Length(6),
            Constraint::Length(10),
            Constraint::Min(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .title(format!(" Entities ({}) ", entities.len()))
            .borders(Borders::ALL),
    );
    frame.render_widget(table, area);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let visible = area.height.saturating_sub(2) as usize;
    let end = state.log.len().saturating_sub(state.scroll);
    let start = end.saturating_sub(visible);

    let lines: Vec<Line> = state
        .log
        .range(start..end)
        .map(|line| {
            let color = match line.severity {
                Severity::Info => Color::White,
                Severity::Warn => Color::Yellow,
                Severity::Error => Color::Red,
            };
            Line::from(Span::styled(line.text.as_str(), Style::default().fg(color)))
        })
        .collect();

    let block = Block::default().title(" Log ").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new("q/Esc quit  |  Tab switch view  |  PgUp/PgDn/End scroll log")
        .block(block)
        .style(
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        );
    frame.render_widget(text, area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

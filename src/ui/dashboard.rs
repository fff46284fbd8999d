use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph, Row, Table},
    Terminal,
};
use relaypulse::aggregator::{ChainRow, MetricsHandle};
use relaypulse::network::Network;
use relaypulse::pipeline::PipelineEvent;
use relaypulse::store::MetricsSnapshot;

const MAX_EVENTS: usize = 100;

pub fn run_dashboard(
    handle: MetricsHandle,
    events_tx: Sender<PipelineEvent>,
    status: Receiver<String>,
    stop: Arc<AtomicBool>,
    initial: Network,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut selected = initial;
    let mut logs: Vec<String> = Vec::new();
    let mut log_scroll: usize = 0;

    while !stop.load(Ordering::Relaxed) {
        while let Ok(ev) = status.try_recv() {
            logs.push(ev);
            if logs.len() > MAX_EVENTS {
                logs.remove(0);
            }
        }

        let snapshot = handle.snapshot();
        let rows = handle.chain_rows(selected);

        terminal.draw(|f| {
            let outer = Layout::default()
                .direction(Direction::Vertical)
                .constraints(
                    [Constraint::Length(5), Constraint::Min(6), Constraint::Length(6), Constraint::Length(1)].as_ref(),
                )
                .split(f.size());

            let totals = Paragraph::new(totals_text(&snapshot))
                .block(Block::default().title(format!("{selected} throughput")).borders(Borders::ALL));
            f.render_widget(totals, outer[0]);

            let table_rows: Vec<Row> = rows.iter().map(|r| Row::new(row_cells(r))).collect();
            let widths = [
                Constraint::Percentage(28),
                Constraint::Percentage(18),
                Constraint::Percentage(18),
                Constraint::Percentage(18),
                Constraint::Percentage(18),
            ];
            let table = Table::new(table_rows, widths)
                .header(
                    Row::new(vec!["Chain", "Block", "TPS", "MB/s", "Authorities"])
                        .style(Style::default().add_modifier(Modifier::BOLD)),
                )
                .block(Block::default().title("Chains").borders(Borders::ALL));
            f.render_widget(table, outer[1]);

            let log_items: Vec<ListItem> =
                logs.iter().rev().skip(log_scroll).map(|l| ListItem::new(l.clone())).collect();
            let log_list = List::new(log_items).block(Block::default().title("Events").borders(Borders::ALL));
            f.render_widget(log_list, outer[2]);

            let footer = Paragraph::new("Tab: switch network | q: quit | ↑/↓/Home: scroll events | c: clear events");
            f.render_widget(footer, outer[3]);
        })?;

        if event::poll(Duration::from_millis(200))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q')
                    || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
                {
                    stop.store(true, Ordering::Relaxed);
                } else {
                    match key.code {
                        KeyCode::Tab => {
                            selected = selected.toggle();
                            if events_tx.send(PipelineEvent::Select(selected)).is_err() {
                                stop.store(true, Ordering::Relaxed);
                            }
                        }
                        KeyCode::Up => log_scroll = (log_scroll + 1).min(logs.len().saturating_sub(1)),
                        KeyCode::Down => log_scroll = log_scroll.saturating_sub(1),
                        KeyCode::Home => log_scroll = 0,
                        KeyCode::Char('c') => {
                            logs.clear();
                            log_scroll = 0;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn totals_text(snapshot: &MetricsSnapshot) -> String {
    let ratios = snapshot.ratios();
    format!(
        "TPS:    {:>10.2}  {}\nMGas/s: {:>10.2}  {}\nMB/s:   {:>10.2}  {}",
        snapshot.aggregate.tps,
        ratios.tps,
        snapshot.aggregate.mgas,
        ratios.mgas,
        snapshot.aggregate.mbps,
        ratios.mbps,
    )
}

fn row_cells(row: &ChainRow) -> Vec<String> {
    let name = row.identity.name.clone();
    match &row.latest {
        None => vec![name, "--".into(), "--".into(), "--".into(), "--".into()],
        Some(record) => vec![
            name,
            record.block_number.to_string(),
            format!("{:.2}", row.rates.tps),
            format!("{:.3}", row.rates.mbps),
            record.authorities.map(|a| a.to_string()).unwrap_or_else(|| "?".into()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaypulse::network::{ChainIdentity, ChainKey};
    use relaypulse::rates::Rates;
    use relaypulse::recorder::BlockRecord;

    fn row(latest: Option<BlockRecord>) -> ChainRow {
        ChainRow {
            identity: ChainIdentity { network: Network::Kusama, name: "Karura".into(), para_id: 2000 },
            latest,
            rates: Rates { tps: 1.5, mbps: 0.25, mgas: 3.0 },
        }
    }

    #[test]
    fn row_without_data_shows_placeholders() {
        assert_eq!(row_cells(&row(None)), vec!["Karura", "--", "--", "--", "--"]);
    }

    #[test]
    fn row_with_unknown_authorities() {
        let record = BlockRecord {
            key: ChainKey::new(Network::Kusama, 2000),
            block_number: 42,
            timestamp: 0,
            extrinsics: 11,
            proof_size: 0.0,
            block_time_secs: 12.0,
            authorities: None,
        };
        assert_eq!(row_cells(&row(Some(record))), vec!["Karura", "42", "1.50", "0.250", "?"]);
    }

    #[test]
    fn totals_show_unavailable_ratio() {
        let snap = MetricsSnapshot {
            network: Network::Polkadot,
            aggregate: Rates { tps: 10.0, mbps: 1.0, mgas: 12.0 },
            baseline: Rates { tps: 0.0, mbps: 0.5, mgas: 6.0 },
        };
        let text = totals_text(&snap);
        assert!(text.lines().next().unwrap().ends_with("n/a"));
        assert!(text.contains("x2.00"));
    }
}

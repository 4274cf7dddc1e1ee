//! Device table: one row per adapter, columns from the link profile.

use std::collections::HashMap;

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::text::Span;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, TableState};

use crate::fmt::format_time;
use crate::model::{CounterValue, DeviceSnapshot, RateRecord, RateUnit};
use crate::profile::{CellSource, LinkProfile};
use crate::tui::state::AppState;
use crate::tui::style::Styles;

/// Gap between table columns.
const COLUMN_SPACING: u16 = 1;

/// Splits `available` cells proportionally to `weights`.
///
/// Rounding leftovers go to the column with the largest weight (the first
/// one on ties), so the widths always sum to `available`.
pub fn weighted_widths(weights: &[u16], available: u16) -> Vec<u16> {
    let total: u32 = weights.iter().map(|&w| w as u32).sum();
    if total == 0 {
        return vec![0; weights.len()];
    }
    let mut widths: Vec<u16> = weights
        .iter()
        .map(|&w| (available as u32 * w as u32 / total) as u16)
        .collect();
    let used: u16 = widths.iter().sum();
    let widest = weights
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.cmp(b).then(ib.cmp(ia)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    widths[widest] += available - used;
    widths
}

fn counter_cell(value: Option<CounterValue>) -> String {
    match value {
        Some(CounterValue::Count(v)) => v.to_string(),
        Some(CounterValue::Gauge(v)) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}

fn rate_cell(record: Option<&RateRecord>) -> String {
    match record {
        Some(r) if r.unit == RateUnit::Gbps => format!("{:.2}", r.value),
        Some(r) => format!("{:.0}", r.value),
        None => "-".to_string(),
    }
}

/// Builds the text cells of one table, in column order.
pub fn build_rows(
    snapshots: &[&DeviceSnapshot],
    rates: &[RateRecord],
    profile: &LinkProfile,
) -> Vec<Vec<String>> {
    let by_key: HashMap<(&str, &str), &RateRecord> = rates
        .iter()
        .map(|r| ((r.device.as_str(), r.counter.as_str()), r))
        .collect();

    snapshots
        .iter()
        .map(|snap| {
            profile
                .columns
                .iter()
                .map(|col| match col.source {
                    CellSource::DeviceName => snap.device.name.clone(),
                    CellSource::Counter(counter) => counter_cell(snap.value(counter)),
                    CellSource::Rate(counter) => {
                        rate_cell(by_key.get(&(snap.name(), counter)).copied())
                    }
                    CellSource::Time => format_time(snap.timestamp_ns),
                })
                .collect()
        })
        .collect()
}

/// Renders one bordered table per link layer present.
pub fn render_devices(frame: &mut Frame, area: Rect, state: &AppState) {
    let groups = state.groups();
    if groups.is_empty() {
        let text = match &state.last_error {
            Some(err) => Span::styled(err.clone(), Styles::critical()),
            None => Span::styled("No active adapters", Styles::dim()),
        };
        frame.render_widget(
            Paragraph::new(text).block(Block::default().borders(Borders::ALL)),
            area,
        );
        return;
    }

    let mut constraints: Vec<Constraint> = groups
        .iter()
        .map(|g| Constraint::Length(g.snapshots.len() as u16 + 3))
        .collect();
    constraints.push(Constraint::Min(0));
    let chunks = Layout::vertical(constraints).split(area);

    let mut offset = 0;
    for (group, chunk) in groups.iter().zip(chunks.iter()) {
        let columns = group.profile.columns;
        let spacing = COLUMN_SPACING * columns.len().saturating_sub(1) as u16;
        let available = chunk.width.saturating_sub(2 + spacing);
        let weights: Vec<u16> = columns.iter().map(|c| c.weight).collect();
        let widths: Vec<Constraint> = weighted_widths(&weights, available)
            .into_iter()
            .map(Constraint::Length)
            .collect();

        let header = Row::new(columns.iter().map(|c| c.title)).style(Styles::table_header());
        let rows = build_rows(&group.snapshots, &state.rates, group.profile)
            .into_iter()
            .map(Row::new);

        let title = Span::styled(format!(" {} ", group.profile.link_layer), Styles::title());
        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(COLUMN_SPACING)
            .block(Block::default().borders(Borders::ALL).title(title))
            .row_highlight_style(Styles::selected());

        let count = group.snapshots.len();
        let selected = (state.selected >= offset && state.selected < offset + count)
            .then(|| state.selected - offset);
        let mut table_state = TableState::default().with_selected(selected);
        frame.render_stateful_widget(table, *chunk, &mut table_state);
        offset += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CounterSample, Device, LinkLayer};
    use crate::profile::{ETHERNET, INFINIBAND};

    #[test]
    fn test_weighted_widths_sum() {
        let weights: Vec<u16> = ETHERNET.columns.iter().map(|c| c.weight).collect();
        for available in [0u16, 37, 120, 213] {
            let widths = weighted_widths(&weights, available);
            assert_eq!(widths.len(), weights.len());
            assert_eq!(widths.iter().sum::<u16>(), available);
        }
    }

    #[test]
    fn test_weighted_widths_remainder_to_widest() {
        assert_eq!(weighted_widths(&[1, 2, 1], 10), vec![2, 6, 2]);
        // ties go to the first widest column
        assert_eq!(weighted_widths(&[2, 2], 5), vec![3, 2]);
        assert_eq!(weighted_widths(&[0, 0], 5), vec![0, 0]);
        assert!(weighted_widths(&[], 5).is_empty());
    }

    fn ib_snapshot() -> DeviceSnapshot {
        let mut device = Device::new("mlx5_0");
        device.link_layer = LinkLayer::InfiniBand;
        let mut snap = DeviceSnapshot::new(device, 1_700_000_000_000_000_000);
        for s in [
            CounterSample::count("mlx5_0", "portSpeed", 400_000),
            CounterSample::count("mlx5_0", "QPNum", 2),
        ] {
            snap.counters.insert(s.counter.clone(), s);
        }
        snap
    }

    #[test]
    fn test_build_rows_infiniband() {
        let snap = ib_snapshot();
        let rates = vec![
            RateRecord {
                device: "mlx5_0".into(),
                counter: "port_rcv_data".into(),
                value: 12.3456,
                unit: RateUnit::Gbps,
                counter_reset: false,
            },
            RateRecord {
                device: "mlx5_0".into(),
                counter: "out_of_sequence".into(),
                value: 7.0,
                unit: RateUnit::Delta,
                counter_reset: false,
            },
        ];
        let rows = build_rows(&[&snap], &rates, &INFINIBAND);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.len(), INFINIBAND.columns.len());
        assert_eq!(row[0], "mlx5_0");
        assert_eq!(row[1], "400000");
        assert_eq!(row[2], "12.35");
        assert_eq!(row[3], "-");
        assert_eq!(row[4], "7");
        assert_eq!(row[5], "2");
        assert_eq!(row[6], "-");
        assert_eq!(row[7].len(), 8);
    }

    #[test]
    fn test_build_rows_ignores_other_devices_rates() {
        let snap = ib_snapshot();
        let rates = vec![RateRecord {
            device: "mlx5_1".into(),
            counter: "port_rcv_data".into(),
            value: 1.0,
            unit: RateUnit::Gbps,
            counter_reset: false,
        }];
        let rows = build_rows(&[&snap], &rates, &INFINIBAND);
        assert_eq!(rows[0][2], "-");
    }
}

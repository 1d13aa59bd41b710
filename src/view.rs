// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Console vehicle list.
//!
//! The view owns the collection it displays and is only ever touched from the
//! console loop. It re-binds to each snapshot the monitor publishes.

use chrono::Local;
use location_client::{LocationRecord, MonitorEvent, SchedulerState, Snapshot};

const HEADERS: [&str; 7] = ["Terminal", "Plate", "Latitude", "Longitude", "Speed", "Dir", "GPS Time"];

/// Vehicle table bound to the latest published snapshot.
#[derive(Debug, Default)]
pub struct VehicleTable {
    rows: Option<Snapshot>,
    /// Re-render the full table on every snapshot instead of a one-line summary
    verbose: bool,
}

impl VehicleTable {
    pub fn new(verbose: bool) -> Self {
        Self { rows: None, verbose }
    }

    /// Number of vehicles currently displayed
    pub fn len(&self) -> usize {
        self.rows.as_ref().map_or(0, |rows| rows.len())
    }

    /// Apply one monitor event and return the text to show, if any
    pub fn apply(&mut self, event: MonitorEvent) -> Option<String> {
        match event {
            MonitorEvent::Snapshot(snapshot) => {
                self.rows = Some(snapshot);
                if self.verbose {
                    Some(self.render())
                } else {
                    Some(format!(
                        "[{}] {} vehicle(s) in list",
                        Local::now().format("%H:%M:%S"),
                        self.len()
                    ))
                }
            }
            MonitorEvent::EntityLocated(record) => Some(format_located(&record)),
            MonitorEvent::Notice(notice) => Some(format!("[{}] {}", notice.entity_id, notice.text)),
            MonitorEvent::SchedulerStateChanged(state) => match state {
                SchedulerState::Running => Some("Automatic location polling started".to_string()),
                SchedulerState::Stopped => Some("Automatic location polling stopped".to_string()),
                SchedulerState::Idle | SchedulerState::Cancelling => None,
            },
        }
    }

    /// Render the bound collection as an aligned text table
    pub fn render(&self) -> String {
        let rows: Vec<[String; 7]> = self
            .rows
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(row_cells)
            .collect();

        let mut widths = HEADERS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        push_line(&mut out, &HEADERS.map(str::to_string), &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(rule.join("  ").as_str());
        out.push('\n');
        for row in &rows {
            push_line(&mut out, row, &widths);
        }
        if rows.is_empty() {
            out.push_str("(no vehicles)\n");
        }
        out
    }
}

fn push_line(out: &mut String, cells: &[String; 7], widths: &[usize; 7]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

fn row_cells(record: &LocationRecord) -> [String; 7] {
    [
        record.entity_id.to_string(),
        record.plate.clone().unwrap_or_else(|| "-".to_string()),
        fmt_f64(record.latitude, 6),
        fmt_f64(record.longitude, 6),
        fmt_f64(record.speed, 1),
        fmt_f64(record.direction, 0),
        record.gps_time.clone().unwrap_or_else(|| "-".to_string()),
    ]
}

fn fmt_f64(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.precision$}"))
}

fn format_located(record: &LocationRecord) -> String {
    match (record.latitude, record.longitude) {
        (Some(lat), Some(lon)) => format!(
            "Located {} at {lat:.6}, {lon:.6}; centring map",
            record.entity_id
        ),
        _ => format!("Located {} (no position fix)", record.entity_id),
    }
}

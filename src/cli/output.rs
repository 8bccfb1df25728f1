//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::application::SheepReport;
use crate::domain::models::SheepStatus;

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Render sheep reports as a table
pub fn sheep_table(reports: &[SheepReport]) -> String {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Type").add_attribute(Attribute::Bold),
        Cell::new("Port").add_attribute(Attribute::Bold),
        Cell::new("Devices").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Model").add_attribute(Attribute::Bold),
    ]);

    for report in reports {
        let devices = if report.devices.is_empty() {
            "-".to_string()
        } else {
            report.devices.join(", ")
        };
        let model = report
            .model
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);

        table.add_row(vec![
            Cell::new(&report.name),
            Cell::new(report.kind.to_string()),
            Cell::new(report.port),
            Cell::new(devices),
            Cell::new(report.status.to_string()).fg(status_color(report.status)),
            Cell::new(model),
        ]);
    }

    table.to_string()
}

const fn status_color(status: SheepStatus) -> Color {
    match status {
        SheepStatus::Running => Color::Green,
        SheepStatus::Starting => Color::Cyan,
        SheepStatus::Failed => Color::Red,
        SheepStatus::Stopped => Color::DarkGrey,
    }
}

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::service::format_duration;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

/// Duration cell colored by the share of the build it took.
pub fn color_coded_duration_cell(seconds: f64, total: f64) -> Cell {
    let share = if total > 0.0 { seconds / total * 100.0 } else { 0.0 };
    let text = format!("{}\n{share:.1}%", format_duration(Some(seconds)));
    if share >= 50.0 {
        Cell::new(text).fg(TableColor::Red)
    } else if share >= 25.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Green)
    }
}

use colored::Colorize;
use comfy_table::{Cell, Color, Table};

use crate::cli::open_workspace;
use crate::error::Result;
use crate::fmt::{display_date, money, parse_amount};
use crate::models::{Record, QUARANTINE_DIR};
use crate::reviewer::RecordFilter;

pub fn pending(query: Option<String>, category: Option<String>) -> Result<()> {
    let ws = open_workspace()?;
    let filter = RecordFilter { query, category };
    let rows = filter.apply(&ws.data().pending());
    if rows.is_empty() {
        println!("No pending records.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Date", "Amount", "Merchant", "Category", "Description"]);
    let mut total = 0.0;
    for (i, r) in &rows {
        total += parse_amount(&r.amount);
        let mut number = Cell::new(i + 1);
        if in_quarantine(r) {
            number = number.fg(Color::Yellow);
        }
        table.add_row(vec![
            number,
            Cell::new(display_date(&r.date)),
            Cell::new(&r.amount),
            Cell::new(&r.merchant),
            Cell::new(&r.category),
            Cell::new(&r.description),
        ]);
    }
    println!("Pending\n{table}");
    println!("{} records, total {}", rows.len(), money(total).bold());
    Ok(())
}

pub fn completed() -> Result<()> {
    let ws = open_workspace()?;
    let records = ws.data().completed();
    if records.is_empty() {
        println!("No completed records.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Date", "Amount", "Merchant", "Category", "Description", "Completed"]);
    let mut total = 0.0;
    for r in &records {
        total += parse_amount(&r.amount);
        let completed = r
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(display_date(&r.date)),
            Cell::new(&r.amount),
            Cell::new(&r.merchant),
            Cell::new(&r.category),
            Cell::new(&r.description),
            Cell::new(completed),
        ]);
    }
    println!("Completed\n{table}");
    println!("{} records, total {}", records.len(), money(total).bold());
    Ok(())
}

fn in_quarantine(record: &Record) -> bool {
    record
        .path
        .parent()
        .and_then(|p| p.file_name())
        .is_some_and(|n| n == QUARANTINE_DIR)
}

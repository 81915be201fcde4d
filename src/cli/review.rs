use colored::Colorize;

use crate::cli::{open_workspace, to_index};
use crate::error::{Result, TallyError};
use crate::reviewer::{self, ManualEntry};

/// Report record numbers the way the user typed them.
fn numbered<T>(result: Result<T>) -> Result<T> {
    result.map_err(|e| match e {
        TallyError::NoSuchRecord(i) => TallyError::NoSuchRecord(i + 1),
        e => e,
    })
}

pub fn categorize(number: usize, category: &str) -> Result<()> {
    let ws = open_workspace()?;
    let record = numbered(reviewer::set_category(&ws, to_index(number)?, category))?;
    println!("#{number} {}: {}", record.merchant, record.description);
    Ok(())
}

pub fn describe(number: usize, text: &str) -> Result<()> {
    let ws = open_workspace()?;
    let record = numbered(reviewer::set_description(&ws, to_index(number)?, text))?;
    println!("#{number} {}: {}", record.merchant, record.description);
    Ok(())
}

pub fn done(numbers: &[usize], category: Option<&str>) -> Result<()> {
    let ws = open_workspace()?;
    let indices = numbers.iter().map(|&n| to_index(n)).collect::<Result<Vec<_>>>()?;
    let done = numbered(reviewer::mark_done_many(&ws, &indices, category))?;
    for r in &done {
        let category = if r.category.is_empty() { "(none)" } else { r.category.as_str() };
        println!("{} {} {} [{category}]", "done".green().bold(), r.merchant, r.amount);
    }
    println!("{} pending, {} completed", ws.data().pending_len(), ws.data().completed_len());
    Ok(())
}

pub fn delete(numbers: &[usize]) -> Result<()> {
    let ws = open_workspace()?;
    let indices = numbers.iter().map(|&n| to_index(n)).collect::<Result<Vec<_>>>()?;
    let report = numbered(reviewer::delete_many(&ws, &indices))?;
    for r in &report.removed {
        println!("{} {} {} {}", "deleted".red().bold(), r.merchant, r.amount, r.filename);
    }
    for (path, err) in &report.kept_files {
        println!("{} could not delete {}: {err}", "warning:".yellow().bold(), path.display());
    }
    println!("{} pending", ws.data().pending_len());
    Ok(())
}

pub fn fix(
    number: usize,
    date: String,
    amount: String,
    merchant: String,
    category: Option<String>,
) -> Result<()> {
    let ws = open_workspace()?;
    let dest_root = ws.settings().screenshot_path();
    let entry = ManualEntry {
        date,
        amount,
        merchant,
        category,
    };
    let (record, report) = numbered(reviewer::resolve_attention(&ws, to_index(number)?, entry, &dest_root))?;
    println!("#{number} {} {} filed at {}", record.merchant, record.amount, record.path.display());
    if report.is_clean() {
        return Ok(());
    }
    for (m, err) in &report.unmoved {
        println!(
            "{} could not move {}: {err}. Run `tally check --repair` later.",
            "warning:".yellow().bold(),
            m.src.display()
        );
    }
    Ok(())
}

pub fn suggest(number: usize) -> Result<()> {
    let ws = open_workspace()?;
    match numbered(reviewer::suggestion_for(&ws, to_index(number)?))? {
        Some(category) => println!("#{number}: {}", category.cyan()),
        None => println!("#{number}: no suggestion yet"),
    }
    Ok(())
}

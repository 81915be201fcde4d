use colored::Colorize;

use crate::cli::open_workspace;
use crate::error::Result;
use crate::fmt::short_digest;
use crate::integrity::{check_pending, repair, PathIssue};

pub fn run(fix: bool) -> Result<()> {
    let ws = open_workspace()?;
    let roots = [ws.settings().search_path(), ws.settings().screenshot_path()];
    let issues = check_pending(&ws.data().pending(), &roots);
    if issues.is_empty() {
        println!("{}", "All pending records point at their screenshots.".green());
        return Ok(());
    }

    let mut repaired = 0;
    for issue in &issues {
        match issue {
            PathIssue::NeedsRepair { found, .. } => {
                println!("{} {} (found at {})", "moved?".yellow().bold(), issue.expected().display(), found.display());
                if fix && repair(issue)? {
                    repaired += 1;
                }
            }
            PathIssue::Missing { .. } => {
                println!(
                    "{} {} ({})",
                    "missing".red().bold(),
                    issue.expected().display(),
                    short_digest(issue.digest())
                );
            }
        }
    }
    println!();
    println!("{} issues, {repaired} repaired", issues.len());
    Ok(())
}

use colored::Colorize;

use crate::cli::saved_settings;
use crate::error::Result;
use crate::settings::{parse_categories, save_settings};

pub fn run(categories: Option<String>, threshold: Option<u32>) -> Result<()> {
    let mut settings = saved_settings()?;
    let changed = categories.is_some() || threshold.is_some();
    if let Some(text) = categories {
        settings.categories = parse_categories(&text);
    }
    if let Some(n) = threshold {
        settings.learning_threshold = n;
    }
    if changed {
        save_settings(&settings)?;
        println!("{}", "Settings saved.".green().bold());
    }

    println!("Categories:   {}", settings.categories.join(", "));
    println!("Threshold:    {}", settings.learning_threshold);
    Ok(())
}

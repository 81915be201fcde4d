mod atomic;
mod cache;
mod categorizer;
mod cli;
mod coordinator;
mod datastore;
mod error;
mod extractor;
mod fmt;
mod hasher;
mod integrity;
mod logging;
mod models;
mod reviewer;
mod settings;
mod store;
mod worker;
mod workspace;

use clap::Parser;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let settings = settings::load_settings();
    let log_file = settings::settings_file_exists().then(|| settings.log_path());
    logging::init(log_file.as_deref());

    let result = match cli.command {
        Some(Commands::Init {
            data_dir,
            search_root,
            screenshot_dir,
        }) => cli::init::run(data_dir, search_root, screenshot_dir),
        Some(Commands::Scan { limit }) => cli::scan::run(limit),
        Some(Commands::Pending { query, category }) => cli::records::pending(query, category),
        Some(Commands::Completed) => cli::records::completed(),
        Some(Commands::Categorize { number, category }) => cli::review::categorize(number, &category),
        Some(Commands::Describe { number, text }) => cli::review::describe(number, &text),
        Some(Commands::Done { numbers, category }) => cli::review::done(&numbers, category.as_deref()),
        Some(Commands::Delete { numbers }) => cli::review::delete(&numbers),
        Some(Commands::Fix {
            number,
            date,
            amount,
            merchant,
            category,
        }) => cli::review::fix(number, date, amount, merchant, category),
        Some(Commands::Suggest { number }) => cli::review::suggest(number),
        Some(Commands::Check { repair }) => cli::check::run(repair),
        Some(Commands::Backup) => cli::backup::run(),
        Some(Commands::Export { output }) => cli::export::run(output),
        Some(Commands::Config { categories, threshold }) => cli::config::run(categories, threshold),
        Some(Commands::Status) | None => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        if e.is_retryable() {
            eprintln!("Nothing was changed on disk; it is safe to run the command again.");
        }
        std::process::exit(1);
    }
}

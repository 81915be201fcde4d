use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::error::{Result, TallyError};
use crate::models::{ExtractionEntry, DEFAULT_AMOUNT, DEFAULT_DATE, FALLBACK_CATEGORY};

pub const UNKNOWN_MERCHANT: &str = "Unknown Merchant";

/// Turns one image into structured fields. Low-confidence output is reported
/// through `needs_attention`, not as an error.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractionEntry>;
}

impl<F> Extractor for F
where
    F: Fn(&Path) -> Result<ExtractionEntry> + Send + Sync,
{
    fn extract(&self, path: &Path) -> Result<ExtractionEntry> {
        self(path)
    }
}

// ---------------------------------------------------------------------------
// Field validation
// ---------------------------------------------------------------------------

/// `DDMMYYYY` naming a real calendar day.
pub fn validate_date(date: &str) -> bool {
    date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && NaiveDate::parse_from_str(date, "%d%m%Y").is_ok()
}

/// `-$D+.DD`, and never the `$0.00` placeholder.
pub fn validate_amount(amount: &str) -> bool {
    if amount == DEFAULT_AMOUNT {
        return false;
    }
    let Some(number) = amount.strip_prefix("-$") else {
        return false;
    };
    match number.split_once('.') {
        Some((whole, cents)) => {
            !whole.is_empty()
                && whole.bytes().all(|b| b.is_ascii_digit())
                && cents.len() == 2
                && cents.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

pub fn validate_merchant(merchant: &str) -> bool {
    let m = merchant.trim();
    !m.is_empty() && m != UNKNOWN_MERCHANT && m.chars().count() >= 2
}

/// Names of the fields that fail validation, in date/amount/merchant order.
pub fn invalid_fields(date: &str, amount: &str, merchant: &str) -> Vec<&'static str> {
    let mut bad = Vec::new();
    if !validate_date(date) {
        bad.push("date");
    }
    if !validate_amount(amount) {
        bad.push("amount");
    }
    if !validate_merchant(merchant) {
        bad.push("merchant");
    }
    bad
}

/// `YYYY-MM` folder name for a valid `DDMMYYYY` date.
pub fn month_folder(date: &str) -> Option<String> {
    if !validate_date(date) {
        return None;
    }
    Some(format!("{}-{}", &date[4..8], &date[2..4]))
}

// ---------------------------------------------------------------------------
// Sidecar text extractor
// ---------------------------------------------------------------------------

const MONTHS: [&str; 12] = ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];

const SUBCATEGORY_KEYWORDS: &[(&str, &str)] = &[
    ("bakery", "Bakery"),
    ("baker", "Bakery"),
    ("delight", "Bakery"),
    ("restaurant", "Restaurants & Dining"),
    ("dining", "Restaurants & Dining"),
    ("cafe", "Restaurants & Dining"),
    ("coffee", "Restaurants & Dining"),
    ("espresso", "Restaurants & Dining"),
    ("health", "Healthcare"),
    ("medical", "Healthcare"),
    ("pharmacy", "Healthcare"),
    ("mobile", "Utilities"),
    ("phone", "Utilities"),
];

const SKIP_PATTERNS: &[&str] = &[
    r"%",
    r"@",
    r"\|",
    r"(?i)westpac",
    r"(?i)account",
    r"(?i)subcategory",
    r"\d{1,2}:\d{2}",
    r"\d{4}-\d{3}",
    r"(?i)(edit|tags|none|time|transaction)$",
    r"^\d+$",
    r"^\W+$",
];

/// Reads the OCR text an external tool left next to the image.
pub struct SidecarExtractor {
    date_re: Regex,
    amount_res: Vec<Regex>,
    number_re: Regex,
    skip_res: Vec<Regex>,
    space_re: Regex,
}

impl SidecarExtractor {
    pub fn new() -> Result<Self> {
        let amount_res = [r"-\$\d+\.\d{2}", r"\$-\d+\.\d{2}", r"-\d+\.\d{2}", r"\d+\.\d{2}"]
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let skip_res = SKIP_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            date_re: Regex::new(
                r"(?i)\b(\d{1,2})\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{4})\b",
            )?,
            amount_res,
            number_re: Regex::new(r"\d+\.\d{2}")?,
            skip_res,
            space_re: Regex::new(r"\s+")?,
        })
    }

    /// `<image>.txt`, or the image path with its extension swapped for `.txt`.
    pub fn sidecar_path(image: &Path) -> Option<PathBuf> {
        let mut appended = image.as_os_str().to_owned();
        appended.push(".txt");
        let appended = PathBuf::from(appended);
        if appended.is_file() {
            return Some(appended);
        }
        let swapped = image.with_extension("txt");
        swapped.is_file().then_some(swapped)
    }

    pub fn parse_text(&self, text: &str) -> ExtractionEntry {
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let merchant = self.merchant(&lines);
        let amount = self.amount(&lines);
        let date = self.date(&lines);
        let subcategory = subcategory(text, &merchant);
        let needs_attention = !invalid_fields(&date, &amount, &merchant).is_empty();
        ExtractionEntry {
            merchant,
            amount,
            date,
            subcategory,
            needs_attention,
            error: None,
        }
    }

    fn merchant(&self, lines: &[&str]) -> String {
        let candidates: Vec<String> = lines
            .iter()
            .filter(|l| !self.skip_res.iter().any(|re| re.is_match(l)))
            .map(|l| {
                self.space_re
                    .replace_all(l, " ")
                    .trim_matches(|c: char| " -_()<>~*".contains(c))
                    .to_string()
            })
            .filter(|m| m.chars().count() >= 3)
            .collect();

        let keyworded = candidates.iter().find(|c| {
            let lower = c.to_lowercase();
            SUBCATEGORY_KEYWORDS.iter().any(|(k, _)| lower.contains(*k))
        });
        keyworded
            .or(candidates.first())
            .cloned()
            .unwrap_or_else(|| UNKNOWN_MERCHANT.to_string())
    }

    fn amount(&self, lines: &[&str]) -> String {
        for re in &self.amount_res {
            for line in lines {
                if let Some(m) = re.find(line) {
                    if let Some(n) = self.number_re.find(m.as_str()) {
                        return format!("-${}", n.as_str());
                    }
                }
            }
        }
        DEFAULT_AMOUNT.to_string()
    }

    fn date(&self, lines: &[&str]) -> String {
        for line in lines {
            if let Some(caps) = self.date_re.captures(line) {
                let day: u32 = caps[1].parse().unwrap_or(0);
                let month = MONTHS
                    .iter()
                    .position(|m| caps[2].eq_ignore_ascii_case(m))
                    .map_or(0, |i| i + 1);
                return format!("{day:02}{month:02}{}", &caps[3]);
            }
        }
        DEFAULT_DATE.to_string()
    }
}

fn subcategory(text: &str, merchant: &str) -> String {
    let text = text.to_lowercase();
    let merchant = merchant.to_lowercase();
    SUBCATEGORY_KEYWORDS
        .iter()
        .find(|(k, _)| merchant.contains(*k) || text.contains(*k))
        .map_or(FALLBACK_CATEGORY, |(_, c)| *c)
        .to_string()
}

impl Extractor for SidecarExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractionEntry> {
        let sidecar = Self::sidecar_path(path)
            .ok_or_else(|| TallyError::Extraction(format!("no OCR text next to {}", path.display())))?;
        let text = std::fs::read_to_string(&sidecar)?;
        let entry = self.parse_text(&text);
        debug!(path = %path.display(), merchant = %entry.merchant, needs_attention = entry.needs_attention, "Extracted");
        Ok(entry)
    }
}

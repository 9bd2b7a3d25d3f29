use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

pub const SCHEMA_PLACEHOLDER: &str = "{database_schema_string}";
pub const DATE_PLACEHOLDER: &str = "{current_date}";

const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub fn load_template(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(anyhow!("Instructions file not found: {}", path.display()));
    }

    let bytes = fs::read(path)
        .map_err(|err| anyhow!("Failed to read instructions file {}: {err}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn render(template: &str, schema: &str, today: Date) -> Result<String> {
    Ok(template
        .replace(SCHEMA_PLACEHOLDER, schema)
        .replace(DATE_PLACEHOLDER, &iso_date(today)?))
}

pub fn iso_date(date: Date) -> Result<String> {
    date.format(ISO_DATE)
        .with_context(|| format!("Failed to format {date} as an ISO date"))
}

/// Local calendar date, falling back to UTC when the offset cannot be determined.
pub fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

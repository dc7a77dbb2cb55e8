use chrono::{Duration, Local, NaiveDate, NaiveDateTime};

use crate::error::LangError;

/// Parse a date-literal body into a timestamp. Accepts a few fixed formats
/// plus the relative words the original notation supported.
pub fn parse_date(text: &str) -> Result<NaiveDateTime, LangError> {
    let text = text.trim();
    let today = Local::now().naive_local().date();

    match text.to_ascii_lowercase().as_str() {
        "now" => return Ok(Local::now().naive_local()),
        "today" => return Ok(start_of(today)),
        "yesterday" => return Ok(start_of(today - Duration::days(1))),
        "tomorrow" => return Ok(start_of(today + Duration::days(1))),
        _ => {}
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return Ok(start_of(d));
        }
    }

    Err(LangError::Domain(format!(
        "could not parse \"{}\" as a date",
        text
    )))
}

fn start_of(d: NaiveDate) -> NaiveDateTime {
    d.and_hms_opt(0, 0, 0).expect("midnight is always valid")
}

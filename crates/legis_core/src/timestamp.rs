//! Source timestamps come either as RFC 3339 (`2009-01-28T18:41:00-05:00`) or
//! as bare dates (`2009-01-06`). Documents store them as RFC 3339 in UTC.

use crate::error::ParseError;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

pub fn parse(value: &str) -> Result<OffsetDateTime, ParseError> {
    let trimmed = value.trim();
    if let Ok(datetime) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(datetime);
    }
    if let Ok(datetime) = PrimitiveDateTime::parse(
        trimmed,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Ok(datetime.assume_utc());
    }
    if let Ok(date) = Date::parse(trimmed, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_utc());
    }
    Err(ParseError::Datetime {
        value: value.to_string(),
    })
}

pub fn to_utc_string(datetime: OffsetDateTime) -> Result<String, ParseError> {
    datetime
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|_| ParseError::Datetime {
            value: datetime.to_string(),
        })
}

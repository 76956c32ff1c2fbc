use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// Milliseconds since the unix epoch, treating the value as UTC.
pub(crate) fn unix_millis(value: PrimitiveDateTime) -> i64 {
    (value.assume_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_unix_millis(millis: i64) -> PrimitiveDateTime {
    let value = OffsetDateTime::UNIX_EPOCH + Duration::milliseconds(millis);
    PrimitiveDateTime::new(value.date(), value.time())
}

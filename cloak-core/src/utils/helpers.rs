use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Current time in the wire format (RFC 3339, millisecond precision, UTC)
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a wire timestamp, accepting RFC 3339 and naive ISO-8601 (assumed UTC).
/// Missing or unparseable timestamps fall back to the time of arrival.
pub fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.map(str::trim)
        .and_then(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        })
        .unwrap_or_else(Utc::now)
}

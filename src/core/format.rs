// Host help-text formatting characters and CYYMMDD/HHMMSS timestamps.
use time::format_description::well_known::Rfc3339;
use time::{Date, Month, PrimitiveDateTime, Time};

const FORMAT_CODES: [(char, &str); 3] = [('N', "\n"), ('P', "\n      "), ('B', "\n    ")];

/// Replaces `&N`, `&P` and `&B` with line breaks and indentation.
pub fn substitute_formatting(text: &str) -> String {
    rewrite_formatting(text, |replacement| replacement)
}

/// Drops formatting characters, as the host does for unformatted help.
pub fn strip_formatting(text: &str) -> String {
    rewrite_formatting(text, |_| "")
}

fn rewrite_formatting(text: &str, pick: impl Fn(&'static str) -> &'static str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '&' {
            if let Some(code) = chars.peek().copied() {
                if let Some((_, replacement)) = FORMAT_CODES.iter().find(|(c, _)| *c == code) {
                    chars.next();
                    if chars.peek() == Some(&' ') {
                        chars.next();
                    }
                    out.push_str(pick(*replacement));
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

pub fn parse_host_timestamp(date: &str, time: &str) -> Option<PrimitiveDateTime> {
    let date = date.as_bytes();
    let time = time.as_bytes();
    if date.len() != 7 || time.len() != 6 {
        return None;
    }
    let century = digits(&date[0..1])?;
    let year = 1900 + century * 100 + digits(&date[1..3])?;
    let month = Month::try_from(digits(&date[3..5])? as u8).ok()?;
    let day = digits(&date[5..7])? as u8;
    let date = Date::from_calendar_date(year as i32, month, day).ok()?;
    let time = Time::from_hms(
        digits(&time[0..2])? as u8,
        digits(&time[2..4])? as u8,
        digits(&time[4..6])? as u8,
    )
    .ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

/// Renders a timestamp as the host's `CYYMMDD` and `HHMMSS` fields.
pub fn host_date_time(at: PrimitiveDateTime) -> (String, String) {
    let year = at.year();
    let century = if year >= 2000 { 1 } else { 0 };
    let date = format!(
        "{century}{:02}{:02}{:02}",
        year.rem_euclid(100),
        u8::from(at.month()),
        at.day()
    );
    let time = format!("{:02}{:02}{:02}", at.hour(), at.minute(), at.second());
    (date, time)
}

pub fn rfc3339(at: PrimitiveDateTime) -> Option<String> {
    at.assume_utc().format(&Rfc3339).ok()
}

fn digits(raw: &[u8]) -> Option<u32> {
    raw.iter().try_fold(0u32, |acc, byte| {
        byte.is_ascii_digit()
            .then(|| acc * 10 + u32::from(byte - b'0'))
    })
}

#[cfg(test)]
mod tests {
    use super::{host_date_time, parse_host_timestamp, rfc3339, strip_formatting, substitute_formatting};

    #[test]
    fn formatting_characters_become_layout() {
        let help = "Cause . . . : &N The queue is full. &P Recovery: &B Clear it.";
        assert_eq!(
            substitute_formatting(help),
            "Cause . . . : \nThe queue is full. \n      Recovery: \n    Clear it."
        );
    }

    #[test]
    fn formatting_characters_can_be_stripped() {
        assert_eq!(strip_formatting("A &N B &Q C"), "A B &Q C");
        assert_eq!(strip_formatting("trailing &"), "trailing &");
    }

    #[test]
    fn host_timestamps_parse_with_century_digit() {
        let at = parse_host_timestamp("1261016", "101500").expect("ts");
        assert_eq!(rfc3339(at).as_deref(), Some("2026-10-16T10:15:00Z"));
        let old = parse_host_timestamp("0991231", "235959").expect("ts");
        assert_eq!(old.year(), 1999);
    }

    #[test]
    fn malformed_timestamps_are_none() {
        assert!(parse_host_timestamp("1261399", "101500").is_none());
        assert!(parse_host_timestamp("12610", "101500").is_none());
        assert!(parse_host_timestamp("1261016", "25xx00").is_none());
    }

    #[test]
    fn timestamps_render_back_to_host_fields() {
        let at = parse_host_timestamp("1261016", "080910").expect("ts");
        assert_eq!(host_date_time(at), ("1261016".to_string(), "080910".to_string()));
    }
}

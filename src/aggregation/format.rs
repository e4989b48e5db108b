//! Bucket label formats
//!
//! Dashboards send label formats in the `yyyy-MM-dd HH:mm` pattern style. A
//! pattern is translated once into a chrono strftime string and then used to
//! render every bucket start time of a result. Patterns that already contain
//! `%` are taken as strftime and used unchanged.
//!
//! | Pattern | Meaning            | strftime |
//! |---------|--------------------|----------|
//! | `yyyy`  | four digit year    | `%Y`     |
//! | `yy`    | two digit year     | `%y`     |
//! | `MM`    | month `01`-`12`    | `%m`     |
//! | `dd`    | day of month       | `%d`     |
//! | `HH`    | hour `00`-`23`     | `%H`     |
//! | `hh`    | hour `01`-`12`     | `%I`     |
//! | `mm`    | minute             | `%M`     |
//! | `ss`    | second             | `%S`     |
//! | `SSS`   | millisecond        | `%3f`    |
//! | `'..'`  | quoted literal     |          |
//!
//! Single letters (`M`, `d`, `H`, ...) render without zero padding. Any other
//! character is copied into the label as is.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// Default label format, month/day/hour with CJK unit suffixes
pub const DEFAULT_BUCKET_FORMAT: &str = "MM月dd日 HH时";

/// Compiled label format for aggregation buckets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketFormat {
    pattern: String,
    strftime: String,
}

impl BucketFormat {
    /// Compile a pattern-style or strftime format
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let strftime = if pattern.contains('%') {
            pattern.to_string()
        } else {
            translate(pattern)?
        };

        if StrftimeItems::new(&strftime).any(|item| matches!(item, Item::Error)) {
            return Err(format!("invalid bucket format '{}'", pattern));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            strftime,
        })
    }

    /// The format as supplied
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Equivalent strftime string
    pub fn strftime(&self) -> &str {
        &self.strftime
    }

    /// Render the bucket starting at `timestamp_ms` in the given zone
    pub fn render(&self, timestamp_ms: i64, offset: &FixedOffset) -> String {
        let Some(start) = DateTime::from_timestamp_millis(timestamp_ms) else {
            return String::new();
        };

        let mut label = String::new();
        // Items were checked in parse
        let _ = write!(label, "{}", start.with_timezone(offset).format(&self.strftime));
        label
    }
}

impl Default for BucketFormat {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_BUCKET_FORMAT.to_string(),
            strftime: "%m月%d日 %H时".to_string(),
        }
    }
}

impl fmt::Display for BucketFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl TryFrom<String> for BucketFormat {
    type Error = String;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        Self::parse(&pattern)
    }
}

impl From<BucketFormat> for String {
    fn from(format: BucketFormat) -> Self {
        format.pattern
    }
}

fn translate(pattern: &str) -> Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // '' is an escaped quote, otherwise read up to the closing quote
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            let close = chars[i + 1..]
                .iter()
                .position(|&q| q == '\'')
                .ok_or_else(|| format!("unterminated quote in '{}'", pattern))?;
            out.extend(&chars[i + 1..i + 1 + close]);
            i += close + 2;
            continue;
        }

        let run = chars[i..].iter().take_while(|&&r| r == c).count();
        let spec = match (c, run) {
            ('y', 2) => Some("%y"),
            ('y', _) => Some("%Y"),
            ('M', 1) => Some("%-m"),
            ('M', _) => Some("%m"),
            ('d', 1) => Some("%-d"),
            ('d', _) => Some("%d"),
            ('H', 1) => Some("%-H"),
            ('H', _) => Some("%H"),
            ('h', 1) => Some("%-I"),
            ('h', _) => Some("%I"),
            ('m', 1) => Some("%-M"),
            ('m', _) => Some("%M"),
            ('s', 1) => Some("%-S"),
            ('s', _) => Some("%S"),
            ('S', _) => Some("%3f"),
            ('a', _) => Some("%p"),
            _ => None,
        };

        match spec {
            Some(spec) => out.push_str(spec),
            None => out.extend(std::iter::repeat(c).take(run)),
        }
        i += run;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-01T05:07:09.042Z
    const TS: i64 = 1_709_269_629_042;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_default_format() {
        let format = BucketFormat::default();
        assert_eq!(format, BucketFormat::parse(DEFAULT_BUCKET_FORMAT).unwrap());
        assert_eq!(format.render(TS, &utc()), "03月01日 05时");
    }

    #[test]
    fn test_pattern_translation() {
        let render = |p: &str| BucketFormat::parse(p).unwrap().render(TS, &utc());
        assert_eq!(render("MM-dd:HH"), "03-01:05");
        assert_eq!(render("yyyy-MM-dd HH:mm:ss.SSS"), "2024-03-01 05:07:09.042");
        assert_eq!(render("M/d H"), "3/1 5");
        assert_eq!(render("yyyy'T'HH"), "2024T05");
        assert_eq!(render("HH'' o''clock"), "05' o'clock");
    }

    #[test]
    fn test_strftime_passthrough() {
        let format = BucketFormat::parse("%Y/%m/%d").unwrap();
        assert_eq!(format.strftime(), "%Y/%m/%d");
        assert_eq!(format.render(TS, &utc()), "2024/03/01");
    }

    #[test]
    fn test_render_at_offset() {
        let east8 = FixedOffset::east_opt(8 * 3600).unwrap();
        let format = BucketFormat::parse("MM-dd HH").unwrap();
        assert_eq!(format.render(TS, &east8), "03-01 13");
    }

    #[test]
    fn test_invalid_formats() {
        assert!(BucketFormat::parse("%Q").is_err());
        assert!(BucketFormat::parse("yyyy 'open").is_err());
    }

    #[test]
    fn test_serde_uses_pattern() {
        let format = BucketFormat::parse("MM-dd").unwrap();
        assert_eq!(serde_json::to_value(&format).unwrap(), "MM-dd");
        let back: BucketFormat = serde_json::from_str("\"MM-dd\"").unwrap();
        assert_eq!(back, format);
    }
}

use chrono::{DateTime, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::ScheduleError;

/// A set of allowed values for one schedule field (minutes, hours, ...).
///
/// Parsed from the usual token grammar: `*`, `a`, `a-b`, lists, and
/// `/step` suffixes on any of those. Values are kept sorted and deduped;
/// the `wildcard` flag records whether the field was written as `*`,
/// which the cron day-matching rule needs to know.
#[derive(Debug, Clone)]
pub(crate) struct FieldSet {
    values: Vec<u32>,
    wildcard: bool,
}

impl FieldSet {
    pub fn all(min: u32, max: u32) -> Self {
        Self {
            values: (min..=max).collect(),
            wildcard: true,
        }
    }

    /// Parse a field spec. `names` maps symbolic values ("jan", "mon")
    /// to numbers; matching is case-insensitive.
    pub fn parse(
        spec: &str,
        min: u32,
        max: u32,
        names: &[(&str, u32)],
    ) -> Result<Self, ScheduleError> {
        if spec == "*" {
            return Ok(Self::all(min, max));
        }

        let mut values = Vec::new();
        for token in spec.split(',') {
            if token.is_empty() {
                return Err(ScheduleError::InvalidExpression(format!(
                    "empty element in field '{spec}'"
                )));
            }
            let (range, step) = match token.split_once('/') {
                Some((r, s)) => {
                    let step: u32 = s.parse().map_err(|_| {
                        ScheduleError::InvalidExpression(format!("bad step in '{token}'"))
                    })?;
                    if step == 0 {
                        return Err(ScheduleError::InvalidExpression(format!(
                            "zero step in '{token}'"
                        )));
                    }
                    (r, step)
                }
                None => (token, 1),
            };

            let (lo, hi) = if range == "*" {
                (min, max)
            } else if let Some((a, b)) = split_range(range) {
                let lo = parse_value(a, names, min, max)?;
                let hi = parse_value(b, names, min, max)?;
                if lo > hi {
                    return Err(ScheduleError::InvalidExpression(format!(
                        "inverted range '{range}'"
                    )));
                }
                (lo, hi)
            } else {
                let v = parse_value(range, names, min, max)?;
                // A bare value with a step means "from v to max".
                if step > 1 {
                    (v, max)
                } else {
                    (v, v)
                }
            };

            let mut v = lo;
            while v <= hi {
                values.push(v);
                v += step;
            }
        }

        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return Err(ScheduleError::InvalidExpression(format!(
                "field '{spec}' matches nothing"
            )));
        }
        Ok(Self {
            values,
            wildcard: false,
        })
    }

    pub fn contains(&self, v: u32) -> bool {
        self.values.binary_search(&v).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.values.iter().copied()
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Remap values through `f`, keeping the set sorted and deduped.
    /// Used to fold cron's Sunday-as-7 onto 0.
    pub fn remap(mut self, f: impl Fn(u32) -> u32) -> Self {
        for v in &mut self.values {
            *v = f(*v);
        }
        self.values.sort_unstable();
        self.values.dedup();
        self
    }
}

/// Split "a-b" or "a..b" into endpoints. Returns None for bare values.
fn split_range(token: &str) -> Option<(&str, &str)> {
    if let Some((a, b)) = token.split_once("..") {
        return Some((a, b));
    }
    // '-' only counts as a range separator between non-empty halves
    token
        .split_once('-')
        .filter(|(a, b)| !a.is_empty() && !b.is_empty())
}

fn parse_value(
    token: &str,
    names: &[(&str, u32)],
    min: u32,
    max: u32,
) -> Result<u32, ScheduleError> {
    let v = if let Ok(n) = token.parse::<u32>() {
        n
    } else {
        let lower = token.to_ascii_lowercase();
        names
            .iter()
            .find(|(name, _)| *name == lower || lower.starts_with(*name))
            .map(|(_, v)| *v)
            .ok_or_else(|| {
                ScheduleError::InvalidExpression(format!("unknown value '{token}'"))
            })?
    };
    if v < min || v > max {
        return Err(ScheduleError::InvalidExpression(format!(
            "value {v} out of range {min}-{max}"
        )));
    }
    Ok(v)
}

/// Upper bound on the day-stepped successor search: a bit over four
/// years, enough to cross any leap-year/weekday cycle a supported
/// expression can express.
const SEARCH_DAYS: u32 = 366 * 4;

/// Find the least UTC instant strictly after `after` whose local wall
/// clock in `tz` matches the given day predicate and time-of-day sets.
///
/// DST policy: a wall-clock match inside a spring-forward gap does not
/// fire; a match inside an autumn fold fires once, at the earliest UTC
/// occurrence.
pub(crate) fn next_match(
    tz: Tz,
    after: DateTime<Utc>,
    day_ok: &dyn Fn(NaiveDate) -> bool,
    hours: &FieldSet,
    minutes: &FieldSet,
    seconds: &FieldSet,
) -> Result<DateTime<Utc>, ScheduleError> {
    let local_after = after.with_timezone(&tz).naive_local();
    let mut date = local_after.date();

    for _ in 0..SEARCH_DAYS {
        if day_ok(date) {
            for h in hours.iter() {
                for m in minutes.iter() {
                    for s in seconds.iter() {
                        let Some(naive) = date.and_hms_opt(h, m, s) else {
                            continue;
                        };
                        if naive <= local_after {
                            continue;
                        }
                        let resolved = match tz.from_local_datetime(&naive) {
                            LocalResult::None => continue,
                            LocalResult::Single(dt) => dt,
                            LocalResult::Ambiguous(earliest, _) => earliest,
                        };
                        let utc = resolved.with_timezone(&Utc);
                        if utc > after {
                            return Ok(utc);
                        }
                    }
                }
            }
        }
        date = date.succ_opt().ok_or(ScheduleError::NoUpcomingOccurrence)?;
    }

    Err(ScheduleError::NoUpcomingOccurrence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_contains_everything() {
        let f = FieldSet::parse("*", 0, 59, &[]).unwrap();
        assert!(f.is_wildcard());
        assert!(f.contains(0));
        assert!(f.contains(59));
    }

    #[test]
    fn step_on_wildcard() {
        let f = FieldSet::parse("*/15", 0, 59, &[]).unwrap();
        assert_eq!(f.iter().collect::<Vec<_>>(), vec![0, 15, 30, 45]);
        assert!(!f.is_wildcard());
    }

    #[test]
    fn ranges_lists_and_names() {
        let names = [("mon", 1), ("tue", 2), ("wed", 3), ("fri", 5)];
        let f = FieldSet::parse("mon-wed,fri", 0, 7, &names).unwrap();
        assert_eq!(f.iter().collect::<Vec<_>>(), vec![1, 2, 3, 5]);
    }

    #[test]
    fn range_with_step() {
        let f = FieldSet::parse("10-30/10", 0, 59, &[]).unwrap();
        assert_eq!(f.iter().collect::<Vec<_>>(), vec![10, 20, 30]);
    }

    #[test]
    fn rejects_out_of_range_and_garbage() {
        assert!(FieldSet::parse("60", 0, 59, &[]).is_err());
        assert!(FieldSet::parse("a-b", 0, 59, &[]).is_err());
        assert!(FieldSet::parse("1//2", 0, 59, &[]).is_err());
        assert!(FieldSet::parse("5-1", 0, 59, &[]).is_err());
        assert!(FieldSet::parse("*/0", 0, 59, &[]).is_err());
    }
}

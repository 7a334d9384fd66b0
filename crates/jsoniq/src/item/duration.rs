//! Duration values and their lexical forms.
//!
//! A full `duration` carries both a month count and a day-time delta; the two
//! subkinds keep only one of them. The lexical grammar is the XSD one:
//! `-?P(nY)?(nM)?(nD)?(T(nH)?(nM)?(n(.n)?S)?)?` with at least one component.

use chrono::TimeDelta;

/// The three duration flavours an item can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationKind {
    Duration,
    YearMonth,
    DayTime,
}

impl DurationKind {
    pub fn type_name(self) -> &'static str {
        match self {
            DurationKind::Duration => "duration",
            DurationKind::YearMonth => "yearMonthDuration",
            DurationKind::DayTime => "dayTimeDuration",
        }
    }
}

/// Signed calendar interval: whole months plus an exact day-time delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Duration {
    pub months: i32,
    pub delta: TimeDelta,
}

/// The input does not follow the duration grammar for the requested kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexicalError;

impl Duration {
    pub fn new(months: i32, delta: TimeDelta) -> Self {
        Self { months, delta }
    }

    pub fn zero() -> Self {
        Self { months: 0, delta: TimeDelta::zero() }
    }

    pub fn is_negative(&self) -> bool {
        self.months < 0 || self.delta < TimeDelta::zero()
    }

    /// Parse `s` as a duration of the given kind.
    pub fn parse(s: &str, kind: DurationKind) -> Result<Duration, LexicalError> {
        let s = s.trim();
        let (negative, rest) = match s.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, s),
        };
        let body = rest.strip_prefix('P').ok_or(LexicalError)?;
        if body.is_empty() {
            return Err(LexicalError);
        }
        let (date_part, time_part) = match body.split_once('T') {
            Some((d, t)) => {
                if t.is_empty() {
                    return Err(LexicalError);
                }
                (d, Some(t))
            }
            None => (body, None),
        };

        let date = scan_components(date_part, &['Y', 'M', 'D'], false)?;
        let time = match time_part {
            Some(t) => scan_components(t, &['H', 'M', 'S'], true)?,
            None => Components::default(),
        };
        if date.seen == 0 && time.seen == 0 {
            return Err(LexicalError);
        }

        let years = date.values[0];
        let months = date.values[1];
        let days = date.values[2];
        let has_year_month = date.present[0] || date.present[1];
        let has_day_time = date.present[2] || time.seen > 0;
        match kind {
            DurationKind::YearMonth if has_day_time => return Err(LexicalError),
            DurationKind::DayTime if has_year_month => return Err(LexicalError),
            _ => {}
        }

        let total_months = years
            .checked_mul(12)
            .and_then(|y| y.checked_add(months))
            .and_then(|m| i32::try_from(m).ok())
            .ok_or(LexicalError)?;
        let secs = days
            .checked_mul(86_400)
            .and_then(|d| d.checked_add(time.values[0].checked_mul(3600)?))
            .and_then(|d| d.checked_add(time.values[1].checked_mul(60)?))
            .and_then(|d| d.checked_add(time.values[2]))
            .ok_or(LexicalError)?;
        let delta = TimeDelta::new(secs, time.nanos).ok_or(LexicalError)?;

        Ok(if negative {
            Duration { months: -total_months, delta: -delta }
        } else {
            Duration { months: total_months, delta }
        })
    }

    /// Canonical lexical form for the given kind.
    pub fn format(&self, kind: DurationKind) -> String {
        match kind {
            DurationKind::YearMonth => format_year_month(self.months),
            DurationKind::DayTime => format_day_time(self.delta),
            DurationKind::Duration => {
                let mut out = String::new();
                if self.is_negative() {
                    out.push('-');
                }
                out.push('P');
                let ym = year_month_body(self.months.unsigned_abs());
                let dt = day_time_body(abs_delta(self.delta));
                if ym.is_empty() && dt.is_empty() {
                    out.push_str("T0S");
                } else {
                    out.push_str(&ym);
                    out.push_str(&dt);
                }
                out
            }
        }
    }
}

pub fn format_year_month(months: i32) -> String {
    let body = year_month_body(months.unsigned_abs());
    let sign = if months < 0 { "-" } else { "" };
    if body.is_empty() { "P0M".to_string() } else { format!("{sign}P{body}") }
}

pub fn format_day_time(delta: TimeDelta) -> String {
    let body = day_time_body(abs_delta(delta));
    let sign = if delta < TimeDelta::zero() { "-" } else { "" };
    if body.is_empty() { "PT0S".to_string() } else { format!("{sign}P{body}") }
}

fn abs_delta(delta: TimeDelta) -> TimeDelta {
    if delta < TimeDelta::zero() { -delta } else { delta }
}

fn year_month_body(months: u32) -> String {
    let (years, months) = (months / 12, months % 12);
    let mut out = String::new();
    if years != 0 {
        out.push_str(&format!("{years}Y"));
    }
    if months != 0 {
        out.push_str(&format!("{months}M"));
    }
    out
}

fn day_time_body(delta: TimeDelta) -> String {
    let total = delta.num_seconds();
    let nanos = delta.subsec_nanos();
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3600, rem % 3600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    let mut out = String::new();
    if days != 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours != 0 || minutes != 0 || seconds != 0 || nanos != 0 {
        out.push('T');
        if hours != 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes != 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds != 0 || nanos != 0 {
            if nanos != 0 {
                let frac = format!("{nanos:09}");
                out.push_str(&format!("{seconds}.{}S", frac.trim_end_matches('0')));
            } else {
                out.push_str(&format!("{seconds}S"));
            }
        }
    }
    out
}

#[derive(Default)]
struct Components {
    values: [i64; 3],
    present: [bool; 3],
    seen: usize,
    nanos: u32,
}

// Reads `<digits><designator>` runs; designators must appear in `order` order.
fn scan_components(part: &str, order: &[char; 3], allow_fraction: bool) -> Result<Components, LexicalError> {
    let mut out = Components::default();
    let mut next_slot = 0usize;
    let mut digits = String::new();
    let mut fraction: Option<String> = None;
    for ch in part.chars() {
        if ch.is_ascii_digit() {
            match fraction.as_mut() {
                Some(f) => f.push(ch),
                None => digits.push(ch),
            }
            continue;
        }
        if ch == '.' && allow_fraction && fraction.is_none() && !digits.is_empty() {
            fraction = Some(String::new());
            continue;
        }
        let slot = order[next_slot..].iter().position(|c| *c == ch).map(|p| p + next_slot).ok_or(LexicalError)?;
        if digits.is_empty() {
            return Err(LexicalError);
        }
        if let Some(f) = fraction.take() {
            // only the seconds designator takes a fraction
            if slot != 2 || f.is_empty() {
                return Err(LexicalError);
            }
            let mut padded: String = f.chars().take(9).collect();
            while padded.len() < 9 {
                padded.push('0');
            }
            out.nanos = padded.parse::<u32>().map_err(|_| LexicalError)?;
        }
        out.values[slot] = digits.parse::<i64>().map_err(|_| LexicalError)?;
        out.present[slot] = true;
        out.seen += 1;
        digits.clear();
        next_slot = slot + 1;
    }
    if !digits.is_empty() || fraction.is_some() {
        return Err(LexicalError);
    }
    Ok(out)
}

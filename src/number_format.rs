//! Excel number format strings applied to numeric cell values.
//!
//! Only what is needed to display a cached numeric value is supported: sign
//! driven sections, digit placeholders, grouping, percent, scientific notation,
//! literals and date/time tokens. Anything else falls back to `General`.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};

use crate::datatype::excel_to_datetime;
use crate::formats::DateCategory;

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    /// `0`
    Zero,
    /// `#`
    Hash,
    /// `?`
    Space,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Digit(Placeholder),
    Point,
    Comma,
    Percent,
    Exponent { plus: bool },
    Text,
    General,
    Year(usize),
    Month(usize),
    Day(usize),
    Hour(usize),
    Minute(usize),
    Second(usize),
    AmPm { short: bool },
}

impl Token {
    fn is_digit(&self) -> bool {
        matches!(self, Token::Digit(_))
    }

    fn is_date_part(&self) -> bool {
        matches!(
            self,
            Token::Year(_)
                | Token::Month(_)
                | Token::Day(_)
                | Token::Hour(_)
                | Token::Minute(_)
                | Token::Second(_)
        )
    }
}

#[derive(Debug, Clone, Default)]
struct Section {
    tokens: Vec<Token>,
    /// `[h]`, `[mm]`, `[ss]` duration brackets
    elapsed: bool,
}

impl Section {
    fn has_date(&self) -> bool {
        self.tokens
            .iter()
            .any(|t| t.is_date_part() || matches!(t, Token::AmPm { .. }))
    }

    /// Fractions (`# ?/?`) and elapsed durations are not rendered
    fn is_unsupported(&self) -> bool {
        self.elapsed
            || (self.tokens.iter().any(Token::is_digit)
                && self
                    .tokens
                    .iter()
                    .any(|t| matches!(t, Token::Literal(s) if s.contains('/'))))
    }

    fn push_literal(&mut self, c: char) {
        if let Some(Token::Literal(s)) = self.tokens.last_mut() {
            s.push(c);
        } else {
            self.tokens.push(Token::Literal(c.to_string()));
        }
    }

    fn push_str_literal(&mut self, s: &str) {
        s.chars().for_each(|c| self.push_literal(c));
    }
}

/// A parsed number format string.
///
/// ```
/// use xlsx2csv::NumberFormat;
///
/// let format = NumberFormat::parse("0%");
/// assert_eq!(format.format(0.5, false), "50%");
/// assert_eq!(NumberFormat::parse("#,##0.00").format(1234.5, false), "1,234.50");
/// ```
#[derive(Debug, Clone)]
pub struct NumberFormat {
    pattern: String,
    sections: Vec<Section>,
}

impl NumberFormat {
    /// Parses a format string. Parsing never fails; unknown characters are literals.
    pub fn parse(pattern: &str) -> NumberFormat {
        let sections = split_sections(pattern)
            .into_iter()
            .map(parse_section)
            .collect();
        NumberFormat {
            pattern: pattern.to_string(),
            sections,
        }
    }

    /// The original format string
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Is this the `General` format
    pub fn is_general(&self) -> bool {
        self.pattern.trim().eq_ignore_ascii_case("general")
    }

    /// Whether the first section displays a date, a time or both.
    ///
    /// Elapsed-time formats such as `[h]:mm:ss` are durations, not dates.
    pub fn date_category(&self) -> Option<DateCategory> {
        let section = self.sections.first()?;
        if section.elapsed {
            return None;
        }
        let date = section
            .tokens
            .iter()
            .any(|t| matches!(t, Token::Year(_) | Token::Month(_) | Token::Day(_)));
        let time = section.tokens.iter().any(|t| {
            matches!(
                t,
                Token::Hour(_) | Token::Minute(_) | Token::Second(_) | Token::AmPm { .. }
            )
        });
        match (date, time) {
            (true, true) => Some(DateCategory::DateTime),
            (true, false) => Some(DateCategory::Date),
            (false, true) => Some(DateCategory::Time),
            (false, false) => None,
        }
    }

    /// Renders `value` through this format
    pub fn format(&self, value: f64, is_1904: bool) -> String {
        if self.is_general() || !value.is_finite() {
            return general(value);
        }
        let Some((section, shown, minus)) = self.select(value) else {
            return general(value);
        };
        if section.is_unsupported() {
            return general(value);
        }
        if section.has_date() {
            return format_datetime(section, value, is_1904).unwrap_or_else(|| general(value));
        }
        let mut out = format_numeric(section, shown);
        if minus {
            out.insert(0, '-');
        }
        out
    }

    /// Picks the section for the value sign, returning the value to display and
    /// whether a minus sign must be prepended
    fn select(&self, value: f64) -> Option<(&Section, f64, bool)> {
        let numeric = self.sections.len().min(3);
        if value < 0.0 && numeric >= 2 {
            Some((&self.sections[1], -value, false))
        } else if value == 0.0 && numeric >= 3 {
            Some((&self.sections[2], 0.0, false))
        } else {
            self.sections
                .first()
                .map(|s| (s, value.abs(), value < 0.0))
        }
    }
}

/// Renders a value the way the `General` format does: integers without
/// decimals, otherwise up to 10 significant digits, scientific notation for
/// very large or very small magnitudes.
pub fn general(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }
    let abs = value.abs();
    if value.fract() == 0.0 && abs < 1e15 {
        return format!("{}", value as i64);
    }
    if !(1e-9..1e11).contains(&abs) {
        let s = format!("{value:.5e}");
        let (mantissa, exponent) = match s.split_once('e') {
            Some(parts) => parts,
            None => return s,
        };
        let mantissa = trim_decimal_zeros(mantissa);
        let exponent = exponent.parse::<i32>().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}E{sign}{:02}", exponent.abs());
    }
    let int_digits = abs.log10().floor() as i32 + 1;
    let decimals = (10 - int_digits).clamp(0, 10) as usize;
    trim_decimal_zeros(&format!("{:.*}", decimals, round_half_away(value, decimals))).to_string()
}

fn trim_decimal_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Fixed point text of a non negative value, at most 15 significant digits
/// then zeros, as Excel displays large numbers
fn fixed_digits(value: f64, decimals: usize) -> String {
    let value = round_half_away(value, decimals);
    if value < 1e15 {
        return format!("{value:.decimals$}");
    }
    let scientific = format!("{value:.14e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent = exponent.parse::<usize>().unwrap_or(0);
    let mut digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let len = digits.len();
    digits.extend(std::iter::repeat_n('0', (exponent + 1).saturating_sub(len)));
    if decimals > 0 {
        digits.push('.');
        digits.extend(std::iter::repeat_n('0', decimals));
    }
    digits
}

fn round_half_away(value: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

fn split_sections(pattern: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut bracket = false;
    let mut escaped = false;
    for (i, c) in pattern.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '"' if !bracket => quoted = !quoted,
            '\\' | '_' | '*' if !quoted => escaped = true,
            '[' if !quoted => bracket = true,
            ']' if !quoted => bracket = false,
            ';' if !quoted && !bracket => {
                sections.push(&pattern[start..i]);
                start = i + 1;
            }
            _ => (),
        }
    }
    sections.push(&pattern[start..]);
    sections
}

fn starts_with_ignore_case(chars: &[char], prefix: &str) -> bool {
    let mut it = chars.iter();
    prefix
        .chars()
        .all(|p| it.next().is_some_and(|c| c.eq_ignore_ascii_case(&p)))
}

fn parse_section(section_str: &str) -> Section {
    let chars: Vec<char> = section_str.chars().collect();
    let mut section = Section::default();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '"')
                    .map_or(chars.len(), |p| i + 1 + p);
                let literal: String = chars[i + 1..end].iter().collect();
                section.push_str_literal(&literal);
                i = end + 1;
                continue;
            }
            '\\' => {
                if let Some(&next) = chars.get(i + 1) {
                    section.push_literal(next);
                }
                i += 2;
                continue;
            }
            '_' => {
                if i + 1 < chars.len() {
                    section.push_literal(' ');
                }
                i += 2;
                continue;
            }
            '*' => {
                i += 2;
                continue;
            }
            '[' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == ']')
                    .map_or(chars.len(), |p| i + 1 + p);
                let content: String = chars[i + 1..end].iter().collect();
                parse_bracket(&content, &mut section);
                i = end + 1;
                continue;
            }
            '0' => section.tokens.push(Token::Digit(Placeholder::Zero)),
            '#' => section.tokens.push(Token::Digit(Placeholder::Hash)),
            '?' => section.tokens.push(Token::Digit(Placeholder::Space)),
            '.' => section.tokens.push(Token::Point),
            ',' => section.tokens.push(Token::Comma),
            '%' => section.tokens.push(Token::Percent),
            '@' => section.tokens.push(Token::Text),
            'E' | 'e' if matches!(chars.get(i + 1), Some('+') | Some('-')) => {
                section.tokens.push(Token::Exponent {
                    plus: chars[i + 1] == '+',
                });
                i += 2;
                continue;
            }
            'G' | 'g' if starts_with_ignore_case(&chars[i..], "general") => {
                section.tokens.push(Token::General);
                i += "general".len();
                continue;
            }
            'A' | 'a' if starts_with_ignore_case(&chars[i..], "am/pm") => {
                section.tokens.push(Token::AmPm { short: false });
                i += "am/pm".len();
                continue;
            }
            'A' | 'a' if starts_with_ignore_case(&chars[i..], "a/p") => {
                section.tokens.push(Token::AmPm { short: true });
                i += "a/p".len();
                continue;
            }
            'y' | 'Y' | 'm' | 'M' | 'd' | 'D' | 'h' | 'H' | 's' | 'S' => {
                let run = chars[i..]
                    .iter()
                    .take_while(|n| n.eq_ignore_ascii_case(&c))
                    .count();
                section.tokens.push(match c.to_ascii_lowercase() {
                    'y' => Token::Year(run),
                    'm' => Token::Month(run),
                    'd' => Token::Day(run),
                    'h' => Token::Hour(run),
                    _ => Token::Second(run),
                });
                i += run;
                continue;
            }
            other => section.push_literal(other),
        }
        i += 1;
    }
    resolve_minutes(&mut section.tokens);
    section
}

fn parse_bracket(content: &str, section: &mut Section) {
    if let Some(currency) = content.strip_prefix('$') {
        let symbol = currency.split('-').next().unwrap_or_default();
        section.push_str_literal(symbol);
        return;
    }
    let lower = content.to_ascii_lowercase();
    if let Some(first) = lower.chars().next() {
        if matches!(first, 'h' | 'm' | 's') && lower.chars().all(|c| c == first) {
            section.elapsed = true;
        }
    }
    // colours, conditions and locale ids are display hints only
}

/// `m` is a minute right after an hour or right before a second, a month otherwise
fn resolve_minutes(tokens: &mut [Token]) {
    let dates: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_date_part())
        .map(|(i, _)| i)
        .collect();
    for (k, &idx) in dates.iter().enumerate() {
        let Token::Month(run) = tokens[idx] else {
            continue;
        };
        let after_hour = k > 0 && matches!(tokens[dates[k - 1]], Token::Hour(_));
        let before_second = dates
            .get(k + 1)
            .is_some_and(|&n| matches!(tokens[n], Token::Second(_)));
        if after_hour || before_second {
            tokens[idx] = Token::Minute(run);
        }
    }
}

fn token_text(token: &Token, value: f64, out: &mut String) {
    match token {
        Token::Literal(s) => out.push_str(s),
        Token::Percent => out.push('%'),
        Token::Text | Token::General => out.push_str(&general(value)),
        _ => (),
    }
}

fn format_numeric(section: &Section, value: f64) -> String {
    let tokens = &section.tokens;
    let percents = tokens.iter().filter(|t| **t == Token::Percent).count();
    let mut value = value * 100f64.powi(percents as i32);

    let exp_pos = tokens
        .iter()
        .position(|t| matches!(t, Token::Exponent { .. }));
    let mantissa_tokens = &tokens[..exp_pos.unwrap_or(tokens.len())];
    let point = mantissa_tokens.iter().position(|t| *t == Token::Point);
    let int_tokens = &mantissa_tokens[..point.unwrap_or(mantissa_tokens.len())];
    let frac_tokens = point.map_or(&[][..], |p| &mantissa_tokens[p + 1..]);

    // a comma between digits groups thousands, trailing commas scale by 1000
    let first_digit = int_tokens.iter().position(Token::is_digit);
    let last_digit = int_tokens.iter().rposition(Token::is_digit);
    let mut grouping = false;
    let mut scale = frac_tokens.iter().filter(|t| **t == Token::Comma).count();
    if let (Some(first), Some(last)) = (first_digit, last_digit) {
        for (i, t) in int_tokens.iter().enumerate() {
            if *t == Token::Comma {
                if i > first && i < last {
                    grouping = true;
                } else if i > last {
                    scale += 1;
                }
            }
        }
    }
    value /= 1000f64.powi(scale as i32);

    let frac_slots: Vec<Placeholder> = frac_tokens
        .iter()
        .filter_map(|t| match t {
            Token::Digit(p) => Some(*p),
            _ => None,
        })
        .collect();
    let decimals = frac_slots.len();

    let mut exponent = None;
    if exp_pos.is_some() {
        let mut exp = if value == 0.0 {
            0
        } else {
            value.log10().floor() as i32
        };
        let mut mantissa = round_half_away(value / 10f64.powi(exp), decimals);
        if mantissa >= 10.0 {
            mantissa = round_half_away(mantissa / 10.0, decimals);
            exp += 1;
        }
        value = mantissa;
        exponent = Some(exp);
    }

    let digits = fixed_digits(value, decimals);
    let (int_digits, frac_digits) = digits.split_once('.').unwrap_or((&digits, ""));

    let zeros = int_tokens
        .iter()
        .filter(|t| **t == Token::Digit(Placeholder::Zero))
        .count();
    let spaces = int_tokens
        .iter()
        .filter(|t| **t == Token::Digit(Placeholder::Space))
        .count();
    let mut int_str = if int_digits == "0" && zeros == 0 {
        String::new()
    } else {
        int_digits.to_string()
    };
    while int_str.len() < zeros {
        int_str.insert(0, '0');
    }
    if grouping {
        int_str = group_thousands(&int_str);
    }
    while int_str.chars().count() < zeros + spaces {
        int_str.insert(0, ' ');
    }

    let mut out = String::with_capacity(int_str.len() + 8);

    // integer part, filled from the right; the leftmost slot takes any overflow
    let slots = int_tokens.iter().filter(|t| t.is_digit()).count();
    let int_chars: Vec<char> = int_str.chars().collect();
    let mut remaining = int_chars.len();
    let mut seen = 0;
    let mut pieces = Vec::with_capacity(int_tokens.len());
    for token in int_tokens.iter().rev() {
        let mut piece = String::new();
        if token.is_digit() {
            seen += 1;
            if seen == slots {
                piece.extend(&int_chars[..remaining]);
                remaining = 0;
            } else if remaining > 0 {
                remaining -= 1;
                piece.push(int_chars[remaining]);
            }
        } else {
            token_text(token, value, &mut piece);
        }
        pieces.push(piece);
    }
    pieces.iter().rev().for_each(|p| out.push_str(p));
    if slots == 0 && tokens.iter().any(Token::is_digit) {
        out.push_str(&int_str);
    }

    if point.is_some() {
        let mut frac: Vec<char> = frac_digits.chars().collect();
        for idx in (0..frac.len()).rev() {
            if frac[idx] != '0' {
                break;
            }
            match frac_slots[idx] {
                Placeholder::Hash if idx + 1 == frac.len() => {
                    frac.pop();
                }
                Placeholder::Space => frac[idx] = ' ',
                _ => break,
            }
        }
        out.push('.');
        let mut k = 0;
        for token in frac_tokens {
            if token.is_digit() {
                if let Some(c) = frac.get(k) {
                    out.push(*c);
                }
                k += 1;
            } else {
                token_text(token, value, &mut out);
            }
        }
    }

    if let (Some(pos), Some(exp)) = (exp_pos, exponent) {
        let plus = matches!(tokens[pos], Token::Exponent { plus: true });
        let exp_tokens = &tokens[pos + 1..];
        let width = exp_tokens.iter().filter(|t| t.is_digit()).count().max(1);
        out.push('E');
        if exp < 0 {
            out.push('-');
        } else if plus {
            out.push('+');
        }
        out.push_str(&format!("{:0width$}", exp.abs()));
        exp_tokens
            .iter()
            .filter(|t| !t.is_digit())
            .for_each(|t| token_text(t, value, &mut out));
    }
    out
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn round_to_second(dt: NaiveDateTime) -> Option<NaiveDateTime> {
    let carry = dt.nanosecond() >= 500_000_000;
    let dt = dt.with_nanosecond(0)?;
    if carry {
        dt.checked_add_signed(Duration::seconds(1))
    } else {
        Some(dt)
    }
}

fn format_datetime(section: &Section, value: f64, is_1904: bool) -> Option<String> {
    if value < 0.0 {
        return None;
    }
    let tokens = &section.tokens;
    let twelve_hours = tokens.iter().any(|t| matches!(t, Token::AmPm { .. }));
    let subsecond = tokens
        .iter()
        .skip_while(|t| **t != Token::Point)
        .filter(|t| t.is_digit())
        .count()
        .min(3);
    let dt = excel_to_datetime(value, is_1904)?;
    let dt = if subsecond == 0 {
        round_to_second(dt)?
    } else {
        dt
    };

    let mut out = String::new();
    for token in tokens {
        match *token {
            Token::Year(n) if n <= 2 => out.push_str(&format!("{:02}", dt.year() % 100)),
            Token::Year(_) => out.push_str(&format!("{:04}", dt.year())),
            Token::Month(n) => {
                let month = dt.month();
                let name = MONTHS[month as usize - 1];
                match n {
                    1 => out.push_str(&month.to_string()),
                    2 => out.push_str(&format!("{month:02}")),
                    3 => out.push_str(&name[..3]),
                    4 => out.push_str(name),
                    _ => out.push_str(&name[..1]),
                }
            }
            Token::Day(n) => {
                let weekday = WEEKDAYS[dt.weekday().num_days_from_monday() as usize];
                match n {
                    1 => out.push_str(&dt.day().to_string()),
                    2 => out.push_str(&format!("{:02}", dt.day())),
                    3 => out.push_str(&weekday[..3]),
                    _ => out.push_str(weekday),
                }
            }
            Token::Hour(n) => {
                let hour = if twelve_hours {
                    match dt.hour() % 12 {
                        0 => 12,
                        h => h,
                    }
                } else {
                    dt.hour()
                };
                push_padded(&mut out, hour, n);
            }
            Token::Minute(n) => push_padded(&mut out, dt.minute(), n),
            Token::Second(n) => push_padded(&mut out, dt.second(), n),
            Token::AmPm { short } => {
                let pm = dt.hour() >= 12;
                out.push_str(match (pm, short) {
                    (false, false) => "AM",
                    (true, false) => "PM",
                    (false, true) => "A",
                    (true, true) => "P",
                });
            }
            Token::Point if subsecond > 0 => {
                let millis = format!("{:03}", dt.nanosecond() / 1_000_000);
                out.push('.');
                out.push_str(&millis[..subsecond]);
            }
            Token::Point | Token::Digit(_) | Token::Comma => (),
            ref other => token_text(other, value, &mut out),
        }
    }
    Some(out)
}

fn push_padded(out: &mut String, value: u32, run: usize) {
    if run >= 2 {
        out.push_str(&format!("{value:02}"));
    } else {
        out.push_str(&value.to_string());
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate};

/// Portuguese month abbreviations used in chart labels.
pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Fev", "Mar", "Abr", "Mai", "Jun", "Jul", "Ago", "Set", "Out", "Nov", "Dez",
];

pub const MONTH_NAMES: [&str; 12] = [
    "Janeiro",
    "Fevereiro",
    "Março",
    "Abril",
    "Maio",
    "Junho",
    "Julho",
    "Agosto",
    "Setembro",
    "Outubro",
    "Novembro",
    "Dezembro",
];

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// `None` unless `month` is in 1..=12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn current() -> Self {
        Self::of(today())
    }

    pub fn shift(&self, months: i32) -> Self {
        let total = self.year * 12 + self.month as i32 - 1 + months;
        Self {
            year: total.div_euclid(12),
            month: (total.rem_euclid(12) + 1) as u32,
        }
    }

    pub fn prev(&self) -> Self {
        self.shift(-1)
    }

    pub fn next(&self) -> Self {
        self.shift(1)
    }

    pub fn start(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn end(&self) -> NaiveDate {
        self.next().start().pred_opt().unwrap_or(NaiveDate::MIN)
    }

    /// Inclusive `YYYY-MM-DD` bounds for SQL range filters.
    pub fn bounds(&self) -> (String, String) {
        (format_date(self.start()), format_date(self.end()))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// `"Jan/24"`
    pub fn short_label(&self) -> String {
        format!(
            "{}/{:02}",
            MONTH_ABBREVIATIONS[(self.month - 1) as usize],
            self.year.rem_euclid(100)
        )
    }

    /// `"Janeiro"`
    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[(self.month - 1) as usize]
    }

    /// `"Janeiro de 2024"`
    pub fn long_label(&self) -> String {
        format!("{} de {}", self.month_name(), self.year)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Which month the dashboard is looking at, relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonthScope {
    Previous,
    #[default]
    Current,
    Next,
}

impl FromStr for MonthScope {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "previous" | "anterior" => Ok(Self::Previous),
            "current" | "atual" => Ok(Self::Current),
            "next" | "proximo" => Ok(Self::Next),
            _ => Err(()),
        }
    }
}

impl MonthScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Previous => "previous",
            Self::Current => "current",
            Self::Next => "next",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Previous => "Mês anterior",
            Self::Current => "Mês atual",
            Self::Next => "Próximo mês",
        }
    }

    pub fn resolve(&self, today: NaiveDate) -> YearMonth {
        let current = YearMonth::of(today);
        match self {
            Self::Previous => current.prev(),
            Self::Current => current,
            Self::Next => current.next(),
        }
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Parse `dd/mm/yyyy` as printed on Brazilian receipts.
pub fn parse_br_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%d/%m/%Y").ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `dd/mm/yyyy` for display.
pub fn format_br_date(iso: &str) -> String {
    parse_date(iso)
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| iso.to_string())
}

/// Add calendar months, clamping the day to the target month's length
/// (Jan 31 + 1 month is Feb 28/29).
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let target = YearMonth::of(date).shift(months);
    let day = date.day().min(target.end().day());
    NaiveDate::from_ymd_opt(target.year, target.month, day).unwrap_or_else(|| target.start())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_add_months_clamps_day() {
        assert_eq!(add_months(d(2024, 1, 31), 1), d(2024, 2, 29));
        assert_eq!(add_months(d(2023, 1, 31), 1), d(2023, 2, 28));
        assert_eq!(add_months(d(2024, 3, 31), 1), d(2024, 4, 30));
    }

    #[test]
    fn test_add_months_crosses_year() {
        assert_eq!(add_months(d(2024, 11, 15), 3), d(2025, 2, 15));
        assert_eq!(add_months(d(2024, 1, 15), -1), d(2023, 12, 15));
    }

    #[test]
    fn test_year_month_bounds() {
        let ym = YearMonth::new(2024, 2).unwrap();
        assert_eq!(ym.bounds(), ("2024-02-01".into(), "2024-02-29".into()));
        assert_eq!(ym.prev(), YearMonth::new(2024, 1).unwrap());
        assert_eq!(YearMonth::new(2024, 12).unwrap().next(), YearMonth::new(2025, 1).unwrap());
        assert!(YearMonth::new(2024, 13).is_none());
    }

    #[test]
    fn test_labels() {
        let ym = YearMonth::new(2024, 3).unwrap();
        assert_eq!(ym.short_label(), "Mar/24");
        assert_eq!(ym.long_label(), "Março de 2024");
    }

    #[test]
    fn test_month_scope_resolve() {
        let today = d(2024, 1, 10);
        assert_eq!(
            MonthScope::Previous.resolve(today),
            YearMonth::new(2023, 12).unwrap()
        );
        assert_eq!("anterior".parse::<MonthScope>(), Ok(MonthScope::Previous));
    }

    #[test]
    fn test_parse_br_date() {
        assert_eq!(parse_br_date("05/03/2024"), Some(d(2024, 3, 5)));
        assert_eq!(format_br_date("2024-03-05"), "05/03/2024");
    }
}

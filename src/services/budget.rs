//! Monthly budget indicators derived from a user's incomes and expenses.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::date_utils::{format_date, parse_date, YearMonth};
use crate::db::queries::{expenses, incomes};
use crate::db::OwnerScope;
use crate::models::{ExpenseWithCategory, Income, Profile};

/// Month-over-month changes within this band (in percent) count as stable.
pub const TREND_DEADBAND_PERCENT: f64 = 3.0;

/// Months of history loaded before the reference month.
pub const HISTORY_MONTHS: i32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increase,
    Decrease,
    Stable,
    /// The previous month has no spending to compare against.
    NoBaseline,
}

impl Trend {
    pub fn label(&self) -> &'static str {
        match self {
            Trend::Increase => "Aumento",
            Trend::Decrease => "Redução",
            Trend::Stable => "Estável",
            Trend::NoBaseline => "Sem base",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapStatus {
    Ok,
    SoftCapReached,
    HardCapExceeded,
}

impl CapStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CapStatus::Ok => "Dentro do limite",
            CapStatus::SoftCapReached => "Limite de atenção atingido",
            CapStatus::HardCapExceeded => "Limite máximo ultrapassado",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyKpis {
    pub reference: String,
    pub total_income_cents: i64,
    pub total_investment_cents: i64,
    pub total_expenses_cents: i64,
    pub previous_expenses_cents: i64,
    pub available_cents: i64,
    pub balance_cents: i64,
    pub percent_used: f64,
    pub percent_used_clamped: f64,
    pub percent_remaining: f64,
    pub trend: Trend,
    pub trend_percent: f64,
    pub future_expenses_cents: i64,
    pub cap_status: CapStatus,
}

/// Expenses and incomes loaded once per dashboard render.
#[derive(Debug, Default)]
pub struct BudgetWindow {
    pub expenses: Vec<ExpenseWithCategory>,
    pub incomes: Vec<Income>,
}

/// Load `HISTORY_MONTHS` before `reference` plus everything dated later
/// (future installments feed the forward-looking indicator).
pub fn load_window(
    conn: &Connection,
    user_id: i64,
    reference: YearMonth,
) -> rusqlite::Result<BudgetWindow> {
    let from = format_date(reference.shift(-HISTORY_MONTHS).start());
    let scope = OwnerScope::Owner(user_id);
    Ok(BudgetWindow {
        expenses: expenses::list_expenses_between(conn, scope, &from, None)?,
        incomes: incomes::list_incomes(conn, scope, Some(&from), None)?,
    })
}

/// Share of the available budget consumed. Zero when nothing is available.
pub fn percent_of_budget(expenses_cents: i64, available_cents: i64) -> f64 {
    if available_cents > 0 {
        expenses_cents as f64 / available_cents as f64 * 100.0
    } else {
        0.0
    }
}

/// Compare this month's spending against the previous month.
pub fn compute_trend(current_cents: i64, previous_cents: i64) -> (Trend, f64) {
    if previous_cents <= 0 {
        return (Trend::NoBaseline, 0.0);
    }
    let diff = (current_cents - previous_cents) as f64 / previous_cents as f64 * 100.0;
    let trend = if diff > TREND_DEADBAND_PERCENT {
        Trend::Increase
    } else if diff < -TREND_DEADBAND_PERCENT {
        Trend::Decrease
    } else {
        Trend::Stable
    };
    (trend, diff)
}

pub fn cap_status(profile: &Profile, expenses_cents: i64) -> CapStatus {
    let reached = |cap: Option<i64>| cap.map(|c| c > 0 && expenses_cents >= c).unwrap_or(false);
    if reached(profile.hard_cap_cents) {
        CapStatus::HardCapExceeded
    } else if reached(profile.soft_cap_cents) {
        CapStatus::SoftCapReached
    } else {
        CapStatus::Ok
    }
}

fn expenses_in(expenses: &[ExpenseWithCategory], month: YearMonth) -> i64 {
    expenses
        .iter()
        .filter(|e| parse_date(&e.expense.date).is_some_and(|d| month.contains(d)))
        .map(|e| e.expense.amount_cents)
        .sum()
}

/// Income and investment totals for a month, fixed amounts included.
pub fn month_income(profile: &Profile, incomes: &[Income], month: YearMonth) -> (i64, i64) {
    let in_month = incomes
        .iter()
        .filter(|i| parse_date(&i.date).is_some_and(|d| month.contains(d)));
    let (gross, invested) = in_month.fold((0, 0), |(g, v), i| {
        (g + i.gross_cents, v + i.investment_cents)
    });
    (
        profile.fixed_income_cents + gross,
        profile.fixed_investment_cents + invested,
    )
}

pub fn compute_kpis(
    reference: YearMonth,
    profile: &Profile,
    window: &BudgetWindow,
    today: NaiveDate,
) -> MonthlyKpis {
    let (total_income_cents, total_investment_cents) =
        month_income(profile, &window.incomes, reference);
    let total_expenses_cents = expenses_in(&window.expenses, reference);
    let previous_expenses_cents = expenses_in(&window.expenses, reference.prev());

    let available_cents = total_income_cents - total_investment_cents;
    let balance_cents = available_cents - total_expenses_cents;
    let percent_used = percent_of_budget(total_expenses_cents, available_cents);
    let percent_used_clamped = percent_used.clamp(0.0, 100.0);
    let (trend, trend_percent) = compute_trend(total_expenses_cents, previous_expenses_cents);

    let future_expenses_cents = window
        .expenses
        .iter()
        .filter(|e| parse_date(&e.expense.date).is_some_and(|d| d > today))
        .map(|e| e.expense.amount_cents)
        .sum();

    MonthlyKpis {
        reference: reference.to_string(),
        total_income_cents,
        total_investment_cents,
        total_expenses_cents,
        previous_expenses_cents,
        available_cents,
        balance_cents,
        percent_used,
        percent_used_clamped,
        percent_remaining: 100.0 - percent_used_clamped,
        trend,
        trend_percent,
        future_expenses_cents,
        cap_status: cap_status(profile, total_expenses_cents),
    }
}

/// Available budget and spending for one month, read straight from SQL.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthBudget {
    pub available_cents: i64,
    pub expenses_cents: i64,
    pub percent_used: f64,
}

pub fn month_budget(
    conn: &Connection,
    profile: &Profile,
    month: YearMonth,
) -> rusqlite::Result<MonthBudget> {
    let (from, to) = month.bounds();
    let month_incomes =
        incomes::list_incomes(conn, OwnerScope::Owner(profile.user_id), Some(&from), Some(&to))?;
    let (income, investment) = month_income(profile, &month_incomes, month);
    let available_cents = income - investment;
    let expenses_cents = expenses::sum_expenses_between(conn, OwnerScope::Owner(profile.user_id), &from, &to)?;

    Ok(MonthBudget {
        available_cents,
        expenses_cents,
        percent_used: percent_of_budget(expenses_cents, available_cents),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Expense, ExpenseType, PaymentMethod};

    fn profile(fixed_income_cents: i64) -> Profile {
        Profile {
            id: 1,
            user_id: 1,
            currency: "BRL".into(),
            fixed_income_cents,
            fixed_investment_cents: 0,
            soft_cap_cents: None,
            hard_cap_cents: None,
            alerts_enabled: true,
            alert_thresholds: "80, 90, 100".into(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn expense(date: &str, amount_cents: i64) -> ExpenseWithCategory {
        ExpenseWithCategory {
            expense: Expense {
                id: 0,
                user_id: 1,
                category_id: None,
                issuer_name: String::new(),
                issuer_tax_id: None,
                description: "x".into(),
                amount_cents,
                discount_cents: 0,
                installment_index: 1,
                installment_count: 1,
                payment_method: PaymentMethod::Pix,
                expense_type: ExpenseType::Variavel,
                date: date.into(),
                notes: String::new(),
                item_count: 0,
                created_at: String::new(),
                updated_at: String::new(),
            },
            category_name: None,
            owner_email: String::new(),
        }
    }

    fn income(date: &str, gross_cents: i64, investment_cents: i64) -> Income {
        Income {
            id: 0,
            user_id: 1,
            description: "extra".into(),
            gross_cents,
            investment_cents,
            date: date.into(),
            notes: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn march() -> YearMonth {
        YearMonth::new(2024, 3).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_reference_kpi_example() {
        let window = BudgetWindow {
            expenses: vec![expense("2024-03-05", 50000), expense("2024-03-10", 20000)],
            incomes: vec![income("2024-03-01", 50000, 0)],
        };
        let kpis = compute_kpis(march(), &profile(300000), &window, today());

        assert_eq!(kpis.total_income_cents, 350000);
        assert_eq!(kpis.total_expenses_cents, 70000);
        assert_eq!(kpis.balance_cents, 280000);
        assert!((kpis.percent_used - 20.0).abs() < 1e-9);
        assert!((kpis.percent_remaining - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_investment_reduces_available() {
        let mut p = profile(300000);
        p.fixed_investment_cents = 50000;
        let window = BudgetWindow {
            expenses: vec![expense("2024-03-05", 25000)],
            incomes: vec![income("2024-03-01", 100000, 50000)],
        };
        let kpis = compute_kpis(march(), &p, &window, today());
        assert_eq!(kpis.total_investment_cents, 100000);
        assert_eq!(kpis.available_cents, 300000);
        assert_eq!(kpis.balance_cents, 275000);
    }

    #[test]
    fn test_zero_budget_reports_zero_percent() {
        let window = BudgetWindow {
            expenses: vec![expense("2024-03-05", 1000)],
            incomes: vec![],
        };
        let kpis = compute_kpis(march(), &profile(0), &window, today());
        assert_eq!(kpis.percent_used, 0.0);
        assert_eq!(kpis.percent_remaining, 100.0);
    }

    #[test]
    fn test_overspending_is_clamped_for_display() {
        let window = BudgetWindow {
            expenses: vec![expense("2024-03-05", 150000)],
            incomes: vec![],
        };
        let kpis = compute_kpis(march(), &profile(100000), &window, today());
        assert!((kpis.percent_used - 150.0).abs() < 1e-9);
        assert_eq!(kpis.percent_used_clamped, 100.0);
        assert_eq!(kpis.percent_remaining, 0.0);
        assert_eq!(kpis.balance_cents, -50000);
    }

    #[test]
    fn test_no_history_never_reports_direction() {
        let window = BudgetWindow {
            expenses: vec![expense("2024-03-05", 99999)],
            incomes: vec![],
        };
        let kpis = compute_kpis(march(), &profile(100000), &window, today());
        assert_eq!(kpis.trend, Trend::NoBaseline);
    }

    #[test]
    fn test_trend_deadband() {
        assert_eq!(compute_trend(10200, 10000).0, Trend::Stable);
        assert_eq!(compute_trend(9800, 10000).0, Trend::Stable);
        assert_eq!(compute_trend(10400, 10000).0, Trend::Increase);
        assert_eq!(compute_trend(9600, 10000).0, Trend::Decrease);
        assert_eq!(compute_trend(5000, 0).0, Trend::NoBaseline);
    }

    #[test]
    fn test_trend_uses_previous_month() {
        let window = BudgetWindow {
            expenses: vec![expense("2024-02-10", 10000), expense("2024-03-10", 20000)],
            incomes: vec![],
        };
        let kpis = compute_kpis(march(), &profile(100000), &window, today());
        assert_eq!(kpis.trend, Trend::Increase);
        assert!((kpis.trend_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_future_expenses_sum_after_today() {
        let window = BudgetWindow {
            expenses: vec![
                expense("2024-03-15", 1000),
                expense("2024-03-16", 2000),
                expense("2024-05-01", 3000),
            ],
            incomes: vec![],
        };
        let kpis = compute_kpis(march(), &profile(100000), &window, today());
        assert_eq!(kpis.future_expenses_cents, 5000);
    }

    #[test]
    fn test_cap_status() {
        let mut p = profile(100000);
        p.soft_cap_cents = Some(50000);
        p.hard_cap_cents = Some(80000);
        assert_eq!(cap_status(&p, 10000), CapStatus::Ok);
        assert_eq!(cap_status(&p, 50000), CapStatus::SoftCapReached);
        assert_eq!(cap_status(&p, 90000), CapStatus::HardCapExceeded);
    }
}

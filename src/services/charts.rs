//! Chart series for the dashboard, computed from rows already in memory.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::date_utils::{parse_date, YearMonth};
use crate::models::{Category, ExpenseWithCategory, Profile};
use crate::services::budget::{month_income, BudgetWindow};

pub const DEFAULT_ACTIVE_MONTHS: usize = 6;
pub const TOP_CATEGORIES: usize = 5;
pub const UNCATEGORIZED_LABEL: &str = "Sem categoria";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvolutionRange {
    #[default]
    SixMonths,
    TwelveMonths,
    Future,
}

impl FromStr for EvolutionRange {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "6m" => Ok(Self::SixMonths),
            "12m" | "1y" => Ok(Self::TwelveMonths),
            "future" | "futuro" => Ok(Self::Future),
            _ => Err(()),
        }
    }
}

impl EvolutionRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SixMonths => "6m",
            Self::TwelveMonths => "12m",
            Self::Future => "future",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SixMonths => "6 meses",
            Self::TwelveMonths => "12 meses",
            Self::Future => "Futuro",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub value_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySlice {
    pub name: String,
    pub total_cents: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetComparison {
    pub name: String,
    pub budget_cents: i64,
    pub actual_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomeExpenseSplit {
    pub label: String,
    pub expenses_cents: i64,
    pub investment_cents: i64,
    pub expense_percent: f64,
    pub investment_percent: f64,
    pub total_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardCharts {
    pub range: &'static str,
    pub evolution: Vec<ChartPoint>,
    pub category_pie: Vec<CategorySlice>,
    pub top_categories: Vec<CategorySlice>,
    pub budget_vs_actual: Vec<BudgetComparison>,
    pub income_vs_expense: Vec<IncomeExpenseSplit>,
}

fn expense_date(e: &ExpenseWithCategory) -> Option<NaiveDate> {
    parse_date(&e.expense.date)
}

/// The most recent `n` months with at least one expense dated on or before
/// the end of `reference`, oldest first.
pub fn active_months(
    expenses: &[ExpenseWithCategory],
    reference: YearMonth,
    n: usize,
) -> Vec<YearMonth> {
    let cutoff = reference.end();
    let months: BTreeSet<YearMonth> = expenses
        .iter()
        .filter_map(expense_date)
        .filter(|d| *d <= cutoff)
        .map(YearMonth::of)
        .collect();

    let mut recent: Vec<YearMonth> = months.into_iter().rev().take(n).collect();
    recent.reverse();
    recent
}

fn monthly_totals<'a>(
    expenses: impl Iterator<Item = &'a ExpenseWithCategory>,
) -> BTreeMap<YearMonth, i64> {
    let mut totals = BTreeMap::new();
    for e in expenses {
        if let Some(d) = expense_date(e) {
            *totals.entry(YearMonth::of(d)).or_insert(0) += e.expense.amount_cents;
        }
    }
    totals
}

/// Monthly spending series for the selected range.
pub fn evolution(
    expenses: &[ExpenseWithCategory],
    reference: YearMonth,
    range: EvolutionRange,
    today: NaiveDate,
) -> Vec<ChartPoint> {
    let to_points = |totals: BTreeMap<YearMonth, i64>, months: Vec<YearMonth>| -> Vec<ChartPoint> {
        months
            .into_iter()
            .map(|m| ChartPoint {
                label: m.short_label(),
                value_cents: totals.get(&m).copied().unwrap_or(0),
            })
            .collect()
    };

    match range {
        EvolutionRange::Future => {
            let totals = monthly_totals(
                expenses
                    .iter()
                    .filter(|e| expense_date(e).is_some_and(|d| d > today)),
            );
            let months = totals.keys().copied().collect();
            to_points(totals, months)
        }
        EvolutionRange::SixMonths | EvolutionRange::TwelveMonths => {
            let n = if range == EvolutionRange::TwelveMonths {
                12
            } else {
                DEFAULT_ACTIVE_MONTHS
            };
            let months = active_months(expenses, reference, n);
            to_points(monthly_totals(expenses.iter()), months)
        }
    }
}

fn category_totals<'a>(
    expenses: impl Iterator<Item = &'a ExpenseWithCategory>,
) -> Vec<CategorySlice> {
    let mut totals: HashMap<String, i64> = HashMap::new();
    for e in expenses {
        let name = e
            .category_name
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED_LABEL.to_string());
        *totals.entry(name).or_insert(0) += e.expense.amount_cents;
    }

    let grand_total: i64 = totals.values().sum();
    let mut slices: Vec<CategorySlice> = totals
        .into_iter()
        .map(|(name, total_cents)| CategorySlice {
            name,
            total_cents,
            percentage: if grand_total > 0 {
                total_cents as f64 / grand_total as f64 * 100.0
            } else {
                0.0
            },
        })
        .collect();

    slices.sort_by(|a, b| b.total_cents.cmp(&a.total_cents).then(a.name.cmp(&b.name)));
    slices
}

/// Spending per category within `month`, largest first.
pub fn category_pie(expenses: &[ExpenseWithCategory], month: YearMonth) -> Vec<CategorySlice> {
    category_totals(
        expenses
            .iter()
            .filter(|e| expense_date(e).is_some_and(|d| month.contains(d))),
    )
}

/// The `n` categories with the most spending across `expenses`.
pub fn top_categories(expenses: &[ExpenseWithCategory], n: usize) -> Vec<CategorySlice> {
    let mut slices = category_totals(expenses.iter());
    slices.truncate(n);
    slices
}

/// Each category's monthly budget next to what was spent in `month`.
pub fn budget_vs_actual(
    categories: &[Category],
    expenses: &[ExpenseWithCategory],
    month: YearMonth,
) -> Vec<BudgetComparison> {
    let mut spent: HashMap<i64, i64> = HashMap::new();
    for e in expenses
        .iter()
        .filter(|e| expense_date(e).is_some_and(|d| month.contains(d)))
    {
        if let Some(category_id) = e.expense.category_id {
            *spent.entry(category_id).or_insert(0) += e.expense.amount_cents;
        }
    }

    categories
        .iter()
        .map(|c| BudgetComparison {
            name: c.name.clone(),
            budget_cents: c.monthly_budget_cents,
            actual_cents: spent.get(&c.id).copied().unwrap_or(0),
        })
        .collect()
}

/// Investment versus spending for the six months ending at `reference`.
pub fn income_vs_expense(
    profile: &Profile,
    window: &BudgetWindow,
    reference: YearMonth,
) -> Vec<IncomeExpenseSplit> {
    let totals = monthly_totals(window.expenses.iter());

    (0..6)
        .rev()
        .map(|back| {
            let month = reference.shift(-back);
            let expenses_cents = totals.get(&month).copied().unwrap_or(0);
            let (_, investment_cents) = month_income(profile, &window.incomes, month);
            let total_cents = expenses_cents + investment_cents;
            let share = |part: i64| {
                if total_cents > 0 {
                    part as f64 / total_cents as f64 * 100.0
                } else {
                    0.0
                }
            };
            IncomeExpenseSplit {
                label: month.short_label(),
                expenses_cents,
                investment_cents,
                expense_percent: share(expenses_cents),
                investment_percent: share(investment_cents),
                total_cents,
            }
        })
        .collect()
}

/// Every series the dashboard draws.
pub fn build_charts(
    profile: &Profile,
    categories: &[Category],
    window: &BudgetWindow,
    reference: YearMonth,
    range: EvolutionRange,
    today: NaiveDate,
) -> DashboardCharts {
    let cutoff = reference.end();
    let up_to_reference: Vec<ExpenseWithCategory> = window
        .expenses
        .iter()
        .filter(|e| expense_date(e).is_some_and(|d| d <= cutoff))
        .cloned()
        .collect();

    DashboardCharts {
        range: range.as_str(),
        evolution: evolution(&window.expenses, reference, range, today),
        category_pie: category_pie(&window.expenses, reference),
        top_categories: top_categories(&up_to_reference, TOP_CATEGORIES),
        budget_vs_actual: budget_vs_actual(categories, &window.expenses, reference),
        income_vs_expense: income_vs_expense(profile, window, reference),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Expense, ExpenseType, PaymentMethod};

    fn expense(date: &str, amount_cents: i64, category: Option<(i64, &str)>) -> ExpenseWithCategory {
        ExpenseWithCategory {
            expense: Expense {
                id: 0,
                user_id: 1,
                category_id: category.map(|(id, _)| id),
                issuer_name: String::new(),
                issuer_tax_id: None,
                description: "x".into(),
                amount_cents,
                discount_cents: 0,
                installment_index: 1,
                installment_count: 1,
                payment_method: PaymentMethod::Debito,
                expense_type: ExpenseType::Variavel,
                date: date.into(),
                notes: String::new(),
                item_count: 0,
                created_at: String::new(),
                updated_at: String::new(),
            },
            category_name: category.map(|(_, name)| name.to_string()),
            owner_email: String::new(),
        }
    }

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    #[test]
    fn test_active_months_skips_empty_months_and_future() {
        let expenses = vec![
            expense("2023-10-05", 100, None),
            expense("2024-01-05", 100, None),
            expense("2024-01-20", 100, None),
            expense("2024-03-01", 100, None),
            expense("2024-06-01", 100, None),
        ];
        let months = active_months(&expenses, ym(2024, 3), 6);
        assert_eq!(months, vec![ym(2023, 10), ym(2024, 1), ym(2024, 3)]);

        let months = active_months(&expenses, ym(2024, 3), 2);
        assert_eq!(months, vec![ym(2024, 1), ym(2024, 3)]);
    }

    #[test]
    fn test_evolution_labels_and_totals() {
        let expenses = vec![
            expense("2024-01-05", 1000, None),
            expense("2024-01-20", 500, None),
            expense("2024-02-01", 700, None),
        ];
        let today = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let points = evolution(&expenses, ym(2024, 2), EvolutionRange::SixMonths, today);
        assert_eq!(
            points,
            vec![
                ChartPoint { label: "Jan/24".into(), value_cents: 1500 },
                ChartPoint { label: "Fev/24".into(), value_cents: 700 },
            ]
        );
    }

    #[test]
    fn test_evolution_future_range() {
        let expenses = vec![
            expense("2024-02-01", 700, None),
            expense("2024-03-10", 300, None),
            expense("2024-05-10", 300, None),
        ];
        let today = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let points = evolution(&expenses, ym(2024, 2), EvolutionRange::Future, today);
        let labels: Vec<&str> = points.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Mar/24", "Mai/24"]);
    }

    #[test]
    fn test_category_pie_groups_uncategorized() {
        let expenses = vec![
            expense("2024-03-01", 3000, Some((1, "Mercado"))),
            expense("2024-03-02", 1000, None),
            expense("2024-03-03", 1000, Some((1, "Mercado"))),
            expense("2024-04-03", 9000, Some((2, "Casa"))),
        ];
        let pie = category_pie(&expenses, ym(2024, 3));
        assert_eq!(pie.len(), 2);
        assert_eq!(pie[0].name, "Mercado");
        assert_eq!(pie[0].total_cents, 4000);
        assert!((pie[0].percentage - 80.0).abs() < 1e-9);
        assert_eq!(pie[1].name, UNCATEGORIZED_LABEL);
    }

    #[test]
    fn test_top_categories_limits_and_orders() {
        let names = ["A", "B", "C", "D", "E", "F", "G"];
        let expenses: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, n)| expense("2024-03-01", (i as i64 + 1) * 100, Some((i as i64, n))))
            .collect();
        let top = top_categories(&expenses, TOP_CATEGORIES);
        let top_names: Vec<&str> = top.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(top_names, vec!["G", "F", "E", "D", "C"]);
    }

    #[test]
    fn test_budget_vs_actual_includes_unused_categories() {
        let categories = vec![
            Category {
                id: 1,
                user_id: 1,
                name: "Casa".into(),
                normalized_name: "casa".into(),
                monthly_budget_cents: 50000,
                created_at: String::new(),
                updated_at: String::new(),
            },
            Category {
                id: 2,
                user_id: 1,
                name: "Lazer".into(),
                normalized_name: "lazer".into(),
                monthly_budget_cents: 0,
                created_at: String::new(),
                updated_at: String::new(),
            },
        ];
        let expenses = vec![expense("2024-03-01", 12000, Some((1, "Casa")))];
        let rows = budget_vs_actual(&categories, &expenses, ym(2024, 3));
        assert_eq!(rows[0].actual_cents, 12000);
        assert_eq!(rows[0].budget_cents, 50000);
        assert_eq!(rows[1].actual_cents, 0);
    }

    #[test]
    fn test_income_vs_expense_covers_six_months() {
        let profile = Profile {
            id: 1,
            user_id: 1,
            currency: "BRL".into(),
            fixed_income_cents: 500000,
            fixed_investment_cents: 100000,
            soft_cap_cents: None,
            hard_cap_cents: None,
            alerts_enabled: true,
            alert_thresholds: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let window = BudgetWindow {
            expenses: vec![expense("2024-03-01", 300000, None)],
            incomes: vec![],
        };
        let split = income_vs_expense(&profile, &window, ym(2024, 3));
        assert_eq!(split.len(), 6);
        assert_eq!(split[0].label, "Out/23");
        let march = split.last().unwrap();
        assert_eq!(march.total_cents, 400000);
        assert!((march.expense_percent - 75.0).abs() < 1e-9);
        assert!((march.investment_percent - 25.0).abs() < 1e-9);
    }
}

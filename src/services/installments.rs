//! Splitting a purchase into monthly installment rows.

use chrono::NaiveDate;

use crate::date_utils::{add_months, format_date};
use crate::models::{NewExpense, NewExpenseItem};

pub const MAX_INSTALLMENTS: i64 = 12;

/// Split `total_cents` into `count` shares that sum exactly to the total.
/// The first `total % count` shares carry one extra cent.
pub fn split_cents(total_cents: i64, count: i64) -> Vec<i64> {
    if count <= 0 {
        return Vec::new();
    }
    let base = total_cents / count;
    let remainder = total_cents % count;
    (0..count)
        .map(|i| base + if i < remainder { 1 } else { 0 })
        .collect()
}

fn divide_rounded(value: i64, divisor: i64) -> i64 {
    if divisor <= 1 {
        return value;
    }
    (value as f64 / divisor as f64).round() as i64
}

/// Expand one purchase into `purchase.installment_count` rows.
///
/// Row `i` is dated `purchase_date + i` months, carries its share of the
/// amount, and the discount stays on the first row. Line items are copied to
/// every row with their prices divided by the installment count.
pub fn plan_installments(
    purchase: &NewExpense,
    purchase_date: NaiveDate,
    items: &[NewExpenseItem],
) -> Vec<(NewExpense, Vec<NewExpenseItem>)> {
    let count = purchase.installment_count.clamp(1, MAX_INSTALLMENTS);
    let shares = split_cents(purchase.amount_cents, count);

    let per_row_items: Vec<NewExpenseItem> = items
        .iter()
        .map(|item| NewExpenseItem {
            unit_price_cents: divide_rounded(item.unit_price_cents, count),
            total_cents: divide_rounded(item.total_cents, count),
            ..item.clone()
        })
        .collect();

    shares
        .into_iter()
        .enumerate()
        .map(|(i, amount_cents)| {
            let row = NewExpense {
                amount_cents,
                discount_cents: if i == 0 { purchase.discount_cents } else { 0 },
                installment_index: i as i64 + 1,
                installment_count: count,
                date: format_date(add_months(purchase_date, i as i32)),
                ..purchase.clone()
            };
            (row, per_row_items.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExpenseType, PaymentMethod};

    fn purchase(amount_cents: i64, count: i64) -> NewExpense {
        NewExpense {
            category_id: Some(1),
            issuer_name: "Loja".into(),
            issuer_tax_id: None,
            description: "Geladeira".into(),
            amount_cents,
            discount_cents: 500,
            installment_index: 1,
            installment_count: count,
            payment_method: PaymentMethod::Credito,
            expense_type: ExpenseType::Variavel,
            date: "2024-01-31".into(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_split_sums_to_total_and_differs_by_at_most_one_cent() {
        for total in [1, 99, 100, 1000, 1001, 99999, 123457] {
            for count in 1..=12 {
                let shares = split_cents(total, count);
                assert_eq!(shares.len() as i64, count);
                assert_eq!(shares.iter().sum::<i64>(), total);
                let max = shares.iter().max().unwrap();
                let min = shares.iter().min().unwrap();
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn test_split_extra_cents_go_first() {
        assert_eq!(split_cents(1000, 3), vec![334, 333, 333]);
    }

    #[test]
    fn test_plan_dates_and_discount() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let rows = plan_installments(&purchase(100000, 3), date, &[]);

        let dates: Vec<&str> = rows.iter().map(|(r, _)| r.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-01-31", "2024-02-29", "2024-03-31"]);

        assert_eq!(rows[0].0.discount_cents, 500);
        assert!(rows[1..].iter().all(|(r, _)| r.discount_cents == 0));

        let indexes: Vec<i64> = rows.iter().map(|(r, _)| r.installment_index).collect();
        assert_eq!(indexes, vec![1, 2, 3]);
        assert!(rows.iter().all(|(r, _)| r.installment_count == 3));
    }

    #[test]
    fn test_items_replicated_with_divided_prices() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let item = NewExpenseItem {
            name: "TV".into(),
            code: None,
            quantity_milli: 1000,
            unit: Some("UN".into()),
            unit_price_cents: 300000,
            total_cents: 300000,
        };
        let rows = plan_installments(&purchase(300000, 4), date, &[item]);

        assert_eq!(rows.len(), 4);
        for (_, items) in &rows {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].unit_price_cents, 75000);
            assert_eq!(items[0].total_cents, 75000);
            assert_eq!(items[0].quantity_milli, 1000);
        }
    }

    #[test]
    fn test_single_payment_keeps_everything() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let rows = plan_installments(&purchase(4550, 1), date, &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.amount_cents, 4550);
        assert_eq!(rows[0].0.date, "2024-05-10");
    }
}

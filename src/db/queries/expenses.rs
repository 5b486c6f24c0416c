use crate::db::queries::param_refs;
use crate::db::OwnerScope;
use crate::models::{
    Expense, ExpenseItem, ExpenseType, ExpenseWithCategory, NewExpense, NewExpenseItem,
    PaymentMethod,
};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tracing::{debug, info};

const EXPENSE_COLUMNS: &str = "e.id, e.user_id, e.category_id, e.issuer_name, e.issuer_tax_id,
     e.description, e.amount_cents, e.discount_cents, e.installment_index, e.installment_count,
     e.payment_method, e.expense_type, e.date, e.notes, e.item_count, e.created_at, e.updated_at";

fn row_to_expense(row: &Row) -> rusqlite::Result<Expense> {
    let payment_method: String = row.get(10)?;
    let expense_type: String = row.get(11)?;
    Ok(Expense {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        issuer_name: row.get(3)?,
        issuer_tax_id: row.get(4)?,
        description: row.get(5)?,
        amount_cents: row.get(6)?,
        discount_cents: row.get(7)?,
        installment_index: row.get(8)?,
        installment_count: row.get(9)?,
        payment_method: PaymentMethod::parse(&payment_method).unwrap_or(PaymentMethod::Outros),
        expense_type: ExpenseType::parse(&expense_type).unwrap_or(ExpenseType::Variavel),
        date: row.get(12)?,
        notes: row.get(13)?,
        item_count: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

#[derive(Debug, Default, Clone)]
pub struct ExpenseFilter {
    /// Matches issuer name or description.
    pub search: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub category_id: Option<i64>,
    pub limit: Option<i64>,
}

pub fn list_expenses(
    conn: &Connection,
    scope: OwnerScope,
    filter: &ExpenseFilter,
) -> rusqlite::Result<Vec<ExpenseWithCategory>> {
    let mut sql = format!(
        "SELECT {}, c.name, u.email
         FROM expenses e
         LEFT JOIN categories c ON e.category_id = c.id
         JOIN users u ON e.user_id = u.id
         WHERE 1=1",
        EXPENSE_COLUMNS
    );
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();
    scope.apply("e.user_id", &mut sql, &mut params_vec);

    if let Some(ref search) = filter.search {
        sql.push_str(" AND (e.issuer_name LIKE ? OR e.description LIKE ?)");
        params_vec.push(Box::new(format!("%{}%", search)));
        params_vec.push(Box::new(format!("%{}%", search)));
    }
    if let Some(ref from_date) = filter.from_date {
        sql.push_str(" AND e.date >= ?");
        params_vec.push(Box::new(from_date.clone()));
    }
    if let Some(ref to_date) = filter.to_date {
        sql.push_str(" AND e.date <= ?");
        params_vec.push(Box::new(to_date.clone()));
    }
    if let Some(method) = filter.payment_method {
        sql.push_str(" AND e.payment_method = ?");
        params_vec.push(Box::new(method.as_str()));
    }
    if let Some(category_id) = filter.category_id {
        sql.push_str(" AND e.category_id = ?");
        params_vec.push(Box::new(category_id));
    }

    sql.push_str(" ORDER BY e.date DESC, e.id DESC");

    if let Some(limit) = filter.limit {
        sql.push_str(" LIMIT ?");
        params_vec.push(Box::new(limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let expenses: Vec<ExpenseWithCategory> = stmt
        .query_map(param_refs(&params_vec).as_slice(), |row| {
            Ok(ExpenseWithCategory {
                expense: row_to_expense(row)?,
                category_name: row.get(17)?,
                owner_email: row.get(18)?,
            })
        })?
        .filter_map(|e| e.ok())
        .collect();

    debug!(count = expenses.len(), "Listed expenses");
    Ok(expenses)
}

pub fn get_expense(
    conn: &Connection,
    scope: OwnerScope,
    id: i64,
) -> rusqlite::Result<Option<Expense>> {
    let mut sql = format!("SELECT {} FROM expenses e WHERE e.id = ?", EXPENSE_COLUMNS);
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(id)];
    scope.apply("e.user_id", &mut sql, &mut params_vec);

    conn.query_row(&sql, param_refs(&params_vec).as_slice(), row_to_expense)
        .optional()
}

pub fn list_items(conn: &Connection, expense_id: i64) -> rusqlite::Result<Vec<ExpenseItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, expense_id, name, code, quantity_milli, unit, unit_price_cents, total_cents
         FROM expense_items WHERE expense_id = ? ORDER BY id",
    )?;
    let items = stmt
        .query_map([expense_id], |row| {
            Ok(ExpenseItem {
                id: row.get(0)?,
                expense_id: row.get(1)?,
                name: row.get(2)?,
                code: row.get(3)?,
                quantity_milli: row.get(4)?,
                unit: row.get(5)?,
                unit_price_cents: row.get(6)?,
                total_cents: row.get(7)?,
            })
        })?
        .filter_map(|i| i.ok())
        .collect();
    Ok(items)
}

fn insert_items(
    conn: &Connection,
    expense_id: i64,
    items: &[NewExpenseItem],
) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO expense_items
         (expense_id, name, code, quantity_milli, unit, unit_price_cents, total_cents)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )?;
    for item in items {
        stmt.execute(params![
            expense_id,
            item.name,
            item.code,
            item.quantity_milli,
            item.unit,
            item.unit_price_cents,
            item.total_cents
        ])?;
    }
    Ok(())
}

fn insert_expense(
    conn: &Connection,
    user_id: i64,
    expense: &NewExpense,
    items: &[NewExpenseItem],
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO expenses (user_id, category_id, issuer_name, issuer_tax_id, description,
         amount_cents, discount_cents, installment_index, installment_count, payment_method,
         expense_type, date, notes, item_count)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            user_id,
            expense.category_id,
            expense.issuer_name,
            expense.issuer_tax_id,
            expense.description,
            expense.amount_cents,
            expense.discount_cents,
            expense.installment_index,
            expense.installment_count,
            expense.payment_method.as_str(),
            expense.expense_type.as_str(),
            expense.date,
            expense.notes,
            items.len() as i64
        ],
    )?;
    let id = conn.last_insert_rowid();
    insert_items(conn, id, items)?;
    Ok(id)
}

/// Write every installment row of one purchase, with its items, atomically.
pub fn create_expenses(
    conn: &Connection,
    user_id: i64,
    rows: &[(NewExpense, Vec<NewExpenseItem>)],
) -> rusqlite::Result<Vec<i64>> {
    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::with_capacity(rows.len());
    for (expense, items) in rows {
        ids.push(insert_expense(&tx, user_id, expense, items)?);
    }
    tx.commit()?;

    info!(user_id, count = ids.len(), "Created expenses");
    Ok(ids)
}

/// Update one expense row. When `items` is given the item set is replaced.
pub fn update_expense(
    conn: &Connection,
    scope: OwnerScope,
    id: i64,
    expense: &NewExpense,
    items: Option<&[NewExpenseItem]>,
) -> rusqlite::Result<bool> {
    let tx = conn.unchecked_transaction()?;

    let mut sql = String::from(
        "UPDATE expenses SET category_id = ?, issuer_name = ?, issuer_tax_id = ?, description = ?,
         amount_cents = ?, discount_cents = ?, payment_method = ?, expense_type = ?, date = ?,
         notes = ?, updated_at = datetime('now')
         WHERE id = ?",
    );
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![
        Box::new(expense.category_id),
        Box::new(expense.issuer_name.clone()),
        Box::new(expense.issuer_tax_id.clone()),
        Box::new(expense.description.clone()),
        Box::new(expense.amount_cents),
        Box::new(expense.discount_cents),
        Box::new(expense.payment_method.as_str()),
        Box::new(expense.expense_type.as_str()),
        Box::new(expense.date.clone()),
        Box::new(expense.notes.clone()),
        Box::new(id),
    ];
    scope.apply("user_id", &mut sql, &mut params_vec);

    let rows = tx.execute(&sql, param_refs(&params_vec).as_slice())?;
    if rows == 0 {
        return Ok(false);
    }

    if let Some(items) = items {
        tx.execute("DELETE FROM expense_items WHERE expense_id = ?", [id])?;
        insert_items(&tx, id, items)?;
        tx.execute(
            "UPDATE expenses SET item_count = ? WHERE id = ?",
            params![items.len() as i64, id],
        )?;
    }
    tx.commit()?;

    debug!(expense_id = id, "Updated expense");
    Ok(true)
}

pub fn delete_expense(conn: &Connection, scope: OwnerScope, id: i64) -> rusqlite::Result<bool> {
    let mut sql = String::from("DELETE FROM expenses WHERE id = ?");
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(id)];
    scope.apply("user_id", &mut sql, &mut params_vec);

    let rows = conn.execute(&sql, param_refs(&params_vec).as_slice())?;
    if rows > 0 {
        debug!(expense_id = id, "Deleted expense");
    }
    Ok(rows > 0)
}

/// Raw rows used by the KPI and chart computations.
pub fn list_expenses_between(
    conn: &Connection,
    scope: OwnerScope,
    from_date: &str,
    to_date: Option<&str>,
) -> rusqlite::Result<Vec<ExpenseWithCategory>> {
    let filter = ExpenseFilter {
        from_date: Some(from_date.to_string()),
        to_date: to_date.map(str::to_string),
        ..Default::default()
    };
    list_expenses(conn, scope, &filter)
}

pub fn sum_expenses_between(
    conn: &Connection,
    scope: OwnerScope,
    from_date: &str,
    to_date: &str,
) -> rusqlite::Result<i64> {
    let mut sql = String::from(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM expenses WHERE date >= ? AND date <= ?",
    );
    let mut params_vec: Vec<Box<dyn ToSql>> =
        vec![Box::new(from_date.to_string()), Box::new(to_date.to_string())];
    scope.apply("user_id", &mut sql, &mut params_vec);

    conn.query_row(&sql, param_refs(&params_vec).as_slice(), |row| row.get(0))
}

use crate::db::queries::param_refs;
use crate::db::OwnerScope;
use crate::models::{Income, NewIncome};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tracing::debug;

const INCOME_COLUMNS: &str = "id, user_id, description, gross_cents, investment_cents, date, notes,
     created_at, updated_at";

fn row_to_income(row: &Row) -> rusqlite::Result<Income> {
    Ok(Income {
        id: row.get(0)?,
        user_id: row.get(1)?,
        description: row.get(2)?,
        gross_cents: row.get(3)?,
        investment_cents: row.get(4)?,
        date: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Incomes dated in `[from_date, to_date]`, newest first. Open bounds are `None`.
pub fn list_incomes(
    conn: &Connection,
    scope: OwnerScope,
    from_date: Option<&str>,
    to_date: Option<&str>,
) -> rusqlite::Result<Vec<Income>> {
    let mut sql = format!("SELECT {} FROM incomes WHERE 1=1", INCOME_COLUMNS);
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();
    scope.apply("user_id", &mut sql, &mut params_vec);

    if let Some(from) = from_date {
        sql.push_str(" AND date >= ?");
        params_vec.push(Box::new(from.to_string()));
    }
    if let Some(to) = to_date {
        sql.push_str(" AND date <= ?");
        params_vec.push(Box::new(to.to_string()));
    }
    sql.push_str(" ORDER BY date DESC, id DESC");

    let mut stmt = conn.prepare(&sql)?;
    let incomes = stmt
        .query_map(param_refs(&params_vec).as_slice(), row_to_income)?
        .filter_map(|i| i.ok())
        .collect();
    Ok(incomes)
}

pub fn get_income(
    conn: &Connection,
    scope: OwnerScope,
    id: i64,
) -> rusqlite::Result<Option<Income>> {
    let mut sql = format!("SELECT {} FROM incomes WHERE id = ?", INCOME_COLUMNS);
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(id)];
    scope.apply("user_id", &mut sql, &mut params_vec);

    conn.query_row(&sql, param_refs(&params_vec).as_slice(), row_to_income)
        .optional()
}

pub fn create_income(conn: &Connection, user_id: i64, income: &NewIncome) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO incomes (user_id, description, gross_cents, investment_cents, date, notes)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            user_id,
            income.description,
            income.gross_cents,
            income.investment_cents,
            income.date,
            income.notes
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(income_id = id, user_id, "Created income");
    Ok(id)
}

pub fn update_income(
    conn: &Connection,
    scope: OwnerScope,
    id: i64,
    income: &NewIncome,
) -> rusqlite::Result<bool> {
    let mut sql = String::from(
        "UPDATE incomes SET description = ?, gross_cents = ?, investment_cents = ?, date = ?,
         notes = ?, updated_at = datetime('now') WHERE id = ?",
    );
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![
        Box::new(income.description.clone()),
        Box::new(income.gross_cents),
        Box::new(income.investment_cents),
        Box::new(income.date.clone()),
        Box::new(income.notes.clone()),
        Box::new(id),
    ];
    scope.apply("user_id", &mut sql, &mut params_vec);

    let rows = conn.execute(&sql, param_refs(&params_vec).as_slice())?;
    if rows > 0 {
        debug!(income_id = id, "Updated income");
    }
    Ok(rows > 0)
}

pub fn delete_income(conn: &Connection, scope: OwnerScope, id: i64) -> rusqlite::Result<bool> {
    let mut sql = String::from("DELETE FROM incomes WHERE id = ?");
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(id)];
    scope.apply("user_id", &mut sql, &mut params_vec);

    let rows = conn.execute(&sql, param_refs(&params_vec).as_slice())?;
    if rows > 0 {
        debug!(income_id = id, "Deleted income");
    }
    Ok(rows > 0)
}

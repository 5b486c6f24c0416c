use crate::db::queries::param_refs;
use crate::db::OwnerScope;
use crate::models::category::normalize_category_name;
use crate::models::{Category, CategoryWithSpending, NewCategory, DEFAULT_CATEGORIES};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tracing::debug;

const CATEGORY_COLUMNS: &str =
    "c.id, c.user_id, c.name, c.normalized_name, c.monthly_budget_cents, c.created_at, c.updated_at";

fn row_to_category(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        normalized_name: row.get(3)?,
        monthly_budget_cents: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub fn list_categories(conn: &Connection, scope: OwnerScope) -> rusqlite::Result<Vec<Category>> {
    let mut sql = format!("SELECT {} FROM categories c WHERE 1=1", CATEGORY_COLUMNS);
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();
    scope.apply("c.user_id", &mut sql, &mut params_vec);
    sql.push_str(" ORDER BY c.name COLLATE NOCASE, c.id");

    let mut stmt = conn.prepare(&sql)?;
    let categories = stmt
        .query_map(param_refs(&params_vec).as_slice(), row_to_category)?
        .filter_map(|c| c.ok())
        .collect();

    Ok(categories)
}

/// Categories with the sum of expenses dated in `[from_date, to_date]`.
pub fn list_categories_with_spending(
    conn: &Connection,
    scope: OwnerScope,
    from_date: &str,
    to_date: &str,
) -> rusqlite::Result<Vec<CategoryWithSpending>> {
    let mut sql = format!(
        "SELECT {}, COALESCE((
             SELECT SUM(e.amount_cents) FROM expenses e
             WHERE e.category_id = c.id AND e.date >= ? AND e.date <= ?
         ), 0)
         FROM categories c WHERE 1=1",
        CATEGORY_COLUMNS
    );
    let mut params_vec: Vec<Box<dyn ToSql>> =
        vec![Box::new(from_date.to_string()), Box::new(to_date.to_string())];
    scope.apply("c.user_id", &mut sql, &mut params_vec);
    sql.push_str(" ORDER BY c.name COLLATE NOCASE, c.id");

    let mut stmt = conn.prepare(&sql)?;
    let categories = stmt
        .query_map(param_refs(&params_vec).as_slice(), |row| {
            Ok(CategoryWithSpending {
                category: row_to_category(row)?,
                spent_cents: row.get(7)?,
            })
        })?
        .filter_map(|c| c.ok())
        .collect();

    Ok(categories)
}

pub fn get_category(
    conn: &Connection,
    scope: OwnerScope,
    id: i64,
) -> rusqlite::Result<Option<Category>> {
    let mut sql = format!("SELECT {} FROM categories c WHERE c.id = ?", CATEGORY_COLUMNS);
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(id)];
    scope.apply("c.user_id", &mut sql, &mut params_vec);

    conn.query_row(&sql, param_refs(&params_vec).as_slice(), row_to_category)
        .optional()
}

/// Whether another category of the user already uses this normalized name.
pub fn name_taken(
    conn: &Connection,
    user_id: i64,
    name: &str,
    exclude_id: Option<i64>,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories
         WHERE user_id = ? AND normalized_name = ? AND id != COALESCE(?, -1))",
        params![user_id, normalize_category_name(name), exclude_id],
        |row| row.get(0),
    )
}

pub fn create_category(
    conn: &Connection,
    user_id: i64,
    category: &NewCategory,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO categories (user_id, name, normalized_name, monthly_budget_cents)
         VALUES (?, ?, ?, ?)",
        params![
            user_id,
            category.name.trim(),
            category.normalized_name(),
            category.monthly_budget_cents
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(category_id = id, user_id, name = %category.name, "Created category");
    Ok(id)
}

pub fn update_category(
    conn: &Connection,
    scope: OwnerScope,
    id: i64,
    category: &NewCategory,
) -> rusqlite::Result<bool> {
    let mut sql = String::from(
        "UPDATE categories SET name = ?, normalized_name = ?, monthly_budget_cents = ?,
         updated_at = datetime('now') WHERE id = ?",
    );
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![
        Box::new(category.name.trim().to_string()),
        Box::new(category.normalized_name()),
        Box::new(category.monthly_budget_cents),
        Box::new(id),
    ];
    scope.apply("user_id", &mut sql, &mut params_vec);

    let rows = conn.execute(&sql, param_refs(&params_vec).as_slice())?;
    if rows > 0 {
        debug!(category_id = id, name = %category.name, "Updated category");
    }
    Ok(rows > 0)
}

/// Delete a category. Its expenses keep existing with no category.
pub fn delete_category(conn: &Connection, scope: OwnerScope, id: i64) -> rusqlite::Result<bool> {
    let mut sql = String::from("DELETE FROM categories WHERE id = ?");
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(id)];
    scope.apply("user_id", &mut sql, &mut params_vec);

    let rows = conn.execute(&sql, param_refs(&params_vec).as_slice())?;
    if rows > 0 {
        debug!(category_id = id, "Deleted category");
    }
    Ok(rows > 0)
}

/// Insert the starter category set for a new user, skipping names the user
/// already has.
pub fn create_default_categories(conn: &Connection, user_id: i64) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO categories (user_id, name, normalized_name) VALUES (?, ?, ?)",
    )?;
    let mut created = 0;
    for name in DEFAULT_CATEGORIES {
        created += stmt.execute(params![user_id, name, normalize_category_name(name)])?;
    }
    debug!(user_id, count = created, "Created default categories");
    Ok(created)
}

/// Map a unique-index violation on insert/update to `true`.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

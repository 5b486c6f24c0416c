use crate::models::{NewUser, User};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

const USER_COLUMNS: &str = "id, email, name, password_hash, is_superuser, created_at";

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        is_superuser: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn create_user(conn: &Connection, user: &NewUser) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO users (email, name, password_hash, is_superuser) VALUES (?, ?, ?, ?)",
        params![
            user.email.trim().to_lowercase(),
            user.name.trim(),
            user.password_hash,
            user.is_superuser
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(user_id = id, "Created user");
    Ok(id)
}

pub fn get_user(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
        [id],
        row_to_user,
    )
    .optional()
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS),
        [email.trim().to_lowercase()],
        row_to_user,
    )
    .optional()
}

pub fn count_users(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
}

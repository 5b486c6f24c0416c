use crate::models::{Profile, ProfileUpdate};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

const PROFILE_COLUMNS: &str = "id, user_id, currency, fixed_income_cents, fixed_investment_cents,
     soft_cap_cents, hard_cap_cents, alerts_enabled, alert_thresholds, created_at, updated_at";

fn row_to_profile(row: &Row) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        currency: row.get(2)?,
        fixed_income_cents: row.get(3)?,
        fixed_investment_cents: row.get(4)?,
        soft_cap_cents: row.get(5)?,
        hard_cap_cents: row.get(6)?,
        alerts_enabled: row.get(7)?,
        alert_thresholds: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub fn get_profile_by_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Option<Profile>> {
    conn.query_row(
        &format!("SELECT {} FROM profiles WHERE user_id = ?", PROFILE_COLUMNS),
        [user_id],
        row_to_profile,
    )
    .optional()
}

/// Return the user's profile, inserting one with defaults if it is missing.
pub fn get_or_create_profile(conn: &Connection, user_id: i64) -> rusqlite::Result<Profile> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO profiles (user_id) VALUES (?)",
        [user_id],
    )?;
    if inserted > 0 {
        debug!(user_id, "Created profile");
    }
    conn.query_row(
        &format!("SELECT {} FROM profiles WHERE user_id = ?", PROFILE_COLUMNS),
        [user_id],
        row_to_profile,
    )
}

pub fn update_profile(
    conn: &Connection,
    user_id: i64,
    update: &ProfileUpdate,
) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "UPDATE profiles SET currency = ?, fixed_income_cents = ?, fixed_investment_cents = ?,
         soft_cap_cents = ?, hard_cap_cents = ?, alerts_enabled = ?, alert_thresholds = ?,
         updated_at = datetime('now')
         WHERE user_id = ?",
        params![
            update.currency,
            update.fixed_income_cents,
            update.fixed_investment_cents,
            update.soft_cap_cents,
            update.hard_cap_cents,
            update.alerts_enabled,
            update.alert_thresholds,
            user_id
        ],
    )?;
    if rows > 0 {
        debug!(user_id, "Updated profile");
    }
    Ok(rows > 0)
}

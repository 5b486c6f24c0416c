//! Ledger of budget thresholds already notified.
//!
//! The `UNIQUE (profile_id, year, month, percentage)` constraint is what
//! keeps concurrent checks from sending the same alert twice: whoever
//! inserts the row owns the e-mail.

use crate::models::BudgetAlert;
use rusqlite::{params, Connection};
use tracing::debug;

pub fn list_alerts(
    conn: &Connection,
    profile_id: i64,
    year: i32,
    month: u32,
) -> rusqlite::Result<Vec<BudgetAlert>> {
    let mut stmt = conn.prepare(
        "SELECT id, profile_id, year, month, percentage, sent_at FROM budget_alerts
         WHERE profile_id = ? AND year = ? AND month = ?
         ORDER BY percentage",
    )?;
    let alerts = stmt
        .query_map(params![profile_id, year, month], |row| {
            Ok(BudgetAlert {
                id: row.get(0)?,
                profile_id: row.get(1)?,
                year: row.get(2)?,
                month: row.get(3)?,
                percentage: row.get(4)?,
                sent_at: row.get(5)?,
            })
        })?
        .filter_map(|a| a.ok())
        .collect();
    Ok(alerts)
}

/// Remove thresholds above the current consumption so they can fire again.
pub fn prune_above(
    conn: &Connection,
    profile_id: i64,
    year: i32,
    month: u32,
    percent: f64,
) -> rusqlite::Result<usize> {
    let rows = conn.execute(
        "DELETE FROM budget_alerts
         WHERE profile_id = ? AND year = ? AND month = ? AND percentage > ?",
        params![profile_id, year, month, percent],
    )?;
    if rows > 0 {
        debug!(profile_id, year, month, count = rows, "Pruned stale budget alerts");
    }
    Ok(rows)
}

pub fn exists_above(
    conn: &Connection,
    profile_id: i64,
    year: i32,
    month: u32,
    threshold: u32,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM budget_alerts
         WHERE profile_id = ? AND year = ? AND month = ? AND percentage > ?)",
        params![profile_id, year, month, threshold],
        |row| row.get(0),
    )
}

/// Try to claim a threshold. Returns `false` when it was already recorded.
pub fn claim(
    conn: &Connection,
    profile_id: i64,
    year: i32,
    month: u32,
    threshold: u32,
) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO budget_alerts (profile_id, year, month, percentage)
         VALUES (?, ?, ?, ?)",
        params![profile_id, year, month, threshold],
    )?;
    Ok(rows > 0)
}

/// Give a claimed threshold back after the e-mail could not be sent.
pub fn release(
    conn: &Connection,
    profile_id: i64,
    year: i32,
    month: u32,
    threshold: u32,
) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "DELETE FROM budget_alerts
         WHERE profile_id = ? AND year = ? AND month = ? AND percentage = ?",
        params![profile_id, year, month, threshold],
    )?;
    Ok(rows > 0)
}

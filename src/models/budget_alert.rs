use serde::Serialize;

/// A threshold already notified for a profile and month.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetAlert {
    pub id: i64,
    pub profile_id: i64,
    pub year: i32,
    pub month: u32,
    pub percentage: u32,
    pub sent_at: String,
}

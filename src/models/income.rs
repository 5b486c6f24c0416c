use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Income {
    pub id: i64,
    pub user_id: i64,
    pub description: String,
    pub gross_cents: i64,
    /// Portion set aside for investment or retained at source.
    pub investment_cents: i64,
    pub date: String,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Income {
    pub fn net_cents(&self) -> i64 {
        self.gross_cents - self.investment_cents
    }
}

#[derive(Debug, Clone)]
pub struct NewIncome {
    pub description: String,
    pub gross_cents: i64,
    pub investment_cents: i64,
    pub date: String,
    pub notes: String,
}

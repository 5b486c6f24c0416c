//! Ownership scope carried by every query over user-owned rows.

use rusqlite::ToSql;

/// Which rows a query may see.
///
/// Request handlers obtain `Owner` from the authenticated user. `All` is only
/// handed out by [`crate::auth::CurrentUser::admin_scope`] to superusers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerScope {
    Owner(i64),
    All,
}

impl OwnerScope {
    /// Append ` AND {column} = ?` and its parameter when scoped to an owner.
    pub fn apply(&self, column: &str, sql: &mut String, params: &mut Vec<Box<dyn ToSql>>) {
        if let OwnerScope::Owner(user_id) = self {
            sql.push_str(&format!(" AND {} = ?", column));
            params.push(Box::new(*user_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_owner_adds_predicate() {
        let mut sql = String::from("SELECT 1 FROM expenses WHERE 1=1");
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        OwnerScope::Owner(3).apply("user_id", &mut sql, &mut params);
        assert!(sql.ends_with(" AND user_id = ?"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_apply_all_adds_nothing() {
        let mut sql = String::from("SELECT 1 FROM expenses WHERE 1=1");
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        OwnerScope::All.apply("user_id", &mut sql, &mut params);
        assert_eq!(sql, "SELECT 1 FROM expenses WHERE 1=1");
        assert!(params.is_empty());
    }
}

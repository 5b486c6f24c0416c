pub mod alerts;
pub mod categories;
pub mod expenses;
pub mod incomes;
pub mod profiles;
pub mod users;

/// Borrow boxed parameters in the form `query_map`/`execute` expect.
pub(crate) fn param_refs(params: &[Box<dyn rusqlite::ToSql>]) -> Vec<&dyn rusqlite::ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}

use askama::Template;
use axum::extract::{Query, State};
use axum::response::IntoResponse;

use crate::auth::CurrentUser;
use crate::date_utils::today;
use crate::error::{AppError, AppResult, RenderHtml};
use crate::filters::format_brl;
use crate::handlers::expenses::{list_rows, ExpenseListParams, ExpenseRow};
use crate::handlers::Layout;
use crate::state::AppState;

const ADMIN_LIST_LIMIT: i64 = 500;

#[derive(Template)]
#[template(path = "pages/admin_expenses.html")]
pub struct AdminExpensesTemplate {
    pub layout: Layout,
    pub rows: Vec<ExpenseRow>,
    pub total: String,
    pub search: String,
}

/// Expenses of every user. Superusers only.
pub async fn expenses(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<ExpenseListParams>,
) -> AppResult<impl IntoResponse> {
    let scope = current
        .admin_scope()
        .ok_or_else(|| AppError::Forbidden("Acesso restrito a administradores.".into()))?;

    let mut filter = params.to_filter(today());
    filter.limit = Some(ADMIN_LIST_LIMIT);

    let conn = state.db.get()?;
    let rows = list_rows(&conn, scope, &filter)?;
    let total: i64 = rows.iter().map(|r| r.amount_cents).sum();

    AdminExpensesTemplate {
        layout: current.layout("Todas as despesas"),
        rows,
        total: format_brl(total),
        search: filter.search.unwrap_or_default(),
    }
    .render_html()
}

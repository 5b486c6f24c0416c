pub mod admin;
pub mod api;
pub mod categories;
pub mod dashboard;
pub mod expenses;
pub mod import;
pub mod incomes;
pub mod onboarding;
pub mod settings;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Fields every full page renders in the base layout.
#[derive(Debug, Clone)]
pub struct Layout {
    pub title: String,
    pub version: &'static str,
    pub xsrf_token: String,
    pub user_name: Option<String>,
    pub is_superuser: bool,
}

impl Layout {
    /// Layout for pages shown without a session.
    pub fn anonymous(title: &str, xsrf_token: String) -> Self {
        Self {
            title: title.to_string(),
            version: crate::VERSION,
            xsrf_token,
            user_name: None,
            is_superuser: false,
        }
    }
}

/// One `<option>` of a select box.
#[derive(Debug, Clone)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>, selected: bool) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            selected,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        // Pages
        .route("/", get(dashboard::index))
        .route("/dashboard", get(dashboard::index))
        .route("/expenses", get(expenses::index))
        .route("/categories", get(categories::index))
        .route("/incomes", get(incomes::index))
        .route("/import", get(import::index))
        .route("/settings", get(settings::index).post(settings::update))
        // Onboarding
        .route(
            "/onboarding/income",
            get(onboarding::income_form).post(onboarding::income_submit),
        )
        .route(
            "/onboarding/notifications",
            get(onboarding::notifications_form).post(onboarding::notifications_submit),
        )
        // Expense CRUD
        .route("/expenses/new", get(expenses::new_form))
        .route("/expenses/create", post(expenses::create))
        .route("/expenses/:id/edit", get(expenses::edit_form))
        .route("/expenses/:id/update", post(expenses::update))
        .route("/expenses/:id/delete", post(expenses::delete))
        // Category management
        .route("/categories/new", get(categories::new_form))
        .route("/categories/create", post(categories::create))
        .route("/categories/:id/edit", get(categories::edit_form))
        .route("/categories/:id/update", post(categories::update))
        .route("/categories/:id/delete", post(categories::delete))
        // Income CRUD
        .route("/incomes/new", get(incomes::new_form))
        .route("/incomes/create", post(incomes::create))
        .route("/incomes/:id/edit", get(incomes::edit_form))
        .route("/incomes/:id/update", post(incomes::update))
        .route("/incomes/:id/delete", post(incomes::delete))
        // Receipt import
        .route("/import/upload", post(import::upload))
        // Superuser listing
        .route("/admin/expenses", get(admin::expenses))
        // API (JSON for charts)
        .route("/api/dashboard/charts", get(api::charts))
        .route("/api/dashboard/kpis", get(api::kpis))
        // Health check
        .route("/health", get(health))
}

async fn health() -> &'static str {
    "OK"
}

use askama::Template;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use rusqlite::Connection;
use serde::Deserialize;
use tracing::info;

use crate::auth::CurrentUser;
use crate::date_utils::{today, YearMonth};
use crate::db::queries::categories;
use crate::error::{AppError, AppResult, RenderHtml};
use crate::error_pages::form_error;
use crate::filters::{format_brl, format_percent};
use crate::form_utils::{cents_to_input, parse_money_cents};
use crate::handlers::Layout;
use crate::models::{normalize_category_name, CategoryWithSpending, NewCategory};
use crate::state::AppState;

pub const DUPLICATE_NAME_MESSAGE: &str = "Você já possui uma categoria com esse nome.";

pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub budget: String,
    pub spent: String,
    pub percent: String,
    pub over_budget: bool,
}

impl From<&CategoryWithSpending> for CategoryRow {
    fn from(c: &CategoryWithSpending) -> Self {
        Self {
            id: c.category.id,
            name: c.category.name.clone(),
            budget: if c.category.monthly_budget_cents > 0 {
                format_brl(c.category.monthly_budget_cents)
            } else {
                "-".into()
            },
            spent: format_brl(c.spent_cents),
            percent: c.budget_percent().map(format_percent).unwrap_or_default(),
            over_budget: c.over_budget(),
        }
    }
}

#[derive(Template)]
#[template(path = "pages/categories.html")]
pub struct CategoriesTemplate {
    pub layout: Layout,
    pub month_label: String,
    pub rows: Vec<CategoryRow>,
}

#[derive(Template)]
#[template(path = "pages/category_form.html")]
pub struct CategoryFormTemplate {
    pub layout: Layout,
    pub action: String,
    pub name: String,
    pub monthly_budget: String,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryFormData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub monthly_budget: String,
}

impl CategoryFormData {
    pub fn validate(&self) -> Result<NewCategory, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Informe o nome da categoria.".into());
        }
        if normalize_category_name(name).is_empty() {
            return Err("O nome da categoria precisa ter letras ou números.".into());
        }
        let monthly_budget_cents = if self.monthly_budget.trim().is_empty() {
            0
        } else {
            parse_money_cents(&self.monthly_budget)
                .filter(|v| *v >= 0)
                .ok_or("Orçamento mensal inválido.")?
        };
        Ok(NewCategory {
            name: name.to_string(),
            monthly_budget_cents,
        })
    }
}

/// Validate and write a category. `id` is `None` on create. Duplicate
/// names come back as the validation message, whether caught by the
/// lookup or by the unique index.
pub fn save_category(
    conn: &Connection,
    current: &CurrentUser,
    id: Option<i64>,
    form: &CategoryFormData,
) -> AppResult<i64> {
    let category = form.validate().map_err(AppError::Validation)?;

    if categories::name_taken(conn, current.id(), &category.name, id)? {
        return Err(AppError::Validation(DUPLICATE_NAME_MESSAGE.into()));
    }

    let result = match id {
        None => categories::create_category(conn, current.id(), &category),
        Some(id) => categories::update_category(conn, current.scope(), id, &category).and_then(
            |found| {
                if found {
                    Ok(id)
                } else {
                    Err(rusqlite::Error::QueryReturnedNoRows)
                }
            },
        ),
    };

    match result {
        Ok(id) => Ok(id),
        Err(e) if categories::is_unique_violation(&e) => {
            Err(AppError::Validation(DUPLICATE_NAME_MESSAGE.into()))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(AppError::NotFound("Categoria não encontrada.".into()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn index(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let month = YearMonth::of(today());
    let (from, to) = month.bounds();
    let cats = categories::list_categories_with_spending(&conn, current.scope(), &from, &to)?;

    CategoriesTemplate {
        layout: current.layout("Categorias"),
        month_label: month.long_label(),
        rows: cats.iter().map(CategoryRow::from).collect(),
    }
    .render_html()
}

pub async fn new_form(current: CurrentUser) -> AppResult<impl IntoResponse> {
    CategoryFormTemplate {
        layout: current.layout("Nova categoria"),
        action: "/categories/create".into(),
        name: String::new(),
        monthly_budget: String::new(),
        error: None,
    }
    .render_html()
}

pub async fn edit_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let category = categories::get_category(&conn, current.scope(), id)?
        .ok_or_else(|| AppError::NotFound("Categoria não encontrada.".into()))?;

    CategoryFormTemplate {
        layout: current.layout("Editar categoria"),
        action: format!("/categories/{}/update", id),
        name: category.name,
        monthly_budget: if category.monthly_budget_cents > 0 {
            cents_to_input(category.monthly_budget_cents)
        } else {
            String::new()
        },
        error: None,
    }
    .render_html()
}

fn rerender(
    current: &CurrentUser,
    action: String,
    form: &CategoryFormData,
    message: String,
) -> AppResult<Response> {
    let template = CategoryFormTemplate {
        layout: current.layout("Categoria"),
        action,
        name: form.name.clone(),
        monthly_budget: form.monthly_budget.clone(),
        error: Some(message),
    };
    Ok(form_error(template.render_html()?))
}

pub async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<CategoryFormData>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    match save_category(&conn, &current, None, &form) {
        Ok(id) => {
            info!(user_id = current.id(), category_id = id, "Created category");
            Ok(Redirect::to("/categories").into_response())
        }
        Err(AppError::Validation(message)) => {
            rerender(&current, "/categories/create".into(), &form, message)
        }
        Err(e) => Err(e),
    }
}

pub async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<CategoryFormData>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    categories::get_category(&conn, current.scope(), id)?
        .ok_or_else(|| AppError::NotFound("Categoria não encontrada.".into()))?;

    match save_category(&conn, &current, Some(id), &form) {
        Ok(_) => {
            info!(user_id = current.id(), category_id = id, "Updated category");
            Ok(Redirect::to("/categories").into_response())
        }
        Err(AppError::Validation(message)) => {
            rerender(&current, format!("/categories/{}/update", id), &form, message)
        }
        Err(e) => Err(e),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;
    if !categories::delete_category(&conn, current.scope(), id)? {
        return Err(AppError::NotFound("Categoria não encontrada.".into()));
    }
    info!(user_id = current.id(), category_id = id, "Deleted category");
    Ok(Redirect::to("/categories"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_validation() {
        let form = CategoryFormData {
            name: "  Academia ".into(),
            monthly_budget: "150,00".into(),
        };
        let category = form.validate().unwrap();
        assert_eq!(category.name, "Academia");
        assert_eq!(category.monthly_budget_cents, 15000);

        let blank = CategoryFormData {
            name: "   ".into(),
            monthly_budget: String::new(),
        };
        assert!(blank.validate().is_err());

        let punctuation = CategoryFormData {
            name: "!!!".into(),
            monthly_budget: String::new(),
        };
        assert_eq!(
            punctuation.validate().unwrap_err(),
            "O nome da categoria precisa ter letras ou números."
        );

        let negative = CategoryFormData {
            name: "Academia".into(),
            monthly_budget: "-5".into(),
        };
        assert!(negative.validate().is_err());
    }
}

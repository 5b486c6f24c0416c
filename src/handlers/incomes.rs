use askama::Template;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use tracing::info;

use crate::auth::CurrentUser;
use crate::date_utils::{format_br_date, format_date, parse_date, today, YearMonth};
use crate::db::queries::incomes;
use crate::error::{AppError, AppResult, RenderHtml};
use crate::error_pages::form_error;
use crate::filters::format_brl;
use crate::form_utils::{cents_to_input, parse_money_cents};
use crate::handlers::Layout;
use crate::models::{Income, NewIncome};
use crate::state::AppState;

pub struct IncomeRow {
    pub id: i64,
    pub date: String,
    pub description: String,
    pub gross: String,
    pub investment: String,
    pub net: String,
}

impl From<&Income> for IncomeRow {
    fn from(i: &Income) -> Self {
        Self {
            id: i.id,
            date: format_br_date(&i.date),
            description: i.description.clone(),
            gross: format_brl(i.gross_cents),
            investment: format_brl(i.investment_cents),
            net: format_brl(i.net_cents()),
        }
    }
}

#[derive(Template)]
#[template(path = "pages/incomes.html")]
pub struct IncomesTemplate {
    pub layout: Layout,
    pub rows: Vec<IncomeRow>,
    pub total_net: String,
}

#[derive(Template)]
#[template(path = "pages/income_form.html")]
pub struct IncomeFormTemplate {
    pub layout: Layout,
    pub action: String,
    pub form: IncomeFormData,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomeFormData {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub gross: String,
    #[serde(default)]
    pub investment: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub notes: String,
}

impl IncomeFormData {
    pub fn from_income(income: &Income) -> Self {
        Self {
            description: income.description.clone(),
            gross: cents_to_input(income.gross_cents),
            investment: cents_to_input(income.investment_cents),
            date: income.date.clone(),
            notes: income.notes.clone(),
        }
    }

    pub fn validate(&self) -> Result<NewIncome, String> {
        let description = self.description.trim();
        if description.is_empty() {
            return Err("Informe a descrição da receita.".into());
        }
        let gross_cents = parse_money_cents(&self.gross)
            .filter(|v| *v > 0)
            .ok_or("Informe um valor bruto maior que zero.")?;
        let investment_cents = if self.investment.trim().is_empty() {
            0
        } else {
            parse_money_cents(&self.investment)
                .filter(|v| *v >= 0)
                .ok_or("O valor investido não pode ser negativo.")?
        };
        if investment_cents > gross_cents {
            return Err("O valor investido não pode ser maior que o valor bruto.".into());
        }
        let date = parse_date(self.date.trim()).ok_or("Informe uma data válida.")?;

        Ok(NewIncome {
            description: description.to_string(),
            gross_cents,
            investment_cents,
            date: format_date(date),
            notes: self.notes.trim().to_string(),
        })
    }
}

fn month_of(date: &str) -> Option<YearMonth> {
    parse_date(date).map(YearMonth::of)
}

fn publish_month(state: &AppState, user_id: i64, date: &str) {
    if let Some(month) = month_of(date) {
        state.alerts.publish(user_id, month);
    }
}

pub async fn index(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let list = incomes::list_incomes(&conn, current.scope(), None, None)?;
    let total_net: i64 = list.iter().map(Income::net_cents).sum();

    IncomesTemplate {
        layout: current.layout("Receitas"),
        rows: list.iter().map(IncomeRow::from).collect(),
        total_net: format_brl(total_net),
    }
    .render_html()
}

pub async fn new_form(current: CurrentUser) -> AppResult<impl IntoResponse> {
    IncomeFormTemplate {
        layout: current.layout("Nova receita"),
        action: "/incomes/create".into(),
        form: IncomeFormData {
            date: format_date(today()),
            ..Default::default()
        },
        error: None,
    }
    .render_html()
}

pub async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<IncomeFormData>,
) -> AppResult<Response> {
    let income = match form.validate() {
        Ok(income) => income,
        Err(message) => {
            let template = IncomeFormTemplate {
                layout: current.layout("Nova receita"),
                action: "/incomes/create".into(),
                form,
                error: Some(message),
            };
            return Ok(form_error(template.render_html()?));
        }
    };

    let conn = state.db.get()?;
    let id = incomes::create_income(&conn, current.id(), &income)?;
    info!(user_id = current.id(), income_id = id, "Created income");
    publish_month(&state, current.id(), &income.date);

    Ok(Redirect::to("/incomes").into_response())
}

pub async fn edit_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let income = incomes::get_income(&conn, current.scope(), id)?
        .ok_or_else(|| AppError::NotFound("Receita não encontrada.".into()))?;

    IncomeFormTemplate {
        layout: current.layout("Editar receita"),
        action: format!("/incomes/{}/update", id),
        form: IncomeFormData::from_income(&income),
        error: None,
    }
    .render_html()
}

pub async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<IncomeFormData>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let existing = incomes::get_income(&conn, current.scope(), id)?
        .ok_or_else(|| AppError::NotFound("Receita não encontrada.".into()))?;

    let income = match form.validate() {
        Ok(income) => income,
        Err(message) => {
            let template = IncomeFormTemplate {
                layout: current.layout("Editar receita"),
                action: format!("/incomes/{}/update", id),
                form,
                error: Some(message),
            };
            return Ok(form_error(template.render_html()?));
        }
    };

    if !incomes::update_income(&conn, current.scope(), id, &income)? {
        return Err(AppError::NotFound("Receita não encontrada.".into()));
    }
    info!(user_id = current.id(), income_id = id, "Updated income");

    publish_month(&state, current.id(), &existing.date);
    if month_of(&existing.date) != month_of(&income.date) {
        publish_month(&state, current.id(), &income.date);
    }

    Ok(Redirect::to("/incomes").into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;
    let existing = incomes::get_income(&conn, current.scope(), id)?
        .ok_or_else(|| AppError::NotFound("Receita não encontrada.".into()))?;

    if !incomes::delete_income(&conn, current.scope(), id)? {
        return Err(AppError::NotFound("Receita não encontrada.".into()));
    }
    info!(user_id = current.id(), income_id = id, "Deleted income");
    publish_month(&state, current.id(), &existing.date);

    Ok(Redirect::to("/incomes"))
}

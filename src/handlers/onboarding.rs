use askama::Template;
use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use tracing::info;

use crate::auth::CurrentUser;
use crate::db::queries::profiles;
use crate::error::{AppResult, RenderHtml};
use crate::error_pages::form_error;
use crate::form_utils::{cents_to_input, deserialize_checkbox, parse_money_cents};
use crate::handlers::Layout;
use crate::models::profile::validate_thresholds;
use crate::models::ProfileUpdate;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/onboarding_income.html")]
pub struct IncomeStepTemplate {
    pub layout: Layout,
    pub fixed_income: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/onboarding_notifications.html")]
pub struct NotificationsStepTemplate {
    pub layout: Layout,
    pub alerts_enabled: bool,
    pub thresholds: String,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncomeStepForm {
    #[serde(default)]
    pub fixed_income: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationsStepForm {
    #[serde(default, deserialize_with = "deserialize_checkbox")]
    pub alerts_enabled: bool,
    #[serde(default)]
    pub thresholds: String,
}

/// Parse the first onboarding step. The fixed income must be positive.
pub fn parse_fixed_income(raw: &str) -> Result<i64, String> {
    parse_money_cents(raw)
        .filter(|v| *v > 0)
        .ok_or_else(|| "Informe uma renda mensal maior que zero.".to_string())
}

pub async fn income_form(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let profile = profiles::get_or_create_profile(&conn, current.id())?;

    IncomeStepTemplate {
        layout: current.layout("Sua renda"),
        fixed_income: if profile.fixed_income_cents > 0 {
            cents_to_input(profile.fixed_income_cents)
        } else {
            String::new()
        },
        error: None,
    }
    .render_html()
}

pub async fn income_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<IncomeStepForm>,
) -> AppResult<Response> {
    let fixed_income_cents = match parse_fixed_income(&form.fixed_income) {
        Ok(cents) => cents,
        Err(message) => {
            let template = IncomeStepTemplate {
                layout: current.layout("Sua renda"),
                fixed_income: form.fixed_income,
                error: Some(message),
            };
            return Ok(form_error(template.render_html()?));
        }
    };

    let conn = state.db.get()?;
    let profile = profiles::get_or_create_profile(&conn, current.id())?;
    let mut update = ProfileUpdate::from(&profile);
    update.fixed_income_cents = fixed_income_cents;
    profiles::update_profile(&conn, current.id(), &update)?;
    info!(user_id = current.id(), fixed_income_cents, "Onboarding income saved");

    Ok(Redirect::to("/onboarding/notifications").into_response())
}

pub async fn notifications_form(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let profile = profiles::get_or_create_profile(&conn, current.id())?;

    NotificationsStepTemplate {
        layout: current.layout("Alertas"),
        alerts_enabled: profile.alerts_enabled,
        thresholds: profile.alert_thresholds,
        error: None,
    }
    .render_html()
}

pub async fn notifications_submit(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<NotificationsStepForm>,
) -> AppResult<Response> {
    let thresholds = match validate_thresholds(&form.thresholds) {
        Ok(thresholds) => thresholds,
        Err(message) => {
            let template = NotificationsStepTemplate {
                layout: current.layout("Alertas"),
                alerts_enabled: form.alerts_enabled,
                thresholds: form.thresholds,
                error: Some(message),
            };
            return Ok(form_error(template.render_html()?));
        }
    };

    let conn = state.db.get()?;
    let profile = profiles::get_or_create_profile(&conn, current.id())?;
    let mut update = ProfileUpdate::from(&profile);
    update.alerts_enabled = form.alerts_enabled;
    update.alert_thresholds = thresholds;
    profiles::update_profile(&conn, current.id(), &update)?;
    info!(
        user_id = current.id(),
        alerts_enabled = form.alerts_enabled,
        "Onboarding notifications saved"
    );

    Ok(Redirect::to("/").into_response())
}

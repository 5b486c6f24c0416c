use askama::Template;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use tracing::info;

use crate::auth::CurrentUser;
use crate::date_utils::YearMonth;
use crate::db::queries::profiles;
use crate::error::{AppResult, RenderHtml};
use crate::error_pages::form_error;
use crate::form_utils::{cents_to_input, deserialize_checkbox, parse_money_cents};
use crate::handlers::{Layout, SelectOption};
use crate::models::profile::validate_thresholds;
use crate::models::{Profile, ProfileUpdate};
use crate::state::AppState;

/// Display currencies. Amounts are never converted.
pub const CURRENCIES: [(&str, &str); 3] = [
    ("BRL", "Real (R$)"),
    ("USD", "Dólar (US$)"),
    ("EUR", "Euro (€)"),
];

#[derive(Template)]
#[template(path = "pages/settings.html")]
pub struct SettingsTemplate {
    pub layout: Layout,
    pub currencies: Vec<SelectOption>,
    pub form: SettingsFormData,
    pub saved: bool,
    pub error: Option<String>,
}

impl SettingsTemplate {
    fn new(layout: Layout, form: SettingsFormData) -> Self {
        let currencies = CURRENCIES
            .iter()
            .map(|(code, label)| SelectOption::new(*code, *label, form.currency == *code))
            .collect();
        Self {
            layout,
            currencies,
            form,
            saved: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsFormData {
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub fixed_income: String,
    #[serde(default)]
    pub fixed_investment: String,
    #[serde(default)]
    pub soft_cap: String,
    #[serde(default)]
    pub hard_cap: String,
    #[serde(default, deserialize_with = "deserialize_checkbox")]
    pub alerts_enabled: bool,
    #[serde(default)]
    pub thresholds: String,
}

fn optional_cap(raw: &str, label: &str) -> Result<Option<i64>, String> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_money_cents(raw)
        .filter(|v| *v > 0)
        .map(Some)
        .ok_or_else(|| format!("{} inválido.", label))
}

impl SettingsFormData {
    pub fn from_profile(profile: &Profile) -> Self {
        let cap = |value: Option<i64>| value.map(cents_to_input).unwrap_or_default();
        Self {
            currency: profile.currency.clone(),
            fixed_income: cents_to_input(profile.fixed_income_cents),
            fixed_investment: cents_to_input(profile.fixed_investment_cents),
            soft_cap: cap(profile.soft_cap_cents),
            hard_cap: cap(profile.hard_cap_cents),
            alerts_enabled: profile.alerts_enabled,
            thresholds: profile.alert_thresholds.clone(),
        }
    }

    pub fn validate(&self) -> Result<ProfileUpdate, String> {
        let currency = self.currency.trim().to_ascii_uppercase();
        if !CURRENCIES.iter().any(|(code, _)| *code == currency) {
            return Err("Moeda inválida.".into());
        }

        let fixed_income_cents = parse_money_cents(&self.fixed_income)
            .filter(|v| *v >= 0)
            .ok_or("Renda fixa inválida.")?;
        let fixed_investment_cents = if self.fixed_investment.trim().is_empty() {
            0
        } else {
            parse_money_cents(&self.fixed_investment)
                .filter(|v| *v >= 0)
                .ok_or("Investimento fixo inválido.")?
        };
        if fixed_investment_cents > fixed_income_cents {
            return Err("O investimento fixo não pode ser maior que a renda fixa.".into());
        }

        let soft_cap_cents = optional_cap(&self.soft_cap, "Limite de atenção")?;
        let hard_cap_cents = optional_cap(&self.hard_cap, "Limite máximo")?;
        if let (Some(soft), Some(hard)) = (soft_cap_cents, hard_cap_cents) {
            if soft > hard {
                return Err("O limite de atenção não pode ser maior que o limite máximo.".into());
            }
        }

        let alert_thresholds = validate_thresholds(&self.thresholds)?;

        Ok(ProfileUpdate {
            currency,
            fixed_income_cents,
            fixed_investment_cents,
            soft_cap_cents,
            hard_cap_cents,
            alerts_enabled: self.alerts_enabled,
            alert_thresholds,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SettingsParams {
    pub saved: Option<String>,
}

pub async fn index(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<SettingsParams>,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let profile = profiles::get_or_create_profile(&conn, current.id())?;

    let mut template = SettingsTemplate::new(
        current.layout("Configurações"),
        SettingsFormData::from_profile(&profile),
    );
    template.saved = params.saved.is_some();
    template.render_html()
}

pub async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<SettingsFormData>,
) -> AppResult<Response> {
    let update = match form.validate() {
        Ok(update) => update,
        Err(message) => {
            let mut template = SettingsTemplate::new(current.layout("Configurações"), form);
            template.error = Some(message);
            return Ok(form_error(template.render_html()?));
        }
    };

    let conn = state.db.get()?;
    profiles::get_or_create_profile(&conn, current.id())?;
    profiles::update_profile(&conn, current.id(), &update)?;
    info!(
        user_id = current.id(),
        alerts_enabled = update.alerts_enabled,
        thresholds = %update.alert_thresholds,
        "Updated profile settings"
    );

    // The available amount may have changed, so re-check this month.
    state.alerts.publish(current.id(), YearMonth::current());

    Ok(Redirect::to("/settings?saved=1").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> SettingsFormData {
        SettingsFormData {
            currency: "brl".into(),
            fixed_income: "3.000,00".into(),
            fixed_investment: "500".into(),
            soft_cap: "2.000,00".into(),
            hard_cap: "2.500,00".into(),
            alerts_enabled: true,
            thresholds: "100, 80".into(),
        }
    }

    #[test]
    fn test_valid_settings() {
        let update = form().validate().unwrap();
        assert_eq!(update.currency, "BRL");
        assert_eq!(update.fixed_income_cents, 300000);
        assert_eq!(update.fixed_investment_cents, 50000);
        assert_eq!(update.soft_cap_cents, Some(200000));
        assert_eq!(update.hard_cap_cents, Some(250000));
        assert_eq!(update.alert_thresholds, "80, 100");
    }

    #[test]
    fn test_blank_caps_are_unset() {
        let mut f = form();
        f.soft_cap = String::new();
        f.hard_cap = " ".into();
        let update = f.validate().unwrap();
        assert_eq!(update.soft_cap_cents, None);
        assert_eq!(update.hard_cap_cents, None);
    }

    #[test]
    fn test_invalid_settings() {
        let mut f = form();
        f.currency = "XYZ".into();
        assert!(f.validate().is_err());

        let mut f = form();
        f.soft_cap = "3.000,00".into();
        assert!(f.validate().is_err());

        let mut f = form();
        f.fixed_investment = "4.000,00".into();
        assert!(f.validate().is_err());

        let mut f = form();
        f.thresholds = "80, 600".into();
        assert!(f.validate().is_err());
    }
}

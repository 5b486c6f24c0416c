use askama::Template;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;
use tracing::debug;

use crate::auth::CurrentUser;
use crate::date_utils::{today, MonthScope, YearMonth};
use crate::db::queries::{categories, profiles};
use crate::error::{AppResult, RenderHtml};
use crate::filters::{format_money, format_percent, format_signed_percent};
use crate::handlers::{Layout, SelectOption};
use crate::models::Profile;
use crate::services::budget::{compute_kpis, load_window, CapStatus, MonthlyKpis, Trend};
use crate::services::charts::{build_charts, DashboardCharts, EvolutionRange};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DashboardParams {
    pub scope: Option<String>,
    pub range: Option<String>,
}

impl DashboardParams {
    pub fn month_scope(&self) -> MonthScope {
        self.scope
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn evolution_range(&self) -> EvolutionRange {
        self.range
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

pub struct DashboardData {
    pub profile: Profile,
    pub reference: YearMonth,
    pub kpis: MonthlyKpis,
    pub charts: DashboardCharts,
}

/// Load the window around the selected month and derive KPIs and charts.
pub fn dashboard_data(
    conn: &Connection,
    user_id: i64,
    params: &DashboardParams,
    today: NaiveDate,
) -> rusqlite::Result<DashboardData> {
    let profile = profiles::get_or_create_profile(conn, user_id)?;
    let reference = params.month_scope().resolve(today);
    let window = load_window(conn, user_id, reference)?;
    let cats = categories::list_categories(conn, crate::db::OwnerScope::Owner(user_id))?;

    let kpis = compute_kpis(reference, &profile, &window, today);
    let charts = build_charts(
        &profile,
        &cats,
        &window,
        reference,
        params.evolution_range(),
        today,
    );

    debug!(
        user_id,
        %reference,
        expenses = window.expenses.len(),
        incomes = window.incomes.len(),
        "Dashboard data loaded"
    );

    Ok(DashboardData {
        profile,
        reference,
        kpis,
        charts,
    })
}

#[derive(Template)]
#[template(path = "pages/dashboard.html")]
pub struct DashboardTemplate {
    pub layout: Layout,
    pub month_label: String,
    pub scopes: Vec<SelectOption>,
    pub ranges: Vec<SelectOption>,
    pub income: String,
    pub investment: String,
    pub expenses: String,
    pub previous_expenses: String,
    pub available: String,
    pub balance: String,
    pub balance_negative: bool,
    pub percent_used: String,
    pub percent_remaining: String,
    pub bar_width: u32,
    pub trend_label: &'static str,
    pub trend_class: &'static str,
    pub trend_percent: String,
    pub has_baseline: bool,
    pub future_expenses: String,
    pub cap_label: &'static str,
    pub cap_class: &'static str,
    pub charts: DashboardCharts,
    pub charts_json: String,
}

impl DashboardTemplate {
    fn new(layout: Layout, data: DashboardData, params: &DashboardParams) -> Self {
        let scope = params.month_scope();
        let range = params.evolution_range();
        let kpis = &data.kpis;
        let currency = data.profile.currency.as_str();
        let money = |cents: i64| format_money(cents, currency);

        let scopes = [MonthScope::Previous, MonthScope::Current, MonthScope::Next]
            .into_iter()
            .map(|s| SelectOption::new(s.as_str(), s.label(), s == scope))
            .collect();
        let ranges = [
            EvolutionRange::SixMonths,
            EvolutionRange::TwelveMonths,
            EvolutionRange::Future,
        ]
        .into_iter()
        .map(|r| SelectOption::new(r.as_str(), r.label(), r == range))
        .collect();

        let trend_class = match kpis.trend {
            Trend::Increase => "trend-up",
            Trend::Decrease => "trend-down",
            Trend::Stable | Trend::NoBaseline => "trend-flat",
        };
        let cap_class = match kpis.cap_status {
            CapStatus::Ok => "cap-ok",
            CapStatus::SoftCapReached => "cap-soft",
            CapStatus::HardCapExceeded => "cap-hard",
        };

        // Embedded in a <script> block, so "</" must not appear verbatim.
        let charts_json = serde_json::to_string(&data.charts)
            .unwrap_or_else(|_| "{}".into())
            .replace("</", "<\\/");

        Self {
            layout,
            month_label: data.reference.long_label(),
            scopes,
            ranges,
            income: money(kpis.total_income_cents),
            investment: money(kpis.total_investment_cents),
            expenses: money(kpis.total_expenses_cents),
            previous_expenses: money(kpis.previous_expenses_cents),
            available: money(kpis.available_cents),
            balance: money(kpis.balance_cents),
            balance_negative: kpis.balance_cents < 0,
            percent_used: format_percent(kpis.percent_used),
            percent_remaining: format_percent(kpis.percent_remaining),
            bar_width: kpis.percent_used_clamped.round() as u32,
            trend_label: kpis.trend.label(),
            trend_class,
            trend_percent: format_signed_percent(kpis.trend_percent),
            has_baseline: kpis.trend != Trend::NoBaseline,
            future_expenses: money(kpis.future_expenses_cents),
            cap_label: kpis.cap_status.label(),
            cap_class,
            charts: data.charts,
            charts_json,
        }
    }
}

pub async fn index(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<DashboardParams>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let data = dashboard_data(&conn, current.id(), &params, today())?;

    if data.profile.needs_onboarding() {
        return Ok(Redirect::to("/onboarding/income").into_response());
    }

    let template = DashboardTemplate::new(current.layout("Painel"), data, &params);
    Ok(template.render_html()?.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults_and_aliases() {
        let params = DashboardParams::default();
        assert_eq!(params.month_scope(), MonthScope::Current);
        assert_eq!(params.evolution_range(), EvolutionRange::SixMonths);

        let params = DashboardParams {
            scope: Some("previous".into()),
            range: Some("1y".into()),
        };
        assert_eq!(params.month_scope(), MonthScope::Previous);
        assert_eq!(params.evolution_range(), EvolutionRange::TwelveMonths);

        let params = DashboardParams {
            scope: Some("bogus".into()),
            range: Some("future".into()),
        };
        assert_eq!(params.month_scope(), MonthScope::Current);
        assert_eq!(params.evolution_range(), EvolutionRange::Future);
    }
}

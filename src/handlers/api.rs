use axum::extract::{Query, State};
use axum::response::Json;

use crate::auth::CurrentUser;
use crate::date_utils::today;
use crate::error::AppResult;
use crate::handlers::dashboard::{dashboard_data, DashboardParams};
use crate::services::budget::MonthlyKpis;
use crate::services::charts::DashboardCharts;
use crate::state::AppState;

pub async fn charts(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<DashboardParams>,
) -> AppResult<Json<DashboardCharts>> {
    let conn = state.db.get()?;
    let data = dashboard_data(&conn, current.id(), &params, today())?;
    Ok(Json(data.charts))
}

pub async fn kpis(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<DashboardParams>,
) -> AppResult<Json<MonthlyKpis>> {
    let conn = state.db.get()?;
    let data = dashboard_data(&conn, current.id(), &params, today())?;
    Ok(Json(data.kpis))
}

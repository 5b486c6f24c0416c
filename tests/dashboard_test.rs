//! Dashboard pages and the JSON endpoints behind its KPIs and charts.

mod common;

use axum::http::StatusCode;
use bpcash::date_utils::{add_months, format_date, today};
use common::TestClient;
use serde_json::Value;

async fn json(client: &TestClient, uri: &str) -> Value {
    let response = client.get(uri).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    serde_json::from_str(&response.body).expect("invalid JSON")
}

async fn seed_month(client: &TestClient) {
    let date = format_date(today());
    client
        .post_form(
            "/incomes/create",
            &[("description", "Bônus"), ("gross", "500"), ("date", &date)],
        )
        .await;
    client.create_expense("500,00", &date, &[]).await;
    client.create_expense("200,00", &date, &[]).await;
}

#[tokio::test]
async fn test_kpis_for_current_month() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;
    seed_month(&client).await;

    let kpis = json(&client, "/api/dashboard/kpis").await;
    assert_eq!(kpis["total_income_cents"], 350000);
    assert_eq!(kpis["available_cents"], 350000);
    assert_eq!(kpis["total_expenses_cents"], 70000);
    assert_eq!(kpis["balance_cents"], 280000);
    assert_eq!(kpis["percent_used"].as_f64(), Some(20.0));
    assert_eq!(kpis["percent_remaining"].as_f64(), Some(80.0));
    assert_eq!(kpis["trend"], "no_baseline");
    assert_eq!(kpis["cap_status"], "ok");
}

#[tokio::test]
async fn test_kpis_without_income() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;
    let response = client
        .post_form(
            "/settings",
            &[("currency", "BRL"), ("fixed_income", "0"), ("thresholds", "80, 90, 100")],
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    client.create_expense("50,00", &format_date(today()), &[]).await;

    let kpis = json(&client, "/api/dashboard/kpis").await;
    assert_eq!(kpis["available_cents"], 0);
    assert_eq!(kpis["balance_cents"], -5000);
    assert_eq!(kpis["percent_used"].as_f64(), Some(0.0));
}

#[tokio::test]
async fn test_kpis_previous_month_scope() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;
    let last_month = add_months(today(), -1);
    client
        .create_expense("300,00", &format_date(last_month), &[])
        .await;
    client.create_expense("600,00", &format_date(today()), &[]).await;

    let current = json(&client, "/api/dashboard/kpis?scope=current").await;
    assert_eq!(current["total_expenses_cents"], 60000);
    assert_eq!(current["previous_expenses_cents"], 30000);
    assert_eq!(current["trend"], "increase");
    assert_eq!(current["trend_percent"].as_f64(), Some(100.0));

    let previous = json(&client, "/api/dashboard/kpis?scope=previous").await;
    assert_eq!(previous["total_expenses_cents"], 30000);
}

#[tokio::test]
async fn test_future_installments_counted_separately() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;
    client
        .create_expense("300,00", &format_date(today()), &[("installments", "3")])
        .await;

    let kpis = json(&client, "/api/dashboard/kpis").await;
    assert_eq!(kpis["total_expenses_cents"], 10000);
    assert_eq!(kpis["future_expenses_cents"], 20000);
}

#[tokio::test]
async fn test_charts_endpoint() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;
    seed_month(&client).await;

    let charts = json(&client, "/api/dashboard/charts?range=6m").await;
    let pie = charts["category_pie"].as_array().unwrap();
    assert_eq!(pie.len(), 1);
    assert_eq!(pie[0]["name"], "Alimentação");
    assert_eq!(pie[0]["total_cents"], 70000);
    assert!(charts["evolution"].as_array().unwrap().len() >= 1);
}

#[tokio::test]
async fn test_dashboard_page_renders() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;
    seed_month(&client).await;

    let response = client.get("/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("chart-data"));
    assert!(response.body.contains("2.800,00"));
}

#[tokio::test]
async fn test_dashboard_is_per_user() {
    let client = TestClient::new();
    client.signup("maria@example.com", "3000").await;
    seed_month(&client).await;

    let other = client.other_browser();
    other.signup("joao@example.com", "1000").await;
    let response = other.get("/api/dashboard/kpis").await;
    let kpis: Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(kpis["total_expenses_cents"], 0);
    assert_eq!(kpis["available_cents"], 100000);
}

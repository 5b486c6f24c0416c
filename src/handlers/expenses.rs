use std::collections::BTreeSet;

use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use tracing::{debug, info};

use crate::auth::CurrentUser;
use crate::date_utils::{format_br_date, format_date, parse_date, today, YearMonth, MONTH_NAMES};
use crate::db::queries::{categories, expenses};
use crate::db::OwnerScope;
use crate::error::{AppError, AppResult, RenderHtml};
use crate::error_pages::form_error;
use crate::filters::format_brl;
use crate::form_utils::{
    cents_to_input, milli_to_input, parse_money, parse_money_cents, parse_quantity_milli,
    NumberError, MAX_AMOUNT_CENTS,
};
use crate::handlers::{Layout, SelectOption};
use crate::models::{
    Category, Expense, ExpenseItem, ExpenseType, ExpenseWithCategory, NewExpense, NewExpenseItem,
    PaymentMethod,
};
use crate::services::cnpj;
use crate::services::installments::{plan_installments, MAX_INSTALLMENTS};
use crate::state::AppState;

/// Query parameters of the expense list.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ExpenseListParams {
    pub search: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
    pub payment: Option<String>,
    pub category: Option<String>,
}

fn parse_param<T: std::str::FromStr>(value: &Option<String>) -> Option<T> {
    value.as_deref().map(str::trim).and_then(|v| v.parse().ok())
}

impl ExpenseListParams {
    /// Date bounds selected by `month`/`year`. With neither given the
    /// current month is shown; a year alone selects the whole year.
    pub fn date_bounds(&self, today: NaiveDate) -> (Option<String>, Option<String>) {
        let month: Option<u32> = parse_param(&self.month);
        let year: Option<i32> = parse_param(&self.year);
        match (month, year) {
            (None, None) => {
                let (from, to) = YearMonth::of(today).bounds();
                (Some(from), Some(to))
            }
            (Some(m), y) => match YearMonth::new(y.unwrap_or(today.year()), m) {
                Some(ym) => {
                    let (from, to) = ym.bounds();
                    (Some(from), Some(to))
                }
                None => (None, None),
            },
            (None, Some(y)) => (Some(format!("{:04}-01-01", y)), Some(format!("{:04}-12-31", y))),
        }
    }

    pub fn to_filter(&self, today: NaiveDate) -> expenses::ExpenseFilter {
        let (from_date, to_date) = self.date_bounds(today);
        expenses::ExpenseFilter {
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            from_date,
            to_date,
            payment_method: self.payment.as_deref().and_then(PaymentMethod::parse),
            category_id: parse_param(&self.category),
            limit: None,
        }
    }
}

/// One row of an expense table, formatted for display.
pub struct ExpenseRow {
    pub id: i64,
    pub date: String,
    pub issuer_name: String,
    pub description: String,
    pub category: String,
    pub payment: &'static str,
    pub installment: String,
    pub amount: String,
    pub amount_cents: i64,
    pub item_count: i64,
    pub owner_email: String,
}

impl From<&ExpenseWithCategory> for ExpenseRow {
    fn from(row: &ExpenseWithCategory) -> Self {
        let e = &row.expense;
        Self {
            id: e.id,
            date: format_br_date(&e.date),
            issuer_name: e.issuer_name.clone(),
            description: e.description.clone(),
            category: row
                .category_name
                .clone()
                .unwrap_or_else(|| "Sem categoria".into()),
            payment: e.payment_method.label(),
            installment: e.installment_label(),
            amount: format_brl(e.amount_cents),
            amount_cents: e.amount_cents,
            item_count: e.item_count,
            owner_email: row.owner_email.clone(),
        }
    }
}

#[derive(Template)]
#[template(path = "pages/expenses.html")]
pub struct ExpensesTemplate {
    pub layout: Layout,
    pub rows: Vec<ExpenseRow>,
    pub total: String,
    pub search: String,
    pub months: Vec<SelectOption>,
    pub year: String,
    pub payments: Vec<SelectOption>,
    pub categories: Vec<SelectOption>,
}

pub async fn index(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<ExpenseListParams>,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let today = today();
    let filter = params.to_filter(today);

    let list = expenses::list_expenses(&conn, current.scope(), &filter)?;
    let cats = categories::list_categories(&conn, current.scope())?;
    debug!(user_id = current.id(), count = list.len(), "Loaded expense list");

    let selected_month: Option<u32> = parse_param(&params.month);
    let selected_month = match (selected_month, &params.year) {
        (None, None) => Some(today.month()),
        (m, _) => m,
    };
    let year = parse_param::<i32>(&params.year).unwrap_or(today.year());

    let mut months = vec![SelectOption::new("", "Todos", selected_month.is_none())];
    months.extend(MONTH_NAMES.iter().enumerate().map(|(i, name)| {
        let m = i as u32 + 1;
        SelectOption::new(m.to_string(), *name, selected_month == Some(m))
    }));

    let mut payments = vec![SelectOption::new("", "Todas", filter.payment_method.is_none())];
    payments.extend(PaymentMethod::ALL.iter().map(|m| {
        SelectOption::new(m.as_str(), m.label(), filter.payment_method == Some(*m))
    }));

    let mut category_options = vec![SelectOption::new("", "Todas", filter.category_id.is_none())];
    category_options.extend(
        cats.iter()
            .map(|c| SelectOption::new(c.id.to_string(), &c.name, filter.category_id == Some(c.id))),
    );

    let total: i64 = list.iter().map(|e| e.expense.amount_cents).sum();

    let template = ExpensesTemplate {
        layout: current.layout("Despesas"),
        rows: list.iter().map(ExpenseRow::from).collect(),
        total: format_brl(total),
        search: filter.search.unwrap_or_default(),
        months,
        year: year.to_string(),
        payments,
        categories: category_options,
    };

    template.render_html()
}

/// One line item as typed in the form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemInput {
    pub name: String,
    pub code: String,
    pub quantity: String,
    pub unit: String,
    pub unit_price: String,
    pub total: String,
}

impl ItemInput {
    fn is_blank(&self) -> bool {
        [&self.name, &self.code, &self.unit_price, &self.total]
            .iter()
            .all(|v| v.trim().is_empty())
    }

    fn validate(&self, position: usize) -> Result<NewExpenseItem, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(format!("Informe o nome do item {}.", position));
        }

        let quantity_milli = if self.quantity.trim().is_empty() {
            1000
        } else {
            parse_quantity_milli(&self.quantity)
                .filter(|q| *q > 0)
                .ok_or_else(|| format!("Quantidade inválida no item {}.", position))?
        };

        let unit_price = parse_money_cents(&self.unit_price).filter(|v| *v >= 0);
        let total = parse_money_cents(&self.total).filter(|v| *v >= 0);
        let (unit_price_cents, total_cents) = match (unit_price, total) {
            (Some(p), Some(t)) => (p, t),
            (Some(p), None) => (p, (p as f64 * quantity_milli as f64 / 1000.0).round() as i64),
            (None, Some(t)) => (
                (t as f64 * 1000.0 / quantity_milli as f64).round() as i64,
                t,
            ),
            (None, None) => return Err(format!("Informe o valor do item {}.", position)),
        };
        if total_cents > MAX_AMOUNT_CENTS || unit_price_cents > MAX_AMOUNT_CENTS {
            return Err(format!("Valor acima do limite no item {}.", position));
        }

        Ok(NewExpenseItem {
            name: name.to_string(),
            code: Some(self.code.trim().to_string()).filter(|c| !c.is_empty()),
            quantity_milli,
            unit: Some(self.unit.trim().to_string()).filter(|u| !u.is_empty()),
            unit_price_cents,
            total_cents,
        })
    }
}

impl From<&ExpenseItem> for ItemInput {
    fn from(item: &ExpenseItem) -> Self {
        Self {
            name: item.name.clone(),
            code: item.code.clone().unwrap_or_default(),
            quantity: milli_to_input(item.quantity_milli),
            unit: item.unit.clone().unwrap_or_default(),
            unit_price: cents_to_input(item.unit_price_cents),
            total: cents_to_input(item.total_cents),
        }
    }
}

/// The expense form as typed, kept as text so it can be echoed back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseInput {
    pub category_id: String,
    pub issuer_name: String,
    pub issuer_tax_id: String,
    pub description: String,
    pub amount: String,
    pub discount: String,
    pub installments: String,
    pub payment_method: String,
    pub expense_type: String,
    pub date: String,
    pub notes: String,
    pub items: Vec<ItemInput>,
}

/// A purchase that passed validation.
#[derive(Debug, Clone)]
pub struct ValidExpense {
    pub expense: NewExpense,
    pub date: NaiveDate,
    pub items: Vec<NewExpenseItem>,
}

impl ExpenseInput {
    /// Build from urlencoded pairs. Item fields repeat once per row, in
    /// the same order.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut input = Self::default();
        let mut columns: [Vec<String>; 6] = Default::default();

        for (key, value) in pairs {
            match key.as_str() {
                "category_id" => input.category_id = value.clone(),
                "issuer_name" => input.issuer_name = value.clone(),
                "issuer_tax_id" => input.issuer_tax_id = value.clone(),
                "description" => input.description = value.clone(),
                "amount" => input.amount = value.clone(),
                "discount" => input.discount = value.clone(),
                "installments" => input.installments = value.clone(),
                "payment_method" => input.payment_method = value.clone(),
                "expense_type" => input.expense_type = value.clone(),
                "date" => input.date = value.clone(),
                "notes" => input.notes = value.clone(),
                "item_name" => columns[0].push(value.clone()),
                "item_code" => columns[1].push(value.clone()),
                "item_quantity" => columns[2].push(value.clone()),
                "item_unit" => columns[3].push(value.clone()),
                "item_unit_price" => columns[4].push(value.clone()),
                "item_total" => columns[5].push(value.clone()),
                _ => {}
            }
        }

        let cell = |col: usize, row: usize| columns[col].get(row).cloned().unwrap_or_default();
        input.items = (0..columns[0].len())
            .map(|row| ItemInput {
                name: cell(0, row),
                code: cell(1, row),
                quantity: cell(2, row),
                unit: cell(3, row),
                unit_price: cell(4, row),
                total: cell(5, row),
            })
            .filter(|item| !item.is_blank())
            .collect();
        input
    }

    pub fn from_expense(expense: &Expense, items: &[ExpenseItem]) -> Self {
        Self {
            category_id: expense.category_id.map(|id| id.to_string()).unwrap_or_default(),
            issuer_name: expense.issuer_name.clone(),
            issuer_tax_id: expense.issuer_tax_id.clone().unwrap_or_default(),
            description: expense.description.clone(),
            amount: cents_to_input(expense.amount_cents),
            discount: cents_to_input(expense.discount_cents),
            installments: expense.installment_count.to_string(),
            payment_method: expense.payment_method.as_str().to_string(),
            expense_type: expense.expense_type.as_str().to_string(),
            date: expense.date.clone(),
            notes: expense.notes.clone(),
            items: items.iter().map(ItemInput::from).collect(),
        }
    }

    /// Defaults for an empty form.
    pub fn blank(today: NaiveDate) -> Self {
        Self {
            installments: "1".into(),
            payment_method: PaymentMethod::Debito.as_str().into(),
            expense_type: ExpenseType::Variavel.as_str().into(),
            date: format_date(today),
            ..Default::default()
        }
    }

    /// Check every field. `categories` are the user's own; a category is
    /// required when `require_category` is set.
    pub fn validate(
        &self,
        categories: &[Category],
        require_category: bool,
    ) -> Result<ValidExpense, String> {
        let category_id = match self.category_id.trim() {
            "" if require_category => return Err("Selecione uma categoria.".into()),
            "" => None,
            raw => {
                let id: i64 = raw.parse().map_err(|_| "Categoria inválida.".to_string())?;
                if !categories.iter().any(|c| c.id == id) {
                    return Err("Categoria inválida.".into());
                }
                Some(id)
            }
        };

        let issuer_name = self.issuer_name.trim();
        if issuer_name.is_empty() {
            return Err("Informe o emitente da compra.".into());
        }

        let issuer_tax_id = match self.issuer_tax_id.trim() {
            "" => None,
            raw if cnpj::is_valid(raw) => Some(cnpj::format(raw)),
            _ => return Err("CNPJ inválido.".into()),
        };

        let amount_cents = match parse_money(&self.amount) {
            Ok(v) if v > 0 => v,
            Err(NumberError::TooLarge) => {
                return Err("O valor máximo é R$ 999.999.999,99.".into())
            }
            Err(NumberError::TooManyDecimals) => {
                return Err("Informe o valor com no máximo duas casas decimais.".into())
            }
            _ => return Err("Informe um valor maior que zero.".into()),
        };

        let discount_cents = if self.discount.trim().is_empty() {
            0
        } else {
            parse_money_cents(&self.discount)
                .filter(|v| *v >= 0)
                .ok_or("O desconto não pode ser negativo.")?
        };

        let installment_count = match self.installments.trim() {
            "" => 1,
            raw => raw
                .parse::<i64>()
                .ok()
                .filter(|n| (1..=MAX_INSTALLMENTS).contains(n))
                .ok_or_else(|| {
                    format!("O número de parcelas deve estar entre 1 e {}.", MAX_INSTALLMENTS)
                })?,
        };

        let payment_method =
            PaymentMethod::parse(self.payment_method.trim()).ok_or("Forma de pagamento inválida.")?;
        let expense_type =
            ExpenseType::parse(self.expense_type.trim()).ok_or("Tipo de despesa inválido.")?;
        let date = parse_date(self.date.trim()).ok_or("Informe uma data válida.")?;

        let items = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| item.validate(i + 1))
            .collect::<Result<Vec<_>, _>>()?;

        let description = match self.description.trim() {
            "" => issuer_name.to_string(),
            d => d.to_string(),
        };

        Ok(ValidExpense {
            expense: NewExpense {
                category_id,
                issuer_name: issuer_name.to_string(),
                issuer_tax_id,
                description,
                amount_cents,
                discount_cents,
                installment_index: 1,
                installment_count,
                payment_method,
                expense_type,
                date: format_date(date),
                notes: self.notes.trim().to_string(),
            },
            date,
            items,
        })
    }
}

#[derive(Template)]
#[template(path = "pages/expense_form.html")]
pub struct ExpenseFormTemplate {
    pub layout: Layout,
    pub action: String,
    pub is_edit: bool,
    pub installment_label: String,
    pub form: ExpenseInput,
    pub categories: Vec<SelectOption>,
    pub payments: Vec<SelectOption>,
    pub types: Vec<SelectOption>,
    pub notice: Option<String>,
    pub error: Option<String>,
}

impl ExpenseFormTemplate {
    pub fn new(
        layout: Layout,
        action: String,
        form: ExpenseInput,
        categories: &[Category],
    ) -> Self {
        let category_options = categories
            .iter()
            .map(|c| SelectOption::new(c.id.to_string(), &c.name, form.category_id == c.id.to_string()))
            .collect();
        let payments = PaymentMethod::ALL
            .iter()
            .map(|m| SelectOption::new(m.as_str(), m.label(), form.payment_method == m.as_str()))
            .collect();
        let types = ExpenseType::ALL
            .iter()
            .map(|t| SelectOption::new(t.as_str(), t.label(), form.expense_type == t.as_str()))
            .collect();

        Self {
            layout,
            action,
            is_edit: false,
            installment_label: String::new(),
            form,
            categories: category_options,
            payments,
            types,
            notice: None,
            error: None,
        }
    }
}

/// Months touched by a set of ISO dates, deduplicated.
fn months_of<'a>(dates: impl IntoIterator<Item = &'a str>) -> BTreeSet<YearMonth> {
    dates
        .into_iter()
        .filter_map(parse_date)
        .map(YearMonth::of)
        .collect()
}

pub async fn new_form(
    State(state): State<AppState>,
    current: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let cats = categories::list_categories(&conn, current.scope())?;

    ExpenseFormTemplate::new(
        current.layout("Nova despesa"),
        "/expenses/create".into(),
        ExpenseInput::blank(today()),
        &cats,
    )
    .render_html()
}

pub async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let input = ExpenseInput::from_pairs(&pairs);
    let conn = state.db.get()?;
    let cats = categories::list_categories(&conn, current.scope())?;

    let valid = match input.validate(&cats, true) {
        Ok(valid) => valid,
        Err(message) => {
            let mut template = ExpenseFormTemplate::new(
                current.layout("Nova despesa"),
                "/expenses/create".into(),
                input,
                &cats,
            );
            template.error = Some(message);
            return Ok(form_error(template.render_html()?));
        }
    };

    let rows = plan_installments(&valid.expense, valid.date, &valid.items);
    expenses::create_expenses(&conn, current.id(), &rows)?;
    info!(
        user_id = current.id(),
        installments = rows.len(),
        amount_cents = valid.expense.amount_cents,
        "Created expense"
    );

    for month in months_of(rows.iter().map(|(e, _)| e.date.as_str())) {
        state.alerts.publish(current.id(), month);
    }

    Ok(Redirect::to("/expenses").into_response())
}

pub async fn edit_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let conn = state.db.get()?;
    let expense = expenses::get_expense(&conn, current.scope(), id)?
        .ok_or_else(|| AppError::NotFound("Despesa não encontrada.".into()))?;
    let items = expenses::list_items(&conn, id)?;
    let cats = categories::list_categories(&conn, current.scope())?;

    let mut template = ExpenseFormTemplate::new(
        current.layout("Editar despesa"),
        format!("/expenses/{}/update", id),
        ExpenseInput::from_expense(&expense, &items),
        &cats,
    );
    template.is_edit = true;
    template.installment_label = expense.installment_label();

    template.render_html()
}

pub async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let existing = expenses::get_expense(&conn, current.scope(), id)?
        .ok_or_else(|| AppError::NotFound("Despesa não encontrada.".into()))?;
    let cats = categories::list_categories(&conn, current.scope())?;

    let mut input = ExpenseInput::from_pairs(&pairs);
    // Installment rows are never re-split on edit.
    input.installments = "1".into();

    let valid = match input.validate(&cats, false) {
        Ok(valid) => valid,
        Err(message) => {
            input.installments = existing.installment_count.to_string();
            let mut template = ExpenseFormTemplate::new(
                current.layout("Editar despesa"),
                format!("/expenses/{}/update", id),
                input,
                &cats,
            );
            template.is_edit = true;
            template.installment_label = existing.installment_label();
            template.error = Some(message);
            return Ok(form_error(template.render_html()?));
        }
    };

    let mut expense = valid.expense;
    expense.installment_index = existing.installment_index;
    expense.installment_count = existing.installment_count;

    let updated = expenses::update_expense(
        &conn,
        current.scope(),
        id,
        &expense,
        Some(&valid.items),
    )?;
    if !updated {
        return Err(AppError::NotFound("Despesa não encontrada.".into()));
    }
    info!(user_id = current.id(), expense_id = id, "Updated expense");

    for month in months_of([existing.date.as_str(), expense.date.as_str()]) {
        state.alerts.publish(current.id(), month);
    }

    Ok(Redirect::to("/expenses").into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;
    let existing = expenses::get_expense(&conn, current.scope(), id)?
        .ok_or_else(|| AppError::NotFound("Despesa não encontrada.".into()))?;

    if !expenses::delete_expense(&conn, current.scope(), id)? {
        return Err(AppError::NotFound("Despesa não encontrada.".into()));
    }
    info!(user_id = current.id(), expense_id = id, "Deleted expense");

    for month in months_of([existing.date.as_str()]) {
        state.alerts.publish(current.id(), month);
    }

    Ok(Redirect::to("/expenses"))
}

/// Expense rows visible to a scope, used by the superuser listing.
pub fn list_rows(
    conn: &rusqlite::Connection,
    scope: OwnerScope,
    filter: &expenses::ExpenseFilter,
) -> rusqlite::Result<Vec<ExpenseRow>> {
    Ok(expenses::list_expenses(conn, scope, filter)?
        .iter()
        .map(ExpenseRow::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: i64, name: &str) -> Category {
        Category {
            id,
            user_id: 1,
            name: name.into(),
            normalized_name: name.to_lowercase(),
            monthly_budget_cents: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn pairs(extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut base = vec![
            ("category_id", "3"),
            ("issuer_name", "Mercado Bom Preço"),
            ("issuer_tax_id", ""),
            ("description", ""),
            ("amount", "1.234,56"),
            ("discount", ""),
            ("installments", "1"),
            ("payment_method", "DEBITO"),
            ("expense_type", "VARIAVEL"),
            ("date", "2024-03-10"),
            ("notes", ""),
        ];
        for (k, v) in extra {
            base.retain(|(key, _)| key != k);
            base.push((*k, *v));
        }
        base.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_valid_form() {
        let cats = vec![category(3, "Mercado")];
        let valid = ExpenseInput::from_pairs(&pairs(&[]))
            .validate(&cats, true)
            .unwrap();
        assert_eq!(valid.expense.amount_cents, 123456);
        assert_eq!(valid.expense.discount_cents, 0);
        assert_eq!(valid.expense.description, "Mercado Bom Preço");
        assert_eq!(valid.expense.category_id, Some(3));
        assert_eq!(valid.date, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }

    #[test]
    fn test_rejects_foreign_category_and_bad_values() {
        let cats = vec![category(3, "Mercado")];
        let cases = [
            (vec![("category_id", "99")], "Categoria inválida."),
            (vec![("category_id", "")], "Selecione uma categoria."),
            (vec![("amount", "0")], "Informe um valor maior que zero."),
            (vec![("amount", "abc")], "Informe um valor maior que zero."),
            (
                vec![("amount", "99999999999999999999")],
                "O valor máximo é R$ 999.999.999,99.",
            ),
            (
                vec![("amount", "10,999")],
                "Informe o valor com no máximo duas casas decimais.",
            ),
            (vec![("discount", "-1")], "O desconto não pode ser negativo."),
            (vec![("issuer_tax_id", "11.222.333/0001-80")], "CNPJ inválido."),
            (vec![("date", "10/03/2024")], "Informe uma data válida."),
        ];
        for (extra, message) in cases {
            let err = ExpenseInput::from_pairs(&pairs(&extra))
                .validate(&cats, true)
                .unwrap_err();
            assert_eq!(err, message, "{extra:?}");
        }

        let err = ExpenseInput::from_pairs(&pairs(&[("installments", "13")]))
            .validate(&cats, true)
            .unwrap_err();
        assert!(err.contains("parcelas"));
    }

    #[test]
    fn test_valid_cnpj_is_formatted() {
        let cats = vec![category(3, "Mercado")];
        let valid = ExpenseInput::from_pairs(&pairs(&[("issuer_tax_id", "11222333000181")]))
            .validate(&cats, true)
            .unwrap();
        assert_eq!(valid.expense.issuer_tax_id.as_deref(), Some("11.222.333/0001-81"));
    }

    #[test]
    fn test_category_optional_on_edit() {
        let valid = ExpenseInput::from_pairs(&pairs(&[("category_id", "")]))
            .validate(&[], false)
            .unwrap();
        assert_eq!(valid.expense.category_id, None);
    }

    #[test]
    fn test_items_zip_by_position() {
        let mut form = pairs(&[]);
        for (k, v) in [
            ("item_name", "ARROZ 5KG"),
            ("item_code", "789"),
            ("item_quantity", "2"),
            ("item_unit", "UN"),
            ("item_unit_price", "25,90"),
            ("item_total", ""),
            ("item_name", "BANANA"),
            ("item_code", ""),
            ("item_quantity", "0,750"),
            ("item_unit", "KG"),
            ("item_unit_price", ""),
            ("item_total", "4,50"),
            ("item_name", ""),
            ("item_code", ""),
            ("item_quantity", "1"),
            ("item_unit", ""),
            ("item_unit_price", ""),
            ("item_total", ""),
        ] {
            form.push((k.to_string(), v.to_string()));
        }

        let input = ExpenseInput::from_pairs(&form);
        assert_eq!(input.items.len(), 2);

        let valid = input.validate(&[category(3, "Mercado")], true).unwrap();
        assert_eq!(valid.items[0].total_cents, 5180);
        assert_eq!(valid.items[0].code.as_deref(), Some("789"));
        assert_eq!(valid.items[1].quantity_milli, 750);
        assert_eq!(valid.items[1].unit_price_cents, 600);
        assert_eq!(valid.items[1].code, None);
    }

    #[test]
    fn test_list_params_date_bounds() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap();
        let params = ExpenseListParams::default();
        assert_eq!(
            params.date_bounds(today),
            (Some("2024-02-01".into()), Some("2024-02-29".into()))
        );

        let params = ExpenseListParams {
            month: Some("12".into()),
            year: Some("2023".into()),
            ..Default::default()
        };
        assert_eq!(
            params.date_bounds(today),
            (Some("2023-12-01".into()), Some("2023-12-31".into()))
        );

        let params = ExpenseListParams {
            month: Some("".into()),
            year: Some("2023".into()),
            ..Default::default()
        };
        assert_eq!(
            params.date_bounds(today),
            (Some("2023-01-01".into()), Some("2023-12-31".into()))
        );
    }

    #[test]
    fn test_months_of_dedups() {
        let months = months_of(["2024-01-31", "2024-01-02", "2024-02-29", "garbage"]);
        assert_eq!(months.len(), 2);
    }
}

use askama::Template;
use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::auth::CurrentUser;
use crate::date_utils::{format_date, today};
use crate::db::queries::categories;
use crate::error::{AppError, AppResult, RenderHtml};
use crate::error_pages::form_error;
use crate::form_utils::{cents_to_input, milli_to_input};
use crate::handlers::expenses::{ExpenseFormTemplate, ExpenseInput, ItemInput};
use crate::handlers::Layout;
use crate::models::{Category, PaymentMethod};
use crate::services::receipt::inference::{infer_category, infer_payment_method};
use crate::services::receipt::{classify_upload, ImportResult, ReceiptError};
use crate::state::AppState;
use crate::xsrf::XSRF_FORM_FIELD;

const FILE_FIELD: &str = "file";

#[derive(Template)]
#[template(path = "pages/import.html")]
pub struct ImportTemplate {
    pub layout: Layout,
    pub upload_action: String,
    pub error: Option<String>,
}

impl ImportTemplate {
    fn new(layout: Layout) -> Self {
        // Multipart bodies are not parsed by the XSRF check, so the token
        // travels in the query string.
        let upload_action = format!(
            "/import/upload?{}={}",
            XSRF_FORM_FIELD,
            urlencoding::encode(&layout.xsrf_token)
        );
        Self {
            layout,
            upload_action,
            error: None,
        }
    }
}

/// Turn an import result into a pre-filled expense form. Nothing read from
/// the receipt is saved until the user submits that form.
pub fn prefill(result: &ImportResult, categories: &[Category], today: NaiveDate) -> ExpenseInput {
    let data = &result.data;
    let mut input = ExpenseInput::blank(today);

    let issuer = data
        .issuer_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| result.source.default_issuer().to_string());

    if let Some(id) = infer_category(categories, &issuer) {
        input.category_id = id.to_string();
    }
    input.description = issuer.clone();
    input.issuer_name = issuer;
    input.issuer_tax_id = data.issuer_tax_id.clone().unwrap_or_default();

    if data.total_cents > 0 {
        input.amount = cents_to_input(data.total_cents);
    }
    if data.discount_cents > 0 {
        input.discount = cents_to_input(data.discount_cents);
    }
    input.installments = data.installment_suggestion().to_string();

    let payment = data
        .payment_method
        .or_else(|| data.payment_text.as_deref().and_then(infer_payment_method))
        .unwrap_or(PaymentMethod::Debito);
    input.payment_method = payment.as_str().to_string();

    if let Some(date) = data.date {
        input.date = format_date(date);
    }
    input.notes = result.source.notes();

    input.items = data
        .items
        .iter()
        .map(|item| ItemInput {
            name: item.name.clone(),
            code: item.code.clone().unwrap_or_default(),
            quantity: milli_to_input(item.quantity_milli),
            unit: item.unit.clone().unwrap_or_default(),
            unit_price: cents_to_input(item.unit_price_cents),
            total: cents_to_input(item.total_cents),
        })
        .collect();

    input
}

fn import_message(error: Option<&ReceiptError>) -> String {
    match error {
        Some(err) => format!(
            "{} Confira e complete os dados manualmente.",
            err.user_message()
        ),
        None => "Dados importados. Confira antes de salvar.".to_string(),
    }
}

pub async fn index(current: CurrentUser) -> AppResult<impl IntoResponse> {
    ImportTemplate::new(current.layout("Importar nota")).render_html()
}

pub async fn upload(
    State(state): State<AppState>,
    current: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Envio inválido: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Envio inválido: {}", e)))?;
        upload = Some((content_type, file_name, bytes));
    }

    let kind = upload.as_ref().filter(|(_, _, bytes)| !bytes.is_empty()).and_then(
        |(content_type, file_name, _)| classify_upload(content_type.as_deref(), file_name.as_deref()),
    );
    let (kind, bytes) = match (kind, upload) {
        (Some(kind), Some((_, _, bytes))) => (kind, bytes),
        (_, upload) => {
            let file_name = upload.and_then(|(_, name, _)| name).unwrap_or_default();
            debug!(user_id = current.id(), file_name = %file_name, "Rejected receipt upload");
            let mut template = ImportTemplate::new(current.layout("Importar nota"));
            template.error =
                Some(ReceiptError::UnsupportedFile(file_name).user_message().to_string());
            return Ok(form_error(template.render_html()?));
        }
    };

    info!(user_id = current.id(), ?kind, bytes = bytes.len(), "Importing receipt");
    let result = state.importer.import(kind, bytes.to_vec()).await;

    let cats = {
        let conn = state.db.get()?;
        categories::list_categories(&conn, current.scope())?
    };
    let input = prefill(&result, &cats, today());

    let mut template = ExpenseFormTemplate::new(
        current.layout("Nova despesa"),
        "/expenses/create".into(),
        input,
        &cats,
    );
    match &result.error {
        Some(_) => template.error = Some(import_message(result.error.as_ref())),
        None => template.notice = Some(import_message(None)),
    }

    Ok(template.render_html()?.into_response())
}

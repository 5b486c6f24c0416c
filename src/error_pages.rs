use askama::Template;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use tower_cookies::Cookies;

use crate::auth::SESSION_COOKIE;
use crate::db::queries::users;
use crate::handlers::Layout;
use crate::state::AppState;
use crate::xsrf::expected_token;

/// Newtype for passing error messages through response extensions.
#[derive(Clone)]
pub struct ErrorMessage(pub String);

/// Marks a 4xx response that already is the page to show, such as a form
/// re-rendered with validation messages.
#[derive(Clone, Copy)]
pub struct RenderedPage;

/// Respond with a re-rendered form and status 400.
pub fn form_error(html: Html<String>) -> Response {
    let mut response = (StatusCode::BAD_REQUEST, html).into_response();
    response.extensions_mut().insert(RenderedPage);
    response
}

#[derive(Template)]
#[template(path = "pages/error.html")]
struct ErrorPageTemplate {
    layout: Layout,
    status_code: u16,
    status_text: &'static str,
    message: String,
}

/// Middleware that replaces 4xx/5xx responses with a full error page.
///
/// Skips HTMX requests, API routes, and the health endpoint so they
/// keep their original (partial/JSON/plain) response bodies.
pub async fn error_page_middleware(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request<Body>,
    next: Next,
) -> Response {
    let is_htmx = request.headers().contains_key("hx-request");
    let path = request.uri().path().to_owned();
    let is_api = path.starts_with("/api/");
    let is_health = path == "/health";

    let method = request.method().clone();
    let response = next.run(request).await;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let message = response
            .extensions()
            .get::<ErrorMessage>()
            .map(|e| e.0.as_str())
            .unwrap_or("");
        tracing::warn!(
            %status,
            %method,
            %path,
            message,
            "request failed"
        );
    }

    if is_htmx || is_api || is_health || response.extensions().get::<RenderedPage>().is_some() {
        return response;
    }

    if status.is_client_error() || status.is_server_error() {
        render_error_page(&state, &cookies, status, &response)
    } else {
        response
    }
}

/// Fallback handler for unmatched routes.
pub async fn fallback_handler() -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    response.extensions_mut().insert(ErrorMessage(
        "A página que você procura não existe.".into(),
    ));
    response
}

fn render_error_page(
    state: &AppState,
    cookies: &Cookies,
    status: StatusCode,
    response: &Response,
) -> Response {
    let message = response
        .extensions()
        .get::<ErrorMessage>()
        .map(|e| e.0.clone())
        .unwrap_or_else(|| default_message(status));

    let (status_text, _) = status_info(status);

    let user = cookies
        .get(SESSION_COOKIE)
        .and_then(|c| state.sessions.get(c.value()))
        .and_then(|s| {
            let conn = state.db.get().ok()?;
            users::get_user(&conn, s.user_id).ok().flatten()
        });

    let mut layout = Layout::anonymous(status_text, expected_token(state, cookies));
    if let Some(user) = user {
        layout.user_name = Some(user.display_name().to_string());
        layout.is_superuser = user.is_superuser;
    }

    let template = ErrorPageTemplate {
        layout,
        status_code: status.as_u16(),
        status_text,
        message,
    };

    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Failed to render error page template: {}", e);
            (status, "Internal Server Error").into_response()
        }
    }
}

fn status_info(status: StatusCode) -> (&'static str, &'static str) {
    match status.as_u16() {
        400 => ("Requisição inválida", "Não foi possível entender a requisição."),
        401 => ("Não autenticado", "Faça login para continuar."),
        403 => ("Acesso negado", "Você não tem permissão para acessar esta página."),
        404 => ("Não encontrado", "A página que você procura não existe."),
        405 => ("Método não permitido", "Esta ação não é suportada."),
        413 => ("Arquivo muito grande", "O arquivo enviado excede o limite permitido."),
        500 => ("Erro interno", "Algo deu errado do nosso lado."),
        _ => ("Erro", ""),
    }
}

fn default_message(status: StatusCode) -> String {
    let msg = status_info(status).1;
    if msg.is_empty() {
        format!("Ocorreu um erro inesperado ({}).", status.as_u16())
    } else {
        msg.to_string()
    }
}

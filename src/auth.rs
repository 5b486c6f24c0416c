//! Local accounts, sessions and the authentication middleware.
//!
//! Passwords are stored as Argon2id PHC strings. Session tokens are random
//! UUIDs held in a server-side store; they are invalidated on logout or
//! server restart.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use askama::Template;
use axum::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use rusqlite::Connection;
use serde::Deserialize;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::db::queries::{categories, profiles, users};
use crate::db::OwnerScope;
use crate::error::{AppError, AppResult, RenderHtml};
use crate::error_pages::form_error;
use crate::handlers::Layout;
use crate::models::{NewUser, User};
use crate::state::AppState;

/// Cookie name for the session token.
pub const SESSION_COOKIE: &str = "session";

pub const MIN_PASSWORD_LEN: usize = 8;

const PUBLIC_PATHS: [&str; 3] = ["/login", "/signup", "/health"];

/// The authenticated user, inserted into request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub xsrf_token: String,
}

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn scope(&self) -> OwnerScope {
        OwnerScope::Owner(self.user.id)
    }

    /// Unscoped access, only for superusers.
    pub fn admin_scope(&self) -> Option<OwnerScope> {
        self.user.is_superuser.then_some(OwnerScope::All)
    }

    pub fn layout(&self, title: &str) -> Layout {
        Layout {
            title: title.to_string(),
            version: crate::VERSION,
            xsrf_token: self.xsrf_token.clone(),
            user_name: Some(self.user.display_name().to_string()),
            is_superuser: self.user.is_superuser,
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || path.starts_with("/static/")
}

/// Resolve the session cookie to a user, dropping sessions whose user no
/// longer exists.
fn session_user(state: &AppState, cookies: &Cookies) -> AppResult<Option<CurrentUser>> {
    let Some(cookie) = cookies.get(SESSION_COOKIE) else {
        return Ok(None);
    };
    let token = cookie.value().to_string();
    let Some(session) = state.sessions.get(&token) else {
        return Ok(None);
    };

    let conn = state.db.get()?;
    match users::get_user(&conn, session.user_id)? {
        Some(user) => Ok(Some(CurrentUser {
            user,
            xsrf_token: session.xsrf_token,
        })),
        None => {
            state.sessions.remove(&token);
            Ok(None)
        }
    }
}

/// Authentication middleware that redirects unauthenticated users to the login page.
pub async fn auth_middleware(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let current = match session_user(&state, &cookies) {
        Ok(current) => current,
        Err(e) => return e.into_response(),
    };

    if let Some(current) = current {
        request.extensions_mut().insert(current);
        return next.run(request).await;
    }

    let path = request.uri().path();
    if is_public(path) {
        return next.run(request).await;
    }

    // For HTMX requests or API calls, return 401
    let is_htmx = request.headers().contains_key("HX-Request");
    if is_htmx || path.starts_with("/api/") {
        return (StatusCode::UNAUTHORIZED, "Authentication required").into_response();
    }

    Redirect::to("/login").into_response()
}

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
    pub email: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupTemplate {
    pub layout: Layout,
    pub name: String,
    pub email: String,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginFormData {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupFormData {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
}

fn start_session(state: &AppState, cookies: &Cookies, user_id: i64) {
    let token = state.sessions.create(user_id);
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(tower_cookies::cookie::SameSite::Strict)
        .build();
    cookies.add(cookie);
}

pub async fn login_page(
    State(state): State<AppState>,
    current: Option<CurrentUser>,
) -> AppResult<Response> {
    if current.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    let template = LoginTemplate {
        layout: Layout::anonymous("Entrar", state.anon_xsrf.value().to_string()),
        email: String::new(),
        error: None,
    };
    Ok(template.render_html()?.into_response())
}

pub async fn login_submit(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginFormData>,
) -> AppResult<Response> {
    let user = {
        let conn = state.db.get()?;
        users::get_user_by_email(&conn, &form.email)?
    };

    if let Some(user) = user.filter(|u| verify_password(&form.password, &u.password_hash)) {
        start_session(&state, &cookies, user.id);
        tracing::info!(user_id = user.id, "User logged in");
        return Ok(Redirect::to("/").into_response());
    }

    tracing::info!(email = %form.email.trim(), "Failed login attempt");
    let template = LoginTemplate {
        layout: Layout::anonymous("Entrar", state.anon_xsrf.value().to_string()),
        email: form.email.trim().to_string(),
        error: Some("E-mail ou senha inválidos.".into()),
    };
    Ok(form_error(template.render_html()?))
}

pub async fn signup_page(
    State(state): State<AppState>,
    current: Option<CurrentUser>,
) -> AppResult<Response> {
    if current.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    let template = SignupTemplate {
        layout: Layout::anonymous("Criar conta", state.anon_xsrf.value().to_string()),
        name: String::new(),
        email: String::new(),
        error: None,
    };
    Ok(template.render_html()?.into_response())
}

pub async fn signup_submit(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<SignupFormData>,
) -> AppResult<Response> {
    let result = {
        let mut conn = state.db.get()?;
        register_user(&mut conn, &form, state.config.admin_email.as_deref())
    };

    match result {
        Ok(user_id) => {
            start_session(&state, &cookies, user_id);
            Ok(Redirect::to("/onboarding/income").into_response())
        }
        Err(AppError::Validation(message)) => {
            let template = SignupTemplate {
                layout: Layout::anonymous("Criar conta", state.anon_xsrf.value().to_string()),
                name: form.name.trim().to_string(),
                email: form.email.trim().to_string(),
                error: Some(message),
            };
            Ok(form_error(template.render_html()?))
        }
        Err(e) => Err(e),
    }
}

/// Create a user with its profile and default categories in one
/// transaction. The first account, and any account using `admin_email`,
/// is a superuser.
pub fn register_user(
    conn: &mut Connection,
    form: &SignupFormData,
    admin_email: Option<&str>,
) -> AppResult<i64> {
    let email = form.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("Informe um e-mail válido.".into()));
    }
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "A senha deve ter pelo menos {} caracteres.",
            MIN_PASSWORD_LEN
        )));
    }

    let password_hash = hash_password(&form.password)?;

    let tx = conn.transaction()?;
    if users::get_user_by_email(&tx, &email)?.is_some() {
        return Err(AppError::Validation(
            "Já existe uma conta com esse e-mail.".into(),
        ));
    }

    let is_superuser =
        users::count_users(&tx)? == 0 || admin_email.is_some_and(|admin| admin == email);
    let user_id = users::create_user(
        &tx,
        &NewUser {
            email: email.clone(),
            name: form.name.trim().to_string(),
            password_hash,
            is_superuser,
        },
    )?;
    profiles::get_or_create_profile(&tx, user_id)?;
    categories::create_default_categories(&tx, user_id)?;
    tx.commit()?;

    tracing::info!(user_id, is_superuser, "Registered new user");
    Ok(user_id)
}

pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> impl IntoResponse {
    if let Some(session_cookie) = cookies.get(SESSION_COOKIE) {
        state.sessions.remove(session_cookie.value());
    }

    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .build();
    cookies.remove(cookie);

    Redirect::to("/login")
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| AppError::Internal(format!("Failed to build salt: {}", e)))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against an Argon2 hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        tracing::error!("Invalid password hash format");
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;
    use std::path::Path;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn, Path::new("migrations")).unwrap();
        conn
    }

    fn form(email: &str, password: &str) -> SignupFormData {
        SignupFormData {
            name: "Ana".into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("segredo123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("segredo123", &hash));
        assert!(!verify_password("outra-senha", &hash));
        assert!(!verify_password("segredo123", "not a hash"));
    }

    #[test]
    fn test_first_user_is_superuser() {
        let mut conn = conn();
        let first = register_user(&mut conn, &form("ana@example.com", "segredo123"), None).unwrap();
        let second = register_user(&mut conn, &form("bia@example.com", "segredo123"), None).unwrap();

        assert!(users::get_user(&conn, first).unwrap().unwrap().is_superuser);
        assert!(!users::get_user(&conn, second).unwrap().unwrap().is_superuser);
    }

    #[test]
    fn test_admin_email_is_superuser() {
        let mut conn = conn();
        register_user(&mut conn, &form("ana@example.com", "segredo123"), None).unwrap();
        let admin = register_user(
            &mut conn,
            &form("Chefe@Example.com", "segredo123"),
            Some("chefe@example.com"),
        )
        .unwrap();
        assert!(users::get_user(&conn, admin).unwrap().unwrap().is_superuser);
    }

    #[test]
    fn test_signup_creates_profile_and_categories() {
        let mut conn = conn();
        let id = register_user(&mut conn, &form("ana@example.com", "segredo123"), None).unwrap();
        assert!(profiles::get_profile_by_user(&conn, id).unwrap().is_some());
        let cats = categories::list_categories(&conn, OwnerScope::Owner(id)).unwrap();
        assert_eq!(cats.len(), crate::models::DEFAULT_CATEGORIES.len());
    }

    #[test]
    fn test_signup_validation() {
        let mut conn = conn();
        assert!(matches!(
            register_user(&mut conn, &form("ana@example.com", "curta"), None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            register_user(&mut conn, &form("sem-arroba", "segredo123"), None),
            Err(AppError::Validation(_))
        ));

        register_user(&mut conn, &form("ana@example.com", "segredo123"), None).unwrap();
        assert!(matches!(
            register_user(&mut conn, &form("ANA@example.com", "segredo123"), None),
            Err(AppError::Validation(_))
        ));
        assert_eq!(users::count_users(&conn).unwrap(), 1);
    }
}

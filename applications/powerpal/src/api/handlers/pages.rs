//! Server-rendered pages. Each request drives its own dashboard session.

use axum::{
    extract::{Form, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::fmt::Write;
use tracing::warn;

use super::auth::{AuthRejection, LOGIN_SUCCEEDED, SIGNUP_SUCCEEDED};
use super::loads::record_from_fields;
use super::AppState;
use crate::aggregate::COST_PER_KWH;
use crate::api::form_tokens::FORM_TOKEN_FIELD;
use crate::api::middleware::{clear_session_cookie, session_cookie, session_token};
use crate::api::models::auth::CredentialsRequest;
use crate::api::models::loads::{parse_fields, DeviceFieldsRequest};
use crate::auth::UserIdentity;
use crate::dashboard::{Activation, ControllerError, DashboardSession, EditState, LOGIN_ROUTE};
use crate::error::AppError;
use crate::models::{Device, DeviceField, DeviceStatus};
use crate::store::{to_document, LOADS_COLLECTION};

const DASHBOARD_ROUTE: &str = "/dashboard";
const ADD_LOAD_FAILED: &str = "Failed to add load. Try again.";
const SAVE_FAILED: &str = "Failed to save loads. Try again.";
const ALREADY_SUBMITTED: &str = "This form was already submitted or has expired. Check the list and try again.";

enum Flash {
    Success(String),
    Error(String),
}

impl Flash {
    fn render(&self) -> String {
        match self {
            Flash::Success(text) => format!(r#"<p class="message success">{}</p>"#, escape(text)),
            Flash::Error(text) => format!(r#"<p class="message error">{}</p>"#, escape(text)),
        }
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(title: &str, head_extra: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | PowerPal</title>
{head_extra}
</head>
<body>
{body}
</body>
</html>"#,
        title = escape(title),
    ))
}

#[derive(Clone, Copy)]
enum CredentialsForm {
    Login,
    Signup,
}

impl CredentialsForm {
    fn route(self) -> &'static str {
        match self {
            CredentialsForm::Login => LOGIN_ROUTE,
            CredentialsForm::Signup => "/signup",
        }
    }

    fn title(self) -> &'static str {
        match self {
            CredentialsForm::Login => "Login",
            CredentialsForm::Signup => "Sign Up",
        }
    }
}

fn credentials_page(
    form: CredentialsForm,
    email: &str,
    flash: Option<Flash>,
    refresh_to: Option<&str>,
) -> Html<String> {
    let (other_route, other_label) = match form {
        CredentialsForm::Login => ("/signup", "Need an account? Sign up"),
        CredentialsForm::Signup => (LOGIN_ROUTE, "Already have an account? Log in"),
    };
    let head = refresh_to
        .map(|to| format!(r#"<meta http-equiv="refresh" content="2;url={}">"#, escape(to)))
        .unwrap_or_default();

    let body = format!(
        r#"<main class="auth">
<h1>{title}</h1>
{flash}
<form method="post" action="{action}">
<label>Email <input type="email" name="email" value="{email}"></label>
<label>Password <input type="password" name="password"></label>
<button type="submit">{title}</button>
</form>
<a href="{other_route}">{other_label}</a>
</main>"#,
        title = form.title(),
        flash = flash.map(|f| f.render()).unwrap_or_default(),
        action = form.route(),
        email = escape(email),
    );
    layout(form.title(), &head, &body)
}

fn device_inputs(device: &Device) -> String {
    let mut html = String::new();
    for field in DeviceField::ALL {
        let name = field.as_str();
        match field {
            DeviceField::Status => {
                let _ = write!(html, r#"<label>status <select name="status">"#);
                for status in [DeviceStatus::Active, DeviceStatus::Standby] {
                    let selected = if device.status == status { " selected" } else { "" };
                    let _ = write!(
                        html,
                        r#"<option value="{0}"{1}>{0}</option>"#,
                        status.as_str(),
                        selected
                    );
                }
                html.push_str("</select></label>\n");
            }
            DeviceField::Name => {
                let _ = writeln!(
                    html,
                    r#"<label>{name} <input type="text" name="{name}" value="{value}"></label>"#,
                    value = escape(&device.field_value(field)),
                );
            }
            _ => {
                let _ = writeln!(
                    html,
                    r#"<label>{name} <input type="number" step="any" name="{name}" value="{value}"></label>"#,
                    value = escape(&device.field_value(field)),
                );
            }
        }
    }
    html
}

fn form_token_input(token: &str) -> String {
    format!(
        r#"<input type="hidden" name="{FORM_TOKEN_FIELD}" value="{}">"#,
        escape(token)
    )
}

fn dashboard_page(
    session: &DashboardSession,
    flash: Option<Flash>,
    form_token: &str,
) -> Html<String> {
    let summary = session.summary();
    let editing = match session.controller().state() {
        EditState::Editing { index, draft } => Some((*index, draft)),
        EditState::Idle => None,
    };

    let mut cards = String::new();
    for card in session.cards() {
        let device = &card.device;
        let _ = write!(
            cards,
            r#"<li class="card {status}">
<h3>{name}</h3>
<span class="status">{status_label}</span>
<p>Power: {power} kW</p>
<p>Voltage: {voltage} V</p>
<p>Current: {current} A</p>
<p>Efficiency: {efficiency}%</p>
<p>Load factor: {load_factor}%</p>
"#,
            status = device.status.as_str(),
            name = escape(&device.name),
            status_label = device.status.as_str().to_uppercase(),
            power = device.power,
            voltage = device.voltage,
            current = device.current,
            efficiency = device.efficiency,
            load_factor = card.load_factor,
        );

        match editing {
            Some((index, draft)) if index == card.index => {
                let _ = write!(
                    cards,
                    r#"<form method="post" action="/dashboard/loads/{index}">
{inputs}<button type="submit">Save</button>
<a href="{DASHBOARD_ROUTE}">Cancel</a>
</form>
"#,
                    inputs = device_inputs(draft),
                );
            }
            _ => {
                let _ = writeln!(
                    cards,
                    r#"<a href="{DASHBOARD_ROUTE}?edit={}">Edit</a>"#,
                    card.index
                );
            }
        }
        cards.push_str("</li>\n");
    }

    let body = format!(
        r#"<header>
<h1>PowerPal Dashboard</h1>
<span>{email}</span>
<form method="post" action="/logout"><button type="submit">Logout</button></form>
</header>
{flash}
<section class="summary">
<div><h2>Total Consumption</h2><p>{total} kWh</p></div>
<div><h2>Active Power</h2><p>{active} kW</p></div>
<div><h2>Estimated Cost</h2><p>${cost}</p><small>at ${rate}/kWh</small></div>
</section>
<section>
<h2>Connected Loads</h2>
<ul class="loads">
{cards}</ul>
</section>
<section>
<h2>Add New Device</h2>
<form method="post" action="/dashboard/loads" onsubmit="this.querySelector('button').disabled = true">
{token_input}
{new_inputs}<button type="submit">Add Device</button>
</form>
</section>"#,
        email = escape(&session.identity().email),
        flash = flash.map(|f| f.render()).unwrap_or_default(),
        total = summary.total_consumption_kwh,
        active = summary.active_power_kw,
        cost = summary.estimated_cost,
        rate = COST_PER_KWH,
        token_input = form_token_input(form_token),
        new_inputs = device_inputs(session.controller().new_device()),
    );
    layout("Dashboard", "", &body)
}

fn add_load_page(fields: &Device, flash: Option<Flash>, form_token: &str) -> Html<String> {
    let body = format!(
        r#"<main>
<h1>Add Load</h1>
{flash}
<form method="post" action="/add-load" onsubmit="this.querySelector('button').disabled = true">
{token_input}
{inputs}<button type="submit">Add Load</button>
</form>
<a href="{DASHBOARD_ROUTE}">Back to dashboard</a>
</main>"#,
        flash = flash.map(|f| f.render()).unwrap_or_default(),
        token_input = form_token_input(form_token),
        inputs = device_inputs(fields),
    );
    layout("Add Load", "", &body)
}

fn controller_failure(err: ControllerError, store_message: &str) -> (StatusCode, Flash) {
    let status = match &err {
        ControllerError::Validation(_) => StatusCode::BAD_REQUEST,
        ControllerError::Store(_) => StatusCode::BAD_GATEWAY,
        ControllerError::IndexOutOfRange { .. } => StatusCode::NOT_FOUND,
        ControllerError::NotEditing | ControllerError::WriteInFlight => StatusCode::CONFLICT,
    };
    let message = match err {
        ControllerError::Store(e) => {
            warn!("Loads write failed: {}", e);
            store_message.to_string()
        }
        other => other.to_string(),
    };
    (status, Flash::Error(message))
}

/// Activates a dashboard session for the request or answers with the login redirect.
async fn activate(state: &AppState, headers: &HeaderMap) -> Result<DashboardSession, Response> {
    let token = session_token(headers);
    match DashboardSession::activate(state.auth.as_ref(), state.store.clone(), token.as_deref())
        .await
    {
        Ok(Activation::Active(session)) => Ok(session),
        Ok(Activation::Redirect(to)) => Err(Redirect::to(to).into_response()),
        Err(e) => Err(AppError::Store(e).into_response()),
    }
}

async fn render_add_load(
    state: &AppState,
    user: &UserIdentity,
    fields: &Device,
    flash: Option<Flash>,
) -> Html<String> {
    let form_token = state.form_tokens.issue(&user.uid).await;
    add_load_page(fields, flash, &form_token)
}

fn with_cookie(cookie: String, response: impl IntoResponse) -> Response {
    ([(header::SET_COOKIE, cookie)], response).into_response()
}

/// GET /login
pub async fn login_page(State(state): State<AppState>) -> Html<String> {
    state.analytics.page_view(LOGIN_ROUTE);
    credentials_page(CredentialsForm::Login, "", None, None)
}

/// POST /login
pub async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<CredentialsRequest>,
) -> Response {
    match state.auth.sign_in(&form.email, &form.password).await {
        Ok(session) => with_cookie(
            session_cookie(&session.token, session.expires_in),
            Redirect::to("/dashboard?welcome=1"),
        ),
        Err(e) => {
            let rejection = AuthRejection::login(e);
            (
                rejection.error.status_code(),
                credentials_page(
                    CredentialsForm::Login,
                    &form.email,
                    Some(Flash::Error(rejection.message())),
                    None,
                ),
            )
                .into_response()
        }
    }
}

/// GET /signup
pub async fn signup_page(State(state): State<AppState>) -> Html<String> {
    state.analytics.page_view("/signup");
    credentials_page(CredentialsForm::Signup, "", None, None)
}

/// POST /signup
pub async fn signup_submit(
    State(state): State<AppState>,
    Form(form): Form<CredentialsRequest>,
) -> Response {
    match state.auth.sign_up(&form.email, &form.password).await {
        Ok(session) => with_cookie(
            session_cookie(&session.token, session.expires_in),
            credentials_page(
                CredentialsForm::Signup,
                &session.identity.email,
                Some(Flash::Success(SIGNUP_SUCCEEDED.to_string())),
                Some(DASHBOARD_ROUTE),
            ),
        ),
        Err(e) => {
            let rejection = AuthRejection::signup(e);
            (
                rejection.error.status_code(),
                credentials_page(
                    CredentialsForm::Signup,
                    &form.email,
                    Some(Flash::Error(rejection.message())),
                    None,
                ),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub edit: Option<usize>,
    pub welcome: Option<String>,
}

/// GET /dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DashboardQuery>,
) -> Response {
    let mut session = match activate(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let uid = session.identity().uid.clone();
    state.analytics.page_view(DASHBOARD_ROUTE);

    let mut flash = query
        .welcome
        .map(|_| Flash::Success(LOGIN_SUCCEEDED.to_string()));
    let mut status = StatusCode::OK;

    if let Some(index) = query.edit {
        if let Err(e) = session.begin_edit(index) {
            let (code, message) = controller_failure(e, SAVE_FAILED);
            status = code;
            flash = Some(message);
        }
    }

    let form_token = state.form_tokens.issue(&uid).await;
    let page = dashboard_page(&session, flash, &form_token);
    session.teardown();
    (status, page).into_response()
}

/// POST /dashboard/loads
pub async fn dashboard_add(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(mut fields): Form<DeviceFieldsRequest>,
) -> Response {
    let mut session = match activate(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let uid = session.identity().uid.clone();

    let form_token = fields.remove(FORM_TOKEN_FIELD).unwrap_or_default();
    if !state.form_tokens.redeem(&uid, &form_token).await {
        warn!(%uid, "add-device form submitted twice or expired, ignoring");
        let flash = Flash::Error(ALREADY_SUBMITTED.to_string());
        let form_token = state.form_tokens.issue(&uid).await;
        let page = dashboard_page(&session, Some(flash), &form_token);
        session.teardown();
        return (StatusCode::CONFLICT, page).into_response();
    }

    let result = match parse_fields(&fields) {
        Ok(parsed) => apply_and_add(&mut session, parsed).await,
        Err(e) => Err(ControllerError::Validation(e)),
    };

    let response = match result {
        Ok(()) => Redirect::to(DASHBOARD_ROUTE).into_response(),
        Err(e) => {
            let (status, flash) = controller_failure(e, SAVE_FAILED);
            let form_token = state.form_tokens.issue(&uid).await;
            (status, dashboard_page(&session, Some(flash), &form_token)).into_response()
        }
    };
    session.teardown();
    response
}

async fn apply_and_add(
    session: &mut DashboardSession,
    fields: Vec<(DeviceField, &str)>,
) -> Result<(), ControllerError> {
    for (field, value) in fields {
        session.change_new_device_field(field, value)?;
    }
    session.add().await
}

/// POST /dashboard/loads/{index}
pub async fn dashboard_save(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(index): Path<usize>,
    Form(fields): Form<DeviceFieldsRequest>,
) -> Response {
    let mut session = match activate(&state, &headers).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let uid = session.identity().uid.clone();

    let result = match parse_fields(&fields) {
        Ok(parsed) => apply_and_save(&mut session, index, parsed).await,
        Err(e) => Err(ControllerError::Validation(e)),
    };

    let response = match result {
        Ok(()) => Redirect::to(DASHBOARD_ROUTE).into_response(),
        Err(e) => {
            let (status, flash) = controller_failure(e, SAVE_FAILED);
            let form_token = state.form_tokens.issue(&uid).await;
            (status, dashboard_page(&session, Some(flash), &form_token)).into_response()
        }
    };
    session.teardown();
    response
}

async fn apply_and_save(
    session: &mut DashboardSession,
    index: usize,
    fields: Vec<(DeviceField, &str)>,
) -> Result<(), ControllerError> {
    session.begin_edit(index)?;
    for (field, value) in fields {
        session.change_field(field, value)?;
    }
    session.save().await
}

fn add_load_defaults() -> Device {
    Device {
        status: DeviceStatus::Active,
        ..Device::default()
    }
}

/// GET /add-load
pub async fn add_load_form(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(user) = signed_in_user(&state, &headers).await else {
        return Redirect::to(LOGIN_ROUTE).into_response();
    };
    state.analytics.page_view("/add-load");

    render_add_load(&state, &user, &add_load_defaults(), None)
        .await
        .into_response()
}

/// POST /add-load
pub async fn add_load_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(mut fields): Form<DeviceFieldsRequest>,
) -> Response {
    let Some(user) = signed_in_user(&state, &headers).await else {
        return Redirect::to(LOGIN_ROUTE).into_response();
    };

    let form_token = fields.remove(FORM_TOKEN_FIELD).unwrap_or_default();
    if !state.form_tokens.redeem(&user.uid, &form_token).await {
        warn!(uid = %user.uid, "add-load form submitted twice or expired, ignoring");
        let flash = Flash::Error(ALREADY_SUBMITTED.to_string());
        let page = render_add_load(&state, &user, &add_load_defaults(), Some(flash)).await;
        return (StatusCode::CONFLICT, page).into_response();
    }

    let record = match record_from_fields(&fields) {
        Ok(record) => record,
        Err(e) => {
            let flash = Flash::Error(e.to_string());
            let page = render_add_load(&state, &user, &add_load_defaults(), Some(flash)).await;
            return (StatusCode::BAD_REQUEST, page).into_response();
        }
    };

    let written = match to_document(&record) {
        Ok(doc) => state.store.add_document(LOADS_COLLECTION, doc).await,
        Err(e) => Err(e),
    };

    match written {
        Ok(_) => Redirect::to(DASHBOARD_ROUTE).into_response(),
        Err(e) => {
            warn!("Add-load write failed: {}", e);
            let flash = Flash::Error(ADD_LOAD_FAILED.to_string());
            let page = render_add_load(&state, &user, &record.device, Some(flash)).await;
            (StatusCode::BAD_GATEWAY, page).into_response()
        }
    }
}

/// POST /logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        if let Err(e) = state.auth.sign_out(&token).await {
            warn!("Sign-out failed: {}", e);
        }
    }
    with_cookie(clear_session_cookie(), Redirect::to(LOGIN_ROUTE))
}

async fn signed_in_user(state: &AppState, headers: &HeaderMap) -> Option<UserIdentity> {
    let token = session_token(headers)?;
    state.auth.current_user(&token).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_device_inputs_select_current_status() {
        let html = device_inputs(&Device {
            name: "<Fan>".into(),
            status: DeviceStatus::Active,
            ..Device::default()
        });
        assert!(html.contains(r#"value="&lt;Fan&gt;""#));
        assert!(html.contains(r#"<option value="active" selected>active</option>"#));
        assert!(html.contains(r#"<option value="standby">standby</option>"#));
    }

    #[test]
    fn test_credentials_page_refresh() {
        let Html(page) = credentials_page(
            CredentialsForm::Signup,
            "a@b.co",
            Some(Flash::Success(SIGNUP_SUCCEEDED.to_string())),
            Some(DASHBOARD_ROUTE),
        );
        assert!(page.contains(r#"content="2;url=/dashboard""#));
        assert!(page.contains(SIGNUP_SUCCEEDED));
    }

    #[test]
    fn test_add_load_page_carries_form_token() {
        let Html(page) = add_load_page(&add_load_defaults(), None, "abc123");
        assert!(page.contains(r#"<input type="hidden" name="form_token" value="abc123">"#));
        assert!(page.contains("disabled = true"));
    }
}

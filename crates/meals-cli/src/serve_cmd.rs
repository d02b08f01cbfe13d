//! `meals serve`: the HTTP surface over the workflow.
//!
//! Workflow outcomes map onto responses as follows: renders are `200` with
//! `{view, messages}`, redisplays after validation failure are `422`,
//! redirects are `303 See Other` with a `Location` header and a
//! `{redirect, messages}` body.

use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::{Form, FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

use meals_core::account::{self, ProfileInput};
use meals_core::children::{self, ChildInput};
use meals_core::token::{TokenConfig, validate_token};
use meals_core::{Message, Outcome, RequestContext, Route, choices, order, report};

/// Cookie carrying the session token for browser clients.
pub const SESSION_COOKIE: &str = "meals_session";

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub tokens: TokenConfig,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Outcome -> response
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ViewBody<V> {
    view: V,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct RedirectBody {
    redirect: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct MessagesBody {
    messages: Vec<Message>,
}

fn see_other(location: String, messages: Vec<Message>) -> Response {
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, location.clone())],
        Json(RedirectBody {
            redirect: location,
            messages,
        }),
    )
        .into_response()
}

fn respond<V: Serialize>(outcome: Outcome<V>) -> Response {
    match outcome {
        Outcome::Render { view, messages } => {
            (StatusCode::OK, Json(ViewBody { view, messages })).into_response()
        }
        Outcome::Invalid { view, messages } => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(ViewBody { view, messages })).into_response()
        }
        Outcome::Redirect { to, messages } => see_other(to.path(), messages),
        Outcome::NotFound { messages } => {
            (StatusCode::NOT_FOUND, Json(MessagesBody { messages })).into_response()
        }
        Outcome::Forbidden { messages } => {
            (StatusCode::FORBIDDEN, Json(MessagesBody { messages })).into_response()
        }
        Outcome::Failed { messages } => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(MessagesBody { messages })).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// The caller's context, built from a verified session token. Requests
/// without one are sent to the login page.
pub struct Session(pub RequestContext);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token)
        .filter(|token| !token.is_empty())
}

fn login_redirect(message: &str) -> Response {
    see_other(Route::Login.path(), vec![Message::info(message)])
}

impl FromRequestParts<AppState> for Session {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers).or_else(|| session_cookie(&parts.headers))
        else {
            return Err(login_redirect("Please sign in."));
        };

        match validate_token(&state.tokens, token) {
            Ok(principal) => Ok(Self(RequestContext::new(principal))),
            Err(err) => {
                debug!(error = %err, "rejected session token");
                Err(login_redirect("Your session is not valid. Please sign in again."))
            }
        }
    }
}

fn session_cookie_header(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

fn cleared_cookie_header() -> String {
    format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .route("/order", get(show_order).post(submit_order))
        .route("/children", get(list_children).post(add_child))
        .route("/children/new", get(new_child))
        .route("/children/{id}/edit", post(edit_child))
        .route("/children/{id}/delete", post(delete_child))
        .route("/history", get(history))
        .route("/choices/{id}", get(show_choice))
        .route("/choices/{id}/edit", post(edit_choice))
        .route("/choices/{id}/delete", post(delete_choice))
        .route("/account", get(show_account).post(update_account))
        .route("/account/delete", post(delete_account))
        .route("/admin/orders", get(staff_orders))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("meals serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("meals serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for Ctrl+C");
    }
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

async fn index() -> Html<&'static str> {
    Html(
        "<!DOCTYPE html>\
<html><head><title>meals</title></head><body>\
<h1>meals</h1>\
<ul>\
<li><a href=\"/order\">Choose meals</a></li>\
<li><a href=\"/children\">Children</a></li>\
<li><a href=\"/history\">Meal history</a></li>\
<li><a href=\"/account\">Account</a></li>\
<li><a href=\"/admin/orders\">Kitchen orders (staff)</a></li>\
</ul>\
<form method=\"post\" action=\"/logout\"><button>Sign out</button></form>\
</body></html>",
    )
}

async fn login_page() -> Html<&'static str> {
    Html(
        "<!DOCTYPE html>\
<html><head><title>meals: sign in</title></head><body>\
<h1>Sign in</h1>\
<form method=\"post\" action=\"/login\">\
<label>Session token <input name=\"token\" autocomplete=\"off\"></label>\
<button>Sign in</button>\
</form>\
</body></html>",
    )
}

#[derive(Deserialize)]
struct LoginForm {
    #[serde(default)]
    token: String,
}

async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let token = form.token.trim();
    let principal = validate_token(&state.tokens, token).map_err(|err| {
        debug!(error = %err, "login rejected");
        AppError::unauthorized("invalid session token")
    })?;
    info!(username = %principal.username, role = %principal.role, "signed in");

    let redirect = see_other(
        Route::Order(None).path(),
        vec![Message::success(format!("Signed in as {}.", principal.username))],
    );
    Ok(([(header::SET_COOKIE, session_cookie_header(token))], redirect).into_response())
}

async fn logout() -> Response {
    let redirect = login_redirect("You have been signed out.");
    ([(header::SET_COOKIE, cleared_cookie_header())], redirect).into_response()
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
}

async fn show_order(
    State(state): State<AppState>,
    Session(ctx): Session,
    Query(query): Query<DateQuery>,
) -> Response {
    respond(order::show_order(&state.pool, &ctx, query.date.as_deref()).await)
}

async fn submit_order(
    State(state): State<AppState>,
    Session(ctx): Session,
    Query(query): Query<DateQuery>,
    Form(submitted): Form<HashMap<String, String>>,
) -> Response {
    respond(order::submit_order(&state.pool, &ctx, query.date.as_deref(), &submitted).await)
}

// ---------------------------------------------------------------------------
// Children
// ---------------------------------------------------------------------------

async fn list_children(State(state): State<AppState>, Session(ctx): Session) -> Response {
    respond(children::list_children(&state.pool, &ctx).await)
}

async fn new_child(Session(_): Session) -> Response {
    respond(children::new_child_form())
}

async fn add_child(
    State(state): State<AppState>,
    Session(ctx): Session,
    Form(input): Form<ChildInput>,
) -> Response {
    respond(children::add_child(&state.pool, &ctx, &input).await)
}

async fn edit_child(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<Uuid>,
    Form(input): Form<ChildInput>,
) -> Response {
    respond(children::edit_child(&state.pool, &ctx, id, &input).await)
}

async fn delete_child(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<Uuid>,
) -> Response {
    respond(children::delete_child(&state.pool, &ctx, id).await)
}

// ---------------------------------------------------------------------------
// Recorded choices
// ---------------------------------------------------------------------------

async fn history(State(state): State<AppState>, Session(ctx): Session) -> Response {
    respond(choices::choice_history(&state.pool, &ctx).await)
}

async fn show_choice(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<Uuid>,
) -> Response {
    respond(choices::show_choice(&state.pool, &ctx, id).await)
}

#[derive(Deserialize)]
struct MealForm {
    meal: Option<String>,
}

async fn edit_choice(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<Uuid>,
    Form(form): Form<MealForm>,
) -> Response {
    respond(choices::edit_choice(&state.pool, &ctx, id, form.meal.as_deref()).await)
}

async fn delete_choice(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<Uuid>,
) -> Response {
    respond(choices::delete_choice(&state.pool, &ctx, id).await)
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

async fn show_account(State(state): State<AppState>, Session(ctx): Session) -> Response {
    respond(account::show_profile(&state.pool, &ctx).await)
}

async fn update_account(
    State(state): State<AppState>,
    Session(ctx): Session,
    Form(input): Form<ProfileInput>,
) -> Response {
    respond(account::update_profile(&state.pool, &ctx, &input).await)
}

async fn delete_account(State(state): State<AppState>, Session(ctx): Session) -> Response {
    let outcome = account::delete_account(&state.pool, &ctx).await;
    if outcome.redirect_target() == Some(&Route::Login) {
        ([(header::SET_COOKIE, cleared_cookie_header())], respond(outcome)).into_response()
    } else {
        respond(outcome)
    }
}

// ---------------------------------------------------------------------------
// Staff
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
}

async fn staff_orders(
    State(state): State<AppState>,
    Session(ctx): Session,
    Query(range): Query<RangeQuery>,
) -> Response {
    respond(
        report::staff_orders(&state.pool, &ctx, range.from.as_deref(), range.to.as_deref()).await,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chrono::{Days, Local, NaiveDate};
    use sqlx::PgPool;
    use tower::ServiceExt;

    use meals_core::token::{Principal, TokenConfig, generate_token};
    use meals_test_utils::{
        count_choices, create_test_db, drop_test_db, seed_child, seed_meal, seed_parent,
        seed_registration,
    };

    use super::{AppState, SESSION_COOKIE, build_router};

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    fn tokens() -> TokenConfig {
        TokenConfig::new(vec![7u8; 32])
    }

    fn bearer(principal: &Principal) -> String {
        format!("Bearer {}", generate_token(&tokens(), principal))
    }

    fn next_week() -> NaiveDate {
        Local::now()
            .date_naive()
            .checked_add_days(Days::new(7))
            .unwrap()
    }

    async fn send(pool: &PgPool, request: Request<Body>) -> axum::response::Response {
        let app = build_router(AppState {
            pool: pool.clone(),
            tokens: tokens(),
        });
        app.oneshot(request).await.unwrap()
    }

    fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_form(uri: &str, auth: Option<&str>, body: String) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn location(response: &axum::response::Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .expect("redirect should carry a location")
            .to_str()
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn index_returns_html() {
        let (pool, db_name) = create_test_db().await;

        let resp = send(&pool, get("/", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.contains("text/html"), "got: {content_type}");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn missing_or_forged_session_redirects_to_login() {
        let (pool, db_name) = create_test_db().await;

        let resp = send(&pool, get("/order", None)).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/login");

        let forged = generate_token(&TokenConfig::new(vec![1u8; 32]), &Principal::parent("pat"));
        let resp = send(&pool, get("/order", Some(&format!("Bearer {forged}")))).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/login");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn parent_without_children_is_sent_to_add_child() {
        let (pool, db_name) = create_test_db().await;

        let auth = bearer(&Principal::parent("newcomer"));
        let resp = send(&pool, get("/order", Some(&auth))).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/children/new");
        let json = body_json(resp).await;
        assert_eq!(json["redirect"], "/children/new");
        assert_eq!(json["messages"][0]["level"], "info");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn order_page_and_submission() {
        let (pool, db_name) = create_test_db().await;

        let parent = seed_parent(&pool, "pat").await;
        let child = seed_child(&pool, parent.id, "Cara", 3).await;
        let a = seed_meal(&pool, "Meal A").await;
        let b = seed_meal(&pool, "Meal B").await;
        let day = next_week();
        let reg = seed_registration(&pool, day, &[&a, &b]).await;
        let auth = bearer(&Principal::parent("pat"));

        let resp = send(&pool, get("/order", Some(&auth))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["view"]["selected_date"], day.to_string());
        assert_eq!(json["view"]["mode"], "selecting");
        let field = json["view"]["forms"][0]["field"].as_str().unwrap().to_owned();
        assert_eq!(field, format!("{}-meal", child.id));

        let uri = format!("/order?date={day}");
        let resp = send(&pool, post_form(&uri, Some(&auth), format!("{field}=not-a-meal"))).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(resp).await;
        assert_eq!(json["view"]["errors"][0]["field"], field);
        assert_eq!(count_choices(&pool, child.id, reg.id).await, 0);

        let resp = send(&pool, post_form(&uri, Some(&auth), format!("{field}={}", b.id))).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), format!("/order?date={day}"));
        assert_eq!(count_choices(&pool, child.id, reg.id).await, 1);

        let resp = send(&pool, get("/history", Some(&auth))).await;
        let json = body_json(resp).await;
        assert_eq!(json["view"]["entries"][0]["meal_name"], "Meal B");
        assert_eq!(json["view"]["entries"][0]["editable"], true);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn login_sets_cookie_that_authenticates() {
        let (pool, db_name) = create_test_db().await;

        let token = generate_token(&tokens(), &Principal::parent("pat"));
        let resp = send(&pool, post_form("/login", None, format!("token={token}"))).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_owned();
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE}={token}")));

        let request = Request::builder()
            .uri("/account")
            .header(header::COOKIE, format!("theme=dark; {SESSION_COOKIE}={token}"))
            .body(Body::empty())
            .unwrap();
        let resp = send(&pool, request).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["view"]["username"], "pat");

        let resp = send(&pool, post_form("/login", None, "token=garbage".to_owned())).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn children_can_be_added_over_http() {
        let (pool, db_name) = create_test_db().await;

        let auth = bearer(&Principal::parent("pat"));
        let resp = send(
            &pool,
            post_form(
                "/children",
                Some(&auth),
                "first_name=Cara&last_name=Smith&year_group=3".to_owned(),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/children");

        let resp = send(
            &pool,
            post_form("/children", Some(&auth), "first_name=&year_group=99".to_owned()),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let json = body_json(send(&pool, get("/children", Some(&auth))).await).await;
        assert_eq!(json["view"]["children"].as_array().unwrap().len(), 1);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn unknown_choice_is_not_found() {
        let (pool, db_name) = create_test_db().await;

        let auth = bearer(&Principal::parent("pat"));
        let uri = format!("/choices/{}/delete", uuid::Uuid::new_v4());
        let resp = send(&pool, post_form(&uri, Some(&auth), String::new())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn admin_orders_are_staff_only() {
        let (pool, db_name) = create_test_db().await;

        let resp = send(&pool, get("/admin/orders", Some(&bearer(&Principal::parent("pat"))))).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let a = seed_meal(&pool, "Meal A").await;
        seed_registration(&pool, next_week(), &[&a]).await;
        let resp = send(
            &pool,
            get("/admin/orders", Some(&bearer(&Principal::staff("kitchen")))),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["view"]["days"][0]["meals"][0]["name"], "Meal A");
        assert_eq!(json["view"]["days"][0]["meals"][0]["count"], 0);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn parent_pages_are_forbidden_to_staff() {
        let (pool, db_name) = create_test_db().await;

        let auth = bearer(&Principal::staff("kitchen"));
        for uri in ["/order", "/children", "/history", "/account"] {
            let resp = send(&pool, get(uri, Some(&auth))).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
        }

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn deleting_account_clears_cookie() {
        let (pool, db_name) = create_test_db().await;

        let auth = bearer(&Principal::parent("pat"));
        let resp = send(&pool, post_form("/account/delete", Some(&auth), String::new())).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/login");
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));

        pool.close().await;
        drop_test_db(&db_name).await;
    }
}

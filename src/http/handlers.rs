//! Users API and health check.
//!
//! Every users route runs through `Dispatcher::serve` under its own command.
//! Handlers only translate between the transport and `UserService`; the
//! dispatcher owns breaker accounting, logging and encoding.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::{AppError, ErrorKind, FieldPath};
use crate::domain::usecase::{CreateUserInput, UpdateUserInput};
use crate::http::dispatch::{Dispatcher, Route};
use crate::http::outcome::{bare_response, Outcome};
use crate::http::request::RequestScope;
use crate::http::server::AppState;
use crate::resilience::BreakerConfigError;

pub const GET_USER: &str = "get-user";
pub const CREATE_USER: &str = "create-user";
pub const UPDATE_USER: &str = "update-user";

/// Breaker-bound routes of the users API.
#[derive(Debug, Clone)]
pub struct UserRoutes {
    pub get_user: Route,
    pub create_user: Route,
    pub update_user: Route,
}

impl UserRoutes {
    pub fn register(dispatcher: &Dispatcher) -> Result<Self, BreakerConfigError> {
        Ok(Self {
            get_user: dispatcher.route(GET_USER)?,
            create_user: dispatcher.route(CREATE_USER)?,
            update_user: dispatcher.route(UPDATE_USER)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn get_user(
    State(state): State<AppState>,
    scope: RequestScope,
    Path(id): Path<String>,
) -> Response {
    let users = state.users.clone();
    let handler = async move {
        let id = match parse_id(&id) {
            Ok(id) => id,
            Err(err) => return Outcome::from_error(err),
        };
        match users.get_user(id).await {
            Ok(user) => Outcome::ok(&user).with_log_attr("user_id", id.to_string()),
            Err(err) => Outcome::from_error(err).with_log_attr("user_id", id.to_string()),
        }
    };

    state
        .dispatcher
        .serve(&state.routes.get_user, &scope, handler)
        .await
}

pub async fn create_user(
    State(state): State<AppState>,
    scope: RequestScope,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Response {
    let users = state.users.clone();
    let authorized = authorize(state.api_key.as_deref(), &scope);
    let handler = async move {
        if let Err(err) = authorized {
            return Outcome::from_error(err);
        }
        let Json(request) = match body {
            Ok(body) => body,
            Err(rejection) => return Outcome::from_error(AppError::invalid_request(rejection)),
        };

        match users.create_user(CreateUserInput { name: request.name }).await {
            Ok(output) => Outcome::ok(&CreateUserResponse { id: output.user_id })
                .with_log_attr("user_id", output.user_id.to_string()),
            Err(err) => Outcome::from_error(err),
        }
    };

    state
        .dispatcher
        .serve(&state.routes.create_user, &scope, handler)
        .await
}

pub async fn update_user(
    State(state): State<AppState>,
    scope: RequestScope,
    Path(id): Path<String>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Response {
    let users = state.users.clone();
    let authorized = authorize(state.api_key.as_deref(), &scope);
    let handler = async move {
        if let Err(err) = authorized {
            return Outcome::from_error(err);
        }
        let id = match parse_id(&id) {
            Ok(id) => id,
            Err(err) => return Outcome::from_error(err),
        };
        let Json(request) = match body {
            Ok(body) => body,
            Err(rejection) => return Outcome::from_error(AppError::invalid_request(rejection)),
        };

        let input = UpdateUserInput {
            id,
            name: request.name,
        };
        match users.update_user(input).await {
            Ok(()) => Outcome::empty(StatusCode::OK).with_log_attr("user_id", id.to_string()),
            Err(err) => Outcome::from_error(err).with_log_attr("user_id", id.to_string()),
        }
    };

    state
        .dispatcher
        .serve(&state.routes.update_user, &scope, handler)
        .await
}

/// Fallback for a known path hit with an unsupported method.
pub async fn method_not_allowed() -> Response {
    rejected(ErrorKind::MethodNotAllowed)
}

/// Fallback for paths no route matches.
pub async fn not_found() -> Response {
    rejected(ErrorKind::NotFound)
}

fn rejected(kind: ErrorKind) -> Response {
    let outcome = Outcome::from_error(AppError::of_kind(kind));
    outcome
        .encode()
        .unwrap_or_else(|_| bare_response(outcome.status))
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|err| {
        AppError::validation(&FieldPath::new(["id"]), "invalid-uuid", "must be a valid uuid")
            .with_source(err)
    })
}

/// Mutating routes require the configured bearer key, when there is one.
fn authorize(api_key: Option<&str>, scope: &RequestScope) -> Result<(), AppError> {
    match api_key {
        None => Ok(()),
        Some(key) if scope.bearer_token() == Some(key) => Ok(()),
        Some(_) => Err(AppError::of_kind(ErrorKind::Unauthorized)),
    }
}

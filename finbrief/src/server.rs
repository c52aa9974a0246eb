use std::sync::Arc;

use anyhow::{anyhow, Result};
use common::ServerConfig;
use rocket::figment::Figment;
use rocket::http::Status;
use rocket::serde::json::{self, Json};
use rocket::{catch, catchers, get, post, routes, Build, Request, Rocket, State};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::archive::BriefingArchive;
use crate::messenger::Messenger;
use crate::subscribers::{self, SubscribeOutcome, SubscriberStore, UnsubscribeOutcome};

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SubscriberStore>,
    /// Absent when mail credentials are not configured; welcome emails are skipped
    pub messenger: Option<Arc<Messenger>>,
    pub archive: BriefingArchive,
}

type ApiResponse = (Status, Json<Value>);

fn api_error(status: Status, code: &str, message: &str) -> ApiResponse {
    (
        status,
        Json(json!({ "success": false, "error": message, "code": code })),
    )
}

#[derive(Deserialize)]
struct SubscribeRequest {
    #[serde(default)]
    email: String,
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

/// Most recent archived briefing.
#[get("/api/briefing/latest")]
async fn latest_briefing(state: &State<AppState>) -> ApiResponse {
    match state.archive.latest().await {
        Ok(Some(record)) => match serde_json::to_value(&record) {
            Ok(value) => (Status::Ok, Json(value)),
            Err(e) => {
                tracing::error!("failed to serialize briefing: {}", e);
                (Status::InternalServerError, Json(json!({ "error": "브리핑을 읽을 수 없습니다." })))
            }
        },
        Ok(None) => (Status::NotFound, Json(json!({ "error": "아직 생성된 브리핑이 없습니다." }))),
        Err(e) => {
            tracing::error!("failed to read briefing archive: {:#}", e);
            (Status::InternalServerError, Json(json!({ "error": "브리핑을 읽을 수 없습니다." })))
        }
    }
}

/// Any content type is accepted; a body that is not a JSON object is a validation error.
#[post("/api/subscribe", data = "<body>")]
async fn subscribe(
    state: &State<AppState>,
    body: Result<Json<SubscribeRequest>, json::Error<'_>>,
) -> ApiResponse {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!("rejected subscribe body: {}", e);
            return api_error(
                Status::BadRequest,
                "VALIDATION_ERROR",
                "올바른 이메일 주소를 입력해주세요.",
            );
        }
    };

    let outcome = subscribers::subscribe(
        state.store.as_ref(),
        state.messenger.as_deref(),
        &body.email,
    )
    .await;

    match outcome {
        Ok(SubscribeOutcome::Created) => (
            Status::Ok,
            Json(json!({ "success": true, "message": "구독이 완료되었습니다! 환영 이메일을 확인해주세요." })),
        ),
        Ok(SubscribeOutcome::Reactivated) => (
            Status::Ok,
            Json(json!({ "success": true, "message": "구독이 다시 활성화되었습니다!" })),
        ),
        Ok(SubscribeOutcome::AlreadySubscribed) => api_error(
            Status::Conflict,
            "ALREADY_SUBSCRIBED",
            "이미 구독 중인 이메일입니다.",
        ),
        Ok(SubscribeOutcome::InvalidEmail) => api_error(
            Status::BadRequest,
            "VALIDATION_ERROR",
            "올바른 이메일 주소를 입력해주세요.",
        ),
        Err(e) => {
            tracing::error!("subscribe failed: {:#}", e);
            api_error(
                Status::InternalServerError,
                "DATABASE_ERROR",
                "구독 처리 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요.",
            )
        }
    }
}

#[get("/api/unsubscribe?<token>")]
async fn unsubscribe(state: &State<AppState>, token: Option<String>) -> ApiResponse {
    let token = token.unwrap_or_default();
    match subscribers::unsubscribe(state.store.as_ref(), &token).await {
        Ok(UnsubscribeOutcome::Unsubscribed) => (
            Status::Ok,
            Json(json!({ "success": true, "message": "구독이 해지되었습니다." })),
        ),
        Ok(UnsubscribeOutcome::NotFound) => api_error(
            Status::NotFound,
            "NOT_FOUND",
            "유효하지 않은 구독 해지 링크입니다.",
        ),
        Err(e) => {
            tracing::error!("unsubscribe failed: {:#}", e);
            api_error(
                Status::InternalServerError,
                "DATABASE_ERROR",
                "구독 해지 중 오류가 발생했습니다.",
            )
        }
    }
}

#[catch(400)]
fn bad_request(_req: &Request) -> Json<Value> {
    Json(json!({ "success": false, "error": "입력값이 올바르지 않습니다.", "code": "VALIDATION_ERROR" }))
}

#[catch(422)]
fn unprocessable(_req: &Request) -> Json<Value> {
    Json(json!({ "success": false, "error": "입력값이 올바르지 않습니다.", "code": "VALIDATION_ERROR" }))
}

#[catch(404)]
fn not_found(_req: &Request) -> Json<Value> {
    Json(json!({ "success": false, "error": "not found" }))
}

#[catch(500)]
fn internal_error(_req: &Request) -> Json<Value> {
    Json(json!({ "success": false, "error": "서버 오류가 발생했습니다.", "code": "INTERNAL_ERROR" }))
}

/// Assemble the Rocket instance without launching it.
pub fn build_rocket(state: AppState, figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(state)
        .mount("/", routes![health, latest_briefing, subscribe, unsubscribe])
        .register("/", catchers![bad_request, unprocessable, not_found, internal_error])
}

/// Build and launch the HTTP server on the configured address. Blocks until shutdown.
pub async fn launch_server(state: AppState, server: &ServerConfig) -> Result<()> {
    let figment = rocket::Config::figment()
        .merge(("address", server.address.clone()))
        .merge(("port", server.port));

    tracing::info!(address = %server.address, port = server.port, "Starting Rocket HTTP server");
    build_rocket(state, figment)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse, Responder};
use futures_util::TryStreamExt;
use hub_core::driver::WriteStream;
use hub_core::ops::{self, ListFilesRequest};
use hub_core::upload::{self, UploadRequest};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io;
use tokio_util::io::StreamReader;

use crate::http_error::response_for;
use crate::state::AppState;
use crate::time::now_unix;

fn bearer_header(req: &HttpRequest) -> &str {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
}

/// `POST /store/{principal}/{path}` (§6): streams the request body straight
/// into the driver without buffering it in memory first.
#[post("/store/{principal}/{path:.*}")]
async fn store(
    req: HttpRequest,
    path_params: web::Path<(String, String)>,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> impl Responder {
    let (principal, object_path) = path_params.into_inner();
    let content_type = req
        .headers()
        .get("Content-Type")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    let content_length = req
        .headers()
        .get("Content-Length")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());

    let stream = payload.map_err(|e| io::Error::other(e.to_string()));
    let body: WriteStream = Box::pin(StreamReader::new(stream));

    let upload_req = UploadRequest {
        principal: &principal,
        path: &object_path,
        authorization_header: bearer_header(&req),
        content_type: content_type.as_deref(),
        content_length,
    };

    match upload::handle_request(
        upload_req,
        body,
        &state.driver,
        &state.revocation,
        &hub_core::proof::AllowAllProofChecker,
        state.hub_url_policy(),
        &state.config,
        now_unix(),
    )
    .await
    {
        Ok(public_url) => HttpResponse::Accepted().json(json!({ "publicURL": public_url })),
        Err(e) => response_for(&principal, &object_path, &e),
    }
}

/// `DELETE /delete/{principal}/{path}` (§6).
#[delete("/delete/{principal}/{path:.*}")]
async fn delete_object(
    req: HttpRequest,
    path_params: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> impl Responder {
    let (principal, object_path) = path_params.into_inner();
    match ops::handle_delete(
        &principal,
        &object_path,
        bearer_header(&req),
        &state.driver,
        &state.revocation,
        state.hub_url_policy(),
        &state.config,
        now_unix(),
    )
    .await
    {
        Ok(()) => HttpResponse::Accepted().finish(),
        Err(e) => response_for(&principal, &object_path, &e),
    }
}

#[derive(Deserialize, Default)]
struct ListFilesBody {
    page: Option<String>,
    #[serde(default)]
    stat: bool,
}

#[derive(Serialize)]
struct ListFilesResponse {
    entries: Vec<Option<ListEntryJson>>,
    page: Option<String>,
}

#[derive(Serialize)]
struct ListEntryJson {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stat: Option<serde_json::Value>,
}

/// `POST /list-files/{principal}` (§6): body `{ page?, stat? }`.
#[post("/list-files/{principal}")]
async fn list_files(
    req: HttpRequest,
    path_params: web::Path<String>,
    body: web::Json<ListFilesBody>,
    state: web::Data<AppState>,
) -> impl Responder {
    let principal = path_params.into_inner();
    let list_req = ListFilesRequest {
        principal: &principal,
        authorization_header: bearer_header(&req),
        page: body.page.as_deref(),
        stat: body.stat,
    };
    match ops::handle_list(
        list_req,
        &state.driver,
        &state.revocation,
        state.hub_url_policy(),
        &state.config,
        now_unix(),
    )
    .await
    {
        Ok(page) => {
            let entries = page
                .entries
                .into_iter()
                .map(|entry| {
                    entry.map(|e| ListEntryJson {
                        name: e.name,
                        stat: e.stat.map(|s| {
                            json!({
                                "exists": s.exists,
                                "contentType": s.content_type,
                                "contentLength": s.content_length,
                                "etag": s.etag,
                            })
                        }),
                    })
                })
                .collect();
            HttpResponse::Ok().json(ListFilesResponse { entries, page: page.page })
        }
        Err(e) => response_for(&principal, "", &e),
    }
}

#[derive(Deserialize)]
struct RevokeAllBody {
    #[serde(rename = "oldestValidTimestamp")]
    oldest_valid_timestamp: i64,
}

/// `POST /revoke-all/{principal}` (§6): body `{ oldestValidTimestamp }`.
#[post("/revoke-all/{principal}")]
async fn revoke_all(
    req: HttpRequest,
    path_params: web::Path<String>,
    body: web::Json<RevokeAllBody>,
    state: web::Data<AppState>,
) -> impl Responder {
    let principal = path_params.into_inner();
    match ops::handle_revoke_all(
        &principal,
        bearer_header(&req),
        body.oldest_valid_timestamp,
        &state.revocation,
        state.hub_url_policy(),
        &state.config,
        now_unix(),
    )
    .await
    {
        Ok(()) => HttpResponse::Accepted().finish(),
        Err(e) => response_for(&principal, "", &e),
    }
}

/// `GET /hub_info` (§6): no authentication required.
#[get("/hub_info")]
async fn hub_info(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "challenge_text": state.config.challenge_text,
        "latest_auth_version": state.config.latest_auth_version,
        "read_url_prefix": state.config.read_url_prefix,
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(store)
        .service(delete_object)
        .service(list_files)
        .service(revoke_all)
        .service(hub_info);
}

use actix_cors::Cors;
use actix_web::{get, head, web, HttpResponse, Responder};
use hub_core::gateway::{self, GetOutcome, HeadOutcome, ReadHeaders};
use tokio_util::io::ReaderStream;

use crate::state::AppState;

fn apply_headers(response: &mut actix_web::HttpResponseBuilder, headers: &ReadHeaders) {
    if let Some(content_type) = &headers.content_type {
        response.content_type(content_type.as_str());
    }
    if let Some(etag) = &headers.etag {
        response.insert_header(("ETag", etag.as_str()));
    }
    if let Some(last_modified) = headers.last_modified {
        response.insert_header(("Last-Modified", gateway::format_last_modified(last_modified)));
    }
}

/// `GET /{bucket}/{key}` (§4.7, §6): no authentication, streams the object
/// body without buffering it in memory.
#[get("/{bucket}/{key:.*}")]
async fn get_object(
    path_params: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> impl Responder {
    let (bucket, key) = path_params.into_inner();
    match gateway::handle_get(&state.driver, &bucket, &key).await {
        Ok(GetOutcome::Found { stream, headers }) => {
            let mut builder = HttpResponse::Ok();
            apply_headers(&mut builder, &headers);
            if let Some(len) = headers.content_length {
                builder.insert_header(("Content-Length", len.to_string()));
            }
            builder.streaming(ReaderStream::new(stream))
        }
        Ok(GetOutcome::NotFound) => HttpResponse::NotFound().finish(),
        Err(e) => {
            tracing::error!(bucket, key, %e, "read gateway GET failed");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// `HEAD /{bucket}/{key}` (§4.7): coalesced through the shared single-flight.
#[head("/{bucket}/{key:.*}")]
async fn head_object(
    path_params: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> impl Responder {
    let (bucket, key) = path_params.into_inner();
    match gateway::handle_head(&state.driver, &state.stat_coalescer, &bucket, &key).await {
        Ok(HeadOutcome::Found { headers }) => {
            let mut builder = HttpResponse::Ok();
            apply_headers(&mut builder, &headers);
            if let Some(len) = headers.content_length {
                builder.insert_header(("Content-Length", len.to_string()));
            }
            builder.finish()
        }
        Ok(HeadOutcome::NotFound) => HttpResponse::NotFound().finish(),
        Err(e) => {
            tracing::error!(bucket, key, %e, "read gateway HEAD failed");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// CORS policy for the read surface (§6): any origin may read, `ETag` and
/// `Content-Type` exposed, preflight cached for a day.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(["GET", "HEAD", "OPTIONS"])
        .expose_headers(["ETag", "Content-Type"])
        .max_age(86_400)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_object).service(head_object);
}

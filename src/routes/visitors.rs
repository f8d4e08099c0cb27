use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::sqlite::SqlitePool;

use super::{ErrorResponse, INVALID_ARGUMENT, RequestContext, is_valid_email};
use crate::database::{self as db, VisitorIdentity};

#[derive(Serialize, Deserialize, Debug)]
pub struct VisitorCreate {
    pub nickname: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct VisitorResponse {
    pub id: i64,
    pub nickname: String,
    pub email: String,
}

/// Registers a visitor without judging anything
pub async fn post_submit_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    body: web::Json<VisitorCreate>,
) -> impl Responder {
    if !is_valid_email(&body.email) {
        return HttpResponse::BadRequest().json(INVALID_ARGUMENT);
    }

    let ctx = RequestContext::from_request(&req);
    let identity = VisitorIdentity {
        nickname: &body.nickname,
        email: &body.email,
        ip_address: &ctx.ip_address,
        user_agent: &ctx.user_agent,
    };

    match db::upsert_visitor(&pool, &identity, None).await {
        Ok(visitor) => {
            log::info!(
                "[ip={} ua={}] New submission received: nickname='{}', email='{}'",
                ctx.ip_address,
                ctx.user_agent,
                visitor.nickname,
                visitor.email
            );
            HttpResponse::Ok().json(VisitorResponse {
                id: visitor.id,
                nickname: visitor.nickname,
                email: visitor.email,
            })
        }
        Err(e) => {
            log::error!("Failed to save visitor: {e}");
            HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_EXTERNAL",
                code: 5,
            })
        }
    }
}

/// Health check
pub async fn root_handler(req: HttpRequest) -> impl Responder {
    let ctx = RequestContext::from_request(&req);
    log::info!("[ip={} ua={}] Root endpoint was accessed", ctx.ip_address, ctx.user_agent);
    HttpResponse::Ok().json(json!({ "message": "Welcome to the sandbox judge API" }))
}

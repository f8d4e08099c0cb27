use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::{ErrorResponse, INVALID_ARGUMENT, RequestContext, is_valid_email};
use crate::database::{self as db, VisitorIdentity};
use crate::judge::{Judge, JudgeResponse};

#[derive(Serialize, Deserialize, Debug)]
pub struct JudgeRequest {
    pub nickname: String,
    pub email: String,
    pub code: String,
}

/// Judges the submitted code and records the verdict on the visitor
///
/// The judge blocks for several container launches, so it runs on the
/// blocking pool. A failure to persist the verdict is logged but does not
/// keep it from the submitter.
pub async fn post_judge_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    judge: web::Data<Judge>,
    body: web::Json<JudgeRequest>,
) -> impl Responder {
    let JudgeRequest {
        nickname,
        email,
        code,
    } = body.into_inner();

    if !is_valid_email(&email) {
        return HttpResponse::BadRequest().json(INVALID_ARGUMENT);
    }

    let ctx = RequestContext::from_request(&req);
    log::info!(
        "[ip={} ua={}] Judge request received: nickname='{nickname}', email='{email}'",
        ctx.ip_address,
        ctx.user_agent
    );

    let judge = judge.into_inner();
    let verdict = match web::block(move || judge.judge(&code)).await {
        Ok(verdict) => verdict,
        Err(e) => {
            log::error!("Failed to run judge on the blocking pool: {e}");
            return HttpResponse::InternalServerError().json(ErrorResponse {
                reason: "ERR_INTERNAL",
                code: 6,
            });
        }
    };

    let identity = VisitorIdentity {
        nickname: &nickname,
        email: &email,
        ip_address: &ctx.ip_address,
        user_agent: &ctx.user_agent,
    };
    match db::upsert_visitor(&pool, &identity, Some(verdict.status())).await {
        Ok(visitor) => log::info!(
            "[ip={}] Visitor {} judged: {verdict} (stored status {:?})",
            ctx.ip_address,
            visitor.id,
            visitor.judge_status
        ),
        Err(e) => log::error!("Failed to save verdict of '{nickname}': {e}"),
    }

    HttpResponse::Ok().json(JudgeResponse::from(&verdict))
}

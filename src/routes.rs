mod judge;
mod visitors;

pub use judge::*;
pub use visitors::*;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
}

const INVALID_ARGUMENT: ErrorResponse = ErrorResponse {
    reason: "ERR_INVALID_ARGUMENT",
    code: 1,
};

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(INVALID_ARGUMENT);
    InternalError::from_response(err, response).into()
}

/// Registers every API route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(root_handler))
        .route("/api/submit", web::post().to(post_submit_handler))
        .route("/api/judge", web::post().to(post_judge_handler));
}

/// Client address and User-Agent, used for logging and for the visitor record
struct RequestContext {
    ip_address: String,
    user_agent: String,
}

impl RequestContext {
    fn from_request(req: &HttpRequest) -> Self {
        let ip_address = req
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let user_agent = req
            .headers()
            .get(actix_web::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Self {
            ip_address,
            user_agent,
        }
    }
}

/// Loose shape check, the address is only used as part of the identity
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;

use crate::config::ServerConfig;
use crate::judge::Judge;
use crate::routes::{configure, json_error_handler};

const ACCESS_LOG_FORMAT: &str = r#"%a "%r" %s %b "%{User-Agent}i" %T"#;

/// Lets any origin call the API, preflight requests included
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allow_any_method()
        .allow_any_header()
}

pub fn build_server(
    server_config: ServerConfig,
    db_pool: SqlitePool,
    judge: Arc<Judge>,
) -> std::io::Result<Server> {
    let db_pool = web::Data::new(db_pool);
    let judge = web::Data::from(judge);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(db_pool.clone())
            .app_data(judge.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(cors())
            .wrap(middleware::Logger::new(ACCESS_LOG_FORMAT))
            .configure(configure)
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(8000),
    ))?
    .run();

    Ok(server)
}

use std::sync::Arc;

use clap::Parser;

use sandbox_oj::config::{CliArgs, Config};
use sandbox_oj::database as db;
use sandbox_oj::judge::Judge;
use sandbox_oj::web_server::build_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let db_path = db::get_db_path();
    let cli = CliArgs::parse();

    let Config {
        server: server_config,
        sandbox: sandbox_config,
        problem: problem_config,
    } = cli.to_config().expect("Failed to load configuration");

    if cli.flush_data {
        db::remove_db(&db_path);
    }

    let db_pool = db::init_db(&db_path)
        .await
        .expect("Failed to initialize database");

    let judge = Judge::from_config(&sandbox_config, &problem_config)
        .map_err(|e| std::io::Error::other(format!("Failed to set up judge: {e:#}")))?;
    let judge = Arc::new(judge);

    // The judge cannot run anything without the image, so fail fast here
    {
        let judge = judge.clone();
        tokio::task::spawn_blocking(move || judge.provisioner().ensure_image())
            .await
            .map_err(std::io::Error::other)?
            .map_err(|e| {
                log::error!("Sandbox image provisioning failed: {e}");
                std::io::Error::other(e)
            })?;
    }

    // ======= PREPARATION END, EXECUTION START =======

    let server = build_server(server_config, db_pool, judge)?;
    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    server_handle.stop(true).await;

    log::info!("Shutdown complete");
    Ok(())
}

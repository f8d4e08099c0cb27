use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

const DATABASE_NAME: &str = "visitors.sqlite3";

/// Verdict status that is never overwritten once recorded
pub const STICKY_STATUS: &str = "Accept";

/// Identity fields of a submitter
#[derive(Debug, Clone)]
pub struct VisitorIdentity<'a> {
    pub nickname: &'a str,
    pub email: &'a str,
    pub ip_address: &'a str,
    pub user_agent: &'a str,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct Visitor {
    pub id: i64,
    pub nickname: String,
    pub email: String,
    pub ip_address: String,
    pub user_agent: String,
    pub created_time: String,
    pub judge_status: Option<String>,
}

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs =
        ProjectDirs::from("", "", "sandbox-oj").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(2)
        .min_connections(0)
        .connect(&db_url)
        .await?;

    // PRAGMA statements cannot be run inside a transaction
    for pragma_sql in &[
        "PRAGMA busy_timeout = 2000;", // 2 seconds timeout for lock contention
        "PRAGMA journal_mode = WAL;",
        "PRAGMA synchronous = NORMAL;",
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS visitors (
            id            INTEGER  PRIMARY KEY AUTOINCREMENT,
            nickname      TEXT     NOT NULL,
            email         TEXT     NOT NULL,
            ip_address    TEXT     NOT NULL,
            user_agent    TEXT     NOT NULL,
            created_time  TEXT     NOT NULL,
            judge_status  TEXT
        );",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_visitors_identity ON visitors(nickname, email);",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // Remove WAL and SHM files (ignore errors as they might not exist)
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = std::fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

/// Records a visitor's latest activity and, optionally, a new judge status.
///
/// A visitor is identified by `(nickname, email)`. IP address and User-Agent
/// are always refreshed. The judge status is only replaced when one is given
/// and the stored one is not [`STICKY_STATUS`]. Done in a single statement so
/// concurrent first submissions of the same visitor land on one row.
pub async fn upsert_visitor(
    pool: &SqlitePool,
    identity: &VisitorIdentity<'_>,
    judge_status: Option<&str>,
) -> sqlx::Result<Visitor> {
    let visitor = sqlx::query_as::<_, Visitor>(
        r#"
        INSERT INTO visitors (nickname, email, ip_address, user_agent, created_time, judge_status)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(nickname, email) DO UPDATE SET
            ip_address = excluded.ip_address,
            user_agent = excluded.user_agent,
            judge_status = CASE
                WHEN visitors.judge_status = ?7 THEN visitors.judge_status
                ELSE COALESCE(excluded.judge_status, visitors.judge_status)
            END
        RETURNING id, nickname, email, ip_address, user_agent, created_time, judge_status
        "#,
    )
    .bind(identity.nickname)
    .bind(identity.email)
    .bind(identity.ip_address)
    .bind(identity.user_agent)
    .bind(crate::create_timestamp())
    .bind(judge_status)
    .bind(STICKY_STATUS)
    .fetch_one(pool)
    .await?;

    log::debug!(
        "Visitor {} ('{}') recorded with status {:?}",
        visitor.id,
        visitor.nickname,
        visitor.judge_status
    );

    Ok(visitor)
}

pub async fn fetch_visitor(id: i64, pool: &SqlitePool) -> sqlx::Result<Visitor> {
    sqlx::query_as::<_, Visitor>(
        r#"
        SELECT id, nickname, email, ip_address, user_agent, created_time, judge_status
        FROM visitors
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity<'a>(ip_address: &'a str) -> VisitorIdentity<'a> {
        VisitorIdentity {
            nickname: "alice",
            email: "alice@example.com",
            ip_address,
            user_agent: "curl/8.0",
        }
    }

    #[tokio::test]
    async fn test_accept_status_is_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_db(dir.path().join("visitors.sqlite3")).await.unwrap();

        let first = upsert_visitor(&pool, &identity("10.0.0.1"), Some("Wrong Answer"))
            .await
            .unwrap();
        assert_eq!(first.judge_status.as_deref(), Some("Wrong Answer"));

        let second = upsert_visitor(&pool, &identity("10.0.0.2"), Some("Accept"))
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.judge_status.as_deref(), Some("Accept"));

        let third = upsert_visitor(&pool, &identity("10.0.0.3"), Some("Runtime Error"))
            .await
            .unwrap();
        assert_eq!(third.id, first.id);
        assert_eq!(third.ip_address, "10.0.0.3");
        assert_eq!(third.judge_status.as_deref(), Some("Accept"));
    }

    #[tokio::test]
    async fn test_missing_status_keeps_previous_one() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_db(dir.path().join("visitors.sqlite3")).await.unwrap();

        upsert_visitor(&pool, &identity("10.0.0.1"), Some("Runtime Error"))
            .await
            .unwrap();
        let visitor = upsert_visitor(&pool, &identity("10.0.0.1"), None)
            .await
            .unwrap();
        assert_eq!(visitor.judge_status.as_deref(), Some("Runtime Error"));

        let other = upsert_visitor(
            &pool,
            &VisitorIdentity {
                nickname: "bob",
                ..identity("10.0.0.9")
            },
            None,
        )
        .await
        .unwrap();
        assert_ne!(other.id, visitor.id);
        assert!(other.judge_status.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_first_submissions_share_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_db(dir.path().join("visitors.sqlite3")).await.unwrap();

        let statuses = ["Wrong Answer", "Accept", "Runtime Error", "Wrong Answer"];
        let tasks: Vec<_> = statuses
            .into_iter()
            .map(|status| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    upsert_visitor(&pool, &identity("10.0.0.1"), Some(status)).await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM visitors")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        // Whatever order the writes landed in, Accept was seen once and stuck
        let visitor = fetch_visitor(ids[0], &pool).await.unwrap();
        assert_eq!(visitor.judge_status.as_deref(), Some(STICKY_STATUS));
    }
}

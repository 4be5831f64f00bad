use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use tracing::info;

const CREATE_GUARD_ATTENDANCE: &str = r#"
CREATE TABLE IF NOT EXISTS guard_attendance (
    id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
    guard_name VARCHAR(255) NOT NULL,
    image LONGBLOB NOT NULL,
    latitude DOUBLE NULL,
    longitude DOUBLE NULL,
    start_timestamp DATETIME(6) NOT NULL,
    end_timestamp DATETIME(6) NULL,
    KEY idx_guard_attendance_open (guard_name, end_timestamp)
)
"#;

pub async fn init_db(database_url: &str, max_connections: u32) -> Result<MySqlPool, sqlx::Error> {
    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::query(CREATE_GUARD_ATTENDANCE).execute(&pool).await?;
    info!("guard_attendance table ready");

    Ok(pool)
}

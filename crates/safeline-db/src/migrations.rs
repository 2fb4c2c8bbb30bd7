use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, reports)");
        // Rolled back on drop if any statement fails
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL DEFAULT 'user',
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            -- reporter_id is a plain column: a report keeps its reporter id even
            -- when the user row is missing.
            CREATE TABLE reports (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                location            TEXT NOT NULL,
                description         TEXT NOT NULL,
                category            TEXT NOT NULL,
                image_url           TEXT,
                reporter_id         INTEGER,
                reporter_username   TEXT NOT NULL DEFAULT '',
                status              TEXT NOT NULL DEFAULT 'BELUM DITANGANI',
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_reports_created ON reports(created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}

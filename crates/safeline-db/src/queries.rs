use crate::Database;
use crate::models::{NewReportRow, ReportRow, UserRow};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Row};

/// Fixed-width UTC timestamps so lexical order in SQLite matches time order.
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

const USER_COLUMNS: &str = "id, username, password, role, created_at, updated_at";

const REPORT_COLUMNS: &str = "id, location, description, category, image_url, reporter_id, \
     reporter_username, status, created_at, updated_at";

impl Database {
    // -- Users --

    /// Insert a user and return its id. A duplicate username surfaces as a
    /// constraint error, see [`crate::is_unique_violation`].
    pub fn create_user(&self, username: &str, password_hash: &str, role: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO users (username, password, role, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                (username, password_hash, role, &ts),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
            conn.query_row(&sql, [username], user_from_row).optional()
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            conn.query_row(&sql, [id], user_from_row).optional()
        })
    }

    pub fn count_users_with_role(&self, role: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM users WHERE role = ?1", [role], |row| {
                row.get(0)
            })?;
            Ok(count)
        })
    }

    // -- Reports --

    /// Insert a report and read back the stored row.
    pub fn insert_report(&self, report: &NewReportRow<'_>) -> Result<ReportRow> {
        self.with_conn(|conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO reports
                    (location, description, category, image_url, reporter_id,
                     reporter_username, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                rusqlite::params![
                    report.location,
                    report.description,
                    report.category,
                    report.image_url,
                    report.reporter_id,
                    report.reporter_username,
                    report.status,
                    &ts,
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_report(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Report {} vanished after insert", id))
        })
    }

    pub fn get_report(&self, id: i64) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| query_report(conn, id))
    }

    /// All reports, newest first. Ties on the timestamp fall back to id.
    pub fn list_reports(&self) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {REPORT_COLUMNS} FROM reports ORDER BY created_at DESC, id DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], report_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the updated row, or `None` if no report has this id.
    pub fn set_report_status(&self, id: i64, status: &str) -> Result<Option<ReportRow>> {
        self.update_report_column(id, "status", status)
    }

    /// Returns the updated row, or `None` if no report has this id.
    pub fn set_report_category(&self, id: i64, category: &str) -> Result<Option<ReportRow>> {
        self.update_report_column(id, "category", category)
    }

    fn update_report_column(&self, id: i64, column: &str, value: &str) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            let sql = format!("UPDATE reports SET {column} = ?1, updated_at = ?2 WHERE id = ?3");
            let changed = conn.execute(&sql, rusqlite::params![value, now(), id])?;
            if changed == 0 {
                return Ok(None);
            }
            query_report(conn, id)
        })
    }
}

fn query_report(conn: &Connection, id: i64) -> Result<Option<ReportRow>> {
    let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1");
    conn.query_row(&sql, [id], report_from_row).optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        role: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        location: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        image_url: row.get(4)?,
        reporter_id: row.get(5)?,
        reporter_username: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

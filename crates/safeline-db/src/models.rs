/// Database row types — these map directly to SQLite rows.
/// Enum-like columns stay as strings here; the API layer parses them.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewReportRow<'a> {
    pub location: &'a str,
    pub description: &'a str,
    pub category: &'a str,
    pub image_url: Option<&'a str>,
    pub reporter_id: Option<i64>,
    pub reporter_username: &'a str,
    pub status: &'a str,
}

pub struct ReportRow {
    pub id: i64,
    pub location: String,
    pub description: String,
    pub category: String,
    pub image_url: Option<String>,
    pub reporter_id: Option<i64>,
    pub reporter_username: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

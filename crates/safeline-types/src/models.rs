use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Returned when a wire string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// -- Role --

/// Coarse authorization tag. Compared by exact match, there is no hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

// -- Category --

/// The closed set of report categories. Matching is exact and case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Stress")]
    Stress,
    #[serde(rename = "Depresi")]
    Depresi,
    #[serde(rename = "Gangguan Kecemasan")]
    GangguanKecemasan,
    #[serde(rename = "Defisit Atensi")]
    DefisitAtensi,
    #[serde(rename = "Trauma")]
    Trauma,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Stress,
        Category::Depresi,
        Category::GangguanKecemasan,
        Category::DefisitAtensi,
        Category::Trauma,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Stress => "Stress",
            Category::Depresi => "Depresi",
            Category::GangguanKecemasan => "Gangguan Kecemasan",
            Category::DefisitAtensi => "Defisit Atensi",
            Category::Trauma => "Trauma",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "category",
                value: s.to_string(),
            })
    }
}

// -- Report status --

/// One-way workflow: `Unhandled` -> `Handled`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportStatus {
    #[default]
    #[serde(rename = "BELUM DITANGANI")]
    Unhandled,
    #[serde(rename = "SUDAH DITANGANI")]
    Handled,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Unhandled => "BELUM DITANGANI",
            ReportStatus::Handled => "SUDAH DITANGANI",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BELUM DITANGANI" => Ok(ReportStatus::Unhandled),
            "SUDAH DITANGANI" => Ok(ReportStatus::Handled),
            other => Err(UnknownVariant {
                kind: "report status",
                value: other.to_string(),
            }),
        }
    }
}

// -- Records --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub location: String,
    pub description: String,
    pub category: Category,
    pub image_url: Option<String>,
    pub reporter_id: Option<i64>,
    /// Username captured when the report was filed; blank if the user was not found.
    pub reporter_username: String,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sentinel stored when no course was selected for an employee.
pub const COURSES_NOT_SPECIFIED: &str = "Not Specified";

/// Predefined course codes offered on the employee form.
pub const COURSE_CODES: [&str; 3] = ["MCA", "BCA", "BSC"];

/// A department record as persisted by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a department.
///
/// `created_at` is carried explicitly so the legacy import can preserve the
/// original creation timestamp; regular callers pass the current time.
#[derive(Debug, Clone)]
pub struct NewDepartment {
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An employee record as persisted by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub designation: String,
    pub gender: Gender,
    pub courses: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub department_id: Option<i64>,
    pub salary: Decimal,
    pub hire_date: NaiveDate,
    pub address: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Gender codes persisted in the database.
///
/// The legacy generation only knew `M`/`F`; the current one adds `O`, so the
/// superset is modelled here and legacy codes map through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    /// Returns the canonical database representation for the gender.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
            Self::Other => "O",
        }
    }

    /// Returns the human-readable label for the gender.
    pub fn label(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Other => "Other",
        }
    }
}

impl FromStr for Gender {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "M" => Ok(Self::Male),
            "F" => Ok(Self::Female),
            "O" => Ok(Self::Other),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Gender {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Gender {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Gender::from_str(&value).map_err(|_| D::Error::custom("unknown gender code"))
    }
}

/// Enumerated designation choices offered on the employee form.
///
/// A free-text override supplied by the caller takes precedence over these;
/// the stored `designation` field is therefore plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Designation {
    Hr,
    Manager,
    Sales,
}

impl Designation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hr => "HR",
            Self::Manager => "Manager",
            Self::Sales => "Sales",
        }
    }
}

impl FromStr for Designation {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "HR" => Ok(Self::Hr),
            "Manager" => Ok(Self::Manager),
            "Sales" => Ok(Self::Sales),
            _ => Err(()),
        }
    }
}

/// Maps a stored gender code to its display label.
///
/// Unknown codes yield an empty label rather than an error so templates can
/// render stale data without failing.
pub fn gender_label(code: &str) -> &'static str {
    code.parse::<Gender>().map(Gender::label).unwrap_or("")
}

/// Maps a stored course code to its display label, empty when unknown.
pub fn course_label(code: &str) -> &'static str {
    COURSE_CODES
        .iter()
        .find(|known| **known == code)
        .copied()
        .unwrap_or("")
}

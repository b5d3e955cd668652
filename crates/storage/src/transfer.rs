use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;
use tracing::{info, warn};

use staffdesk_core::types::{Gender, NewDepartment};

use crate::assets::{AssetError, ImageStore};
use crate::departments::DepartmentError;
use crate::employees::{EmployeeError, NewEmployee};
use crate::{Database, StorageError};

/// Read-only handle onto a legacy-generation store.
///
/// The legacy schema predates gateway-assigned employee ids: both tables use
/// store-assigned keys, gender only knows `M`/`F`, and the department foreign
/// key cascades. None of that survives the copy; the target store applies its
/// own id assignment and set-null policy.
#[derive(Clone)]
pub struct LegacyDatabase {
    pool: SqlitePool,
}

impl LegacyDatabase {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn departments(&self) -> Result<Vec<LegacyDepartment>, sqlx::Error> {
        sqlx::query_as::<_, LegacyDepartment>(
            "SELECT name, description, created_at FROM departments ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn employees(&self) -> Result<Vec<LegacyEmployee>, sqlx::Error> {
        sqlx::query_as::<_, LegacyEmployee>(
            "SELECT e.name, e.email, e.mobile, e.designation, e.gender, e.courses, \
                    e.image, d.name AS department_name, e.salary, e.hire_date, e.address \
             FROM employees AS e \
             LEFT JOIN departments AS d ON d.id = e.department_id \
             ORDER BY e.id",
        )
        .fetch_all(&self.pool)
        .await
    }
}

/// Outcome counters for one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub departments_copied: u64,
    pub departments_skipped: u64,
    pub employees_copied: u64,
    pub employees_skipped: u64,
    pub images_copied: u64,
    pub images_missing: u64,
}

/// One-shot, offline copy of a legacy store into the target store.
///
/// Departments are copied first so employee references can be re-resolved;
/// the resolution is by department *name*, so duplicate names in the source
/// collapse onto the first match in the target. The run is idempotent: a
/// department whose name, or an employee whose email, already exists in the
/// target is skipped, making a re-run after a partial failure safe. The copy
/// itself is not transactional; a mid-run failure leaves the records copied
/// so far in place.
pub async fn import_legacy(
    legacy: &LegacyDatabase,
    target: &Database,
    images: &ImageStore,
    legacy_media: Option<&Path>,
) -> Result<ImportReport, TransferError> {
    let mut report = ImportReport::default();
    let departments = target.departments();
    let employees = target.employees();

    for old in legacy.departments().await? {
        if departments.find_by_name(&old.name).await?.is_some() {
            report.departments_skipped += 1;
            continue;
        }
        departments
            .insert(&NewDepartment {
                name: old.name,
                description: old.description,
                created_at: old.created_at,
            })
            .await?;
        report.departments_copied += 1;
    }

    for old in legacy.employees().await? {
        if employees.find_by_email(&old.email).await?.is_some() {
            report.employees_skipped += 1;
            continue;
        }

        let department_id = match &old.department_name {
            Some(name) => {
                let resolved = departments.find_by_name(name).await?.map(|dept| dept.id);
                if resolved.is_none() {
                    warn!(email = %old.email, department = %name, "department missing in target, reference cleared");
                }
                resolved
            }
            None => None,
        };

        let gender = match Gender::from_str(&old.gender) {
            Ok(gender) => gender,
            Err(()) => {
                warn!(email = %old.email, code = %old.gender, "unknown gender code, mapped to Other");
                Gender::Other
            }
        };

        let record = NewEmployee {
            name: &old.name,
            email: &old.email,
            mobile: &old.mobile,
            designation: &old.designation,
            gender,
            courses: &old.courses,
            image: None,
            department_id,
            salary: Decimal::from_str(&old.salary).unwrap_or_default(),
            hire_date: old.hire_date,
            address: &old.address,
            created_at: Utc::now(),
        };
        let new_id = match employees.insert(&record).await {
            Ok(id) => id,
            Err(EmployeeError::DuplicateEmail) => {
                report.employees_skipped += 1;
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        report.employees_copied += 1;

        if let Some(old_path) = &old.image {
            match read_legacy_image(legacy_media, old_path).await {
                Some(bytes) => {
                    let stored = images.save(new_id, old_path, &bytes).await?;
                    employees.set_image(new_id, Some(&stored)).await?;
                    report.images_copied += 1;
                }
                None => {
                    warn!(email = %old.email, path = %old_path, "legacy image missing, skipped");
                    report.images_missing += 1;
                }
            }
        }
    }

    info!(
        departments_copied = report.departments_copied,
        departments_skipped = report.departments_skipped,
        employees_copied = report.employees_copied,
        employees_skipped = report.employees_skipped,
        images_copied = report.images_copied,
        images_missing = report.images_missing,
        "legacy import finished"
    );

    Ok(report)
}

async fn read_legacy_image(media_root: Option<&Path>, relative: &str) -> Option<Vec<u8>> {
    let root = media_root?;
    tokio::fs::read(root.join(relative)).await.ok()
}

#[derive(Debug, sqlx::FromRow)]
struct LegacyDepartment {
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LegacyEmployee {
    name: String,
    email: String,
    mobile: String,
    designation: String,
    gender: String,
    courses: String,
    image: Option<String>,
    department_name: Option<String>,
    salary: String,
    hire_date: NaiveDate,
    address: String,
}

/// Errors that can abort a legacy import.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("department error during import: {0}")]
    Department(#[from] DepartmentError),
    #[error("employee error during import: {0}")]
    Employee(#[from] EmployeeError),
    #[error("asset error during import: {0}")]
    Asset(#[from] AssetError),
    #[error("legacy database error: {0}")]
    Database(#[from] sqlx::Error),
}

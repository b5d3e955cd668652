use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use thiserror::Error;

use staffdesk_core::types::{Employee, Gender};
use staffdesk_core::validation::EmployeeDraft;

use crate::to_rfc3339;

const EMPLOYEE_COLUMNS: &str = "id, name, email, mobile, designation, gender, courses, image, \
     department_id, salary, hire_date, address, is_active, created_at";

/// Repository for employee records.
#[derive(Clone)]
pub struct EmployeeRepository {
    pub(crate) pool: SqlitePool,
}

impl EmployeeRepository {
    /// Inserts a new employee, assigning the next surrogate id.
    ///
    /// The id is computed as max existing + 1 inside the INSERT itself, so the
    /// read and the write happen in one statement under SQLite's writer lock
    /// and concurrent creates can never observe the same maximum.
    pub async fn insert(&self, record: &NewEmployee<'_>) -> Result<i64, EmployeeError> {
        let result = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO employees \
             (id, name, email, mobile, designation, gender, courses, image, \
              department_id, salary, hire_date, address, is_active, created_at) \
             SELECT COALESCE(MAX(id), 0) + 1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ? \
             FROM employees \
             RETURNING id",
        )
        .bind(record.name)
        .bind(record.email)
        .bind(record.mobile)
        .bind(record.designation)
        .bind(record.gender.as_str())
        .bind(record.courses)
        .bind(&record.image)
        .bind(record.department_id)
        .bind(record.salary.to_string())
        .bind(record.hire_date)
        .bind(record.address)
        .bind(to_rfc3339(record.created_at))
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok((id,)) => Ok(id),
            Err(err) => Err(map_constraint(err)),
        }
    }

    /// Replaces the editable fields of an employee. Identifier, soft-delete
    /// flag, and creation timestamp are untouched.
    pub async fn update(&self, id: i64, changes: &EmployeeChanges<'_>) -> Result<(), EmployeeError> {
        let result = sqlx::query(
            "UPDATE employees SET \
             name = ?, email = ?, mobile = ?, designation = ?, gender = ?, \
             courses = ?, image = ?, department_id = ?, salary = ?, \
             hire_date = ?, address = ? \
             WHERE id = ?",
        )
        .bind(changes.name)
        .bind(changes.email)
        .bind(changes.mobile)
        .bind(changes.designation)
        .bind(changes.gender.as_str())
        .bind(changes.courses)
        .bind(&changes.image)
        .bind(changes.department_id)
        .bind(changes.salary.to_string())
        .bind(changes.hire_date)
        .bind(changes.address)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_constraint)?;

        if result.rows_affected() == 0 {
            return Err(EmployeeError::NotFound);
        }
        Ok(())
    }

    /// Hard-deletes an employee, returning the stored image path (if any) so
    /// the caller can remove the asset file.
    pub async fn delete(&self, id: i64) -> Result<Option<String>, EmployeeError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("DELETE FROM employees WHERE id = ? RETURNING image")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((image,)) => Ok(image),
            None => Err(EmployeeError::NotFound),
        }
    }

    /// Soft-deletes an employee by clearing the active flag; the record stays.
    pub async fn deactivate(&self, id: i64) -> Result<(), EmployeeError> {
        let result = sqlx::query("UPDATE employees SET is_active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EmployeeError::NotFound);
        }
        Ok(())
    }

    /// Updates only the stored image path, used after an asset write.
    pub async fn set_image(&self, id: i64, image: Option<&str>) -> Result<(), EmployeeError> {
        let result = sqlx::query("UPDATE employees SET image = ? WHERE id = ?")
            .bind(image)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EmployeeError::NotFound);
        }
        Ok(())
    }

    /// Fetches an employee by id.
    pub async fn get(&self, id: i64) -> Result<Employee, EmployeeError> {
        let row = sqlx::query_as::<_, EmployeeRow>(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(EmployeeError::NotFound)?;

        Ok(row.into_domain())
    }

    /// Looks an employee up by email, used for uniqueness checks and lookups.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Employee>, EmployeeError> {
        let row = sqlx::query_as::<_, EmployeeRow>(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EmployeeRow::into_domain))
    }

    /// Returns whether the email is already registered. The update path passes
    /// the record under edit so its own email does not count as a conflict.
    pub async fn email_taken(
        &self,
        email: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, EmployeeError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM employees WHERE email = ?1 AND (?2 IS NULL OR id <> ?2))",
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 != 0)
    }

    /// Lists employees, newest hire first. A query applies a case-insensitive
    /// substring match across name, email, mobile, designation, and courses,
    /// combined with OR.
    pub async fn search(&self, query: Option<&str>) -> Result<Vec<Employee>, EmployeeError> {
        let pattern = query.map(like_pattern);
        let rows = sqlx::query_as::<_, EmployeeRow>(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees \
             WHERE ?1 IS NULL \
                OR lower(name) LIKE ?2 ESCAPE '\\' \
                OR lower(email) LIKE ?2 ESCAPE '\\' \
                OR lower(mobile) LIKE ?2 ESCAPE '\\' \
                OR lower(designation) LIKE ?2 ESCAPE '\\' \
                OR lower(courses) LIKE ?2 ESCAPE '\\' \
             ORDER BY hire_date DESC, id DESC"
        ))
        .bind(query)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EmployeeRow::into_domain).collect())
    }

    /// Counts employees whose soft-delete flag is still set.
    pub async fn count_active(&self) -> Result<i64, EmployeeError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM employees WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Computes the average salary of active employees with exact decimal
    /// arithmetic, `None` when there are no active employees.
    pub async fn average_salary(&self) -> Result<Option<Decimal>, EmployeeError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT salary FROM employees WHERE is_active = 1")
                .fetch_all(&self.pool)
                .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let count = Decimal::from(rows.len() as i64);
        let sum: Decimal = rows
            .iter()
            .map(|(text,)| Decimal::from_str(text).unwrap_or_default())
            .sum();
        let mut average = sum / count;
        average.rescale(2);
        Ok(Some(average))
    }
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped.to_lowercase())
}

fn map_constraint(err: sqlx::Error) -> EmployeeError {
    match err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                if code == Cow::Borrowed("2067") {
                    return EmployeeError::DuplicateEmail;
                }
                if code == Cow::Borrowed("787") {
                    return EmployeeError::MissingDepartment;
                }
            }
            EmployeeError::Database(sqlx::Error::Database(db_err))
        }
        other => EmployeeError::Database(other),
    }
}

/// Data required to create a new employee record.
#[derive(Debug, Clone)]
pub struct NewEmployee<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub mobile: &'a str,
    pub designation: &'a str,
    pub gender: Gender,
    pub courses: &'a str,
    pub image: Option<String>,
    pub department_id: Option<i64>,
    pub salary: Decimal,
    pub hire_date: NaiveDate,
    pub address: &'a str,
    pub created_at: DateTime<Utc>,
}

impl<'a> NewEmployee<'a> {
    /// Builds the insert payload from a validated draft.
    pub fn from_draft(draft: &'a EmployeeDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            name: &draft.name,
            email: &draft.email,
            mobile: &draft.mobile,
            designation: &draft.designation,
            gender: draft.gender,
            courses: &draft.courses,
            image: None,
            department_id: Some(draft.department_id),
            salary: draft.salary,
            hire_date: draft.hire_date,
            address: &draft.address,
            created_at,
        }
    }
}

/// Full replacement of the editable employee fields for the update path.
#[derive(Debug, Clone)]
pub struct EmployeeChanges<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub mobile: &'a str,
    pub designation: &'a str,
    pub gender: Gender,
    pub courses: &'a str,
    pub image: Option<String>,
    pub department_id: Option<i64>,
    pub salary: Decimal,
    pub hire_date: NaiveDate,
    pub address: &'a str,
}

impl<'a> EmployeeChanges<'a> {
    /// Builds the update payload from a validated draft, carrying forward the
    /// image path the handler decided on.
    pub fn from_draft(draft: &'a EmployeeDraft, image: Option<String>) -> Self {
        Self {
            name: &draft.name,
            email: &draft.email,
            mobile: &draft.mobile,
            designation: &draft.designation,
            gender: draft.gender,
            courses: &draft.courses,
            image,
            department_id: Some(draft.department_id),
            salary: draft.salary,
            hire_date: draft.hire_date,
            address: &draft.address,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EmployeeRow {
    id: i64,
    name: String,
    email: String,
    mobile: String,
    designation: String,
    gender: String,
    courses: String,
    image: Option<String>,
    department_id: Option<i64>,
    salary: String,
    hire_date: NaiveDate,
    address: String,
    is_active: i64,
    created_at: DateTime<Utc>,
}

impl EmployeeRow {
    /// Converts the database row into the domain record.
    fn into_domain(self) -> Employee {
        let gender = self.gender.parse().unwrap_or(Gender::Other);
        Employee {
            id: self.id,
            name: self.name,
            email: self.email,
            mobile: self.mobile,
            designation: self.designation,
            gender,
            courses: self.courses,
            image: self.image,
            department_id: self.department_id,
            salary: Decimal::from_str(&self.salary).unwrap_or_default(),
            hire_date: self.hire_date,
            address: self.address,
            is_active: self.is_active != 0,
            created_at: self.created_at,
        }
    }
}

/// Errors that can occur while operating on employee records.
#[derive(Debug, Error)]
pub enum EmployeeError {
    #[error("an employee with this email already exists")]
    DuplicateEmail,
    #[error("referenced department does not exist")]
    MissingDepartment,
    #[error("employee not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for EmployeeError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

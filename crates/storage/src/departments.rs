use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use staffdesk_core::types::{Department, NewDepartment};

use crate::to_rfc3339;

/// Repository for department records.
#[derive(Clone)]
pub struct DepartmentRepository {
    pub(crate) pool: SqlitePool,
}

impl DepartmentRepository {
    /// Inserts a new department, returning the store-assigned identifier.
    pub async fn insert(&self, record: &NewDepartment) -> Result<i64, DepartmentError> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO departments (name, description, created_at) \
             VALUES (?, ?, ?) \
             RETURNING id",
        )
        .bind(&record.name)
        .bind(&record.description)
        .bind(to_rfc3339(record.created_at))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Replaces the editable fields of a department. Identifier and creation
    /// timestamp are immutable.
    pub async fn update(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<(), DepartmentError> {
        let result = sqlx::query("UPDATE departments SET name = ?, description = ? WHERE id = ?")
            .bind(name)
            .bind(description)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DepartmentError::NotFound);
        }
        Ok(())
    }

    /// Deletes a department. Referencing employees keep their rows and have
    /// their department reference cleared by the `ON DELETE SET NULL` schema
    /// action, never cascaded.
    pub async fn delete(&self, id: i64) -> Result<(), DepartmentError> {
        let result = sqlx::query("DELETE FROM departments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DepartmentError::NotFound);
        }
        Ok(())
    }

    /// Fetches a department by id.
    pub async fn get(&self, id: i64) -> Result<Department, DepartmentError> {
        let row = sqlx::query_as::<_, DepartmentRow>(
            "SELECT id, name, description, created_at FROM departments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DepartmentError::NotFound)?;

        Ok(row.into_domain())
    }

    /// Looks a department up by exact name; the lowest id wins when names
    /// duplicate.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Department>, DepartmentError> {
        let row = sqlx::query_as::<_, DepartmentRow>(
            "SELECT id, name, description, created_at FROM departments \
             WHERE name = ? ORDER BY id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DepartmentRow::into_domain))
    }

    /// Lists all departments ordered by name.
    pub async fn list(&self) -> Result<Vec<Department>, DepartmentError> {
        let rows = sqlx::query_as::<_, DepartmentRow>(
            "SELECT id, name, description, created_at FROM departments ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DepartmentRow::into_domain).collect())
    }

    /// Counts all departments, used by the dashboard.
    pub async fn count(&self) -> Result<i64, DepartmentError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM departments")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DepartmentRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl DepartmentRow {
    fn into_domain(self) -> Department {
        Department {
            id: self.id,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
        }
    }
}

/// Errors that can occur while operating on department records.
#[derive(Debug, Error)]
pub enum DepartmentError {
    #[error("department not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use metrics::counter;

use staffdesk_core::types::{Department, NewDepartment};
use staffdesk_core::validation::{validate_department, DepartmentInput};
use staffdesk_storage::DepartmentError;

use crate::problem::ProblemResponse;
use crate::router::AppState;

pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<Department>>, ProblemResponse> {
    let departments = state
        .storage()
        .departments()
        .list()
        .await
        .map_err(ProblemResponse::internal)?;
    Ok(Json(departments))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<DepartmentInput>,
) -> Result<(StatusCode, Json<Department>), ProblemResponse> {
    let draft = validate_department(&input).map_err(|errors| {
        counter!("validation_failures_total", "entity" => "department").increment(1);
        ProblemResponse::validation(errors)
    })?;

    let record = NewDepartment {
        name: draft.name,
        description: draft.description,
        created_at: state.now(),
    };
    let id = state
        .storage()
        .departments()
        .insert(&record)
        .await
        .map_err(department_problem)?;

    counter!("department_writes_total", "op" => "create").increment(1);
    let department = state
        .storage()
        .departments()
        .get(id)
        .await
        .map_err(department_problem)?;
    Ok((StatusCode::CREATED, Json(department)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<DepartmentInput>,
) -> Result<Json<Department>, ProblemResponse> {
    let draft = validate_department(&input).map_err(|errors| {
        counter!("validation_failures_total", "entity" => "department").increment(1);
        ProblemResponse::validation(errors)
    })?;

    state
        .storage()
        .departments()
        .update(id, &draft.name, draft.description.as_deref())
        .await
        .map_err(department_problem)?;

    counter!("department_writes_total", "op" => "update").increment(1);
    let department = state
        .storage()
        .departments()
        .get(id)
        .await
        .map_err(department_problem)?;
    Ok(Json(department))
}

/// Deletes a department. Employees that referenced it keep their rows; the
/// foreign key clears their department link on delete.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ProblemResponse> {
    state
        .storage()
        .departments()
        .delete(id)
        .await
        .map_err(department_problem)?;
    counter!("department_writes_total", "op" => "delete").increment(1);
    Ok(StatusCode::NO_CONTENT)
}

fn department_problem(err: DepartmentError) -> ProblemResponse {
    match err {
        DepartmentError::NotFound => ProblemResponse::not_found("department not found"),
        other => ProblemResponse::internal(other),
    }
}

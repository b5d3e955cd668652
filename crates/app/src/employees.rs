use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use metrics::counter;
use serde::{Deserialize, Serialize};

use staffdesk_core::types::Employee;
use staffdesk_core::validation::{validate_employee, EmployeeDraft, EmployeeInput, FieldErrors};
use staffdesk_storage::{AssetError, DepartmentError, EmployeeChanges, EmployeeError, NewEmployee};

use crate::problem::ProblemResponse;
use crate::router::AppState;

const MSG_EMAIL_TAKEN: &str = "This email is already registered.";
const MSG_DEPARTMENT_MISSING: &str = "Department not found.";

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    search: Option<String>,
}

/// Lists employees, newest hire first, optionally filtered by the
/// multi-field substring search.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Employee>>, ProblemResponse> {
    let trimmed = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let filtered = if trimmed.is_some() { "yes" } else { "no" };
    counter!("employee_search_total", "filtered" => filtered).increment(1);

    let employees = state
        .storage()
        .employees()
        .search(trimmed)
        .await
        .map_err(ProblemResponse::internal)?;
    Ok(Json(employees))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Employee>, ProblemResponse> {
    let employee = state
        .storage()
        .employees()
        .get(id)
        .await
        .map_err(employee_problem)?;
    Ok(Json(employee))
}

/// Creates an employee from a multipart form submission.
///
/// The record is written first, then the uploaded image; an asset failure
/// rolls the record back with a compensating delete so no half-created
/// employee survives.
pub async fn create(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Employee>), ProblemResponse> {
    let form = collect_form(multipart).await?;
    let draft = validate_submission(&state, &form.input, None).await?;

    let record = NewEmployee::from_draft(&draft, state.now());
    let id = state
        .storage()
        .employees()
        .insert(&record)
        .await
        .map_err(employee_problem)?;

    if let Some(upload) = form.upload {
        if let Err(err) = store_image(&state, id, &upload, None).await {
            if let Err(cleanup) = state.storage().employees().delete(id).await {
                tracing::error!(error = %cleanup, id, "failed to roll back employee after asset error");
            }
            return Err(err);
        }
    }

    counter!("employee_writes_total", "op" => "create").increment(1);
    let employee = state
        .storage()
        .employees()
        .get(id)
        .await
        .map_err(employee_problem)?;
    Ok((StatusCode::CREATED, Json(employee)))
}

/// Replaces the editable fields of an employee.
///
/// The uniqueness check passes the record under edit so keeping its own email
/// is never a conflict. A fresh upload replaces the stored image; otherwise
/// the existing path is carried forward.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<Employee>, ProblemResponse> {
    let existing = state
        .storage()
        .employees()
        .get(id)
        .await
        .map_err(employee_problem)?;

    let form = collect_form(multipart).await?;
    let draft = validate_submission(&state, &form.input, Some(id)).await?;

    let changes = EmployeeChanges::from_draft(&draft, existing.image.clone());
    state
        .storage()
        .employees()
        .update(id, &changes)
        .await
        .map_err(employee_problem)?;

    if let Some(upload) = form.upload {
        store_image(&state, id, &upload, existing.image.as_deref()).await?;
    }

    counter!("employee_writes_total", "op" => "update").increment(1);
    let employee = state
        .storage()
        .employees()
        .get(id)
        .await
        .map_err(employee_problem)?;
    Ok(Json(employee))
}

/// Removes an employee according to the configured policy: hard delete drops
/// the row and its image asset, soft delete clears the active flag.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ProblemResponse> {
    if state.delete_policy().is_soft() {
        state
            .storage()
            .employees()
            .deactivate(id)
            .await
            .map_err(employee_problem)?;
        counter!("employee_writes_total", "op" => "deactivate").increment(1);
    } else {
        let image = state
            .storage()
            .employees()
            .delete(id)
            .await
            .map_err(employee_problem)?;
        if let Some(path) = image {
            match state.images().delete(&path).await {
                Ok(()) | Err(AssetError::NotFound) => {}
                Err(err) => {
                    tracing::warn!(error = %err, path = %path, "failed to delete employee image")
                }
            }
        }
        counter!("employee_writes_total", "op" => "delete").increment(1);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CheckEmailQuery {
    email: String,
    #[serde(default)]
    exclude: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CheckEmailResponse {
    exists: bool,
}

/// Live-feedback endpoint: reports whether an email is already registered.
pub async fn check_email(
    State(state): State<AppState>,
    Query(query): Query<CheckEmailQuery>,
) -> Result<Json<CheckEmailResponse>, ProblemResponse> {
    let exists = state
        .storage()
        .employees()
        .email_taken(query.email.trim(), query.exclude)
        .await
        .map_err(ProblemResponse::internal)?;
    Ok(Json(CheckEmailResponse { exists }))
}

/// An uploaded image: original filename plus raw bytes.
struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct EmployeeForm {
    input: EmployeeInput,
    upload: Option<Upload>,
}

async fn collect_form(mut multipart: Multipart) -> Result<EmployeeForm, ProblemResponse> {
    let mut form = EmployeeForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "image" {
            let filename = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(bad_multipart)?;
            if let Some(filename) = filename {
                if !bytes.is_empty() {
                    form.input.image_filename = Some(filename.clone());
                    form.upload = Some(Upload {
                        filename,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            continue;
        }

        let value = field.text().await.map_err(bad_multipart)?;
        match name.as_str() {
            "name" => form.input.name = value,
            "email" => form.input.email = value,
            "mobile" => form.input.mobile = value,
            "designation" => form.input.designation = value,
            "custom_designation" => form.input.custom_designation = Some(value),
            "gender" => form.input.gender = value,
            "courses" => form.input.courses.push(value),
            "custom_course" => form.input.custom_course = Some(value),
            "department" => form.input.department_id = value,
            "salary" => form.input.salary = value,
            "hire_date" => form.input.hire_date = value,
            "address" => form.input.address = value,
            _ => {}
        }
    }

    Ok(form)
}

/// Runs syntactic validation plus the cross-record checks, aggregating every
/// failure into one field-error set.
///
/// Each cross-record check only runs when its own field passed syntactically,
/// so a single round trip reports conflicts alongside syntax errors without
/// querying on garbage input.
async fn validate_submission(
    state: &AppState,
    input: &EmployeeInput,
    current_id: Option<i64>,
) -> Result<EmployeeDraft, ProblemResponse> {
    let (draft, mut errors) = match validate_employee(input) {
        Ok(draft) => (Some(draft), FieldErrors::new()),
        Err(errors) => (None, errors),
    };

    if errors.field("email").is_empty() {
        let taken = state
            .storage()
            .employees()
            .email_taken(input.email.trim(), current_id)
            .await
            .map_err(ProblemResponse::internal)?;
        if taken {
            errors.push("email", MSG_EMAIL_TAKEN);
        }
    }

    if errors.field("department").is_empty() {
        if let Ok(id) = input.department_id.trim().parse::<i64>() {
            match state.storage().departments().get(id).await {
                Ok(_) => {}
                Err(DepartmentError::NotFound) => errors.push("department", MSG_DEPARTMENT_MISSING),
                Err(err) => return Err(ProblemResponse::internal(err)),
            }
        }
    }

    match draft {
        Some(draft) if errors.is_empty() => Ok(draft),
        _ => {
            counter!("validation_failures_total", "entity" => "employee").increment(1);
            Err(ProblemResponse::validation(errors))
        }
    }
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> ProblemResponse {
    ProblemResponse::new(
        StatusCode::BAD_REQUEST,
        "invalid_multipart",
        format!("malformed multipart body: {err}"),
    )
}

fn employee_problem(err: EmployeeError) -> ProblemResponse {
    match err {
        EmployeeError::NotFound => ProblemResponse::not_found("employee not found"),
        EmployeeError::DuplicateEmail => {
            ProblemResponse::new(StatusCode::CONFLICT, "duplicate_email", MSG_EMAIL_TAKEN)
        }
        EmployeeError::MissingDepartment => {
            let mut errors = FieldErrors::new();
            errors.push("department", MSG_DEPARTMENT_MISSING);
            ProblemResponse::validation(errors)
        }
        other => ProblemResponse::internal(other),
    }
}

async fn store_image(
    state: &AppState,
    id: i64,
    upload: &Upload,
    previous: Option<&str>,
) -> Result<(), ProblemResponse> {
    let path = state
        .images()
        .save(id, &upload.filename, &upload.bytes)
        .await
        .map_err(ProblemResponse::internal)?;
    state
        .storage()
        .employees()
        .set_image(id, Some(&path))
        .await
        .map_err(employee_problem)?;

    if let Some(old) = previous {
        match state.images().delete(old).await {
            Ok(()) | Err(AssetError::NotFound) => {}
            Err(err) => tracing::warn!(error = %err, path = old, "failed to delete replaced image"),
        }
    }
    Ok(())
}

use axum::extract::State;
use axum::Json;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::problem::ProblemResponse;
use crate::router::AppState;

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub total_employees: i64,
    pub total_departments: i64,
    /// Mean salary across active employees, absent when there are none.
    pub average_salary: Option<Decimal>,
}

/// Headline counts for the landing page.
pub async fn summary(
    State(state): State<AppState>,
) -> Result<Json<DashboardSummary>, ProblemResponse> {
    let total_employees = state
        .storage()
        .employees()
        .count_active()
        .await
        .map_err(ProblemResponse::internal)?;
    let total_departments = state
        .storage()
        .departments()
        .count()
        .await
        .map_err(ProblemResponse::internal)?;
    let average_salary = state
        .storage()
        .employees()
        .average_salary()
        .await
        .map_err(ProblemResponse::internal)?;

    Ok(Json(DashboardSummary {
        total_employees,
        total_departments,
        average_salary,
    }))
}

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use staffdesk_storage::{Database, ImageStore};
use staffdesk_util::DeletePolicy;

use crate::{dashboard, departments, employees, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    images: ImageStore,
    delete_policy: DeletePolicy,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        images: ImageStore,
        delete_policy: DeletePolicy,
    ) -> Self {
        Self {
            metrics,
            storage,
            images,
            delete_policy,
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/dashboard", get(dashboard::summary))
        .route(
            "/api/employees",
            get(employees::list).post(employees::create),
        )
        .route("/api/employees/check-email", get(employees::check_email))
        .route(
            "/api/employees/:id",
            get(employees::get_one)
                .put(employees::update)
                .delete(employees::remove),
        )
        .route(
            "/api/departments",
            get(departments::list).post(departments::create),
        )
        .route(
            "/api/departments/:id",
            axum::routing::put(departments::update).delete(departments::remove),
        )
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    static NEXT_DB: AtomicU32 = AtomicU32::new(0);

    const BOUNDARY: &str = "staffdesk-test-boundary";

    async fn setup_state(policy: DeletePolicy) -> (AppState, TempDir) {
        let metrics = telemetry::init_metrics().expect("metrics init");

        let id = NEXT_DB.fetch_add(1, Ordering::Relaxed);
        let url = format!("sqlite:file:staffdesk-router-{id}?mode=memory&cache=shared");
        let database = Database::connect(&url).await.expect("connect");
        database.run_migrations().await.expect("migrations");

        let media = TempDir::new().expect("tempdir");
        let images = ImageStore::new(media.path());

        (AppState::new(metrics, database, images, policy), media)
    }

    fn form_body(fields: &[(&str, &str)]) -> Body {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Body::from(body)
    }

    fn form_request(method: &str, uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(form_body(fields))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should read")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn create_department(app: &Router, name: &str) -> i64 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/departments",
                json!({ "name": name, "description": null }),
            ))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json(response).await["id"].as_i64().expect("id")
    }

    fn employee_fields(email: &str, department: &str) -> Vec<(&'static str, String)> {
        vec![
            ("name", "Asha Rao".to_string()),
            ("email", email.to_string()),
            ("mobile", "9876543210".to_string()),
            ("designation", "HR".to_string()),
            ("gender", "F".to_string()),
            ("courses", "MCA".to_string()),
            ("department", department.to_string()),
            ("salary", "52000".to_string()),
            ("hire_date", "2023-04-01".to_string()),
            ("address", "14 Lake View Road".to_string()),
        ]
    }

    async fn create_employee(app: &Router, email: &str, department_id: i64) -> Value {
        let fields = employee_fields(email, &department_id.to_string());
        let borrowed: Vec<(&str, &str)> = fields
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        let response = app
            .clone()
            .oneshot(form_request("POST", "/api/employees", &borrowed))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json(response).await
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);

        let response = app
            .oneshot(get_request("/healthz"))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_exports_build_info() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);

        let response = app
            .oneshot(get_request("/metrics"))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let collected = response
            .into_body()
            .collect()
            .await
            .expect("body should read");
        let body = String::from_utf8(collected.to_bytes().to_vec()).expect("utf-8");
        assert!(body.contains("app_build_info"));
        assert!(body.contains("app_uptime_seconds"));
    }

    #[tokio::test]
    async fn create_employee_persists_valid_form() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);
        let department_id = create_department(&app, "Engineering").await;

        let employee = create_employee(&app, "asha@example.com", department_id).await;

        assert_eq!(employee["id"], json!(1));
        assert_eq!(employee["name"], json!("Asha Rao"));
        assert_eq!(employee["email"], json!("asha@example.com"));
        assert_eq!(employee["gender"], json!("F"));
        assert_eq!(employee["courses"], json!("MCA"));
        assert_eq!(employee["department_id"], json!(department_id));
        assert_eq!(employee["salary"], json!("52000.00"));
        assert_eq!(employee["is_active"], json!(true));
    }

    #[tokio::test]
    async fn invalid_form_reports_every_field_at_once() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);

        let response = app
            .oneshot(form_request(
                "POST",
                "/api/employees",
                &[
                    ("name", ""),
                    ("email", "not-an-email"),
                    ("mobile", "12a45"),
                    ("designation", "HR"),
                    ("gender", "F"),
                    ("department", "1"),
                    ("salary", "52000"),
                    ("hire_date", "2023-04-01"),
                    ("address", "somewhere"),
                ],
            ))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let problem = read_json(response).await;
        assert_eq!(problem["type"], json!("validation_failed"));
        let errors = &problem["errors"];
        assert_eq!(errors["name"], json!(["This field is required."]));
        assert_eq!(errors["email"], json!(["Enter a valid email address."]));
        assert_eq!(
            errors["mobile"],
            json!([
                "Please enter only digits",
                "Mobile number must be exactly 10 digits"
            ])
        );
    }

    #[tokio::test]
    async fn duplicate_email_surfaces_as_field_error() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);
        let department_id = create_department(&app, "Sales").await;
        create_employee(&app, "dup@example.com", department_id).await;

        let fields = employee_fields("dup@example.com", &department_id.to_string());
        let borrowed: Vec<(&str, &str)> = fields
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        let response = app
            .oneshot(form_request("POST", "/api/employees", &borrowed))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let problem = read_json(response).await;
        assert_eq!(
            problem["errors"]["email"],
            json!(["This email is already registered."])
        );
    }

    #[tokio::test]
    async fn unknown_department_surfaces_as_field_error() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);

        let fields = employee_fields("lone@example.com", "999");
        let borrowed: Vec<(&str, &str)> = fields
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        let response = app
            .oneshot(form_request("POST", "/api/employees", &borrowed))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let problem = read_json(response).await;
        assert_eq!(
            problem["errors"]["department"],
            json!(["Department not found."])
        );
    }

    #[tokio::test]
    async fn update_keeps_own_email_without_conflict() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);
        let department_id = create_department(&app, "Support").await;
        let employee = create_employee(&app, "keep@example.com", department_id).await;
        let id = employee["id"].as_i64().expect("id");

        let mut fields = employee_fields("keep@example.com", &department_id.to_string());
        for (name, value) in &mut fields {
            if *name == "salary" {
                *value = "61000".to_string();
            }
        }
        let borrowed: Vec<(&str, &str)> = fields
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        let response = app
            .clone()
            .oneshot(form_request(
                "PUT",
                &format!("/api/employees/{id}"),
                &borrowed,
            ))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let updated = read_json(response).await;
        assert_eq!(updated["salary"], json!("61000.00"));
        assert_eq!(updated["email"], json!("keep@example.com"));
    }

    #[tokio::test]
    async fn check_email_reports_existing_addresses() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);
        let department_id = create_department(&app, "Finance").await;
        let employee = create_employee(&app, "taken@example.com", department_id).await;
        let id = employee["id"].as_i64().expect("id");

        let response = app
            .clone()
            .oneshot(get_request(
                "/api/employees/check-email?email=taken%40example.com",
            ))
            .await
            .expect("handler should respond");
        assert_eq!(read_json(response).await, json!({ "exists": true }));

        let response = app
            .clone()
            .oneshot(get_request(
                "/api/employees/check-email?email=free%40example.com",
            ))
            .await
            .expect("handler should respond");
        assert_eq!(read_json(response).await, json!({ "exists": false }));

        let uri = format!("/api/employees/check-email?email=taken%40example.com&exclude={id}");
        let response = app
            .oneshot(get_request(&uri))
            .await
            .expect("handler should respond");
        assert_eq!(read_json(response).await, json!({ "exists": false }));
    }

    #[tokio::test]
    async fn deleting_department_clears_employee_links() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);
        let department_id = create_department(&app, "Research").await;
        let employee = create_employee(&app, "linked@example.com", department_id).await;
        let id = employee["id"].as_i64().expect("id");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/departments/{department_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get_request(&format!("/api/employees/{id}")))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = read_json(response).await;
        assert_eq!(fetched["department_id"], json!(null));
    }

    #[tokio::test]
    async fn soft_delete_policy_keeps_the_record() {
        let (state, _media) = setup_state(DeletePolicy::Soft).await;
        let app = app_router(state);
        let department_id = create_department(&app, "Archive").await;
        let employee = create_employee(&app, "soft@example.com", department_id).await;
        let id = employee["id"].as_i64().expect("id");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/employees/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get_request(&format!("/api/employees/{id}")))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = read_json(response).await;
        assert_eq!(fetched["is_active"], json!(false));
    }

    #[tokio::test]
    async fn hard_delete_removes_the_record() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);
        let department_id = create_department(&app, "Temp").await;
        let employee = create_employee(&app, "gone@example.com", department_id).await;
        let id = employee["id"].as_i64().expect("id");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/employees/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(get_request(&format!("/api/employees/{id}")))
            .await
            .expect("handler should respond");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn search_filters_the_listing() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);
        let department_id = create_department(&app, "Mixed").await;
        create_employee(&app, "asha@example.com", department_id).await;

        let response = app
            .clone()
            .oneshot(get_request("/api/employees?search=asha"))
            .await
            .expect("handler should respond");
        let listing = read_json(response).await;
        assert_eq!(listing.as_array().map(Vec::len), Some(1));

        let response = app
            .oneshot(get_request("/api/employees?search=zzz"))
            .await
            .expect("handler should respond");
        let listing = read_json(response).await;
        assert_eq!(listing.as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn dashboard_reports_counts_and_average() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);

        let response = app
            .clone()
            .oneshot(get_request("/api/dashboard"))
            .await
            .expect("handler should respond");
        let summary = read_json(response).await;
        assert_eq!(summary["total_employees"], json!(0));
        assert_eq!(summary["total_departments"], json!(0));
        assert_eq!(summary["average_salary"], json!(null));

        let department_id = create_department(&app, "Ops").await;
        create_employee(&app, "one@example.com", department_id).await;

        let response = app
            .oneshot(get_request("/api/dashboard"))
            .await
            .expect("handler should respond");
        let summary = read_json(response).await;
        assert_eq!(summary["total_employees"], json!(1));
        assert_eq!(summary["total_departments"], json!(1));
        assert_eq!(summary["average_salary"], json!("52000.00"));
    }

    #[tokio::test]
    async fn created_at_comes_from_the_injected_clock() {
        use chrono::TimeZone;

        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let fixed = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let app = app_router(state.with_clock(Arc::new(move || fixed)));
        let department_id = create_department(&app, "Clockwork").await;

        let employee = create_employee(&app, "clock@example.com", department_id).await;
        assert_eq!(employee["created_at"], json!("2024-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn department_validation_rejects_blank_name() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/departments",
                json!({ "name": "   ", "description": "whatever" }),
            ))
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let problem = read_json(response).await;
        assert_eq!(
            problem["errors"]["name"],
            json!(["This field is required."])
        );
    }

    #[tokio::test]
    async fn image_upload_is_stored_and_referenced() {
        let (state, media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);
        let department_id = create_department(&app, "Media").await;

        let mut body = String::new();
        for (name, value) in employee_fields("pic@example.com", &department_id.to_string()) {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
             filename=\"portrait.png\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n"
        ));
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        let request = Request::builder()
            .method("POST")
            .uri("/api/employees")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.expect("handler should respond");
        assert_eq!(response.status(), StatusCode::CREATED);

        let employee = read_json(response).await;
        let stored = employee["image"].as_str().expect("image path");
        assert!(stored.starts_with("employee_images/"));
        assert!(stored.ends_with(".png"));
        let on_disk = tokio::fs::read(media.path().join(stored))
            .await
            .expect("stored file");
        assert_eq!(on_disk, b"PNGDATA");
    }

    #[tokio::test]
    async fn rejected_image_type_blocks_the_create() {
        let (state, _media) = setup_state(DeletePolicy::Hard).await;
        let app = app_router(state);
        let department_id = create_department(&app, "Docs").await;

        let mut body = String::new();
        for (name, value) in employee_fields("gif@example.com", &department_id.to_string()) {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
             filename=\"animation.gif\"\r\nContent-Type: image/gif\r\n\r\nGIFDATA\r\n"
        ));
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        let request = Request::builder()
            .method("POST")
            .uri("/api/employees")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let problem = read_json(response).await;
        assert_eq!(
            problem["errors"]["image"],
            json!(["Only JPG/PNG files are allowed."])
        );

        let response = app
            .oneshot(get_request("/api/employees"))
            .await
            .expect("handler should respond");
        let listing = read_json(response).await;
        assert_eq!(listing.as_array().map(Vec::len), Some(0));
    }
}

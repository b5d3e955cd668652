use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Designation, Gender, COURSES_NOT_SPECIFIED, COURSE_CODES};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("email regex")
});

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]*$").expect("digits regex"));

const MSG_REQUIRED: &str = "This field is required.";
const MSG_NAME_TOO_LONG: &str = "Ensure this value has at most 100 characters.";
const MSG_EMAIL_INVALID: &str = "Enter a valid email address.";
const MSG_MOBILE_DIGITS: &str = "Please enter only digits";
const MSG_MOBILE_LENGTH: &str = "Mobile number must be exactly 10 digits";
const MSG_IMAGE_TYPE: &str = "Only JPG/PNG files are allowed.";

/// Field-keyed, aggregated validation errors.
///
/// Every independent check appends here so a caller can surface all invalid
/// fields in a single round trip; nothing short-circuits.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message under the given field.
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the messages recorded for a field, empty when the field is clean.
    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Absorbs all messages from another error set, preserving order.
    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn into_map(self) -> BTreeMap<&'static str, Vec<String>> {
        self.0
    }
}

/// Raw employee form submission, prior to any validation.
///
/// All fields arrive as text; `courses` holds the multi-select of predefined
/// codes and `custom_course` the optional free-text addition. The image is
/// referenced by its original filename only, the bytes travel separately.
#[derive(Debug, Clone, Default)]
pub struct EmployeeInput {
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub designation: String,
    pub custom_designation: Option<String>,
    pub gender: String,
    pub courses: Vec<String>,
    pub custom_course: Option<String>,
    pub image_filename: Option<String>,
    pub department_id: String,
    pub salary: String,
    pub hire_date: String,
    pub address: String,
}

/// A fully validated employee, ready for the persistence gateway.
///
/// Identifier and creation timestamp are assigned at write time and therefore
/// absent here.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeDraft {
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub designation: String,
    pub gender: Gender,
    pub courses: String,
    pub department_id: i64,
    pub salary: Decimal,
    pub hire_date: NaiveDate,
    pub address: String,
}

/// Raw department form submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepartmentInput {
    pub name: String,
    pub description: Option<String>,
}

/// A validated department, ready for the persistence gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct DepartmentDraft {
    pub name: String,
    pub description: Option<String>,
}

/// Validates all syntactic employee rules, reporting every failure at once.
///
/// Cross-record rules (email uniqueness, department existence) need store
/// access and are checked by the caller against the gateway; their failures
/// are merged into the same [`FieldErrors`] under `email` and `department`.
pub fn validate_employee(input: &EmployeeInput) -> Result<EmployeeDraft, FieldErrors> {
    let mut errors = FieldErrors::new();

    let name = input.name.trim();
    if name.is_empty() {
        errors.push("name", MSG_REQUIRED);
    } else if name.chars().count() > 100 {
        errors.push("name", MSG_NAME_TOO_LONG);
    }

    let email = input.email.trim();
    if !EMAIL_RE.is_match(email) {
        errors.push("email", MSG_EMAIL_INVALID);
    }

    // Both mobile checks run and report independently.
    let mobile = input.mobile.trim();
    if !DIGITS_RE.is_match(mobile) {
        errors.push("mobile", MSG_MOBILE_DIGITS);
    }
    if mobile.chars().count() != 10 {
        errors.push("mobile", MSG_MOBILE_LENGTH);
    }

    // A free-text override replaces the enumerated designation entirely.
    let designation = match normalized(input.custom_designation.as_deref()) {
        Some(custom) => Some(custom.to_string()),
        None => match Designation::from_str(input.designation.trim()) {
            Ok(choice) => Some(choice.as_str().to_string()),
            Err(()) => {
                errors.push("designation", "Select a valid designation.");
                None
            }
        },
    };

    let gender = match Gender::from_str(input.gender.trim()) {
        Ok(gender) => Some(gender),
        Err(()) => {
            errors.push("gender", "Select a valid gender.");
            None
        }
    };

    for code in &input.courses {
        if !COURSE_CODES.contains(&code.trim()) {
            errors.push("courses", format!("Select a valid course: {code}"));
        }
    }

    if let Some(filename) = normalized(input.image_filename.as_deref()) {
        if !has_allowed_image_extension(filename) {
            errors.push("image", MSG_IMAGE_TYPE);
        }
    }

    let department_id = {
        let raw = input.department_id.trim();
        if raw.is_empty() {
            errors.push("department", "Select a department.");
            None
        } else {
            match raw.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.push("department", "Select a valid department.");
                    None
                }
            }
        }
    };

    let salary = match Decimal::from_str(input.salary.trim()) {
        Ok(value) if value.is_sign_negative() => {
            errors.push("salary", "Salary must not be negative.");
            None
        }
        Ok(value) if value.scale() > 2 => {
            errors.push("salary", "Salary supports at most 2 decimal places.");
            None
        }
        Ok(mut value) => {
            value.rescale(2);
            Some(value)
        }
        Err(_) => {
            errors.push("salary", "Enter a valid salary.");
            None
        }
    };

    let hire_date = match NaiveDate::parse_from_str(input.hire_date.trim(), "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push("hire_date", "Enter a valid date in YYYY-MM-DD format.");
            None
        }
    };

    let address = input.address.trim();
    if address.is_empty() {
        errors.push("address", MSG_REQUIRED);
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // Courses are assembled during cross-field finalization, after every
    // individual field has been validated.
    let courses = assemble_courses(&input.courses, input.custom_course.as_deref());

    let (Some(designation), Some(gender), Some(department_id), Some(salary), Some(hire_date)) =
        (designation, gender, department_id, salary, hire_date)
    else {
        return Err(errors);
    };

    Ok(EmployeeDraft {
        name: name.to_string(),
        email: email.to_string(),
        mobile: mobile.to_string(),
        designation,
        gender,
        courses,
        department_id,
        salary,
        hire_date,
        address: address.to_string(),
    })
}

/// Validates a department submission.
pub fn validate_department(input: &DepartmentInput) -> Result<DepartmentDraft, FieldErrors> {
    let mut errors = FieldErrors::new();

    let name = input.name.trim();
    if name.is_empty() {
        errors.push("name", MSG_REQUIRED);
    } else if name.chars().count() > 100 {
        errors.push("name", MSG_NAME_TOO_LONG);
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(DepartmentDraft {
        name: name.to_string(),
        description: normalized(input.description.as_deref()).map(str::to_string),
    })
}

/// Joins the selected course codes plus an optional free-text course into the
/// single normalized field, collapsing to the sentinel when nothing was picked.
pub fn assemble_courses(codes: &[String], custom: Option<&str>) -> String {
    let mut parts: Vec<&str> = codes.iter().map(|code| code.trim()).collect();
    if let Some(extra) = normalized(custom) {
        parts.push(extra);
    }
    if parts.is_empty() {
        COURSES_NOT_SPECIFIED.to_string()
    } else {
        parts.join(", ")
    }
}

/// Returns `true` when the filename carries an accepted image extension.
pub fn has_allowed_image_extension(filename: &str) -> bool {
    let lowered = filename.to_ascii_lowercase();
    lowered.ends_with(".jpg") || lowered.ends_with(".jpeg") || lowered.ends_with(".png")
}

fn normalized(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|trimmed| !trimmed.is_empty())
}

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::{
    error::{AppError, ValidationDetail},
    types::{CheckoutMethod, CourseDocument, Role, Video},
};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterQuery {
    #[validate(
        length(min = 6, message = "Email must be at least 6 characters long"),
        email(message = "Please enter a valid email address")
    )]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginQuery {
    #[validate(
        length(min = 6, message = "Email must be at least 6 characters long"),
        email(message = "Please enter a valid email address")
    )]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
}

/// The mutable fields of a course, as submitted on create and update.
/// Anything else in the body (`id`, `createdBy`, `registeredUsers`) is ignored.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CourseInput {
    #[validate(length(min = 3, message = "Title must be at least 3 characters"))]
    pub title: String,
    #[validate(length(min = 10, message = "Description must be at least 10 characters"))]
    pub description: String,
    #[validate(url(message = "Must be a valid URL"))]
    pub video_intro_url: Option<String>,
    #[validate(nested)]
    pub document: Option<CourseDocument>,
    #[serde(default)]
    #[validate(nested)]
    pub videos: Vec<Video>,
}

/// Payment details collected at checkout. Echoed back to the caller, never stored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutInfo {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(required(message = "Checkout method is required"))]
    pub checkout_method: Option<CheckoutMethod>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CourseRegistrationQuery {
    #[serde(default)]
    #[validate(nested)]
    pub checkout_info: CheckoutInfo,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ToggleStatusQuery {
    #[serde(default)]
    #[validate(length(min = 1, message = "userId is required in request body"))]
    pub user_id: String,
}

/// Run the derived validators and turn any failure into a 400 carrying every
/// failed field, nested paths included (`videos[1].url`).
pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input.validate().map_err(|errors| {
        let mut details = Vec::new();
        flatten_errors("", &errors, &mut details);
        details.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::Validation { details }
    })
}

fn flatten_errors(prefix: &str, errors: &ValidationErrors, out: &mut Vec<ValidationDetail>) {
    for (field, kind) in errors.errors() {
        let field = camel_case(&field.to_string());
        let path = if prefix.is_empty() {
            field
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(failures) => {
                for failure in failures {
                    let message = failure
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", path));
                    out.push(ValidationDetail::new(path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten_errors(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    flatten_errors(&format!("{}[{}]", path, index), inner, out);
                }
            }
        }
    }
}

// Report fields under the names clients send them with.
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

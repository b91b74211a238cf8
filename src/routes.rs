use std::{convert::Infallible, sync::Arc};

use chrono::{TimeZone, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use warp::{
    hyper::{body::Bytes, StatusCode},
    path,
    reject::{LengthRequired, MethodNotAllowed, PayloadTooLarge},
    reply::{Json, WithStatus},
    Filter, Rejection, Reply,
};

use crate::{
    auth::{Auth, AuthInternal},
    courses::{Courses, CoursesInternal},
    error::{AppError, ValidationDetail},
    input::{
        validate_input, CourseInput, CourseRegistrationQuery, LoginQuery, RegisterQuery,
        ToggleStatusQuery,
    },
    types::{CourseID, Identity, PublicUser, Role, UserID},
};

const MAX_BODY_BYTES: u64 = 64 * 1024;

pub fn build_api_route_filter(
    auth: &Auth,
    courses: &Courses,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let register = path!("register")
        .and(warp::post())
        .and(json_body())
        .and(with_auth_state(auth.internal.clone()))
        .and_then(user_register);

    let login = path!("login")
        .and(warp::post())
        .and(json_body())
        .and(with_auth_state(auth.internal.clone()))
        .and_then(user_login);

    let profile = path!("profile")
        .and(warp::get())
        .and(with_auth(auth))
        .and_then(user_profile);

    let list_courses = path!("courses")
        .and(warp::get())
        .and(with_auth(auth))
        .and(with_course_state(courses.internal.clone()))
        .and_then(course_list_own);

    let create_course = path!("courses")
        .and(warp::post())
        .and(with_auth(auth))
        .and(json_body())
        .and(with_course_state(courses.internal.clone()))
        .and_then(course_create);

    let get_course = path!("courses" / String)
        .and(warp::get())
        .and(with_auth(auth))
        .and(with_course_state(courses.internal.clone()))
        .and_then(course_get_own);

    let update_course = path!("courses" / String)
        .and(warp::put())
        .and(with_auth(auth))
        .and(json_body())
        .and(with_course_state(courses.internal.clone()))
        .and_then(course_update);

    let delete_course = path!("courses" / String)
        .and(warp::delete())
        .and(with_auth(auth))
        .and(with_course_state(courses.internal.clone()))
        .and_then(course_delete);

    let public_course = path!("courses" / String / "public")
        .and(warp::get())
        .and(with_course_state(courses.internal.clone()))
        .and_then(course_get_public);

    let register_for_course = path!("courses" / String / "register")
        .and(warp::post())
        .and(with_auth(auth))
        .and(json_body())
        .and(with_course_state(courses.internal.clone()))
        .and_then(course_register);

    let toggle_status = path!("courses" / String / "toggle-user-status")
        .and(warp::patch())
        .and(with_auth(auth))
        .and(json_body())
        .and(with_course_state(courses.internal.clone()))
        .and_then(course_toggle_status);

    let catalog = path!("catalog")
        .and(warp::get())
        .and(with_course_state(courses.internal.clone()))
        .and_then(course_catalog);

    let health = path!("health").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "success": true,
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        }))
    });

    register
        .or(login)
        .or(profile)
        .or(list_courses)
        .or(create_course)
        .or(get_course)
        .or(update_course)
        .or(delete_course)
        .or(public_course)
        .or(register_for_course)
        .or(toggle_status)
        .or(catalog)
        .or(health)
}

/// Extracts the verified caller from the `Authorization: Bearer <token>` header.
/// A missing header is rejected the same way as a bad token.
pub fn with_auth(auth: &Auth) -> impl Filter<Extract = (Identity,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_auth_state(auth.internal.clone()))
        .and_then(user_auth_check)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<ValidationDetail>>,
}

/// Turns every rejection this API produces into a `{success: false, error, details?}` body.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    let (status, error, details) = if let Some(app_error) = err.find::<AppError>() {
        if app_error.status() == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = ?app_error, "request failed");
        }
        (
            app_error.status(),
            app_error.public_message(),
            app_error.details().map(|d| d.to_vec()),
        )
    } else if err.find::<PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body too large".to_string(),
            None,
        )
    } else if err.find::<LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            "Content-Length header required".to_string(),
            None,
        )
    } else if err.find::<MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed".to_string(),
            None,
        )
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string(), None)
    } else {
        return Err(err);
    };

    Ok(reply(
        &ErrorResponse {
            success: false,
            error,
            details,
        },
        status,
    ))
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    success: bool,
    message: &'static str,
    user: PublicUser,
}

async fn user_register(
    input: RegisterQuery,
    auth: Arc<AuthInternal>,
) -> Result<impl Reply, Rejection> {
    validate_input(&input)?;

    let user = auth
        .register_user(&input.email, &input.password, input.role)
        .await?;

    Ok(reply(
        &RegisterResponse {
            success: true,
            message: "User registered successfully",
            user,
        },
        StatusCode::CREATED,
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    success: bool,
    message: &'static str,
    user: PublicUser,
    access_token: String,
    token_type: &'static str,
    expires_in: u64,
}

async fn user_login(
    input: LoginQuery,
    auth: Arc<AuthInternal>,
) -> Result<impl Reply, Rejection> {
    validate_input(&input)?;

    let session = auth.login(&input.email, &input.password).await?;

    Ok(reply(
        &LoginResponse {
            success: true,
            message: "Login successful",
            user: session.user,
            access_token: session.access_token,
            token_type: "Bearer",
            expires_in: session.expires_in,
        },
        StatusCode::OK,
    ))
}

#[derive(Debug, Serialize)]
struct ProfileUser {
    id: UserID,
    email: String,
    role: Role,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenInfo {
    issued_at: Option<String>,
    expires_at: Option<String>,
    issuer: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    success: bool,
    message: &'static str,
    user: ProfileUser,
    token_info: TokenInfo,
}

async fn user_profile(identity: Identity) -> Result<impl Reply, Rejection> {
    let timestamp = |secs: u64| {
        Utc.timestamp_opt(secs as i64, 0)
            .single()
            .map(|t| t.to_rfc3339())
    };

    Ok(reply(
        &ProfileResponse {
            success: true,
            message: "Profile retrieved successfully",
            token_info: TokenInfo {
                issued_at: timestamp(identity.issued_at),
                expires_at: timestamp(identity.expires_at),
                issuer: identity.issuer,
            },
            user: ProfileUser {
                id: identity.user_id,
                email: identity.email,
                role: identity.role,
            },
        },
        StatusCode::OK,
    ))
}

#[derive(Debug, Serialize)]
struct DataResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    data: T,
}

impl<T: Serialize> DataResponse<T> {
    fn new(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

#[derive(Debug, Serialize)]
struct ListResponse<T> {
    success: bool,
    total: usize,
    data: Vec<T>,
}

impl<T: Serialize> ListResponse<T> {
    fn new(data: Vec<T>) -> Self {
        Self {
            success: true,
            total: data.len(),
            data,
        }
    }
}

async fn course_list_own(
    identity: Identity,
    courses: Arc<Mutex<CoursesInternal>>,
) -> Result<impl Reply, Rejection> {
    let courses = courses.lock().await.list_own(&identity).await?;

    Ok(reply(&ListResponse::new(courses), StatusCode::OK))
}

async fn course_catalog(courses: Arc<Mutex<CoursesInternal>>) -> Result<impl Reply, Rejection> {
    let courses = courses.lock().await.list_public().await?;

    Ok(reply(&ListResponse::new(courses), StatusCode::OK))
}

async fn course_create(
    identity: Identity,
    input: CourseInput,
    courses: Arc<Mutex<CoursesInternal>>,
) -> Result<impl Reply, Rejection> {
    let course = courses.lock().await.create(&identity, input).await?;

    Ok(reply(
        &DataResponse::with_message("Course created successfully", course),
        StatusCode::CREATED,
    ))
}

async fn course_get_own(
    id: String,
    identity: Identity,
    courses: Arc<Mutex<CoursesInternal>>,
) -> Result<impl Reply, Rejection> {
    let course = courses
        .lock()
        .await
        .get_own(&identity, &CourseID(id))
        .await?;

    Ok(reply(&DataResponse::new(course), StatusCode::OK))
}

async fn course_update(
    id: String,
    identity: Identity,
    input: CourseInput,
    courses: Arc<Mutex<CoursesInternal>>,
) -> Result<impl Reply, Rejection> {
    let course = courses
        .lock()
        .await
        .update(&identity, &CourseID(id), input)
        .await?;

    Ok(reply(
        &DataResponse::with_message("Course updated successfully", course),
        StatusCode::OK,
    ))
}

async fn course_delete(
    id: String,
    identity: Identity,
    courses: Arc<Mutex<CoursesInternal>>,
) -> Result<impl Reply, Rejection> {
    let course = courses
        .lock()
        .await
        .delete(&identity, &CourseID(id))
        .await?;

    Ok(reply(
        &DataResponse::with_message("Course deleted successfully", course),
        StatusCode::OK,
    ))
}

async fn course_get_public(
    id: String,
    courses: Arc<Mutex<CoursesInternal>>,
) -> Result<impl Reply, Rejection> {
    let course = courses.lock().await.get_public(&CourseID(id)).await?;

    Ok(reply(&DataResponse::new(course), StatusCode::OK))
}

async fn course_register(
    id: String,
    identity: Identity,
    input: CourseRegistrationQuery,
    courses: Arc<Mutex<CoursesInternal>>,
) -> Result<impl Reply, Rejection> {
    let registration = courses
        .lock()
        .await
        .register(&identity, &CourseID(id), input.checkout_info)
        .await?;

    Ok(reply(
        &DataResponse::with_message("Successfully registered for the course", registration),
        StatusCode::OK,
    ))
}

async fn course_toggle_status(
    id: String,
    identity: Identity,
    input: ToggleStatusQuery,
    courses: Arc<Mutex<CoursesInternal>>,
) -> Result<impl Reply, Rejection> {
    validate_input(&input)?;

    let change = courses
        .lock()
        .await
        .toggle_status(&identity, &CourseID(id), &UserID(input.user_id))
        .await?;

    Ok(reply(
        &DataResponse::with_message(
            format!(
                "User status changed from {} to {}",
                change.previous_status.as_str(),
                change.new_status.as_str()
            ),
            change,
        ),
        StatusCode::OK,
    ))
}

// Unwrap the bearer token and validate it
async fn user_auth_check(
    header: Option<String>,
    auth: Arc<AuthInternal>,
) -> Result<Identity, Rejection> {
    let identity = auth.verify_bearer(header.as_deref())?;

    Ok(identity)
}

fn reply<T: Serialize>(body: &T, status: StatusCode) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(body), status)
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES)
        .and(warp::body::bytes())
        .and_then(|body: Bytes| async move { decode_json(&body).map_err(warp::reject::custom) })
}

/// Decode a request body, reporting a type mismatch against the path of the
/// value that failed (`checkoutInfo.checkoutMethod`, `videos[1].url`).
fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    let mut deserializer = serde_json::Deserializer::from_slice(body);

    let value = serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        let path = err.path().to_string();
        let field = if path == "." { "body".to_string() } else { path };
        AppError::validation(field, err.into_inner().to_string())
    })?;
    deserializer
        .end()
        .map_err(|err| AppError::validation("body", err.to_string()))?;

    Ok(value)
}

// functor that adds a reference to the internal auth state into the filter chain
fn with_auth_state(
    auth: Arc<AuthInternal>,
) -> impl Filter<Extract = (Arc<AuthInternal>,), Error = Infallible> + Clone {
    warp::any().map(move || auth.clone())
}

fn with_course_state(
    courses: Arc<Mutex<CoursesInternal>>,
) -> impl Filter<Extract = (Arc<Mutex<CoursesInternal>>,), Error = Infallible> + Clone {
    warp::any().map(move || courses.clone())
}

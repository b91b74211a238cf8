use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[repr(transparent)]
pub struct UserID(pub String);

impl fmt::Display for UserID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[repr(transparent)]
pub struct CourseID(pub String);

impl fmt::Display for CourseID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[repr(transparent)]
pub struct HashedPassword(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Learner,
    Creator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => "learner",
            Role::Creator => "creator",
        }
    }
}

/// A stored account. Never serialized into a response; see [`PublicUser`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserID,
    pub email: String,
    #[serde(alias = "password")]
    pub password_hash: HashedPassword,
    pub role: Role,
    pub created_at: String,
}

/// The on-disk credential layout: user id to user record.
pub type UserMap = BTreeMap<UserID, User>;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: UserID,
    pub email: String,
    pub role: Role,
    pub created_at: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            created_at: user.created_at.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Claims {
    pub(crate) user_id: String,
    pub(crate) email: String,
    pub(crate) role: Role,
    pub(crate) iat: u64,
    pub(crate) exp: u64,
    pub(crate) iss: String,
    pub(crate) sub: String,
}

/// The verified caller behind a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserID,
    pub email: String,
    pub role: Role,
    pub issued_at: u64,
    pub expires_at: u64,
    pub issuer: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: UserID(claims.user_id),
            email: claims.email,
            role: claims.role,
            issued_at: claims.iat,
            expires_at: claims.exp,
            issuer: claims.iss,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Text,
    Pdf,
    Html,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct CourseDocument {
    #[serde(rename = "type")]
    pub kind: DocumentType,
    #[validate(length(min = 1, message = "Document content is required"))]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct Video {
    #[validate(length(min = 1, message = "Video ID is required"))]
    pub id: String,
    #[validate(length(min = 1, message = "Video title is required"))]
    pub title: String,
    #[validate(url(message = "Must be a valid URL"))]
    pub url: String,
    #[validate(length(min = 1, message = "Video description is required"))]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrantStatus {
    Active,
    Blocked,
}

impl RegistrantStatus {
    pub fn toggled(self) -> Self {
        match self {
            RegistrantStatus::Active => RegistrantStatus::Blocked,
            RegistrantStatus::Blocked => RegistrantStatus::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrantStatus::Active => "active",
            RegistrantStatus::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub id: UserID,
    pub email: String,
    pub role: Role,
    pub registered_at: String,
    pub status: RegistrantStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: CourseID,
    pub title: String,
    pub description: String,
    pub created_by: UserID,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_intro_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<CourseDocument>,
    #[serde(default)]
    pub videos: Vec<Video>,
    #[serde(default)]
    pub registered_users: Vec<RegisteredUser>,
}

/// A course as shown to anonymous visitors: registrants reduced to a count.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicCourse {
    pub id: CourseID,
    pub title: String,
    pub description: String,
    pub video_intro_url: Option<String>,
    pub document: Option<CourseDocument>,
    pub videos: Vec<Video>,
    pub registered_users_count: usize,
}

impl From<&Course> for PublicCourse {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id.clone(),
            title: course.title.clone(),
            description: course.description.clone(),
            video_intro_url: course.video_intro_url.clone(),
            document: course.document.clone(),
            videos: course.videos.clone(),
            registered_users_count: course.registered_users.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMethod {
    CreditCard,
    DebitCard,
    Paypal,
    BankTransfer,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub user_id: UserID,
    pub email: String,
    pub previous_status: RegistrantStatus,
    pub new_status: RegistrantStatus,
}

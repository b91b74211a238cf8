//! Course-scoped authorization. Every owner-only action reduces to the same
//! rule: the caller must be the user recorded in `createdBy`.

use crate::{
    error::AppError,
    types::{Course, Identity, PublicCourse},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseAction {
    ReadOwn,
    Update,
    Delete,
    ManageRegistrants,
}

impl CourseAction {
    fn as_str(&self) -> &'static str {
        match self {
            CourseAction::ReadOwn => "read-own",
            CourseAction::Update => "update",
            CourseAction::Delete => "delete",
            CourseAction::ManageRegistrants => "manage-registrants",
        }
    }
}

pub fn authorize(identity: &Identity, course: &Course, action: CourseAction) -> Result<(), AppError> {
    if course.created_by == identity.user_id {
        return Ok(());
    }

    tracing::warn!(
        user_id = %identity.user_id,
        course_id = %course.id,
        action = action.as_str(),
        "access denied"
    );
    Err(AppError::AccessDenied)
}

/// The courses `identity` created, in store order.
pub fn list_own<'a>(courses: &'a [Course], identity: &Identity) -> Vec<&'a Course> {
    courses
        .iter()
        .filter(|course| course.created_by == identity.user_id)
        .collect()
}

/// Anonymous view of a course. Never carries registrant identities.
pub fn public_view(course: &Course) -> PublicCourse {
    PublicCourse::from(course)
}

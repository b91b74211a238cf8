use std::{error::Error, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::AppError,
    input::{validate_input, CheckoutInfo, CourseInput},
    policy::{authorize, list_own, public_view, CourseAction},
    types::{
        Course, CourseID, Identity, PublicCourse, RegistrantStatus, RegisteredUser, StatusChange,
        UserID,
    },
};

#[async_trait]
pub trait CourseRepository: Send + Sync + 'static {
    /// Load the whole course collection.
    async fn load_all(&self) -> Result<Vec<Course>, Box<dyn Error + Send + Sync>>;

    /// Replace the whole course collection with `courses`.
    async fn save_all(&mut self, courses: &[Course]) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// The outcome of a successful course registration. The checkout details are
/// echoed back but are not part of the stored course.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub course_id: CourseID,
    pub course_title: String,
    pub registered_user: RegisteredUser,
    pub checkout_info: CheckoutInfo,
}

const COURSE_NOT_FOUND: &str = "Course not found";

pub(crate) struct CoursesInternal {
    repository: Arc<Mutex<dyn CourseRepository>>,
}

impl CoursesInternal {
    async fn load(&self) -> Result<Vec<Course>, AppError> {
        Ok(self.repository.lock().await.load_all().await?)
    }

    async fn save(&self, courses: &[Course]) -> Result<(), AppError> {
        Ok(self.repository.lock().await.save_all(courses).await?)
    }

    pub async fn list_own(&self, identity: &Identity) -> Result<Vec<Course>, AppError> {
        let courses = self.load().await?;

        Ok(list_own(&courses, identity).into_iter().cloned().collect())
    }

    pub async fn list_public(&self) -> Result<Vec<PublicCourse>, AppError> {
        let courses = self.load().await?;

        Ok(courses.iter().map(public_view).collect())
    }

    pub async fn create(&self, identity: &Identity, input: CourseInput) -> Result<Course, AppError> {
        validate_input(&input)?;

        let mut courses = self.load().await?;

        let course = Course {
            id: fresh_course_id(&courses),
            title: input.title,
            description: input.description,
            created_by: identity.user_id.clone(),
            video_intro_url: input.video_intro_url,
            document: input.document,
            videos: input.videos,
            registered_users: Vec::new(),
        };
        courses.push(course.clone());

        self.save(&courses).await?;

        tracing::info!(course_id = %course.id, user_id = %identity.user_id, "course created");

        Ok(course)
    }

    pub async fn get_own(&self, identity: &Identity, id: &CourseID) -> Result<Course, AppError> {
        let courses = self.load().await?;
        let course = courses
            .into_iter()
            .find(|c| &c.id == id)
            .ok_or(AppError::NotFound(COURSE_NOT_FOUND))?;

        authorize(identity, &course, CourseAction::ReadOwn)?;

        Ok(course)
    }

    pub async fn get_public(&self, id: &CourseID) -> Result<PublicCourse, AppError> {
        let courses = self.load().await?;

        courses
            .iter()
            .find(|c| &c.id == id)
            .map(public_view)
            .ok_or(AppError::NotFound(COURSE_NOT_FOUND))
    }

    /// Replace the mutable fields of a course. `id`, `createdBy` and the
    /// registrant list are carried over from the stored record.
    pub async fn update(
        &self,
        identity: &Identity,
        id: &CourseID,
        input: CourseInput,
    ) -> Result<Course, AppError> {
        validate_input(&input)?;

        let mut courses = self.load().await?;
        let course = courses
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or(AppError::NotFound(COURSE_NOT_FOUND))?;

        authorize(identity, course, CourseAction::Update)?;

        course.title = input.title;
        course.description = input.description;
        course.video_intro_url = input.video_intro_url;
        course.document = input.document;
        course.videos = input.videos;
        let updated = course.clone();

        self.save(&courses).await?;

        tracing::info!(course_id = %id, user_id = %identity.user_id, "course updated");

        Ok(updated)
    }

    pub async fn delete(&self, identity: &Identity, id: &CourseID) -> Result<Course, AppError> {
        let mut courses = self.load().await?;
        let index = courses
            .iter()
            .position(|c| &c.id == id)
            .ok_or(AppError::NotFound(COURSE_NOT_FOUND))?;

        authorize(identity, &courses[index], CourseAction::Delete)?;

        let deleted = courses.remove(index);

        self.save(&courses).await?;

        tracing::info!(course_id = %id, user_id = %identity.user_id, "course deleted");

        Ok(deleted)
    }

    /// Enrol the caller in a course. A second attempt by the same user is
    /// rejected; the existing registration is left as it was.
    pub async fn register(
        &self,
        identity: &Identity,
        id: &CourseID,
        checkout_info: CheckoutInfo,
    ) -> Result<Registration, AppError> {
        validate_input(&checkout_info).map_err(|err| match err {
            AppError::Validation { details } => AppError::Validation {
                details: details
                    .into_iter()
                    .map(|mut d| {
                        d.field = format!("checkoutInfo.{}", d.field);
                        d
                    })
                    .collect(),
            },
            other => other,
        })?;

        let mut courses = self.load().await?;
        let course = courses
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or(AppError::NotFound(COURSE_NOT_FOUND))?;

        if course
            .registered_users
            .iter()
            .any(|r| r.id == identity.user_id)
        {
            return Err(AppError::AlreadyRegistered);
        }

        let registered_user = RegisteredUser {
            id: identity.user_id.clone(),
            email: identity.email.clone(),
            role: identity.role,
            registered_at: Utc::now().to_rfc3339(),
            status: RegistrantStatus::Active,
        };
        course.registered_users.push(registered_user.clone());
        let course_title = course.title.clone();

        self.save(&courses).await?;

        tracing::info!(course_id = %id, user_id = %identity.user_id, "learner registered");

        Ok(Registration {
            course_id: id.clone(),
            course_title,
            registered_user,
            checkout_info,
        })
    }

    /// Flip a registrant between active and blocked. Owner only.
    pub async fn toggle_status(
        &self,
        identity: &Identity,
        id: &CourseID,
        target: &UserID,
    ) -> Result<StatusChange, AppError> {
        let mut courses = self.load().await?;
        let course = courses
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or(AppError::NotFound(COURSE_NOT_FOUND))?;

        authorize(identity, course, CourseAction::ManageRegistrants)?;

        if course.registered_users.is_empty() {
            return Err(AppError::NotFound(
                "No registered users found for this course",
            ));
        }

        let registrant = course
            .registered_users
            .iter_mut()
            .find(|r| &r.id == target)
            .ok_or(AppError::NotFound("User not found in this course"))?;

        let previous_status = registrant.status;
        registrant.status = previous_status.toggled();
        let change = StatusChange {
            user_id: registrant.id.clone(),
            email: registrant.email.clone(),
            previous_status,
            new_status: registrant.status,
        };

        self.save(&courses).await?;

        tracing::info!(
            course_id = %id,
            user_id = %target,
            from = previous_status.as_str(),
            to = change.new_status.as_str(),
            "registrant status changed"
        );

        Ok(change)
    }
}

fn fresh_course_id(existing: &[Course]) -> CourseID {
    loop {
        let id = CourseID(format!("course-{}", &Uuid::new_v4().simple().to_string()[..8]));
        if !existing.iter().any(|c| c.id == id) {
            return id;
        }
    }
}

/// Shared handle to the course service. Each operation holds the service lock
/// for its whole read-modify-write cycle, so writers in this process never
/// interleave.
#[derive(Clone)]
pub struct Courses {
    pub(crate) internal: Arc<Mutex<CoursesInternal>>,
}

impl Courses {
    pub fn new(repository: Arc<Mutex<dyn CourseRepository>>) -> Self {
        Self {
            internal: Arc::new(Mutex::new(CoursesInternal { repository })),
        }
    }

    pub async fn list_own(&self, identity: &Identity) -> Result<Vec<Course>, AppError> {
        self.internal.lock().await.list_own(identity).await
    }

    pub async fn list_public(&self) -> Result<Vec<PublicCourse>, AppError> {
        self.internal.lock().await.list_public().await
    }

    pub async fn create(&self, identity: &Identity, input: CourseInput) -> Result<Course, AppError> {
        self.internal.lock().await.create(identity, input).await
    }

    pub async fn get_own(&self, identity: &Identity, id: &CourseID) -> Result<Course, AppError> {
        self.internal.lock().await.get_own(identity, id).await
    }

    pub async fn get_public(&self, id: &CourseID) -> Result<PublicCourse, AppError> {
        self.internal.lock().await.get_public(id).await
    }

    pub async fn update(
        &self,
        identity: &Identity,
        id: &CourseID,
        input: CourseInput,
    ) -> Result<Course, AppError> {
        self.internal.lock().await.update(identity, id, input).await
    }

    pub async fn delete(&self, identity: &Identity, id: &CourseID) -> Result<Course, AppError> {
        self.internal.lock().await.delete(identity, id).await
    }

    pub async fn register(
        &self,
        identity: &Identity,
        id: &CourseID,
        checkout_info: CheckoutInfo,
    ) -> Result<Registration, AppError> {
        self.internal
            .lock()
            .await
            .register(identity, id, checkout_info)
            .await
    }

    pub async fn toggle_status(
        &self,
        identity: &Identity,
        id: &CourseID,
        target: &UserID,
    ) -> Result<StatusChange, AppError> {
        self.internal
            .lock()
            .await
            .toggle_status(identity, id, target)
            .await
    }
}

//! Flat-file persistence: each collection is one JSON document, read whole and
//! rewritten whole on every mutation.

use std::{
    error::Error,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    auth::UserRepository,
    courses::CourseRepository,
    types::{Course, UserMap},
};

type StoreResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Credential store backed by a JSON object of user id to user record.
pub struct JsonUserStore {
    path: PathBuf,
}

impl JsonUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UserRepository for JsonUserStore {
    async fn load_all(&self) -> StoreResult<Option<UserMap>> {
        read_document(&self.path).await
    }

    async fn save_all(&mut self, users: &UserMap) -> StoreResult<()> {
        write_document(&self.path, users).await
    }
}

/// Course store backed by a JSON array of courses. A missing file is an empty catalog.
pub struct JsonCourseStore {
    path: PathBuf,
}

impl JsonCourseStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CourseRepository for JsonCourseStore {
    async fn load_all(&self) -> StoreResult<Vec<Course>> {
        Ok(read_document(&self.path).await?.unwrap_or_default())
    }

    async fn save_all(&mut self, courses: &[Course]) -> StoreResult<()> {
        write_document(&self.path, &courses).await
    }
}

// `None` when the file does not exist. A present but blank file reads as the
// default (empty) collection.
async fn read_document<T>(path: &Path) -> StoreResult<Option<T>>
where
    T: DeserializeOwned + Default,
{
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "failed to read store");
            return Err(err.into());
        }
    };

    if contents.trim().is_empty() {
        return Ok(Some(T::default()));
    }

    serde_json::from_str(&contents).map(Some).map_err(|err| {
        tracing::error!(path = %path.display(), error = %err, "store is not valid JSON");
        err.into()
    })
}

// Write to a sibling temp file and rename it over the target, so a failed
// write never leaves a truncated store behind.
async fn write_document<T>(path: &Path, value: &T) -> StoreResult<()>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    let result = async {
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, path).await
    }
    .await;

    if let Err(err) = result {
        tracing::error!(path = %path.display(), error = %err, "failed to write store");
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(err.into());
    }

    Ok(())
}

#[cfg(test)]
pub(crate) use memory::{MemoryCourseStore, MemoryUserStore};

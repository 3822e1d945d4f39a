use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::LevelId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LevelError {
    #[error("level title cannot be empty")]
    EmptyTitle,

    #[error("level number must be >= 1")]
    InvalidNumber,
}

/// A named, ordered unit of quiz content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    id: LevelId,
    title: String,
    number: u32,
}

impl Level {
    /// Creates a level, trimming the title.
    ///
    /// # Errors
    ///
    /// Returns `LevelError::EmptyTitle` for a blank title and
    /// `LevelError::InvalidNumber` when `number` is zero.
    pub fn new(id: LevelId, title: impl Into<String>, number: u32) -> Result<Self, LevelError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(LevelError::EmptyTitle);
        }
        if number == 0 {
            return Err(LevelError::InvalidNumber);
        }
        Ok(Self { id, title, number })
    }

    #[must_use]
    pub fn id(&self) -> LevelId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }
}

//! Kinds of user-owned records whose changes feed the user's digest.
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Review,
    Response,
    StudySet,
    Enrollment,
    Favorite,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Review => "review",
            EntityKind::Response => "response",
            EntityKind::StudySet => "study_set",
            EntityKind::Enrollment => "enrollment",
            EntityKind::Favorite => "favorite",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(EntityKind::User),
            "review" => Ok(EntityKind::Review),
            "response" => Ok(EntityKind::Response),
            "study_set" => Ok(EntityKind::StudySet),
            "enrollment" => Ok(EntityKind::Enrollment),
            "favorite" => Ok(EntityKind::Favorite),
            other => Err(CoreError::InvalidValue(format!("unknown entity kind '{other}'"))),
        }
    }
}

//! Study set is an ordered list of questions owned by one user
use super::{QuestionId, StudySetId, UserId};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StudySetRecord")]
pub struct StudySet {
    pub set_id: StudySetId,
    pub owner_user_id: UserId,
    pub name: String,
    pub is_public: bool,
    pub updated_at: DateTime<Utc>,
    questions: Vec<QuestionId>,
}

impl StudySet {
    pub fn new(
        set_id: StudySetId,
        owner_user_id: UserId,
        name: impl Into<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            set_id,
            owner_user_id,
            name: name.into(),
            is_public: false,
            updated_at,
            questions: Vec::new(),
        }
    }

    pub fn questions(&self) -> &[QuestionId] {
        &self.questions
    }

    pub fn contains(&self, question_id: QuestionId) -> bool {
        self.questions.contains(&question_id)
    }

    /// Appends the question. Returns false if it was already in the set.
    pub fn add_question(&mut self, question_id: QuestionId) -> bool {
        if self.contains(question_id) {
            return false;
        }
        self.questions.push(question_id);
        true
    }

    pub fn remove_question(&mut self, question_id: QuestionId) -> bool {
        let before = self.questions.len();
        self.questions.retain(|&q| q != question_id);
        self.questions.len() != before
    }

    /// Moves a question to `position` (clamped to the end of the list).
    pub fn move_question(&mut self, question_id: QuestionId, position: usize) -> bool {
        let Some(from) = self.questions.iter().position(|&q| q == question_id) else {
            return false;
        };
        let question = self.questions.remove(from);
        let to = position.min(self.questions.len());
        self.questions.insert(to, question);
        true
    }

    /// Rebuilds a set from stored rows, dropping repeated questions.
    pub(crate) fn with_questions(mut self, questions: impl IntoIterator<Item = QuestionId>) -> Self {
        self.questions.clear();
        for question_id in questions {
            self.add_question(question_id);
        }
        self
    }
}

#[derive(Deserialize)]
struct StudySetRecord {
    set_id: StudySetId,
    owner_user_id: UserId,
    name: String,
    is_public: bool,
    updated_at: DateTime<Utc>,
    questions: Vec<QuestionId>,
}

impl TryFrom<StudySetRecord> for StudySet {
    type Error = CoreError;

    fn try_from(record: StudySetRecord) -> Result<Self, Self::Error> {
        let mut set = StudySet::new(record.set_id, record.owner_user_id, record.name, record.updated_at);
        set.is_public = record.is_public;
        for question_id in record.questions {
            if !set.add_question(question_id) {
                return Err(CoreError::InvalidValue(format!(
                    "question {question_id} listed twice in study set {}",
                    set.set_id
                )));
            }
        }
        Ok(set)
    }
}

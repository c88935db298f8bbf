//! SQLite implementation of the storage boundary
//!
//! Creates the platform tables the core touches (users, questions, responses,
//! reviews, user data hashes, study sets) and implements the review, digest
//! and study set stores on top of them. Timestamps are stored as epoch
//! milliseconds so due queries can compare and sort them as integers.

use super::{DigestStore, DueCursor, ReviewStore, StudySetStore, Versioned};
use crate::error::{CoreError, CoreResult};
use crate::models::{
    AnswerEvent, ChangeDigest, DigestValue, QuestionId, ReviewState, StudySet, StudySetId, UserId,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        user_id INTEGER PRIMARY KEY,
        username TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS questions (
        question_id INTEGER PRIMARY KEY,
        author_user_id INTEGER NOT NULL,
        question_data TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS responses (
        response_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        question_id INTEGER NOT NULL,
        is_correct INTEGER NOT NULL,
        elapsed_ms INTEGER NOT NULL,
        answered_at INTEGER NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users(user_id),
        FOREIGN KEY (question_id) REFERENCES questions(question_id)
    );

    CREATE TABLE IF NOT EXISTS reviews (
        user_id INTEGER NOT NULL,
        question_id INTEGER NOT NULL,
        last_review_at INTEGER NOT NULL,
        next_review_at INTEGER NOT NULL,
        version INTEGER NOT NULL,
        PRIMARY KEY (user_id, question_id),
        FOREIGN KEY (user_id) REFERENCES users(user_id),
        FOREIGN KEY (question_id) REFERENCES questions(question_id) ON DELETE CASCADE,
        CHECK (next_review_at >= last_review_at)
    );

    CREATE INDEX IF NOT EXISTS idx_reviews_due
        ON reviews (user_id, next_review_at, question_id);

    CREATE TABLE IF NOT EXISTS user_data_hashes (
        user_id INTEGER PRIMARY KEY,
        hash_value TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        version INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS study_sets (
        set_id INTEGER PRIMARY KEY,
        owner_user_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        is_public INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL,
        FOREIGN KEY (owner_user_id) REFERENCES users(user_id)
    );

    CREATE TABLE IF NOT EXISTS study_set_questions (
        set_id INTEGER NOT NULL,
        question_id INTEGER NOT NULL,
        sort_order INTEGER NOT NULL,
        PRIMARY KEY (set_id, question_id),
        FOREIGN KEY (set_id) REFERENCES study_sets(set_id) ON DELETE CASCADE
    );
";

/// Shared SQLite connection implementing every store trait.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database file and makes sure the tables exist.
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        init_schema(&conn)?;
        tracing::debug!(path = %path.as_ref().display(), "opened sqlite store");
        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> CoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            CoreError::StorageUnavailable(format!("connection lock poisoned: {e}").into())
        })
    }

    /// Inserts a user row unless it already exists.
    pub fn register_user(&self, user_id: UserId, username: &str, at: DateTime<Utc>) -> CoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO users (user_id, username, created_at) VALUES (?1, ?2, ?3)",
            params![user_id.get(), username, at.timestamp_millis()],
        )?;
        Ok(())
    }

    /// Inserts a question row unless it already exists.
    pub fn register_question(
        &self,
        question_id: QuestionId,
        author: UserId,
        question_data: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO questions (question_id, author_user_id, question_data, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![question_id.get(), author.get(), question_data, at.timestamp_millis()],
        )?;
        Ok(())
    }

    /// Number of responses logged for the pair.
    pub fn response_count(&self, user_id: UserId, question_id: QuestionId) -> CoreResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM responses WHERE user_id = ?1 AND question_id = ?2",
            params![user_id.get(), question_id.get()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

fn millis_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn version_column(row: &Row, idx: usize) -> rusqlite::Result<u64> {
    let version: i64 = row.get(idx)?;
    u64::try_from(version).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, version))
}

/// Expects columns: user_id, question_id, last_review_at, next_review_at.
fn review_from_row(row: &Row) -> rusqlite::Result<ReviewState> {
    Ok(ReviewState {
        user_id: UserId(row.get(0)?),
        question_id: QuestionId(row.get(1)?),
        last_reviewed_at: millis_column(row, 2)?,
        next_due_at: millis_column(row, 3)?,
    })
}

fn digest_from_row(row: &Row) -> rusqlite::Result<Versioned<ChangeDigest>> {
    let text: String = row.get(1)?;
    let hash_value = DigestValue::from_hex(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(Versioned {
        value: ChangeDigest {
            user_id: UserId(row.get(0)?),
            hash_value,
            updated_at: millis_column(row, 2)?,
        },
        version: version_column(row, 3)?,
    })
}

fn pair_exists(conn: &Connection, user_id: UserId, question_id: QuestionId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE user_id = ?1)
            AND EXISTS(SELECT 1 FROM questions WHERE question_id = ?2)",
        params![user_id.get(), question_id.get()],
        |row| row.get(0),
    )
}

fn write_review(
    conn: &Connection,
    state: &ReviewState,
    expected_version: Option<u64>,
) -> CoreResult<u64> {
    let last = state.last_reviewed_at.timestamp_millis();
    let next = state.next_due_at.timestamp_millis();
    let user_id = state.user_id.get();
    let question_id = state.question_id.get();

    let (changed, version) = match expected_version {
        None => {
            let changed = conn.execute(
                "INSERT INTO reviews (user_id, question_id, last_review_at, next_review_at, version)
                 VALUES (?1, ?2, ?3, ?4, 1)
                 ON CONFLICT (user_id, question_id) DO NOTHING",
                params![user_id, question_id, last, next],
            )?;
            (changed, 1)
        }
        Some(expected) => {
            let changed = conn.execute(
                "UPDATE reviews
                 SET last_review_at = ?3, next_review_at = ?4, version = version + 1
                 WHERE user_id = ?1 AND question_id = ?2 AND version = ?5",
                params![user_id, question_id, last, next, expected as i64],
            )?;
            (changed, expected + 1)
        }
    };

    if changed == 0 {
        return Err(CoreError::StorageConflict(format!(
            "reviews({user_id}, {question_id})"
        )));
    }
    Ok(version)
}

impl ReviewStore for SqliteStore {
    fn load_review(
        &self,
        user_id: UserId,
        question_id: QuestionId,
    ) -> CoreResult<Option<Versioned<ReviewState>>> {
        let conn = self.lock()?;
        let review = conn
            .query_row(
                "SELECT user_id, question_id, last_review_at, next_review_at, version
                 FROM reviews WHERE user_id = ?1 AND question_id = ?2",
                params![user_id.get(), question_id.get()],
                |row| {
                    Ok(Versioned {
                        value: review_from_row(row)?,
                        version: version_column(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(review)
    }

    fn commit_answer(
        &self,
        event: &AnswerEvent,
        state: &ReviewState,
        expected_version: Option<u64>,
    ) -> CoreResult<u64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if !pair_exists(&tx, event.user_id, event.question_id)? {
            return Err(CoreError::UnknownPair {
                user_id: event.user_id,
                question_id: event.question_id,
            });
        }

        let version = write_review(&tx, state, expected_version)?;

        tx.execute(
            "INSERT INTO responses (user_id, question_id, is_correct, elapsed_ms, answered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.user_id.get(),
                event.question_id.get(),
                event.is_correct,
                event.elapsed.as_millis(),
                event.answered_at.timestamp_millis()
            ],
        )?;

        tx.commit()?;
        Ok(version)
    }

    fn response_exists(&self, event: &AnswerEvent) -> CoreResult<bool> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM responses
                 WHERE user_id = ?1 AND question_id = ?2 AND answered_at = ?3
                   AND is_correct = ?4 AND elapsed_ms = ?5
                 LIMIT 1",
                params![
                    event.user_id.get(),
                    event.question_id.get(),
                    event.answered_at.timestamp_millis(),
                    event.is_correct,
                    event.elapsed.as_millis()
                ],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn due_reviews_page(
        &self,
        user_id: UserId,
        as_of: DateTime<Utc>,
        after: Option<DueCursor>,
        limit: usize,
    ) -> CoreResult<Vec<ReviewState>> {
        let (after_due, after_question) = match after {
            Some(cursor) => (cursor.next_due_at.timestamp_millis(), cursor.question_id.get()),
            None => (i64::MIN, i64::MIN),
        };

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, question_id, last_review_at, next_review_at
             FROM reviews
             WHERE user_id = ?1
               AND next_review_at <= ?2
               AND (next_review_at > ?3 OR (next_review_at = ?3 AND question_id > ?4))
             ORDER BY next_review_at ASC, question_id ASC
             LIMIT ?5",
        )?;

        let reviews = stmt
            .query_map(
                params![
                    user_id.get(),
                    as_of.timestamp_millis(),
                    after_due,
                    after_question,
                    i64::try_from(limit).unwrap_or(i64::MAX)
                ],
                review_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(reviews)
    }

    fn reviews_for_user(&self, user_id: UserId) -> CoreResult<Vec<ReviewState>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, question_id, last_review_at, next_review_at
             FROM reviews
             WHERE user_id = ?1
             ORDER BY next_review_at ASC, question_id ASC",
        )?;

        let reviews = stmt
            .query_map(params![user_id.get()], review_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(reviews)
    }
}

impl DigestStore for SqliteStore {
    fn load_digest(&self, user_id: UserId) -> CoreResult<Option<Versioned<ChangeDigest>>> {
        let conn = self.lock()?;
        let digest = conn
            .query_row(
                "SELECT user_id, hash_value, updated_at, version
                 FROM user_data_hashes WHERE user_id = ?1",
                params![user_id.get()],
                digest_from_row,
            )
            .optional()?;
        Ok(digest)
    }

    fn save_digest(
        &self,
        digest: &ChangeDigest,
        expected_version: Option<u64>,
    ) -> CoreResult<u64> {
        let conn = self.lock()?;
        let user_id = digest.user_id.get();
        let hash = digest.hash_value.to_hex();
        let updated_at = digest.updated_at.timestamp_millis();

        let (changed, version) = match expected_version {
            None => {
                let changed = conn.execute(
                    "INSERT INTO user_data_hashes (user_id, hash_value, updated_at, version)
                     VALUES (?1, ?2, ?3, 1)
                     ON CONFLICT (user_id) DO NOTHING",
                    params![user_id, hash, updated_at],
                )?;
                (changed, 1)
            }
            Some(expected) => {
                let changed = conn.execute(
                    "UPDATE user_data_hashes
                     SET hash_value = ?2, updated_at = ?3, version = version + 1
                     WHERE user_id = ?1 AND version = ?4",
                    params![user_id, hash, updated_at, expected as i64],
                )?;
                (changed, expected + 1)
            }
        };

        if changed == 0 {
            return Err(CoreError::StorageConflict(format!(
                "user_data_hashes({user_id})"
            )));
        }
        Ok(version)
    }
}

impl StudySetStore for SqliteStore {
    fn load_study_set(&self, set_id: StudySetId) -> CoreResult<Option<StudySet>> {
        let conn = self.lock()?;
        let header = conn
            .query_row(
                "SELECT set_id, owner_user_id, name, is_public, updated_at
                 FROM study_sets WHERE set_id = ?1",
                params![set_id.get()],
                |row| {
                    let mut set = StudySet::new(
                        StudySetId(row.get(0)?),
                        UserId(row.get(1)?),
                        row.get::<_, String>(2)?,
                        millis_column(row, 4)?,
                    );
                    set.is_public = row.get(3)?;
                    Ok(set)
                },
            )
            .optional()?;

        let Some(set) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT question_id FROM study_set_questions
             WHERE set_id = ?1
             ORDER BY sort_order ASC",
        )?;
        let questions = stmt
            .query_map(params![set_id.get()], |row| Ok(QuestionId(row.get(0)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(set.with_questions(questions)))
    }

    fn save_study_set(&self, set: &StudySet) -> CoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO study_sets (set_id, owner_user_id, name, is_public, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (set_id) DO UPDATE SET
                owner_user_id = excluded.owner_user_id,
                name = excluded.name,
                is_public = excluded.is_public,
                updated_at = excluded.updated_at",
            params![
                set.set_id.get(),
                set.owner_user_id.get(),
                set.name,
                set.is_public,
                set.updated_at.timestamp_millis()
            ],
        )?;

        tx.execute(
            "DELETE FROM study_set_questions WHERE set_id = ?1",
            params![set.set_id.get()],
        )?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO study_set_questions (set_id, question_id, sort_order)
                 VALUES (?1, ?2, ?3)",
            )?;
            for (position, question_id) in set.questions().iter().enumerate() {
                insert.execute(params![set.set_id.get(), question_id.get(), position as i64])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

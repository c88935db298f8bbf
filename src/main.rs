use chrono::{TimeDelta, Utc};
use quiz_core::models::{Elapsed, QuestionId, UserId};
use quiz_core::*;
use tracing_subscriber::EnvFilter;

fn main() -> CoreResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => CoreConfig::from_json_file(path)?,
        None => CoreConfig::default(),
    };

    let store = SqliteStore::open(&config.database_path)?;
    let core = StudyCore::new(store.clone(), &config);

    let user = UserId(1);
    let now = Utc::now();

    if core.tracker().digest(user)?.hash_value == DigestValue::EMPTY {
        store.register_user(user, "demo", now)?;
        for (id, prompt) in [(1, "TCP port for HTTPS?"), (2, "OSI layer of IP?"), (3, "CIDR of /24?")] {
            store.register_question(QuestionId(id), user, prompt, now)?;
        }

        for (id, correct) in [(1, true), (2, false), (3, true)] {
            let event = AnswerEvent {
                user_id: user,
                question_id: QuestionId(id),
                is_correct: correct,
                elapsed: Elapsed::from_millis(4_000)?,
                answered_at: now,
            };
            core.record_answer(&event)?;
        }
        tracing::info!("sample data created");
    }

    let as_of = now + TimeDelta::days(1);
    let due = core.due_questions(user, as_of)?;
    let digest = core.tracker().digest(user)?;

    tracing::info!(
        user_id = %user,
        due = due.len(),
        hash_value = %digest.hash_value,
        updated_at = %digest.updated_at,
        "loaded schedule"
    );
    for question_id in due {
        tracing::info!(%question_id, "due for review by {as_of}");
    }

    Ok(())
}

//! Review sessions: pick a set of items, grade typed answers, persist progress.

use chrono::{DateTime, NaiveDate, Utc};
use memora_core::sync::SaveProgressRequest;
use memora_core::{
    grade_answer, process_correct_answer, process_wrong_answer, select_items_for_review,
    ItemProgress, MatchResult, Reviewable,
};
use rand::Rng;

use crate::db::{DbError, ProgressRepository};

/// Prompt and expected answer of one item in a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemContent {
    pub item_id: i64,
    pub prompt: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionItem {
    pub content: ItemContent,
    pub progress: ItemProgress,
}

impl Reviewable for SessionItem {
    fn progress(&self) -> &ItemProgress {
        &self.progress
    }
}

/// What happened when an answer was submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub item_id: i64,
    pub grade: MatchResult,
    pub previous: ItemProgress,
    pub updated: ItemProgress,
}

/// Aggregate reported to the server when a session ends.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionSummary {
    /// Number of correct answers.
    pub score: u32,
    pub total_questions: u32,
    pub time_spent_secs: u64,
    pub completed_at: DateTime<Utc>,
}

impl SessionSummary {
    pub fn to_save_request(&self, package_uuid: &str) -> SaveProgressRequest {
        SaveProgressRequest {
            package_uuid: package_uuid.to_string(),
            score: self.score,
            total_questions: self.total_questions,
            completed_at: Some(self.completed_at),
            time_spent: self.time_spent_secs,
        }
    }
}

#[derive(Debug)]
pub struct ReviewSession {
    owner_id: String,
    items: Vec<SessionItem>,
    position: usize,
    correct: u32,
    started_at: DateTime<Utc>,
}

impl ReviewSession {
    /// Register unseen items, then select up to `count` of them for `today`.
    pub fn start<P, R>(
        repo: &P,
        owner_id: &str,
        contents: Vec<ItemContent>,
        count: usize,
        today: NaiveDate,
        started_at: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Self, DbError>
    where
        P: ProgressRepository + ?Sized,
        R: Rng + ?Sized,
    {
        let mut candidates = Vec::with_capacity(contents.len());
        for content in contents {
            let progress = repo.add_item(owner_id, content.item_id, today)?;
            candidates.push(SessionItem { content, progress });
        }

        let items = select_items_for_review(&candidates, count, today, rng);
        tracing::debug!(
            owner = owner_id,
            candidates = candidates.len(),
            selected = items.len(),
            "review session started"
        );

        Ok(Self {
            owner_id: owner_id.to_string(),
            items,
            position: 0,
            correct: 0,
            started_at,
        })
    }

    pub fn items(&self) -> &[SessionItem] {
        &self.items
    }

    /// The item waiting for an answer, if any.
    pub fn current(&self) -> Option<&SessionItem> {
        self.items.get(self.position)
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.items.len()
    }

    /// Grade an answer for the current item and store the new progress.
    ///
    /// Returns `None` once every item has been answered.
    pub fn answer<P>(
        &mut self,
        repo: &P,
        user_answer: &str,
        today: NaiveDate,
    ) -> Result<Option<AnswerOutcome>, DbError>
    where
        P: ProgressRepository + ?Sized,
    {
        let Some(item) = self.items.get_mut(self.position) else {
            return Ok(None);
        };

        let grade = grade_answer(user_answer, &item.content.answer);
        let previous = item.progress.clone();
        let updated = if grade.is_correct {
            process_correct_answer(&previous, today)
        } else {
            process_wrong_answer(&previous, today)
        };

        repo.save_item_progress(&self.owner_id, item.content.item_id, &updated)?;
        item.progress = updated.clone();

        if grade.is_correct {
            self.correct += 1;
        }
        self.position += 1;

        Ok(Some(AnswerOutcome {
            item_id: item.content.item_id,
            grade,
            previous,
            updated,
        }))
    }

    pub fn finish(&self, completed_at: DateTime<Utc>) -> SessionSummary {
        let elapsed = (completed_at - self.started_at).num_seconds().max(0);
        SessionSummary {
            score: self.correct,
            total_questions: u32::try_from(self.position).unwrap_or(u32::MAX),
            time_spent_secs: elapsed.unsigned_abs(),
            completed_at,
        }
    }
}

//! Spaced-repetition engine shared by the client and the sync server.
//!
//! Provides:
//! - Score/interval transitions for correct and wrong answers, and decay
//! - Review-set selection (urgent, weak, weighted-random fill)
//! - Typo-tolerant answer matching (Levenshtein distance)
//! - Calendar-day parsing and the sync protocol's wire types

pub mod dates;
pub mod error;
pub mod matching;
pub mod scheduling;
pub mod selection;
pub mod sync;
pub mod types;

pub use error::{CoreError, Result};
pub use matching::{check_answer, grade_answer, levenshtein_distance, typo_tolerance, MatchResult};
pub use scheduling::{apply_decay, decay_amount, process_correct_answer, process_wrong_answer};
pub use selection::select_items_for_review;
pub use types::{is_mastered, DecayPolicy, ItemProgress, Reviewable};

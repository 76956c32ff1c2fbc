//! Turns a blueprint into a concrete, randomized question pool.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::core::config::ShortfallPolicy;
use crate::db::models::Question;
use crate::db::types::Difficulty;
use crate::services::error::EngineError;
use crate::services::store::QuestionBank;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Shortfall {
    pub(crate) chapter: i32,
    pub(crate) difficulty: Difficulty,
    pub(crate) requested: usize,
    pub(crate) available: usize,
}

#[derive(Debug)]
pub(crate) struct Selection {
    pub(crate) questions: Vec<Question>,
    pub(crate) shortfalls: Vec<Shortfall>,
}

/// Picks `count` random questions per (chapter, difficulty) bucket, then
/// shuffles the whole pool so bucket order is not observable.
///
/// A question id is never selected twice, even when a blueprint repeats a
/// chapter.
pub(crate) async fn select_questions(
    bank: &dyn QuestionBank,
    blueprint_id: i64,
    policy: ShortfallPolicy,
    rng: &mut StdRng,
) -> Result<Selection, EngineError> {
    let blueprint =
        bank.get_blueprint(blueprint_id).await?.ok_or(EngineError::NotFound("blueprint"))?;

    if blueprint.chapters.is_empty() {
        return Err(EngineError::NoChaptersDefined);
    }

    let mut selected_ids = HashSet::new();
    let mut pool = Vec::with_capacity(blueprint.chapters.iter().map(|c| c.total()).sum());
    let mut shortfalls = Vec::new();

    for requirement in &blueprint.chapters {
        for difficulty in Difficulty::ALL {
            let requested = requirement.count_for(difficulty);
            if requested == 0 {
                continue;
            }

            let mut candidates = bank
                .find_questions(blueprint.subject_id, requirement.chapter, difficulty)
                .await?
                .into_iter()
                .filter(|question| !selected_ids.contains(&question.id))
                .collect::<Vec<_>>();

            if candidates.len() < requested {
                let shortfall = Shortfall {
                    chapter: requirement.chapter,
                    difficulty,
                    requested,
                    available: candidates.len(),
                };

                match policy {
                    ShortfallPolicy::Fail => {
                        return Err(EngineError::InsufficientQuestions {
                            chapter: shortfall.chapter,
                            difficulty,
                            requested,
                            available: shortfall.available,
                        });
                    }
                    ShortfallPolicy::Allow => {
                        tracing::warn!(
                            blueprint_id,
                            chapter = shortfall.chapter,
                            difficulty = difficulty.as_str(),
                            requested,
                            available = shortfall.available,
                            "Question bank cannot fill blueprint bucket; under-filling"
                        );
                        metrics::counter!("selection_shortfalls_total").increment(1);
                        shortfalls.push(shortfall);
                    }
                }
            }

            candidates.shuffle(rng);
            candidates.truncate(requested);

            for question in candidates {
                selected_ids.insert(question.id);
                pool.push(question);
            }
        }
    }

    pool.shuffle(rng);

    Ok(Selection { questions: pool, shortfalls })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;

    use super::*;
    use crate::db::models::ChapterRequirement;
    use crate::test_support::{self, MemoryStore};

    fn requirement(
        chapter: i32,
        easy: i32,
        medium: i32,
        hard: i32,
        very_hard: i32,
    ) -> ChapterRequirement {
        test_support::chapter(chapter, [easy, medium, hard, very_hard])
    }

    fn seeded_bank() -> MemoryStore {
        let store = MemoryStore::default();
        for chapter in 1..=2 {
            for difficulty in Difficulty::ALL {
                for _ in 0..5 {
                    store.add_question(test_support::question(1, chapter, difficulty, "a*|b|c"));
                }
            }
        }
        store
    }

    #[tokio::test]
    async fn selects_exactly_the_requested_counts() {
        let store = seeded_bank();
        let blueprint =
            store.add_blueprint(1, vec![requirement(1, 2, 1, 1, 0), requirement(2, 0, 3, 0, 2)]);
        let mut rng = StdRng::seed_from_u64(7);

        let selection = select_questions(&store, blueprint, ShortfallPolicy::Fail, &mut rng)
            .await
            .expect("selection");

        assert_eq!(selection.questions.len(), 9);
        assert!(selection.shortfalls.is_empty());

        let count = |chapter: i32, difficulty: Difficulty| {
            selection
                .questions
                .iter()
                .filter(|q| q.chapter == chapter && q.difficulty == difficulty)
                .count()
        };
        assert_eq!(count(1, Difficulty::Easy), 2);
        assert_eq!(count(1, Difficulty::Medium), 1);
        assert_eq!(count(1, Difficulty::Hard), 1);
        assert_eq!(count(2, Difficulty::Medium), 3);
        assert_eq!(count(2, Difficulty::VeryHard), 2);
    }

    #[tokio::test]
    async fn never_selects_a_question_twice() {
        let store = seeded_bank();
        let blueprint =
            store.add_blueprint(1, vec![requirement(1, 3, 0, 0, 0), requirement(1, 2, 0, 0, 0)]);
        let mut rng = StdRng::seed_from_u64(3);

        let selection = select_questions(&store, blueprint, ShortfallPolicy::Fail, &mut rng)
            .await
            .expect("selection");

        let ids = selection.questions.iter().map(|q| q.id).collect::<HashSet<_>>();
        assert_eq!(ids.len(), selection.questions.len());
        assert_eq!(ids.len(), 5);
    }

    #[tokio::test]
    async fn shortfall_fails_under_strict_policy() {
        let store = seeded_bank();
        let blueprint = store.add_blueprint(1, vec![requirement(2, 0, 0, 6, 0)]);
        let mut rng = StdRng::seed_from_u64(1);

        let err = select_questions(&store, blueprint, ShortfallPolicy::Fail, &mut rng)
            .await
            .expect_err("shortfall");

        assert!(matches!(
            err,
            EngineError::InsufficientQuestions {
                chapter: 2,
                difficulty: Difficulty::Hard,
                requested: 6,
                available: 5
            }
        ));
    }

    #[tokio::test]
    async fn shortfall_underfills_when_allowed() {
        let store = seeded_bank();
        let blueprint = store.add_blueprint(1, vec![requirement(2, 1, 0, 6, 0)]);
        let mut rng = StdRng::seed_from_u64(1);

        let selection = select_questions(&store, blueprint, ShortfallPolicy::Allow, &mut rng)
            .await
            .expect("selection");

        assert_eq!(selection.questions.len(), 6);
        assert_eq!(
            selection.shortfalls,
            vec![Shortfall { chapter: 2, difficulty: Difficulty::Hard, requested: 6, available: 5 }]
        );
    }

    #[tokio::test]
    async fn unknown_blueprint_and_empty_blueprint_fail() {
        let store = seeded_bank();
        let mut rng = StdRng::seed_from_u64(1);

        let err = select_questions(&store, 999, ShortfallPolicy::Fail, &mut rng).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound("blueprint")));

        let empty = store.add_blueprint(1, Vec::new());
        let err =
            select_questions(&store, empty, ShortfallPolicy::Fail, &mut rng).await.unwrap_err();
        assert!(matches!(err, EngineError::NoChaptersDefined));
    }

    #[tokio::test]
    async fn same_seed_reproduces_the_same_pool() {
        let store = seeded_bank();
        let blueprint =
            store.add_blueprint(1, vec![requirement(1, 2, 2, 2, 2), requirement(2, 2, 2, 2, 2)]);

        let mut first = StdRng::seed_from_u64(99);
        let mut second = StdRng::seed_from_u64(99);
        let a = select_questions(&store, blueprint, ShortfallPolicy::Fail, &mut first)
            .await
            .unwrap();
        let b = select_questions(&store, blueprint, ShortfallPolicy::Fail, &mut second)
            .await
            .unwrap();

        let ids = |s: &Selection| s.questions.iter().map(|q| q.id).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }

    #[tokio::test]
    async fn bucket_order_is_not_observable_in_the_pool() {
        let store = seeded_bank();
        let blueprint =
            store.add_blueprint(1, vec![requirement(1, 2, 0, 0, 0), requirement(2, 0, 0, 0, 2)]);

        let mut leading_chapters = HashSet::new();
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let selection = select_questions(&store, blueprint, ShortfallPolicy::Fail, &mut rng)
                .await
                .unwrap();
            leading_chapters.insert(selection.questions[0].chapter);
        }

        assert_eq!(leading_chapters.len(), 2);
    }
}

use crate::error::{EngineError, Result};
use crate::mastery::EXPECTED_ANSWER_SECONDS;
use crate::models::{Attempt, DifficultyAdjustment};

/// Attempts considered per decision, newest last.
pub const WINDOW: usize = 5;

const MIN_DIFFICULTY: u8 = 1;
const MAX_DIFFICULTY: u8 = 5;
const FUNDAMENTALS_CAP: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Streaks {
    pub correct: usize,
    pub wrong: usize,
}

/// Trailing run of identical outcomes ending at the newest attempt.
pub fn trailing_streaks(attempts: &[Attempt]) -> Streaks {
    let Some(last) = attempts.last() else {
        return Streaks::default();
    };
    let run = attempts
        .iter()
        .rev()
        .take_while(|attempt| attempt.correct == last.correct)
        .count();
    if last.correct {
        Streaks { correct: run, wrong: 0 }
    } else {
        Streaks { correct: 0, wrong: run }
    }
}

/// Proposes the next question difficulty from the recent attempts on one
/// knowledge point. `mastery_level` is `None` when the learner has no record yet.
pub fn adjust(
    current: u8,
    recent: &[Attempt],
    mastery_level: Option<u8>,
) -> Result<DifficultyAdjustment> {
    if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&current) {
        return Err(EngineError::InvalidInput(format!(
            "difficulty {current} outside {MIN_DIFFICULTY}-{MAX_DIFFICULTY}"
        )));
    }

    let window = &recent[recent.len().saturating_sub(WINDOW)..];
    let streaks = trailing_streaks(window);

    let (mut next, mut reason) = if streaks.correct >= 3 {
        ((current + 1).min(MAX_DIFFICULTY), "performing well, try harder")
    } else if streaks.wrong >= 2 {
        ((current - 1).max(MIN_DIFFICULTY), "struggling, step down")
    } else {
        (current, "hold steady")
    };

    if window.len() >= 3 && streaks.correct >= 2 {
        let avg_time = window
            .iter()
            .map(|attempt| attempt.answer_time_seconds)
            .sum::<f64>()
            / window.len() as f64;
        if avg_time < EXPECTED_ANSWER_SECONDS / 2.0 {
            next = (next + 1).min(MAX_DIFFICULTY);
            reason = "fast and accurate, raise the bar";
        }
    }

    if mastery_level.is_some_and(|level| level <= 1) && next > FUNDAMENTALS_CAP {
        next = FUNDAMENTALS_CAP;
        reason = "build fundamentals first";
    }

    Ok(DifficultyAdjustment {
        new_difficulty: next,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempts(outcomes: &[(bool, f64)]) -> Vec<Attempt> {
        outcomes
            .iter()
            .map(|(correct, seconds)| Attempt {
                correct: *correct,
                answer_time_seconds: *seconds,
            })
            .collect()
    }

    #[test]
    fn streaks_are_measured_from_the_newest_attempt() {
        let window = attempts(&[(true, 20.0), (false, 20.0), (true, 20.0), (true, 20.0)]);
        assert_eq!(trailing_streaks(&window), Streaks { correct: 2, wrong: 0 });
        let window = attempts(&[(true, 20.0), (false, 20.0), (false, 20.0)]);
        assert_eq!(trailing_streaks(&window), Streaks { correct: 0, wrong: 2 });
        assert_eq!(trailing_streaks(&[]), Streaks::default());
    }

    #[test]
    fn three_correct_steps_up() {
        let window = attempts(&[(true, 25.0), (true, 25.0), (true, 25.0)]);
        let adjustment = adjust(3, &window, Some(3)).unwrap();
        assert_eq!(adjustment.new_difficulty, 4);
        assert_eq!(adjustment.reason, "performing well, try harder");
    }

    #[test]
    fn two_wrong_steps_down() {
        let window = attempts(&[(true, 25.0), (false, 25.0), (false, 25.0)]);
        let adjustment = adjust(3, &window, Some(3)).unwrap();
        assert_eq!(adjustment.new_difficulty, 2);
        assert_eq!(adjustment.reason, "struggling, step down");
        assert_eq!(adjust(1, &window, Some(3)).unwrap().new_difficulty, 1);
    }

    #[test]
    fn mixed_results_hold() {
        let window = attempts(&[(false, 25.0), (true, 25.0)]);
        let adjustment = adjust(3, &window, Some(2)).unwrap();
        assert_eq!(adjustment.new_difficulty, 3);
        assert_eq!(adjustment.reason, "hold steady");
    }

    #[test]
    fn fast_and_accurate_gets_an_extra_step() {
        let window = attempts(&[(false, 10.0), (true, 8.0), (true, 9.0)]);
        let adjustment = adjust(3, &window, Some(3)).unwrap();
        assert_eq!(adjustment.new_difficulty, 4);
        assert_eq!(adjustment.reason, "fast and accurate, raise the bar");

        let window = attempts(&[(true, 8.0), (true, 8.0), (true, 9.0)]);
        assert_eq!(adjust(3, &window, Some(4)).unwrap().new_difficulty, 5);
        assert_eq!(adjust(5, &window, Some(4)).unwrap().new_difficulty, 5);
    }

    #[test]
    fn low_mastery_caps_difficulty() {
        let window = attempts(&[(true, 8.0), (true, 8.0), (true, 9.0)]);
        for level in [0, 1] {
            let adjustment = adjust(4, &window, Some(level)).unwrap();
            assert_eq!(adjustment.new_difficulty, 2);
            assert_eq!(adjustment.reason, "build fundamentals first");
        }
        assert_eq!(adjust(4, &window, None).unwrap().new_difficulty, 5);
    }

    #[test]
    fn only_the_newest_five_attempts_count() {
        let window = attempts(&[
            (false, 25.0),
            (false, 25.0),
            (true, 25.0),
            (true, 25.0),
            (true, 25.0),
            (true, 25.0),
            (false, 25.0),
        ]);
        let adjustment = adjust(3, &window, Some(3)).unwrap();
        assert_eq!(adjustment.new_difficulty, 3);
    }

    #[test]
    fn rejects_out_of_range_difficulty() {
        assert!(adjust(0, &[], None).is_err());
        assert!(adjust(6, &[], None).is_err());
    }
}

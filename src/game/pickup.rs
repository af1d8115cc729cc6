//! Stick Pick-Up Game
//!
//! The bundled [`GameRules`] implementation: a heap of sticks, each turn
//! removes 1 to [`MAX_TAKE`], whoever takes the last stick wins. Small
//! enough to exercise every part of the turn-exchange core (legal moves,
//! winning moves, illegal-move losses) without game-specific noise.

use super::{GameRules, Outcome};

/// Most sticks one move may remove.
pub const MAX_TAKE: u32 = 3;

/// Smallest starting heap.
pub const MIN_HEAP: u32 = 15;

/// Largest starting heap.
pub const MAX_HEAP: u32 = 30;

/// Board state of one pick-up match.
#[derive(Debug)]
pub struct PickUp {
    remaining: u32,
}

impl PickUp {
    /// Build the heap from a game seed (same seed, same heap).
    pub fn from_seed(seed: u32) -> Self {
        Self {
            remaining: MIN_HEAP + seed % (MAX_HEAP - MIN_HEAP + 1),
        }
    }

    /// Sticks still on the table.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl GameRules for PickUp {
    fn apply(&mut self, payload: &str) -> (Outcome, String) {
        let take: u32 = match payload.trim().parse() {
            Ok(n) => n,
            Err(_) => {
                return (
                    Outcome::Lose,
                    format!("Invalid move '{}': expected a number", payload.trim()),
                );
            }
        };

        if take == 0 || take > MAX_TAKE {
            return (
                Outcome::Lose,
                format!("Invalid move: must take between 1 and {} sticks", MAX_TAKE),
            );
        }
        if take > self.remaining {
            return (
                Outcome::Lose,
                format!("Invalid move: only {} sticks left", self.remaining),
            );
        }

        self.remaining -= take;
        if self.remaining == 0 {
            (Outcome::Win, "Last stick taken".to_string())
        } else {
            (Outcome::Continue, String::new())
        }
    }

    fn game_data(&self) -> String {
        self.remaining.to_string()
    }

    fn data_size(&self) -> String {
        // one integer
        "1".to_string()
    }

    fn display(&self) -> String {
        format!("{} sticks: {}", self.remaining, "|".repeat(self.remaining as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_from_seed_in_range() {
        for seed in [0, 1, 0x123456, crate::core::MAX_SEED] {
            let game = PickUp::from_seed(seed);
            assert!((MIN_HEAP..=MAX_HEAP).contains(&game.remaining()));
        }
    }

    #[test]
    fn test_legal_move_continues() {
        let mut game = PickUp::from_seed(0);
        let before = game.remaining();
        let (outcome, msg) = game.apply("2");
        assert_eq!(outcome, Outcome::Continue);
        assert!(msg.is_empty());
        assert_eq!(game.remaining(), before - 2);
    }

    #[test]
    fn test_last_stick_wins() {
        let mut game = PickUp { remaining: 3 };
        let (outcome, msg) = game.apply("3");
        assert_eq!(outcome, Outcome::Win);
        assert!(!msg.is_empty());
        assert_eq!(game.remaining(), 0);
    }

    #[test]
    fn test_illegal_moves_lose() {
        let mut game = PickUp { remaining: 2 };
        assert_eq!(game.apply("0").0, Outcome::Lose);
        assert_eq!(game.apply("4").0, Outcome::Lose);
        assert_eq!(game.apply("3").0, Outcome::Lose); // more than remaining
        assert_eq!(game.apply("banana").0, Outcome::Lose);
    }

    #[test]
    fn test_data_strings() {
        let game = PickUp { remaining: 5 };
        assert_eq!(game.game_data(), "5");
        assert_eq!(game.data_size(), "1");
        assert_eq!(game.display(), "5 sticks: |||||");
    }
}

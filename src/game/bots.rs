//! Training Players
//!
//! Server-local opponents a client can request by name in `WAIT_GAME`.
//! A bot reads the same plain-text game data a remote client would receive
//! and answers with a move payload, synchronously on the calling task.

use rand::Rng;

use super::pickup::MAX_TAKE;

/// A synchronous, in-process move source.
pub trait Bot: Send {
    /// Compute the next move from the current game data string.
    fn choose_move(&mut self, game_data: &str) -> String;
}

/// Look up a training player by its wire name.
///
/// Returns `None` for unknown names; the caller turns that into a
/// client-visible rejection.
pub fn training_player(kind: &str) -> Option<Box<dyn Bot>> {
    match kind {
        "PLAY_RANDOM" => Some(Box::new(RandomBot)),
        "GREEDY" => Some(Box::new(GreedyBot)),
        _ => None,
    }
}

fn parse_remaining(game_data: &str) -> u32 {
    game_data.trim().parse().unwrap_or(1)
}

/// Takes a uniformly random legal number of sticks.
struct RandomBot;

impl Bot for RandomBot {
    fn choose_move(&mut self, game_data: &str) -> String {
        let remaining = parse_remaining(game_data);
        let max = MAX_TAKE.min(remaining).max(1);
        rand::thread_rng().gen_range(1..=max).to_string()
    }
}

/// Plays the optimal strategy: leave a multiple of `MAX_TAKE + 1`.
struct GreedyBot;

impl Bot for GreedyBot {
    fn choose_move(&mut self, game_data: &str) -> String {
        let remaining = parse_remaining(game_data);
        let take = remaining % (MAX_TAKE + 1);
        if take == 0 { 1 } else { take }.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_training_players() {
        assert!(training_player("PLAY_RANDOM").is_some());
        assert!(training_player("GREEDY").is_some());
        assert!(training_player("DO_EVERYTHING").is_none());
    }

    #[test]
    fn test_random_bot_stays_legal() {
        let mut bot = training_player("PLAY_RANDOM").unwrap();
        for remaining in 1..=10u32 {
            let take: u32 = bot.choose_move(&remaining.to_string()).parse().unwrap();
            assert!(take >= 1);
            assert!(take <= MAX_TAKE.min(remaining));
        }
    }

    #[test]
    fn test_greedy_bot_leaves_multiple_of_four() {
        let mut bot = training_player("GREEDY").unwrap();
        assert_eq!(bot.choose_move("7"), "3");
        assert_eq!(bot.choose_move("6"), "2");
        assert_eq!(bot.choose_move("5"), "1");
        // already a losing position, takes the minimum
        assert_eq!(bot.choose_move("8"), "1");
    }

    #[test]
    fn test_greedy_bot_takes_last_stick() {
        let mut bot = training_player("GREEDY").unwrap();
        assert_eq!(bot.choose_move("3"), "3");
        assert_eq!(bot.choose_move("1"), "1");
    }
}

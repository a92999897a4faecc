//! Room state rules
//!
//! Status only moves forward (`setup -> waiting -> starting -> in_progress`),
//! and only the recorded host may move a fully ready room into play.

use crate::error::{Result, RoomError};
use crate::types::{GameStatus, RoomPlayer, RoomState, Seat};

/// Check that `from -> to` is a forward transition
pub fn check_transition(from: GameStatus, to: GameStatus) -> Result<()> {
    if to <= from {
        return Err(RoomError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
        .into());
    }
    Ok(())
}

impl RoomState {
    pub fn player(&self, user_id: &str) -> Option<&RoomPlayer> {
        self.players.iter().find(|player| player.id == user_id)
    }

    pub fn is_seated(&self, user_id: &str) -> bool {
        self.player(user_id).is_some()
    }

    /// Whether `user_id` is the room's recorded host
    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id.as_deref() == Some(user_id)
    }

    /// True when at least one player is seated and every player is ready
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|player| player.is_ready)
    }

    /// First seat in north, east, south, west order nobody occupies
    pub fn next_free_seat(&self) -> Option<Seat> {
        Seat::ALL
            .into_iter()
            .find(|seat| !self.players.iter().any(|p| p.position == Some(*seat)))
    }

    /// Preconditions for `user_id` starting the game, checked in the order
    /// host, readiness, status
    pub fn check_can_start(&self, user_id: &str) -> Result<()> {
        if !self.is_host(user_id) {
            return Err(RoomError::NotHost.into());
        }

        if !self.all_ready() {
            return Err(RoomError::PlayersNotReady.into());
        }

        check_transition(self.status, GameStatus::InProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GameMode, GameType};
    use crate::utils::generate_room_id;

    fn player(id: &str, is_ready: bool, position: Option<Seat>) -> RoomPlayer {
        RoomPlayer {
            id: id.to_string(),
            name: id.to_string(),
            avatar: None,
            is_ready,
            is_host: id == "host",
            position,
        }
    }

    fn room(players: Vec<RoomPlayer>) -> RoomState {
        RoomState {
            id: generate_room_id(),
            status: GameStatus::Waiting,
            players,
            game_mode: GameMode::Practice,
            game_type: GameType::Partnered,
            wager_amount: None,
            host_id: Some("host".to_string()),
            current_phase: None,
        }
    }

    #[test]
    fn test_transitions_only_move_forward() {
        assert!(check_transition(GameStatus::Setup, GameStatus::Waiting).is_ok());
        assert!(check_transition(GameStatus::Waiting, GameStatus::InProgress).is_ok());
        assert!(check_transition(GameStatus::InProgress, GameStatus::Waiting).is_err());
        assert!(check_transition(GameStatus::Waiting, GameStatus::Waiting).is_err());
    }

    #[test]
    fn test_empty_room_is_not_all_ready() {
        assert!(!room(vec![]).all_ready());
    }

    #[test]
    fn test_start_preconditions_in_order() {
        let state = room(vec![
            player("host", true, Some(Seat::North)),
            player("guest", false, Some(Seat::East)),
        ]);

        let err = state.check_can_start("guest").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RoomError>(),
            Some(RoomError::NotHost)
        ));

        let err = state.check_can_start("host").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RoomError>(),
            Some(RoomError::PlayersNotReady)
        ));
    }

    #[test]
    fn test_started_room_cannot_start_again() {
        let mut state = room(vec![player("host", true, Some(Seat::North))]);
        assert!(state.check_can_start("host").is_ok());

        state.status = GameStatus::InProgress;
        let err = state.check_can_start("host").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RoomError>(),
            Some(RoomError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_next_free_seat_fills_gaps() {
        let state = room(vec![
            player("host", false, Some(Seat::North)),
            player("a", false, Some(Seat::South)),
        ]);
        assert_eq!(state.next_free_seat(), Some(Seat::East));

        let full = room(
            Seat::ALL
                .into_iter()
                .enumerate()
                .map(|(i, seat)| player(&format!("p{}", i), false, Some(seat)))
                .collect(),
        );
        assert_eq!(full.next_free_seat(), None);
    }
}

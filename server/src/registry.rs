use heli_shared::protocol::{Player, PlayerUpdate};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("duplicate connection id {0}")]
    DuplicateConnection(String),
}

/// Authoritative store of connected players, in join order. Join order is
/// also broadcast order.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: Vec<Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self {
            players: Vec::new(),
        }
    }

    pub fn add(&mut self, player: Player) -> Result<(), SessionError> {
        if self.players.iter().any(|p| p.id == player.id) {
            return Err(SessionError::DuplicateConnection(player.id));
        }
        self.players.push(player);
        Ok(())
    }

    /// Merge a partial update into the matching record. Returns false when the
    /// id is unknown; a stale update never creates a record.
    pub fn apply_update(&mut self, update: &PlayerUpdate) -> bool {
        match self.players.iter_mut().find(|p| p.id == update.id) {
            Some(player) => {
                player.merge(update);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == id)?;
        Some(self.players.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Defensive copy for broadcast payloads, in join order.
    pub fn snapshot(&self) -> Vec<Player> {
        self.players.clone()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

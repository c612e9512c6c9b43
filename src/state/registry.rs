use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::{Mutex, MutexGuard};

use crate::{
    config::MatchSettings,
    services::phase_timers::RoomTimers,
    state::{
        participant::{MatchId, PlayerId},
        room::MatchRoom,
    },
};

/// Room state together with the timer tasks it armed. Always accessed under [`RoomHandle`]'s lock.
#[derive(Debug)]
pub struct LiveRoom {
    pub room: MatchRoom,
    pub timers: RoomTimers,
}

/// Shared handle to one live room. The mutex serializes every event for the room.
#[derive(Debug)]
pub struct RoomHandle {
    match_id: MatchId,
    live: Mutex<LiveRoom>,
}

impl RoomHandle {
    fn new(room: MatchRoom) -> Self {
        Self {
            match_id: room.match_id().clone(),
            live: Mutex::new(LiveRoom {
                room,
                timers: RoomTimers::default(),
            }),
        }
    }

    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    /// Wait for exclusive access to the room.
    pub async fn lock(&self) -> MutexGuard<'_, LiveRoom> {
        self.live.lock().await
    }
}

/// All live rooms plus the player-to-room index used for `AlreadyInMatch` checks.
#[derive(Debug, Default)]
pub struct MatchRegistry {
    rooms: DashMap<MatchId, Arc<RoomHandle>>,
    players: DashMap<PlayerId, MatchId>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, match_id: &MatchId) -> Option<Arc<RoomHandle>> {
        self.rooms.get(match_id).map(|handle| handle.value().clone())
    }

    /// Register a room built elsewhere, e.g. by the matchmaking queue.
    pub fn insert(&self, room: MatchRoom) -> Arc<RoomHandle> {
        let handle = Arc::new(RoomHandle::new(room));
        self.rooms
            .insert(handle.match_id().clone(), handle.clone());
        handle
    }

    /// Look up a room, creating an empty one when the id is unknown.
    ///
    /// The flag is `true` when the room was created by this call.
    pub fn get_or_create(
        &self,
        match_id: &MatchId,
        settings: &MatchSettings,
    ) -> (Arc<RoomHandle>, bool) {
        match self.rooms.entry(match_id.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let room = MatchRoom::new(match_id.clone(), settings.clone());
                let handle = Arc::new(RoomHandle::new(room));
                entry.insert(handle.clone());
                (handle, true)
            }
        }
    }

    /// Remove a room and every player claim pointing at it.
    pub fn remove(&self, match_id: &MatchId) -> Option<Arc<RoomHandle>> {
        let removed = self.rooms.remove(match_id).map(|(_, handle)| handle);
        self.players.retain(|_, claimed| claimed != match_id);
        removed
    }

    /// Record that the player holds a seat in `match_id`.
    pub fn claim(&self, player_id: PlayerId, match_id: MatchId) {
        self.players.insert(player_id, match_id);
    }

    /// Drop the player's claim on `match_id`; claims on other rooms are kept.
    pub fn release(&self, player_id: &PlayerId, match_id: &MatchId) {
        self.players
            .remove_if(player_id, |_, claimed| claimed == match_id);
    }

    /// Room the player currently holds a live seat in.
    pub fn active_match_of(&self, player_id: &PlayerId) -> Option<MatchId> {
        let match_id = self.players.get(player_id)?.value().clone();
        if self.rooms.contains_key(&match_id) {
            Some(match_id)
        } else {
            self.players.remove(player_id);
            None
        }
    }

    /// Snapshot of every live room handle.
    pub fn handles(&self) -> Vec<Arc<RoomHandle>> {
        self.rooms.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_reuses_existing_rooms() {
        let registry = MatchRegistry::new();
        let settings = MatchSettings::default();
        let id = MatchId::new("m-1");
        let (first, created) = registry.get_or_create(&id, &settings);
        assert!(created);
        let (second, created) = registry.get_or_create(&id, &settings);
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn removing_a_room_drops_its_claims() {
        let registry = MatchRegistry::new();
        let id = MatchId::new("m-1");
        registry.get_or_create(&id, &MatchSettings::default());
        let player = PlayerId::new("p");
        registry.claim(player.clone(), id.clone());
        assert_eq!(registry.active_match_of(&player), Some(id.clone()));

        registry.release(&player, &MatchId::new("other"));
        assert_eq!(registry.active_match_of(&player), Some(id.clone()));

        registry.remove(&id);
        assert_eq!(registry.active_match_of(&player), None);
        assert!(registry.is_empty());
    }
}

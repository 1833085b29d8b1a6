//! Registry of all live rooms

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;

use super::entities::{PlayerId, RoomId};
use super::room::{Room, RoomError};

/// Shared handle to one room; the mutex is the room's single-writer guard
pub type RoomHandle = Arc<Mutex<Room>>;

/// Longest room code accepted from clients
pub const MAX_ROOM_ID_LEN: usize = 32;

/// Injected owner of every room, keyed by room code
pub struct RoomRegistry {
    rooms: DashMap<RoomId, RoomHandle>,
    /// Slots reserved against `max_rooms`; taken before insert, released on
    /// a failed insert or on destroy
    reserved: AtomicUsize,
    max_rooms: usize,
}

impl RoomRegistry {
    pub fn new(max_rooms: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            reserved: AtomicUsize::new(0),
            max_rooms,
        }
    }

    /// Room codes are short printable tokens
    pub fn validate_id(room_id: &str) -> Result<(), RoomError> {
        let valid = !room_id.is_empty()
            && room_id.len() <= MAX_ROOM_ID_LEN
            && room_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(())
        } else {
            Err(RoomError::InvalidId)
        }
    }

    /// Create a room with `host` seated, seeded from fresh entropy
    pub fn create(&self, room_id: &str, host: PlayerId) -> Result<RoomHandle, RoomError> {
        self.create_seeded(room_id, host, rand::random())
    }

    pub fn create_seeded(
        &self,
        room_id: &str,
        host: PlayerId,
        seed: u64,
    ) -> Result<RoomHandle, RoomError> {
        Self::validate_id(room_id)?;
        self.reserve()?;

        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(_) => {
                self.release();
                Err(RoomError::AlreadyExists(room_id.to_string()))
            }
            Entry::Vacant(slot) => {
                let handle = Arc::new(Mutex::new(Room::new(room_id.to_string(), host, seed)));
                slot.insert(handle.clone());
                info!(room_id, host_id = %host, seed, "Room created");
                Ok(handle)
            }
        }
    }

    fn reserve(&self) -> Result<(), RoomError> {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_rooms).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| RoomError::LimitReached(self.max_rooms))
    }

    fn release(&self) {
        self.reserved.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn get(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|r| r.value().clone())
    }

    pub fn destroy(&self, room_id: &str) -> Option<RoomHandle> {
        let removed = self.rooms.remove(room_id).map(|(_, h)| h);
        if removed.is_some() {
            self.release();
            info!(room_id, "Room destroyed");
        }
        removed
    }

    /// Point-in-time copy of every handle, so no shard lock is held while
    /// callers lock individual rooms
    pub fn handles(&self) -> Vec<(RoomId, RoomHandle)> {
        self.rooms
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.handles()
            .iter()
            .map(|(_, room)| room.lock().players.len())
            .sum()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn create_get_destroy() {
        let registry = RoomRegistry::new(4);
        let host = Uuid::new_v4();
        registry.create("alpha", host).unwrap();

        assert_eq!(
            registry.create("alpha", Uuid::new_v4()).err(),
            Some(RoomError::AlreadyExists("alpha".into()))
        );
        assert_eq!(registry.get("alpha").unwrap().lock().host_id, host);
        assert_eq!(registry.total_players(), 1);

        assert!(registry.destroy("alpha").is_some());
        assert!(registry.get("alpha").is_none());
        assert!(registry.destroy("alpha").is_none());
    }

    #[test]
    fn room_limit_enforced() {
        let registry = RoomRegistry::new(1);
        registry.create("a", Uuid::new_v4()).unwrap();
        assert_eq!(
            registry.create("b", Uuid::new_v4()).err(),
            Some(RoomError::LimitReached(1))
        );
    }

    #[test]
    fn limit_holds_under_concurrent_creates() {
        let registry = RoomRegistry::new(4);
        let created = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..16)
                .map(|i| {
                    let registry = &registry;
                    let room_id = format!("room-{i}");
                    scope.spawn(move || registry.create(&room_id, Uuid::new_v4()).is_ok())
                })
                .collect();
            workers
                .into_iter()
                .map(|w| w.join())
                .filter(|r| matches!(r, Ok(true)))
                .count()
        });
        assert_eq!(created, 4);
        assert_eq!(registry.active_rooms(), 4);

        assert_eq!(
            registry.create("room-x", Uuid::new_v4()).err(),
            Some(RoomError::LimitReached(4))
        );

        // Destroys and refused duplicates hand their slot back
        let mut ids: Vec<_> = registry.handles().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        registry.destroy(&ids[0]);
        assert_eq!(
            registry.create(&ids[1], Uuid::new_v4()).err(),
            Some(RoomError::AlreadyExists(ids[1].clone()))
        );
        assert!(registry.create("room-x", Uuid::new_v4()).is_ok());
    }

    #[test]
    fn room_codes_validated() {
        assert!(RoomRegistry::validate_id("room-42_x").is_ok());
        assert_eq!(RoomRegistry::validate_id(""), Err(RoomError::InvalidId));
        assert_eq!(RoomRegistry::validate_id("has space"), Err(RoomError::InvalidId));
        assert_eq!(RoomRegistry::validate_id(&"x".repeat(33)), Err(RoomError::InvalidId));
    }

    #[test]
    fn same_seed_same_map() {
        let registry = RoomRegistry::new(4);
        let a = registry.create_seeded("a", Uuid::new_v4(), 77).unwrap();
        let b = registry.create_seeded("b", Uuid::new_v4(), 77).unwrap();
        assert_eq!(a.lock().map.walls.walls(), b.lock().map.walls.walls());
    }
}

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::direction::Direction;

pub type AreaId = u32;

/// Area new players are placed in when nothing better is known.
pub const DEFAULT_START_AREA: AreaId = 1;

pub const DEFAULT_PLAYER_NAME: &str = "Nobody";
pub const DEFAULT_DESCRIPTION: &str = "A rather ordinary looking player.";

/// Opaque handle the messaging layer resolves to a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutboxId(pub u64);

impl OutboxId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for OutboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Area {
    pub id: AreaId,
    pub title: String,
    pub description: String,
    /// Destination area per [`Direction`] slot; 0 means no exit.
    pub exits: [AreaId; Direction::COUNT],
    pub items: Vec<String>,
    /// Occupants: lowercased name -> display name.
    pub players: BTreeMap<String, String>,
}

impl Area {
    pub fn exit(&self, dir: Direction) -> Option<AreaId> {
        match self.exits[dir.index()] {
            0 => None,
            id => Some(id),
        }
    }

    pub fn open_exits(&self) -> impl Iterator<Item = Direction> + '_ {
        Direction::all()
            .iter()
            .copied()
            .filter(|d| self.exit(*d).is_some())
    }

    pub fn has_item(&self, item: &str) -> bool {
        find_item(&self.items, item).is_some()
    }

    pub fn take_item(&mut self, item: &str) -> Option<String> {
        take_item(&mut self.items, item)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    /// Hex digest as persisted; see [`crate::validate::password_digest`].
    pub password_hash: String,
    pub description: String,
    pub location: AreaId,
    pub inventory: Vec<String>,
    pub outbox: Option<OutboxId>,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            name: DEFAULT_PLAYER_NAME.to_string(),
            password_hash: String::new(),
            description: DEFAULT_DESCRIPTION.to_string(),
            location: DEFAULT_START_AREA,
            inventory: Vec::new(),
            outbox: None,
        }
    }
}

impl Player {
    pub fn key(&self) -> String {
        name_key(&self.name)
    }

    pub fn carries(&self, item: &str) -> bool {
        find_item(&self.inventory, item).is_some()
    }

    pub fn take_item(&mut self, item: &str) -> Option<String> {
        take_item(&mut self.inventory, item)
    }
}

/// Registry key for a player name. Folds the full Unicode case, not just ASCII.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn find_item(items: &[String], item: &str) -> Option<usize> {
    let item = item.trim().to_lowercase();
    items.iter().position(|x| x.to_lowercase() == item)
}

fn take_item(items: &mut Vec<String>, item: &str) -> Option<String> {
    find_item(items, item).map(|i| items.remove(i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exits_zero_means_closed() {
        let a = Area {
            exits: [2, 0, 0, 0, 7, 0],
            ..Area::default()
        };
        assert_eq!(a.exit(Direction::North), Some(2));
        assert_eq!(a.exit(Direction::South), None);
        let open = a.open_exits().collect::<Vec<_>>();
        assert_eq!(open, vec![Direction::North, Direction::Up]);
    }

    #[test]
    fn item_lookup_ignores_case_but_keeps_stored_name() {
        let mut a = Area {
            items: vec!["Sword".to_string(), "lamp".to_string()],
            ..Area::default()
        };
        assert!(a.has_item("sword"));
        assert_eq!(a.take_item("SWORD").as_deref(), Some("Sword"));
        assert!(!a.has_item("sword"));
        assert_eq!(a.items, vec!["lamp".to_string()]);
    }

    #[test]
    fn keys_fold_non_ascii_case() {
        assert_eq!(name_key("Élan"), name_key("élan"));
        assert_eq!(name_key(" ÉLAN "), "élan");
        let p = Player {
            inventory: vec!["Épée".to_string()],
            ..Player::default()
        };
        assert!(p.carries("épée"));
    }

    #[test]
    fn outbox_ids_are_unique() {
        let a = OutboxId::next();
        let b = OutboxId::next();
        assert_ne!(a, b);
    }
}

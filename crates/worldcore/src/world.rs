//! The world registry: areas, connected players and their outboxes.
//!
//! `World` is plain owned state. It is driven by exactly one task (see
//! `registry`), which is what makes every operation here atomic with respect to
//! every other one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, info, warn};

use crate::codec;
use crate::direction::Direction;
use crate::model::{name_key, Area, AreaId, OutboxId, Player, DEFAULT_START_AREA};
use crate::store::Store;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub data_dir: PathBuf,
    pub start_area: AreaId,
    /// Upper bound on one delivery to one recipient.
    pub send_timeout: Duration,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            start_area: DEFAULT_START_AREA,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// Outcome of a fan-out. The call as a whole succeeded iff nothing failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub delivered: usize,
    pub failed: usize,
}

impl SendReport {
    pub fn ok(self) -> bool {
        self.failed == 0
    }

    /// Nobody matched: no delivery was even attempted.
    pub fn nobody(self) -> bool {
        self.delivered == 0 && self.failed == 0
    }

    fn note(&mut self, ok: bool) {
        if ok {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Farewell {
    /// Explicit quit.
    Graceful,
    /// I/O fault or dropped connection.
    Abrupt,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnterError {
    #[error("{0} is already in the world")]
    AlreadyConnected(String),
    #[error("start area {0} could not be loaded")]
    NoStartArea(AreaId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signup {
    Created,
    /// Someone else holds the name.
    Taken,
    /// The name was free but the record could not be written.
    NotSaved,
}

/// Result of looking through an exit without walking it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peek {
    NotADirection,
    Nothing,
    View(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emote {
    Wink,
    Smile,
    Frown,
    Wave,
    Nod,
}

impl Emote {
    pub fn parse(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "wink" => Some(Emote::Wink),
            "smile" => Some(Emote::Smile),
            "frown" => Some(Emote::Frown),
            "wave" => Some(Emote::Wave),
            "nod" => Some(Emote::Nod),
            _ => None,
        }
    }

    pub fn phrase(self, sender: &str) -> String {
        match self {
            Emote::Wink => format!("*{sender} winks at you ;)"),
            Emote::Smile => format!("*{sender} smiles at you :)"),
            Emote::Frown => format!("*{sender} frowns at you :("),
            Emote::Wave => format!("*{sender} waves at you o/"),
            Emote::Nod => format!("*{sender} nods at you."),
        }
    }
}

pub struct World {
    store: Store,
    start_area: AreaId,
    send_timeout: Duration,
    areas: HashMap<AreaId, Area>,
    /// Connected players, keyed by lowercased name.
    players: HashMap<String, Player>,
    outboxes: HashMap<OutboxId, mpsc::Sender<Bytes>>,
}

impl World {
    pub fn new(cfg: WorldConfig) -> Self {
        Self {
            store: Store::new(cfg.data_dir),
            start_area: cfg.start_area,
            send_timeout: cfg.send_timeout,
            areas: HashMap::new(),
            players: HashMap::new(),
            outboxes: HashMap::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn start_area(&self) -> AreaId {
        self.start_area
    }

    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.get(&name_key(name))
    }

    pub fn connected_count(&self) -> usize {
        self.players.len()
    }

    /// Make sure `id` is cached, loading it on first use. Misses are not cached.
    async fn ensure_area(&mut self, id: AreaId) -> bool {
        if id == 0 {
            return false;
        }
        if self.areas.contains_key(&id) {
            return true;
        }
        match self.store.load_area(id).await {
            Ok(Some(a)) => {
                debug!(area = id, title = %a.title, "area loaded");
                self.areas.insert(id, a);
                true
            }
            Ok(None) => {
                debug!(area = id, "no such area");
                false
            }
            Err(e) => {
                warn!(area = id, err = %e, "area record unreadable");
                false
            }
        }
    }

    pub async fn get_area(&mut self, id: AreaId) -> Option<&Area> {
        if !self.ensure_area(id).await {
            return None;
        }
        self.areas.get(&id)
    }

    /// Register a logged-in player, place them and announce them.
    ///
    /// Returns the view of the area they landed in.
    pub async fn enter(
        &mut self,
        mut player: Player,
        outbox: mpsc::Sender<Bytes>,
    ) -> Result<String, EnterError> {
        let key = player.key();
        if self.players.contains_key(&key) {
            return Err(EnterError::AlreadyConnected(player.name));
        }

        let target = if self.ensure_area(player.location).await {
            player.location
        } else if self.ensure_area(self.start_area).await {
            self.start_area
        } else {
            return Err(EnterError::NoStartArea(self.start_area));
        };

        let id = OutboxId::next();
        player.outbox = Some(id);
        // Not in any occupant set yet; move_player only adds.
        player.location = 0;
        let name = player.name.clone();
        self.outboxes.insert(id, outbox);
        self.players.insert(key.clone(), player);

        self.move_player(&key, target).await;
        info!(name = %name, area = target, outbox = %id, "entered world");

        self.send_message_to_area(&key, &format!("{name} has arrived."))
            .await;
        Ok(self.render_area(&key).await.unwrap_or_default())
    }

    /// Announce the departure and drop the player from every registry.
    pub async fn leave(&mut self, name: &str, farewell: Farewell) -> bool {
        let key = name_key(name);
        let Some(who) = self.players.get(&key).map(|p| p.name.clone()) else {
            return false;
        };
        let msg = match farewell {
            Farewell::Graceful => format!("{who} has returned to reality."),
            Farewell::Abrupt => format!("{who} crumbles into dust."),
        };
        self.send_message_to_area(&key, &msg).await;

        self.remove_player(&key);
        if let Some(p) = self.players.remove(&key) {
            if let Some(id) = p.outbox {
                self.outboxes.remove(&id);
            }
        }
        info!(name = %who, ?farewell, "left world");
        true
    }

    /// Move between areas in one step: no one can observe the player in both
    /// areas or in neither.
    pub async fn move_player(&mut self, name: &str, to: AreaId) -> bool {
        let key = name_key(name);
        if !self.players.contains_key(&key) || !self.ensure_area(to).await {
            return false;
        }
        let Some(p) = self.players.get_mut(&key) else {
            return false;
        };
        let from = p.location;
        p.location = to;
        let display = p.name.clone();

        if let Some(a) = self.areas.get_mut(&from) {
            a.players.remove(&key);
        }
        if let Some(b) = self.areas.get_mut(&to) {
            b.players.insert(key, display);
        }
        true
    }

    /// Take the player out of their current area only.
    pub fn remove_player(&mut self, name: &str) {
        let key = name_key(name);
        let Some(loc) = self.players.get(&key).map(|p| p.location) else {
            return;
        };
        if let Some(a) = self.areas.get_mut(&loc) {
            a.players.remove(&key);
        }
    }

    pub async fn do_walk(&mut self, name: &str, token: &str) -> bool {
        let key = name_key(name);
        let Some(dir) = Direction::parse(token) else {
            return false;
        };
        let Some((display, from)) = self.players.get(&key).map(|p| (p.name.clone(), p.location))
        else {
            return false;
        };
        let Some(to) = self.areas.get(&from).and_then(|a| a.exit(dir)) else {
            return false;
        };
        if !self.ensure_area(to).await {
            debug!(from, to, "exit leads to a missing area");
            return false;
        }

        self.send_message_to_area(&key, &format!("{display} has exited {dir}."))
            .await;
        self.move_player(&key, to).await;
        self.send_message_to_area(&key, &format!("{display} has arrived."))
            .await;
        true
    }

    /// Deliver `text` to everyone else in the sender's area.
    pub async fn send_message_to_area(&mut self, sender: &str, text: &str) -> SendReport {
        let key = name_key(sender);
        let recipients = self.area_peers(&key, |_| true);
        self.fan_out(&recipients, text).await
    }

    /// Deliver to every connected player, sender included.
    pub async fn send_message_to_world(&mut self, sender: &str, text: &str) -> SendReport {
        let Some(display) = self.player(sender).map(|p| p.name.clone()) else {
            return SendReport::default();
        };
        let line = format!("{display} shouts: {text}");
        let recipients = self
            .players
            .values()
            .filter_map(|p| p.outbox)
            .collect::<Vec<_>>();
        self.fan_out(&recipients, &line).await
    }

    /// Whisper to one player in the sender's area.
    pub async fn send_message_to_player(
        &mut self,
        sender: &str,
        target: &str,
        text: &str,
    ) -> SendReport {
        let key = name_key(sender);
        let Some(display) = self.players.get(&key).map(|p| p.name.clone()) else {
            return SendReport::default();
        };
        let target = name_key(target);
        let recipients = self.area_peers(&key, |k| k == target);
        self.fan_out(&recipients, &format!("{display} whispers: {text}"))
            .await
    }

    /// Unknown emote keys are a silent no-op.
    pub async fn send_emote_to_player(
        &mut self,
        sender: &str,
        target: &str,
        key: &str,
    ) -> SendReport {
        let Some(emote) = Emote::parse(key) else {
            return SendReport::default();
        };
        let skey = name_key(sender);
        let Some(display) = self.players.get(&skey).map(|p| p.name.clone()) else {
            return SendReport::default();
        };
        let target = name_key(target);
        let recipients = self.area_peers(&skey, |k| k == target);
        self.fan_out(&recipients, &emote.phrase(&display)).await
    }

    /// Area -> inventory. Persists the area on success.
    pub async fn get_item(&mut self, name: &str, item: &str) -> Option<String> {
        let key = name_key(name);
        let loc = self.players.get(&key)?.location;
        let taken = self.areas.get_mut(&loc)?.take_item(item)?;
        if let Some(p) = self.players.get_mut(&key) {
            p.inventory.push(taken.clone());
        }
        self.write_area(loc).await;
        Some(taken)
    }

    /// Inventory -> area. Persists the area on success.
    pub async fn drop_item(&mut self, name: &str, item: &str) -> Option<String> {
        let key = name_key(name);
        let p = self.players.get_mut(&key)?;
        let loc = p.location;
        if !self.areas.contains_key(&loc) {
            return None;
        }
        let dropped = p.take_item(item)?;
        if let Some(a) = self.areas.get_mut(&loc) {
            a.items.push(dropped.clone());
        }
        self.write_area(loc).await;
        Some(dropped)
    }

    pub fn set_description(&mut self, name: &str, text: &str) -> bool {
        match self.players.get_mut(&name_key(name)) {
            Some(p) => {
                p.description = codec::scrub_value(text);
                true
            }
            None => false,
        }
    }

    /// Read a persisted profile without registering it.
    pub async fn load_player(&self, name: &str) -> Option<Player> {
        match self.store.load_player(name).await {
            Ok(p) => p,
            Err(e) => {
                warn!(name = %name, err = %e, "player record unreadable");
                None
            }
        }
    }

    pub async fn write_player(&self, p: &Player) -> bool {
        match self.store.save_player(p).await {
            Ok(()) => true,
            Err(e) => {
                warn!(name = %p.name, err = %e, "failed to save player");
                false
            }
        }
    }

    /// Persist a brand-new account unless the name is already in use, on disk
    /// or in the world.
    pub async fn create_player(&self, p: &Player) -> Signup {
        if self.players.contains_key(&p.key()) || self.store.player_exists(&p.name).await {
            return Signup::Taken;
        }
        if self.write_player(p).await {
            Signup::Created
        } else {
            Signup::NotSaved
        }
    }

    /// Persist a connected player's current state.
    pub async fn save_connected(&self, name: &str) -> bool {
        match self.player(name) {
            Some(p) => self.write_player(p).await,
            None => false,
        }
    }

    pub async fn write_area(&self, id: AreaId) -> bool {
        let Some(a) = self.areas.get(&id) else {
            return false;
        };
        match self.store.save_area(a).await {
            Ok(()) => true,
            Err(e) => {
                warn!(area = id, err = %e, "failed to save area");
                false
            }
        }
    }

    /// What `name` sees when looking around.
    pub async fn render_area(&mut self, name: &str) -> Option<String> {
        let key = name_key(name);
        let loc = self.players.get(&key)?.location;
        let a = self.get_area(loc).await?;

        let mut s = String::new();
        s.push_str(a.title.trim());
        s.push_str("\r\n");
        s.push_str(a.description.trim());
        s.push_str("\r\n");
        s.push_str("Exits available:");
        for d in a.open_exits() {
            s.push(' ');
            s.push_str(d.as_str());
        }
        s.push_str("\r\n");
        s.push_str("Items available:");
        for it in &a.items {
            s.push(' ');
            s.push_str(it);
        }
        s.push_str("\r\n");
        for (k, display) in &a.players {
            if *k != key {
                s.push_str(&format!("{display} is here.\r\n"));
            }
        }
        Some(s)
    }

    /// One-step lookahead through an exit.
    pub async fn peek(&mut self, name: &str, token: &str) -> Peek {
        let Some(dir) = Direction::parse(token) else {
            return Peek::NotADirection;
        };
        let Some(loc) = self.player(name).map(|p| p.location) else {
            return Peek::Nothing;
        };
        let Some(next) = self.areas.get(&loc).and_then(|a| a.exit(dir)) else {
            return Peek::Nothing;
        };
        let Some(b) = self.get_area(next).await else {
            return Peek::Nothing;
        };

        let mut s = String::new();
        s.push_str(b.description.trim());
        s.push_str("\r\n");
        s.push_str("Available exits -> |");
        for d in b.open_exits() {
            s.push_str(&format!(" {d} |"));
        }
        s.push_str("\r\n");
        s.push_str("Current players -> |");
        for display in b.players.values() {
            s.push_str(&format!(" {display} |"));
        }
        s.push_str("\r\n");
        Peek::View(s)
    }

    /// Description of `target`, if they share the viewer's area.
    pub fn describe_player(&self, viewer: &str, target: &str) -> Option<String> {
        let loc = self.player(viewer)?.location;
        let t = self.player(target)?;
        (t.location == loc).then(|| t.description.clone())
    }

    pub fn render_inventory(&self, name: &str) -> Option<String> {
        let p = self.player(name)?;
        let mut s = String::from("Current Inventory ----[ | ");
        if p.inventory.is_empty() {
            s.push_str("| ]");
        } else {
            for it in &p.inventory {
                s.push_str(it);
                s.push_str(" | ");
            }
            s.push_str(" ]");
        }
        Some(s)
    }

    /// Every way the occupant sets disagree with player locations.
    pub fn membership_violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (key, p) in &self.players {
            let homes = self
                .areas
                .values()
                .filter(|a| a.players.contains_key(key))
                .map(|a| a.id)
                .collect::<Vec<_>>();
            if homes != [p.location] {
                out.push(format!(
                    "{key}: location {} but listed in {homes:?}",
                    p.location
                ));
            }
        }
        for a in self.areas.values() {
            for key in a.players.keys() {
                if !self.players.contains_key(key) {
                    out.push(format!("{key}: listed in area {} but not connected", a.id));
                }
            }
        }
        out
    }

    fn area_peers(&self, sender_key: &str, pick: impl Fn(&str) -> bool) -> Vec<OutboxId> {
        let Some(loc) = self.players.get(sender_key).map(|p| p.location) else {
            return Vec::new();
        };
        let Some(a) = self.areas.get(&loc) else {
            return Vec::new();
        };
        a.players
            .keys()
            .filter(|k| k.as_str() != sender_key && pick(k.as_str()))
            .filter_map(|k| self.players.get(k).and_then(|p| p.outbox))
            .collect()
    }

    async fn fan_out(&self, recipients: &[OutboxId], text: &str) -> SendReport {
        let mut line = mudio::latin1::encode(text);
        line.extend_from_slice(b"\r\n");
        let line = Bytes::from(line);

        let mut report = SendReport::default();
        for id in recipients {
            report.note(self.deliver(*id, line.clone()).await);
        }
        report
    }

    async fn deliver(&self, id: OutboxId, line: Bytes) -> bool {
        let Some(tx) = self.outboxes.get(&id) else {
            return false;
        };
        match tx.send_timeout(line, self.send_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(outbox = %id, "delivery timed out");
                false
            }
            Err(SendTimeoutError::Closed(_)) => {
                debug!(outbox = %id, "delivery to closed outbox");
                false
            }
        }
    }
}

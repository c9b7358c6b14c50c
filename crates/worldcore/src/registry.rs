//! Single-owner coordinator for [`World`].
//!
//! One task owns the world and serves requests from a channel in arrival order.
//! Sessions hold a cloneable [`WorldHandle`]; every call is one request and one
//! reply, so each registry operation runs to completion before the next starts.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::model::{AreaId, Player};
use crate::world::{EnterError, Farewell, Peek, SendReport, Signup, World};

const REQUEST_QUEUE: usize = 1024;

/// The world task has stopped; nothing more can be done in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("world task is gone")]
pub struct WorldGone;

#[derive(Debug)]
pub enum WorldReq {
    Enter {
        player: Player,
        outbox: mpsc::Sender<Bytes>,
        reply: oneshot::Sender<Result<String, EnterError>>,
    },
    Leave {
        name: String,
        farewell: Farewell,
        reply: oneshot::Sender<bool>,
    },
    Walk {
        name: String,
        direction: String,
        reply: oneshot::Sender<bool>,
    },
    SayArea {
        name: String,
        text: String,
        reply: oneshot::Sender<SendReport>,
    },
    SayWorld {
        name: String,
        text: String,
        reply: oneshot::Sender<SendReport>,
    },
    Whisper {
        name: String,
        target: String,
        text: String,
        reply: oneshot::Sender<SendReport>,
    },
    Emote {
        name: String,
        target: String,
        key: String,
        reply: oneshot::Sender<SendReport>,
    },
    GetItem {
        name: String,
        item: String,
        reply: oneshot::Sender<Option<String>>,
    },
    DropItem {
        name: String,
        item: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Describe {
        name: String,
        text: String,
        reply: oneshot::Sender<bool>,
    },
    RenderArea {
        name: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Peek {
        name: String,
        direction: String,
        reply: oneshot::Sender<Peek>,
    },
    LookAt {
        name: String,
        target: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Inventory {
        name: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Carries {
        name: String,
        item: String,
        reply: oneshot::Sender<bool>,
    },
    Location {
        name: String,
        reply: oneshot::Sender<Option<AreaId>>,
    },
    LoadPlayer {
        name: String,
        reply: oneshot::Sender<Option<Player>>,
    },
    CreatePlayer {
        player: Box<Player>,
        reply: oneshot::Sender<Signup>,
    },
    SavePlayer {
        name: String,
        reply: oneshot::Sender<bool>,
    },
    Audit {
        reply: oneshot::Sender<Vec<String>>,
    },
}

#[derive(Debug, Clone)]
pub struct WorldHandle {
    tx: mpsc::Sender<WorldReq>,
}

impl WorldHandle {
    /// Move `world` onto its own task.
    pub fn spawn(world: World) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        let task = tokio::spawn(run(world, rx));
        (Self { tx }, task)
    }

    async fn call<T>(
        &self,
        req: impl FnOnce(oneshot::Sender<T>) -> WorldReq,
    ) -> Result<T, WorldGone> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(req(reply)).await.map_err(|_| WorldGone)?;
        rx.await.map_err(|_| WorldGone)
    }

    pub async fn enter(
        &self,
        player: Player,
        outbox: mpsc::Sender<Bytes>,
    ) -> Result<Result<String, EnterError>, WorldGone> {
        self.call(|reply| WorldReq::Enter {
            player,
            outbox,
            reply,
        })
        .await
    }

    pub async fn leave(&self, name: &str, farewell: Farewell) -> Result<bool, WorldGone> {
        self.call(|reply| WorldReq::Leave {
            name: name.to_string(),
            farewell,
            reply,
        })
        .await
    }

    pub async fn walk(&self, name: &str, direction: &str) -> Result<bool, WorldGone> {
        self.call(|reply| WorldReq::Walk {
            name: name.to_string(),
            direction: direction.to_string(),
            reply,
        })
        .await
    }

    pub async fn say_area(&self, name: &str, text: &str) -> Result<SendReport, WorldGone> {
        self.call(|reply| WorldReq::SayArea {
            name: name.to_string(),
            text: text.to_string(),
            reply,
        })
        .await
    }

    pub async fn say_world(&self, name: &str, text: &str) -> Result<SendReport, WorldGone> {
        self.call(|reply| WorldReq::SayWorld {
            name: name.to_string(),
            text: text.to_string(),
            reply,
        })
        .await
    }

    pub async fn whisper(
        &self,
        name: &str,
        target: &str,
        text: &str,
    ) -> Result<SendReport, WorldGone> {
        self.call(|reply| WorldReq::Whisper {
            name: name.to_string(),
            target: target.to_string(),
            text: text.to_string(),
            reply,
        })
        .await
    }

    pub async fn emote(&self, name: &str, target: &str, key: &str) -> Result<SendReport, WorldGone> {
        self.call(|reply| WorldReq::Emote {
            name: name.to_string(),
            target: target.to_string(),
            key: key.to_string(),
            reply,
        })
        .await
    }

    pub async fn get_item(&self, name: &str, item: &str) -> Result<Option<String>, WorldGone> {
        self.call(|reply| WorldReq::GetItem {
            name: name.to_string(),
            item: item.to_string(),
            reply,
        })
        .await
    }

    pub async fn drop_item(&self, name: &str, item: &str) -> Result<Option<String>, WorldGone> {
        self.call(|reply| WorldReq::DropItem {
            name: name.to_string(),
            item: item.to_string(),
            reply,
        })
        .await
    }

    pub async fn describe(&self, name: &str, text: &str) -> Result<bool, WorldGone> {
        self.call(|reply| WorldReq::Describe {
            name: name.to_string(),
            text: text.to_string(),
            reply,
        })
        .await
    }

    pub async fn render_area(&self, name: &str) -> Result<Option<String>, WorldGone> {
        self.call(|reply| WorldReq::RenderArea {
            name: name.to_string(),
            reply,
        })
        .await
    }

    pub async fn peek(&self, name: &str, direction: &str) -> Result<Peek, WorldGone> {
        self.call(|reply| WorldReq::Peek {
            name: name.to_string(),
            direction: direction.to_string(),
            reply,
        })
        .await
    }

    pub async fn look_at(&self, name: &str, target: &str) -> Result<Option<String>, WorldGone> {
        self.call(|reply| WorldReq::LookAt {
            name: name.to_string(),
            target: target.to_string(),
            reply,
        })
        .await
    }

    pub async fn inventory(&self, name: &str) -> Result<Option<String>, WorldGone> {
        self.call(|reply| WorldReq::Inventory {
            name: name.to_string(),
            reply,
        })
        .await
    }

    pub async fn carries(&self, name: &str, item: &str) -> Result<bool, WorldGone> {
        self.call(|reply| WorldReq::Carries {
            name: name.to_string(),
            item: item.to_string(),
            reply,
        })
        .await
    }

    pub async fn location(&self, name: &str) -> Result<Option<AreaId>, WorldGone> {
        self.call(|reply| WorldReq::Location {
            name: name.to_string(),
            reply,
        })
        .await
    }

    pub async fn load_player(&self, name: &str) -> Result<Option<Player>, WorldGone> {
        self.call(|reply| WorldReq::LoadPlayer {
            name: name.to_string(),
            reply,
        })
        .await
    }

    /// Check the name is free and write the new account, as one step.
    pub async fn create_player(&self, player: Player) -> Result<Signup, WorldGone> {
        self.call(|reply| WorldReq::CreatePlayer {
            player: Box::new(player),
            reply,
        })
        .await
    }

    /// Persist a connected player's live state.
    pub async fn save_player(&self, name: &str) -> Result<bool, WorldGone> {
        self.call(|reply| WorldReq::SavePlayer {
            name: name.to_string(),
            reply,
        })
        .await
    }

    /// Membership invariant violations; empty when consistent.
    pub async fn audit(&self) -> Result<Vec<String>, WorldGone> {
        self.call(|reply| WorldReq::Audit { reply }).await
    }
}

async fn run(mut world: World, mut rx: mpsc::Receiver<WorldReq>) {
    info!(data_dir = %world.store().root().display(), start_area = world.start_area(), "world task started");
    while let Some(req) = rx.recv().await {
        handle(&mut world, req).await;
    }
    info!(connected = world.connected_count(), "world task stopped");
}

// A dropped reply receiver only means the caller went away.
async fn handle(world: &mut World, req: WorldReq) {
    match req {
        WorldReq::Enter {
            player,
            outbox,
            reply,
        } => {
            let _ = reply.send(world.enter(player, outbox).await);
        }
        WorldReq::Leave {
            name,
            farewell,
            reply,
        } => {
            let _ = reply.send(world.leave(&name, farewell).await);
        }
        WorldReq::Walk {
            name,
            direction,
            reply,
        } => {
            let _ = reply.send(world.do_walk(&name, &direction).await);
        }
        WorldReq::SayArea { name, text, reply } => {
            let _ = reply.send(world.send_message_to_area(&name, &text).await);
        }
        WorldReq::SayWorld { name, text, reply } => {
            let _ = reply.send(world.send_message_to_world(&name, &text).await);
        }
        WorldReq::Whisper {
            name,
            target,
            text,
            reply,
        } => {
            let _ = reply.send(world.send_message_to_player(&name, &target, &text).await);
        }
        WorldReq::Emote {
            name,
            target,
            key,
            reply,
        } => {
            let _ = reply.send(world.send_emote_to_player(&name, &target, &key).await);
        }
        WorldReq::GetItem { name, item, reply } => {
            let _ = reply.send(world.get_item(&name, &item).await);
        }
        WorldReq::DropItem { name, item, reply } => {
            let _ = reply.send(world.drop_item(&name, &item).await);
        }
        WorldReq::Describe { name, text, reply } => {
            let _ = reply.send(world.set_description(&name, &text));
        }
        WorldReq::RenderArea { name, reply } => {
            let _ = reply.send(world.render_area(&name).await);
        }
        WorldReq::Peek {
            name,
            direction,
            reply,
        } => {
            let _ = reply.send(world.peek(&name, &direction).await);
        }
        WorldReq::LookAt {
            name,
            target,
            reply,
        } => {
            let _ = reply.send(world.describe_player(&name, &target));
        }
        WorldReq::Inventory { name, reply } => {
            let _ = reply.send(world.render_inventory(&name));
        }
        WorldReq::Carries { name, item, reply } => {
            let _ = reply.send(world.player(&name).is_some_and(|p| p.carries(&item)));
        }
        WorldReq::Location { name, reply } => {
            let _ = reply.send(world.player(&name).map(|p| p.location));
        }
        WorldReq::LoadPlayer { name, reply } => {
            let _ = reply.send(world.load_player(&name).await);
        }
        WorldReq::CreatePlayer { player, reply } => {
            let _ = reply.send(world.create_player(&player).await);
        }
        WorldReq::SavePlayer { name, reply } => {
            let _ = reply.send(world.save_connected(&name).await);
        }
        WorldReq::Audit { reply } => {
            let _ = reply.send(world.membership_violations());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldConfig;
    use std::path::Path;
    use std::time::Duration;

    /// A 2x2 grid: 1 2 / 3 4, all neighbours connected.
    fn seed_grid(dir: &Path) {
        std::fs::create_dir_all(dir.join("areas")).unwrap();
        let rooms: [(u32, &str); 4] = [
            (1, "0,3,2,0,0,0"),
            (2, "0,4,0,1,0,0"),
            (3, "1,0,4,0,0,0"),
            (4, "2,0,0,3,0,0"),
        ];
        for (id, exits) in rooms {
            std::fs::write(
                dir.join(format!("areas/{id}.area")),
                format!("[title]Room {id}[description]Square {id}.[exits]{exits}"),
            )
            .unwrap();
        }
    }

    fn spawn_world(dir: &Path) -> WorldHandle {
        let (h, _task) = WorldHandle::spawn(World::new(WorldConfig {
            data_dir: dir.to_path_buf(),
            start_area: 1,
            send_timeout: Duration::from_millis(100),
        }));
        h
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_walks_keep_membership_consistent() {
        let dir = tempfile::tempdir().unwrap();
        seed_grid(dir.path());
        let world = spawn_world(dir.path());

        let dirs = ["north", "south", "east", "west", "n", "s", "e", "w", "up"];
        let mut tasks = Vec::new();
        for i in 0..8 {
            let world = world.clone();
            tasks.push(tokio::spawn(async move {
                let name = format!("walker{i}");
                let (tx, mut rx) = mpsc::channel(4096);
                let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
                let p = Player {
                    name: name.clone(),
                    ..Player::default()
                };
                world.enter(p, tx).await.unwrap().unwrap();
                for step in 0..200usize {
                    let d = dirs[(step * 7 + i * 3) % dirs.len()];
                    world.walk(&name, d).await.unwrap();
                }
                drain.abort();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        assert_eq!(world.audit().await.unwrap(), Vec::<String>::new());
        for i in 0..8 {
            let loc = world.location(&format!("walker{i}")).await.unwrap();
            assert!(matches!(loc, Some(1..=4)));
        }
    }

    #[tokio::test]
    async fn handle_round_trips_requests() {
        let dir = tempfile::tempdir().unwrap();
        seed_grid(dir.path());
        let world = spawn_world(dir.path());

        let (tx, _rx) = mpsc::channel(16);
        let p = Player {
            name: "Alice".to_string(),
            ..Player::default()
        };
        let view = world.enter(p, tx).await.unwrap().unwrap();
        assert!(view.starts_with("Room 1\r\n"));

        assert!(world.walk("alice", "east").await.unwrap());
        assert_eq!(world.location("alice").await.unwrap(), Some(2));
        assert!(!world.walk("alice", "east").await.unwrap());

        assert!(world.save_player("alice").await.unwrap());
        let stored = world.load_player("alice").await.unwrap().unwrap();
        assert_eq!(stored.location, 2);

        assert!(world.leave("alice", Farewell::Graceful).await.unwrap());
        assert_eq!(world.location("alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn calls_fail_once_the_world_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let (world, task) = WorldHandle::spawn(World::new(WorldConfig {
            data_dir: dir.path().to_path_buf(),
            ..WorldConfig::default()
        }));
        task.abort();
        let _ = task.await;
        assert_eq!(world.location("alice").await, Err(WorldGone));
    }
}

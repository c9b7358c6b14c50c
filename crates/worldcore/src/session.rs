//! One client connection: login, command loop, teardown.
//!
//! Output goes through a bounded queue drained by a writer task, so the world
//! task and this session both write to the socket without touching it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use mudio::latin1;
use mudio::line::LineReader;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::command::{self, Flow};
use crate::model::{name_key, Player};
use crate::registry::{WorldGone, WorldHandle};
use crate::validate::{
    is_valid_password, is_valid_playername, password_digest, verify_password, PasswordPolicy,
};
use crate::world::{EnterError, Farewell, Signup};

const OUTBOX_CAPACITY: usize = 256;
const WRITER_DRAIN: Duration = Duration::from_secs(5);

const PASSWORD_RULES: &str = "A valid password is at least eight characters long, \
contains at least one UPPERCASE letter, one lowercase letter, and one number.";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub password_policy: PasswordPolicy,
    pub greeting: String,
    pub max_line_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            password_policy: PasswordPolicy::default(),
            greeting: "Welcome, traveller.".to_string(),
            max_line_len: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    LoggingIn,
    Active,
    Closing,
    Closed,
}

/// Why the session is ending.
#[derive(Debug)]
enum Ending {
    Quit,
    /// Login abandoned by the user.
    Declined,
    /// Login succeeded but the world would not take the player.
    Rejected,
    Eof,
    Io(std::io::Error),
    WorldGone,
}

impl Ending {
    fn farewell(&self) -> Farewell {
        match self {
            Ending::Quit => Farewell::Graceful,
            _ => Farewell::Abrupt,
        }
    }

    /// The connection is still usable for a last word.
    fn polite(&self) -> bool {
        matches!(self, Ending::Quit | Ending::Declined | Ending::Rejected)
    }
}

/// Anything that cuts a login or command loop short.
enum Stop {
    Eof,
    Io(std::io::Error),
    WorldGone,
}

impl From<std::io::Error> for Stop {
    fn from(e: std::io::Error) -> Self {
        Stop::Io(e)
    }
}

impl From<WorldGone> for Stop {
    fn from(_: WorldGone) -> Self {
        Stop::WorldGone
    }
}

impl From<Stop> for Ending {
    fn from(s: Stop) -> Self {
        match s {
            Stop::Eof => Ending::Eof,
            Stop::Io(e) => Ending::Io(e),
            Stop::WorldGone => Ending::WorldGone,
        }
    }
}

struct Session<R> {
    peer: SocketAddr,
    world: WorldHandle,
    cfg: Arc<SessionConfig>,
    reader: LineReader<R>,
    out: mpsc::Sender<Bytes>,
    state: SessionState,
    /// Set once the world has accepted the player.
    entered: Option<String>,
}

/// Serve one accepted connection until quit or disconnect.
pub async fn run_session<S>(
    stream: S,
    peer: SocketAddr,
    world: WorldHandle,
    cfg: Arc<SessionConfig>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (rd, mut wr) = tokio::io::split(stream);

    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(OUTBOX_CAPACITY);
    let mut writer = tokio::spawn(async move {
        while let Some(b) = out_rx.recv().await {
            if wr.write_all(&b[..]).await.is_err() {
                break;
            }
        }
        let _ = wr.shutdown().await;
    });

    info!(peer = %peer, "connected");
    let max_line_len = cfg.max_line_len;
    let mut s = Session {
        peer,
        world,
        cfg,
        reader: LineReader::new(rd).max_line_len(max_line_len),
        out: out_tx,
        state: SessionState::Connecting,
        entered: None,
    };

    let ending = s.drive().await;
    let res = s.teardown(ending).await;

    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        debug!(peer = %peer, "writer did not drain; aborting");
        writer.abort();
    }
    res
}

impl<R: AsyncRead + Unpin> Session<R> {
    fn set_state(&mut self, next: SessionState) {
        debug!(peer = %self.peer, from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    async fn drive(&mut self) -> Ending {
        self.set_state(SessionState::LoggingIn);
        let greeting = self.cfg.greeting.clone();
        if let Err(stop) = self.send_line(&greeting).await {
            return stop.into();
        }

        let player = match self.login().await {
            Ok(Some(p)) => p,
            Ok(None) => return Ending::Declined,
            Err(stop) => return stop.into(),
        };
        let name = player.name.clone();

        match self.world.enter(player, self.out.clone()).await {
            Ok(Ok(view)) => {
                self.entered = Some(name.clone());
                self.set_state(SessionState::Active);
                info!(peer = %self.peer, name = %name, "entered world");
                if let Err(stop) = self.send_block(&view).await {
                    return stop.into();
                }
            }
            Ok(Err(e)) => {
                let msg = match &e {
                    EnterError::AlreadyConnected(_) => format!("{name} is already playing."),
                    EnterError::NoStartArea(_) => {
                        warn!(peer = %self.peer, err = %e, "world refused player");
                        "The world is not available right now.".to_string()
                    }
                };
                if let Err(stop) = self.send_line(&msg).await {
                    return stop.into();
                }
                return Ending::Rejected;
            }
            Err(WorldGone) => return Ending::WorldGone,
        }

        match self.command_loop(&name).await {
            Ok(()) => Ending::Quit,
            Err(stop) => stop.into(),
        }
    }

    async fn command_loop(&mut self, name: &str) -> Result<(), Stop> {
        loop {
            let line = self.next_line().await?;
            let reply = command::dispatch(&self.world, name, &line).await?;
            for l in &reply.lines {
                self.send_line(l).await?;
            }
            if reply.flow == Flow::Quit {
                return Ok(());
            }
        }
    }

    /// `Ok(None)` when the user gives up.
    async fn login(&mut self) -> Result<Option<Player>, Stop> {
        'name: loop {
            let name = loop {
                self.prompt("Enter your existing or desired player name: ")
                    .await?;
                let name = self.next_line().await?.trim().to_string();
                if is_valid_playername(&name) {
                    break name;
                }
                self.send_line(&format!("The player name {name} was not valid."))
                    .await?;
                self.send_line(
                    "Your player name must be three to fifteen characters \
                     and only use letters, numbers, and the underscore.",
                )
                .await?;
                if !self.ask("Do you want to try again?").await? {
                    return Ok(None);
                }
            };

            if let Some(stored) = self.world.load_player(&name).await? {
                loop {
                    self.prompt("Enter your password: ").await?;
                    let attempt = self.next_line().await?;
                    if verify_password(self.cfg.password_policy, &stored.password_hash, &attempt) {
                        info!(peer = %self.peer, name = %name, "login");
                        return Ok(Some(hydrate(stored, &name)));
                    }
                    info!(peer = %self.peer, name = %name, "bad password");
                    self.send_line("The password was not correct.").await?;
                    if !self.ask("Do you want to try again?").await? {
                        return Ok(None);
                    }
                }
            }

            self.send_line(&format!("The player name {name} does not exist."))
                .await?;
            if !self
                .ask(&format!("Would you like to use the name {name}?"))
                .await?
            {
                if self.ask("Would you like to enter a new player name?").await? {
                    continue 'name;
                }
                return Ok(None);
            }

            loop {
                self.send_line(PASSWORD_RULES).await?;
                self.prompt("Enter a password: ").await?;
                let pw = self.next_line().await?;
                if is_valid_password(&pw) {
                    let player = Player {
                        name: name.clone(),
                        password_hash: password_digest(&pw),
                        ..Player::default()
                    };
                    match self.world.create_player(player.clone()).await? {
                        Signup::Created => {
                            info!(peer = %self.peer, name = %name, "account created");
                        }
                        Signup::NotSaved => {
                            warn!(peer = %self.peer, name = %name, "new account not persisted");
                        }
                        Signup::Taken => {
                            info!(peer = %self.peer, name = %name, "name taken during signup");
                            self.send_line(&format!("The player name {name} was just taken."))
                                .await?;
                            continue 'name;
                        }
                    }
                    return Ok(Some(player));
                }
                self.send_line("That password did not meet requirements.")
                    .await?;
                if !self.ask("Do you want to try again?").await? {
                    if self.ask("Would you like to enter a new player name?").await? {
                        continue 'name;
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Re-asks until the answer is yes/y/no/n.
    async fn ask(&mut self, question: &str) -> Result<bool, Stop> {
        loop {
            self.prompt(&format!("{question} Yes or no? ")).await?;
            match self.next_line().await?.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" => return Ok(true),
                "no" | "n" => return Ok(false),
                _ => {}
            }
        }
    }

    async fn next_line(&mut self) -> Result<String, Stop> {
        match self.reader.read_line().await? {
            Some(b) => Ok(latin1::decode(&b)),
            None => Err(Stop::Eof),
        }
    }

    async fn prompt(&mut self, text: &str) -> Result<(), Stop> {
        self.write(latin1::encode(text)).await
    }

    async fn send_line(&mut self, text: &str) -> Result<(), Stop> {
        let mut b = latin1::encode(text);
        b.extend_from_slice(b"\r\n");
        self.write(b).await
    }

    async fn send_block(&mut self, block: &str) -> Result<(), Stop> {
        for l in block.lines() {
            self.send_line(l).await?;
        }
        Ok(())
    }

    async fn write(&mut self, b: Vec<u8>) -> Result<(), Stop> {
        self.out.send(Bytes::from(b)).await.map_err(|_| {
            Stop::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "writer closed",
            ))
        })
    }

    /// Runs once per session; consumes it.
    async fn teardown(mut self, ending: Ending) -> anyhow::Result<()> {
        self.set_state(SessionState::Closing);

        if let Some(name) = self.entered.take() {
            match self.world.leave(&name, ending.farewell()).await {
                Ok(_) => {}
                Err(WorldGone) => warn!(peer = %self.peer, name = %name, "world gone during leave"),
            }
            info!(peer = %self.peer, name = %name, ending = ?ending, "disconnected");
        } else {
            info!(peer = %self.peer, ending = ?ending, "disconnected before entering");
        }

        if ending.polite() {
            let _ = self.out.send(Bytes::from_static(b"bye\r\n")).await;
        }
        self.set_state(SessionState::Closed);

        match ending {
            Ending::Io(e) => Err(e).context("session i/o"),
            Ending::WorldGone => Err(WorldGone).context("world stopped"),
            _ => Ok(()),
        }
    }
}

/// Live player for a returning account.
fn hydrate(stored: Player, typed: &str) -> Player {
    let name = if name_key(&stored.name) == name_key(typed) {
        stored.name.clone()
    } else {
        typed.to_string()
    };
    Player {
        name,
        outbox: None,
        ..stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{World, WorldConfig};
    use std::path::Path;
    use tokio::io::{AsyncReadExt, DuplexStream, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;

    fn seed(dir: &Path) {
        std::fs::create_dir_all(dir.join("areas")).unwrap();
        std::fs::write(
            dir.join("areas/1.area"),
            "[title]Hall[description]A draughty hall.[items]sword[exits]2,0,0,0,0,0",
        )
        .unwrap();
        std::fs::write(
            dir.join("areas/2.area"),
            "[title]Yard[description]Open sky.[items][exits]0,1,0,0,0,0",
        )
        .unwrap();
    }

    fn spawn_world(dir: &Path) -> WorldHandle {
        WorldHandle::spawn(World::new(WorldConfig {
            data_dir: dir.to_path_buf(),
            start_area: 1,
            send_timeout: Duration::from_millis(100),
        }))
        .0
    }

    struct Client {
        rd: ReadHalf<DuplexStream>,
        wr: WriteHalf<DuplexStream>,
        seen: String,
        task: JoinHandle<anyhow::Result<()>>,
    }

    impl Client {
        fn connect(world: &WorldHandle, cfg: SessionConfig) -> Self {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
            let task = tokio::spawn(run_session(server, peer, world.clone(), Arc::new(cfg)));
            let (rd, wr) = tokio::io::split(client);
            Self {
                rd,
                wr,
                seen: String::new(),
                task,
            }
        }

        /// Read until `needle` shows up; consumes output through it.
        async fn expect(&mut self, needle: &str) {
            loop {
                if let Some(i) = self.seen.find(needle) {
                    self.seen.drain(..i + needle.len());
                    return;
                }
                let mut buf = [0u8; 1024];
                let n = tokio::time::timeout(Duration::from_secs(5), self.rd.read(&mut buf))
                    .await
                    .expect("timed out")
                    .unwrap();
                assert!(n > 0, "eof waiting for {needle:?}; saw {:?}", self.seen);
                self.seen.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
        }

        async fn send(&mut self, line: &str) {
            self.wr
                .write_all(format!("{line}\r\n").as_bytes())
                .await
                .unwrap();
        }

        async fn read_to_end(mut self) -> (String, anyhow::Result<()>) {
            let mut rest = Vec::new();
            tokio::time::timeout(Duration::from_secs(5), self.rd.read_to_end(&mut rest))
                .await
                .expect("timed out")
                .unwrap();
            self.seen.push_str(&String::from_utf8_lossy(&rest));
            let res = self.task.await.unwrap();
            (self.seen, res)
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(b) = rx.try_recv() {
            out.push(String::from_utf8_lossy(&b).trim_end().to_string());
        }
        out
    }

    #[tokio::test]
    async fn new_account_then_quit() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let world = spawn_world(dir.path());
        let mut c = Client::connect(&world, SessionConfig::default());

        c.expect("player name: ").await;
        c.send("Alice").await;
        c.expect("The player name Alice does not exist.").await;
        c.expect("Yes or no? ").await;
        c.send("y").await;
        c.expect("Enter a password: ").await;
        c.send("weak").await;
        c.expect("That password did not meet requirements.").await;
        c.expect("Yes or no? ").await;
        c.send("yes").await;
        c.expect("Enter a password: ").await;
        c.send("Passw0rd1").await;
        c.expect("Hall\r\nA draughty hall.\r\n").await;
        assert_eq!(world.location("alice").await.unwrap(), Some(1));

        c.send("quit").await;
        let (rest, res) = c.read_to_end().await;
        assert!(res.is_ok());
        assert!(rest.ends_with("bye\r\n"));

        assert_eq!(world.location("alice").await.unwrap(), None);
        let stored = world.load_player("alice").await.unwrap().unwrap();
        assert_eq!(stored.password_hash, password_digest("Passw0rd1"));
    }

    #[tokio::test]
    async fn returning_player_hydrates_and_crumbles_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        std::fs::create_dir_all(dir.path().join("players")).unwrap();
        std::fs::write(
            dir.path().join("players/bob.player"),
            "[description]A tall fellow.[name]Bob[password]abc[location]2[inventory]lamp",
        )
        .unwrap();
        let world = spawn_world(dir.path());

        let (tx, mut watcher) = mpsc::channel(16);
        let mut p = Player {
            name: "Watcher".to_string(),
            ..Player::default()
        };
        p.location = 2;
        world.enter(p, tx).await.unwrap().unwrap();

        let mut c = Client::connect(&world, SessionConfig::default());
        c.expect("player name: ").await;
        c.send("BOB").await;
        c.expect("Enter your password: ").await;
        c.send("whatever").await;
        c.expect("Yard\r\n").await;
        c.send("/i").await;
        c.expect("Current Inventory ----[ | lamp |  ]").await;

        let Client { rd, wr, task, .. } = c;
        drop(rd);
        drop(wr);
        assert!(task.await.unwrap().is_ok());

        assert_eq!(
            drain(&mut watcher),
            vec![
                "Bob has arrived.".to_string(),
                "Bob crumbles into dust.".to_string()
            ]
        );
        assert_eq!(world.location("bob").await.unwrap(), None);
        assert!(world.audit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn signup_loses_to_an_account_created_meanwhile() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let world = spawn_world(dir.path());
        let mut c = Client::connect(&world, SessionConfig::default());

        c.expect("player name: ").await;
        c.send("Alice").await;
        c.expect("Yes or no? ").await;
        c.send("y").await;
        c.expect("Enter a password: ").await;

        let mut other = Client::connect(&world, SessionConfig::default());
        other.expect("player name: ").await;
        other.send("alice").await;
        other.expect("Yes or no? ").await;
        other.send("y").await;
        other.expect("Enter a password: ").await;
        other.send("Other123x").await;
        other.expect("Hall\r\n").await;

        c.send("Passw0rd1").await;
        c.expect("The player name Alice was just taken.").await;
        c.expect("player name: ").await;

        let stored = world.load_player("alice").await.unwrap().unwrap();
        assert_eq!(stored.password_hash, password_digest("Other123x"));
        assert_eq!(stored.name, "alice");
    }

    #[tokio::test]
    async fn declining_ends_without_entering() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let world = spawn_world(dir.path());
        let mut c = Client::connect(&world, SessionConfig::default());

        c.expect("player name: ").await;
        c.send("x!").await;
        c.expect("The player name x! was not valid.").await;
        c.expect("Yes or no? ").await;
        c.send("maybe").await;
        c.expect("Yes or no? ").await;
        c.send("N").await;
        let (rest, res) = c.read_to_end().await;
        assert!(res.is_ok());
        assert!(rest.ends_with("bye\r\n"));
        assert!(!dir.path().join("players/x!.player").exists());
    }

    #[tokio::test]
    async fn second_login_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        std::fs::create_dir_all(dir.path().join("players")).unwrap();
        std::fs::write(
            dir.path().join("players/alice.player"),
            "[name]Alice[password]0[location]1",
        )
        .unwrap();
        let world = spawn_world(dir.path());
        let (tx, _rx) = mpsc::channel(16);
        let p = Player {
            name: "Alice".to_string(),
            ..Player::default()
        };
        world.enter(p, tx).await.unwrap().unwrap();

        let mut c = Client::connect(&world, SessionConfig::default());
        c.expect("player name: ").await;
        c.send("alice").await;
        c.expect("Enter your password: ").await;
        c.send("anything").await;
        c.expect("Alice is already playing.").await;
        let (_, res) = c.read_to_end().await;
        assert!(res.is_ok());
        assert_eq!(world.location("alice").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn verify_policy_checks_the_hash() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        std::fs::create_dir_all(dir.path().join("players")).unwrap();
        std::fs::write(
            dir.path().join("players/carol.player"),
            format!(
                "[name]Carol[password]{}[location]1",
                password_digest("Secret123")
            ),
        )
        .unwrap();
        let world = spawn_world(dir.path());
        let cfg = SessionConfig {
            password_policy: PasswordPolicy::Verify,
            ..SessionConfig::default()
        };
        let mut c = Client::connect(&world, cfg);

        c.expect("player name: ").await;
        c.send("carol").await;
        c.expect("Enter your password: ").await;
        c.send("Secret124").await;
        c.expect("The password was not correct.").await;
        c.expect("Yes or no? ").await;
        c.send("y").await;
        c.expect("Enter your password: ").await;
        c.send("Secret123").await;
        c.expect("Hall\r\n").await;
        c.send("exit").await;
        let (_, res) = c.read_to_end().await;
        assert!(res.is_ok());
    }

    #[test]
    fn hydrate_prefers_stored_casing() {
        let stored = Player {
            name: "McBob".to_string(),
            location: 7,
            ..Player::default()
        };
        let p = hydrate(stored.clone(), "mcbob");
        assert_eq!(p.name, "McBob");
        assert_eq!(p.location, 7);

        let unnamed = Player {
            name: String::new(),
            ..stored
        };
        assert_eq!(hydrate(unnamed, "mcbob").name, "mcbob");
    }
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use worldcore::{run_session, PasswordPolicy, SessionConfig, World, WorldConfig, WorldHandle};

fn usage_and_exit() -> ! {
    eprintln!(
        "mudd\n\n\
USAGE:\n  mudd [--bind HOST:PORT] [--data-dir DIR]\n\n\
ENV:\n  MUD_BIND                    default 127.0.0.1:4000\n  MUD_DATA_DIR                default data (holds areas/ and players/)\n  MUD_START_AREA              default 1\n  MUD_SEND_TIMEOUT_MS         default 2000 (min 10)\n  MUD_VERIFY_PASSWORDS        default off; 1/true/yes checks stored password hashes\n"
    );
    std::process::exit(2);
}

#[derive(Clone, Debug)]
struct Config {
    bind: SocketAddr,
    data_dir: PathBuf,
    start_area: u32,
    send_timeout_ms: u64,
    verify_passwords: bool,
}

fn parse_args() -> Config {
    let mut bind: SocketAddr = std::env::var("MUD_BIND")
        .unwrap_or_else(|_| "127.0.0.1:4000".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());
    let mut data_dir: PathBuf = std::env::var("MUD_DATA_DIR")
        .unwrap_or_else(|_| "data".to_string())
        .into();
    let start_area: u32 = std::env::var("MUD_START_AREA")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&v| v != 0)
        .unwrap_or(1);
    let send_timeout_ms: u64 = std::env::var("MUD_SEND_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2000)
        .max(10);
    let verify_passwords = std::env::var("MUD_VERIFY_PASSWORDS")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--bind" => {
                let v = it.next().unwrap_or_else(|| usage_and_exit());
                bind = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--data-dir" => {
                data_dir = it.next().unwrap_or_else(|| usage_and_exit()).into();
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config {
        bind,
        data_dir,
        start_area,
        send_timeout_ms,
        verify_passwords,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mudd=info,worldcore=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();

    let (world, _world_task) = WorldHandle::spawn(World::new(WorldConfig {
        data_dir: cfg.data_dir.clone(),
        start_area: cfg.start_area,
        send_timeout: Duration::from_millis(cfg.send_timeout_ms),
    }));
    let session_cfg = Arc::new(SessionConfig {
        password_policy: if cfg.verify_passwords {
            PasswordPolicy::Verify
        } else {
            PasswordPolicy::AcceptAny
        },
        ..SessionConfig::default()
    });

    let listener = TcpListener::bind(cfg.bind).await?;
    info!(
        bind = %cfg.bind,
        data_dir = %cfg.data_dir.display(),
        start_area = cfg.start_area,
        verify_passwords = cfg.verify_passwords,
        "mudd listening"
    );

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                warn!(err = %e, "accept failed");
                continue;
            }
        };
        let _ = stream.set_nodelay(true);

        let world = world.clone();
        let session_cfg = session_cfg.clone();
        tokio::spawn(async move {
            if let Err(e) = run_session(stream, peer, world, session_cfg).await {
                warn!(peer = %peer, err = %e, "session ended with error");
            }
        });
    }
}

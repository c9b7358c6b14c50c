//! File-backed persistence: `areas/<id>.area` and `players/<name_lc>.player`
//! under a data directory.

use std::path::{Path, PathBuf};

use crate::codec::{self, ParseError};
use crate::model::{name_key, Area, AreaId, Player};
use crate::validate::is_valid_playername;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn area_path(&self, id: AreaId) -> PathBuf {
        self.root.join("areas").join(format!("{id}.area"))
    }

    pub fn player_path(&self, name: &str) -> PathBuf {
        self.root
            .join("players")
            .join(format!("{}.player", name_key(name)))
    }

    /// `Ok(None)` when no record exists.
    pub async fn load_area(&self, id: AreaId) -> Result<Option<Area>, StoreError> {
        let path = self.area_path(id);
        let Some(text) = read_optional(&path).await? else {
            return Ok(None);
        };
        let mut a = codec::decode_area(&text).map_err(|source| StoreError::Parse {
            path: path.clone(),
            source,
        })?;
        // The file name is the identity; an [id] tag is informational.
        a.id = id;
        Ok(Some(a))
    }

    pub async fn save_area(&self, a: &Area) -> Result<(), StoreError> {
        write_atomic(&self.area_path(a.id), codec::encode_area(a)).await
    }

    /// `Ok(None)` when no record exists or the name could not name a file.
    pub async fn load_player(&self, name: &str) -> Result<Option<Player>, StoreError> {
        if !is_valid_playername(name.trim()) {
            return Ok(None);
        }
        let path = self.player_path(name);
        let Some(text) = read_optional(&path).await? else {
            return Ok(None);
        };
        codec::decode_player(&text)
            .map(Some)
            .map_err(|source| StoreError::Parse { path, source })
    }

    pub async fn save_player(&self, p: &Player) -> Result<(), StoreError> {
        if !is_valid_playername(p.name.trim()) {
            return Err(StoreError::Io {
                path: self.player_path(&p.name),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "player name is not usable as a file name",
                ),
            });
        }
        write_atomic(&self.player_path(&p.name), codec::encode_player(p)).await
    }

    pub async fn player_exists(&self, name: &str) -> bool {
        is_valid_playername(name.trim())
            && tokio::fs::try_exists(self.player_path(name))
                .await
                .unwrap_or(false)
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match tokio::fs::read(path).await {
        // Files are written as UTF-8, but hand-edited Latin-1 files still load.
        Ok(b) => Ok(Some(
            String::from_utf8(b).unwrap_or_else(|e| mudio::latin1::decode(e.as_bytes())),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn write_atomic(path: &Path, contents: String) -> Result<(), StoreError> {
    let io = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io)?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await.map_err(io)?;
    tokio::fs::rename(&tmp, path).await.map_err(io)?;
    Ok(())
}

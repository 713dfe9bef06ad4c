use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    session::Session,
};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DOCSIFT_DATA_DIR";

const SESSION_FILE: &str = "session.json";

/// On-disk home of the live retrieval session.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The DOCSIFT_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/docsift/)
    ///
    /// The directory is created if missing.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os(DATA_DIR_ENV) {
                Some(val) if !val.is_empty() => PathBuf::from(val),
                _ => xdg::BaseDirectories::with_prefix("docsift")
                    .get_data_home()
                    .ok_or_else(|| {
                        Error::Config("no XDG data home for docsift".into())
                    })?,
            },
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;
        tracing::debug!(root = %root.display(), "using data directory");

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the live session is persisted.
    pub fn session_file(&self) -> PathBuf {
        self.root.join(SESSION_FILE)
    }

    /// The saved session, or an empty one on first use.
    pub fn load_session(&self) -> Result<Session> {
        Session::load(&self.session_file())
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        session.save(&self.session_file())
    }

    /// Drop the saved session along with a temp file left by an
    /// interrupted save. Returns whether there was a session to drop.
    pub fn reset_session(&self) -> Result<bool> {
        let path = self.session_file();
        let stale = path.with_extension("json.tmp");
        if stale.exists() {
            std::fs::remove_file(&stale)?;
        }
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        tracing::info!(path = %path.display(), "removed session");
        Ok(true)
    }
}

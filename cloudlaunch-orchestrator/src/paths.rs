use cloudlaunch_common::{CloudLaunchError, Result};
use std::path::{Path, PathBuf};

/// Finds config files the way operators type them.
///
/// Candidates, in order:
/// 1. the path as given
/// 2. the path with a leading `~` expanded to the home directory
/// 3. the path joined onto the home directory
#[derive(Debug, Clone)]
pub struct FileLocator {
    home: Option<PathBuf>,
}

impl FileLocator {
    pub fn from_env() -> Self {
        Self {
            home: dirs::home_dir(),
        }
    }

    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
        }
    }

    pub fn locate(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        self.candidates(path)
            .into_iter()
            .find(|c| c.exists())
            .ok_or_else(|| CloudLaunchError::ConfigNotFound {
                path: path.to_path_buf(),
            })
    }

    fn candidates(&self, path: &Path) -> Vec<PathBuf> {
        let mut out = vec![path.to_path_buf()];
        if let Some(home) = &self.home {
            if let Ok(rest) = path.strip_prefix("~") {
                out.push(home.join(rest));
            }
            out.push(home.join(path));
        }
        out
    }
}

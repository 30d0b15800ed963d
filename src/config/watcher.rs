//! Config file watcher: re-reads the file on change and forwards every
//! config that loads and validates.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ComposerConfig;

/// Watches one config file and sends reloaded configs to the server.
pub struct ConfigWatcher {
    path: PathBuf,
    updates: mpsc::UnboundedSender<ComposerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end the server consumes.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ComposerConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                updates,
            },
            rx,
        )
    }

    /// Start watching. Events stop when the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, updates } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    reload(&watched, &updates);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

/// Load `path` and forward it; a broken file keeps the current site.
fn reload(path: &Path, updates: &mpsc::UnboundedSender<ComposerConfig>) -> bool {
    tracing::info!(path = %path.display(), "Config file changed, reloading");
    match load_config(path) {
        Ok(config) => updates.send(config).is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config, keeping current site");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reload_forwards_valid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[pages]]\nname = \"about\"\nroutes = [\"/about\"]").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(file.path());
        assert!(reload(&watcher.path, &watcher.updates));
        assert_eq!(rx.try_recv().unwrap().pages[0].name, "about");
    }

    #[test]
    fn test_reload_drops_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[pages]]\nname = \"about\"\nroutes = [\"about\"]").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(file.path());
        assert!(!reload(&watcher.path, &watcher.updates));
        assert!(rx.try_recv().is_err());
    }
}

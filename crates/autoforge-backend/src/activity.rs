//! Active session counting from the backend's server log.
//!
//! The backend logs `Updated session <id> status to running`, `Updated
//! session <id> status to completed` and `Session <id> cleaned`. A session is
//! active when it was seen running and never seen completing or cleaned.
//!
//! Only what is still in the log file counts: rotation drops history and can
//! undercount sessions that started before it.

use async_trait::async_trait;
use autoforge_core::Result;
use autoforge_core::backend::ActiveSessionCounter;
use regex::bytes::Regex;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

// Byte patterns: agent output in the log is not guaranteed to be UTF-8.
static RUNNING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Updated session ([a-f0-9-]+) status to running").unwrap());
static FINISHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Updated session ([a-f0-9-]+) status to completed|Session ([a-f0-9-]+) cleaned")
        .unwrap()
});

pub struct LogActiveSessionCounter {
    path: PathBuf,
}

impl LogActiveSessionCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ActiveSessionCounter for LogActiveSessionCounter {
    async fn active_sessions(&self) -> Result<usize> {
        let file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Backend log not found, assuming idle");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let mut tally = SessionTally::default();
        let mut lines = BufReader::new(file).split(b'\n');
        while let Some(line) = lines.next_segment().await? {
            tally.observe(&line);
        }
        Ok(tally.active())
    }
}

/// Sessions seen running and sessions seen finishing.
#[derive(Default)]
struct SessionTally {
    running: HashSet<Vec<u8>>,
    finished: HashSet<Vec<u8>>,
}

impl SessionTally {
    fn observe(&mut self, line: &[u8]) {
        if let Some(caps) = RUNNING.captures(line) {
            self.running.insert(caps[1].to_vec());
        }
        if let Some(caps) = FINISHED.captures(line) {
            if let Some(id) = caps.get(1).or_else(|| caps.get(2)) {
                self.finished.insert(id.as_bytes().to_vec());
            }
        }
    }

    fn active(&self) -> usize {
        self.running.difference(&self.finished).count()
    }
}

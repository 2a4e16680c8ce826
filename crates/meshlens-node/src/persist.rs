//! Learned channel mappings on disk
//!
//! The registry reports changes through a callback; here that callback
//! feeds an unbounded channel drained by a background task, so decode
//! never waits on the file system.

use anyhow::{Context, Result};
use meshlens_meshtastic::PersistCallback;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Channel name to slot, as stored on disk
pub type ChannelMap = BTreeMap<String, u8>;

/// Read stored mappings; a missing file is an empty map
pub async fn load_channel_map(path: &Path) -> Result<ChannelMap> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => serde_json::from_str(&text)
            .with_context(|| format!("parsing channel store {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ChannelMap::new()),
        Err(e) => Err(e).with_context(|| format!("reading channel store {}", path.display())),
    }
}

/// Apply one change, dropping any other name that held the slot
fn apply(map: &mut ChannelMap, name: String, slot: u8) {
    map.retain(|existing, s| *s != slot || *existing == name);
    map.insert(name, slot);
}

async fn save(path: &Path, map: &ChannelMap) -> Result<()> {
    let json = serde_json::to_string_pretty(map)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("writing channel store {}", path.display()))
}

/// Start the writer task
///
/// The task ends once every clone of the returned callback is dropped and
/// yields the final map.
pub fn spawn_persistence(
    path: PathBuf,
    initial: ChannelMap,
) -> (PersistCallback, JoinHandle<ChannelMap>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, u8)>();

    let handle = tokio::spawn(async move {
        let mut map = initial;
        while let Some((name, slot)) = rx.recv().await {
            apply(&mut map, name, slot);
            // Coalesce whatever queued up meanwhile into one write
            while let Ok((name, slot)) = rx.try_recv() {
                apply(&mut map, name, slot);
            }
            match save(&path, &map).await {
                Ok(()) => debug!(entries = map.len(), "Saved channel mappings"),
                Err(e) => warn!("Failed to save channel mappings: {:#}", e),
            }
        }
        map
    });

    let callback: PersistCallback = Arc::new(move |name: &str, slot: u8| {
        tx.send((name.to_string(), slot))
            .map_err(|e| format!("channel store writer stopped: {e}"))
    });

    (callback, handle)
}

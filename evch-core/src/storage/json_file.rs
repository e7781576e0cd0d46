use super::{ResourceStore, StoreError};
use async_trait::async_trait;
use evch_sdk::objects::{EventId, GuildId, GuildState, StateDocument, StoredEvent};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A JSON document on disk holding the resource ids of every guild.
///
/// The document is cached in memory and rewritten as a whole on every change,
/// atomically through a temporary file. Entries read in the legacy scalar
/// `voice` form are written back as lists.
pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<StateDocument>,
}

impl JsonFileStore {
    /// Open the state file, starting empty when it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => StateDocument::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "State file not found, starting empty");
                StateDocument::new()
            }
            Err(e) => return Err(e.into()),
        };
        debug!(
            path = %path.display(),
            guilds = document.len(),
            "Loaded state file"
        );
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    async fn rewrite(&self, document: &StateDocument) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(document)?;
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for JsonFileStore {
    async fn load(&self, guild: GuildId) -> Result<GuildState, StoreError> {
        Ok(self
            .document
            .lock()
            .await
            .get(&guild)
            .cloned()
            .unwrap_or_default())
    }

    async fn put(
        &self,
        guild: GuildId,
        event: EventId,
        entry: StoredEvent,
    ) -> Result<(), StoreError> {
        let mut document = self.document.lock().await;
        document.entry(guild).or_default().insert(event, entry);
        self.rewrite(&document).await
    }

    async fn remove(&self, guild: GuildId, event: EventId) -> Result<(), StoreError> {
        let mut document = self.document.lock().await;
        let Some(state) = document.get_mut(&guild) else {
            return Ok(());
        };
        if state.remove(&event).is_none() {
            return Ok(());
        }
        if state.is_empty() {
            document.remove(&guild);
        }
        self.rewrite(&document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evch_sdk::objects::{ChannelId, RoleId};
    use smallvec::smallvec;

    #[tokio::test]
    async fn legacy_scalar_voice_is_rewritten_as_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(
            &path,
            r#"{"10": {"20": {"text": 1, "voice": 2, "role": 3}, "21": {"text": 4, "voice": [5, 6], "role": 7}}}"#,
        )
        .await
        .unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        let state = store.load(GuildId(10)).await.unwrap();
        assert_eq!(state[&EventId(20)].voice.as_slice(), &[ChannelId(2)]);

        store.remove(GuildId(10), EventId(21)).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({"10": {"20": {"text": 1, "voice": [2], "role": 3}}})
        );
    }

    #[tokio::test]
    async fn missing_file_starts_empty_and_is_created_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        assert!(store.load(GuildId(1)).await.unwrap().is_empty());

        let entry = StoredEvent {
            text: Some(ChannelId(11)),
            voice: smallvec![ChannelId(12), ChannelId(13)],
            role: Some(RoleId(14)),
        };
        store.put(GuildId(1), EventId(2), entry.clone()).await.unwrap();

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.load(GuildId(1)).await.unwrap()[&EventId(2)], entry);
        assert!(!path.with_extension("json.tmp").exists());
    }
}

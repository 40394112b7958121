use async_trait::async_trait;
use resumer_core::{Entry, ResumerError, ResumerResult};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Durable conversation history. Finished replies are appended here once
/// their recording completes.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn append(&self, entry: Entry) -> ResumerResult<()>;
    async fn list(&self, conversation_id: Uuid) -> ResumerResult<Vec<Entry>>;
}

/// One JSON-lines file per conversation.
pub struct FileEntryStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileEntryStore {
    pub async fn new(dir: PathBuf) -> ResumerResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn entries_path(&self, conversation_id: Uuid) -> PathBuf {
        self.dir.join(format!("{conversation_id}.entries.jsonl"))
    }
}

#[async_trait]
impl EntryStore for FileEntryStore {
    async fn append(&self, entry: Entry) -> ResumerResult<()> {
        let path = self.entries_path(entry.conversation_id);
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list(&self, conversation_id: Uuid) -> ResumerResult<Vec<Entry>> {
        let path = self.entries_path(conversation_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut entries = data
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str::<Entry>(l).map_err(|e| {
                    ResumerError::Store(format!("Corrupt entry in {}: {e}", path.display()))
                })
            })
            .collect::<ResumerResult<Vec<_>>>()?;
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }
}

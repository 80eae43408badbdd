use super::format::{self, Block, ParsedTranscript};
use super::{TranscriptError, TurnDraft};
use crate::agents::base::HistoryEntry;
use chrono::{Local, Utc};
use dk_protocol::conversation_models::{
    Conversation, ConversationStatus, StopReason, Turn,
};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

const FRESH_PREFIX: &str = "debate";
const RESET_PREFIX: &str = "debate_reset";
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Index entry for one transcript file.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptInfo {
    pub path: PathBuf,
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub topic: String,
    pub status: ConversationStatus,
    pub turns: usize,
    pub stop_reason: Option<StopReason>,
}

/// What [`TranscriptStore::open_or_create`] found.
#[derive(Debug)]
pub enum OpenOutcome {
    /// An active conversation, possibly reached by following resets.
    Resumed {
        handle: ConversationHandle,
        warnings: Vec<String>,
    },
    /// No transcript carried the id; a new one was created under it.
    Created(ConversationHandle),
    /// The transcript was unreadable; a fresh conversation replaces it.
    Recovered {
        handle: ConversationHandle,
        warning: String,
    },
    /// The conversation already ended.
    Finished {
        conversation: Conversation,
        path: PathBuf,
        rounds: u32,
    },
}

/// Exclusive write access to one active conversation's transcript.
#[derive(Debug)]
pub struct ConversationHandle {
    conversation: Conversation,
    path: PathBuf,
    file: File,
    /// File length after the last complete block.
    len: u64,
    /// A failed write could not be rolled back; the file takes no more blocks.
    poisoned: bool,
}

async fn write_and_sync(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_data().await
}

impl ConversationHandle {
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn id(&self) -> Uuid {
        self.conversation.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An owned copy of the history for an adapter request.
    pub fn history_snapshot(&self) -> Vec<HistoryEntry> {
        self.conversation.turns.iter().map(HistoryEntry::from).collect()
    }

    fn ensure_active(&self) -> Result<(), TranscriptError> {
        if self.conversation.is_active() {
            Ok(())
        } else {
            Err(TranscriptError::NotActive {
                id: self.conversation.id,
                status: self.conversation.status,
            })
        }
    }

    async fn write_block(&mut self, block: &Block) -> Result<(), TranscriptError> {
        if self.poisoned {
            return Err(TranscriptError::Poisoned(self.path.clone()));
        }

        let bytes = block.render();
        match write_and_sync(&mut self.file, bytes.as_bytes()).await {
            Ok(()) => {
                self.len += bytes.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.rollback().await;
                Err(TranscriptError::io(&self.path, e))
            }
        }
    }

    /// Cut the file back to its last complete block after a failed write.
    async fn rollback(&mut self) {
        let restored = match self.file.set_len(self.len).await {
            Ok(()) => self.file.sync_data().await,
            Err(e) => Err(e),
        };
        if let Err(e) = restored {
            warn!(
                path = %self.path.display(),
                error = %e,
                "could not roll back a partial write; refusing further writes"
            );
            self.poisoned = true;
        }
    }

    /// Write the turn to storage, then record it in memory.
    pub async fn append(&mut self, draft: TurnDraft) -> Result<Turn, TranscriptError> {
        self.ensure_active()?;

        let turn = Turn {
            index: self.conversation.next_index(),
            speaker: draft.speaker,
            persona: draft.persona,
            stance: draft.stance,
            content: draft.content,
            round: draft.round,
            origin: draft.origin,
            timestamp: Utc::now(),
        };

        self.write_block(&Block::turn(&turn)).await?;
        self.conversation.turns.push(turn.clone());

        debug!(
            conversation_id = %self.conversation.id,
            index = turn.index,
            speaker = %turn.speaker,
            round = turn.round,
            "turn appended"
        );
        Ok(turn)
    }

    /// Close this conversation as superseded by `child`.
    ///
    /// Consumes the handle: a compressed conversation accepts no writes.
    pub async fn mark_compressed(mut self, child: Uuid) -> Result<Conversation, TranscriptError> {
        self.ensure_active()?;
        self.write_block(&Block::Compressed {
            child,
            at: Utc::now(),
        })
        .await?;

        self.conversation.status = ConversationStatus::Compressed;
        self.conversation.child_id = Some(child);
        info!(conversation_id = %self.conversation.id, child = %child, "conversation compressed");
        Ok(self.conversation)
    }

    /// Write the terminated footer.
    pub async fn terminate(&mut self, reason: StopReason, rounds: u32) -> Result<(), TranscriptError> {
        self.ensure_active()?;
        self.write_block(&Block::Terminated {
            reason,
            rounds,
            at: Utc::now(),
        })
        .await?;

        self.conversation.status = ConversationStatus::Terminated;
        self.conversation.stop_reason = Some(reason);
        info!(
            conversation_id = %self.conversation.id,
            reason = %reason,
            rounds,
            "conversation terminated"
        );
        Ok(())
    }

    pub fn into_conversation(self) -> Conversation {
        self.conversation
    }
}

/// Collision suffixes are zero-padded so name order stays creation order.
fn file_name(prefix: &str, stamp: &str, attempt: u32) -> String {
    match attempt {
        0 => format!("{prefix}_{stamp}.txt"),
        n => format!("{prefix}_{stamp}_{n:03}.txt"),
    }
}

/// The directory holding every transcript file.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    dir: PathBuf,
}

impl TranscriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn create_file(&self, prefix: &str) -> Result<(PathBuf, File), TranscriptError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| TranscriptError::io(&self.dir, e))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(file_name(prefix, &stamp, attempt));

            match OpenOptions::new()
                .append(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(TranscriptError::io(path, e)),
            }
        }

        Err(TranscriptError::NameExhausted(
            self.dir.join(format!("{prefix}_{stamp}.txt")),
        ))
    }

    #[cfg(unix)]
    async fn sync_dir(&self) -> Result<(), TranscriptError> {
        let dir = File::open(&self.dir)
            .await
            .map_err(|e| TranscriptError::io(&self.dir, e))?;
        dir.sync_all()
            .await
            .map_err(|e| TranscriptError::io(&self.dir, e))
    }

    #[cfg(not(unix))]
    async fn sync_dir(&self) -> Result<(), TranscriptError> {
        Ok(())
    }

    /// Create a new conversation file and write its header.
    ///
    /// Conversations with a parent are named `debate_reset_<ts>.txt`.
    pub async fn create(
        &self,
        id: Uuid,
        topic: &str,
        parent: Option<Uuid>,
    ) -> Result<ConversationHandle, TranscriptError> {
        let prefix = if parent.is_some() {
            RESET_PREFIX
        } else {
            FRESH_PREFIX
        };
        let (path, file) = self.create_file(prefix).await?;

        let mut handle = ConversationHandle {
            conversation: Conversation::new(id, topic.to_string(), parent),
            path,
            file,
            len: 0,
            poisoned: false,
        };
        let header = Block::header(&handle.conversation);
        handle.write_block(&header).await?;
        self.sync_dir().await?;

        info!(
            conversation_id = %id,
            parent = ?parent,
            path = %handle.path.display(),
            "conversation created"
        );
        Ok(handle)
    }

    /// Transcript files in name order, which is creation order.
    pub async fn transcripts(&self) -> Result<Vec<PathBuf>, TranscriptError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TranscriptError::io(&self.dir, e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TranscriptError::io(&self.dir, e))?
        {
            let path = entry.path();
            let is_transcript = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("debate_") && n.ends_with(".txt"));
            if is_transcript {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    pub async fn load(&self, path: &Path) -> Result<ParsedTranscript, TranscriptError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TranscriptError::io(path, e))?;
        format::parse_bytes(&bytes).map_err(|source| TranscriptError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Every readable transcript; unreadable files are skipped with a warning.
    pub async fn list(&self) -> Result<Vec<TranscriptInfo>, TranscriptError> {
        let mut infos = Vec::new();
        for path in self.transcripts().await? {
            match self.load(&path).await {
                Ok(parsed) => {
                    let conversation = parsed.conversation;
                    infos.push(TranscriptInfo {
                        path,
                        id: conversation.id,
                        parent_id: conversation.parent_id,
                        topic: conversation.topic,
                        status: conversation.status,
                        turns: conversation.turns.len(),
                        stop_reason: conversation.stop_reason,
                    });
                }
                Err(e) => warn!(error = %e, "skipping unreadable transcript"),
            }
        }
        Ok(infos)
    }

    /// Header ids of every transcript whose header parses.
    async fn headers(&self) -> Result<Vec<(PathBuf, Uuid, Option<Uuid>)>, TranscriptError> {
        let mut headers = Vec::new();
        for path in self.transcripts().await? {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable transcript");
                    continue;
                }
            };
            match format::parse_header_bytes(&bytes) {
                Ok(Block::Header { id, parent, .. }) => headers.push((path, id, parent)),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping transcript without a readable header")
                }
            }
        }
        Ok(headers)
    }

    /// Path of the transcript recording conversation `id`.
    pub async fn find(&self, id: Uuid) -> Result<Option<PathBuf>, TranscriptError> {
        Ok(self
            .headers()
            .await?
            .into_iter()
            .find(|(_, header_id, _)| *header_id == id)
            .map(|(path, _, _)| path))
    }

    async fn find_child(&self, parent: Uuid) -> Result<Option<(PathBuf, Uuid)>, TranscriptError> {
        Ok(self
            .headers()
            .await?
            .into_iter()
            .filter(|(_, _, p)| *p == Some(parent))
            .map(|(path, id, _)| (path, id))
            .last())
    }

    /// Reopen an active transcript for appending, cutting off a torn tail.
    async fn reopen(
        &self,
        path: PathBuf,
        parsed: ParsedTranscript,
        warnings: &mut Vec<String>,
    ) -> Result<ConversationHandle, TranscriptError> {
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| TranscriptError::io(&path, e))?;

        if parsed.torn_tail {
            let warning = format!(
                "dropped a partially written block at the end of {}",
                path.display()
            );
            warn!(path = %path.display(), valid_len = parsed.valid_len, "truncating torn transcript tail");
            file.set_len(parsed.valid_len as u64)
                .await
                .map_err(|e| TranscriptError::io(&path, e))?;
            file.sync_data()
                .await
                .map_err(|e| TranscriptError::io(&path, e))?;
            warnings.push(warning);
        }
        if parsed.skipped_blocks > 0 {
            warnings.push(format!(
                "skipped {} incomplete block(s) in {}",
                parsed.skipped_blocks,
                path.display()
            ));
        }

        Ok(ConversationHandle {
            conversation: parsed.conversation,
            path,
            file,
            len: parsed.valid_len as u64,
            poisoned: false,
        })
    }

    async fn recover(
        &self,
        id: Uuid,
        topic: Option<String>,
        reason: String,
    ) -> Result<OpenOutcome, TranscriptError> {
        let topic = topic.ok_or(TranscriptError::MissingTopic(id))?;
        let handle = self.create(Uuid::new_v4(), &topic, None).await?;
        let warning = format!(
            "could not resume conversation {}: {}; started fresh conversation {}",
            id,
            reason,
            handle.id()
        );
        warn!(conversation_id = %id, new_conversation_id = %handle.id(), reason = %reason, "resume fell back to a fresh conversation");
        Ok(OpenOutcome::Recovered { handle, warning })
    }

    /// Resume `id` from storage, or create it.
    ///
    /// Compressed conversations are followed to their newest descendant. A
    /// conversation whose reset never got its footer is healed on the way.
    /// `topic` is required when a new conversation has to be created and
    /// takes precedence over a topic recovered from a broken file.
    pub async fn open_or_create(
        &self,
        id: Uuid,
        topic: Option<&str>,
    ) -> Result<OpenOutcome, TranscriptError> {
        let Some(mut path) = self.find(id).await? else {
            let topic = topic.ok_or(TranscriptError::MissingTopic(id))?;
            return Ok(OpenOutcome::Created(self.create(id, topic, None).await?));
        };

        let mut warnings = Vec::new();
        let mut visited = HashSet::new();

        loop {
            if !visited.insert(path.clone()) {
                return self
                    .recover(id, topic.map(str::to_string), "lineage loops".to_string())
                    .await;
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    return self
                        .recover(id, topic.map(str::to_string), e.to_string())
                        .await;
                }
            };

            let parsed = match format::parse_bytes(&bytes) {
                Ok(parsed) => parsed,
                Err(e) => {
                    let recovered_topic = match format::parse_header_bytes(&bytes) {
                        Ok(Block::Header { topic, .. }) => Some(topic),
                        _ => None,
                    };
                    let topic = topic.map(str::to_string).or(recovered_topic);
                    return self.recover(id, topic, e.to_string()).await;
                }
            };

            let current = parsed.conversation.id;
            match parsed.conversation.status {
                ConversationStatus::Active => {
                    if let Some((child_path, child_id)) = self.find_child(current).await? {
                        warnings.push(format!(
                            "conversation {current} was reset into {child_id} without its footer; marked it compressed"
                        ));
                        let handle = self.reopen(path, parsed, &mut warnings).await?;
                        handle.mark_compressed(child_id).await?;
                        path = child_path;
                        continue;
                    }

                    let handle = self.reopen(path, parsed, &mut warnings).await?;
                    info!(conversation_id = %handle.id(), turns = handle.conversation().turns.len(), "conversation resumed");
                    return Ok(OpenOutcome::Resumed { handle, warnings });
                }
                ConversationStatus::Compressed => {
                    let next = match parsed.conversation.child_id {
                        Some(child) => self.find(child).await?,
                        None => None,
                    };
                    match next {
                        Some(next) => {
                            debug!(from = %current, to = %next.display(), "following reset lineage");
                            path = next;
                        }
                        None => {
                            let topic = topic
                                .map(str::to_string)
                                .or(Some(parsed.conversation.topic));
                            return self
                                .recover(id, topic, format!("successor of {current} is missing"))
                                .await;
                        }
                    }
                }
                ConversationStatus::Terminated => {
                    return Ok(OpenOutcome::Finished {
                        rounds: parsed.recorded_rounds.unwrap_or_default(),
                        conversation: parsed.conversation,
                        path,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dk_protocol::conversation_models::TurnOrigin;
    use tempfile::TempDir;

    async fn store() -> (TempDir, TranscriptStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(temp.path().join("transcripts"));
        (temp, store)
    }

    #[tokio::test]
    async fn test_create_writes_header_and_names_file() {
        let (_temp, store) = store().await;
        let id = Uuid::new_v4();

        let handle = store.create(id, "topic", None).await.unwrap();
        let name = handle.path().file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("debate_") && !name.starts_with("debate_reset_"));

        let parsed = store.load(handle.path()).await.unwrap();
        assert_eq!(parsed.conversation.id, id);
        assert!(parsed.conversation.turns.is_empty());

        let child = store.create(Uuid::new_v4(), "topic", Some(id)).await.unwrap();
        let name = child.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("debate_reset_"));
    }

    #[tokio::test]
    async fn test_same_second_names_do_not_collide() {
        let (_temp, store) = store().await;

        let a = store.create(Uuid::new_v4(), "a", None).await.unwrap();
        let b = store.create(Uuid::new_v4(), "b", None).await.unwrap();
        let c = store.create(Uuid::new_v4(), "c", None).await.unwrap();

        assert_ne!(a.path(), b.path());
        assert_ne!(b.path(), c.path());
        let listed = store.transcripts().await.unwrap();
        assert_eq!(listed.len(), 3);
    }

    #[tokio::test]
    async fn test_append_is_durable_and_ordered() {
        let (_temp, store) = store().await;
        let mut handle = store.create(Uuid::new_v4(), "topic", None).await.unwrap();

        let first = handle.append(TurnDraft::agent("a", "one", 1)).await.unwrap();
        let second = handle.append(TurnDraft::user("two", 1)).await.unwrap();
        assert_eq!((first.index, second.index), (0, 1));
        assert_eq!(second.origin, TurnOrigin::User);

        // read back without closing the handle
        let parsed = store.load(handle.path()).await.unwrap();
        assert_eq!(parsed.conversation.turns.len(), 2);
        assert_eq!(parsed.conversation.turns[1].speaker, "user");
    }

    #[tokio::test]
    async fn test_terminated_conversation_rejects_appends() {
        let (_temp, store) = store().await;
        let mut handle = store.create(Uuid::new_v4(), "topic", None).await.unwrap();

        handle.terminate(StopReason::Sentinel, 1).await.unwrap();
        let result = handle.append(TurnDraft::agent("a", "late", 1)).await;
        assert!(matches!(result, Err(TranscriptError::NotActive { .. })));
    }

    #[tokio::test]
    async fn test_open_or_create_unknown_id() {
        let (_temp, store) = store().await;
        let id = Uuid::new_v4();

        assert!(matches!(
            store.open_or_create(id, None).await,
            Err(TranscriptError::MissingTopic(missing)) if missing == id
        ));

        match store.open_or_create(id, Some("new topic")).await.unwrap() {
            OpenOutcome::Created(handle) => {
                assert_eq!(handle.id(), id);
                assert_eq!(handle.conversation().topic, "new topic");
            }
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_reports_status() {
        let (_temp, store) = store().await;
        let mut handle = store.create(Uuid::new_v4(), "topic", None).await.unwrap();
        handle.append(TurnDraft::agent("a", "x", 1)).await.unwrap();
        handle.terminate(StopReason::MaxRounds, 1).await.unwrap();

        let infos = store.list().await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].status, ConversationStatus::Terminated);
        assert_eq!(infos[0].stop_reason, Some(StopReason::MaxRounds));
        assert_eq!(infos[0].turns, 1);
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let (_temp, store) = store().await;
        assert!(store.transcripts().await.unwrap().is_empty());
        assert!(store.find(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[test]
    fn test_file_names_sort_in_creation_order() {
        let names: Vec<String> = (0..15)
            .map(|attempt| file_name("debate", "20261019_120000", attempt))
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(sorted, names);
        assert_eq!(names[12], "debate_20261019_120000_012.txt");
        assert!(names[14] < file_name("debate", "20261019_120001", 0));
    }

    #[tokio::test]
    async fn test_rollback_removes_a_partial_write() {
        let (_temp, store) = store().await;
        let mut handle = store.create(Uuid::new_v4(), "topic", None).await.unwrap();
        handle.append(TurnDraft::agent("a", "one", 1)).await.unwrap();

        // what a write failing halfway leaves behind
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(handle.path())
            .unwrap();
        std::io::Write::write_all(
            &mut file,
            format!("{}\nRound 2 - b\n{}\nhal", format::RULE, format::RULE).as_bytes(),
        )
        .unwrap();
        drop(file);

        handle.rollback().await;
        assert!(!handle.poisoned);
        handle.terminate(StopReason::FatalError, 1).await.unwrap();

        let parsed = store.load(handle.path()).await.unwrap();
        assert_eq!(parsed.conversation.status, ConversationStatus::Terminated);
        assert_eq!(parsed.conversation.turns.len(), 1);
        assert_eq!(parsed.skipped_blocks, 0);
        assert!(!parsed.torn_tail);
    }

    #[tokio::test]
    async fn test_poisoned_handle_refuses_writes() {
        let (_temp, store) = store().await;
        let mut handle = store.create(Uuid::new_v4(), "topic", None).await.unwrap();
        handle.poisoned = true;

        let result = handle.append(TurnDraft::agent("a", "late", 1)).await;
        assert!(matches!(result, Err(TranscriptError::Poisoned(_))));
        let result = handle.terminate(StopReason::FatalError, 0).await;
        assert!(matches!(result, Err(TranscriptError::Poisoned(_))));
    }

    #[tokio::test]
    async fn test_character_cut_by_a_torn_write_is_found_and_truncated() {
        let (_temp, store) = store().await;
        let id = Uuid::new_v4();
        let mut handle = store.create(id, "café", None).await.unwrap();
        handle.append(TurnDraft::agent("a", "naïve", 1)).await.unwrap();
        let path = handle.path().to_path_buf();
        drop(handle);

        let mut tail = format!("{}\nRound 2 - b\n{}\nr", format::RULE, format::RULE).into_bytes();
        tail.push("é".as_bytes()[0]);
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        std::io::Write::write_all(&mut file, &tail).unwrap();
        drop(file);

        assert_eq!(store.find(id).await.unwrap(), Some(path.clone()));

        match store.open_or_create(id, Some("café")).await.unwrap() {
            OpenOutcome::Resumed { handle, warnings } => {
                assert_eq!(handle.id(), id);
                assert_eq!(warnings.len(), 1);
                assert_eq!(handle.conversation().turns.len(), 1);
                assert_eq!(handle.len, std::fs::metadata(&path).unwrap().len());
            }
            other => panic!("expected Resumed, got {other:?}"),
        }

        let bytes = std::fs::read(&path).unwrap();
        assert!(std::str::from_utf8(&bytes).is_ok());
        assert_eq!(store.transcripts().await.unwrap().len(), 1);
    }
}

//! In-memory reference implementation of the messaging queue store.
//!
//! Rows live in one ordered list so a conversation's pending messages and
//! file transfers dequeue in creation order, the way the durable history
//! store serves them.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use messaging_core::{
    ChatMessage, FileTransferRecord, MessageStatus, QueueEntry, QueuedFileTransfer, QueuedMessage,
    ReasonCode, StoreError, TransferState,
    store::QueueStore,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    chat_id: String,
    message: ChatMessage,
}

#[derive(Debug, Clone)]
struct StoredTransfer {
    record: FileTransferRecord,
    file_ref: String,
    download_descriptor: Option<String>,
}

#[derive(Debug, Clone)]
enum Row {
    Message(StoredMessage),
    Transfer(StoredTransfer),
}

/// In-memory queue store; rows keep insertion (creation) order.
#[derive(Clone, Default)]
pub struct InMemoryQueueStore {
    rows: Arc<RwLock<Vec<Row>>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outbound message for a conversation.
    pub fn enqueue_message(&self, chat_id: impl Into<String>, message: ChatMessage) {
        self.write_rows().push(Row::Message(StoredMessage {
            chat_id: chat_id.into(),
            message,
        }));
    }

    /// Append a file transfer record together with its content reference.
    pub fn enqueue_file_transfer(&self, record: FileTransferRecord, file_ref: impl Into<String>) {
        self.write_rows().push(Row::Transfer(StoredTransfer {
            record,
            file_ref: file_ref.into(),
            download_descriptor: None,
        }));
    }

    /// Attach the download descriptor produced when an upload finished.
    pub fn set_download_descriptor(
        &self,
        transfer_id: &str,
        descriptor_xml: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut rows = self.write_rows();
        let transfer = find_transfer_mut(&mut rows, transfer_id)
            .ok_or_else(|| StoreError::NotFound(transfer_id.to_owned()))?;
        transfer.download_descriptor = Some(descriptor_xml.into());
        Ok(())
    }

    /// Record the durable upload handle for an in-progress transfer.
    pub fn set_upload_transaction_id(
        &self,
        transfer_id: &str,
        upload_transaction_id: impl Into<String>,
    ) -> Result<(), StoreError> {
        let mut rows = self.write_rows();
        let transfer = find_transfer_mut(&mut rows, transfer_id)
            .ok_or_else(|| StoreError::NotFound(transfer_id.to_owned()))?;
        transfer.record.upload_transaction_id = Some(upload_transaction_id.into());
        Ok(())
    }

    /// A message row, by id.
    pub fn message(&self, msg_id: &str) -> Option<ChatMessage> {
        self.read_rows().iter().find_map(|row| match row {
            Row::Message(stored) if stored.message.id == msg_id => Some(stored.message.clone()),
            _ => None,
        })
    }

    fn read_rows(&self) -> RwLockReadGuard<'_, Vec<Row>> {
        self.rows
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_rows(&self) -> RwLockWriteGuard<'_, Vec<Row>> {
        self.rows
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn find_transfer_mut<'a>(rows: &'a mut Vec<Row>, transfer_id: &str) -> Option<&'a mut StoredTransfer> {
    rows.iter_mut().find_map(|row| match row {
        Row::Transfer(stored) if stored.record.id == transfer_id => Some(stored),
        _ => None,
    })
}

/// Writes must follow the monotonic transfer state graph; PAUSED -> STARTED
/// is the only back-edge.
fn is_legal_transition(from: TransferState, to: TransferState) -> bool {
    use TransferState::*;

    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (Invited, Queued)
            | (Invited, Started)
            | (Invited, Failed)
            | (Queued, Started)
            | (Queued, Failed)
            | (Started, Paused)
            | (Started, Transferred)
            | (Started, Failed)
            | (Paused, Started)
            | (Paused, Failed)
    )
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn queued_entries(&self, chat_id: &str) -> Result<Vec<QueueEntry>, StoreError> {
        let rows = self.read_rows();
        let entries: Vec<QueueEntry> = rows
            .iter()
            .filter_map(|row| match row {
                Row::Message(stored)
                    if stored.chat_id == chat_id
                        && stored.message.status == MessageStatus::Queued =>
                {
                    Some(QueueEntry::Message(QueuedMessage {
                        id: stored.message.id.clone(),
                        mime_type: stored.message.mime_type.clone(),
                        content: stored.message.content.clone(),
                    }))
                }
                Row::Transfer(stored)
                    if stored.record.chat_id == chat_id
                        && matches!(
                            stored.record.state,
                            TransferState::Queued | TransferState::Started
                        ) =>
                {
                    Some(QueueEntry::FileTransfer(QueuedFileTransfer {
                        id: stored.record.id.clone(),
                        state: stored.record.state,
                        file_ref: stored.file_ref.clone(),
                        file_icon_ref: stored.record.file_icon_ref.clone(),
                        file_size: stored.record.file_size,
                    }))
                }
                _ => None,
            })
            .collect();
        debug!(chat_id, pending = entries.len(), "queued entries query");
        Ok(entries)
    }

    async fn file_transfer_record(
        &self,
        transfer_id: &str,
    ) -> Result<Option<FileTransferRecord>, StoreError> {
        Ok(self.read_rows().iter().find_map(|row| match row {
            Row::Transfer(stored) if stored.record.id == transfer_id => {
                Some(stored.record.clone())
            }
            _ => None,
        }))
    }

    async fn set_file_transfer_state(
        &self,
        transfer_id: &str,
        _chat_id: &str,
        state: TransferState,
        reason: ReasonCode,
    ) -> Result<(), StoreError> {
        let mut rows = self.write_rows();
        let transfer = find_transfer_mut(&mut rows, transfer_id)
            .ok_or_else(|| StoreError::NotFound(transfer_id.to_owned()))?;
        if !is_legal_transition(transfer.record.state, state) {
            return Err(StoreError::IllegalTransition {
                id: transfer_id.to_owned(),
                from: transfer.record.state,
                to: state,
            });
        }
        transfer.record.state = state;
        transfer.record.reason_code = reason;
        Ok(())
    }

    async fn set_message_status(
        &self,
        msg_id: &str,
        status: MessageStatus,
        reason: ReasonCode,
    ) -> Result<(), StoreError> {
        let mut rows = self.write_rows();
        let stored = rows
            .iter_mut()
            .find_map(|row| match row {
                Row::Message(stored) if stored.message.id == msg_id => Some(stored),
                _ => None,
            })
            .ok_or_else(|| StoreError::NotFound(msg_id.to_owned()))?;
        stored.message.status = status;
        stored.message.reason_code = reason;
        Ok(())
    }

    async fn set_transfer_progress(
        &self,
        transfer_id: &str,
        bytes_transferred: u64,
    ) -> Result<(), StoreError> {
        let mut rows = self.write_rows();
        let transfer = find_transfer_mut(&mut rows, transfer_id)
            .ok_or_else(|| StoreError::NotFound(transfer_id.to_owned()))?;
        transfer.record.bytes_transferred = bytes_transferred;
        Ok(())
    }

    async fn file_download_descriptor(&self, transfer_id: &str) -> Result<String, StoreError> {
        self.read_rows()
            .iter()
            .find_map(|row| match row {
                Row::Transfer(stored) if stored.record.id == transfer_id => {
                    stored.download_descriptor.clone()
                }
                _ => None,
            })
            .ok_or_else(|| StoreError::NotFound(transfer_id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use messaging_core::{Direction, TransferResumeStore};
    use std::sync::Arc;

    use super::*;

    fn message(id: &str) -> ChatMessage {
        ChatMessage::outgoing(id, "text/plain", "hello", 1_731_000_000)
    }

    fn transfer(id: &str, chat_id: &str, state: TransferState) -> FileTransferRecord {
        FileTransferRecord {
            id: id.to_owned(),
            chat_id: chat_id.to_owned(),
            direction: Direction::Outgoing,
            state,
            reason_code: ReasonCode::Unspecified,
            file_size: 4_096,
            bytes_transferred: 0,
            upload_transaction_id: None,
            file_icon_ref: None,
        }
    }

    #[tokio::test]
    async fn serves_pending_entries_in_creation_order() {
        let store = InMemoryQueueStore::new();
        store.enqueue_message("chat-1", message("msg-1"));
        store.enqueue_file_transfer(transfer("ft-1", "chat-1", TransferState::Queued), "file://a");
        store.enqueue_message("chat-1", message("msg-2"));
        store.enqueue_message("chat-2", message("other-chat"));

        let entries = store
            .queued_entries("chat-1")
            .await
            .expect("query must work");

        let ids: Vec<&str> = entries.iter().map(QueueEntry::id).collect();
        assert_eq!(ids, ["msg-1", "ft-1", "msg-2"]);
    }

    #[tokio::test]
    async fn non_pending_rows_are_filtered_out() {
        let store = InMemoryQueueStore::new();
        store.enqueue_message("chat-1", message("msg-1"));
        store
            .set_message_status("msg-1", MessageStatus::Sent, ReasonCode::Unspecified)
            .await
            .expect("update must work");
        store.enqueue_file_transfer(
            transfer("ft-done", "chat-1", TransferState::Transferred),
            "file://a",
        );
        store.enqueue_file_transfer(
            transfer("ft-up", "chat-1", TransferState::Started),
            "file://b",
        );

        let entries = store
            .queued_entries("chat-1")
            .await
            .expect("query must work");

        let ids: Vec<&str> = entries.iter().map(QueueEntry::id).collect();
        assert_eq!(ids, ["ft-up"], "only the started-not-transferred row remains");
    }

    #[tokio::test]
    async fn empty_conversation_yields_no_entries() {
        let store = InMemoryQueueStore::new();
        let entries = store
            .queued_entries("chat-unknown")
            .await
            .expect("an empty result is not an error");
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn rejects_backward_state_transition() {
        let store = InMemoryQueueStore::new();
        store.enqueue_file_transfer(
            transfer("ft-1", "chat-1", TransferState::Transferred),
            "file://a",
        );

        let err = store
            .set_file_transfer_state(
                "ft-1",
                "chat-1",
                TransferState::Started,
                ReasonCode::Unspecified,
            )
            .await
            .expect_err("transferred is terminal");
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn pause_resume_is_the_only_back_edge() {
        let store = InMemoryQueueStore::new();
        store.enqueue_file_transfer(
            transfer("ft-1", "chat-1", TransferState::Started),
            "file://a",
        );

        store
            .set_file_transfer_state(
                "ft-1",
                "chat-1",
                TransferState::Paused,
                ReasonCode::PausedBySystem,
            )
            .await
            .expect("started -> paused is legal");
        store
            .set_file_transfer_state(
                "ft-1",
                "chat-1",
                TransferState::Started,
                ReasonCode::Unspecified,
            )
            .await
            .expect("paused -> started is the resume back-edge");

        let record = store
            .file_transfer_record("ft-1")
            .await
            .expect("query must work")
            .expect("record must exist");
        assert_eq!(record.state, TransferState::Started);
    }

    #[tokio::test]
    async fn unknown_ids_surface_not_found() {
        let store = InMemoryQueueStore::new();

        assert!(matches!(
            store
                .set_message_status("nope", MessageStatus::Sent, ReasonCode::Unspecified)
                .await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.file_download_descriptor("nope").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(
            store
                .file_transfer_record("nope")
                .await
                .expect("query must work")
                .is_none()
        );
    }

    #[tokio::test]
    async fn download_descriptor_round_trips() {
        let store = InMemoryQueueStore::new();
        store.enqueue_file_transfer(
            transfer("ft-1", "chat-1", TransferState::Started),
            "file://a",
        );
        store
            .set_download_descriptor("ft-1", "<file-info/>")
            .expect("descriptor write must work");

        let descriptor = store
            .file_download_descriptor("ft-1")
            .await
            .expect("descriptor must exist");
        assert_eq!(descriptor, "<file-info/>");
    }

    #[tokio::test]
    async fn resume_metadata_survives_pause_and_resume() {
        let store = Arc::new(InMemoryQueueStore::new());
        store.enqueue_file_transfer(
            transfer("ft-1", "chat-1", TransferState::Started),
            "file://a",
        );
        store
            .set_upload_transaction_id("ft-1", "tid-42")
            .expect("tid write must work");
        store
            .set_transfer_progress("ft-1", 2_048)
            .await
            .expect("progress write must work");

        let resume = TransferResumeStore::new(store.clone());
        resume
            .record_paused("ft-1", "chat-1", ReasonCode::PausedBySystem)
            .await
            .expect("pause must persist");

        let info = resume
            .resume_info("ft-1")
            .await
            .expect("query must work")
            .expect("metadata must exist");
        assert!(info.is_resumable());
        assert_eq!(info.bytes_transferred, 2_048);
        assert_eq!(info.upload_transaction_id.as_deref(), Some("tid-42"));

        resume
            .record_resumed("ft-1", "chat-1")
            .await
            .expect("resume must persist");
        let record = store
            .file_transfer_record("ft-1")
            .await
            .expect("query must work")
            .expect("record must exist");
        assert_eq!(record.state, TransferState::Started);
    }
}

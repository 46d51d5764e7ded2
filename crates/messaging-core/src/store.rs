use async_trait::async_trait;

use crate::{
    error::StoreError,
    types::{FileTransferRecord, MessageStatus, QueueEntry, ReasonCode, TransferState},
};

/// Query/update operations the core needs against the durable message and
/// file-transfer store.
///
/// Implementations own the schema. Within one conversation, updates are
/// serialized by the scheduler's conversation lock, so implementations do
/// not need entry-level locking for this access pattern.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// All entries pending dispatch for a conversation, in creation order:
    /// messages in state QUEUED and file transfers in state QUEUED, or
    /// STARTED but not yet transferred.
    ///
    /// An empty result means nothing to dequeue; it is not an error.
    async fn queued_entries(&self, chat_id: &str) -> Result<Vec<QueueEntry>, StoreError>;

    /// Full record for a file transfer, or `None` if unknown.
    async fn file_transfer_record(
        &self,
        transfer_id: &str,
    ) -> Result<Option<FileTransferRecord>, StoreError>;

    /// Persist a file transfer state change together with its reason code.
    ///
    /// Writes must respect the monotonic state graph
    /// QUEUED -> STARTED -> {PAUSED, TRANSFERRED, FAILED}, with
    /// PAUSED -> STARTED as the only back-edge.
    async fn set_file_transfer_state(
        &self,
        transfer_id: &str,
        chat_id: &str,
        state: TransferState,
        reason: ReasonCode,
    ) -> Result<(), StoreError>;

    /// Persist a message status change together with its reason code.
    async fn set_message_status(
        &self,
        msg_id: &str,
        status: MessageStatus,
        reason: ReasonCode,
    ) -> Result<(), StoreError>;

    /// Record upload/download progress for a transfer.
    async fn set_transfer_progress(
        &self,
        transfer_id: &str,
        bytes_transferred: u64,
    ) -> Result<(), StoreError>;

    /// Already-encoded download descriptor for an uploaded file, handed to
    /// the peer when a STARTED transfer's file-info is dequeued.
    async fn file_download_descriptor(&self, transfer_id: &str) -> Result<String, StoreError>;
}

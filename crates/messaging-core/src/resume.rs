use std::sync::Arc;

use tracing::debug;

use crate::{
    error::StoreError,
    store::QueueStore,
    types::{ReasonCode, TransferState},
};

/// Resume metadata for an interrupted HTTP transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResumeInfo {
    pub transfer_id: String,
    pub chat_id: String,
    /// Durable handle of the in-progress upload, when one was recorded.
    pub upload_transaction_id: Option<String>,
    pub bytes_transferred: u64,
    pub file_size: u64,
}

impl TransferResumeInfo {
    /// A transfer can be resumed once a durable upload handle exists.
    pub fn is_resumable(&self) -> bool {
        self.upload_transaction_id.is_some()
    }
}

/// Thin read/write layer over the queue store scoped to transfer-resume
/// metadata, so pause/resume survives process restarts.
pub struct TransferResumeStore {
    store: Arc<dyn QueueStore>,
}

impl TransferResumeStore {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Resume metadata for a transfer, or `None` if the id is unknown.
    pub async fn resume_info(
        &self,
        transfer_id: &str,
    ) -> Result<Option<TransferResumeInfo>, StoreError> {
        let Some(record) = self.store.file_transfer_record(transfer_id).await? else {
            return Ok(None);
        };
        Ok(Some(TransferResumeInfo {
            transfer_id: record.id,
            chat_id: record.chat_id,
            upload_transaction_id: record.upload_transaction_id,
            bytes_transferred: record.bytes_transferred,
            file_size: record.file_size,
        }))
    }

    /// Persist a PAUSED transition with its reason.
    pub async fn record_paused(
        &self,
        transfer_id: &str,
        chat_id: &str,
        reason: ReasonCode,
    ) -> Result<(), StoreError> {
        debug!(transfer_id, chat_id, ?reason, "recording paused transfer");
        self.store
            .set_file_transfer_state(transfer_id, chat_id, TransferState::Paused, reason)
            .await
    }

    /// Persist the PAUSED -> STARTED back-edge when a transfer resumes.
    pub async fn record_resumed(&self, transfer_id: &str, chat_id: &str) -> Result<(), StoreError> {
        debug!(transfer_id, chat_id, "recording resumed transfer");
        self.store
            .set_file_transfer_state(
                transfer_id,
                chat_id,
                TransferState::Started,
                ReasonCode::Unspecified,
            )
            .await
    }

    /// Record upload/download progress so a later resume knows its offset.
    pub async fn record_progress(
        &self,
        transfer_id: &str,
        bytes_transferred: u64,
    ) -> Result<(), StoreError> {
        self.store
            .set_transfer_progress(transfer_id, bytes_transferred)
            .await
    }
}

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use tracing::{debug, info};

use crate::{
    error::{StoreError, TransferError},
    events::SessionEvent,
    fanout::EventFanout,
    registry::SessionRegistry,
    resume::TransferResumeStore,
    store::QueueStore,
    types::{
        Direction, ReasonCode, SessionDescriptor, SessionKind, SessionState, SessionStateKind,
        TerminationReason, TransferState, unix_time_ms,
    },
};

/// Underlying transfer driver.
///
/// `pause`/`resume` default to "unsupported"; transports that can suspend
/// an in-flight transfer override them and must drive the corresponding
/// paused/resumed event callbacks on the session themselves.
pub trait TransferMedia: Send + Sync {
    /// Interrupt the underlying transfer immediately.
    fn interrupt(&self);

    /// Suspend the transfer. Returns `false` when unsupported.
    fn pause(&self) -> bool {
        false
    }

    /// Resume a suspended transfer. Returns `false` when unsupported.
    fn resume(&self) -> bool {
        false
    }
}

/// What `abort_session` should do, given the persisted transfer state and
/// the termination context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortDisposition {
    /// Close immediately without a terminal broadcast.
    CloseFully,
    /// Close the session but leave the transfer resumable, announcing a
    /// paused-by-system event instead of a terminal one.
    CloseAsPausedBySystem,
    /// Interrupt media, mark terminated, remove from the registry and
    /// broadcast the terminal state change.
    DefaultAbort,
}

/// Decide the abort behavior for a transfer session.
///
/// A system-initiated interruption must be distinguishable from a
/// user/peer-initiated abort: only the former may degrade into a pause so
/// the transfer can later resume without re-negotiation, and only when a
/// durable handle to resume against already exists (an upload transaction
/// id, or a remote origin).
pub fn abort_disposition(
    transfer_state: TransferState,
    reason: TerminationReason,
    locally_initiated: bool,
    has_upload_transaction_id: bool,
) -> AbortDisposition {
    if reason != TerminationReason::System {
        return AbortDisposition::DefaultAbort;
    }
    match transfer_state {
        TransferState::Invited => AbortDisposition::CloseFully,
        TransferState::Started => {
            if locally_initiated && !has_upload_transaction_id {
                // An upload that never reached the content server has
                // nothing to resume against.
                AbortDisposition::DefaultAbort
            } else {
                AbortDisposition::CloseAsPausedBySystem
            }
        }
        TransferState::Paused => AbortDisposition::CloseFully,
        _ => AbortDisposition::DefaultAbort,
    }
}

/// Per-session lifecycle for an HTTP file transfer.
///
/// Tracks the protocol state, reacts to abort/error/completion events and
/// translates transfer callbacks into observer broadcasts.
pub struct HttpTransferSession {
    transfer_id: String,
    chat_id: String,
    contact: String,
    contribution_id: String,
    direction: Direction,
    created_at: u64,
    state: Mutex<SessionState>,
    interrupted: AtomicBool,
    media: Arc<dyn TransferMedia>,
    store: Arc<dyn QueueStore>,
    resume: TransferResumeStore,
    registry: Arc<SessionRegistry>,
    fanout: Arc<EventFanout>,
}

impl HttpTransferSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transfer_id: impl Into<String>,
        chat_id: impl Into<String>,
        contact: impl Into<String>,
        contribution_id: impl Into<String>,
        direction: Direction,
        media: Arc<dyn TransferMedia>,
        store: Arc<dyn QueueStore>,
        registry: Arc<SessionRegistry>,
        fanout: Arc<EventFanout>,
    ) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            chat_id: chat_id.into(),
            contact: contact.into(),
            contribution_id: contribution_id.into(),
            direction,
            created_at: unix_time_ms(),
            state: Mutex::new(SessionState::Pending),
            interrupted: AtomicBool::new(false),
            media,
            resume: TransferResumeStore::new(store.clone()),
            store,
            registry,
            fanout,
        }
    }

    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn contact(&self) -> &str {
        &self.contact
    }

    pub fn contribution_id(&self) -> &str {
        &self.contribution_id
    }

    pub fn state(&self) -> SessionState {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Registry entry for this session.
    pub fn descriptor(&self) -> SessionDescriptor {
        SessionDescriptor {
            id: self.chat_id.clone(),
            kind: SessionKind::HttpTransfer,
            participants: vec![self.contact.clone()],
            contribution_id: self.contribution_id.clone(),
            created_at: self.created_at,
        }
    }

    /// Terminate the session.
    ///
    /// A system-initiated termination of a STARTED, resumable transfer
    /// closes the session but announces paused-by-system instead of a
    /// terminal event; every other case terminates fully.
    pub async fn abort_session(&self, reason: TerminationReason) -> Result<(), StoreError> {
        let record = self.store.file_transfer_record(&self.transfer_id).await?;
        let disposition = match record {
            Some(record) => abort_disposition(
                record.state,
                reason,
                record.direction.is_locally_initiated(),
                record.upload_transaction_id.is_some(),
            ),
            None => AbortDisposition::DefaultAbort,
        };

        match disposition {
            AbortDisposition::CloseFully => {
                self.close_session(SessionState::Terminated(reason));
            }
            AbortDisposition::CloseAsPausedBySystem => {
                self.close_session(SessionState::Paused);
                info!(
                    transfer_id = %self.transfer_id,
                    "session terminated by the system, transfer remains resumable"
                );
                self.resume
                    .record_paused(&self.transfer_id, &self.chat_id, ReasonCode::PausedBySystem)
                    .await?;
                self.fanout.broadcast(&SessionEvent::TransferPausedBySystem {
                    chat_id: self.chat_id.clone(),
                    transfer_id: self.transfer_id.clone(),
                    contact: self.contact.clone(),
                });
            }
            AbortDisposition::DefaultAbort => {
                self.close_session(SessionState::Terminated(reason));
                self.fanout.broadcast(&SessionEvent::StateChanged {
                    chat_id: self.chat_id.clone(),
                    state: SessionStateKind::Terminated,
                    reason: reason.into(),
                });
            }
        }
        Ok(())
    }

    /// Handle a transfer error reported by the lower layer.
    ///
    /// Idempotent: a session that was already interrupted stays untouched,
    /// so a late error cannot produce a duplicate broadcast.
    pub fn handle_error(&self, error: TransferError) {
        if self.interrupted.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(
            transfer_id = %self.transfer_id,
            code = ?error.code,
            reason = %error.message,
            "transfer error"
        );

        self.registry.remove(&self.chat_id);
        self.fanout.broadcast(&SessionEvent::TransferError {
            chat_id: self.chat_id.clone(),
            transfer_id: self.transfer_id.clone(),
            contact: self.contact.clone(),
            error,
        });
    }

    /// Mark the content as fully transferred and announce completion.
    ///
    /// For HTTP transfers only the content server has received the file at
    /// this point; the peer learns about it via the file-info dequeue.
    pub async fn handle_file_transferred(&self) -> Result<(), StoreError> {
        self.store
            .set_file_transfer_state(
                &self.transfer_id,
                &self.chat_id,
                TransferState::Transferred,
                ReasonCode::Unspecified,
            )
            .await?;

        self.registry.remove(&self.chat_id);
        self.fanout.broadcast(&SessionEvent::TransferCompleted {
            chat_id: self.chat_id.clone(),
            transfer_id: self.transfer_id.clone(),
            contact: self.contact.clone(),
        });
        Ok(())
    }

    /// Transfer byte-count progress callback.
    pub fn transfer_progress(&self, current_bytes: u64, total_bytes: u64) {
        self.fanout.broadcast(&SessionEvent::TransferProgress {
            chat_id: self.chat_id.clone(),
            transfer_id: self.transfer_id.clone(),
            contact: self.contact.clone(),
            current_bytes,
            total_bytes,
        });
    }

    /// Policy refused the send.
    pub fn transfer_not_allowed_to_send(&self) {
        self.fanout.broadcast(&SessionEvent::TransferNotAllowedToSend {
            chat_id: self.chat_id.clone(),
            transfer_id: self.transfer_id.clone(),
            contact: self.contact.clone(),
        });
    }

    /// Transfer started; the session is established from here on.
    pub fn transfer_started(&self) {
        self.set_state(SessionState::Established);
        self.fanout.broadcast(&SessionEvent::TransferStarted {
            chat_id: self.chat_id.clone(),
            transfer_id: self.transfer_id.clone(),
            contact: self.contact.clone(),
        });
    }

    pub fn transfer_paused_by_user(&self) {
        self.fanout.broadcast(&SessionEvent::TransferPausedByUser {
            chat_id: self.chat_id.clone(),
            transfer_id: self.transfer_id.clone(),
            contact: self.contact.clone(),
        });
    }

    pub fn transfer_paused_by_system(&self) {
        self.fanout.broadcast(&SessionEvent::TransferPausedBySystem {
            chat_id: self.chat_id.clone(),
            transfer_id: self.transfer_id.clone(),
            contact: self.contact.clone(),
        });
    }

    pub fn transfer_resumed(&self) {
        self.fanout.broadcast(&SessionEvent::TransferResumed {
            chat_id: self.chat_id.clone(),
            transfer_id: self.transfer_id.clone(),
            contact: self.contact.clone(),
        });
    }

    /// Suspend the transfer, when the transport supports it.
    pub fn pause_transfer(&self) {
        if !self.media.pause() {
            debug!(transfer_id = %self.transfer_id, "pausing is not available");
        }
    }

    /// Resume a suspended transfer, when the transport supports it.
    pub fn resume_transfer(&self) {
        if !self.media.resume() {
            debug!(transfer_id = %self.transfer_id, "resuming is not available");
        }
    }

    /// Resume metadata for this transfer.
    pub async fn resume_info(
        &self,
    ) -> Result<Option<crate::resume::TransferResumeInfo>, StoreError> {
        self.resume.resume_info(&self.transfer_id).await
    }

    fn close_session(&self, final_state: SessionState) {
        self.interrupt();
        self.set_state(final_state);
        self.registry.remove(&self.chat_id);
    }

    fn interrupt(&self) {
        if !self.interrupted.swap(true, Ordering::SeqCst) {
            self.media.interrupt();
        }
    }

    fn set_state(&self, state: SessionState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }
}

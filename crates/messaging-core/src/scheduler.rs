use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    error::{DispatchError, ResolveError},
    registry::SessionRegistry,
    settings::MessagingSettings,
    store::QueueStore,
    types::{
        ChatMessage, FileContent, MessageStatus, QueueEntry, QueuedFileTransfer, QueuedMessage,
        ReasonCode, TransferState, unix_time_ms,
    },
};

/// Eligibility predicates supplied by the session layer.
pub trait DequeueGate: Send + Sync {
    fn is_allowed_to_dequeue_message(&self, chat_id: &str) -> bool;
    fn is_allowed_to_dequeue_file_transfer(&self, chat_id: &str) -> bool;
}

/// Hand-off to the transmission layer.
///
/// Each operation may fail with a retryable transport error or a terminal
/// security error.
#[async_trait]
pub trait DispatchTarget: Send + Sync {
    async fn dequeue_message(
        &self,
        chat_id: &str,
        message: ChatMessage,
    ) -> Result<(), DispatchError>;

    async fn dequeue_file_transfer(
        &self,
        chat_id: &str,
        transfer_id: &str,
        content: FileContent,
        icon: Option<FileContent>,
    ) -> Result<(), DispatchError>;

    async fn dequeue_file_info(
        &self,
        chat_id: &str,
        transfer_id: &str,
        descriptor_xml: &str,
        displayed_report_enabled: bool,
        delivery_report_enabled: bool,
    ) -> Result<(), DispatchError>;
}

/// Resolves file and icon references into content handles.
pub trait ContentResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<FileContent, ResolveError>;
}

/// Outcome summary of one dequeue pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries handed off to the transmission layer.
    pub dispatched: usize,
    /// Entries left queued because the conversation was not eligible.
    pub skipped: usize,
    /// Entries marked FAILED, never to be retried.
    pub failed: usize,
    /// Entries left in their persisted state for a future trigger.
    pub deferred: usize,
    /// The pass stopped early on the shutdown signal.
    pub interrupted: bool,
}

/// Background retry worker.
///
/// Each trigger drains the pending outbound entries of one conversation.
/// Passes for the same conversation serialize on the registry's
/// conversation lock; passes for distinct conversations run concurrently.
/// A single malformed entry never aborts dispatch of the remaining queue.
pub struct DequeueScheduler {
    store: Arc<dyn QueueStore>,
    registry: Arc<SessionRegistry>,
    gate: Arc<dyn DequeueGate>,
    target: Arc<dyn DispatchTarget>,
    resolver: Arc<dyn ContentResolver>,
    settings: MessagingSettings,
    shutdown: CancellationToken,
}

impl DequeueScheduler {
    pub fn new(
        store: Arc<dyn QueueStore>,
        registry: Arc<SessionRegistry>,
        gate: Arc<dyn DequeueGate>,
        target: Arc<dyn DispatchTarget>,
        resolver: Arc<dyn ContentResolver>,
        settings: MessagingSettings,
    ) -> Self {
        Self {
            store,
            registry,
            gate,
            target,
            resolver,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// The cooperative shutdown signal shared by every pass.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal shutdown: running passes exit at their next checkpoint and
    /// new passes exit without side effects.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Spawn an independently scheduled pass for one conversation.
    pub fn trigger(self: Arc<Self>, chat_id: impl Into<String>) -> JoinHandle<DrainReport> {
        let chat_id = chat_id.into();
        tokio::spawn(async move { self.drain_conversation(&chat_id).await })
    }

    /// Drain all eligible pending entries for one conversation.
    ///
    /// Never returns an error: every failure is handled per entry, and the
    /// summary is reported for observability.
    pub async fn drain_conversation(&self, chat_id: &str) -> DrainReport {
        debug!(chat_id, "dequeue pass for queued messages and file transfers");
        let mut report = DrainReport::default();

        let lock = self.registry.conversation_lock(chat_id);
        let _guard = lock.lock().await;

        if self.shutdown.is_cancelled() {
            debug!(chat_id, "service is stopping, exiting dequeue pass");
            report.interrupted = true;
            return report;
        }

        // An empty result set means nothing to dequeue, not an error.
        let entries = match self.store.queued_entries(chat_id).await {
            Ok(entries) => entries,
            Err(err) => {
                error!(chat_id, %err, "cannot query pending entries, abandoning dequeue pass");
                return report;
            }
        };

        for entry in entries {
            if self.shutdown.is_cancelled() {
                debug!(chat_id, "service is stopping, exiting dequeue pass");
                report.interrupted = true;
                break;
            }
            match entry {
                QueueEntry::Message(message) => {
                    self.drain_message(chat_id, message, &mut report).await;
                }
                QueueEntry::FileTransfer(transfer) => {
                    self.drain_file_transfer(chat_id, transfer, &mut report).await;
                }
            }
        }

        debug!(chat_id, ?report, "dequeue pass finished");
        report
    }

    async fn drain_message(&self, chat_id: &str, message: QueuedMessage, report: &mut DrainReport) {
        if !self.gate.is_allowed_to_dequeue_message(chat_id) {
            report.skipped += 1;
            return;
        }

        // For an outgoing message the send time equals the creation time;
        // there is no network round-trip before dispatch.
        let outbound = ChatMessage::outgoing(
            message.id.clone(),
            message.mime_type,
            message.content,
            unix_time_ms(),
        );

        match self.target.dequeue_message(chat_id, outbound).await {
            Ok(()) => report.dispatched += 1,
            Err(DispatchError::Transport(reason)) => {
                debug!(
                    msg_id = %message.id,
                    chat_id,
                    %reason,
                    "failed to dequeue chat message, leaving it for a later trigger"
                );
                report.deferred += 1;
            }
            Err(DispatchError::Security(reason)) => {
                error!(
                    msg_id = %message.id,
                    chat_id,
                    %reason,
                    "security error while dequeueing chat message, marking it failed"
                );
                self.mark_message_failed(&message.id, chat_id, report).await;
            }
        }
    }

    async fn drain_file_transfer(
        &self,
        chat_id: &str,
        transfer: QueuedFileTransfer,
        report: &mut DrainReport,
    ) {
        if self.settings.is_file_size_exceeded(transfer.file_size) {
            warn!(
                transfer_id = %transfer.id,
                chat_id,
                file_size = transfer.file_size,
                "file size exceeds the configured maximum, marking transfer failed"
            );
            self.mark_transfer_failed(&transfer.id, chat_id, report).await;
            return;
        }

        match transfer.state {
            TransferState::Queued => self.dispatch_queued_transfer(chat_id, transfer, report).await,
            TransferState::Started => self.dispatch_file_info(chat_id, transfer, report).await,
            other => {
                debug!(
                    transfer_id = %transfer.id,
                    chat_id,
                    state = ?other,
                    "ignoring transfer in a non-dequeueable state"
                );
                report.skipped += 1;
            }
        }
    }

    async fn dispatch_queued_transfer(
        &self,
        chat_id: &str,
        transfer: QueuedFileTransfer,
        report: &mut DrainReport,
    ) {
        if !self.gate.is_allowed_to_dequeue_file_transfer(chat_id) {
            report.skipped += 1;
            return;
        }

        let content = match self.resolver.resolve(&transfer.file_ref) {
            Ok(content) => content,
            Err(err) => {
                error!(
                    transfer_id = %transfer.id,
                    chat_id,
                    %err,
                    "cannot resolve file content, leaving transfer for a later trigger"
                );
                report.deferred += 1;
                return;
            }
        };
        let icon = match &transfer.file_icon_ref {
            Some(reference) => match self.resolver.resolve(reference) {
                Ok(icon) => Some(icon),
                Err(err) => {
                    error!(
                        transfer_id = %transfer.id,
                        chat_id,
                        %err,
                        "cannot resolve file icon, leaving transfer for a later trigger"
                    );
                    report.deferred += 1;
                    return;
                }
            },
            None => None,
        };

        match self
            .target
            .dequeue_file_transfer(chat_id, &transfer.id, content, icon)
            .await
        {
            Ok(()) => report.dispatched += 1,
            Err(DispatchError::Transport(reason)) => {
                debug!(
                    transfer_id = %transfer.id,
                    chat_id,
                    %reason,
                    "failed to dequeue file transfer, leaving it for a later trigger"
                );
                report.deferred += 1;
            }
            Err(DispatchError::Security(reason)) => {
                error!(
                    transfer_id = %transfer.id,
                    chat_id,
                    %reason,
                    "security error while dequeueing file transfer, marking it failed"
                );
                self.mark_transfer_failed(&transfer.id, chat_id, report).await;
            }
        }
    }

    /// A STARTED transfer has its content on the server already; what is
    /// pending is the file-info notification to the peer, which rides the
    /// chat media path and therefore uses the message eligibility gate.
    async fn dispatch_file_info(
        &self,
        chat_id: &str,
        transfer: QueuedFileTransfer,
        report: &mut DrainReport,
    ) {
        if !self.gate.is_allowed_to_dequeue_message(chat_id) {
            report.skipped += 1;
            return;
        }

        let descriptor = match self.store.file_download_descriptor(&transfer.id).await {
            Ok(descriptor) => descriptor,
            Err(err) => {
                error!(
                    transfer_id = %transfer.id,
                    chat_id,
                    %err,
                    "cannot load download descriptor, leaving file info for a later trigger"
                );
                report.deferred += 1;
                return;
            }
        };

        match self
            .target
            .dequeue_file_info(
                chat_id,
                &transfer.id,
                &descriptor,
                self.settings.displayed_report_enabled,
                self.settings.delivery_report_enabled,
            )
            .await
        {
            Ok(()) => report.dispatched += 1,
            Err(DispatchError::Transport(reason)) => {
                debug!(
                    transfer_id = %transfer.id,
                    chat_id,
                    %reason,
                    "failed to dequeue file info, leaving it for a later trigger"
                );
                report.deferred += 1;
            }
            Err(DispatchError::Security(reason)) => {
                error!(
                    transfer_id = %transfer.id,
                    chat_id,
                    %reason,
                    "security error while dequeueing file info, marking transfer failed"
                );
                self.mark_transfer_failed(&transfer.id, chat_id, report).await;
            }
        }
    }

    async fn mark_message_failed(&self, msg_id: &str, chat_id: &str, report: &mut DrainReport) {
        match self
            .store
            .set_message_status(
                msg_id,
                MessageStatus::Failed,
                ReasonCode::FailedNotAllowedToSend,
            )
            .await
        {
            Ok(()) => report.failed += 1,
            Err(err) => {
                error!(msg_id, chat_id, %err, "cannot mark chat message failed");
                report.deferred += 1;
            }
        }
    }

    async fn mark_transfer_failed(
        &self,
        transfer_id: &str,
        chat_id: &str,
        report: &mut DrainReport,
    ) {
        match self
            .store
            .set_file_transfer_state(
                transfer_id,
                chat_id,
                TransferState::Failed,
                ReasonCode::FailedNotAllowedToSend,
            )
            .await
        {
            Ok(()) => report.failed += 1,
            Err(err) => {
                error!(transfer_id, chat_id, %err, "cannot mark file transfer failed");
                report.deferred += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use super::*;
    use crate::error::StoreError;
    use crate::types::FileTransferRecord;

    #[derive(Default)]
    struct StubStore {
        entries: Mutex<Vec<QueueEntry>>,
        descriptors: Mutex<HashMap<String, String>>,
        transfer_states: Mutex<Vec<(String, TransferState, ReasonCode)>>,
        message_states: Mutex<Vec<(String, MessageStatus, ReasonCode)>>,
    }

    impl StubStore {
        fn with_entries(entries: Vec<QueueEntry>) -> Self {
            Self {
                entries: Mutex::new(entries),
                ..Self::default()
            }
        }

        fn set_descriptor(&self, transfer_id: &str, xml: &str) {
            self.descriptors
                .lock()
                .expect("stub lock")
                .insert(transfer_id.to_owned(), xml.to_owned());
        }

        fn transfer_updates(&self) -> Vec<(String, TransferState, ReasonCode)> {
            self.transfer_states.lock().expect("stub lock").clone()
        }

        fn message_updates(&self) -> Vec<(String, MessageStatus, ReasonCode)> {
            self.message_states.lock().expect("stub lock").clone()
        }
    }

    #[async_trait]
    impl QueueStore for StubStore {
        async fn queued_entries(&self, _chat_id: &str) -> Result<Vec<QueueEntry>, StoreError> {
            Ok(self.entries.lock().expect("stub lock").clone())
        }

        async fn file_transfer_record(
            &self,
            _transfer_id: &str,
        ) -> Result<Option<FileTransferRecord>, StoreError> {
            Ok(None)
        }

        async fn set_file_transfer_state(
            &self,
            transfer_id: &str,
            _chat_id: &str,
            state: TransferState,
            reason: ReasonCode,
        ) -> Result<(), StoreError> {
            self.transfer_states.lock().expect("stub lock").push((
                transfer_id.to_owned(),
                state,
                reason,
            ));
            Ok(())
        }

        async fn set_message_status(
            &self,
            msg_id: &str,
            status: MessageStatus,
            reason: ReasonCode,
        ) -> Result<(), StoreError> {
            self.message_states
                .lock()
                .expect("stub lock")
                .push((msg_id.to_owned(), status, reason));
            Ok(())
        }

        async fn set_transfer_progress(
            &self,
            _transfer_id: &str,
            _bytes_transferred: u64,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn file_download_descriptor(&self, transfer_id: &str) -> Result<String, StoreError> {
            self.descriptors
                .lock()
                .expect("stub lock")
                .get(transfer_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(transfer_id.to_owned()))
        }
    }

    struct AllowAll;

    impl DequeueGate for AllowAll {
        fn is_allowed_to_dequeue_message(&self, _chat_id: &str) -> bool {
            true
        }

        fn is_allowed_to_dequeue_file_transfer(&self, _chat_id: &str) -> bool {
            true
        }
    }

    struct DenyAll;

    impl DequeueGate for DenyAll {
        fn is_allowed_to_dequeue_message(&self, _chat_id: &str) -> bool {
            false
        }

        fn is_allowed_to_dequeue_file_transfer(&self, _chat_id: &str) -> bool {
            false
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Dispatched {
        Message(String),
        FileTransfer {
            id: String,
            has_icon: bool,
        },
        FileInfo {
            id: String,
            descriptor: String,
            displayed: bool,
            delivery: bool,
        },
    }

    #[derive(Default)]
    struct RecordingTarget {
        calls: Mutex<Vec<Dispatched>>,
        failures: Mutex<HashMap<String, DispatchError>>,
        cancel_on_dispatch: Option<CancellationToken>,
    }

    impl RecordingTarget {
        fn failing(failures: HashMap<String, DispatchError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                ..Self::default()
            }
        }

        fn dispatched(&self) -> Vec<Dispatched> {
            self.calls.lock().expect("stub lock").clone()
        }

        fn record(&self, id: &str, call: Dispatched) -> Result<(), DispatchError> {
            if let Some(token) = &self.cancel_on_dispatch {
                token.cancel();
            }
            if let Some(err) = self.failures.lock().expect("stub lock").get(id) {
                return Err(err.clone());
            }
            self.calls.lock().expect("stub lock").push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl DispatchTarget for RecordingTarget {
        async fn dequeue_message(
            &self,
            _chat_id: &str,
            message: ChatMessage,
        ) -> Result<(), DispatchError> {
            let id = message.id.clone();
            self.record(&id, Dispatched::Message(message.id))
        }

        async fn dequeue_file_transfer(
            &self,
            _chat_id: &str,
            transfer_id: &str,
            _content: FileContent,
            icon: Option<FileContent>,
        ) -> Result<(), DispatchError> {
            self.record(
                transfer_id,
                Dispatched::FileTransfer {
                    id: transfer_id.to_owned(),
                    has_icon: icon.is_some(),
                },
            )
        }

        async fn dequeue_file_info(
            &self,
            _chat_id: &str,
            transfer_id: &str,
            descriptor_xml: &str,
            displayed_report_enabled: bool,
            delivery_report_enabled: bool,
        ) -> Result<(), DispatchError> {
            self.record(
                transfer_id,
                Dispatched::FileInfo {
                    id: transfer_id.to_owned(),
                    descriptor: descriptor_xml.to_owned(),
                    displayed: displayed_report_enabled,
                    delivery: delivery_report_enabled,
                },
            )
        }
    }

    struct StubResolver;

    impl ContentResolver for StubResolver {
        fn resolve(&self, reference: &str) -> Result<FileContent, ResolveError> {
            if reference.contains("missing") {
                return Err(ResolveError::new(reference, "no such content"));
            }
            Ok(FileContent {
                reference: reference.to_owned(),
                mime_type: "application/octet-stream".to_owned(),
                size: 1_024,
            })
        }
    }

    fn queued_message(id: &str) -> QueueEntry {
        QueueEntry::Message(QueuedMessage {
            id: id.to_owned(),
            mime_type: "text/plain".to_owned(),
            content: "hello".to_owned(),
        })
    }

    fn queued_transfer(id: &str, file_size: u64) -> QueueEntry {
        QueueEntry::FileTransfer(QueuedFileTransfer {
            id: id.to_owned(),
            state: TransferState::Queued,
            file_ref: format!("file://{id}"),
            file_icon_ref: None,
            file_size,
        })
    }

    fn started_transfer(id: &str) -> QueueEntry {
        QueueEntry::FileTransfer(QueuedFileTransfer {
            id: id.to_owned(),
            state: TransferState::Started,
            file_ref: format!("file://{id}"),
            file_icon_ref: None,
            file_size: 1_024,
        })
    }

    fn scheduler(
        store: Arc<StubStore>,
        gate: Arc<dyn DequeueGate>,
        target: Arc<RecordingTarget>,
        settings: MessagingSettings,
    ) -> Arc<DequeueScheduler> {
        Arc::new(DequeueScheduler::new(
            store,
            Arc::new(SessionRegistry::new()),
            gate,
            target,
            Arc::new(StubResolver),
            settings,
        ))
    }

    #[tokio::test]
    async fn oversized_transfer_fails_without_any_dispatch_attempt() {
        let store = Arc::new(StubStore::with_entries(vec![queued_transfer(
            "ft-big", 50_000,
        )]));
        let target = Arc::new(RecordingTarget::default());
        let settings = MessagingSettings {
            max_file_transfer_size: 10_000,
            ..MessagingSettings::default()
        };
        let scheduler = scheduler(store.clone(), Arc::new(AllowAll), target.clone(), settings);

        let report = scheduler.drain_conversation("chat-1").await;

        assert_eq!(report.failed, 1);
        assert!(target.dispatched().is_empty());
        assert_eq!(
            store.transfer_updates(),
            vec![(
                "ft-big".to_owned(),
                TransferState::Failed,
                ReasonCode::FailedNotAllowedToSend
            )]
        );
    }

    #[tokio::test]
    async fn shutdown_before_the_pass_means_no_side_effects() {
        let store = Arc::new(StubStore::with_entries(vec![
            queued_message("msg-1"),
            queued_transfer("ft-1", 1_024),
        ]));
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(
            store.clone(),
            Arc::new(AllowAll),
            target.clone(),
            MessagingSettings::default(),
        );

        scheduler.shutdown();
        let report = scheduler.drain_conversation("chat-1").await;

        assert!(report.interrupted);
        assert_eq!(report.dispatched, 0);
        assert!(target.dispatched().is_empty());
        assert!(store.transfer_updates().is_empty());
        assert!(store.message_updates().is_empty());
    }

    #[tokio::test]
    async fn shutdown_during_the_pass_leaves_remaining_entries_untouched() {
        let store = Arc::new(StubStore::with_entries(vec![
            queued_message("msg-1"),
            queued_message("msg-2"),
            queued_message("msg-3"),
        ]));
        let shutdown = CancellationToken::new();
        let target = Arc::new(RecordingTarget {
            cancel_on_dispatch: Some(shutdown.clone()),
            ..RecordingTarget::default()
        });
        let scheduler = Arc::new(DequeueScheduler {
            store: store.clone(),
            registry: Arc::new(SessionRegistry::new()),
            gate: Arc::new(AllowAll),
            target: target.clone(),
            resolver: Arc::new(StubResolver),
            settings: MessagingSettings::default(),
            shutdown,
        });

        let report = scheduler.drain_conversation("chat-1").await;

        assert!(report.interrupted);
        assert_eq!(report.dispatched, 1);
        assert_eq!(target.dispatched(), vec![Dispatched::Message("msg-1".into())]);
    }

    #[tokio::test]
    async fn a_failing_entry_does_not_stop_the_rest_of_the_queue() {
        let store = Arc::new(StubStore::with_entries(vec![
            queued_message("msg-1"),
            QueueEntry::FileTransfer(QueuedFileTransfer {
                id: "ft-broken".to_owned(),
                state: TransferState::Queued,
                file_ref: "file://missing-content".to_owned(),
                file_icon_ref: None,
                file_size: 1_024,
            }),
            queued_message("msg-2"),
            queued_transfer("ft-2", 1_024),
        ]));
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(
            store.clone(),
            Arc::new(AllowAll),
            target.clone(),
            MessagingSettings::default(),
        );

        let report = scheduler.drain_conversation("chat-1").await;

        assert_eq!(report.dispatched, 3);
        assert_eq!(report.deferred, 1);
        assert_eq!(
            target.dispatched(),
            vec![
                Dispatched::Message("msg-1".into()),
                Dispatched::Message("msg-2".into()),
                Dispatched::FileTransfer {
                    id: "ft-2".into(),
                    has_icon: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn transport_failure_defers_only_the_failing_entry() {
        let store = Arc::new(StubStore::with_entries(vec![
            queued_message("msg-1"),
            queued_message("msg-2"),
        ]));
        let target = Arc::new(RecordingTarget::failing(HashMap::from([(
            "msg-1".to_owned(),
            DispatchError::Transport("media channel down".to_owned()),
        )])));
        let scheduler = scheduler(
            store.clone(),
            Arc::new(AllowAll),
            target.clone(),
            MessagingSettings::default(),
        );

        let report = scheduler.drain_conversation("chat-1").await;

        assert_eq!(report.deferred, 1);
        assert_eq!(report.dispatched, 1);
        assert!(
            store.message_updates().is_empty(),
            "a transport failure must not change persisted state"
        );
    }

    #[tokio::test]
    async fn security_failure_marks_the_transfer_failed() {
        let store = Arc::new(StubStore::with_entries(vec![queued_transfer(
            "ft-1", 1_024,
        )]));
        let target = Arc::new(RecordingTarget::failing(HashMap::from([(
            "ft-1".to_owned(),
            DispatchError::Security("sender blocked".to_owned()),
        )])));
        let scheduler = scheduler(
            store.clone(),
            Arc::new(AllowAll),
            target.clone(),
            MessagingSettings::default(),
        );

        let report = scheduler.drain_conversation("chat-1").await;

        assert_eq!(report.failed, 1);
        assert_eq!(
            store.transfer_updates(),
            vec![(
                "ft-1".to_owned(),
                TransferState::Failed,
                ReasonCode::FailedNotAllowedToSend
            )]
        );
    }

    #[tokio::test]
    async fn ineligible_conversation_leaves_entries_queued() {
        let store = Arc::new(StubStore::with_entries(vec![
            queued_message("msg-1"),
            queued_transfer("ft-1", 1_024),
        ]));
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(
            store.clone(),
            Arc::new(DenyAll),
            target.clone(),
            MessagingSettings::default(),
        );

        let report = scheduler.drain_conversation("chat-1").await;

        assert_eq!(report.skipped, 2);
        assert!(target.dispatched().is_empty());
        assert!(store.transfer_updates().is_empty());
    }

    #[tokio::test]
    async fn started_transfer_dispatches_file_info_with_report_flags() {
        let store = Arc::new(StubStore::with_entries(vec![started_transfer("ft-up")]));
        store.set_descriptor("ft-up", "<file-info/>");
        let target = Arc::new(RecordingTarget::default());
        let settings = MessagingSettings {
            displayed_report_enabled: false,
            delivery_report_enabled: true,
            ..MessagingSettings::default()
        };
        let scheduler = scheduler(store.clone(), Arc::new(AllowAll), target.clone(), settings);

        let report = scheduler.drain_conversation("chat-1").await;

        assert_eq!(report.dispatched, 1);
        assert_eq!(
            target.dispatched(),
            vec![Dispatched::FileInfo {
                id: "ft-up".into(),
                descriptor: "<file-info/>".into(),
                displayed: false,
                delivery: true,
            }]
        );
    }

    #[tokio::test]
    async fn missing_descriptor_defers_the_file_info() {
        let store = Arc::new(StubStore::with_entries(vec![started_transfer("ft-up")]));
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(
            store.clone(),
            Arc::new(AllowAll),
            target.clone(),
            MessagingSettings::default(),
        );

        let report = scheduler.drain_conversation("chat-1").await;

        assert_eq!(report.deferred, 1);
        assert!(target.dispatched().is_empty());
    }

    #[tokio::test]
    async fn entries_dispatch_in_creation_order() {
        let store = Arc::new(StubStore::with_entries(vec![
            queued_message("msg-1"),
            queued_transfer("ft-1", 1_024),
            queued_message("msg-2"),
        ]));
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(
            store.clone(),
            Arc::new(AllowAll),
            target.clone(),
            MessagingSettings::default(),
        );

        scheduler.drain_conversation("chat-1").await;

        assert_eq!(
            target.dispatched(),
            vec![
                Dispatched::Message("msg-1".into()),
                Dispatched::FileTransfer {
                    id: "ft-1".into(),
                    has_icon: false
                },
                Dispatched::Message("msg-2".into()),
            ]
        );
    }

    #[tokio::test]
    async fn icon_reference_is_resolved_and_forwarded() {
        let store = Arc::new(StubStore::with_entries(vec![QueueEntry::FileTransfer(
            QueuedFileTransfer {
                id: "ft-icon".to_owned(),
                state: TransferState::Queued,
                file_ref: "file://ft-icon".to_owned(),
                file_icon_ref: Some("file://ft-icon.thumb".to_owned()),
                file_size: 1_024,
            },
        )]));
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(
            store.clone(),
            Arc::new(AllowAll),
            target.clone(),
            MessagingSettings::default(),
        );

        scheduler.drain_conversation("chat-1").await;

        assert_eq!(
            target.dispatched(),
            vec![Dispatched::FileTransfer {
                id: "ft-icon".into(),
                has_icon: true
            }]
        );
    }

    #[tokio::test]
    async fn concurrent_triggers_for_one_conversation_serialize() {
        let store = Arc::new(StubStore::with_entries(vec![queued_message("msg-1")]));
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler(
            store,
            Arc::new(AllowAll),
            target.clone(),
            MessagingSettings::default(),
        );

        let first = scheduler.clone().trigger("chat-1");
        let second = scheduler.clone().trigger("chat-1");
        let (a, b) = (
            first.await.expect("task must not panic"),
            second.await.expect("task must not panic"),
        );

        // Both passes complete; each sees the full (stub) queue.
        assert_eq!(a.dispatched + b.dispatched, 2);
        assert_eq!(target.dispatched().len(), 2);
    }
}

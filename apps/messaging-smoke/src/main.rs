use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use messaging_core::{
    ChatMessage, ContentResolver, DequeueGate, DequeueScheduler, DispatchError, DispatchTarget,
    Direction, EventFanout, FileContent, FileTransferRecord, MessagingService, MessagingSettings,
    ObserverError, ReasonCode, ResolveError, SessionEvent, SessionEventObserver, SessionRegistry,
    TransferState, unix_time_ms,
};
use messaging_store::InMemoryQueueStore;

mod logging;

struct AllowAll;

impl DequeueGate for AllowAll {
    fn is_allowed_to_dequeue_message(&self, _chat_id: &str) -> bool {
        true
    }

    fn is_allowed_to_dequeue_file_transfer(&self, _chat_id: &str) -> bool {
        true
    }
}

struct LoggingTarget;

#[async_trait]
impl DispatchTarget for LoggingTarget {
    async fn dequeue_message(
        &self,
        chat_id: &str,
        message: ChatMessage,
    ) -> Result<(), DispatchError> {
        info!(chat_id, msg_id = %message.id, "would transmit chat message");
        Ok(())
    }

    async fn dequeue_file_transfer(
        &self,
        chat_id: &str,
        transfer_id: &str,
        content: FileContent,
        _icon: Option<FileContent>,
    ) -> Result<(), DispatchError> {
        info!(chat_id, transfer_id, size = content.size, "would upload file");
        Ok(())
    }

    async fn dequeue_file_info(
        &self,
        chat_id: &str,
        transfer_id: &str,
        descriptor_xml: &str,
        _displayed_report_enabled: bool,
        _delivery_report_enabled: bool,
    ) -> Result<(), DispatchError> {
        info!(
            chat_id,
            transfer_id,
            bytes = descriptor_xml.len(),
            "would notify peer of uploaded file"
        );
        Ok(())
    }
}

struct PassthroughResolver;

impl ContentResolver for PassthroughResolver {
    fn resolve(&self, reference: &str) -> Result<FileContent, ResolveError> {
        Ok(FileContent {
            reference: reference.to_owned(),
            mime_type: "application/octet-stream".to_owned(),
            size: 1_024,
        })
    }
}

struct PrintingObserver;

impl SessionEventObserver for PrintingObserver {
    fn on_event(&self, event: &SessionEvent) -> Result<(), ObserverError> {
        info!(?event, "observer notified");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    logging::init();

    let settings = match MessagingSettings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Invalid settings: {err}");
            std::process::exit(1);
        }
    };

    let store = Arc::new(InMemoryQueueStore::new());
    let registry = Arc::new(SessionRegistry::new());
    let fanout = Arc::new(EventFanout::new());
    fanout.register(Arc::new(PrintingObserver));

    let service = MessagingService::new(registry.clone(), fanout, store.clone());
    service.receive_one_to_one_invitation("demo-chat", "+33601020304", Some("Alice".to_owned()));

    store.enqueue_message(
        "demo-chat",
        ChatMessage::outgoing("msg-1", "text/plain", "hello from the smoke run", unix_time_ms()),
    );
    store.enqueue_file_transfer(
        FileTransferRecord {
            id: "ft-oversized".to_owned(),
            chat_id: "demo-chat".to_owned(),
            direction: Direction::Outgoing,
            state: TransferState::Queued,
            reason_code: ReasonCode::Unspecified,
            file_size: settings.max_file_transfer_size.saturating_add(1),
            bytes_transferred: 0,
            upload_transaction_id: None,
            file_icon_ref: None,
        },
        "file://oversized.bin",
    );
    store.enqueue_file_transfer(
        FileTransferRecord {
            id: "ft-photo".to_owned(),
            chat_id: "demo-chat".to_owned(),
            direction: Direction::Outgoing,
            state: TransferState::Queued,
            reason_code: ReasonCode::Unspecified,
            file_size: 2_048,
            bytes_transferred: 0,
            upload_transaction_id: None,
            file_icon_ref: None,
        },
        "file://photo.jpg",
    );

    let scheduler = Arc::new(DequeueScheduler::new(
        store,
        registry,
        Arc::new(AllowAll),
        Arc::new(LoggingTarget),
        Arc::new(PassthroughResolver),
        settings,
    ));

    let report = scheduler.drain_conversation("demo-chat").await;
    println!(
        "Dequeue pass finished: {} dispatched, {} failed, {} skipped, {} deferred",
        report.dispatched, report.failed, report.skipped, report.deferred
    );

    service.close();
}

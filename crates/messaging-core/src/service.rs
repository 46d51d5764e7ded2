use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::StoreError,
    events::{ParticipantInfo, RawEvent, SessionEvent},
    fanout::EventFanout,
    registry::SessionRegistry,
    store::QueueStore,
    types::{MessageStatus, ReasonCode, SessionDescriptor, SessionKind, unix_time_ms},
};

/// Entry point tying inbound protocol callbacks to the registry, the
/// store and the observer fan-out.
pub struct MessagingService {
    registry: Arc<SessionRegistry>,
    fanout: Arc<EventFanout>,
    store: Arc<dyn QueueStore>,
}

impl MessagingService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        fanout: Arc<EventFanout>,
        store: Arc<dyn QueueStore>,
    ) -> Self {
        info!("messaging service is loaded");
        Self {
            registry,
            fanout,
            store,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn fanout(&self) -> &Arc<EventFanout> {
        &self.fanout
    }

    /// Receive a new one-to-one chat invitation: register the session and
    /// announce it to observers.
    pub fn receive_one_to_one_invitation(
        &self,
        chat_id: impl Into<String>,
        contact: impl Into<String>,
        display_name: Option<String>,
    ) -> SessionDescriptor {
        let chat_id = chat_id.into();
        let contact = contact.into();
        info!(%chat_id, %contact, "receive chat invitation");

        let descriptor = SessionDescriptor {
            id: chat_id.clone(),
            kind: SessionKind::OneToOne,
            participants: vec![contact.clone()],
            contribution_id: Uuid::new_v4().to_string(),
            created_at: unix_time_ms(),
        };
        self.registry.add(descriptor.clone());

        self.fanout.broadcast(&SessionEvent::NewInvitation {
            chat_id,
            kind: SessionKind::OneToOne,
            contact,
            display_name,
            subject: None,
        });
        descriptor
    }

    /// Receive a new group chat invitation: register the session and
    /// announce it to observers.
    pub fn receive_group_invitation(
        &self,
        chat_id: impl Into<String>,
        contact: impl Into<String>,
        participants: Vec<String>,
        subject: Option<String>,
    ) -> SessionDescriptor {
        let chat_id = chat_id.into();
        let contact = contact.into();
        info!(%chat_id, %contact, "receive group chat invitation");

        let descriptor = SessionDescriptor {
            id: chat_id.clone(),
            kind: SessionKind::Group,
            participants,
            contribution_id: Uuid::new_v4().to_string(),
            created_at: unix_time_ms(),
        };
        self.registry.add(descriptor.clone());

        self.fanout.broadcast(&SessionEvent::NewInvitation {
            chat_id,
            kind: SessionKind::Group,
            contact,
            display_name: None,
            subject,
        });
        descriptor
    }

    /// Receive a message delivery status from the lower layer, persist it
    /// and notify observers.
    ///
    /// Status and reason arrive as integer codes; values outside the known
    /// vocabulary drop the whole update, store write included, so the
    /// persisted state never diverges from what observers were told.
    pub async fn receive_message_delivery_status(
        &self,
        chat_id: &str,
        msg_id: &str,
        mime_type: &str,
        status_code: i32,
        reason_code: i32,
    ) -> Result<(), StoreError> {
        let (status, reason) = match (
            MessageStatus::from_code(status_code),
            ReasonCode::from_code(reason_code),
        ) {
            (Ok(status), Ok(reason)) => (status, reason),
            (Err(err), _) | (_, Err(err)) => {
                warn!(chat_id, msg_id, %err, "dropping delivery status with unknown code");
                return Ok(());
            }
        };

        info!(chat_id, msg_id, ?status, "receive message delivery status");
        self.store.set_message_status(msg_id, status, reason).await?;

        self.fanout.broadcast_raw(RawEvent::MessageStatusChanged {
            chat_id: chat_id.to_owned(),
            mime_type: mime_type.to_owned(),
            msg_id: msg_id.to_owned(),
            status: status_code,
            reason: reason_code,
        });
        Ok(())
    }

    /// Session state change reported by the lower layer, codes included.
    ///
    /// Unknown codes are dropped at the fan-out boundary.
    pub fn receive_state_changed(&self, chat_id: &str, state_code: i32, reason_code: i32) {
        self.fanout.broadcast_raw(RawEvent::StateChanged {
            chat_id: chat_id.to_owned(),
            state: state_code,
            reason: reason_code,
        });
    }

    /// Composing indication from a participant.
    pub fn receive_composing_event(&self, chat_id: &str, contact: &str, active: bool) {
        self.fanout.broadcast_raw(RawEvent::ComposingEvent {
            chat_id: chat_id.to_owned(),
            contact: contact.to_owned(),
            active,
        });
    }

    /// Per-participant delivery info change in a group conversation.
    pub fn receive_group_delivery_info_changed(
        &self,
        chat_id: &str,
        contact: &str,
        msg_id: &str,
        status_code: i32,
        reason_code: i32,
    ) {
        self.fanout.broadcast_raw(RawEvent::GroupDeliveryInfoChanged {
            chat_id: chat_id.to_owned(),
            contact: contact.to_owned(),
            msg_id: msg_id.to_owned(),
            status: status_code,
            reason: reason_code,
        });
    }

    /// Participant metadata change in a group conversation.
    pub fn receive_participant_info_changed(&self, chat_id: &str, participant: ParticipantInfo) {
        self.fanout.broadcast_raw(RawEvent::ParticipantInfoChanged {
            chat_id: chat_id.to_owned(),
            participant,
        });
    }

    /// Sessions currently in progress.
    pub fn active_sessions(&self) -> Vec<SessionDescriptor> {
        self.registry.active_sessions()
    }

    /// A session in progress, by its conversation id.
    pub fn session(&self, chat_id: &str) -> Option<SessionDescriptor> {
        self.registry.get(chat_id)
    }

    /// Tear the service down, dropping every registered session.
    pub fn close(&self) {
        info!(sessions = self.registry.len(), "closing messaging service");
        self.registry.clear();
    }
}

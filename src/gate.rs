//! # Message Action Gate
//!
//! Decides which rendered messages the current client may edit or delete and
//! issues the corresponding mutation requests.
//!
//! Ownership is proven by the server-issued identity proof (a hashed IP)
//! matching the message's owner identity. A configured nickname narrows this
//! further but is never sufficient on its own.
//!
//! Mutations are not applied locally: a successful edit or delete shows up on
//! the next feed refresh.

use std::collections::HashSet;
use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::backend::ChatBackend;
use crate::error::ChatError;
use crate::models::{ChatMessage, DeleteRequest, EditRequest, IdentityProof, MessageId, SessionToken};
use crate::session::SessionTokenManager;

/// Controls exposed for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Actions {
    pub edit: bool,
    pub delete: bool,
}

impl Actions {
    pub const NONE: Actions = Actions { edit: false, delete: false };
    pub const ALL: Actions = Actions { edit: true, delete: true };

    pub fn any(&self) -> bool {
        self.edit || self.delete
    }
}

/// Editable copy of a message the client owns.
///
/// Only [`MessageActionGate::begin_edit`] hands these out; the owner it was
/// issued for is checked again on submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    msg_id: MessageId,
    owner: String,
    nick: String,
    original: String,
    text: String,
}

impl EditDraft {
    pub fn msg_id(&self) -> &MessageId {
        &self.msg_id
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// Text to submit; starts as a copy of the original.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Requested,
    Cancelled,
}

pub struct MessageActionGate {
    backend: Arc<dyn ChatBackend>,
    session: Arc<SessionTokenManager>,
    identity: Option<IdentityProof>,
    viewer_nick: Option<String>,
}

impl MessageActionGate {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        session: Arc<SessionTokenManager>,
        identity: Option<IdentityProof>,
        viewer_nick: Option<String>,
    ) -> Self {
        Self {
            backend,
            session,
            identity,
            viewer_nick,
        }
    }

    pub fn identity(&self) -> Option<&IdentityProof> {
        self.identity.as_ref()
    }

    fn is_owner(&self, msg: &ChatMessage) -> bool {
        self.owns(msg.owner_identity(), &msg.nick)
    }

    fn owns(&self, owner: &str, nick: &str) -> bool {
        let Some(identity) = &self.identity else {
            return false;
        };
        let proof = identity.as_str().as_bytes();
        if proof.is_empty() {
            return false;
        }
        let owner_match: bool = proof.ct_eq(owner.as_bytes()).into();
        if !owner_match {
            return false;
        }
        match &self.viewer_nick {
            Some(viewer) => viewer.trim() == nick,
            None => true,
        }
    }

    pub fn permissions(&self, msg: &ChatMessage) -> Actions {
        if self.is_owner(msg) {
            Actions::ALL
        } else {
            Actions::NONE
        }
    }

    /// Ids of every message in `messages` the client may mutate.
    pub fn authorized_ids(&self, messages: &[ChatMessage]) -> HashSet<MessageId> {
        messages
            .iter()
            .filter(|m| self.is_owner(m))
            .map(|m| m.id.clone())
            .collect()
    }

    /// Open an editable copy of `msg`, or `None` if the client does not own it.
    pub fn begin_edit(&self, msg: &ChatMessage) -> Option<EditDraft> {
        if !self.permissions(msg).edit {
            return None;
        }
        Some(EditDraft {
            msg_id: msg.id.clone(),
            owner: msg.owner_identity().to_string(),
            nick: msg.nick.clone(),
            original: msg.text.clone(),
            text: msg.text.clone(),
        })
    }

    fn proof_for(&self, id: &MessageId) -> Result<&IdentityProof, ChatError> {
        self.identity
            .as_ref()
            .ok_or_else(|| ChatError::NotPermitted(id.to_string()))
    }

    /// Send the edited text. Nothing changes locally on failure.
    pub async fn submit_edit(&self, draft: &EditDraft) -> Result<(), ChatError> {
        if !self.owns(&draft.owner, &draft.nick) {
            return Err(ChatError::NotPermitted(draft.msg_id.to_string()));
        }
        let new_message = draft.text.trim();
        if new_message.is_empty() {
            return Err(ChatError::InvalidInput("Message cannot be empty!".into()));
        }
        let proof = self.proof_for(&draft.msg_id)?;
        let token = self.session.ensure().await?;

        let body = EditRequest {
            msg_id: draft.msg_id.clone(),
            session_token: token.as_str().to_string(),
            ip: proof.as_str().to_string(),
            new_message: new_message.to_string(),
        };
        let result = self.backend.edit_message(body).await;
        self.settle("edit", &draft.msg_id, &token, result)
    }

    /// Delete `msg` after `confirm` approves it.
    ///
    /// The message stays in the local view until the next sync drops it.
    pub async fn delete<F>(&self, msg: &ChatMessage, confirm: F) -> Result<DeleteOutcome, ChatError>
    where
        F: FnOnce(&ChatMessage) -> bool,
    {
        if !self.permissions(msg).delete {
            return Err(ChatError::NotPermitted(msg.id.to_string()));
        }
        if !confirm(msg) {
            return Ok(DeleteOutcome::Cancelled);
        }
        let proof = self.proof_for(&msg.id)?;
        let token = self.session.ensure().await?;

        let body = DeleteRequest {
            msg_id: msg.id.clone(),
            session_token: token.as_str().to_string(),
            ip: proof.as_str().to_string(),
        };
        let result = self.backend.delete_message(body).await;
        self.settle("delete", &msg.id, &token, result)?;
        Ok(DeleteOutcome::Requested)
    }

    fn settle(
        &self,
        action: &'static str,
        id: &MessageId,
        token: &SessionToken,
        result: Result<(), ChatError>,
    ) -> Result<(), ChatError> {
        match result {
            Ok(()) => {
                info!(action, msg_id = %id, "message mutation accepted");
                Ok(())
            }
            Err(e) => {
                if matches!(e, ChatError::AuthExpired { .. }) {
                    self.session.mark_expired(token);
                }
                warn!(action, msg_id = %id, error = %e, "message mutation failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Call, FakeBackend};
    use crate::models::{parse_feed, Timestamp};

    fn msg(id: &str, nick: &str) -> ChatMessage {
        ChatMessage {
            nick: nick.into(),
            id: MessageId::new(id),
            text: "original text".into(),
            timestamp: Timestamp::default(),
            owner: None,
        }
    }

    fn gate(fake: &Arc<FakeBackend>, identity: Option<&str>, nick: Option<&str>) -> (MessageActionGate, Arc<SessionTokenManager>) {
        let backend: Arc<dyn ChatBackend> = Arc::clone(fake) as Arc<dyn ChatBackend>;
        let session = Arc::new(SessionTokenManager::new(Arc::clone(&backend)));
        let g = MessageActionGate::new(
            backend,
            Arc::clone(&session),
            identity.map(IdentityProof::new),
            nick.map(String::from),
        );
        (g, session)
    }

    #[test]
    fn owner_gets_both_actions() {
        let fake = Arc::new(FakeBackend::new());
        let (g, _) = gate(&fake, Some("0xabc"), None);
        assert_eq!(g.permissions(&msg("0xabc", "kitty")), Actions::ALL);
    }

    #[test]
    fn non_matching_identity_gets_no_actions() {
        let fake = Arc::new(FakeBackend::new());
        let (g, _) = gate(&fake, Some("0xabc"), Some("kitty"));
        let other = msg("0xdef", "kitty");
        assert_eq!(g.permissions(&other), Actions::NONE);
        assert!(g.begin_edit(&other).is_none());
    }

    #[test]
    fn matching_nick_alone_is_not_enough() {
        let fake = Arc::new(FakeBackend::new());
        let (g, _) = gate(&fake, None, Some("kitty"));
        assert!(!g.permissions(&msg("0xabc", "kitty")).any());
    }

    #[test]
    fn configured_nick_must_also_match() {
        let fake = Arc::new(FakeBackend::new());
        let (g, _) = gate(&fake, Some("0xabc"), Some("kitty "));
        assert!(g.permissions(&msg("0xabc", "kitty")).any());
        assert!(!g.permissions(&msg("0xabc", "impostor")).any());
    }

    #[test]
    fn explicit_owner_field_wins_over_id() {
        let fake = Arc::new(FakeBackend::new());
        let (g, _) = gate(&fake, Some("hash-1"), None);
        let msgs = parse_feed(
            r#"[{"nick":"a","id":"hash-1","msg":"x","owner":"hash-2"},
                {"nick":"b","id":"9","msg":"y","owner":"hash-1"}]"#,
        )
        .unwrap();
        let ids = g.authorized_ids(&msgs);
        assert_eq!(ids.len(), 1);
        assert!(ids.contains(&MessageId::new("9")));
    }

    #[test]
    fn empty_identity_never_matches() {
        let fake = Arc::new(FakeBackend::new());
        let (g, _) = gate(&fake, Some(""), None);
        assert!(!g.permissions(&msg("", "a")).any());
    }

    #[test]
    fn begin_edit_copies_text() {
        let fake = Arc::new(FakeBackend::new());
        let (g, _) = gate(&fake, Some("0x1"), None);
        let draft = g.begin_edit(&msg("0x1", "a")).unwrap();
        assert_eq!(draft.text(), "original text");
        assert_eq!(draft.original(), draft.text());
    }

    #[tokio::test]
    async fn submit_edit_sends_full_body() {
        let fake = Arc::new(FakeBackend::new());
        fake.push_token(Ok("tok".into()));
        let (g, _) = gate(&fake, Some("0x1"), None);
        let mut draft = g.begin_edit(&msg("0x1", "a")).unwrap();
        draft.set_text("  fixed typo  ");
        g.submit_edit(&draft).await.unwrap();

        let edit = fake.calls().into_iter().find_map(|c| match c {
            Call::Edit(body) => Some(body),
            _ => None,
        });
        assert_eq!(
            edit,
            Some(EditRequest {
                msg_id: MessageId::new("0x1"),
                session_token: "tok".into(),
                ip: "0x1".into(),
                new_message: "fixed typo".into(),
            })
        );
    }

    #[tokio::test]
    async fn empty_edit_rejected_locally() {
        let fake = Arc::new(FakeBackend::new());
        let (g, _) = gate(&fake, Some("0x1"), None);
        let mut draft = g.begin_edit(&msg("0x1", "a")).unwrap();
        draft.set_text("   ");
        let err = g.submit_edit(&draft).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn draft_for_foreign_message_is_refused_on_submit() {
        let fake = Arc::new(FakeBackend::new());
        fake.push_token(Ok("tok".into()));
        let (owner_gate, _) = gate(&fake, Some("0xdef"), None);
        let draft = owner_gate.begin_edit(&msg("0xdef", "b")).unwrap();

        // A different client cannot submit a draft issued for someone else.
        let (g, _) = gate(&fake, Some("0x1"), None);
        let err = g.submit_edit(&draft).await.unwrap_err();
        assert_eq!(err, ChatError::NotPermitted("0xdef".into()));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn draft_rechecks_nick_on_submit() {
        let fake = Arc::new(FakeBackend::new());
        let (any_nick, _) = gate(&fake, Some("0x1"), None);
        let draft = any_nick.begin_edit(&msg("0x1", "impostor")).unwrap();

        let (g, _) = gate(&fake, Some("0x1"), Some("kitty"));
        assert!(matches!(g.submit_edit(&draft).await, Err(ChatError::NotPermitted(_))));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn edit_server_error_surfaces() {
        let fake = Arc::new(FakeBackend::new());
        fake.push_token(Ok("tok".into()));
        fake.push_mutation(Err(ChatError::from_status(500, "edit")));
        let (g, session) = gate(&fake, Some("0x1"), None);
        let draft = g.begin_edit(&msg("0x1", "a")).unwrap();
        let err = g.submit_edit(&draft).await.unwrap_err();
        assert!(matches!(err, ChatError::Server { status: 500, .. }));
        assert!(session.is_valid());
    }

    #[tokio::test]
    async fn edit_auth_failure_expires_session() {
        let fake = Arc::new(FakeBackend::new());
        fake.push_token(Ok("tok".into()));
        fake.push_mutation(Err(ChatError::from_status(401, "edit")));
        let (g, session) = gate(&fake, Some("0x1"), None);
        let draft = g.begin_edit(&msg("0x1", "a")).unwrap();
        assert!(g.submit_edit(&draft).await.is_err());
        assert!(!session.is_valid());
    }

    #[tokio::test]
    async fn declined_delete_sends_nothing() {
        let fake = Arc::new(FakeBackend::new());
        let (g, _) = gate(&fake, Some("0x1"), None);
        let outcome = g.delete(&msg("0x1", "a"), |_| false).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Cancelled);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn confirmed_delete_sends_request() {
        let fake = Arc::new(FakeBackend::new());
        fake.push_token(Ok("tok".into()));
        let (g, _) = gate(&fake, Some("0x1"), None);
        let outcome = g.delete(&msg("0x1", "a"), |_| true).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Requested);
        assert!(fake.calls().contains(&Call::Delete(DeleteRequest {
            msg_id: MessageId::new("0x1"),
            session_token: "tok".into(),
            ip: "0x1".into(),
        })));
    }

    #[tokio::test]
    async fn delete_of_foreign_message_is_refused_before_confirm() {
        let fake = Arc::new(FakeBackend::new());
        let (g, _) = gate(&fake, Some("0x1"), None);
        let mut asked = false;
        let err = g
            .delete(&msg("0x2", "a"), |_| {
                asked = true;
                true
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotPermitted(_)));
        assert!(!asked);
        assert!(fake.calls().is_empty());
    }
}

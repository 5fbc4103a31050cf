use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    error::{GuardianError, ModelError, Result},
    gemini::ChatModel,
    models::ChatMessage,
};

pub const NO_DOCUMENT_CONTEXT: &str = "No document has been analyzed yet.";

pub const GREETING: &str = "Hello! I'm Health Guardian, your AI medical assistant. How can I help you understand your health report or answer any health-related questions?";

pub const CHAT_FAILED_MESSAGE: &str = "Sorry, I couldn't get a response. Please try again.";

fn system_instruction(grounding: &str) -> String {
    let context = if grounding.trim().is_empty() {
        NO_DOCUMENT_CONTEXT
    } else {
        grounding
    };

    format!(
        "You are a helpful and empathetic AI medical assistant. Your name is Health Guardian. \
        Your role is to answer questions about the user's medical report and general health topics.
IMPORTANT:
1. NEVER provide a diagnosis or medical advice.
2. ALWAYS preface any health-related guidance with \"You should consult your doctor about...\" or a similar disclaimer.
3. If you don't know the answer, say so.
4. Keep your answers clear, concise, and easy to understand.
5. If the user provides context about their medical report, use it to inform your answers.

Here is the summary of the user's latest medical report for context:
---
{context}
---
"
    )
}

/// A conversation grounded on one analysis summary.
///
/// `messages` is what the user sees, starting with the greeting. `history` is
/// what the model sees: only turns that completed successfully.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    grounding: String,
    system_instruction: String,
    messages: Vec<ChatMessage>,
    history: Vec<ChatMessage>,
    error: Option<String>,
    in_flight: bool,
}

/// Shared handle to a session. The lock is only held for bookkeeping, never
/// while waiting on the model.
pub type ChatHandle = Arc<Mutex<ChatSession>>;

/// A user turn that has been recorded locally and awaits the model reply.
#[derive(Debug)]
pub struct PendingTurn {
    system_instruction: String,
    history: Vec<ChatMessage>,
    message: String,
}

impl PendingTurn {
    pub async fn dispatch(
        &self,
        model: &dyn ChatModel,
    ) -> std::result::Result<String, ModelError> {
        model
            .reply(&self.system_instruction, &self.history, &self.message)
            .await
    }
}

impl ChatSession {
    pub fn new(grounding: impl Into<String>) -> Self {
        let grounding = grounding.into();
        let system_instruction = system_instruction(&grounding);
        Self {
            id: Uuid::new_v4(),
            grounding,
            system_instruction,
            messages: vec![ChatMessage::assistant(GREETING)],
            history: Vec::new(),
            error: None,
            in_flight: false,
        }
    }

    pub fn into_handle(self) -> ChatHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn grounding(&self) -> &str {
        &self.grounding
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Records the user message and marks the session busy.
    pub fn begin_turn(&mut self, text: &str) -> Result<PendingTurn> {
        if text.trim().is_empty() {
            return Err(GuardianError::MissingInput(
                "Message cannot be empty".to_string(),
            ));
        }
        if self.in_flight {
            return Err(GuardianError::Busy(
                "A reply is already being generated. Please wait.".to_string(),
            ));
        }

        self.in_flight = true;
        self.error = None;
        self.messages.push(ChatMessage::user(text));

        info!(
            session_id = %self.id,
            turn = self.history.len() / 2 + 1,
            "Chat turn started"
        );

        Ok(PendingTurn {
            system_instruction: self.system_instruction.clone(),
            history: self.history.clone(),
            message: text.to_string(),
        })
    }

    /// Applies the model outcome. On failure the user message stays visible
    /// and the error is recorded on the session.
    pub fn finish_turn(
        &mut self,
        turn: PendingTurn,
        outcome: std::result::Result<String, ModelError>,
    ) -> Result<ChatMessage> {
        self.in_flight = false;
        match outcome {
            Ok(reply) => {
                let reply = ChatMessage::assistant(reply);
                self.history.push(ChatMessage::user(turn.message));
                self.history.push(reply.clone());
                self.messages.push(reply.clone());
                Ok(reply)
            }
            Err(e) => {
                error!(session_id = %self.id, error = %e, "Chat turn failed");
                self.error = Some(CHAT_FAILED_MESSAGE.to_string());
                Err(GuardianError::Chat(CHAT_FAILED_MESSAGE.to_string()))
            }
        }
    }

    pub async fn send(&mut self, model: &dyn ChatModel, text: &str) -> Result<ChatMessage> {
        let turn = self.begin_turn(text)?;
        let outcome = turn.dispatch(model).await;
        self.finish_turn(turn, outcome)
    }
}

/// Sends one turn through a shared handle. A second turn while one is in
/// flight is rejected with [`GuardianError::Busy`].
pub async fn send_message(
    handle: &ChatHandle,
    model: &dyn ChatModel,
    text: &str,
) -> Result<ChatMessage> {
    let turn = handle.lock().await.begin_turn(text)?;
    let outcome = turn.dispatch(model).await;
    handle.lock().await.finish_turn(turn, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::testing::ScriptedChat;
    use crate::models::ChatRole;

    #[test]
    fn test_empty_context_still_greets() {
        let session = ChatSession::new("");
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, ChatRole::Assistant);
        assert_eq!(session.messages()[0].text, GREETING);
        assert!(session.system_instruction().contains(NO_DOCUMENT_CONTEXT));
    }

    #[test]
    fn test_summary_is_embedded_in_instruction() {
        let session = ChatSession::new("Hemoglobin is slightly low.");
        assert!(session.system_instruction().contains("---\nHemoglobin is slightly low.\n---"));
        assert!(!session.system_instruction().contains(NO_DOCUMENT_CONTEXT));
    }

    #[tokio::test]
    async fn test_turns_append_and_feed_history() {
        let model = ScriptedChat::replying(&["It is below range.", "Iron-rich foods may help."]);
        let mut session = ChatSession::new("Hemoglobin is slightly low.");

        let reply = session.send(&model, "Is my hemoglobin low?").await.unwrap();
        assert_eq!(reply, ChatMessage::assistant("It is below range."));
        session.send(&model, "What can I eat?").await.unwrap();

        assert_eq!(session.messages().len(), 5);
        let turns = model.turns();
        assert_eq!(turns.len(), 2);
        assert!(turns[0].history.is_empty());
        assert_eq!(
            turns[1].history,
            vec![
                ChatMessage::user("Is my hemoglobin low?"),
                ChatMessage::assistant("It is below range."),
            ]
        );
        assert_eq!(turns[1].message, "What can I eat?");
        assert!(turns[1].system_instruction.contains("Hemoglobin is slightly low."));
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_messages_and_records_error() {
        let model = ScriptedChat::replying(&["First answer."]);
        model.push_err(ModelError::Chat("connection reset".to_string()));
        model.push_ok("Third answer.");
        let mut session = ChatSession::new("");

        session.send(&model, "one").await.unwrap();
        let err = session.send(&model, "two").await.unwrap_err();
        assert!(matches!(err, GuardianError::Chat(_)));
        assert_eq!(session.error(), Some(CHAT_FAILED_MESSAGE));
        assert_eq!(session.messages().len(), 4);
        assert_eq!(session.messages()[3], ChatMessage::user("two"));

        session.send(&model, "three").await.unwrap();
        assert!(session.error().is_none());
        assert_eq!(model.turns()[2].history.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected_locally() {
        let model = ScriptedChat::default();
        let mut session = ChatSession::new("");
        let err = session.send(&model, "  ").await.unwrap_err();
        assert!(matches!(err, GuardianError::MissingInput(_)));
        assert!(model.turns().is_empty());
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_second_turn_while_busy_is_rejected() {
        let model = ScriptedChat::replying(&["ok"]);
        let handle = ChatSession::new("").into_handle();

        let pending = handle.lock().await.begin_turn("first").unwrap();
        assert!(handle.lock().await.is_loading());

        let err = send_message(&handle, &model, "second").await.unwrap_err();
        assert!(matches!(err, GuardianError::Busy(_)));
        assert!(model.turns().is_empty());

        let outcome = pending.dispatch(&model).await;
        handle.lock().await.finish_turn(pending, outcome).unwrap();

        let session = handle.lock().await;
        assert!(!session.is_loading());
        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[1], ChatMessage::user("first"));
    }
}

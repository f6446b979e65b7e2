//! Sessions, turns and prompt rendering

use super::template::INSTRUCTION_PLACEHOLDER;
use super::{ConversationError, ConversationTemplate, SeparatorStyle};
use serde::{Deserialize, Serialize};

/// Turns kept in a rendered prompt under the single-separator style
pub const SINGLE_STYLE_WINDOW: usize = 6;

/// Language tag of canonical (prompt) text
pub const CANONICAL_LANGUAGE: &str = "en";

/// Which side of the exchange a turn belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Role expected at `index` in an alternating session
    pub fn for_index(index: usize) -> Self {
        if index % 2 == 0 {
            Role::User
        } else {
            Role::Model
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// A turn whose text is known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTurn {
    pub role: Role,
    /// English text used to build prompts
    pub text: String,
    /// Text shown to the user, in their language
    pub display_text: String,
    pub language: String,
}

/// A response that is still being generated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTurn {
    pub role: Role,
    pub language: String,
    /// Partial output so far, including the in-progress cursor
    #[serde(default)]
    pub partial: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Turn {
    Complete(CompleteTurn),
    Pending(PendingTurn),
}

impl Turn {
    pub fn complete(
        role: Role,
        text: impl Into<String>,
        display_text: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Turn::Complete(CompleteTurn {
            role,
            text: text.into(),
            display_text: display_text.into(),
            language: language.into(),
        })
    }

    pub fn pending(role: Role, language: impl Into<String>) -> Self {
        Turn::Pending(PendingTurn {
            role,
            language: language.into(),
            partial: String::new(),
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Turn::Complete(turn) => turn.role,
            Turn::Pending(turn) => turn.role,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Turn::Pending(_))
    }
}

/// One request/response row as a UI shows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayPair {
    pub request: String,
    pub request_display: String,
    pub response: Option<String>,
    pub response_display: Option<String>,
}

/// Serialisable state written to exchange logs
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub template_id: String,
    pub system: String,
    pub roles: [String; 2],
    pub turns: Vec<Turn>,
    pub offset: usize,
    pub sep: String,
    pub sep2: Option<String>,
    pub session_id: String,
}

/// Alternating turns rendered through one template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub template_id: String,
    pub turns: Vec<Turn>,
    pub history_offset: usize,
    pub session_id: String,
    #[serde(default)]
    pub skip_next: bool,
}

impl Session {
    /// Fresh session carrying the template's preamble under a new id
    pub fn from_template(template: &ConversationTemplate) -> Self {
        let mut session = Self {
            template_id: template.id.clone(),
            turns: Vec::with_capacity(template.preamble.len() + 2),
            history_offset: template.history_offset(),
            session_id: new_session_id(),
            skip_next: false,
        };
        for (role, text) in &template.preamble {
            session.append_turn(Turn::complete(*role, text.as_str(), text.as_str(), CANONICAL_LANGUAGE));
        }
        session
    }

    /// Append a turn.
    ///
    /// # Panics
    ///
    /// Panics if the turn breaks role alternation or follows a pending turn.
    pub fn append_turn(&mut self, turn: Turn) {
        let expected = Role::for_index(self.turns.len());
        assert_eq!(
            turn.role(),
            expected,
            "turn {} must have role {}",
            self.turns.len(),
            expected.as_str()
        );
        assert!(
            !self.turns.last().is_some_and(Turn::is_pending),
            "cannot append after a pending response"
        );
        self.turns.push(turn);
    }

    /// Append the user's turn followed by a pending response in the same language
    pub fn append_exchange(&mut self, text: String, display_text: String, language: String) {
        self.append_turn(Turn::complete(Role::User, text, display_text, language.clone()));
        self.append_turn(Turn::pending(Role::Model, language));
        self.skip_next = false;
    }

    /// No exchange beyond the template preamble yet, so the next one is the
    /// first round
    pub fn awaits_first_round(&self) -> bool {
        self.turns.len() == self.history_offset
    }

    pub fn pending_turn(&self) -> Option<&PendingTurn> {
        match self.turns.last() {
            Some(Turn::Pending(turn)) => Some(turn),
            _ => None,
        }
    }

    pub fn pending_turn_mut(&mut self) -> Option<&mut PendingTurn> {
        match self.turns.last_mut() {
            Some(Turn::Pending(turn)) => Some(turn),
            _ => None,
        }
    }

    /// Replace the pending response with its final text
    pub fn complete_response(
        &mut self,
        text: String,
        display_text: String,
    ) -> Result<(), ConversationError> {
        let pending = self
            .pending_turn()
            .ok_or(ConversationError::NoPendingResponse)?;
        let role = pending.role;
        let language = pending.language.clone();
        if let Some(last) = self.turns.last_mut() {
            *last = Turn::complete(role, text, display_text, language);
        }
        Ok(())
    }

    /// Check a session received from a client against its template
    pub fn validate(&self, template: &ConversationTemplate) -> Result<(), ConversationError> {
        if self.template_id != template.id {
            return Err(ConversationError::UnknownTemplate(self.template_id.clone()));
        }
        if self.history_offset != template.history_offset()
            || self.turns.len() < self.history_offset
        {
            return Err(ConversationError::OffsetMismatch {
                offset: self.history_offset,
                expected: template.history_offset(),
            });
        }
        for (index, turn) in self.turns.iter().enumerate() {
            let expected = Role::for_index(index);
            if turn.role() != expected {
                return Err(ConversationError::BrokenAlternation {
                    index,
                    expected: expected.as_str(),
                    found: turn.role().as_str(),
                });
            }
            if turn.is_pending() && index + 1 != self.turns.len() {
                return Err(ConversationError::PendingNotLast(index));
            }
        }
        Ok(())
    }

    /// A new user turn can be appended: no response is owed
    pub fn ensure_accepts_input(&self) -> Result<(), ConversationError> {
        if self.turns.len() % 2 == 1 || self.turns.last().is_some_and(Turn::is_pending) {
            return Err(ConversationError::ResponsePending);
        }
        Ok(())
    }

    /// Start over from `template`, carrying the latest exchange across
    pub fn retemplate(&self, template: &ConversationTemplate) -> Session {
        let mut fresh = Session::from_template(template);
        let carried = self.turns.len().saturating_sub(2).max(self.history_offset);
        for turn in &self.turns[carried..] {
            fresh.append_turn(turn.clone());
        }
        fresh
    }

    /// Render the prompt sent to the worker.
    ///
    /// A pending turn renders as `"<role>:"` with no trailing separator; the
    /// worker echoes this prompt and generation continues from there.
    pub fn render_prompt(&self, template: &ConversationTemplate) -> String {
        if !template.chat {
            let instruction = self
                .turns
                .iter()
                .rev()
                .find_map(|turn| match turn {
                    Turn::Complete(turn) if turn.role == Role::User => Some(turn.text.as_str()),
                    _ => None,
                })
                .unwrap_or_default();
            return template
                .single_shot
                .as_deref()
                .unwrap_or(INSTRUCTION_PLACEHOLDER)
                .replace(INSTRUCTION_PLACEHOLDER, instruction);
        }

        let first = match template.separator_style {
            SeparatorStyle::Single => self.turns.len().saturating_sub(SINGLE_STYLE_WINDOW),
            SeparatorStyle::PairedAlternating => 0,
        };

        let mut prompt = format!("{}{}", template.system, template.sep);
        for (index, turn) in self.turns.iter().enumerate().skip(first) {
            prompt.push_str(template.role_name(turn.role()));
            match turn {
                Turn::Complete(turn) if !turn.text.is_empty() => {
                    prompt.push_str(": ");
                    prompt.push_str(&turn.text);
                    prompt.push_str(template.separator_for(index));
                }
                _ => prompt.push(':'),
            }
        }
        prompt
    }

    /// Visible turns grouped into request/response rows
    pub fn display_pairs(&self) -> Vec<DisplayPair> {
        let mut pairs: Vec<DisplayPair> = Vec::new();
        for turn in self.turns.iter().skip(self.history_offset) {
            match (turn.role(), turn) {
                (Role::User, Turn::Complete(turn)) => pairs.push(DisplayPair {
                    request: turn.text.clone(),
                    request_display: turn.display_text.clone(),
                    response: None,
                    response_display: None,
                }),
                (Role::Model, Turn::Complete(turn)) => {
                    if let Some(pair) = pairs.last_mut() {
                        pair.response = Some(turn.text.clone());
                        pair.response_display = Some(turn.display_text.clone());
                    }
                }
                (Role::Model, Turn::Pending(turn)) if !turn.partial.is_empty() => {
                    if let Some(pair) = pairs.last_mut() {
                        pair.response = Some(turn.partial.clone());
                    }
                }
                _ => {}
            }
        }
        pairs
    }

    pub fn snapshot(&self, template: &ConversationTemplate) -> SessionSnapshot {
        SessionSnapshot {
            template_id: self.template_id.clone(),
            system: template.system.clone(),
            roles: template.roles.clone(),
            turns: self.turns.clone(),
            offset: self.history_offset,
            sep: template.sep.clone(),
            sep2: template.sep2.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

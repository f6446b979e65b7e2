//! Conversation templates
//!
//! A template is immutable, process-wide configuration keyed by id. It fixes
//! the system preamble, the two role names and the separator scheme used to
//! render a session into a prompt.

use super::{ConversationError, Role};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Placeholder substituted by single-shot templates
pub const INSTRUCTION_PLACEHOLDER: &str = "{instruction}";

/// How turns are separated in a rendered prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparatorStyle {
    /// Every turn ends with the primary separator
    Single,
    /// Turns alternate between the primary and secondary separator
    PairedAlternating,
}

impl SeparatorStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            SeparatorStyle::Single => "single",
            SeparatorStyle::PairedAlternating => "paired_alternating",
        }
    }
}

impl FromStr for SeparatorStyle {
    type Err = ConversationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(SeparatorStyle::Single),
            "paired_alternating" | "two" => Ok(SeparatorStyle::PairedAlternating),
            other => Err(ConversationError::InvalidSeparatorStyle(other.to_string())),
        }
    }
}

/// Prompt framing for one family of backend models
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTemplate {
    pub id: String,
    pub system: String,
    pub roles: [String; 2],
    pub separator_style: SeparatorStyle,
    pub sep: String,
    pub sep2: Option<String>,
    /// Chat templates render the whole history; single-shot templates only
    /// the latest instruction
    pub chat: bool,
    pub single_shot: Option<String>,
    /// Example exchange rendered ahead of the user's turns and hidden from
    /// display
    pub preamble: Vec<(Role, String)>,
}

impl ConversationTemplate {
    pub fn role_name(&self, role: Role) -> &str {
        match role {
            Role::User => &self.roles[0],
            Role::Model => &self.roles[1],
        }
    }

    /// Number of leading turns hidden from display
    pub fn history_offset(&self) -> usize {
        self.preamble.len()
    }

    /// Secondary separator, falling back to the primary one
    pub fn secondary_sep(&self) -> &str {
        self.sep2.as_deref().unwrap_or(&self.sep)
    }

    /// Separator following the turn at `index`
    pub fn separator_for(&self, index: usize) -> &str {
        match self.separator_style {
            SeparatorStyle::Single => &self.sep,
            SeparatorStyle::PairedAlternating if index % 2 == 0 => &self.sep,
            SeparatorStyle::PairedAlternating => self.secondary_sep(),
        }
    }

    /// Stop sequence sent to the worker along with the prompt
    pub fn stop_sequence(&self) -> &str {
        match self.separator_style {
            SeparatorStyle::Single => &self.sep,
            SeparatorStyle::PairedAlternating => self.secondary_sep(),
        }
    }

    /// General-purpose chat template with a one-round worked example
    pub fn v1() -> Self {
        Self {
            id: "v1".to_string(),
            system: "A chat between a curious human and an artificial intelligence assistant. \
                     The assistant gives helpful, detailed, and polite answers to the human's questions."
                .to_string(),
            roles: ["Human".to_string(), "Assistant".to_string()],
            separator_style: SeparatorStyle::Single,
            sep: "###".to_string(),
            sep2: None,
            chat: true,
            single_shot: None,
            preamble: vec![
                (
                    Role::User,
                    "What are the key differences between renewable and non-renewable energy sources?"
                        .to_string(),
                ),
                (Role::Model, V1_EXAMPLE_ANSWER.to_string()),
            ],
        }
    }

    /// Template for models trained on the BAIR dialogue format
    pub fn bair_v1() -> Self {
        Self {
            id: "bair_v1".to_string(),
            system: "BEGINNING OF CONVERSATION:".to_string(),
            roles: ["USER".to_string(), "GPT".to_string()],
            separator_style: SeparatorStyle::PairedAlternating,
            sep: " ".to_string(),
            sep2: Some("</s>".to_string()),
            chat: true,
            single_shot: None,
            preamble: Vec::new(),
        }
    }

    /// Instruction/response chat template
    pub fn medgpt() -> Self {
        Self {
            id: "medgpt".to_string(),
            system: "Below is an instruction that describes a task. \
                     Write a response that appropriately completes the request."
                .to_string(),
            roles: ["Instruction".to_string(), "Response".to_string()],
            separator_style: SeparatorStyle::Single,
            sep: "\n\n###".to_string(),
            sep2: None,
            chat: true,
            single_shot: None,
            preamble: Vec::new(),
        }
    }

    /// Single-shot instruction template; the default for new sessions
    pub fn medgpt_instruct() -> Self {
        Self {
            id: "medgpt_instruct".to_string(),
            system: String::new(),
            roles: ["USER".to_string(), "GPT".to_string()],
            separator_style: SeparatorStyle::Single,
            sep: "###".to_string(),
            sep2: None,
            chat: false,
            single_shot: Some(
                "Below is an instruction that describes a task. \
                 Write a response that appropriately completes the request.\n\
                 ### Instruction:\n{instruction}\n### Response:"
                    .to_string(),
            ),
            preamble: Vec::new(),
        }
    }

    pub fn builtin() -> Vec<Self> {
        vec![
            Self::v1(),
            Self::bair_v1(),
            Self::medgpt(),
            Self::medgpt_instruct(),
        ]
    }
}

const V1_EXAMPLE_ANSWER: &str = "Renewable energy sources are those that can be replenished naturally in a relatively \
short amount of time, such as solar, wind, hydro, geothermal, and biomass. \
Non-renewable energy sources, on the other hand, are finite and will eventually be \
depleted, such as coal, oil, and natural gas. Here are some key differences between \
renewable and non-renewable energy sources:\n\
1. Availability: Renewable energy sources are virtually inexhaustible, while non-renewable \
energy sources are finite and will eventually run out.\n\
2. Environmental impact: Renewable energy sources have a much lower environmental impact \
than non-renewable sources, which can lead to air and water pollution, greenhouse gas emissions, \
and other negative effects.\n\
3. Cost: Renewable energy sources can be more expensive to initially set up, but they typically \
have lower operational costs than non-renewable sources.\n\
4. Reliability: Renewable energy sources are often more reliable and can be used in more remote \
locations than non-renewable sources.\n\
5. Flexibility: Renewable energy sources are often more flexible and can be adapted to different \
situations and needs, while non-renewable sources are more rigid and inflexible.\n\
6. Sustainability: Renewable energy sources are more sustainable over the long term, while \
non-renewable sources are not, and their depletion can lead to economic and social instability.\n";

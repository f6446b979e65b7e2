//! Template registry
//!
//! Built once at startup and shared read-only. Maps template ids to
//! templates and model ids to the template their prompts need.

use super::{ConversationError, ConversationTemplate, Role, SeparatorStyle, Session};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Model → template assignments known out of the box
const BUILTIN_MODEL_TEMPLATES: &[(&str, &str)] = &[
    ("koala-7b", "bair_v1"),
    ("koala-13b", "bair_v1"),
    ("medgpt", "medgpt"),
    ("medgpt-7b", "medgpt"),
    ("medgpt-13b", "medgpt"),
];

/// Template for models without an explicit assignment
const FALLBACK_TEMPLATE: &str = "v1";

/// Template new sessions start from
const SESSION_DEFAULT_TEMPLATE: &str = "medgpt_instruct";

pub struct TemplateRegistry {
    templates: HashMap<String, Arc<ConversationTemplate>>,
    model_templates: HashMap<String, String>,
    fallback: Arc<ConversationTemplate>,
    session_default: Arc<ConversationTemplate>,
}

impl TemplateRegistry {
    pub fn builtin() -> Self {
        let templates: HashMap<String, Arc<ConversationTemplate>> = ConversationTemplate::builtin()
            .into_iter()
            .map(|t| (t.id.clone(), Arc::new(t)))
            .collect();
        let fallback = templates
            .get(FALLBACK_TEMPLATE)
            .cloned()
            .unwrap_or_else(|| Arc::new(ConversationTemplate::v1()));
        let session_default = templates
            .get(SESSION_DEFAULT_TEMPLATE)
            .cloned()
            .unwrap_or_else(|| Arc::new(ConversationTemplate::medgpt_instruct()));
        let model_templates = BUILTIN_MODEL_TEMPLATES
            .iter()
            .map(|(model, template)| ((*model).to_string(), (*template).to_string()))
            .collect();

        Self {
            templates,
            model_templates,
            fallback,
            session_default,
        }
    }

    /// Built-in templates extended by a JSON definition file
    pub fn from_file(path: &Path) -> Result<Self, ConversationError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConversationError> {
        let file: TemplateFile = serde_json::from_str(raw)?;
        let mut registry = Self::builtin();
        for def in file.templates {
            let template = def.into_template()?;
            registry
                .templates
                .insert(template.id.clone(), Arc::new(template));
        }
        for (model, template_id) in file.models {
            if !registry.templates.contains_key(&template_id) {
                return Err(ConversationError::UnknownTemplate(template_id));
            }
            registry.model_templates.insert(model, template_id);
        }
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Result<Arc<ConversationTemplate>, ConversationError> {
        self.templates
            .get(id)
            .cloned()
            .ok_or_else(|| ConversationError::UnknownTemplate(id.to_string()))
    }

    /// Template a model's prompts are rendered with
    pub fn template_for_model(&self, model_id: &str) -> Arc<ConversationTemplate> {
        self.model_templates
            .get(model_id)
            .and_then(|id| self.templates.get(id))
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Empty session copied from the default template
    pub fn new_session(&self) -> Session {
        Session::from_template(&self.session_default)
    }

    pub fn template_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.templates.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    templates: Vec<TemplateDef>,
    #[serde(default)]
    models: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TemplateDef {
    id: String,
    #[serde(default)]
    system: String,
    roles: [String; 2],
    separator_style: String,
    sep: String,
    #[serde(default)]
    sep2: Option<String>,
    #[serde(default = "default_chat")]
    chat: bool,
    #[serde(default)]
    single_shot: Option<String>,
    /// Example turns, alternating from the user role
    #[serde(default)]
    preamble: Vec<String>,
}

fn default_chat() -> bool {
    true
}

impl TemplateDef {
    fn into_template(self) -> Result<ConversationTemplate, ConversationError> {
        let separator_style: SeparatorStyle = self.separator_style.parse()?;
        // User turns must stay on even indices after the preamble
        if self.preamble.len() % 2 != 0 {
            return Err(ConversationError::OddPreamble(self.id));
        }
        let preamble = self
            .preamble
            .into_iter()
            .enumerate()
            .map(|(index, text)| (Role::for_index(index), text))
            .collect();
        Ok(ConversationTemplate {
            id: self.id,
            system: self.system,
            roles: self.roles,
            separator_style,
            sep: self.sep,
            sep2: self.sep2,
            chat: self.chat,
            single_shot: self.single_shot,
            preamble,
        })
    }
}

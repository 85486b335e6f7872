use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::KeyValueStore;
use crate::constants::{KEY_TEMPLATES, TEMPLATE_DEFAULT, TEMPLATE_POMODORO};
use crate::error::EngineResult;
use crate::stage::{StageDefinition, check_stored_stages, slugify};
use crate::storage::{read_json, write_json};

/// Named, ordered stage list a session copies its stages from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub stages: Vec<StageDefinition>,
}

impl Template {
    /// Deep copy of the stage list for a session to own.
    #[must_use]
    pub fn instantiate(&self) -> Vec<StageDefinition> {
        self.stages.clone()
    }

    /// Essay workflow from brainstorming to proofreading.
    #[must_use]
    pub fn essay_default() -> Self {
        Self {
            name: "Default".to_string(),
            stages: vec![
                StageDefinition::timed("brainstorming", "Brainstorming", 10),
                StageDefinition::timed("outlining", "Outlining", 15),
                StageDefinition::timed("writing-intro", "Writing Introduction", 10),
                StageDefinition::timed("writing-body", "Writing Body Paragraphs", 45),
                StageDefinition::timed("writing-conclusion", "Writing Conclusion", 10),
                StageDefinition::timed("proofreading", "Proofreading", 15),
                StageDefinition::extra("extra", "Extra Time"),
            ],
        }
    }

    /// Four 30-minute pomodoros with short breaks and a long break.
    #[must_use]
    pub fn pomodoro_30_5() -> Self {
        let mut stages = Vec::with_capacity(9);
        for n in 1..=4 {
            stages.push(StageDefinition::pomodoro(
                format!("pomodoro-{n}"),
                format!("Pomodoro {n}"),
                30,
            ));
            if n < 4 {
                stages.push(StageDefinition::timed(format!("break-{n}"), "Break", 5));
            }
        }
        stages.push(StageDefinition::timed("long-break", "Long Break", 15));
        stages.push(StageDefinition::extra("extra", "Extra Time"));
        Self {
            name: "Pomodoro 30/5".to_string(),
            stages,
        }
    }
}

/// Result of persisting a template from edit mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedTemplate {
    pub key: String,
    /// An existing template (built-ins included) was overwritten.
    pub replaced: bool,
}

/// Stored template catalog, seeded with the built-ins on first use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, Template>,
}

impl TemplateCatalog {
    #[must_use]
    pub fn builtin() -> Self {
        let templates = BTreeMap::from([
            (TEMPLATE_DEFAULT.to_string(), Template::essay_default()),
            (TEMPLATE_POMODORO.to_string(), Template::pomodoro_30_5()),
        ]);
        Self { templates }
    }

    /// Load the stored catalog, writing back the built-ins it lacks.
    ///
    /// An empty catalog receives both built-ins; a non-empty one only gets
    /// the pomodoro template re-added if it went missing. Templates with a
    /// malformed stage list are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn load_or_seed<S: KeyValueStore + ?Sized>(store: &S) -> EngineResult<Self> {
        let mut stored: BTreeMap<String, Template> =
            read_json(store, KEY_TEMPLATES)?.unwrap_or_default();
        stored.retain(|key, template| match check_stored_stages(&template.stages) {
            Ok(()) => true,
            Err(err) => {
                warn!("dropping stored template `{key}`: {err}");
                false
            }
        });
        if stored.is_empty() {
            info!("seeding built-in templates");
            let catalog = Self::builtin();
            write_json(store, KEY_TEMPLATES, &catalog.templates)?;
            return Ok(catalog);
        }
        let mut catalog = Self { templates: stored };
        if !catalog.templates.contains_key(TEMPLATE_POMODORO) {
            catalog
                .templates
                .insert(TEMPLATE_POMODORO.to_string(), Template::pomodoro_30_5());
            write_json(store, KEY_TEMPLATES, &catalog.templates)?;
        }
        Ok(catalog)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Template> {
        self.templates.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// `(key, display name)` pairs for a template picker.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        self.templates
            .iter()
            .map(|(key, template)| (key.clone(), template.name.clone()))
            .collect()
    }

    /// Store a stage list under the slug of `name`. Same key overwrites.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn save<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &S,
        name: &str,
        stages: &[StageDefinition],
    ) -> EngineResult<SavedTemplate> {
        let key = slugify(name);
        let template = Template {
            name: name.trim().to_string(),
            stages: stages.to_vec(),
        };
        let replaced = self.templates.insert(key.clone(), template).is_some();
        write_json(store, KEY_TEMPLATES, &self.templates)?;
        info!("saved template `{key}` (replaced: {replaced})");
        Ok(SavedTemplate { key, replaced })
    }
}

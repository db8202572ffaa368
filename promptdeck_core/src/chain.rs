use crate::catalog::Catalog;
use crate::store::{KeyValueStore, ACTIVE_CHAIN_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDefinition {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub steps: &'static [&'static str],
}

const BUILTIN_CHAINS: &[ChainDefinition] = &[
    ChainDefinition {
        key: "course-prep",
        name: "Prepare a New Class",
        description: "Plan the session, build pre-class material, add activities, then check understanding.",
        steps: &[
            "Design Class Plan",
            "Generate Pre-Class Resources",
            "Generate Engaging In-Class Activities",
            "Create Diagnostic Quiz",
        ],
    },
    ChainDefinition {
        key: "assessment-cycle",
        name: "Assessment Cycle",
        description: "Write questions, study the answers, and grade against a rubric.",
        steps: &[
            "Design Assessment Questions",
            "Analyze Student Answers",
            "Grade Student Work with Rubrics",
        ],
    },
    ChainDefinition {
        key: "refresh-class",
        name: "Refresh an Existing Class",
        description: "Tighten the slides, sharpen explanations, and make the session more active.",
        steps: &[
            "Improve Class Slides",
            "Generate Explanations, Examples, and Analogies",
            "Generate Engaging In-Class Activities",
        ],
    },
    ChainDefinition {
        key: "student-self-study",
        name: "Student Self-Study",
        description: "Structured learning, argument practice, and a closing reflection.",
        steps: &[
            "Student Learning Template",
            "Philosophical Argument Exploration",
            "Student Reflection Coach",
        ],
    },
];

/// Static registry of guided workflows.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: Vec<ChainDefinition>,
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self {
            chains: BUILTIN_CHAINS.to_vec(),
        }
    }
}

impl ChainRegistry {
    pub fn new(chains: Vec<ChainDefinition>) -> Self {
        Self { chains }
    }

    pub fn chains(&self) -> &[ChainDefinition] {
        &self.chains
    }

    pub fn get(&self, key: &str) -> Option<&ChainDefinition> {
        self.chains.iter().find(|c| c.key == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveChainState {
    pub chain_key: String,
    pub name: String,
    pub steps: Vec<String>,
    pub current_step: usize,
    pub completed_steps: BTreeSet<usize>,
    pub current_prompt_id: Option<u32>,
    pub started_at: DateTime<Utc>,
}

impl ActiveChainState {
    pub fn current_title(&self) -> Option<&str> {
        self.steps.get(self.current_step).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    Current,
    Upcoming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepProgress {
    pub index: usize,
    pub title: String,
    pub status: StepStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainAdvance {
    Next {
        step: usize,
        prompt_id: Option<u32>,
    },
    Completed {
        name: String,
        notice: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("unknown prompt chain: {0}")]
    UnknownChain(String),
    #[error("prompt chain {0} has no steps")]
    EmptyChain(String),
    #[error("no prompt chain is active")]
    NotActive,
}

pub fn completion_notice(name: &str) -> String {
    format!(
        "Congratulations! You've completed the \"{}\" workflow.",
        name
    )
}

/// Drives the single process-wide active chain and keeps it persisted.
pub struct ChainEngine {
    store: Arc<dyn KeyValueStore>,
    registry: ChainRegistry,
    active: Option<ActiveChainState>,
}

impl ChainEngine {
    pub fn load(store: Arc<dyn KeyValueStore>, registry: ChainRegistry) -> Self {
        let active = match store.get(ACTIVE_CHAIN_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<ActiveChainState>(&raw) {
                Ok(state) if state.current_step < state.steps.len() => Some(state),
                Ok(_) => {
                    tracing::warn!("Discarding stored prompt chain past its last step");
                    None
                }
                Err(err) => {
                    tracing::warn!("Ignoring corrupt prompt chain state: {}", err);
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!("Prompt chain state unavailable: {}", err);
                None
            }
        };
        Self {
            store,
            registry,
            active,
        }
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub fn active(&self) -> Option<&ActiveChainState> {
        self.active.as_ref()
    }

    pub fn start(
        &mut self,
        chain_key: &str,
        catalog: &Catalog,
    ) -> Result<&ActiveChainState, ChainError> {
        self.start_at(chain_key, catalog, Utc::now())
    }

    pub fn start_at(
        &mut self,
        chain_key: &str,
        catalog: &Catalog,
        started_at: DateTime<Utc>,
    ) -> Result<&ActiveChainState, ChainError> {
        let def = self
            .registry
            .get(chain_key)
            .ok_or_else(|| ChainError::UnknownChain(chain_key.to_string()))?;
        if def.steps.is_empty() {
            return Err(ChainError::EmptyChain(chain_key.to_string()));
        }

        let steps: Vec<String> = def.steps.iter().map(|s| s.to_string()).collect();
        let current_prompt_id = resolve_step(catalog, &steps[0]);
        let state = ActiveChainState {
            chain_key: def.key.to_string(),
            name: def.name.to_string(),
            steps,
            current_step: 0,
            completed_steps: BTreeSet::new(),
            current_prompt_id,
            started_at,
        };
        tracing::info!("Prompt chain started: {}", state.chain_key);
        self.persist(&state);
        Ok(self.active.insert(state))
    }

    pub fn advance(&mut self, catalog: &Catalog) -> Result<ChainAdvance, ChainError> {
        let Some(state) = self.active.as_mut() else {
            return Err(ChainError::NotActive);
        };

        state.completed_steps.insert(state.current_step);
        state.current_step += 1;

        if state.current_step >= state.steps.len() {
            let name = state.name.clone();
            self.active = None;
            self.erase();
            tracing::info!("Prompt chain completed: {}", name);
            let notice = completion_notice(&name);
            return Ok(ChainAdvance::Completed { name, notice });
        }

        let step = state.current_step;
        state.current_prompt_id = resolve_step(catalog, &state.steps[step]);
        let prompt_id = state.current_prompt_id;
        let snapshot = state.clone();
        self.persist(&snapshot);
        Ok(ChainAdvance::Next { step, prompt_id })
    }

    /// Deletes the active chain once `confirm` agrees. Returns whether a
    /// chain was cancelled.
    pub fn cancel<F>(&mut self, confirm: F) -> bool
    where
        F: FnOnce(&ActiveChainState) -> bool,
    {
        let Some(state) = self.active.as_ref() else {
            return false;
        };
        if !confirm(state) {
            return false;
        }
        tracing::info!("Prompt chain cancelled: {}", state.chain_key);
        self.active = None;
        self.erase();
        true
    }

    pub fn progress(&self) -> Vec<StepProgress> {
        let Some(state) = self.active.as_ref() else {
            return Vec::new();
        };
        state
            .steps
            .iter()
            .enumerate()
            .map(|(index, title)| {
                let status = if state.completed_steps.contains(&index) {
                    StepStatus::Completed
                } else if index == state.current_step {
                    StepStatus::Current
                } else {
                    StepStatus::Upcoming
                };
                StepProgress {
                    index,
                    title: title.clone(),
                    status,
                }
            })
            .collect()
    }

    fn persist(&self, state: &ActiveChainState) {
        let raw = match serde_json::to_string(state) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!("Failed to serialize prompt chain: {}", err);
                return;
            }
        };
        if let Err(err) = self.store.set(ACTIVE_CHAIN_KEY, &raw) {
            tracing::warn!("Failed to persist prompt chain: {}", err);
        }
    }

    fn erase(&self) {
        if let Err(err) = self.store.remove(ACTIVE_CHAIN_KEY) {
            tracing::warn!("Failed to remove prompt chain state: {}", err);
        }
    }
}

fn resolve_step(catalog: &Catalog, title: &str) -> Option<u32> {
    let id = catalog.find_by_title(title).map(|p| p.id);
    if id.is_none() {
        tracing::warn!("Prompt chain step has no catalog entry: {}", title);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn engine() -> (ChainEngine, Arc<dyn KeyValueStore>, Catalog) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let engine = ChainEngine::load(store.clone(), ChainRegistry::default());
        (engine, store, Catalog::builtin().unwrap())
    }

    #[test]
    fn every_builtin_step_resolves_in_catalog() {
        let catalog = Catalog::builtin().unwrap();
        for chain in ChainRegistry::default().chains() {
            for step in chain.steps {
                assert!(
                    catalog.find_by_title(step).is_some(),
                    "{} -> {}",
                    chain.key,
                    step
                );
            }
        }
    }

    #[test]
    fn start_resolves_first_step_and_persists() {
        let (mut engine, store, catalog) = engine();
        let state = engine.start("assessment-cycle", &catalog).unwrap();
        assert_eq!(state.current_step, 0);
        assert!(state.completed_steps.is_empty());
        assert_eq!(state.current_prompt_id, Some(4));

        let raw = store.get(ACTIVE_CHAIN_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["chainKey"], "assessment-cycle");
        assert_eq!(value["currentStep"], 0);
    }

    #[test]
    fn n_advances_walk_the_chain_to_completion() {
        let (mut engine, store, catalog) = engine();
        engine.start("course-prep", &catalog).unwrap();
        let n = engine.active().unwrap().steps.len();

        for i in 1..n {
            let before = engine.active().unwrap().current_step;
            match engine.advance(&catalog).unwrap() {
                ChainAdvance::Next { step, prompt_id } => {
                    assert_eq!(step, before + 1);
                    assert_eq!(step, i);
                    assert!(prompt_id.is_some());
                }
                other => panic!("unexpected {:?}", other),
            }
            let state = engine.active().unwrap();
            assert!(state.completed_steps.contains(&before));
            assert_eq!(state.completed_steps.len(), i);
        }

        match engine.advance(&catalog).unwrap() {
            ChainAdvance::Completed { name, notice } => {
                assert_eq!(name, "Prepare a New Class");
                assert!(notice.contains("Prepare a New Class"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(engine.active().is_none());
        assert_eq!(store.get(ACTIVE_CHAIN_KEY).unwrap(), None);
        assert_eq!(engine.advance(&catalog), Err(ChainError::NotActive));
    }

    #[test]
    fn progress_marks_completed_current_upcoming() {
        let (mut engine, _store, catalog) = engine();
        engine.start("refresh-class", &catalog).unwrap();
        engine.advance(&catalog).unwrap();

        let statuses: Vec<StepStatus> = engine.progress().iter().map(|p| p.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Completed,
                StepStatus::Current,
                StepStatus::Upcoming
            ]
        );
    }

    #[test]
    fn cancel_requires_confirmation() {
        let (mut engine, store, catalog) = engine();
        engine.start("student-self-study", &catalog).unwrap();

        assert!(!engine.cancel(|_| false));
        assert!(engine.active().is_some());
        assert!(store.get(ACTIVE_CHAIN_KEY).unwrap().is_some());

        assert!(engine.cancel(|state| state.chain_key == "student-self-study"));
        assert!(engine.active().is_none());
        assert_eq!(store.get(ACTIVE_CHAIN_KEY).unwrap(), None);
        assert!(!engine.cancel(|_| true));
    }

    #[test]
    fn unknown_chain_is_rejected() {
        let (mut engine, _store, catalog) = engine();
        assert_eq!(
            engine.start("nope", &catalog).unwrap_err(),
            ChainError::UnknownChain("nope".to_string())
        );
    }

    #[test]
    fn active_chain_survives_reload() {
        let (mut engine, store, catalog) = engine();
        engine.start("course-prep", &catalog).unwrap();
        engine.advance(&catalog).unwrap();

        let reloaded = ChainEngine::load(store, ChainRegistry::default());
        let state = reloaded.active().unwrap();
        assert_eq!(state.current_step, 1);
        assert_eq!(state.current_title(), Some("Generate Pre-Class Resources"));
        assert_eq!(state.current_prompt_id, Some(9));
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Blocklist state shared between the gatekeeper and whatever renders it.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::broadcast;

use super::extension::{BlockedExtension, Blocklist};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagPhase {
    Present,
    PendingDelete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomTag {
    pub value: String,
    pub phase: TagPhase,
}

/// Emitted to subscribers after every mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    FixedToggled { ext: String, checked: bool },
    CreatePending(String),
    CreateSettled(String),
    CustomAdded(String),
    DeletePending(String),
    DeleteSettled(String),
    CustomRemoved(String),
    InputChanged(String),
    Replaced,
}

pub struct BlocklistState {
    fixed: BTreeMap<String, bool>,
    custom: Vec<CustomTag>,
    pending_create: BTreeSet<String>,
    input: String,
    changes: broadcast::Sender<StateChange>,
}

impl Default for BlocklistState {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            fixed: BTreeMap::new(),
            custom: Vec::new(),
            pending_create: BTreeSet::new(),
            input: String::new(),
            changes,
        }
    }
}

impl BlocklistState {
    pub fn new(fixed: BTreeMap<String, bool>, custom: Vec<String>) -> Self {
        let mut state = Self::default();
        state.load(fixed, custom);
        state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    fn emit(&self, change: StateChange) {
        // no receivers is fine
        let _ = self.changes.send(change);
    }

    /// Replaces everything with server-provided contents.
    pub fn replace(&mut self, fixed: BTreeMap<String, bool>, custom: Vec<String>) {
        self.load(fixed, custom);
        self.emit(StateChange::Replaced);
    }

    fn load(&mut self, fixed: BTreeMap<String, bool>, custom: Vec<String>) {
        self.fixed = fixed
            .into_iter()
            .map(|(ext, checked)| (ext.to_lowercase(), checked))
            .collect();
        self.custom.clear();
        for value in custom {
            let value = value.to_lowercase();
            if !self.is_rendered(&value) {
                self.custom.push(CustomTag {
                    value,
                    phase: TagPhase::Present,
                });
            }
        }
        self.pending_create.clear();
    }

    /// Checked fixed extensions plus every rendered custom tag.
    pub fn blocklist(&self) -> Blocklist {
        self.fixed
            .iter()
            .filter(|(_, checked)| **checked)
            .map(|(ext, _)| ext.as_str())
            .chain(self.custom.iter().map(|tag| tag.value.as_str()))
            .collect()
    }

    /// Same entries as [`Self::blocklist`], fixed first, each with its origin.
    pub fn blocked_extensions(&self) -> Vec<BlockedExtension> {
        self.fixed
            .iter()
            .filter(|(_, checked)| **checked)
            .map(|(ext, _)| BlockedExtension::fixed(ext.clone()))
            .chain(
                self.custom
                    .iter()
                    .map(|tag| BlockedExtension::custom(tag.value.clone())),
            )
            .collect()
    }

    pub fn fixed(&self) -> &BTreeMap<String, bool> {
        &self.fixed
    }

    pub fn custom(&self) -> &[CustomTag] {
        &self.custom
    }

    pub fn custom_values(&self) -> Vec<String> {
        self.custom.iter().map(|tag| tag.value.clone()).collect()
    }

    pub fn is_rendered(&self, value: &str) -> bool {
        self.custom.iter().any(|tag| tag.value == value)
    }

    pub fn is_pending_create(&self, value: &str) -> bool {
        self.pending_create.contains(value)
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
        self.emit(StateChange::InputChanged(self.input.clone()));
    }

    pub fn clear_input(&mut self) {
        self.set_input(String::new());
    }

    /// Returns false when `ext` is not one of the known fixed extensions.
    pub fn set_fixed(&mut self, ext: &str, checked: bool) -> bool {
        match self.fixed.get_mut(ext) {
            Some(flag) => {
                *flag = checked;
                self.emit(StateChange::FixedToggled {
                    ext: ext.to_string(),
                    checked,
                });
                true
            }
            None => false,
        }
    }

    pub fn begin_create(&mut self, value: &str) {
        self.pending_create.insert(value.to_string());
        self.emit(StateChange::CreatePending(value.to_string()));
    }

    /// Clears the pending marker; appends the tag when `confirmed` and not already rendered.
    pub fn finish_create(&mut self, value: &str, confirmed: bool) -> bool {
        self.pending_create.remove(value);
        self.emit(StateChange::CreateSettled(value.to_string()));
        if !confirmed || self.is_rendered(value) {
            return false;
        }
        self.custom.push(CustomTag {
            value: value.to_string(),
            phase: TagPhase::Present,
        });
        self.emit(StateChange::CustomAdded(value.to_string()));
        true
    }

    pub fn begin_delete(&mut self, value: &str) {
        if let Some(tag) = self.custom.iter_mut().find(|tag| tag.value == value) {
            tag.phase = TagPhase::PendingDelete;
            self.emit(StateChange::DeletePending(value.to_string()));
        }
    }

    /// Drops the tag when `confirmed`, otherwise puts it back to `Present`.
    pub fn finish_delete(&mut self, value: &str, confirmed: bool) -> bool {
        let Some(pos) = self.custom.iter().position(|tag| tag.value == value) else {
            return false;
        };
        if confirmed {
            self.custom.remove(pos);
            self.emit(StateChange::CustomRemoved(value.to_string()));
            true
        } else {
            if let Some(tag) = self.custom.get_mut(pos) {
                tag.phase = TagPhase::Present;
            }
            self.emit(StateChange::DeleteSettled(value.to_string()));
            false
        }
    }
}

//! Import progress of one source collection.
//!
//! The record only ever holds what the destination ledger has confirmed.
//! Every persisted change rewrites the whole file atomically, so a crash
//! between two remote calls leaves the last checkpoint intact.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::MigrationError,
    files::{read_json, state_file, write_json_atomic},
    types::{CollectionId, TokenId},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportState {
    /// Destination collection id.
    pub collection_id: Option<CollectionId>,
    pub created: bool,
    pub burned: bool,
    pub ownership_changed: bool,
    pub properties_set: bool,
    pub token_property_permissions_set: bool,
    pub limits_set: bool,
    pub sponsorship_set: bool,
    /// Destination token ids minted so far, placeholders included.
    pub created_tokens: Vec<TokenId>,
}

impl ImportState {
    /// Highest destination token id recorded.
    pub fn last_created_token(&self) -> Option<TokenId> {
        self.created_tokens.iter().copied().max()
    }

    /// Returns what `self` drops relative to `previous`, if anything.
    pub fn regression_from(&self, previous: &ImportState) -> Option<String> {
        let flags = [
            ("created", previous.created, self.created),
            ("burned", previous.burned, self.burned),
            (
                "ownership_changed",
                previous.ownership_changed,
                self.ownership_changed,
            ),
            ("properties_set", previous.properties_set, self.properties_set),
            (
                "token_property_permissions_set",
                previous.token_property_permissions_set,
                self.token_property_permissions_set,
            ),
            ("limits_set", previous.limits_set, self.limits_set),
            ("sponsorship_set", previous.sponsorship_set, self.sponsorship_set),
        ];
        if let Some((name, _, _)) = flags.iter().find(|(_, before, after)| *before && !*after) {
            return Some(format!("flag `{name}`"));
        }

        if previous.collection_id.is_some() && self.collection_id != previous.collection_id {
            return Some(format!(
                "destination collection {:?}",
                previous.collection_id
            ));
        }

        if !self.created_tokens.starts_with(&previous.created_tokens) {
            return Some("recorded token ids".to_owned());
        }
        None
    }
}

/// Owns the state file of one source collection.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    source_id: CollectionId,
    state: ImportState,
}

impl StateStore {
    /// Reads the state of `source_id` from `dir`, or starts a fresh one.
    pub fn load(dir: &Path, source_id: CollectionId) -> Result<Self, MigrationError> {
        let path = state_file(dir, source_id);
        let state = read_json(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            source_id,
            state,
        })
    }

    pub fn state(&self) -> &ImportState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `mutate` to a copy of the state and keeps it if it does not
    /// drop anything already recorded. With `persist` the file is rewritten.
    pub fn update(
        &mut self,
        mutate: impl FnOnce(&mut ImportState),
        persist: bool,
    ) -> Result<&ImportState, MigrationError> {
        let mut next = self.state.clone();
        mutate(&mut next);
        if let Some(what) = next.regression_from(&self.state) {
            return Err(MigrationError::StateRegression {
                collection: self.source_id,
                what,
            });
        }
        self.state = next;
        if persist {
            self.save()?;
        }
        Ok(&self.state)
    }

    pub fn save(&self) -> Result<(), MigrationError> {
        write_json_atomic(&self.path, &self.state)
    }

    /// Forgets all progress and persists the empty record.
    pub fn reset(&mut self) -> Result<(), MigrationError> {
        self.state = ImportState::default();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_fresh_state() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let store = StateStore::load(dir.path(), 3).unwrap();
        assert_eq!(store.state(), &ImportState::default());
        assert!(!store.path().exists());
    }

    #[test]
    fn persisted_updates_survive_reload() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let mut store = StateStore::load(dir.path(), 3).unwrap();
        store
            .update(
                |state| {
                    state.collection_id = Some(11);
                    state.created = true;
                    state.created_tokens.extend([1, 2]);
                },
                true,
            )
            .unwrap();

        let reloaded = StateStore::load(dir.path(), 3).unwrap();
        assert_eq!(reloaded.state().collection_id, Some(11));
        assert_eq!(reloaded.state().created_tokens, vec![1, 2]);
        assert_eq!(reloaded.state().last_created_token(), Some(2));
    }

    #[test]
    fn unpersisted_update_stays_in_memory() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let mut store = StateStore::load(dir.path(), 3).unwrap();
        store.update(|state| state.created = true, false).unwrap();

        assert!(store.state().created);
        assert!(!StateStore::load(dir.path(), 3).unwrap().state().created);
    }

    #[test]
    fn regressions_are_rejected() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let mut store = StateStore::load(dir.path(), 3).unwrap();
        store
            .update(
                |state| {
                    state.collection_id = Some(4);
                    state.created = true;
                    state.created_tokens = vec![1, 2, 3];
                },
                true,
            )
            .unwrap();

        let flag = store.update(|state| state.created = false, true);
        assert!(matches!(flag, Err(MigrationError::StateRegression { collection: 3, .. })));

        let tokens = store.update(|state| state.created_tokens = vec![1, 3], true);
        assert!(matches!(tokens, Err(MigrationError::StateRegression { .. })));

        let destination = store.update(|state| state.collection_id = Some(5), true);
        assert!(matches!(destination, Err(MigrationError::StateRegression { .. })));

        assert_eq!(store.state().created_tokens, vec![1, 2, 3]);
    }

    #[test]
    fn reset_clears_the_file() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let mut store = StateStore::load(dir.path(), 3).unwrap();
        store
            .update(
                |state| {
                    state.collection_id = Some(4);
                    state.burned = true;
                },
                true,
            )
            .unwrap();

        store.reset().unwrap();
        assert_eq!(
            StateStore::load(dir.path(), 3).unwrap().state(),
            &ImportState::default()
        );
    }
}

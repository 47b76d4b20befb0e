use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use serde::Serialize;

use crate::{
    error::MigrationError,
    files::tokens_file,
    ledger::{Ledger, Signer},
    logger::Logger,
    snapshot::read_snapshot,
    state::StateStore,
    token_log::read_token_log,
    types::{CollectionId, CollectionSnapshot, CrossAccount, TokenData, TokenId, TokenRecord},
};

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Directory holding the exported snapshot and token log.
    pub input_dir: PathBuf,
    /// Directory holding the import state files.
    pub output_dir: PathBuf,
    pub batch_size: usize,
    /// Forget recorded progress before replaying.
    pub refresh: bool,
}

impl ImportOptions {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            refresh: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenPhaseSummary {
    /// Exported tokens minted during this run.
    pub minted: usize,
    /// Holes consumed with a minted-then-burned placeholder.
    pub placeholders: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub source_id: CollectionId,
    pub destination_id: Option<CollectionId>,
    pub minted: usize,
    pub placeholders: usize,
    pub ownership_changed: bool,
    pub burned: bool,
}

/// Replays exported collections into a destination ledger.
///
/// Every remote write is followed by a persisted state update, so an
/// interrupted import resumes from the last confirmed operation.
#[derive(Debug, Clone)]
pub struct Importer {
    ledger: Arc<dyn Ledger>,
    signer: Signer,
    logger: Logger,
    options: ImportOptions,
}

impl Importer {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        signer: Signer,
        logger: Logger,
        options: ImportOptions,
    ) -> Self {
        Self {
            ledger,
            signer,
            logger,
            options,
        }
    }

    pub fn load_state(&self, source_id: CollectionId) -> Result<StateStore, MigrationError> {
        StateStore::load(&self.options.output_dir, source_id)
    }

    /// Reads the exported files of `source_id` and runs the collection,
    /// token and ownership phases. Returns `None` when an input file is
    /// missing.
    pub async fn import_collection(
        &self,
        source_id: CollectionId,
    ) -> Result<Option<ImportSummary>, MigrationError> {
        let input_dir = &self.options.input_dir;
        let Some(snapshot) = read_snapshot(input_dir, source_id)? else {
            self.logger.warn(format_args!(
                "Collection {source_id}: no exported snapshot in {}, skipping",
                input_dir.display()
            ));
            return Ok(None);
        };
        let tokens_path = tokens_file(input_dir, source_id);
        let Some(log) = read_token_log(&tokens_path)? else {
            self.logger.warn(format_args!(
                "Collection {source_id}: no exported token log in {}, skipping",
                input_dir.display()
            ));
            return Ok(None);
        };
        // Ids past the end of an unfinished log would be replayed as holes.
        if log.complete != Some(snapshot.tokens_count) {
            return Err(MigrationError::IncompleteExport {
                collection: source_id,
                path: tokens_path,
            });
        }

        if self.options.refresh {
            self.logger.info(format_args!(
                "Collection {source_id}: discarding recorded import progress"
            ));
            self.load_state(source_id)?.reset()?;
        }

        let destination_id = self.create_collection(&snapshot).await?;
        let tokens_phase = self.create_tokens(&snapshot, &log.tokens).await?;
        let ownership_changed = self.change_ownership(&snapshot).await?;
        let state = self.load_state(source_id)?;

        Ok(Some(ImportSummary {
            source_id,
            destination_id,
            minted: tokens_phase.minted,
            placeholders: tokens_phase.placeholders,
            ownership_changed,
            burned: state.state().burned,
        }))
    }

    /// Creates the destination collection unless it already exists and
    /// mirrors a confirmed sponsor. Returns the destination id.
    pub async fn create_collection(
        &self,
        snapshot: &CollectionSnapshot,
    ) -> Result<Option<CollectionId>, MigrationError> {
        let source_id = snapshot.id;
        let mut store = self.load_state(source_id)?;

        if store.state().burned {
            self.logger.info(format_args!(
                "Collection {source_id}: destination collection already burned"
            ));
            return Ok(store.state().collection_id);
        }

        if let Some(destination_id) = store.state().collection_id
            && self
                .ledger
                .get_collection(destination_id, None)
                .await?
                .is_none()
        {
            self.logger.warn(format_args!(
                "Collection {source_id}: recorded destination {destination_id} does not exist, starting over"
            ));
            store.reset()?;
        }

        if !store.state().created {
            let options = snapshot.to_creation_options();
            let sponsor_supplied = options.pending_sponsor.is_some();
            let destination_id = self
                .ledger
                .create_collection(&self.signer, &options)
                .await?;
            store.update(
                |state| {
                    state.collection_id = Some(destination_id);
                    state.created = true;
                    state.properties_set = true;
                    state.token_property_permissions_set = true;
                    state.limits_set = true;
                    state.sponsorship_set |= sponsor_supplied;
                },
                true,
            )?;
            self.logger.info(format_args!(
                "Collection {source_id}: created destination collection {destination_id}"
            ));
        }

        let destination_id = store.state().collection_id;
        if let Some(destination_id) = destination_id
            && !store.state().sponsorship_set
            && let Some(sponsor) = snapshot.raw.sponsorship.confirmed_sponsor()
        {
            if self
                .ledger
                .set_sponsor(&self.signer, destination_id, sponsor)
                .await?
            {
                store.update(|state| state.sponsorship_set = true, true)?;
                self.logger.info(format_args!(
                    "Collection {source_id}: sponsor {sponsor} proposed on destination {destination_id}"
                ));
            } else {
                self.logger.warn(format_args!(
                    "Collection {source_id}: destination refused sponsor {sponsor}"
                ));
            }
        }

        Ok(destination_id)
    }

    /// Mints the exported tokens that are not recorded yet, consuming
    /// burned ids with placeholders so destination ids match source ids.
    pub async fn create_tokens(
        &self,
        snapshot: &CollectionSnapshot,
        tokens: &BTreeMap<TokenId, TokenRecord>,
    ) -> Result<TokenPhaseSummary, MigrationError> {
        let source_id = snapshot.id;
        let mut store = self.load_state(source_id)?;
        let mut summary = TokenPhaseSummary::default();

        let Some(destination_id) = store.state().collection_id.filter(|_| store.state().created)
        else {
            self.logger.info(format_args!(
                "Collection {source_id}: no destination collection yet, skipping tokens"
            ));
            return Ok(summary);
        };
        if store.state().burned {
            self.logger.info(format_args!(
                "Collection {source_id}: destination collection burned, skipping tokens"
            ));
            return Ok(summary);
        }

        let start = store
            .state()
            .last_created_token()
            .map_or(1, |last| last.saturating_add(1));
        if start > snapshot.tokens_count {
            self.logger.debug(format_args!(
                "Collection {source_id}: all {} token id(s) already replayed",
                snapshot.tokens_count
            ));
            return Ok(summary);
        }
        self.logger.info(format_args!(
            "Collection {source_id}: replaying token ids {start}..={} into {destination_id}",
            snapshot.tokens_count
        ));

        let batch_size = self.options.batch_size.max(1);
        let mut queue: Vec<&TokenRecord> = Vec::with_capacity(batch_size);
        for token_id in start..=snapshot.tokens_count {
            match tokens.get(&token_id) {
                Some(record) => {
                    queue.push(record);
                    if queue.len() >= batch_size {
                        summary.minted += self
                            .flush(source_id, destination_id, &mut queue, &mut store)
                            .await?;
                    }
                }
                None => {
                    summary.minted += self
                        .flush(source_id, destination_id, &mut queue, &mut store)
                        .await?;
                    self.fill_hole(source_id, destination_id, token_id, &mut store)
                        .await?;
                    summary.placeholders += 1;
                }
            }
        }
        summary.minted += self
            .flush(source_id, destination_id, &mut queue, &mut store)
            .await?;

        self.logger.info(format_args!(
            "Collection {source_id}: minted {} token(s) and {} placeholder(s)",
            summary.minted, summary.placeholders
        ));
        Ok(summary)
    }

    /// Adds the exported admins and hands the collection to its source
    /// owner. Returns whether ownership has been transferred.
    pub async fn change_ownership(
        &self,
        snapshot: &CollectionSnapshot,
    ) -> Result<bool, MigrationError> {
        let source_id = snapshot.id;
        let mut store = self.load_state(source_id)?;
        if store.state().ownership_changed {
            return Ok(true);
        }
        let Some(destination_id) = store.state().collection_id.filter(|_| store.state().created)
        else {
            self.logger.info(format_args!(
                "Collection {source_id}: no destination collection yet, skipping ownership"
            ));
            return Ok(false);
        };
        if store.state().burned {
            return Ok(false);
        }

        for admin in &snapshot.admins {
            if !self
                .ledger
                .add_admin(&self.signer, destination_id, admin)
                .await?
            {
                self.logger.warn(format_args!(
                    "Collection {source_id}: destination refused admin {}",
                    admin.normalized()
                ));
            }
        }

        let owner = snapshot.owner();
        if !self
            .ledger
            .change_owner(&self.signer, destination_id, &owner)
            .await?
        {
            self.logger.warn(format_args!(
                "Collection {source_id}: destination refused owner {owner}"
            ));
            return Ok(false);
        }
        store.update(|state| state.ownership_changed = true, true)?;
        self.logger.info(format_args!(
            "Collection {source_id}: ownership of {destination_id} moved to {owner}"
        ));
        Ok(true)
    }

    /// Destroys the destination collection of `source_id`. Returns whether
    /// the collection is burned afterwards.
    pub async fn burn_collection(&self, source_id: CollectionId) -> Result<bool, MigrationError> {
        let mut store = self.load_state(source_id)?;
        if store.state().burned {
            return Ok(true);
        }
        let Some(destination_id) = store.state().collection_id.filter(|_| store.state().created)
        else {
            self.logger.warn(format_args!(
                "Collection {source_id}: nothing was imported, nothing to burn"
            ));
            return Ok(false);
        };

        if !self
            .ledger
            .burn_collection(&self.signer, destination_id)
            .await?
        {
            self.logger.warn(format_args!(
                "Collection {source_id}: destination refused to burn {destination_id}"
            ));
            return Ok(false);
        }
        store.update(|state| state.burned = true, true)?;
        self.logger.info(format_args!(
            "Collection {source_id}: destination collection {destination_id} burned"
        ));
        Ok(true)
    }

    async fn flush(
        &self,
        source_id: CollectionId,
        destination_id: CollectionId,
        queue: &mut Vec<&TokenRecord>,
        store: &mut StateStore,
    ) -> Result<usize, MigrationError> {
        let Some(first) = queue.first() else {
            return Ok(0);
        };
        self.ensure_next_id(source_id, destination_id, first.token_id)
            .await?;

        let requested: Vec<TokenId> = queue.iter().map(|record| record.token_id).collect();
        let batch: Vec<TokenData> = queue.iter().map(|record| record.to_token_data()).collect();
        queue.clear();

        let receipt = self
            .ledger
            .create_tokens(&self.signer, destination_id, &batch)
            .await?;
        store.update(
            |state| state.created_tokens.extend(&receipt.created_ids),
            true,
        )?;

        if !receipt.success || receipt.created_ids != requested {
            return Err(MigrationError::Verification {
                collection: source_id,
                requested,
                created: receipt.created_ids,
            });
        }
        self.logger.debug(format_args!(
            "Collection {source_id}: minted tokens #{}..=#{}",
            requested[0],
            requested[requested.len() - 1]
        ));
        Ok(requested.len())
    }

    /// Consumes `token_id` on the destination with a token that is burned
    /// right after minting.
    async fn fill_hole(
        &self,
        source_id: CollectionId,
        destination_id: CollectionId,
        token_id: TokenId,
        store: &mut StateStore,
    ) -> Result<(), MigrationError> {
        let owner = self.ledger.signer_account(&self.signer).await?;

        // A previous run may have died between minting the placeholder and
        // recording it.
        if self.ledger.last_token_id(destination_id, None).await? == token_id {
            match self.ledger.get_token(destination_id, token_id, None).await? {
                None => {
                    self.logger.warn(format_args!(
                        "Collection {source_id}: id #{token_id} already consumed on the destination"
                    ));
                    store.update(|state| state.created_tokens.push(token_id), true)?;
                    return Ok(());
                }
                Some(leftover) if is_placeholder(&leftover, &owner) => {
                    self.logger.warn(format_args!(
                        "Collection {source_id}: found unburned placeholder #{token_id}"
                    ));
                    return self
                        .burn_placeholder(source_id, destination_id, token_id, store)
                        .await;
                }
                Some(_) => {}
            }
        }

        self.ensure_next_id(source_id, destination_id, token_id)
            .await?;
        let placeholder = TokenData {
            owner,
            const_data: Vec::new(),
            variable_data: Vec::new(),
        };
        let receipt = self
            .ledger
            .create_token(&self.signer, destination_id, &placeholder)
            .await?;
        if !receipt.success || receipt.created_ids != [token_id] {
            return Err(MigrationError::Verification {
                collection: source_id,
                requested: vec![token_id],
                created: receipt.created_ids,
            });
        }
        self.burn_placeholder(source_id, destination_id, token_id, store)
            .await
    }

    async fn burn_placeholder(
        &self,
        source_id: CollectionId,
        destination_id: CollectionId,
        token_id: TokenId,
        store: &mut StateStore,
    ) -> Result<(), MigrationError> {
        if !self
            .ledger
            .burn_token(&self.signer, destination_id, token_id)
            .await?
        {
            return Err(MigrationError::PlaceholderNotBurned {
                collection: source_id,
                token: token_id,
            });
        }
        store.update(|state| state.created_tokens.push(token_id), true)?;
        self.logger.debug(format_args!(
            "Collection {source_id}: consumed burned id #{token_id}"
        ));
        Ok(())
    }

    async fn ensure_next_id(
        &self,
        source_id: CollectionId,
        destination_id: CollectionId,
        expected: TokenId,
    ) -> Result<(), MigrationError> {
        let actual = self
            .ledger
            .last_token_id(destination_id, None)
            .await?
            .saturating_add(1);
        if actual != expected {
            return Err(MigrationError::Divergence {
                collection: source_id,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

fn is_placeholder(token: &TokenData, signer: &CrossAccount) -> bool {
    token.owner == *signer && token.const_data.is_empty() && token.variable_data.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::InMemoryLedger,
        types::{CollectionMode, RawCollection, Sponsorship},
    };

    fn snapshot(tokens_count: TokenId, sponsorship: Sponsorship) -> CollectionSnapshot {
        CollectionSnapshot {
            id: 7,
            name: "Seven".to_owned(),
            description: String::new(),
            token_prefix: "SVN".to_owned(),
            raw: RawCollection {
                owner: "5SourceOwner".to_owned(),
                mode: CollectionMode::Nft,
                limits: Default::default(),
                permissions: Default::default(),
                sponsorship,
                properties: Vec::new(),
                token_property_permissions: Vec::new(),
            },
            admins: vec![CrossAccount::Substrate("5Admin".to_owned())],
            tokens_count,
        }
    }

    fn records(ids: &[TokenId]) -> BTreeMap<TokenId, TokenRecord> {
        ids.iter()
            .map(|id| {
                let record = TokenRecord::new(
                    *id,
                    TokenData {
                        owner: CrossAccount::Substrate(format!("5Holder{id}")),
                        const_data: vec![*id as u8],
                        variable_data: Vec::new(),
                    },
                    None,
                );
                (*id, record)
            })
            .collect()
    }

    fn importer(ledger: &InMemoryLedger, dir: &std::path::Path) -> Importer {
        Importer::new(
            Arc::new(ledger.clone()),
            Signer::new("//Alice"),
            Logger::silent(),
            ImportOptions::new(dir, dir),
        )
    }

    #[tokio::test]
    async fn creation_is_recorded_once() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let ledger = InMemoryLedger::new();
        let importer = importer(&ledger, dir.path());
        let snapshot = snapshot(0, Sponsorship::Disabled);

        let first = importer.create_collection(&snapshot).await.unwrap();
        let second = importer.create_collection(&snapshot).await.unwrap();

        assert_eq!(first, Some(1));
        assert_eq!(second, Some(1));
        let state = importer.load_state(7).unwrap();
        assert!(state.state().created && state.state().limits_set);
        assert!(!state.state().sponsorship_set);
    }

    #[tokio::test]
    async fn confirmed_sponsor_is_proposed_at_creation() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let ledger = InMemoryLedger::new();
        let importer = importer(&ledger, dir.path());
        let snapshot = snapshot(0, Sponsorship::Confirmed("5Sponsor".to_owned()));

        let destination = importer.create_collection(&snapshot).await.unwrap().unwrap();

        let info = ledger.get_collection(destination, None).await.unwrap().unwrap();
        assert_eq!(info.raw.sponsorship, Sponsorship::Pending("5Sponsor".to_owned()));
        assert!(importer.load_state(7).unwrap().state().sponsorship_set);
    }

    #[tokio::test]
    async fn holes_are_consumed_by_placeholders() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let ledger = InMemoryLedger::new();
        let importer = importer(&ledger, dir.path());
        let snapshot = snapshot(4, Sponsorship::Disabled);
        let destination = importer.create_collection(&snapshot).await.unwrap().unwrap();

        let summary = importer
            .create_tokens(&snapshot, &records(&[1, 3, 4]))
            .await
            .unwrap();

        assert_eq!(summary, TokenPhaseSummary { minted: 3, placeholders: 1 });
        assert_eq!(
            importer.load_state(7).unwrap().state().created_tokens,
            vec![1, 2, 3, 4]
        );
        let live: Vec<TokenId> = ledger
            .tokens(destination)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(live, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn small_batches_keep_ids_aligned() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let ledger = InMemoryLedger::new();
        let mut options = ImportOptions::new(dir.path(), dir.path());
        options.batch_size = 2;
        let importer = Importer::new(
            Arc::new(ledger.clone()),
            Signer::new("//Alice"),
            Logger::silent(),
            options,
        );
        let snapshot = snapshot(5, Sponsorship::Disabled);
        importer.create_collection(&snapshot).await.unwrap();

        let summary = importer
            .create_tokens(&snapshot, &records(&[1, 2, 3, 4, 5]))
            .await
            .unwrap();

        assert_eq!(summary.minted, 5);
        assert_eq!(
            importer.load_state(7).unwrap().state().created_tokens,
            vec![1, 2, 3, 4, 5]
        );
    }

    #[tokio::test]
    async fn tokens_wait_for_a_destination() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let ledger = InMemoryLedger::new();
        let importer = importer(&ledger, dir.path());

        let summary = importer
            .create_tokens(&snapshot(2, Sponsorship::Disabled), &records(&[1, 2]))
            .await
            .unwrap();
        assert_eq!(summary, TokenPhaseSummary::default());
        assert!(!importer
            .change_ownership(&snapshot(2, Sponsorship::Disabled))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn ownership_moves_to_the_source_owner() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let ledger = InMemoryLedger::new();
        let importer = importer(&ledger, dir.path());
        let snapshot = snapshot(0, Sponsorship::Disabled);
        let destination = importer.create_collection(&snapshot).await.unwrap().unwrap();

        assert!(importer.change_ownership(&snapshot).await.unwrap());

        let info = ledger.get_collection(destination, None).await.unwrap().unwrap();
        assert_eq!(info.raw.owner, "5SourceOwner");
        assert_eq!(
            ledger.admins(destination).unwrap(),
            vec![CrossAccount::Substrate("5Admin".to_owned())]
        );
        assert!(importer.load_state(7).unwrap().state().ownership_changed);
    }

    #[tokio::test]
    async fn burned_collection_is_terminal() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let ledger = InMemoryLedger::new();
        let importer = importer(&ledger, dir.path());
        let snapshot = snapshot(0, Sponsorship::Disabled);
        let destination = importer.create_collection(&snapshot).await.unwrap();

        assert!(importer.burn_collection(7).await.unwrap());
        assert!(importer.burn_collection(7).await.unwrap());
        assert_eq!(importer.create_collection(&snapshot).await.unwrap(), destination);
        assert!(ledger.get_collection(1, None).await.unwrap().is_none());
        assert!(ledger.get_collection(2, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refused_placeholder_burn_is_retried_on_the_next_run() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let ledger = InMemoryLedger::new();
        let importer = importer(&ledger, dir.path());
        let snapshot = snapshot(3, Sponsorship::Disabled);
        let destination = importer.create_collection(&snapshot).await.unwrap().unwrap();
        let tokens = records(&[1, 3]);

        ledger.refuse_next(crate::ledger::memory::Operation::BurnToken).unwrap();
        let err = importer.create_tokens(&snapshot, &tokens).await.unwrap_err();
        assert!(
            matches!(
                err,
                MigrationError::PlaceholderNotBurned {
                    collection: 7,
                    token: 2
                }
            ),
            "{err}"
        );
        assert_eq!(importer.load_state(7).unwrap().state().created_tokens, vec![1]);
        assert!(ledger.get_token(destination, 2, None).await.unwrap().is_some());

        let summary = importer.create_tokens(&snapshot, &tokens).await.unwrap();
        assert_eq!(summary, TokenPhaseSummary { minted: 1, placeholders: 1 });
        assert_eq!(
            importer.load_state(7).unwrap().state().created_tokens,
            vec![1, 2, 3]
        );
        let live: Vec<TokenId> = ledger
            .tokens(destination)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(live, vec![1, 3]);
    }
}

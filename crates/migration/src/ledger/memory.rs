use std::{
    collections::{BTreeMap, HashSet},
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    error::LedgerError,
    ledger::{Ledger, Signer},
    types::{
        BlockNumber, CollectionId, CollectionInfo, CollectionOptions, CrossAccount, MintReceipt,
        RawCollection, Sponsorship, TokenData, TokenId,
    },
};

/// Write operations of the in-memory ledger that can be made to fail or be
/// refused once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateCollection,
    CreateTokens,
    CreateToken,
    BurnToken,
    BurnCollection,
    AddAdmin,
    ChangeOwner,
    SetSponsor,
}

/// Ledger kept entirely in memory. Ids are assigned sequentially and never
/// reused, so burning leaves gaps exactly like a real chain. It keeps no
/// history: `at_block` arguments are ignored.
#[derive(Default, Clone, Debug)]
pub struct InMemoryLedger(Arc<Mutex<LedgerInner>>);

#[derive(Default, Debug)]
struct LedgerInner {
    /// Last collection id handed out
    last_collection_id: CollectionId,
    /// Live collections by id
    collections: BTreeMap<CollectionId, CollectionEntry>,
    /// Operations that fail on their next call
    pending_failures: HashSet<Operation>,
    /// Operations that answer `false` on their next call
    pending_refusals: HashSet<Operation>,
}

#[derive(Debug)]
struct CollectionEntry {
    info: CollectionInfo,
    admins: Vec<CrossAccount>,
    last_token_id: TokenId,
    tokens: BTreeMap<TokenId, TokenData>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> Result<MutexGuard<'_, LedgerInner>, LedgerError> {
        self.0
            .lock()
            .map_err(|_| LedgerError::Custom("Failed to lock the in-memory ledger".to_string()))
    }

    /// Seeds a collection and returns its id.
    pub fn insert_collection(&self, info: CollectionInfo) -> Result<CollectionId, LedgerError> {
        let mut inner = self.inner()?;
        inner.last_collection_id += 1;
        let id = inner.last_collection_id;
        inner.collections.insert(
            id,
            CollectionEntry {
                info,
                admins: Vec::new(),
                last_token_id: 0,
                tokens: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    /// Mints one token bypassing signatures.
    pub fn mint(&self, collection_id: CollectionId, token: TokenData) -> Result<TokenId, LedgerError> {
        let mut inner = self.inner()?;
        let entry = inner.collection_mut(collection_id)?;
        Ok(entry.mint(token))
    }

    /// Burns one token bypassing signatures.
    pub fn burn(&self, collection_id: CollectionId, token_id: TokenId) -> Result<bool, LedgerError> {
        let mut inner = self.inner()?;
        let entry = inner.collection_mut(collection_id)?;
        Ok(entry.tokens.remove(&token_id).is_some())
    }

    /// Live tokens of a collection in id order.
    pub fn tokens(&self, collection_id: CollectionId) -> Result<Vec<(TokenId, TokenData)>, LedgerError> {
        let inner = self.inner()?;
        let entry = inner
            .collections
            .get(&collection_id)
            .ok_or(LedgerError::UnknownCollection(collection_id))?;
        Ok(entry
            .tokens
            .iter()
            .map(|(id, token)| (*id, token.clone()))
            .collect())
    }

    pub fn admins(&self, collection_id: CollectionId) -> Result<Vec<CrossAccount>, LedgerError> {
        let inner = self.inner()?;
        inner
            .collections
            .get(&collection_id)
            .map(|entry| entry.admins.clone())
            .ok_or(LedgerError::UnknownCollection(collection_id))
    }

    pub fn add_admin_unsigned(
        &self,
        collection_id: CollectionId,
        admin: CrossAccount,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner()?;
        let entry = inner.collection_mut(collection_id)?;
        if !entry.admins.contains(&admin) {
            entry.admins.push(admin);
        }
        Ok(())
    }

    /// Sets the sponsorship state directly, e.g. to model a confirmed sponsor.
    pub fn set_sponsorship(
        &self,
        collection_id: CollectionId,
        sponsorship: Sponsorship,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner()?;
        inner.collection_mut(collection_id)?.info.raw.sponsorship = sponsorship;
        Ok(())
    }

    /// Makes the next call of `operation` fail with a transport error.
    pub fn fail_next(&self, operation: Operation) -> Result<(), LedgerError> {
        self.inner()?.pending_failures.insert(operation);
        Ok(())
    }

    /// Makes the next call of `operation` answer `false` without applying
    /// it. Only operations that report success as a boolean are affected.
    pub fn refuse_next(&self, operation: Operation) -> Result<(), LedgerError> {
        self.inner()?.pending_refusals.insert(operation);
        Ok(())
    }

    fn write(&self, operation: Operation) -> Result<MutexGuard<'_, LedgerInner>, LedgerError> {
        let mut inner = self.inner()?;
        if inner.pending_failures.remove(&operation) {
            return Err(LedgerError::Transport(format!(
                "injected failure for {operation:?}"
            )));
        }
        Ok(inner)
    }
}

impl LedgerInner {
    fn refuses(&mut self, operation: Operation) -> bool {
        self.pending_refusals.remove(&operation)
    }

    fn collection_mut(
        &mut self,
        collection_id: CollectionId,
    ) -> Result<&mut CollectionEntry, LedgerError> {
        self.collections
            .get_mut(&collection_id)
            .ok_or(LedgerError::UnknownCollection(collection_id))
    }
}

impl CollectionEntry {
    fn mint(&mut self, token: TokenData) -> TokenId {
        self.last_token_id += 1;
        self.tokens.insert(self.last_token_id, token);
        self.last_token_id
    }
}

#[async_trait::async_trait]
impl Ledger for InMemoryLedger {
    async fn get_collection(
        &self,
        collection_id: CollectionId,
        _at_block: Option<BlockNumber>,
    ) -> Result<Option<CollectionInfo>, LedgerError> {
        Ok(self
            .inner()?
            .collections
            .get(&collection_id)
            .map(|entry| entry.info.clone()))
    }

    async fn collection_admins(
        &self,
        collection_id: CollectionId,
        _at_block: Option<BlockNumber>,
    ) -> Result<Vec<CrossAccount>, LedgerError> {
        self.admins(collection_id)
    }

    async fn get_token(
        &self,
        collection_id: CollectionId,
        token_id: TokenId,
        _at_block: Option<BlockNumber>,
    ) -> Result<Option<TokenData>, LedgerError> {
        Ok(self
            .inner()?
            .collections
            .get(&collection_id)
            .and_then(|entry| entry.tokens.get(&token_id).cloned()))
    }

    async fn last_token_id(
        &self,
        collection_id: CollectionId,
        _at_block: Option<BlockNumber>,
    ) -> Result<TokenId, LedgerError> {
        self.inner()?
            .collections
            .get(&collection_id)
            .map(|entry| entry.last_token_id)
            .ok_or(LedgerError::UnknownCollection(collection_id))
    }

    async fn signer_account(&self, signer: &Signer) -> Result<CrossAccount, LedgerError> {
        Ok(CrossAccount::Substrate(signer.uri().to_owned()))
    }

    async fn create_collection(
        &self,
        signer: &Signer,
        options: &CollectionOptions,
    ) -> Result<CollectionId, LedgerError> {
        let mut inner = self.write(Operation::CreateCollection)?;
        inner.last_collection_id += 1;
        let id = inner.last_collection_id;
        let raw = RawCollection {
            owner: signer.uri().to_owned(),
            mode: options.mode.clone(),
            limits: options.limits.clone().unwrap_or_default(),
            permissions: options.permissions.clone(),
            sponsorship: options
                .pending_sponsor
                .clone()
                .map(Sponsorship::Pending)
                .unwrap_or_default(),
            properties: options.properties.clone(),
            token_property_permissions: options.token_property_permissions.clone(),
        };
        inner.collections.insert(
            id,
            CollectionEntry {
                info: CollectionInfo {
                    name: options.name.clone(),
                    description: options.description.clone(),
                    token_prefix: options.token_prefix.clone(),
                    raw,
                },
                admins: Vec::new(),
                last_token_id: 0,
                tokens: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn create_tokens(
        &self,
        _signer: &Signer,
        collection_id: CollectionId,
        tokens: &[TokenData],
    ) -> Result<MintReceipt, LedgerError> {
        let mut inner = self.write(Operation::CreateTokens)?;
        let entry = inner.collection_mut(collection_id)?;
        let created_ids = tokens
            .iter()
            .map(|token| entry.mint(token.clone()))
            .collect();
        Ok(MintReceipt {
            success: true,
            created_ids,
        })
    }

    async fn create_token(
        &self,
        _signer: &Signer,
        collection_id: CollectionId,
        token: &TokenData,
    ) -> Result<MintReceipt, LedgerError> {
        let mut inner = self.write(Operation::CreateToken)?;
        let entry = inner.collection_mut(collection_id)?;
        let id = entry.mint(token.clone());
        Ok(MintReceipt {
            success: true,
            created_ids: vec![id],
        })
    }

    async fn burn_token(
        &self,
        _signer: &Signer,
        collection_id: CollectionId,
        token_id: TokenId,
    ) -> Result<bool, LedgerError> {
        let mut inner = self.write(Operation::BurnToken)?;
        if inner.refuses(Operation::BurnToken) {
            return Ok(false);
        }
        let entry = inner.collection_mut(collection_id)?;
        Ok(entry.tokens.remove(&token_id).is_some())
    }

    async fn burn_collection(
        &self,
        _signer: &Signer,
        collection_id: CollectionId,
    ) -> Result<bool, LedgerError> {
        let mut inner = self.write(Operation::BurnCollection)?;
        if inner.refuses(Operation::BurnCollection) {
            return Ok(false);
        }
        Ok(inner.collections.remove(&collection_id).is_some())
    }

    async fn add_admin(
        &self,
        _signer: &Signer,
        collection_id: CollectionId,
        admin: &CrossAccount,
    ) -> Result<bool, LedgerError> {
        let mut inner = self.write(Operation::AddAdmin)?;
        if inner.refuses(Operation::AddAdmin) {
            return Ok(false);
        }
        let entry = inner.collection_mut(collection_id)?;
        if !entry.admins.contains(admin) {
            entry.admins.push(admin.clone());
        }
        Ok(true)
    }

    async fn change_owner(
        &self,
        _signer: &Signer,
        collection_id: CollectionId,
        owner: &str,
    ) -> Result<bool, LedgerError> {
        let mut inner = self.write(Operation::ChangeOwner)?;
        if inner.refuses(Operation::ChangeOwner) {
            return Ok(false);
        }
        inner.collection_mut(collection_id)?.info.raw.owner = owner.to_owned();
        Ok(true)
    }

    async fn set_sponsor(
        &self,
        _signer: &Signer,
        collection_id: CollectionId,
        sponsor: &str,
    ) -> Result<bool, LedgerError> {
        let mut inner = self.write(Operation::SetSponsor)?;
        if inner.refuses(Operation::SetSponsor) {
            return Ok(false);
        }
        inner.collection_mut(collection_id)?.info.raw.sponsorship =
            Sponsorship::Pending(sponsor.to_owned());
        Ok(true)
    }
}

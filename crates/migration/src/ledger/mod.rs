// Ledger API consumed by the exporter and the importer

use std::fmt::{self, Debug};

use crate::{
    error::LedgerError,
    types::{
        BlockNumber, CollectionId, CollectionInfo, CollectionOptions, CrossAccount, MintReceipt,
        TokenData, TokenId,
    },
};

pub mod memory;

pub use memory::InMemoryLedger;

/// Account credentials used to sign write operations. The secret never
/// shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Signer {
    uri: String,
}

impl Signer {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("uri", &"<redacted>").finish()
    }
}

// We need async_trait because the stabilized feature lacks support for object safety
// (i.e. dyn Ledger)
#[async_trait::async_trait]
pub trait Ledger: Debug + Send + Sync {
    /// Returns the collection, optionally as it was at a past block.
    async fn get_collection(
        &self,
        collection_id: CollectionId,
        at_block: Option<BlockNumber>,
    ) -> Result<Option<CollectionInfo>, LedgerError>;

    async fn collection_admins(
        &self,
        collection_id: CollectionId,
        at_block: Option<BlockNumber>,
    ) -> Result<Vec<CrossAccount>, LedgerError>;

    /// Returns `None` for ids that were never minted or have been burned.
    async fn get_token(
        &self,
        collection_id: CollectionId,
        token_id: TokenId,
        at_block: Option<BlockNumber>,
    ) -> Result<Option<TokenData>, LedgerError>;

    /// Last token id assigned in the collection, burned tokens included.
    async fn last_token_id(
        &self,
        collection_id: CollectionId,
        at_block: Option<BlockNumber>,
    ) -> Result<TokenId, LedgerError>;

    /// Account the ledger associates with `signer`.
    async fn signer_account(&self, signer: &Signer) -> Result<CrossAccount, LedgerError>;

    async fn create_collection(
        &self,
        signer: &Signer,
        options: &CollectionOptions,
    ) -> Result<CollectionId, LedgerError>;

    /// Mints `tokens` in order. Ids are assigned sequentially by the ledger.
    async fn create_tokens(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
        tokens: &[TokenData],
    ) -> Result<MintReceipt, LedgerError>;

    async fn create_token(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
        token: &TokenData,
    ) -> Result<MintReceipt, LedgerError>;

    async fn burn_token(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
        token_id: TokenId,
    ) -> Result<bool, LedgerError>;

    async fn burn_collection(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
    ) -> Result<bool, LedgerError>;

    async fn add_admin(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
        admin: &CrossAccount,
    ) -> Result<bool, LedgerError>;

    async fn change_owner(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
        owner: &str,
    ) -> Result<bool, LedgerError>;

    async fn set_sponsor(
        &self,
        signer: &Signer,
        collection_id: CollectionId,
        sponsor: &str,
    ) -> Result<bool, LedgerError>;
}

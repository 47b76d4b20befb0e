use std::{path::PathBuf, sync::Arc};

use futures::Stream;
use serde::Serialize;

use crate::{
    codec::PayloadDecoder,
    error::MigrationError,
    files::tokens_file,
    ledger::Ledger,
    logger::Logger,
    snapshot::write_snapshot,
    token_log::TokenLogWriter,
    types::{BlockNumber, CollectionId, CollectionSnapshot, TokenId, TokenRecord},
};

/// Lazy scan over a collection's token ids.
///
/// Burned tokens leave holes, so a missing token does not end the scan:
/// every id up to the snapshot's `tokens_count` is probed. The scan keeps
/// no state besides its cursor and can start from any id.
#[derive(Debug)]
pub struct TokenScan<'a> {
    ledger: &'a dyn Ledger,
    decoder: &'a dyn PayloadDecoder,
    snapshot: &'a CollectionSnapshot,
    at_block: Option<BlockNumber>,
    cursor: u64,
    holes: u32,
}

impl<'a> TokenScan<'a> {
    pub fn new(
        ledger: &'a dyn Ledger,
        decoder: &'a dyn PayloadDecoder,
        snapshot: &'a CollectionSnapshot,
        start: TokenId,
        at_block: Option<BlockNumber>,
    ) -> Self {
        Self {
            ledger,
            decoder,
            snapshot,
            at_block,
            cursor: u64::from(start.max(1)),
            holes: 0,
        }
    }

    /// Next id that will be probed.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Ids probed so far that had no token.
    pub fn holes(&self) -> u32 {
        self.holes
    }

    pub async fn next_token(&mut self) -> Result<Option<TokenRecord>, MigrationError> {
        while self.cursor <= u64::from(self.snapshot.tokens_count) {
            let Ok(token_id) = TokenId::try_from(self.cursor) else {
                break;
            };
            self.cursor += 1;

            let Some(data) = self
                .ledger
                .get_token(self.snapshot.id, token_id, self.at_block)
                .await?
            else {
                self.holes += 1;
                continue;
            };

            let decoded = self.decoder.decode(self.snapshot, &data.const_data).ok();
            return Ok(Some(TokenRecord::new(token_id, data, decoded)));
        }
        Ok(None)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<TokenRecord, MigrationError>> + 'a {
        futures::stream::try_unfold(self, |mut scan| async move {
            Ok(scan.next_token().await?.map(|record| (record, scan)))
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    /// Discard any existing token log and scan from the first id.
    pub refresh: bool,
    /// Read the source as of this block instead of the chain head.
    pub at_block: Option<BlockNumber>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub collection_id: CollectionId,
    pub tokens_count: TokenId,
    pub resumed_from: TokenId,
    pub already_exported: usize,
    pub appended: usize,
    pub holes: u32,
}

#[derive(Debug, Clone)]
pub struct Exporter {
    ledger: Arc<dyn Ledger>,
    decoder: Arc<dyn PayloadDecoder>,
    logger: Logger,
    options: ExportOptions,
}

impl Exporter {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        decoder: Arc<dyn PayloadDecoder>,
        logger: Logger,
        options: ExportOptions,
    ) -> Self {
        Self {
            ledger,
            decoder,
            logger,
            options,
        }
    }

    /// Fetches the collection's current snapshot from the source ledger.
    pub async fn fetch_snapshot(
        &self,
        collection_id: CollectionId,
    ) -> Result<CollectionSnapshot, MigrationError> {
        let at_block = self.options.at_block;
        let info = self
            .ledger
            .get_collection(collection_id, at_block)
            .await?
            .ok_or(MigrationError::CollectionNotFound(collection_id))?;
        let admins = self
            .ledger
            .collection_admins(collection_id, at_block)
            .await?;
        let tokens_count = self.ledger.last_token_id(collection_id, at_block).await?;
        Ok(CollectionSnapshot::new(
            collection_id,
            info,
            admins,
            tokens_count,
        ))
    }

    /// Writes the collection snapshot and brings its token log up to date.
    /// Returns `None` when the collection does not exist on the source.
    pub async fn export_collection(
        &self,
        collection_id: CollectionId,
    ) -> Result<Option<ExportSummary>, MigrationError> {
        let snapshot = match self.fetch_snapshot(collection_id).await {
            Ok(snapshot) => snapshot,
            Err(MigrationError::CollectionNotFound(_)) => {
                self.logger.warn(format_args!(
                    "Collection {collection_id} not found on the source ledger, skipping"
                ));
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let snapshot_path = write_snapshot(&self.options.output_dir, &snapshot)?;
        self.logger.info(format_args!(
            "Collection {collection_id} snapshot written to {}",
            snapshot_path.display()
        ));

        let log_path = tokens_file(&self.options.output_dir, collection_id);
        let (mut writer, resume) = TokenLogWriter::open(&log_path, self.options.refresh)?;
        if resume.discarded > 0 {
            self.logger.warn(format_args!(
                "Collection {collection_id}: dropped {} torn byte(s) at the end of {}",
                resume.discarded,
                log_path.display()
            ));
        }

        let resumed_from = resume.next_token_id();
        if resumed_from > 1 {
            self.logger.info(format_args!(
                "Collection {collection_id}: resuming token export at #{resumed_from} ({} already exported)",
                resume.records
            ));
        }

        let mut scan = TokenScan::new(
            self.ledger.as_ref(),
            self.decoder.as_ref(),
            &snapshot,
            resumed_from,
            self.options.at_block,
        );
        let mut appended = 0usize;
        while let Some(record) = scan.next_token().await? {
            if record.decoded.is_none() && !record.const_data.is_empty() {
                self.logger.debug(format_args!(
                    "Collection {collection_id}: token #{} payload left undecoded",
                    record.token_id
                ));
            }
            writer.append(&record)?;
            appended += 1;
        }
        writer.finish(snapshot.tokens_count)?;

        let summary = ExportSummary {
            collection_id,
            tokens_count: snapshot.tokens_count,
            resumed_from,
            already_exported: resume.records,
            appended,
            holes: scan.holes(),
        };
        self.logger.info(format_args!(
            "Collection {collection_id}: exported {appended} new token(s), {} hole(s), last id #{}",
            summary.holes, summary.tokens_count
        ));
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::JsonPayloadDecoder,
        ledger::InMemoryLedger,
        types::{CollectionInfo, CrossAccount, RawCollection, Sponsorship, TokenData},
    };
    use futures::TryStreamExt;

    fn seeded_ledger(burned: &[TokenId]) -> (InMemoryLedger, CollectionSnapshot) {
        let ledger = InMemoryLedger::new();
        let info = CollectionInfo {
            name: "Test".to_owned(),
            description: String::new(),
            token_prefix: "TST".to_owned(),
            raw: RawCollection {
                owner: "5Owner".to_owned(),
                mode: Default::default(),
                limits: Default::default(),
                permissions: Default::default(),
                sponsorship: Sponsorship::Disabled,
                properties: Vec::new(),
                token_property_permissions: Vec::new(),
            },
        };
        let id = ledger.insert_collection(info.clone()).unwrap();
        for n in 1..=5u8 {
            ledger
                .mint(
                    id,
                    TokenData {
                        owner: CrossAccount::Substrate(format!("5Holder{n}")),
                        const_data: format!("{{\"n\":{n}}}").into_bytes(),
                        variable_data: Vec::new(),
                    },
                )
                .unwrap();
        }
        for token in burned {
            ledger.burn(id, *token).unwrap();
        }
        let snapshot = CollectionSnapshot::new(id, info, Vec::new(), 5);
        (ledger, snapshot)
    }

    #[tokio::test]
    async fn scan_skips_holes_until_token_count() {
        let (ledger, snapshot) = seeded_ledger(&[2, 5]);
        let mut scan = TokenScan::new(&ledger, &JsonPayloadDecoder, &snapshot, 1, None);

        let mut ids = Vec::new();
        while let Some(record) = scan.next_token().await.unwrap() {
            ids.push(record.token_id);
        }

        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(scan.holes(), 2);
        assert_eq!(scan.cursor(), 6);
    }

    #[tokio::test]
    async fn scan_restarts_from_any_id() {
        let (ledger, snapshot) = seeded_ledger(&[]);
        let scan = TokenScan::new(&ledger, &JsonPayloadDecoder, &snapshot, 4, None);

        let records: Vec<TokenRecord> = scan.into_stream().try_collect().await.unwrap();
        assert_eq!(
            records.iter().map(|r| r.token_id).collect::<Vec<_>>(),
            vec![4, 5]
        );
        assert_eq!(records[0].decoded, Some(serde_json::json!({"n": 4})));
    }

    #[tokio::test]
    async fn scan_past_the_end_is_empty() {
        let (ledger, snapshot) = seeded_ledger(&[]);
        let mut scan = TokenScan::new(&ledger, &JsonPayloadDecoder, &snapshot, 6, None);
        assert!(scan.next_token().await.unwrap().is_none());
    }
}

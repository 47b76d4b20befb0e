//! Append-only token log.
//!
//! Tokens are stored one JSON object per line. A run that dies halfway
//! leaves at most one partial line at the end; reopening the log parses
//! whatever is there, keeps the longest well-formed prefix and cuts the
//! rest off before appending again.
//!
//! A finished export ends the log with a completion trailer,
//! `{"complete":true,"last_token_id":N}`. Reopening the log for appending
//! strips it, so a log without a trailer is one whose export has not
//! completed.
//!
//! The parser is deliberately lenient about array punctuation (a leading
//! `[`, trailing `,` and a closing `]`) so logs written as one JSON array
//! per line resume the same way.

use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::MigrationError,
    types::{TokenId, TokenRecord},
};

/// Where an export picks up, computed from the bytes already on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumePoint {
    /// Byte length of the well-formed prefix, trailer excluded.
    pub valid_len: u64,
    /// Highest token id in the prefix.
    pub max_token_id: Option<TokenId>,
    /// Records in the prefix.
    pub records: usize,
    /// Bytes after the prefix and trailer that will be discarded.
    pub discarded: u64,
    /// Last token id declared by the completion trailer, if the log has one.
    pub complete: Option<TokenId>,
}

impl ResumePoint {
    pub fn next_token_id(&self) -> TokenId {
        self.max_token_id.map_or(1, |max| max.saturating_add(1))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CompletionTrailer {
    complete: bool,
    last_token_id: TokenId,
}

enum Entry {
    Token(TokenRecord),
    Complete(TokenId),
}

/// Parses `bytes` and returns the longest well-formed prefix of records
/// with strictly increasing ids.
pub fn parse_log(bytes: &[u8]) -> (Vec<TokenRecord>, ResumePoint) {
    let mut records = Vec::new();
    let mut resume = ResumePoint::default();
    let mut offset = 0usize;
    let mut consumed = 0usize;

    while offset < bytes.len() {
        let Some(line_len) = bytes[offset..].iter().position(|byte| *byte == b'\n') else {
            // Unterminated tail, the writer died mid-record.
            break;
        };
        let line = &bytes[offset..offset + line_len];
        let next_offset = offset + line_len + 1;

        match parse_line(line) {
            Ok(None) => {}
            Ok(Some(Entry::Token(record)))
                if resume
                    .max_token_id
                    .is_none_or(|max| record.token_id > max) =>
            {
                resume.max_token_id = Some(record.token_id);
                records.push(record);
            }
            Ok(Some(Entry::Complete(last_token_id)))
                if resume
                    .max_token_id
                    .is_none_or(|max| max <= last_token_id) =>
            {
                resume.complete = Some(last_token_id);
                consumed = next_offset;
                break;
            }
            Ok(Some(_)) | Err(()) => break,
        }

        offset = next_offset;
        resume.valid_len = offset as u64;
        consumed = offset;
    }

    resume.records = records.len();
    resume.discarded = (bytes.len() - consumed) as u64;
    (records, resume)
}

fn parse_line(line: &[u8]) -> Result<Option<Entry>, ()> {
    let text = std::str::from_utf8(line).map_err(|_| ())?.trim();
    let text = text.strip_prefix('[').unwrap_or(text).trim();
    let text = text.strip_suffix(']').unwrap_or(text).trim();
    let text = text.strip_suffix(',').unwrap_or(text).trim();
    if text.is_empty() {
        return Ok(None);
    }
    if let Ok(record) = serde_json::from_str::<TokenRecord>(text) {
        return Ok(Some(Entry::Token(record)));
    }
    match serde_json::from_str::<CompletionTrailer>(text) {
        Ok(CompletionTrailer {
            complete: true,
            last_token_id,
        }) => Ok(Some(Entry::Complete(last_token_id))),
        _ => Err(()),
    }
}

/// Records of an exported token log, keyed by token id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenLog {
    pub tokens: BTreeMap<TokenId, TokenRecord>,
    /// Last token id declared by the completion trailer. `None` while the
    /// export that writes the log has not finished.
    pub complete: Option<TokenId>,
}

/// Reads every well-formed record of a log. `None` when the log does not
/// exist.
pub fn read_token_log(path: &Path) -> Result<Option<TokenLog>, MigrationError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(MigrationError::io(path, err)),
    };
    let (records, resume) = parse_log(&bytes);
    Ok(Some(TokenLog {
        tokens: records
            .into_iter()
            .map(|record| (record.token_id, record))
            .collect(),
        complete: resume.complete,
    }))
}

/// Appending handle on a token log, positioned after the valid prefix.
#[derive(Debug)]
pub struct TokenLogWriter {
    path: PathBuf,
    file: File,
    last_token_id: Option<TokenId>,
}

impl TokenLogWriter {
    /// Opens (or creates) the log at `path`. With `refresh` the log is
    /// emptied; otherwise any torn tail is cut off.
    pub fn open(path: &Path, refresh: bool) -> Result<(Self, ResumePoint), MigrationError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| MigrationError::io(parent, err))?;
        }

        let resume = if refresh {
            ResumePoint::default()
        } else {
            match fs::read(path) {
                Ok(bytes) => parse_log(&bytes).1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => ResumePoint::default(),
                Err(err) => return Err(MigrationError::io(path, err)),
            }
        };

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|err| MigrationError::io(path, err))?;
        file.set_len(resume.valid_len)
            .and_then(|()| file.seek(SeekFrom::End(0)))
            .map_err(|err| MigrationError::io(path, err))?;

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                last_token_id: resume.max_token_id,
            },
            resume,
        ))
    }

    /// Appends one record and flushes it. Records must arrive in increasing
    /// id order.
    pub fn append(&mut self, record: &TokenRecord) -> Result<(), MigrationError> {
        if self
            .last_token_id
            .is_some_and(|last| record.token_id <= last)
        {
            return Err(MigrationError::io(
                &self.path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!(
                        "token {} is not above the last logged token {:?}",
                        record.token_id, self.last_token_id
                    ),
                ),
            ));
        }

        let mut line =
            serde_json::to_vec(record).map_err(|err| MigrationError::json(&self.path, err))?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|()| self.file.flush())
            .map_err(|err| MigrationError::io(&self.path, err))?;
        self.last_token_id = Some(record.token_id);
        Ok(())
    }

    /// Marks the log complete up to `last_token_id` and syncs it to disk.
    pub fn finish(mut self, last_token_id: TokenId) -> Result<(), MigrationError> {
        if self.last_token_id.is_some_and(|last| last > last_token_id) {
            return Err(MigrationError::io(
                &self.path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!(
                        "log already holds token {:?} beyond the last token {last_token_id}",
                        self.last_token_id
                    ),
                ),
            ));
        }

        let trailer = CompletionTrailer {
            complete: true,
            last_token_id,
        };
        let mut line =
            serde_json::to_vec(&trailer).map_err(|err| MigrationError::json(&self.path, err))?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|()| self.file.sync_all())
            .map_err(|err| MigrationError::io(&self.path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CrossAccount, TokenData};

    fn record(token_id: TokenId) -> TokenRecord {
        TokenRecord::new(
            token_id,
            TokenData {
                owner: CrossAccount::Substrate(format!("5Owner{token_id}")),
                const_data: vec![token_id as u8],
                variable_data: Vec::new(),
            },
            None,
        )
    }

    fn line(token_id: TokenId) -> String {
        format!("{}\n", serde_json::to_string(&record(token_id)).unwrap())
    }

    #[test]
    fn empty_log_starts_at_one() {
        let (records, resume) = parse_log(b"");
        assert!(records.is_empty());
        assert_eq!(resume.next_token_id(), 1);
        assert_eq!(resume.valid_len, 0);
    }

    #[test]
    fn torn_tail_is_discarded() {
        let full = format!("{}{}", line(1), line(3));
        let cut = full.len() - 7;
        let (records, resume) = parse_log(&full.as_bytes()[..cut]);

        assert_eq!(records.len(), 1);
        assert_eq!(resume.next_token_id(), 2);
        assert_eq!(resume.valid_len, line(1).len() as u64);
        assert_eq!(resume.discarded, (cut - line(1).len()) as u64);
    }

    #[test]
    fn record_without_newline_is_treated_as_torn() {
        let full = format!("{}{}", line(1), line(2));
        let (records, resume) = parse_log(&full.as_bytes()[..full.len() - 1]);

        assert_eq!(records.len(), 1);
        assert_eq!(resume.max_token_id, Some(1));
    }

    #[test]
    fn tolerates_array_punctuation() {
        let text = format!(
            "[\n{},\n{},\n]\n",
            serde_json::to_string(&record(1)).unwrap(),
            serde_json::to_string(&record(4)).unwrap()
        );
        let (records, resume) = parse_log(text.as_bytes());

        assert_eq!(records.len(), 2);
        assert_eq!(resume.max_token_id, Some(4));
        assert_eq!(resume.discarded, 0);
    }

    #[test]
    fn stops_at_non_increasing_ids() {
        let text = format!("{}{}{}", line(2), line(2), line(5));
        let (records, resume) = parse_log(text.as_bytes());

        assert_eq!(records.len(), 1);
        assert_eq!(resume.next_token_id(), 3);
    }

    fn trailer(last_token_id: TokenId) -> String {
        format!("{{\"complete\":true,\"last_token_id\":{last_token_id}}}\n")
    }

    #[test]
    fn completion_trailer_is_reported() {
        let text = format!("{}{}{}", line(1), line(3), trailer(4));
        let (records, resume) = parse_log(text.as_bytes());

        assert_eq!(records.len(), 2);
        assert_eq!(resume.complete, Some(4));
        assert_eq!(resume.valid_len, (line(1).len() + line(3).len()) as u64);
        assert_eq!(resume.discarded, 0);
    }

    #[test]
    fn log_without_trailer_is_incomplete() {
        let text = format!("{}{}", line(1), line(3));
        let (_, resume) = parse_log(text.as_bytes());
        assert_eq!(resume.complete, None);

        let torn_trailer = format!("{}{}", line(1), &trailer(3)[..12]);
        let (_, resume) = parse_log(torn_trailer.as_bytes());
        assert_eq!(resume.complete, None);
    }

    #[test]
    fn trailer_below_the_last_record_is_ignored() {
        let text = format!("{}{}{}", line(1), line(5), trailer(3));
        let (records, resume) = parse_log(text.as_bytes());

        assert_eq!(records.len(), 2);
        assert_eq!(resume.complete, None);
    }

    #[test]
    fn writer_repairs_torn_log_before_appending() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("export_tokens_1.json");
        let torn = format!("{}{}", line(1), &line(2)[..10]);
        fs::write(&path, torn).unwrap();

        let (mut writer, resume) = TokenLogWriter::open(&path, false).unwrap();
        assert_eq!(resume.next_token_id(), 2);
        writer.append(&record(2)).unwrap();
        writer.finish(2).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, format!("{}{}{}", line(1), line(2), trailer(2)));
    }

    #[test]
    fn reopening_strips_the_trailer() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("export_tokens_1.json");
        fs::write(&path, format!("{}{}", line(1), trailer(1))).unwrap();

        let (mut writer, resume) = TokenLogWriter::open(&path, false).unwrap();
        assert_eq!(resume.complete, Some(1));
        assert_eq!(fs::read_to_string(&path).unwrap(), line(1));

        writer.append(&record(3)).unwrap();
        writer.finish(3).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{}{}{}", line(1), line(3), trailer(3))
        );
    }

    #[test]
    fn finish_rejects_a_last_id_below_the_logged_records() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("export_tokens_1.json");

        let (mut writer, _) = TokenLogWriter::open(&path, false).unwrap();
        writer.append(&record(4)).unwrap();
        assert!(writer.finish(3).is_err());
    }

    #[test]
    fn refresh_truncates_the_log() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("export_tokens_1.json");
        fs::write(&path, format!("{}{}", line(1), line(2))).unwrap();

        let (writer, resume) = TokenLogWriter::open(&path, true).unwrap();
        assert_eq!(resume.next_token_id(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);

        writer.finish(0).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), trailer(0));
    }

    #[test]
    fn writer_rejects_out_of_order_records() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("export_tokens_1.json");

        let (mut writer, _) = TokenLogWriter::open(&path, false).unwrap();
        writer.append(&record(3)).unwrap();
        assert!(writer.append(&record(3)).is_err());
    }

    #[test]
    fn read_token_log_keys_records_by_id() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("export_tokens_1.json");
        assert!(read_token_log(&path).unwrap().is_none());

        fs::write(&path, format!("{}{}{}", line(1), line(3), trailer(3))).unwrap();
        let log = read_token_log(&path).unwrap().unwrap();
        assert_eq!(log.tokens.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(log.complete, Some(3));
    }
}

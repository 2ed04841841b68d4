//! Append-only audit log backed by a JSON-lines file
//!
//! Each line is one `{"reportIndex": n, "transactionHash": "0x…"}` object.
//! Lines are fsynced as they are written and replayed on open, so the
//! index → hash mapping survives restarts with its ordering intact.

use crate::error::{AuditError, AuditResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tix_types::TxHash;
use tracing::{debug, info, warn};

/// One persisted audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub report_index: u64,
    pub transaction_hash: TxHash,
}

/// Outcome of reconciling a pass against the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Entries newly written
    pub appended: usize,
    /// Entries already recorded with the same hash
    pub already_present: usize,
}

/// Storage the log appends its lines to
trait LogFile: Write + Send + fmt::Debug {
    fn size(&self) -> io::Result<u64>;
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<u64, TxHash>,
    file: Option<Box<dyn LogFile>>,
}

impl Inner {
    fn write_entry(&mut self, path: Option<&Path>, entry: AuditEntry) -> AuditResult<()> {
        let synced = match (self.file.as_mut(), path) {
            (Some(file), Some(path)) => Self::write_line(&mut **file, path, &entry)?,
            _ => Ok(()),
        };
        // Once the line is in the file the index is taken, synced or not
        self.entries.insert(entry.report_index, entry.transaction_hash);
        synced
    }

    /// Append one line; the outer error means nothing was written, the
    /// inner one that the line landed but may not be durable
    fn write_line(
        file: &mut dyn LogFile,
        path: &Path,
        entry: &AuditEntry,
    ) -> AuditResult<AuditResult<()>> {
        let mut line =
            serde_json::to_vec(entry).map_err(|e| AuditError::io(path, io::Error::other(e)))?;
        line.push(b'\n');

        let end = file.size().map_err(|e| AuditError::io(path, e))?;
        if let Err(err) = file.write_all(&line) {
            if let Err(rollback) = file.truncate(end) {
                warn!(
                    path = %path.display(),
                    error = %rollback,
                    "partial audit line could not be removed"
                );
            }
            return Err(AuditError::io(path, err));
        }

        Ok(file.sync().map_err(|e| AuditError::io(path, e)))
    }
}

/// Durable mapping from report index to transaction hash
///
/// Append-only: entries are never overwritten or removed.
#[derive(Debug)]
pub struct AuditLog {
    path: Option<PathBuf>,
    inner: Mutex<Inner>,
}

impl AuditLog {
    /// Open (or create) a file-backed log and replay its entries
    ///
    /// An undecodable final line without a newline is what a crash during
    /// an append leaves behind; it is cut off and the log opens without it.
    ///
    /// # Errors
    /// - `AuditError::Io` if the file cannot be opened or read
    /// - `AuditError::Corrupt` if a complete line is not a valid entry
    /// - `AuditError::DuplicateIndex` if the file records an index twice
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AuditError::io(&path, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::io(&path, e))?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| AuditError::io(&path, e))?;

        let (entries, tail) = replay(&path, &contents)?;
        match tail {
            Tail::Clean => {}
            Tail::Torn { offset, line } => {
                warn!(path = %path.display(), line, "discarding torn final audit line");
                file.set_len(offset).map_err(|e| AuditError::io(&path, e))?;
                file.sync_data().map_err(|e| AuditError::io(&path, e))?;
            }
            Tail::Unterminated => {
                file.write_all(b"\n").map_err(|e| AuditError::io(&path, e))?;
                file.sync_data().map_err(|e| AuditError::io(&path, e))?;
            }
        }

        info!(path = %path.display(), entries = entries.len(), "audit log opened");

        Ok(Self {
            path: Some(path),
            inner: Mutex::new(Inner {
                entries,
                file: Some(Box::new(file)),
            }),
        })
    }

    /// Volatile log for tests and dry runs
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Record the transaction for a report index
    ///
    /// # Errors
    /// - `AuditError::DuplicateIndex` if the index already has an entry
    /// - `AuditError::Io` if the write fails
    pub fn append(&self, report_index: u64, transaction_hash: TxHash) -> AuditResult<()> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.entries.get(&report_index) {
            return Err(AuditError::DuplicateIndex {
                index: report_index,
                existing: *existing,
            });
        }
        inner.write_entry(
            self.path.as_deref(),
            AuditEntry {
                report_index,
                transaction_hash,
            },
        )?;
        debug!(index = report_index, tx = %transaction_hash.short(), "audit entry appended");
        Ok(())
    }

    /// Bring the log in line with an observed report sequence
    ///
    /// Every observed pair is checked before anything is written, so a
    /// drifting index leaves the log untouched.
    ///
    /// # Errors
    /// - `AuditError::IndexDrift` if an index is recorded with another hash
    /// - `AuditError::Io` if a write fails
    pub fn reconcile(&self, observed: &[(u64, TxHash)]) -> AuditResult<ReconcileSummary> {
        let mut inner = self.inner.lock();
        let mut summary = ReconcileSummary::default();
        let mut missing = Vec::new();

        for &(index, hash) in observed {
            match inner.entries.get(&index) {
                Some(recorded) if *recorded == hash => summary.already_present += 1,
                Some(recorded) => {
                    return Err(AuditError::IndexDrift {
                        index,
                        recorded: *recorded,
                        observed: hash,
                    })
                }
                None => missing.push(AuditEntry {
                    report_index: index,
                    transaction_hash: hash,
                }),
            }
        }

        for entry in missing {
            inner.write_entry(self.path.as_deref(), entry)?;
            summary.appended += 1;
        }

        if summary.appended > 0 {
            debug!(
                appended = summary.appended,
                already_present = summary.already_present,
                "audit log reconciled"
            );
        }
        Ok(summary)
    }

    /// Transaction recorded for a report index
    ///
    /// # Errors
    /// Returns `AuditError::NotFound` if the index has no entry
    pub fn lookup(&self, report_index: u64) -> AuditResult<TxHash> {
        self.inner
            .lock()
            .entries
            .get(&report_index)
            .copied()
            .ok_or(AuditError::NotFound(report_index))
    }

    /// All recorded hashes, ordered by report index
    #[must_use]
    pub fn list_all(&self) -> Vec<TxHash> {
        self.inner.lock().entries.values().copied().collect()
    }

    /// All entries, ordered by report index
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(&report_index, &transaction_hash)| AuditEntry {
                report_index,
                transaction_hash,
            })
            .collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the log has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Backing file, if durable
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// How a replayed file ends
#[derive(Debug, PartialEq, Eq)]
enum Tail {
    Clean,
    /// Undecodable last line with no newline, starting at `offset`
    Torn { offset: u64, line: usize },
    /// Decodable last line with no newline
    Unterminated,
}

fn replay(path: &Path, contents: &[u8]) -> AuditResult<(BTreeMap<u64, TxHash>, Tail)> {
    let mut entries = BTreeMap::new();
    let mut offset = 0;

    for (number, line) in contents.split_inclusive(|&b| b == b'\n').enumerate() {
        let start = offset;
        offset += line.len();
        let terminated = line.ends_with(b"\n");
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let entry: AuditEntry = match serde_json::from_slice(line) {
            Ok(entry) => entry,
            Err(_) if !terminated => {
                return Ok((
                    entries,
                    Tail::Torn {
                        offset: start as u64,
                        line: number + 1,
                    },
                ))
            }
            Err(source) => {
                return Err(AuditError::Corrupt {
                    path: path.to_path_buf(),
                    line: number + 1,
                    source,
                })
            }
        };
        if let Some(existing) = entries.insert(entry.report_index, entry.transaction_hash) {
            return Err(AuditError::DuplicateIndex {
                index: entry.report_index,
                existing,
            });
        }
    }

    let tail = if contents.last().is_some_and(|&b| b != b'\n') {
        Tail::Unterminated
    } else {
        Tail::Clean
    };
    Ok((entries, tail))
}

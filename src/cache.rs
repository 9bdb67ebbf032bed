//! Normalized-table cache keyed by upload filename.
//!
//! Lookup order is memory, then the on-disk snapshot when it is strictly
//! newer than the source file, then the source file itself. Population is
//! single-flight per filename: concurrent callers for the same uncached file
//! wait on one load instead of normalizing it several times. This only holds
//! between invalidations; a `get` racing an `invalidate` of the same file may
//! start a second load.

use crate::config::EngineConfig;
use crate::error::{LedgerError, Result};
use crate::ingestion::read_table;
use crate::normalize::normalize;
use crate::periods::PeriodKey;
use crate::schema::{LedgerRow, LedgerTable};
use chrono::NaiveDate;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

const SNAPSHOT_VERSION: u32 = 1;

/// Reads and normalizes one source file.
pub type Loader = Arc<dyn Fn(&Path) -> Result<LedgerTable> + Send + Sync>;

pub trait TableCache: Send + Sync {
    /// Normalized table for `filename`, loading it if needed.
    fn get(&self, filename: &str) -> Result<Arc<LedgerTable>>;

    /// Seeds the in-memory entry for `filename`.
    fn put(&self, filename: &str, table: LedgerTable) -> Result<()>;

    /// Drops one in-memory entry, or all of them for `None`.
    fn invalidate(&self, filename: Option<&str>);
}

/// Resolves an upload filename to a path directly inside `uploads_dir`.
pub fn source_path(uploads_dir: &Path, filename: &str) -> Result<PathBuf> {
    let candidate = Path::new(filename);
    let mut components = candidate.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !filename.contains('\\') => {
            Ok(uploads_dir.join(candidate))
        }
        _ => Err(LedgerError::InvalidFilename(filename.to_string())),
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Columnar on-disk form of a [`LedgerTable`].
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    columns: BTreeSet<String>,
    day_column: Option<String>,
    period: Vec<Option<PeriodKey>>,
    day: Vec<Option<String>>,
    date: Vec<Option<NaiveDate>>,
    sales: Vec<f64>,
    profit: Vec<f64>,
    part: Vec<Option<String>>,
    channel: Vec<Option<String>>,
    account: Vec<Option<String>>,
    group: Vec<Option<String>>,
    category: Vec<Option<String>>,
    sub_category: Vec<Option<String>>,
    main_channel: Vec<Option<String>>,
}

impl From<&LedgerTable> for Snapshot {
    fn from(table: &LedgerTable) -> Self {
        let rows = &table.rows;
        let texts = |f: fn(&LedgerRow) -> &Option<String>| -> Vec<Option<String>> {
            rows.iter().map(|r| f(r).clone()).collect()
        };
        Self {
            version: SNAPSHOT_VERSION,
            columns: table.columns.clone(),
            day_column: table.day_column.clone(),
            period: rows.iter().map(|r| r.period).collect(),
            day: texts(|r| &r.day),
            date: rows.iter().map(|r| r.date).collect(),
            sales: rows.iter().map(|r| r.sales).collect(),
            profit: rows.iter().map(|r| r.profit).collect(),
            part: texts(|r| &r.part),
            channel: texts(|r| &r.channel),
            account: texts(|r| &r.account),
            group: texts(|r| &r.group),
            category: texts(|r| &r.category),
            sub_category: texts(|r| &r.sub_category),
            main_channel: texts(|r| &r.main_channel),
        }
    }
}

impl Snapshot {
    /// Rebuilds the table; `None` when the columns disagree in length.
    fn into_table(self) -> Option<LedgerTable> {
        let len = self.period.len();
        let lengths = [
            self.day.len(),
            self.date.len(),
            self.sales.len(),
            self.profit.len(),
            self.part.len(),
            self.channel.len(),
            self.account.len(),
            self.group.len(),
            self.category.len(),
            self.sub_category.len(),
            self.main_channel.len(),
        ];
        if self.version != SNAPSHOT_VERSION || lengths.iter().any(|l| *l != len) {
            return None;
        }

        let mut day = self.day.into_iter();
        let mut part = self.part.into_iter();
        let mut channel = self.channel.into_iter();
        let mut account = self.account.into_iter();
        let mut group = self.group.into_iter();
        let mut category = self.category.into_iter();
        let mut sub_category = self.sub_category.into_iter();
        let mut main_channel = self.main_channel.into_iter();

        let rows = (0..len)
            .map(|i| LedgerRow {
                period: self.period[i],
                day: day.next().flatten(),
                date: self.date[i],
                sales: self.sales[i],
                profit: self.profit[i],
                part: part.next().flatten(),
                channel: channel.next().flatten(),
                account: account.next().flatten(),
                group: group.next().flatten(),
                category: category.next().flatten(),
                sub_category: sub_category.next().flatten(),
                main_channel: main_channel.next().flatten(),
            })
            .collect();

        Some(LedgerTable {
            columns: self.columns,
            day_column: self.day_column,
            rows,
        })
    }
}

struct Entry {
    table: Arc<LedgerTable>,
    source_modified: Option<SystemTime>,
}

type Slot = Arc<Mutex<Option<Entry>>>;

pub struct LedgerCache {
    uploads_dir: PathBuf,
    cache_dir: PathBuf,
    loader: Loader,
    slots: Mutex<HashMap<String, Slot>>,
}

impl LedgerCache {
    /// Cache that reads source files with the standard ingestion and normalization pipeline.
    pub fn new(config: &EngineConfig) -> Self {
        let normalize_config = config.clone();
        let loader: Loader = Arc::new(move |path: &Path| {
            let raw = read_table(path)?;
            Ok(normalize(raw, &normalize_config))
        });
        Self::with_loader(config.uploads_dir.clone(), config.cache_dir(), loader)
    }

    pub fn with_loader(uploads_dir: PathBuf, cache_dir: PathBuf, loader: Loader) -> Self {
        Self {
            uploads_dir,
            cache_dir,
            loader,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn snapshot_path(&self, filename: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.snapshot.json", filename))
    }

    /// Number of filenames with a populated in-memory entry.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|s| s.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, filename: &str) -> Slot {
        self.slots
            .lock()
            .entry(filename.to_string())
            .or_default()
            .clone()
    }

    fn read_snapshot(&self, filename: &str, source_modified: SystemTime) -> Option<LedgerTable> {
        let path = self.snapshot_path(filename);
        let snapshot_modified = modified(&path)?;
        if snapshot_modified <= source_modified {
            debug!("Snapshot for {} is stale", filename);
            return None;
        }

        info!("Reading snapshot: {}", path.display());
        let parsed = File::open(&path)
            .map_err(LedgerError::from)
            .and_then(|f| serde_json::from_reader::<_, Snapshot>(BufReader::new(f)).map_err(LedgerError::from));
        match parsed {
            Ok(snapshot) => {
                let table = snapshot.into_table();
                if table.is_none() {
                    warn!("Snapshot {} is inconsistent, ignoring it", path.display());
                }
                table
            }
            Err(e) => {
                error!("Failed to read snapshot {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write_snapshot(&self, filename: &str, table: &LedgerTable) -> Result<()> {
        let final_path = self.snapshot_path(filename);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = final_path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            serde_json::to_writer(&mut writer, &Snapshot::from(table))?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }
}

impl TableCache for LedgerCache {
    fn get(&self, filename: &str) -> Result<Arc<LedgerTable>> {
        let path = source_path(&self.uploads_dir, filename)?;
        let source_modified = modified(&path);

        // Missing sources never allocate a slot.
        let slot = match source_modified {
            Some(_) => self.slot(filename),
            None => self
                .slots
                .lock()
                .get(filename)
                .cloned()
                .ok_or_else(|| LedgerError::FileNotFound(filename.to_string()))?,
        };
        let mut entry = slot.lock();

        if let Some(cached) = entry.as_ref() {
            if source_modified.is_none() || cached.source_modified == source_modified {
                info!("Cache HIT for {}", filename);
                return Ok(cached.table.clone());
            }
            info!("Source {} changed on disk, reloading", filename);
        }

        let Some(source_time) = source_modified else {
            return Err(LedgerError::FileNotFound(filename.to_string()));
        };

        let table = match self.read_snapshot(filename, source_time) {
            Some(table) => table,
            None => {
                info!("Reading from source file: {}", path.display());
                let table = (self.loader)(&path)?;
                match self.write_snapshot(filename, &table) {
                    Ok(()) => info!("Saved snapshot for {}", filename),
                    Err(e) => error!("Failed to save snapshot for {}: {}", filename, e),
                }
                table
            }
        };

        let table = Arc::new(table);
        *entry = Some(Entry {
            table: table.clone(),
            source_modified,
        });
        Ok(table)
    }

    fn put(&self, filename: &str, table: LedgerTable) -> Result<()> {
        let path = source_path(&self.uploads_dir, filename)?;
        let slot = self.slot(filename);
        *slot.lock() = Some(Entry {
            table: Arc::new(table),
            source_modified: modified(&path),
        });
        debug!("Seeded cache entry for {}", filename);
        Ok(())
    }

    fn invalidate(&self, filename: Option<&str>) {
        let mut slots = self.slots.lock();
        match filename {
            Some(name) => {
                if slots.remove(name).is_some() {
                    info!("Cleared cache for {}", name);
                }
            }
            None => {
                slots.clear();
                info!("Cleared entire table cache");
            }
        }
    }
}

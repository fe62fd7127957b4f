//! The compression scheduler: one run over a site tree.
//!
//! A run moves through a fixed sequence of phases ([`RunPhase`]). The
//! coordinating thread scans and hashes every candidate, serves cache hits
//! itself, and hands misses to a fixed-size rayon pool. Once the pool has
//! drained, orphaned cache entries are pruned against the digests seen in this
//! run and the manifest is persisted.
//!
//! Per-file failures never abort a run: the original file is left in place
//! (or copied to the output directory) and counted as an error.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use mediapress_cache::{copy_atomic, CacheEntry, CacheStore, SourceHasher};
use mediapress_common::{ContentDigest, MediaKind};
use mediapress_config::{check_cache_dir, CompressionConfig, ConfigSnapshot, MediaPressConfig};

use crate::error::RunError;
use crate::scan::{scan_site, Candidate, SiteScan};
use crate::stats::{reduction_line, RunStats, StatsSummary};
use crate::transcode::{CompressedOutput, Transcoders};

/// Phases of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunPhase {
    /// Opening the cache with the current settings.
    Init,
    /// Enumerating the site tree.
    Scanning,
    /// Hashing candidates, serving hits, submitting misses.
    Dispatching,
    /// Waiting for all submitted work.
    Draining,
    /// Pruning entries no current file needs.
    Reconciling,
    /// Manifest written and summary emitted.
    Persisted,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Scanning => "scanning",
            Self::Dispatching => "dispatching",
            Self::Draining => "draining",
            Self::Reconciling => "reconciling",
            Self::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// One cache miss queued for a worker.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// The file to compress.
    pub source: PathBuf,
    /// Where the compressed bytes go.
    pub dest: PathBuf,
    /// Digest of the source bytes.
    pub digest: ContentDigest,
    /// Media family.
    pub kind: MediaKind,
    /// Lowercase source extension; selects the output format.
    pub ext: String,
}

/// A file that could not be compressed and was passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// The source file.
    pub path: PathBuf,
    /// Human-readable cause.
    pub reason: String,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Final counters.
    pub stats: StatsSummary,
    /// Cache entries evicted during reconciliation.
    pub pruned: Vec<CacheEntry>,
    /// Files that failed, sorted by path.
    pub failures: Vec<FileFailure>,
    /// Set when the manifest could not be written; the run still succeeded.
    pub persist_error: Option<String>,
}

/// Where a run reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    /// The build output tree to compress.
    pub site_dir: PathBuf,
    /// The cache directory.
    pub cache_dir: PathBuf,
    /// Mirror destination; `None` rewrites `site_dir` in place.
    pub output_dir: Option<PathBuf>,
}

impl RunPaths {
    /// Extracts the paths from a loaded configuration.
    pub fn from_config(config: &MediaPressConfig) -> Self {
        Self {
            site_dir: config.site_dir.clone(),
            cache_dir: config.cache_dir.clone(),
            output_dir: config.output_dir.clone(),
        }
    }
}

/// Runs compression passes over a site tree.
pub struct Scheduler {
    paths: RunPaths,
    config: CompressionConfig,
    transcoders: Transcoders,
}

impl Scheduler {
    /// Creates a scheduler with the given transcoders.
    pub fn new(paths: RunPaths, config: CompressionConfig, transcoders: Transcoders) -> Self {
        Self {
            paths,
            config,
            transcoders,
        }
    }

    /// The compression settings in effect.
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Performs one full run.
    ///
    /// Fails only when the cache directory is unusable or would cover the
    /// site or output directory, the site directory cannot be read, or the
    /// worker pool cannot start.
    pub fn run(&self) -> Result<RunReport, RunError> {
        enter(RunPhase::Init);
        let mut protected = vec![("site_dir", self.paths.site_dir.as_path())];
        if let Some(out) = &self.paths.output_dir {
            protected.push(("output_dir", out.as_path()));
        }
        check_cache_dir(&self.paths.cache_dir, &protected)?;
        let snapshot = ConfigSnapshot::capture(&self.config);
        let store = CacheStore::open(&self.paths.cache_dir, &snapshot)?;

        enter(RunPhase::Scanning);
        let site_root = canonical(&self.paths.site_dir);
        let exclude: Vec<PathBuf> = [Some(&self.paths.cache_dir), self.paths.output_dir.as_ref()]
            .into_iter()
            .flatten()
            .map(|p| canonical(p))
            .collect();
        let scan = scan_site(&site_root, &exclude, &self.config).map_err(|e| RunError::SiteDir {
            path: self.paths.site_dir.clone(),
            source: e,
        })?;
        tracing::info!(
            site_dir = %self.paths.site_dir.display(),
            candidates = scan.candidates.len(),
            total = scan.total(),
            "scanned site"
        );

        let run = ActiveRun {
            site_root: &site_root,
            output_dir: self.paths.output_dir.as_deref(),
            config: &self.config,
            transcoders: &self.transcoders,
            store: &store,
            stats: RunStats::new(),
            failures: Mutex::new(Vec::new()),
        };
        run.pass_through_unhandled(&scan);

        let live = if scan.candidates.is_empty() {
            tracing::info!("No media files found.");
            HashSet::new()
        } else {
            run.dispatch_and_drain(&scan.candidates)?
        };

        enter(RunPhase::Reconciling);
        let pruned = store.prune_orphans(&live);
        if !pruned.is_empty() {
            tracing::info!("Removed {} orphaned cache entries", pruned.len());
        }

        let persist_error = match store.persist() {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("failed to save cache manifest: {e}");
                Some(e.to_string())
            }
        };
        enter(RunPhase::Persisted);

        let stats = run.stats.summary();
        tracing::info!("Complete: {stats}");

        let mut failures = run
            .failures
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(RunReport {
            stats,
            pruned,
            failures,
            persist_error,
        })
    }
}

fn enter(phase: RunPhase) {
    tracing::debug!(%phase, "run phase");
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn lowercase_ext(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// State borrowed by the coordinator and every worker for one run.
struct ActiveRun<'a> {
    site_root: &'a Path,
    output_dir: Option<&'a Path>,
    config: &'a CompressionConfig,
    transcoders: &'a Transcoders,
    store: &'a CacheStore,
    stats: RunStats,
    failures: Mutex<Vec<FileFailure>>,
}

impl ActiveRun<'_> {
    /// Destination of a site file: itself, or its mirror under the output dir.
    fn dest_for(&self, source: &Path) -> PathBuf {
        match self.output_dir {
            Some(out) => match source.strip_prefix(self.site_root) {
                Ok(rel) => out.join(rel),
                Err(_) => source.to_path_buf(),
            },
            None => source.to_path_buf(),
        }
    }

    /// Copies files the run does not compress to the output directory.
    fn pass_through_unhandled(&self, scan: &SiteScan) {
        if self.output_dir.is_none() {
            return;
        }
        for path in scan.skipped.iter().chain(&scan.other) {
            if let Err(e) = copy_atomic(path, &self.dest_for(path)) {
                tracing::warn!(path = %path.display(), "failed to copy file to output: {e}");
            }
        }
        if !scan.skipped.is_empty() {
            tracing::debug!(count = scan.skipped.len(), "passing through skipped media kinds");
        }
    }

    fn fail(&self, source: &Path, dest: &Path, reason: String) {
        tracing::warn!("Error processing {}: {reason}", source.display());
        self.stats.record_error();
        if dest != source {
            if let Err(e) = copy_atomic(source, dest) {
                tracing::warn!(path = %source.display(), "failed to pass original through: {e}");
            }
        }
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FileFailure {
                path: source.to_path_buf(),
                reason,
            });
    }

    /// Serves a cache hit by copying its artifact to `dest`.
    fn serve_hit(&self, source: &Path, dest: &Path, entry: &CacheEntry) {
        match self.store.copy_out(entry, dest) {
            Ok(_) => {
                tracing::debug!(path = %source.display(), digest = %entry.digest, "cache hit");
                self.stats
                    .record_cached(entry.original_size, entry.compressed_size);
            }
            Err(e) => self.fail(source, dest, e.to_string()),
        }
    }

    /// Dispatching and Draining: hashes every candidate on this thread,
    /// serves hits, and runs misses on the worker pool.
    ///
    /// Work is keyed by digest and extension, since the extension picks the
    /// output format. Returns the digests seen, for orphan pruning.
    fn dispatch_and_drain(
        &self,
        candidates: &[Candidate],
    ) -> Result<HashSet<ContentDigest>, RunError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_workers.max(1))
            .thread_name(|i| format!("mediapress-worker-{i}"))
            .build()
            .map_err(|e| RunError::WorkerPool(e.to_string()))?;

        let mut live = HashSet::with_capacity(candidates.len());
        let mut queued: HashSet<(ContentDigest, String)> = HashSet::new();
        let mut deferred: Vec<(&Candidate, ContentDigest, String)> = Vec::new();

        enter(RunPhase::Dispatching);
        pool.in_place_scope(|scope| {
            for candidate in candidates {
                let dest = self.dest_for(&candidate.path);
                let digest = match SourceHasher::hash_file(&candidate.path) {
                    Ok(digest) => digest,
                    Err(e) => {
                        self.fail(&candidate.path, &dest, e.to_string());
                        continue;
                    }
                };
                live.insert(digest);
                let ext = lowercase_ext(&candidate.path);
                if !queued.insert((digest, ext.clone())) {
                    // Same bytes and format already queued or served in this run.
                    deferred.push((candidate, digest, ext));
                    continue;
                }
                if let Some(entry) = self.store.lookup(&digest, &ext) {
                    self.serve_hit(&candidate.path, &dest, &entry);
                    continue;
                }
                let item = WorkItem {
                    source: candidate.path.clone(),
                    dest,
                    digest,
                    kind: candidate.kind,
                    ext,
                };
                scope.spawn(move |_| self.compress_one(item));
            }
            enter(RunPhase::Draining);
        });

        for (candidate, digest, ext) in deferred {
            let dest = self.dest_for(&candidate.path);
            match self.store.lookup(&digest, &ext) {
                Some(entry) => self.serve_hit(&candidate.path, &dest, &entry),
                // The leader failed, or a same-digest file with another
                // extension replaced its entry.
                None => self.compress_one(WorkItem {
                    source: candidate.path.clone(),
                    dest,
                    digest,
                    kind: candidate.kind,
                    ext,
                }),
            }
        }

        Ok(live)
    }

    /// Worker body: compress, cache, place.
    fn compress_one(&self, item: WorkItem) {
        let original_size = match std::fs::metadata(&item.source) {
            Ok(meta) => meta.len(),
            Err(e) => return self.fail(&item.source, &item.dest, e.to_string()),
        };

        let compressed = if original_size == 0 {
            CompressedOutput::Bytes(Vec::new())
        } else {
            match self.transcoders.compress(&item.source, item.kind, self.config) {
                Ok(output) => output,
                Err(e) => return self.fail(&item.source, &item.dest, e.to_string()),
            }
        };

        let stored = match &compressed {
            CompressedOutput::Bytes(bytes) => {
                self.store
                    .store_artifact(item.digest, item.kind, &item.ext, original_size, bytes)
            }
            CompressedOutput::File(file) => self.store.store_artifact_file(
                item.digest,
                item.kind,
                &item.ext,
                original_size,
                file.path(),
            ),
        };
        let entry = match stored {
            Ok(entry) => entry,
            Err(e) => return self.fail(&item.source, &item.dest, e.to_string()),
        };
        drop(compressed);
        if let Err(e) = self.store.copy_out(&entry, &item.dest) {
            return self.fail(&item.source, &item.dest, e.to_string());
        }

        let compressed_size = entry.compressed_size;
        if compressed_size > original_size {
            tracing::debug!(
                path = %item.source.display(),
                original_size,
                compressed_size,
                "compressed output is larger than the original"
            );
        }


        self.stats.record_processed(original_size, compressed_size);
        let name = item
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!("{}", reduction_line(&name, original_size, compressed_size));
    }
}

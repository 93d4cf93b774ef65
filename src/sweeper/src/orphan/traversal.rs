//! Two-phase discovery of every file under a location.
//!
//! The coordinator lists the top of the tree sequentially under a small
//! [`TraversalBudget`]. Directories that are too wide, or that sit below the
//! depth budget, are deferred and fanned out to worker tasks that run the same
//! [`walk`] with the worker budget. A worker that still has to defer fails the
//! whole run: a truncated listing would make live files look like orphans.

use crate::orphan::error::{OrphanError, OrphanResult};
use crate::orphan::io::{DirEntry, DirectoryLister, is_hidden};
use chrono::{DateTime, Utc};
use common::config::OrphanCleanupConfig;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Depth cap for worker walks. Reaching it means a cycle or a pathological tree.
pub const WORKER_MAX_DEPTH: usize = 2000;

/// Limits for one walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalBudget {
    /// Directory levels that may still be listed, counting the walk roots.
    pub max_depth: usize,
    /// More direct subdirectories than this defers all of them.
    pub max_direct_subdirs: usize,
}

impl TraversalBudget {
    pub const fn new(max_depth: usize, max_direct_subdirs: usize) -> Self {
        Self {
            max_depth,
            max_direct_subdirs,
        }
    }

    /// Budget used by worker walks; it never defers for width.
    pub const fn worker() -> Self {
        Self::new(WORKER_MAX_DEPTH, usize::MAX)
    }
}

/// Budget for the sequential listing on the coordinator.
impl From<&OrphanCleanupConfig> for TraversalBudget {
    fn from(config: &OrphanCleanupConfig) -> Self {
        Self::new(config.max_listing_depth, config.max_direct_subdirs)
    }
}

impl Default for TraversalBudget {
    fn default() -> Self {
        Self::new(3, 10)
    }
}

/// A file found by the traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActualFile {
    pub path: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub size_bytes: u64,
}

impl From<DirEntry> for ActualFile {
    fn from(entry: DirEntry) -> Self {
        Self {
            path: entry.path,
            last_modified: entry.last_modified,
            size_bytes: entry.size_bytes,
        }
    }
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub matching_files: Vec<ActualFile>,
    /// Directories left unlisted because the budget ran out along their branch.
    pub pending_subtrees: Vec<String>,
    pub directories_listed: usize,
}

/// Files strictly older than `cutoff`. Unknown modification times never match.
pub fn older_than(cutoff: DateTime<Utc>) -> impl Fn(&DirEntry) -> bool + Clone + Send + Sync {
    move |entry| entry.last_modified.is_some_and(|ts| ts < cutoff)
}

/// Walk every root under `budget`, collecting files accepted by `predicate`.
///
/// A directory reached with no depth left is deferred without being listed,
/// so each directory is listed at most once across both phases. Hidden
/// entries are skipped. Any listing error aborts the walk.
pub async fn walk<P>(
    lister: &dyn DirectoryLister,
    roots: impl IntoIterator<Item = String>,
    budget: TraversalBudget,
    predicate: P,
) -> OrphanResult<WalkOutcome>
where
    P: Fn(&DirEntry) -> bool,
{
    let mut outcome = WalkOutcome::default();
    let mut stack: Vec<(String, usize)> = roots
        .into_iter()
        .map(|root| (root, budget.max_depth))
        .collect();

    while let Some((dir, depth)) = stack.pop() {
        if depth == 0 {
            tracing::trace!(path = %dir, "Depth budget exhausted, deferring directory");
            outcome.pending_subtrees.push(dir);
            continue;
        }

        let entries = lister.list_directory(&dir).await?;
        outcome.directories_listed += 1;

        let mut subdirs = Vec::new();
        for entry in entries {
            if is_hidden(entry.name()) {
                continue;
            }
            if entry.is_directory {
                subdirs.push(entry.path);
            } else if predicate(&entry) {
                outcome.matching_files.push(entry.into());
            }
        }

        if subdirs.len() > budget.max_direct_subdirs {
            tracing::debug!(
                path = %dir,
                subdirs = subdirs.len(),
                max_direct_subdirs = budget.max_direct_subdirs,
                "Too many direct subdirectories, deferring all of them"
            );
            outcome.pending_subtrees.extend(subdirs);
            continue;
        }

        stack.extend(subdirs.into_iter().map(|subdir| (subdir, depth - 1)));
    }

    Ok(outcome)
}

/// Split `items` round-robin into `min(items.len(), parallelism)` groups.
pub fn partition<T>(items: Vec<T>, parallelism: usize) -> Vec<Vec<T>> {
    let groups = items.len().min(parallelism.max(1));
    let mut partitions: Vec<Vec<T>> = (0..groups).map(|_| Vec::new()).collect();
    for (idx, item) in items.into_iter().enumerate() {
        partitions[idx % groups].push(item);
    }
    partitions
}

/// Fully resolve deferred subtrees on up to `parallelism` worker tasks.
///
/// Workers share nothing but the lister; each returns its own file list and
/// the coordinator concatenates them in completion order. The first fatal
/// error aborts the remaining workers.
pub async fn walk_distributed(
    lister: Arc<dyn DirectoryLister>,
    pending_subtrees: Vec<String>,
    cutoff: DateTime<Utc>,
    parallelism: usize,
) -> OrphanResult<Vec<ActualFile>> {
    if pending_subtrees.is_empty() {
        return Ok(Vec::new());
    }

    let groups = partition(pending_subtrees, parallelism);
    tracing::info!(workers = groups.len(), "Listing deferred subtrees");

    let mut join_set = JoinSet::new();
    for (worker, group) in groups.into_iter().enumerate() {
        let lister = lister.clone();
        join_set.spawn(async move { list_subtrees(worker, lister, group, cutoff).await });
    }

    let mut files = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        let worker_files = joined.map_err(|e| OrphanError::Worker(e.to_string()))??;
        files.extend(worker_files);
    }

    Ok(files)
}

async fn list_subtrees(
    worker: usize,
    lister: Arc<dyn DirectoryLister>,
    subtrees: Vec<String>,
    cutoff: DateTime<Utc>,
) -> OrphanResult<Vec<ActualFile>> {
    let budget = TraversalBudget::worker();
    let outcome = walk(lister.as_ref(), subtrees, budget, older_than(cutoff)).await?;

    if !outcome.pending_subtrees.is_empty() {
        tracing::error!(
            worker,
            deferred = outcome.pending_subtrees.len(),
            max_depth = budget.max_depth,
            "Worker reached the maximum listing depth"
        );
        return Err(OrphanError::TraversalDepthExceeded {
            max_depth: budget.max_depth,
        });
    }

    tracing::debug!(
        worker,
        directories_listed = outcome.directories_listed,
        files = outcome.matching_files.len(),
        "Worker finished listing"
    );
    Ok(outcome.matching_files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryTree;
    use chrono::Duration;
    use std::collections::BTreeSet;

    fn old() -> DateTime<Utc> {
        Utc::now() - Duration::days(10)
    }

    fn paths(files: &[ActualFile]) -> BTreeSet<String> {
        files.iter().map(|f| f.path.clone()).collect()
    }

    /// /t with `width` partitions, each holding `files` files two levels down.
    fn wide_tree(width: usize, files: usize) -> InMemoryTree {
        let mut tree = InMemoryTree::new("/t");
        let ts = old();
        tree.add_file("/t/metadata/v1.metadata.json", ts);
        for p in 0..width {
            for f in 0..files {
                tree.add_file(&format!("/t/data/p={p}/bucket=0/{f}.parquet"), ts);
            }
        }
        tree
    }

    #[tokio::test]
    async fn test_shallow_tree_needs_no_workers() {
        let mut tree = InMemoryTree::new("/t");
        tree.add_file("/t/data/a.parquet", old());
        tree.add_file("/t/metadata/v1.metadata.json", old());

        let outcome = walk(
            &tree,
            ["/t".to_string()],
            TraversalBudget::default(),
            |_: &DirEntry| true,
        )
        .await
        .unwrap();

        assert!(outcome.pending_subtrees.is_empty());
        assert_eq!(outcome.directories_listed, 3);
        assert_eq!(
            paths(&outcome.matching_files),
            BTreeSet::from([
                "/t/data/a.parquet".to_string(),
                "/t/metadata/v1.metadata.json".to_string()
            ])
        );
    }

    #[tokio::test]
    async fn test_wide_directory_defers_all_children() {
        let tree = wide_tree(11, 1);

        let outcome = walk(
            &tree,
            ["/t".to_string()],
            TraversalBudget::new(3, 10),
            |_: &DirEntry| true,
        )
        .await
        .unwrap();

        assert_eq!(outcome.pending_subtrees.len(), 11);
        assert!(
            outcome
                .pending_subtrees
                .iter()
                .all(|p| p.starts_with("/t/data/p="))
        );
        // /t/data was listed, none of its children were
        assert!(!tree.listed().iter().any(|p| p.starts_with("/t/data/p=")));
        assert_eq!(
            paths(&outcome.matching_files),
            BTreeSet::from(["/t/metadata/v1.metadata.json".to_string()])
        );
    }

    #[tokio::test]
    async fn test_depth_budget_defers_without_listing() {
        let mut tree = InMemoryTree::new("/t");
        tree.add_file("/t/a/b/c/d.parquet", old());
        tree.add_file("/t/a/top.parquet", old());

        let outcome = walk(
            &tree,
            ["/t".to_string()],
            TraversalBudget::new(2, 10),
            |_: &DirEntry| true,
        )
        .await
        .unwrap();

        assert_eq!(outcome.pending_subtrees, vec!["/t/a/b".to_string()]);
        assert_eq!(tree.listed(), vec!["/t".to_string(), "/t/a".to_string()]);
        assert_eq!(
            paths(&outcome.matching_files),
            BTreeSet::from(["/t/a/top.parquet".to_string()])
        );
    }

    #[tokio::test]
    async fn test_hidden_entries_are_skipped() {
        let mut tree = InMemoryTree::new("/t");
        tree.add_file("/t/data/a.parquet", old());
        tree.add_file("/t/data/.a.parquet.crc", old());
        tree.add_file("/t/_temporary/0/part-0.parquet", old());

        let outcome = walk(
            &tree,
            ["/t".to_string()],
            TraversalBudget::default(),
            |_: &DirEntry| true,
        )
        .await
        .unwrap();

        assert_eq!(
            paths(&outcome.matching_files),
            BTreeSet::from(["/t/data/a.parquet".to_string()])
        );
        assert!(!tree.listed().iter().any(|p| p.contains("_temporary")));
    }

    #[tokio::test]
    async fn test_age_predicate_is_strict() {
        let cutoff = Utc::now() - Duration::days(3);
        let mut tree = InMemoryTree::new("/t");
        tree.add_file("/t/old.parquet", cutoff - Duration::seconds(1));
        tree.add_file("/t/exact.parquet", cutoff);
        tree.add_file("/t/new.parquet", Utc::now());
        tree.add_file_without_mtime("/t/unknown.parquet");

        let outcome = walk(
            &tree,
            ["/t".to_string()],
            TraversalBudget::default(),
            older_than(cutoff),
        )
        .await
        .unwrap();

        assert_eq!(
            paths(&outcome.matching_files),
            BTreeSet::from(["/t/old.parquet".to_string()])
        );
    }

    #[tokio::test]
    async fn test_listing_error_is_fatal() {
        let mut tree = wide_tree(2, 1);
        tree.fail_listing("/t/data/p=1");

        let result = walk(
            &tree,
            ["/t".to_string()],
            TraversalBudget::default(),
            |_: &DirEntry| true,
        )
        .await;

        assert!(matches!(result, Err(OrphanError::Listing { path, .. }) if path == "/t/data/p=1"));
    }

    #[test]
    fn test_coordinator_budget_from_config() {
        let config = OrphanCleanupConfig {
            max_direct_subdirs: 25,
            ..Default::default()
        };
        assert_eq!(TraversalBudget::from(&config), TraversalBudget::new(3, 25));
        assert_eq!(
            TraversalBudget::from(&OrphanCleanupConfig::default()),
            TraversalBudget::default()
        );
    }

    #[test]
    fn test_partition_never_exceeds_items() {
        let groups = partition(vec![1, 2, 3], 10);
        assert_eq!(groups.len(), 3);

        let groups = partition((0..10).collect(), 4);
        assert_eq!(groups.len(), 4);
        assert_eq!(groups.iter().map(Vec::len).sum::<usize>(), 10);
        assert_eq!(groups[0], vec![0, 4, 8]);

        assert!(partition(Vec::<u8>::new(), 4).is_empty());
    }

    #[tokio::test]
    async fn test_split_invariance() {
        let tree = Arc::new(wide_tree(15, 3));
        let cutoff = Utc::now();

        let single_phase = walk(
            tree.as_ref(),
            ["/t".to_string()],
            TraversalBudget::worker(),
            older_than(cutoff),
        )
        .await
        .unwrap();
        assert!(single_phase.pending_subtrees.is_empty());
        let expected = paths(&single_phase.matching_files);
        assert_eq!(expected.len(), 15 * 3 + 1);

        for budget in [
            TraversalBudget::new(1, 10),
            TraversalBudget::new(2, 2),
            TraversalBudget::new(3, 10),
            TraversalBudget::new(5, 100),
        ] {
            let lister: Arc<dyn DirectoryLister> = tree.clone();
            let bounded = walk(lister.as_ref(), ["/t".to_string()], budget, older_than(cutoff))
                .await
                .unwrap();
            let rest = walk_distributed(lister, bounded.pending_subtrees, cutoff, 4)
                .await
                .unwrap();

            let mut all = bounded.matching_files;
            all.extend(rest);
            assert_eq!(all.len(), expected.len(), "duplicates with {budget:?}");
            assert_eq!(paths(&all), expected, "file set differs with {budget:?}");
        }
    }

    #[tokio::test]
    async fn test_worker_depth_cap_is_fatal() {
        let mut tree = InMemoryTree::new("/t");
        let mut path = String::from("/t");
        for level in 0..=WORKER_MAX_DEPTH {
            path.push_str(&format!("/d{level}"));
            tree.add_dir(&path);
        }
        path.push_str("/deep.parquet");
        tree.add_file(&path, old());

        let result = walk_distributed(Arc::new(tree), vec!["/t".to_string()], Utc::now(), 2).await;

        assert!(matches!(
            result,
            Err(OrphanError::TraversalDepthExceeded { max_depth: WORKER_MAX_DEPTH })
        ));
    }

    #[tokio::test]
    async fn test_worker_listing_error_is_fatal() {
        let mut tree = wide_tree(12, 1);
        tree.fail_listing("/t/data/p=7/bucket=0");

        let result = walk_distributed(
            Arc::new(tree),
            (0..12).map(|p| format!("/t/data/p={p}")).collect(),
            Utc::now(),
            3,
        )
        .await;

        assert!(matches!(result, Err(OrphanError::Listing { .. })));
    }
}

//! Directory listings synthesized from prefix+delimiter enumeration.
//!
//! A flat store answers a listing with two channels: keys directly under the
//! prefix, and common prefixes grouping everything that continues past the
//! delimiter. The first become file names, the second directory names. The
//! directory's own marker shows up as a direct key and is never a child.

use std::collections::HashSet;
use std::pin::pin;

use futures::stream::{self, Stream, TryStreamExt};
use tracing::trace;

use crate::contract::FileKind;
use crate::error::StoreError;
use crate::store::{FlatStore, ListPage, ListRequest, DELIMITER};

/// One immediate child of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: String,
    pub kind: FileKind,
}

/// The immediate children under a prefix, recomputed on every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryView {
    pub prefix: String,
    pub entries: Vec<ChildEntry>,
}

impl DirectoryView {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn into_names(self) -> Vec<String> {
        self.entries.into_iter().map(|entry| entry.name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All pages of a listing, following continuation tokens until the store
/// reports none.
pub fn pages<'a, S>(
    store: &'a S,
    prefix: &'a str,
) -> impl Stream<Item = Result<ListPage, StoreError>> + Send + 'a
where
    S: FlatStore + ?Sized,
{
    stream::try_unfold(Some(None), move |state| next_page(store, prefix, state))
}

/// `state` is `None` once the last page has been fetched, otherwise the
/// continuation token to resume from.
async fn next_page<S>(
    store: &S,
    prefix: &str,
    state: Option<Option<String>>,
) -> Result<Option<(ListPage, Option<Option<String>>)>, StoreError>
where
    S: FlatStore + ?Sized,
{
    let Some(continuation) = state else {
        return Ok(None);
    };
    let page = store
        .list_page(ListRequest {
            prefix,
            delimiter: DELIMITER,
            continuation,
        })
        .await?;
    let next = page.continuation.clone().map(Some);
    Ok(Some((page, next)))
}

/// Lists the immediate children of `prefix`.
///
/// `prefix` is either empty (the root) or ends with the delimiter. Entries
/// keep the store's key order, with the two channels interleaved by key.
pub async fn read_directory<S>(store: &S, prefix: &str) -> Result<DirectoryView, StoreError>
where
    S: FlatStore + ?Sized,
{
    let mut view = DirectoryView {
        prefix: prefix.to_owned(),
        entries: Vec::new(),
    };
    let mut seen = HashSet::new();
    let mut pages = pin!(pages(store, prefix));
    let mut page_count = 0usize;
    while let Some(page) = pages.try_next().await? {
        page_count += 1;
        for (key, kind) in merge_channels(&page) {
            let Some(name) = child_name(prefix, key, kind) else {
                continue;
            };
            if seen.insert(name.to_owned()) {
                view.entries.push(ChildEntry {
                    name: name.to_owned(),
                    kind,
                });
            }
        }
    }
    trace!(prefix, pages = page_count, children = view.entries.len(), "listed directory");
    Ok(view)
}

/// Interleaves both channels of a page by raw key.
fn merge_channels(page: &ListPage) -> Vec<(&str, FileKind)> {
    let mut files = page.keys.iter().peekable();
    let mut directories = page.common_prefixes.iter().peekable();
    let mut merged = Vec::with_capacity(page.keys.len() + page.common_prefixes.len());
    loop {
        let take_file = match (files.peek(), directories.peek()) {
            (Some(file), Some(directory)) => file <= directory,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        if take_file {
            if let Some(file) = files.next() {
                merged.push((file.as_str(), FileKind::File));
            }
        } else if let Some(directory) = directories.next() {
            merged.push((directory.as_str(), FileKind::Directory));
        }
    }
    merged
}

/// The child name of `key` below `prefix`, or `None` for the directory's own
/// marker.
fn child_name<'k>(prefix: &str, key: &'k str, kind: FileKind) -> Option<&'k str> {
    let rest = key.strip_prefix(prefix)?;
    let name = match kind {
        FileKind::Directory => rest.strip_suffix(DELIMITER).unwrap_or(rest),
        _ => rest,
    };
    let is_own_marker = name.is_empty() || (kind != FileKind::Directory && rest == "/");
    (!is_own_marker).then_some(name)
}

// Copyright 2016 LambdaStack All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Client Documentation
//!
//! Lazy, abortable sequences over the listing APIs (§4.6). The teacher
//! returned whole pages, never an iterator; this crate models listings as
//! `futures::Stream`s instead, in the async-generator style the rest of
//! the retrieval pack reaches for (`futures::stream::try_unfold`).
//!
//! Every stream built here yields either an item or a terminal error, and
//! stops issuing page requests the moment a caller drops it or calls
//! `AbortHandle::abort` — cancellation is observed within the time of the
//! current in-flight page, plus zero additional pages (§9).

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, Stream};

use crate::aws::errors::s3_error::S3Error;

/// One page of results from a listing call: the items plus enough of the
/// remote's continuation state to decide whether (and how) to fetch the
/// next page (§3 data model's "listing cursor").
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub is_truncated: bool,
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>, is_truncated: bool) -> PageResult<T> {
        PageResult { items, next_cursor, is_truncated }
    }
}

/// A cooperative cancellation flag shared between a stream and its caller.
/// Cloning shares the same underlying flag; calling `abort` on any clone
/// stops the stream from issuing its next page fetch.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> AbortHandle {
        AbortHandle(Arc::new(AtomicBool::new(false)))
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

struct PaginatorState<T, F> {
    buffer: VecDeque<T>,
    cursor: Option<String>,
    done: bool,
    abort: AbortHandle,
    fetch: F,
}

/// Builds a lazy, abortable `Stream` out of a page-fetching closure.
/// `fetch` is called with the previous page's cursor (`None` for the first
/// page) and must return the next page or a terminal error. Returns the
/// stream paired with an `AbortHandle` the caller can use to stop it
/// without dropping it outright (useful when the stream is owned by a
/// spawned task).
pub fn paginate<T, F, Fut>(fetch: F) -> (impl Stream<Item = Result<T, S3Error>>, AbortHandle)
where
    T: Send + 'static,
    F: FnMut(Option<String>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<PageResult<T>, S3Error>> + Send,
{
    let abort = AbortHandle::new();
    let initial = PaginatorState { buffer: VecDeque::new(), cursor: None, done: false, abort: abort.clone(), fetch };

    let s = stream::try_unfold(initial, |mut state| async move {
        loop {
            if state.abort.is_aborted() {
                return Ok(None);
            }
            if let Some(item) = state.buffer.pop_front() {
                return Ok(Some((item, state)));
            }
            if state.done {
                return Ok(None);
            }
            let page = (state.fetch)(state.cursor.clone()).await?;
            state.cursor = page.next_cursor;
            state.done = !page.is_truncated;
            state.buffer.extend(page.items);
            if state.buffer.is_empty() && state.done {
                return Ok(None);
            }
        }
    });

    (s, abort)
}

/// One entry of a non-recursive object listing (§4.6): either a real
/// object or a synthetic `CommonPrefixes` entry (size 0, trailing `/`)
/// standing in for everything under that prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEntry<T> {
    Object(T),
    CommonPrefix(String),
}

/// Sums the part sizes of one in-progress multipart upload by iterating
/// its `ListParts` pages, bounded by `page_size` per page (default 1000
/// per §4.6). Used by the incomplete-uploads iterator's optional
/// per-upload size aggregation — an explicit, bounded nested iteration,
/// never unbounded recursion.
pub async fn aggregate_part_sizes<F, Fut>(mut list_parts_page: F) -> Result<u64, S3Error>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<PageResult<u64>, S3Error>>,
{
    let mut total = 0u64;
    let mut cursor = None;
    loop {
        let page = list_parts_page(cursor).await?;
        total += page.items.iter().sum::<u64>();
        if !page.is_truncated {
            break;
        }
        cursor = page.next_cursor;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Mutex;

    #[tokio::test]
    async fn paginate_yields_every_item_across_pages_in_order() {
        let pages: Arc<Mutex<Vec<Vec<u32>>>> =
            Arc::new(Mutex::new(vec![vec![1, 2, 3], vec![4, 5], vec![6]]));
        let (stream, _abort) = paginate(move |_cursor| {
            let pages = pages.clone();
            async move {
                let mut pages = pages.lock().unwrap();
                if pages.is_empty() {
                    return Ok(PageResult::new(Vec::new(), None, false));
                }
                let items = pages.remove(0);
                let is_truncated = !pages.is_empty();
                Ok(PageResult::new(items, None, is_truncated))
            }
        });

        let collected: Vec<u32> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(collected, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn paginate_stops_at_the_first_error() {
        let calls = Arc::new(Mutex::new(0u32));
        let (stream, _abort) = paginate(move |_cursor| {
            let calls = calls.clone();
            async move {
                let mut calls = calls.lock().unwrap();
                *calls += 1;
                if *calls == 1 {
                    Ok(PageResult::new(vec![1], None, true))
                } else {
                    Err(S3Error::invalid_argument("boom"))
                }
            }
        });

        let collected: Vec<Result<u32, S3Error>> = stream.collect().await;
        assert_eq!(collected.len(), 2);
        assert!(collected[0].is_ok());
        assert!(collected[1].is_err());
    }

    #[tokio::test]
    async fn abort_handle_stops_further_page_fetches() {
        let fetch_count = Arc::new(Mutex::new(0u32));
        let fetch_count_clone = fetch_count.clone();
        let (stream, abort) = paginate(move |_cursor| {
            let fetch_count = fetch_count_clone.clone();
            async move {
                let mut n = fetch_count.lock().unwrap();
                *n += 1;
                Ok(PageResult::new(vec![*n], None, true))
            }
        });

        abort.abort();
        let collected: Vec<Result<u32, S3Error>> = stream.collect().await;
        assert!(collected.is_empty());
        assert_eq!(*fetch_count.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn aggregate_part_sizes_sums_across_bounded_pages() {
        let total = aggregate_part_sizes(|cursor| async move {
            match cursor {
                None => Ok(PageResult::new(vec![5, 5], Some("next".to_string()), true)),
                Some(_) => Ok(PageResult::new(vec![3], None, false)),
            }
        })
        .await
        .unwrap();
        assert_eq!(total, 13);
    }
}

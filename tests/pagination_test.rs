//! Integration-level coverage for the lazy, abortable listing iterators
//! (§4.6), driven purely through fake page-fetchers so no network or
//! credentials are required.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use s3_core::aws::errors::S3Error;
use s3_core::aws::s3::pagination::{aggregate_part_sizes, paginate, PageResult};

#[tokio::test]
async fn listing_stream_survives_many_small_pages_in_order() {
    let remaining: Arc<std::sync::Mutex<Vec<Vec<&'static str>>>> = Arc::new(std::sync::Mutex::new(vec![
        vec!["a/b", "a/c"],
        vec!["a/d"],
        vec!["b"],
    ]));

    let (stream, _abort) = paginate(move |_cursor| {
        let remaining = remaining.clone();
        async move {
            let mut pages = remaining.lock().unwrap();
            if pages.is_empty() {
                return Ok(PageResult::new(Vec::new(), None, false));
            }
            let page = pages.remove(0);
            let is_truncated = !pages.is_empty();
            Ok(PageResult::new(page, None, is_truncated))
        }
    });

    let keys: Vec<&str> = stream.map(|item| item.unwrap()).collect().await;
    assert_eq!(keys, vec!["a/b", "a/c", "a/d", "b"]);
}

#[tokio::test]
async fn listing_stream_is_abortable_mid_page() {
    let fetch_count = Arc::new(AtomicU32::new(0));
    let fetch_count_clone = fetch_count.clone();

    let (stream, abort) = paginate(move |_cursor| {
        let fetch_count = fetch_count_clone.clone();
        async move {
            fetch_count.fetch_add(1, Ordering::SeqCst);
            Ok(PageResult::new(vec![1u32, 2, 3], Some("next".to_string()), true))
        }
    });

    // Abort before the stream is ever polled: the abort protocol guarantees
    // zero additional page fetches once observed, not just zero items.
    abort.abort();
    let items: Vec<Result<u32, S3Error>> = stream.collect().await;
    assert!(items.is_empty());
    assert_eq!(fetch_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn listing_stream_terminates_on_first_error_without_losing_prior_items() {
    let call = Arc::new(AtomicU32::new(0));
    let (stream, _abort) = paginate(move |_cursor| {
        let call = call.clone();
        async move {
            let n = call.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(PageResult::new(vec!["first"], Some("cursor-1".to_string()), true))
            } else {
                Err(S3Error::invalid_argument("listing failed"))
            }
        }
    });

    let items: Vec<Result<&str, S3Error>> = stream.collect().await;
    assert_eq!(items.len(), 2);
    assert_eq!(*items[0].as_ref().unwrap(), "first");
    assert!(items[1].is_err());
}

#[tokio::test]
async fn incomplete_upload_size_aggregation_sums_every_bounded_page() {
    let page_two_fetched = Arc::new(AtomicU32::new(0));
    let page_two_fetched_clone = page_two_fetched.clone();

    let total = aggregate_part_sizes(move |cursor| {
        let page_two_fetched = page_two_fetched_clone.clone();
        async move {
            match cursor {
                None => Ok(PageResult::new(vec![5 * 1024 * 1024, 5 * 1024 * 1024], Some("marker-1000".to_string()), true)),
                Some(marker) => {
                    assert_eq!(marker, "marker-1000");
                    page_two_fetched.fetch_add(1, Ordering::SeqCst);
                    Ok(PageResult::new(vec![2 * 1024 * 1024], None, false))
                }
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(total, 12 * 1024 * 1024);
    assert_eq!(page_two_fetched.load(Ordering::SeqCst), 1);
}

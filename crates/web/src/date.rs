//! The `Date` response header, formatted once per refresh interval instead of per response.

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::HeaderValue;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(800);

/// Keeps an RFC 9110 `Date` value current from a background task.
///
/// Must be created inside a tokio runtime; the task stops when the service is dropped.
pub struct DateService {
    current: Arc<ArcSwap<Bytes>>,
    handle: JoinHandle<()>,
}

impl fmt::Debug for DateService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DateService").field("current", &self.current.load()).finish_non_exhaustive()
    }
}

fn now() -> Bytes {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    Bytes::from_owner(buf)
}

impl DateService {
    pub fn new() -> Self {
        Self::with_refresh_interval(DEFAULT_REFRESH_INTERVAL)
    }

    pub fn with_refresh_interval(refresh_interval: Duration) -> Self {
        let current = Arc::new(ArcSwap::from_pointee(now()));
        let updated = Arc::clone(&current);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(refresh_interval).await;
                updated.store(Arc::new(now()));
            }
        });

        Self { current, handle }
    }

    pub fn header_value(&self) -> HeaderValue {
        let date = Bytes::clone(&self.current.load());
        // SAFETY: faf_http_date only writes visible ASCII and spaces
        unsafe { HeaderValue::from_maybe_shared_unchecked(date) }
    }
}

impl Default for DateService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DateService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn formats_an_http_date() {
        let service = DateService::new();
        let value = service.header_value();
        let text = value.to_str().unwrap();

        assert_eq!(text.len(), 29);
        assert!(text.ends_with(" GMT"));
        assert_eq!(&text[3..5], ", ");
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_in_the_background() {
        let service = DateService::with_refresh_interval(Duration::from_millis(10));
        let first = service.header_value();
        tokio::time::sleep(Duration::from_millis(25)).await;
        // the value is still a valid date after refreshes
        assert_eq!(service.header_value().len(), first.len());
    }
}

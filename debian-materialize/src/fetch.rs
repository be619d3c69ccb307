// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository content fetching.

[RepositoryFetcher] is the transport seam: resolution only needs "bytes of
a URL" and "file downloaded from a URL", so alternate transports (or test
doubles) implement this trait. [HttpFetcher] is the production
implementation over reqwest.

Neither operation performs conditional requests or caching, and no content
digests are verified.
*/

use {
    crate::{
        error::{MaterializeError, Result},
        urlsplit,
    },
    async_trait::async_trait,
    std::{
        future::Future,
        path::{Path, PathBuf},
        time::Duration,
    },
    tokio::io::AsyncWriteExt,
};

/// Attempts made before a fetch is abandoned.
pub const FETCH_ATTEMPTS: usize = 3;

const INDEX_CONNECT_TIMEOUT: Duration = Duration::from_secs(7);
const INDEX_READ_TIMEOUT: Duration = Duration::from_secs(5);
const ARTIFACT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const ARTIFACT_READ_TIMEOUT: Duration = Duration::from_secs(20);

/// Generic mechanism for obtaining repository content.
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// GET a URL into memory.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;

    /// GET a URL into `{directory}/{file name of the URL}`, creating the
    /// directory if missing and overwriting any existing file.
    async fn fetch_file(&self, url: &str, directory: &Path) -> Result<PathBuf>;
}

/// Run a fallible fetch operation up to [FETCH_ATTEMPTS] times.
///
/// There is no backoff between attempts. The final attempt's error is
/// wrapped in [MaterializeError::FetchFailed].
pub async fn with_retries<T, F, Fut>(url: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt >= FETCH_ATTEMPTS => {
                return Err(MaterializeError::FetchFailed {
                    url: url.to_string(),
                    attempts: attempt,
                    source: Box::new(error),
                });
            }
            Err(error) => {
                log::debug!("retrying {} after error: {}", url, error);
            }
        }
    }
}

/// Repository fetcher over HTTP(S).
///
/// Redirects are followed transparently. Index fetches use short timeouts;
/// artifact downloads, which move whole `.deb` files, get longer ones.
pub struct HttpFetcher {
    index_client: reqwest::Client,
    artifact_client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            index_client: reqwest::Client::builder()
                .connect_timeout(INDEX_CONNECT_TIMEOUT)
                .build()?,
            artifact_client: reqwest::Client::builder()
                .connect_timeout(ARTIFACT_CONNECT_TIMEOUT)
                .build()?,
        })
    }

    async fn fetch_bytes_once(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self
            .index_client
            .get(url)
            .send()
            .await?
            .error_for_status()?;

        let mut body = Vec::new();
        while let Some(chunk) = next_chunk(&mut response, url, INDEX_READ_TIMEOUT).await? {
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }

    async fn fetch_file_once(&self, url: &str, directory: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|e| MaterializeError::IoPath(directory.display().to_string(), e))?;

        let target = directory.join(urlsplit::file_name(url)?);

        let mut response = self
            .artifact_client
            .get(url)
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(&target)
            .await
            .map_err(|e| MaterializeError::IoPath(target.display().to_string(), e))?;

        while let Some(chunk) = next_chunk(&mut response, url, ARTIFACT_READ_TIMEOUT).await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| MaterializeError::IoPath(target.display().to_string(), e))?;
        }

        file.flush()
            .await
            .map_err(|e| MaterializeError::IoPath(target.display().to_string(), e))?;

        Ok(target)
    }
}

async fn next_chunk(
    response: &mut reqwest::Response,
    url: &str,
    read_timeout: Duration,
) -> Result<Option<bytes::Bytes>> {
    match tokio::time::timeout(read_timeout, response.chunk()).await {
        Ok(chunk) => Ok(chunk?),
        Err(_) => Err(MaterializeError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("read of {} timed out", url),
        ))),
    }
}

#[async_trait]
impl RepositoryFetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        with_retries(url, || self.fetch_bytes_once(url)).await
    }

    async fn fetch_file(&self, url: &str, directory: &Path) -> Result<PathBuf> {
        with_retries(url, || self.fetch_file_once(url, directory)).await
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    async fn flaky(counter: &AtomicUsize, failures: usize) -> Result<&'static str> {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);

        if attempt < failures {
            Err(MaterializeError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "flaky",
            )))
        } else {
            Ok("body")
        }
    }

    #[tokio::test]
    async fn third_attempt_succeeds() {
        let counter = AtomicUsize::new(0);

        let body = with_retries("http://x/y", || flaky(&counter, 2)).await.unwrap();

        assert_eq!(body, "body");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let counter = AtomicUsize::new(0);

        let result = with_retries("http://x/y", || flaky(&counter, 100)).await;

        assert_eq!(counter.load(Ordering::SeqCst), FETCH_ATTEMPTS);
        match result {
            Err(MaterializeError::FetchFailed { url, attempts, .. }) => {
                assert_eq!(url, "http://x/y");
                assert_eq!(attempts, FETCH_ATTEMPTS);
            }
            other => panic!("expected FetchFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let counter = AtomicUsize::new(0);

        with_retries("http://x/y", || flaky(&counter, 0)).await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

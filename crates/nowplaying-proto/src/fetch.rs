//! ICY "now playing" lookup.
//!
//! One call = one short-lived negotiation with the station: `GET` with
//! `Icy-MetaData: 1`, follow at most `max_redirects` hops by hand, read the
//! first in-band metadata block, hang up.
//!
//! Design notes
//! ─────────────
//! • Redirects are followed in a loop rather than by reqwest so the hop limit
//!   and the body drain between hops are ours.
//! • The client keeps no idle connections.  Every hop's socket is closed once
//!   its response is dropped, whether we finished reading it or not.
//! • The whole lookup runs under a single `tokio::time::timeout`; when it
//!   fires the future (and with it the response) is dropped.
//! • Nothing here is retried.  Callers poll.

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, LOCATION};
use reqwest::{Client, Response, Url};
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::error::{FailureKind, FetchError};
use crate::icy::{self, FrameParser, Progress};

/// Most of a redirect body we read before dropping the connection anyway.
const REDIRECT_DRAIN_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct IcyFetcher {
    client: Client,
    config: FetchConfig,
}

impl IcyFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(0)
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .default_headers({
                let mut h = HeaderMap::new();
                h.insert(icy::METADATA_REQUEST_HEADER, HeaderValue::from_static("1"));
                h
            })
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Current `StreamTitle` of the stream at `url`.
    ///
    /// `None` covers everything from "stream has no metadata" to "station is
    /// down"; the reason is only logged.
    pub async fn fetch_title(&self, url: &str) -> Option<String> {
        match self.try_fetch_title(url).await {
            Ok(title) if title.is_empty() => {
                debug!("icy: {} sent an empty StreamTitle", url);
                None
            }
            Ok(title) => {
                debug!("icy: {} → {:?}", url, title);
                Some(title)
            }
            Err(e) => {
                let kind = e.kind();
                if kind == FailureKind::Protocol {
                    debug!("icy: no title for {} [{}]: {}", url, kind.label(), e);
                } else {
                    warn!("icy: no title for {} [{}]: {}", url, kind.label(), e);
                }
                None
            }
        }
    }

    /// Same as [`fetch_title`](Self::fetch_title) but keeps the failure
    /// reason.  An empty `StreamTitle` comes back as `Ok("")`.
    pub async fn try_fetch_title(&self, url: &str) -> Result<String, FetchError> {
        let budget = self.config.timeout();
        match tokio::time::timeout(budget, self.resolve(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(budget)),
        }
    }

    async fn resolve(&self, url: &str) -> Result<String, FetchError> {
        let mut url = parse_stream_url(url)?;
        let mut redirects: u8 = 0;

        loop {
            debug!("icy: GET {} (hop {})", url, redirects);
            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();

            if status.is_redirection() {
                if let Some(next) = redirect_target(&response)? {
                    if redirects >= self.config.max_redirects {
                        return Err(FetchError::TooManyRedirects(self.config.max_redirects));
                    }
                    drain(response).await;
                    redirects += 1;
                    debug!("icy: {} redirected to {}", url, next);
                    url = next;
                    continue;
                }
                // 3xx without Location: treat it as the stream itself
            } else if !status.is_success() {
                return Err(FetchError::Status(status));
            }

            // Returning early drops `response`, which closes the connection
            // without touching the body.
            let metaint =
                icy::parse_metaint(response.headers()).ok_or(FetchError::MissingMetaint)?;
            debug!("icy: {} metaint={}", url, metaint);
            return read_first_title(response, metaint, self.config.overflow_bytes).await;
        }
    }
}

/// Stream `response` into a [`FrameParser`] until the first metadata block.
async fn read_first_title(
    response: Response,
    metaint: usize,
    overflow: usize,
) -> Result<String, FetchError> {
    let mut parser = FrameParser::new(metaint, overflow);
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if let Progress::Title(title) = parser.push(&chunk)? {
            debug!("icy: metadata block complete after {} bytes", parser.received());
            return Ok(title);
        }
    }

    Err(FetchError::StreamEnded {
        received: parser.received(),
    })
}

/// Discard a redirect body so the hop ends cleanly.
async fn drain(response: Response) {
    let mut body = response.bytes_stream();
    let mut drained = 0usize;
    while let Some(Ok(chunk)) = body.next().await {
        drained += chunk.len();
        if drained > REDIRECT_DRAIN_LIMIT {
            debug!("icy: redirect body over {} bytes, dropping it", REDIRECT_DRAIN_LIMIT);
            break;
        }
    }
}

/// `Location` resolved against the URL that produced it.
fn redirect_target(response: &Response) -> Result<Option<Url>, FetchError> {
    let Some(location) = response.headers().get(LOCATION) else {
        return Ok(None);
    };
    let location = location.to_str().map_err(|e| FetchError::InvalidUrl {
        url: String::from_utf8_lossy(location.as_bytes()).into_owned(),
        reason: e.to_string(),
    })?;
    let next = response
        .url()
        .join(location)
        .map_err(|e| FetchError::InvalidUrl {
            url: location.to_string(),
            reason: e.to_string(),
        })?;
    check_scheme(&next)?;
    Ok(Some(next))
}

fn parse_stream_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    check_scheme(&parsed)?;
    Ok(parsed)
}

fn check_scheme(url: &Url) -> Result<(), FetchError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(FetchError::UnsupportedScheme(other.to_string())),
    }
}

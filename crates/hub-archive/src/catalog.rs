//! Archive catalog access
//!
//! The worker talks to the archive server through the [`Catalog`] trait.
//! [`HttpCatalog`] is the real server; the simulator provides an in-memory
//! one.
//!
//! # Endpoints
//!
//! | Call | Path |
//! |------|------|
//! | list | `/data/list2/{pathway}/{YYYYMMDD-HH00}-{symbol}/` |
//! | load | `/data/load/{pathway}/{name}/` |
//! | month | `/data/month/{pathway}/{YYYYMM01}/` |
//! | catchup | `/data/catchup/{pathway}/` |
//! | feed | `/events/` (server-sent events named after the pathway) |

use std::collections::BTreeMap;
use std::future::Future;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::ArchiveError;
use crate::sse::SseParser;

/// Depth of the live feed channel
pub const FEED_DEPTH: usize = 64;

/// Items of an hour (and the hour before it)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPayload {
    /// Hour the list is anchored at, negative when there is no data
    pub hour: i32,
    pub hours_active: Vec<u32>,
    /// Items before the anchor hour, items in it
    #[serde(default)]
    pub counts: [usize; 2],
    pub items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub more_before: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub more_after: Option<bool>,
}

/// Latest data for a pathway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchupPayload {
    pub date_time_string: String,
    pub hours_active: Vec<u32>,
    #[serde(default)]
    pub days_active: BTreeMap<String, u8>,
    #[serde(default)]
    pub latest_scan: String,
    pub hour: i32,
    pub items: Vec<String>,
    #[serde(default)]
    pub years_active: Vec<u32>,
}

/// Live feed update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPayload {
    pub items: Vec<String>,
    pub hours_active: Vec<u32>,
}

/// Day to coverage bucket for one month
pub type MonthPayload = BTreeMap<String, u8>;

/// Source of archive listings and sweeps
pub trait Catalog: Send + Sync + 'static {
    /// Items around `date_time` (`YYYYMMDD-HH00`) for `symbol`
    fn list(
        &self,
        pathway: &str,
        date_time: &str,
        symbol: char,
    ) -> impl Future<Output = Result<ListPayload, ArchiveError>> + Send;

    /// Raw sweep bytes for an item
    fn load(&self, pathway: &str, name: &str)
        -> impl Future<Output = Result<Vec<u8>, ArchiveError>> + Send;

    /// Coverage for the month of `day` (`YYYYMM01`)
    fn month(&self, pathway: &str, day: &str)
        -> impl Future<Output = Result<MonthPayload, ArchiveError>> + Send;

    /// Latest hour of data
    fn catchup(&self, pathway: &str)
        -> impl Future<Output = Result<CatchupPayload, ArchiveError>> + Send;

    /// Subscribe to new items; the channel closes when the feed is lost
    fn feed(&self, pathway: &str)
        -> impl Future<Output = Result<mpsc::Receiver<FeedPayload>, ArchiveError>> + Send;
}

/// Catalog served over HTTP by the archive server
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    base: String,
    client: reqwest::Client,
}

impl HttpCatalog {
    /// `base` is the server origin, e.g. `https://radarhub.arrc.ou.edu`
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_client(base, reqwest::Client::new())
    }

    pub fn with_client(base: impl Into<String>, client: reqwest::Client) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { base, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ArchiveError> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ArchiveError::Catalog {
                status: status.as_u16(),
                text,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ArchiveError> {
        let bytes = self.get(path).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl Catalog for HttpCatalog {
    async fn list(
        &self,
        pathway: &str,
        date_time: &str,
        symbol: char,
    ) -> Result<ListPayload, ArchiveError> {
        self.get_json(&format!("/data/list2/{pathway}/{date_time}-{symbol}/"))
            .await
    }

    async fn load(&self, pathway: &str, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let response = self.get(&format!("/data/load/{pathway}/{name}/")).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn month(&self, pathway: &str, day: &str) -> Result<MonthPayload, ArchiveError> {
        self.get_json(&format!("/data/month/{pathway}/{day}/")).await
    }

    async fn catchup(&self, pathway: &str) -> Result<CatchupPayload, ArchiveError> {
        self.get_json(&format!("/data/catchup/{pathway}/")).await
    }

    async fn feed(&self, pathway: &str) -> Result<mpsc::Receiver<FeedPayload>, ArchiveError> {
        let url = self.url("/events/");
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Catalog {
                status: status.as_u16(),
                text: response.text().await.unwrap_or_default(),
            });
        }
        info!("Event stream open for {}", pathway);

        let (tx, rx) = mpsc::channel(FEED_DEPTH);
        let pathway = pathway.to_string();
        let mut stream = response.bytes_stream();
        tokio::spawn(async move {
            let mut parser = SseParser::new();
            loop {
                tokio::select! {
                    chunk = stream.next() => {
                        let chunk = match chunk {
                            Some(Ok(chunk)) => chunk,
                            Some(Err(e)) => {
                                warn!("Event stream error: {}", e);
                                break;
                            }
                            None => break,
                        };
                        for event in parser.feed(&chunk) {
                            if event.event != pathway {
                                continue;
                            }
                            match serde_json::from_str::<FeedPayload>(&event.data) {
                                Ok(payload) => {
                                    if tx.send(payload).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => warn!("Bad feed payload: {}", e),
                            }
                        }
                    }

                    _ = tx.closed() => {
                        debug!("Feed for {} dropped", pathway);
                        return;
                    }
                }
            }
            info!("Event stream for {} ended", pathway);
        });

        Ok(rx)
    }
}

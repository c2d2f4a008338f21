use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderName, RANGE};
use reqwest::{Method, StatusCode};
use tracing::debug;
use url::Url;

use super::client::WebDavClient;
use crate::transfer::StreamError;
use crate::transfer::stream::{ByteStream, RangeSource, parse_content_range};
use crate::transfer::upload::{RangeSink, update_range};

/// 通过 HTTP Range 请求读取远程文件
#[derive(Debug, Clone)]
pub struct HttpRangeSource {
    client: WebDavClient,
    url: Url,
}

impl HttpRangeSource {
    pub fn new(client: WebDavClient, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    async fn fetch_total(&self) -> Result<u64, StreamError> {
        let resp = self
            .client
            .request(Method::GET, self.url.clone())
            .header(RANGE, "bytes=0-0")
            .send()
            .await?;
        let status = resp.status();
        debug!("大小探测 {}: {}", self.url, status);

        let header = |name: HeaderName| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };

        match status {
            // 空文件会返回 416 和 `bytes */0`
            StatusCode::PARTIAL_CONTENT | StatusCode::RANGE_NOT_SATISFIABLE => {
                let range = header(CONTENT_RANGE).ok_or(StreamError::MissingContentRange)?;
                parse_content_range(&range)
            }
            // 服务器不支持 Range，只能用 Content-Length
            StatusCode::OK => header(CONTENT_LENGTH)
                .and_then(|v| v.parse().ok())
                .ok_or(StreamError::MissingContentRange),
            other => Err(StreamError::Status(other.as_u16())),
        }
    }

    async fn open_from(&self, start: u64) -> Result<ByteStream, StreamError> {
        let resp = self
            .client
            .request(Method::GET, self.url.clone())
            .header(RANGE, format!("bytes={}-", start))
            .send()
            .await?;

        match resp.status() {
            StatusCode::PARTIAL_CONTENT => {}
            StatusCode::OK if start == 0 => {}
            StatusCode::OK => return Err(StreamError::RangeIgnored),
            other => return Err(StreamError::Status(other.as_u16())),
        }

        Ok(resp.bytes_stream().map_err(StreamError::from).boxed())
    }
}

/// 通过 sabre/dav 风格的 PATCH 部分更新远程文件
#[derive(Debug, Clone)]
pub struct HttpRangeSink {
    client: WebDavClient,
    url: Url,
}

impl HttpRangeSink {
    pub fn new(client: WebDavClient, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl RangeSink for HttpRangeSink {
    async fn write_range(&self, offset: u64, chunk: Bytes) -> Result<(), StreamError> {
        let range = update_range(offset, chunk.len() as u64);
        debug!("PATCH {} X-Update-Range: {}", self.url, range);

        let resp = self
            .client
            .request(Method::PATCH, self.url.clone())
            .header("X-Update-Range", range)
            .header(CONTENT_TYPE, "application/x-sabredav-partialupdate")
            .body(chunk)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(StreamError::Status(resp.status().as_u16()))
        }
    }
}

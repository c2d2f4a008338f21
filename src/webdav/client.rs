use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, error, warn};
use url::Url;

use super::error::WebDavError;
use super::propfind::{PROPFIND_BODY, RemoteEntry, parse_multistatus};
use super::range::{HttpRangeSink, HttpRangeSource};
use crate::common::path::{remote_file_name, remote_parent, remote_segments};
use crate::config::Credentials;
use crate::transfer::DiskType;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// 带 Basic 认证的 WebDAV 客户端
#[derive(Debug, Clone)]
pub struct WebDavClient {
    inner: Client,
    base: Url,
    credentials: Credentials,
}

impl WebDavClient {
    pub fn new(endpoint: &str, credentials: Credentials) -> Result<Self, WebDavError> {
        // 基础地址必须以 / 结尾，否则 join 会丢掉最后一段
        let endpoint = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{}/", endpoint)
        };
        let base = Url::parse(&endpoint)?;
        if base.cannot_be_a_base() {
            return Err(WebDavError::InvalidUrl(endpoint));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            USER_AGENT,
            reqwest::header::HeaderValue::from_static(concat!("reccli/", env!("CARGO_PKG_VERSION"))),
        );

        let inner = ClientBuilder::new()
            .connect_timeout(CONNECT_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner,
            base,
            credentials,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// 云盘根目录地址
    pub fn root(&self, disk: DiskType, group_id: Option<&str>) -> Result<Url, WebDavError> {
        match disk {
            DiskType::Personal => Ok(self.base.clone()),
            DiskType::Group => {
                let group = group_id
                    .filter(|g| !g.is_empty())
                    .ok_or(WebDavError::MissingGroup)?;
                let mut url = self.base.clone();
                url.path_segments_mut()
                    .map_err(|_| WebDavError::InvalidUrl(self.base.to_string()))?
                    .pop_if_empty()
                    .extend(["groups", group, ""]);
                Ok(url)
            }
        }
    }

    /// 远程路径对应的地址，每一段都会做百分号编码
    pub fn url_for(
        &self,
        disk: DiskType,
        group_id: Option<&str>,
        path: &str,
    ) -> Result<Url, WebDavError> {
        let mut url = self.root(disk, group_id)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| WebDavError::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty();
            segments.extend(remote_segments(path));
        }
        Ok(url)
    }

    /// 目录地址（以 / 结尾）
    pub fn collection_url(
        &self,
        disk: DiskType,
        group_id: Option<&str>,
        path: &str,
    ) -> Result<Url, WebDavError> {
        let mut url = self.url_for(disk, group_id, path)?;
        if !url.path().ends_with('/') {
            url.path_segments_mut()
                .map_err(|_| WebDavError::InvalidUrl(self.base.to_string()))?
                .push("");
        }
        Ok(url)
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.inner
            .request(method, url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
    }

    /// PROPFIND Depth: 1 列出目录内容，不包含目录自身
    pub async fn list(
        &self,
        disk: DiskType,
        group_id: Option<&str>,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, WebDavError> {
        let url = self.collection_url(disk, group_id, path)?;
        debug!("PROPFIND {}", url);

        let resp = self
            .request(webdav_method("PROPFIND")?, url.clone())
            .header("Depth", "1")
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(WebDavError::NotFound(path.to_string()));
        }
        let resp = check_status("PROPFIND", resp)?;

        let body = resp.text().await?;
        let own_path = urlencoding::decode(url.path())
            .map(|p| p.trim_end_matches('/').to_string())
            .unwrap_or_default();

        let entries = parse_multistatus(&body)?
            .into_iter()
            .filter(|e| e.href.trim_end_matches('/') != own_path)
            .filter(|e| {
                let plain = e.has_plain_name();
                if !plain {
                    warn!("忽略无效的目录项: {}", e.href);
                }
                plain
            })
            .collect::<Vec<_>>();
        debug!("{} 下共 {} 项", path, entries.len());
        Ok(entries)
    }

    /// 查询单个路径，通过列出上级目录实现；根目录返回 None
    pub async fn stat(
        &self,
        disk: DiskType,
        group_id: Option<&str>,
        path: &str,
    ) -> Result<Option<RemoteEntry>, WebDavError> {
        let Some(name) = remote_file_name(path) else {
            return Ok(None);
        };
        self.list(disk, group_id, &remote_parent(path))
            .await?
            .into_iter()
            .find(|e| e.name == name)
            .map(Some)
            .ok_or_else(|| WebDavError::NotFound(path.to_string()))
    }

    /// MKCOL 创建目录，目录已存在不算错误
    pub async fn mkdir(
        &self,
        disk: DiskType,
        group_id: Option<&str>,
        path: &str,
    ) -> Result<(), WebDavError> {
        let url = self.collection_url(disk, group_id, path)?;
        let resp = self.request(webdav_method("MKCOL")?, url).send().await?;
        if resp.status() == StatusCode::METHOD_NOT_ALLOWED {
            debug!("目录已存在: {}", path);
            return Ok(());
        }
        check_status("MKCOL", resp)?;
        Ok(())
    }

    pub async fn remove(
        &self,
        disk: DiskType,
        group_id: Option<&str>,
        path: &str,
    ) -> Result<(), WebDavError> {
        let url = self.url_for(disk, group_id, path)?;
        let resp = self.request(Method::DELETE, url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(WebDavError::NotFound(path.to_string()));
        }
        check_status("DELETE", resp)?;
        Ok(())
    }

    /// 创建（或清空）一个文件，后续通过部分写入填充内容
    pub async fn create_empty(
        &self,
        disk: DiskType,
        group_id: Option<&str>,
        path: &str,
    ) -> Result<(), WebDavError> {
        let url = self.url_for(disk, group_id, path)?;
        let resp = self.request(Method::PUT, url).body(Vec::new()).send().await?;
        check_status("PUT", resp)?;
        Ok(())
    }

    pub fn range_source(
        &self,
        disk: DiskType,
        group_id: Option<&str>,
        path: &str,
    ) -> Result<HttpRangeSource, WebDavError> {
        Ok(HttpRangeSource::new(
            self.clone(),
            self.url_for(disk, group_id, path)?,
        ))
    }

    pub fn range_sink(
        &self,
        disk: DiskType,
        group_id: Option<&str>,
        path: &str,
    ) -> Result<HttpRangeSink, WebDavError> {
        Ok(HttpRangeSink::new(
            self.clone(),
            self.url_for(disk, group_id, path)?,
        ))
    }
}

fn webdav_method(name: &str) -> Result<Method, WebDavError> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| WebDavError::InvalidResponse(format!("无效的请求方法 {}: {}", name, e)))
}

fn check_status(method: &str, resp: Response) -> Result<Response, WebDavError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    error!("{} {} 失败: {}", method, resp.url(), status);
    Err(WebDavError::Status {
        method: method.to_string(),
        url: resp.url().to_string(),
        status: status.as_u16(),
    })
}

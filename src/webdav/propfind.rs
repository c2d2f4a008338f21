use chrono::{DateTime, FixedOffset};
use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use super::error::WebDavError;
use crate::common::path::remote_file_name;
use crate::transfer::TaskKind;

/// PROPFIND 请求体，只取列目录需要的属性
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getlastmodified/>
  </d:prop>
</d:propfind>"#;

// 标签前缀不固定（d:、D:、lp1: 或者没有），统一忽略
lazy_static! {
    static ref RESPONSE_RE: Regex =
        Regex::new(r"(?is)<(?:[a-z0-9_-]+:)?response\b[^>]*>(.*?)</(?:[a-z0-9_-]+:)?response\s*>")
            .unwrap();
    static ref HREF_RE: Regex =
        Regex::new(r"(?is)<(?:[a-z0-9_-]+:)?href\b[^>]*>(.*?)</(?:[a-z0-9_-]+:)?href\s*>").unwrap();
    static ref COLLECTION_RE: Regex =
        Regex::new(r"(?is)<(?:[a-z0-9_-]+:)?collection\b[^>]*>").unwrap();
    static ref LENGTH_RE: Regex = Regex::new(
        r"(?is)<(?:[a-z0-9_-]+:)?getcontentlength\b[^>]*>(.*?)</(?:[a-z0-9_-]+:)?getcontentlength\s*>"
    )
    .unwrap();
    static ref MODIFIED_RE: Regex = Regex::new(
        r"(?is)<(?:[a-z0-9_-]+:)?getlastmodified\b[^>]*>(.*?)</(?:[a-z0-9_-]+:)?getlastmodified\s*>"
    )
    .unwrap();
    static ref ENTITY_RE: Regex =
        Regex::new(r"&(lt|gt|quot|apos|amp|#[0-9]+|#[xX][0-9a-fA-F]+);").unwrap();
}

/// 目录中的一项
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub href: String, // 解码后的服务器路径
    pub name: String,
    pub kind: TaskKind,
    pub size: u64,
    pub modified: Option<DateTime<FixedOffset>>,
}

impl RemoteEntry {
    pub fn is_directory(&self) -> bool {
        self.kind == TaskKind::Directory
    }

    /// 名称能否直接拼到本地路径下：非空，不是 `.` 或 `..`，不含路径分隔符
    pub fn has_plain_name(&self) -> bool {
        !self.name.is_empty()
            && self.name != "."
            && self.name != ".."
            && !self.name.contains(['/', '\\'])
    }
}

/// 解析 207 Multi-Status 响应
pub fn parse_multistatus(xml: &str) -> Result<Vec<RemoteEntry>, WebDavError> {
    let mut entries = Vec::new();
    for response in RESPONSE_RE.captures_iter(xml) {
        let body = &response[1];

        let Some(href) = HREF_RE.captures(body).map(|c| c[1].trim().to_string()) else {
            return Err(WebDavError::InvalidResponse("response 缺少 href".to_string()));
        };
        let href = decode_href(&href)?;

        let kind = if COLLECTION_RE.is_match(body) {
            TaskKind::Directory
        } else {
            TaskKind::File
        };
        let size = LENGTH_RE
            .captures(body)
            .and_then(|c| c[1].trim().parse().ok())
            .unwrap_or(0);
        let modified = MODIFIED_RE
            .captures(body)
            .and_then(|c| DateTime::parse_from_rfc2822(c[1].trim()).ok());

        let name = remote_file_name(&href).unwrap_or("").to_string();
        entries.push(RemoteEntry {
            href,
            name,
            kind,
            size,
            modified,
        });
    }
    Ok(entries)
}

// href 可能是绝对地址，也可能带有百分号编码和 XML 实体
fn decode_href(raw: &str) -> Result<String, WebDavError> {
    let raw = unescape_xml(raw);
    let path = if raw.starts_with("http://") || raw.starts_with("https://") {
        Url::parse(&raw)?.path().to_string()
    } else {
        raw
    };
    urlencoding::decode(&path)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| WebDavError::InvalidResponse(format!("href 解码失败: {}", e)))
}

// 一次扫描完成替换，`&amp;#38;` 仍然得到字面的 `&#38;`
fn unescape_xml(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => {
                    let digits = &entity[1..];
                    let code = match digits.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => digits.parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            // 无效码点原样保留
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/dav/docs/</d:href>
    <d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/docs/%E6%8A%A5%E5%91%8A%20v1.txt</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype/>
        <d:getcontentlength>1024</d:getcontentlength>
        <d:getlastmodified>Tue, 01 Oct 2024 08:00:00 GMT</d:getlastmodified>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <D:response xmlns:D="DAV:">
    <D:href>http://example.com/dav/docs/a&amp;b/</D:href>
    <D:propstat><D:prop><D:resourcetype><D:collection /></D:resourcetype></D:prop></D:propstat>
  </D:response>
</d:multistatus>"#;

    #[test]
    fn parses_files_and_collections() {
        let entries = parse_multistatus(SAMPLE).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].href, "/dav/docs/");
        assert!(entries[0].is_directory());

        let file = &entries[1];
        assert_eq!(file.name, "报告 v1.txt");
        assert_eq!(file.kind, TaskKind::File);
        assert_eq!(file.size, 1024);
        assert!(file.modified.is_some());

        let dir = &entries[2];
        assert_eq!(dir.href, "/dav/docs/a&b/");
        assert_eq!(dir.name, "a&b");
        assert!(dir.is_directory());
    }

    #[test]
    fn decodes_numeric_character_references() {
        assert_eq!(unescape_xml("a&#38;b"), "a&b");
        assert_eq!(unescape_xml("a&#x26;b"), "a&b");
        assert_eq!(unescape_xml("&#x62A5;&#21578;"), "报告");
        assert_eq!(unescape_xml("&amp;#38;"), "&#38;");
        assert_eq!(unescape_xml("&#xD800;"), "&#xD800;");

        let xml = r#"<d:multistatus xmlns:d="DAV:">
  <d:response><d:href>/dav/x&#38;y.txt</d:href><d:propstat><d:prop><d:resourcetype/></d:prop></d:propstat></d:response>
  <d:response><d:href>/dav/p&#x26;q/</d:href><d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat></d:response>
</d:multistatus>"#;
        let entries = parse_multistatus(xml).unwrap();
        assert_eq!(entries[0].name, "x&y.txt");
        assert_eq!(entries[1].name, "p&q");
    }

    #[test]
    fn dot_segments_are_not_plain_names() {
        let xml = r#"<d:multistatus xmlns:d="DAV:">
  <d:response><d:href>/dav/docs/./</d:href><d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat></d:response>
  <d:response><d:href>/dav/docs/../</d:href><d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat></d:response>
  <d:response><d:href>/dav/docs/a%5Cb.txt</d:href><d:propstat><d:prop><d:resourcetype/></d:prop></d:propstat></d:response>
  <d:response><d:href>/dav/docs/ok.txt</d:href><d:propstat><d:prop><d:resourcetype/></d:prop></d:propstat></d:response>
</d:multistatus>"#;
        let plain = parse_multistatus(xml)
            .unwrap()
            .into_iter()
            .filter(RemoteEntry::has_plain_name)
            .map(|e| e.name)
            .collect::<Vec<_>>();
        assert_eq!(plain, vec!["ok.txt"]);
    }

    #[test]
    fn empty_multistatus_has_no_entries() {
        let entries = parse_multistatus(r#"<d:multistatus xmlns:d="DAV:"></d:multistatus>"#).unwrap();
        assert!(entries.is_empty());
    }
}

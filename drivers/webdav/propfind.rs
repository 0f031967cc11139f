//! PROPFIND multistatus parsing / PROPFIND响应解析

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::storage::{FileInfo, Result, StoreError, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};

/// Request body asking for the properties we read / PROPFIND请求体
pub const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:resourcetype/>
    <D:getcontentlength/>
    <D:getlastmodified/>
  </D:prop>
</D:propfind>"#;

/// One `<response>` of a multistatus body / 单个资源条目
#[derive(Debug, Clone, PartialEq)]
pub struct DavEntry {
    /// Decoded href path without trailing slash / 解码后的路径
    pub path: String,
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub modified: Option<DateTime<Utc>>,
}

impl DavEntry {
    pub fn to_file_info(&self) -> FileInfo {
        FileInfo {
            name: self.name.clone(),
            size: self.size,
            modified: self.modified,
            is_dir: self.is_dir,
            mode: if self.is_dir { DEFAULT_DIR_MODE } else { DEFAULT_FILE_MODE },
        }
    }
}

/// Path part of an href (absolute URL or path), percent-decoded, without trailing slash / 提取href路径
pub fn href_path(href: &str) -> String {
    let raw = match url::Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.to_string(),
    };
    let decoded = urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or(raw);
    decoded.trim_end_matches('/').to_string()
}

fn parse_modified(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a multistatus body into entries / 解析PROPFIND响应
pub fn parse_multistatus(xml: &str) -> Result<Vec<DavEntry>> {
    let mut entries = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut current_href = String::new();
    let mut current_is_dir = false;
    let mut current_size: u64 = 0;
    let mut current_modified: Option<DateTime<Utc>> = None;
    let mut in_response = false;
    let mut in_href = false;
    let mut in_getcontentlength = false;
    let mut in_getlastmodified = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let local_name = e.local_name();
                let name = std::str::from_utf8(local_name.as_ref()).unwrap_or("");
                match name {
                    "response" => {
                        in_response = true;
                        current_href.clear();
                        current_is_dir = false;
                        current_size = 0;
                        current_modified = None;
                    }
                    "href" => in_href = true,
                    "collection" => current_is_dir = true,
                    "getcontentlength" => in_getcontentlength = true,
                    "getlastmodified" => in_getlastmodified = true,
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                let local_name = e.local_name();
                let name = std::str::from_utf8(local_name.as_ref()).unwrap_or("");
                match name {
                    "response" => {
                        if in_response && !current_href.is_empty() {
                            let path = href_path(&current_href);
                            let name = path.rsplit('/').next().unwrap_or("").to_string();
                            entries.push(DavEntry {
                                path,
                                name,
                                size: current_size,
                                is_dir: current_is_dir,
                                modified: current_modified,
                            });
                        }
                        in_response = false;
                    }
                    "href" => in_href = false,
                    "getcontentlength" => in_getcontentlength = false,
                    "getlastmodified" => in_getlastmodified = false,
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                let local_name = e.local_name();
                if local_name.as_ref() == b"collection" {
                    current_is_dir = true;
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| StoreError::Xml(e.to_string()))?
                    .to_string();
                if in_href {
                    current_href = text;
                } else if in_getcontentlength {
                    current_size = text.trim().parse().unwrap_or(0);
                } else if in_getlastmodified {
                    current_modified = parse_modified(text.trim());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(StoreError::Xml(e.to_string())),
            _ => {}
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/docs/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/></D:resourcetype>
        <D:getlastmodified>Mon, 12 Jan 1998 09:25:56 GMT</D:getlastmodified>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>http://example.com/dav/docs/my%20notes.txt</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype/>
        <D:getcontentlength>42</D:getcontentlength>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/dav/docs/sub/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection></D:collection></D:resourcetype>
      </D:prop>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    #[test]
    fn test_parse_listing() {
        let entries = parse_multistatus(LISTING).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].path, "/dav/docs");
        assert_eq!(entries[0].name, "docs");
        assert!(entries[0].is_dir);
        let modified = entries[0].modified.unwrap();
        assert_eq!(modified.to_rfc3339(), "1998-01-12T09:25:56+00:00");

        assert_eq!(entries[1].path, "/dav/docs/my notes.txt");
        assert_eq!(entries[1].name, "my notes.txt");
        assert_eq!(entries[1].size, 42);
        assert!(!entries[1].is_dir);
        assert_eq!(entries[1].modified, None);

        assert!(entries[2].is_dir);
        assert_eq!(entries[2].name, "sub");
    }

    #[test]
    fn test_file_info_modes() {
        let entries = parse_multistatus(LISTING).unwrap();
        assert_eq!(entries[0].to_file_info().mode, DEFAULT_DIR_MODE);
        let file = entries[1].to_file_info();
        assert_eq!(file.mode, DEFAULT_FILE_MODE);
        assert_eq!(file.size, 42);
    }

    #[test]
    fn test_href_path() {
        assert_eq!(href_path("/a/b%20c/"), "/a/b c");
        assert_eq!(href_path("https://host:8080/root/x.txt"), "/root/x.txt");
        assert_eq!(href_path("/"), "");
    }

    #[test]
    fn test_malformed_xml() {
        assert!(parse_multistatus("<D:multistatus><D:response></D:oops>").is_err());
    }
}

//! Sidecar metadata codec / 元数据边车文件编解码
//!
//! Backends without native per-object metadata keep it next to the object in
//! `<path>.meta`, one `key=value` pair per line. Keys and values are written
//! as-is, so neither may contain `=` or a newline.

use super::Metadata;

/// Suffix of the sidecar file / 元数据文件后缀
pub const META_SUFFIX: &str = ".meta";

/// Sidecar location for a primary object / 获取元数据文件路径
pub fn sidecar_path(path: &str) -> String {
    format!("{}{}", path, META_SUFFIX)
}

/// Encode metadata as `key=value` lines (sorted by key) / 元数据转字节
pub fn encode(meta: &Metadata) -> Vec<u8> {
    let mut pairs: Vec<(&String, &String)> = meta.iter().collect();
    pairs.sort();

    let mut out = Vec::new();
    for (key, value) in pairs {
        out.extend_from_slice(key.as_bytes());
        out.push(b'=');
        out.extend_from_slice(value.as_bytes());
        out.push(b'\n');
    }
    out
}

/// Decode `key=value` lines, skipping anything malformed / 字节转元数据
pub fn decode(bytes: &[u8]) -> Metadata {
    let text = String::from_utf8_lossy(bytes);
    let mut meta = Metadata::new();

    for line in text.split('\n') {
        if line.is_empty() {
            continue;
        }
        let pair: Vec<&str> = line.split('=').collect();
        if pair.len() != 2 {
            continue;
        }
        meta.insert(pair[0].to_string(), pair[1].to_string());
    }

    meta
}

//! S3驱动配置

use serde::{Deserialize, Serialize};

use super::multipart::MIN_PART_SIZE;

/// S3配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// 存储桶名称
    pub bucket: String,
    /// S3端点地址
    /// AWS: https://s3.{region}.amazonaws.com
    /// 阿里云OSS: https://oss-{region}.aliyuncs.com
    /// MinIO: http://localhost:9000
    /// Empty means the AWS endpoint of `region` / 为空时使用AWS端点
    #[serde(default)]
    pub endpoint: String,
    /// 区域
    #[serde(default = "default_region")]
    pub region: String,
    /// Access Key ID
    #[serde(alias = "access_key")]
    pub access_key_id: String,
    /// Secret Access Key
    #[serde(alias = "secret_key")]
    pub secret_access_key: String,
    /// Session Token（用于临时凭证）
    #[serde(default)]
    pub session_token: String,
    /// 强制使用路径风格（而非虚拟主机风格）
    /// MinIO等需要设置为true
    #[serde(default, alias = "use_path_style")]
    pub force_path_style: bool,
    /// 分片大小（字节），不小于5MB
    #[serde(default = "default_part_size")]
    pub part_size: usize,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_part_size() -> usize {
    MIN_PART_SIZE
}

impl S3Config {
    /// Endpoint URL, falling back to AWS for the region / 实际端点
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.is_empty() {
            format!("https://s3.{}.amazonaws.com", self.region)
        } else {
            self.endpoint.trim_end_matches('/').to_string()
        }
    }

    /// Part size raised to the S3 minimum / 实际分片大小
    pub fn effective_part_size(&self) -> usize {
        self.part_size.max(MIN_PART_SIZE)
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint: String::new(),
            region: default_region(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: String::new(),
            force_path_style: false,
            part_size: default_part_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config: S3Config = serde_json::from_value(serde_json::json!({
            "bucket": "b",
            "access_key_id": "ak",
            "secret_access_key": "sk"
        }))
        .unwrap();

        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.part_size, MIN_PART_SIZE);
        assert!(!config.force_path_style);
        assert_eq!(config.endpoint_url(), "https://s3.us-east-1.amazonaws.com");
    }

    #[test]
    fn test_aliases() {
        let config: S3Config = serde_json::from_value(serde_json::json!({
            "bucket": "b",
            "endpoint": "http://localhost:9000/",
            "access_key": "ak",
            "secret_key": "sk",
            "use_path_style": true
        }))
        .unwrap();

        assert_eq!(config.access_key_id, "ak");
        assert_eq!(config.secret_access_key, "sk");
        assert!(config.force_path_style);
        assert_eq!(config.endpoint_url(), "http://localhost:9000");
    }

    #[test]
    fn test_part_size_clamped() {
        let config = S3Config { part_size: 1024, ..Default::default() };
        assert_eq!(config.effective_part_size(), MIN_PART_SIZE);

        let config = S3Config { part_size: 16 * 1024 * 1024, ..Default::default() };
        assert_eq!(config.effective_part_size(), 16 * 1024 * 1024);
    }
}

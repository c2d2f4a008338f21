use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

const CONFIG_DIR: &str = "reccli";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法确定配置目录")]
    NoConfigDir,

    #[error("读写配置文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置文件格式错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("尚未登录，请先执行 login")]
    NotLoggedIn,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// 持久化的客户端配置
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("workers", &self.workers)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            username: None,
            password: None,
            workers: DEFAULT_WORKERS,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// 读取配置，文件不存在时返回默认值
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("配置文件不存在: {}", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // 文件里有密码，创建时就只允许本人读写
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;

        // mode 只对新建文件生效，旧文件单独收紧
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(content.as_bytes())?;

        info!("配置已保存: {}", path.display());
        Ok(())
    }

    /// 环境变量 RECCLI_ENDPOINT / RECCLI_USERNAME / RECCLI_PASSWORD 覆盖文件中的值
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("RECCLI_ENDPOINT") {
            self.endpoint = Some(v);
        }
        if let Some(v) = lookup("RECCLI_USERNAME") {
            self.username = Some(v);
        }
        if let Some(v) = lookup("RECCLI_PASSWORD") {
            self.password = Some(v);
        }
        self
    }

    pub fn credentials(&self) -> Result<(String, Credentials), ConfigError> {
        match (&self.endpoint, &self.username, &self.password) {
            (Some(endpoint), Some(username), Some(password)) => Ok((
                endpoint.clone(),
                Credentials {
                    username: username.clone(),
                    password: password.clone(),
                },
            )),
            _ => Err(ConfigError::NotLoggedIn),
        }
    }

    pub fn clear_credentials(&mut self) {
        self.username = None;
        self.password = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = AppConfig {
            endpoint: Some("https://dav.example.com/".to_string()),
            username: Some("alice".to_string()),
            password: Some("secret".to_string()),
            workers: 8,
            ..AppConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.credentials().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = AppConfig {
            password: Some("secret".to_string()),
            ..AppConfig::default()
        };

        config.save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // 已存在的宽松权限文件也会被收紧
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        config.save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load(&dir.path().join("none.json")).unwrap();
        assert_eq!(loaded.workers, DEFAULT_WORKERS);
        assert!(matches!(loaded.credentials(), Err(ConfigError::NotLoggedIn)));
    }

    #[test]
    fn overrides_replace_file_values() {
        let config = AppConfig {
            endpoint: Some("https://old.example.com/".to_string()),
            ..AppConfig::default()
        }
        .with_overrides(|key| match key {
            "RECCLI_ENDPOINT" => Some("https://new.example.com/".to_string()),
            "RECCLI_USERNAME" => Some("bob".to_string()),
            _ => None,
        });

        assert_eq!(config.endpoint.as_deref(), Some("https://new.example.com/"));
        assert_eq!(config.username.as_deref(), Some("bob"));
        assert_eq!(config.password, None);
    }

    #[test]
    fn debug_hides_password() {
        let creds = Credentials {
            username: "alice".to_string(),
            password: "secret".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("secret"));
    }
}

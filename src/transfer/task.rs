use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::path::join_remote;

/// 任务指向的远程存储
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiskType {
    #[default]
    Personal, // 个人云盘
    Group, // 群组云盘，需要 group_id
}

impl fmt::Display for DiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskType::Personal => write!(f, "personal"),
            DiskType::Group => write!(f, "group"),
        }
    }
}

impl FromStr for DiskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "personal" | "cloud" => Ok(DiskType::Personal),
            "group" => Ok(DiskType::Group),
            other => Err(format!("未知的云盘类型: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    File,
    Directory,
}

/// 一个传输单元，传输过程中不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: Uuid,
    pub disk_type: DiskType,
    pub group_id: Option<String>, // 同一次请求产生的任务共享
    pub kind: TaskKind,
    pub remote_path: String,
    pub local_path: PathBuf,
    pub size: Option<u64>, // 列目录时得到的大小，未知为 None
}

impl Task {
    pub fn new(
        kind: TaskKind,
        disk_type: DiskType,
        group_id: Option<String>,
        remote_path: impl Into<String>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            disk_type,
            group_id,
            kind,
            remote_path: remote_path.into(),
            local_path: local_path.into(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// 由目录任务派生子任务，继承云盘和分组
    pub fn child(&self, kind: TaskKind, name: &str, size: Option<u64>) -> Task {
        Task {
            id: Uuid::new_v4(),
            disk_type: self.disk_type,
            group_id: self.group_id.clone(),
            kind,
            remote_path: join_remote(&self.remote_path, name),
            local_path: self.local_path.join(name),
            size,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == TaskKind::Directory
    }

    /// 进度和错误信息中展示的路径
    pub fn display_path(&self) -> String {
        self.remote_path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_inherits_disk_and_group() {
        let parent = Task::new(
            TaskKind::Directory,
            DiskType::Group,
            Some("g1".to_string()),
            "/shared/docs",
            "out/docs",
        );
        let child = parent.child(TaskKind::File, "a.txt", Some(10));

        assert_ne!(child.id, parent.id);
        assert_eq!(child.disk_type, DiskType::Group);
        assert_eq!(child.group_id.as_deref(), Some("g1"));
        assert_eq!(child.remote_path, "/shared/docs/a.txt");
        assert_eq!(child.local_path, PathBuf::from("out/docs/a.txt"));
        assert_eq!(child.size, Some(10));
    }

    #[test]
    fn disk_type_parses_aliases() {
        assert_eq!("cloud".parse::<DiskType>(), Ok(DiskType::Personal));
        assert_eq!("GROUP".parse::<DiskType>(), Ok(DiskType::Group));
        assert!("recycle".parse::<DiskType>().is_err());
    }
}

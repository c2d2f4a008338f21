// 远程路径处理：远程路径统一使用 `/` 分隔，以 `/` 开头，不以 `/` 结尾（根目录除外）

/// 以 `cwd` 为当前目录解析 `input`，处理 `.`、`..`、绝对和相对路径
pub fn resolve_remote(cwd: &str, input: &str) -> String {
    let base = if input.starts_with('/') { "" } else { cwd };

    let mut parts: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(input.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }

    format!("/{}", parts.join("/"))
}

pub fn join_remote(base: &str, name: &str) -> String {
    let name = name.trim_matches('/');
    if base.trim_end_matches('/').is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

/// 路径的最后一段，根目录返回 None
pub fn remote_file_name(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}

/// 上级目录，根目录的上级还是根目录
pub fn remote_parent(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent.to_string(),
        _ => "/".to_string(),
    }
}

pub fn remote_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_absolute() {
        assert_eq!(resolve_remote("/", "docs"), "/docs");
        assert_eq!(resolve_remote("/docs", "a/b"), "/docs/a/b");
        assert_eq!(resolve_remote("/docs", "/cloud"), "/cloud");
        assert_eq!(resolve_remote("/docs/a", ".."), "/docs");
        assert_eq!(resolve_remote("/docs", "./x/../y/"), "/docs/y");
        assert_eq!(resolve_remote("/", "../.."), "/");
    }

    #[test]
    fn parent_of_paths() {
        assert_eq!(remote_parent("/docs/a.txt"), "/docs");
        assert_eq!(remote_parent("/a.txt"), "/");
        assert_eq!(remote_parent("/"), "/");
    }

    #[test]
    fn joins_without_double_slashes() {
        assert_eq!(join_remote("/", "a.txt"), "/a.txt");
        assert_eq!(join_remote("/docs/", "a.txt"), "/docs/a.txt");
        assert_eq!(join_remote("/docs", "sub/"), "/docs/sub");
    }

    #[test]
    fn file_name_of_root_is_none() {
        assert_eq!(remote_file_name("/"), None);
        assert_eq!(remote_file_name("/docs/a.txt"), Some("a.txt"));
        assert_eq!(remote_file_name("/docs/sub/"), Some("sub"));
    }
}

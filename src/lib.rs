//! reccli：基于 WebDAV 的云盘命令行客户端
//!
//! [`transfer`] 是与协议无关的传输引擎，[`webdav`] 提供协议实现，
//! [`workers`] 把两者组合成下载和上传。

pub mod cli;
pub mod commands;
pub mod common;
pub mod config;
pub mod shell;
pub mod transfer;
pub mod webdav;
pub mod workers;

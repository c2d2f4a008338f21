use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::transfer::DiskType;

/// 云盘命令行客户端
#[derive(Parser, Debug)]
#[command(name = "reccli")]
#[command(version)]
#[command(about = "一个简单的云盘命令行客户端 (WebDAV)", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, global = true, value_name = "FILE")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 保存服务器地址和账号
    Login {
        #[arg(long, value_name = "URL")]
        #[arg(value_hint = clap::ValueHint::Url)]
        endpoint: String,

        #[arg(long, short)]
        username: String,

        /// 不提供时从标准输入读取
        #[arg(long, short)]
        password: Option<String>,
    },

    /// 删除保存的账号
    Logout,

    /// 交互模式
    Shell,

    /// 执行一行交互模式命令
    Run {
        #[arg(short = 'c', long = "command", value_name = "LINE")]
        line: String,
    },

    #[command(flatten)]
    Remote(RemoteCommand),
}

/// 命令行和交互模式共用的远程操作
#[derive(Subcommand, Debug, Clone)]
pub enum RemoteCommand {
    /// 列出目录（表格）
    Ls {
        path: Option<String>,
        #[command(flatten)]
        disk: DiskArgs,
    },

    /// 列出目录（只有名称，目录以 / 结尾）
    Lsp {
        path: Option<String>,
        #[command(flatten)]
        disk: DiskArgs,
    },

    /// 创建目录
    Mkdir {
        path: String,
        #[command(flatten)]
        disk: DiskArgs,
    },

    /// 删除文件或目录
    Rm {
        path: String,
        #[command(flatten)]
        disk: DiskArgs,
    },

    /// 下载文件或目录
    Download {
        remote: String,

        /// 本地路径，已存在的目录会把远程项放到目录里
        #[arg(value_hint = clap::ValueHint::AnyPath)]
        local: Option<PathBuf>,

        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// 上传文件或目录到远程目录
    Upload {
        #[arg(value_hint = clap::ValueHint::AnyPath)]
        local: PathBuf,

        remote: String,

        #[command(flatten)]
        transfer: TransferArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct DiskArgs {
    /// 云盘类型: personal 或 group
    #[arg(long, value_name = "DISK", default_value_t = DiskType::Personal)]
    pub disk: DiskType,

    /// 群组 ID（--disk group 时必填）
    #[arg(long, value_name = "ID")]
    pub group: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TransferArgs {
    /// 并发数，默认使用配置文件中的值
    #[arg(long, short, value_name = "N")]
    pub workers: Option<usize>,

    #[command(flatten)]
    pub disk: DiskArgs,
}

/// 交互模式下的一行命令
#[derive(Parser, Debug)]
#[command(multicall = true, disable_help_subcommand = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

#[derive(Subcommand, Debug)]
pub enum ShellCommand {
    /// 切换当前目录
    Cd { path: Option<String> },

    /// 显示当前目录
    Pwd,

    /// 显示帮助
    Help,

    /// 退出
    #[command(alias = "quit")]
    Exit,

    #[command(flatten)]
    Remote(RemoteCommand),
}

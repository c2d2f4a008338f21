use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::{debug, info};

use reccli::cli::{Cli, Command};
use reccli::commands::{EXIT_CANCELLED, Session, exit_code, stdin_lines};
use reccli::common::logger::{PrettyLogger, init_tracing};
use reccli::config::{AppConfig, Credentials};
use reccli::shell::{Flow, run_line, run_shell};
use reccli::transfer::DiskType;
use reccli::webdav::WebDavClient;
use reccli::{log_error, log_success};

/// 校验账号后保存到配置文件
async fn login(
    path: &Path,
    mut config: AppConfig,
    endpoint: String,
    username: String,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => {
            println!("请输入密码:");
            stdin_lines()
                .next_line()
                .await?
                .context("没有读取到密码")?
        }
    };

    let credentials = Credentials { username, password };
    let client = WebDavClient::new(&endpoint, credentials.clone())?;
    client
        .list(DiskType::Personal, None, "/")
        .await
        .context("登录失败，请检查地址和账号")?;

    config.endpoint = Some(endpoint);
    config.username = Some(credentials.username.clone());
    config.password = Some(credentials.password);
    config.save(path)?;

    PrettyLogger::user_status("已登录", &credentials.username);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let path = match cli.config {
        Some(path) => path,
        None => AppConfig::default_path()?,
    };
    let config = AppConfig::load(&path)?;
    debug!("配置: {:?}", config);

    match cli.command {
        Command::Login {
            endpoint,
            username,
            password,
        } => login(&path, config, endpoint, username, password).await,
        Command::Logout => {
            let mut config = config;
            config.clear_credentials();
            config.save(&path)?;
            log_success!("已退出登录");
            Ok(())
        }
        Command::Shell => {
            let mut session = Session::new(config.with_env())?;
            run_shell(&mut session).await
        }
        Command::Run { line } => {
            let mut session = Session::new(config.with_env())?;
            if run_line(&mut session, &line).await? == Flow::Exit {
                info!("收到 exit");
            }
            Ok(())
        }
        Command::Remote(command) => {
            let mut session = Session::new(config.with_env())?;
            session.execute(command).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        let code = exit_code(&e);
        // 取消在传输结束时已经提示过
        if code != EXIT_CANCELLED {
            log_error!("{:#}", e);
        }
        std::process::exit(code);
    }
}

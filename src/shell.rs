use anyhow::{Result, bail};
use clap::{CommandFactory, Parser};
use colored::Colorize;
use std::io::Write;
use tracing::debug;

use crate::cli::{ShellCommand, ShellLine};
use crate::commands::{Session, is_cancelled};
use crate::log_error;

/// 执行一行命令的结果
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// 按空白切分，支持单双引号包裹含空格的参数
pub fn split_line(line: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_arg = false;

    for c in line.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_arg = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_arg = true;
            }
        }
    }

    if quote.is_some() {
        bail!("引号不匹配: {}", line);
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}

/// 执行一行交互命令
pub async fn run_line(session: &mut Session, line: &str) -> Result<Flow> {
    let args = split_line(line)?;
    if args.is_empty() {
        return Ok(Flow::Continue);
    }
    debug!("执行命令: {:?}", args);

    let parsed = match ShellLine::try_parse_from(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            // --help 之类的输出也走这里
            let _ = e.print();
            return Ok(Flow::Continue);
        }
    };

    match parsed.command {
        ShellCommand::Exit => return Ok(Flow::Exit),
        ShellCommand::Help => {
            let _ = ShellLine::command().print_help();
        }
        ShellCommand::Pwd => println!("{}", session.cwd()),
        ShellCommand::Cd { path } => session.cd(path.as_deref()).await?,
        ShellCommand::Remote(command) => session.execute(command).await?,
    }
    Ok(Flow::Continue)
}

/// 交互循环，命令出错时打印错误并继续
pub async fn run_shell(session: &mut Session) -> Result<()> {
    println!("{}", "输入 help 查看命令，exit 退出".bright_black());
    loop {
        print!("{} {} ", session.cwd().cyan(), ">".bold());
        std::io::stdout().flush()?;

        let Some(line) = session.read_line().await? else {
            println!();
            break;
        };
        match run_line(session, &line).await {
            Ok(Flow::Exit) => break,
            Ok(Flow::Continue) => {}
            // 取消已经提示过，继续等待下一条命令
            Err(e) if is_cancelled(&e) => {}
            Err(e) => log_error!("{:#}", e),
        }
    }
    Ok(())
}

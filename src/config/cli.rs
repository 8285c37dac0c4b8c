use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "grade-reminder")]
#[command(about = "Polls a grade query endpoint and pushes a notification when new grades appear")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[arg(long, short, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[arg(long, global = true, help = "Build the configuration from environment variables only")]
    pub from_env: bool,

    #[arg(long, short, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[arg(long, global = true, help = "Log process CPU and memory usage every round")]
    pub monitor: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// 持續輪詢（預設）
    Run,
    /// 只執行一輪後結束
    Check,
    /// 寫出範例設定檔
    Init {
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
    /// 載入並驗證設定檔
    Validate,
}

impl CliArgs {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }
}

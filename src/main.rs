use anyhow::{Context, Result};
use clap::Parser;
use question_bank_extract::utils::logging;
use question_bank_extract::{App, Config, RunOptions, Stage};
use std::path::PathBuf;

/// 从试卷 PDF 构建结构化题库
#[derive(Debug, Parser)]
#[command(name = "question_bank_extract", version)]
struct Cli {
    /// TOML 配置文件（默认读取当前目录的 question_bank.toml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 要运行的阶段
    #[arg(long, value_enum, default_value_t = Stage::All)]
    stage: Stage,

    /// 重新生成定位结果和向量
    #[arg(long)]
    force: bool,

    /// 检索文本（search 阶段）
    #[arg(long)]
    query: Option<String>,

    /// 检索返回条数
    #[arg(long)]
    top_k: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = Config::load(cli.config.as_deref()).context("加载配置失败")?;

    // 初始化日志
    logging::init(config.verbose_logging);

    let options = RunOptions {
        stage: cli.stage,
        force: cli.force,
        query: cli.query,
        top_k: cli.top_k,
    };

    // 初始化并运行应用
    App::initialize(config, options)?.run().await?;

    Ok(())
}

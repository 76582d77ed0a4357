//! # 图像工作室 — 命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与配置叠加。
//! 业务逻辑分布在 `studio` 子模块中，详见 `lib.rs` 架构文档。

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde_json::json;

use image_studio::error::AppError;
use image_studio::studio::{
    AspectRatio, Feature, FormSession, MaskStroke, PresentedResult, StudioConfig, SubmissionState,
};

/// AI 图像编辑服务客户端：画遮罩、打包并提交 inpaint / erase / generate 请求。
#[derive(Parser, Debug)]
#[command(name = "image-studio")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON 配置文件路径。
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 覆盖服务基础地址（优先级高于配置文件与环境变量）。
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    /// 结果输出目录。
    #[arg(long, global = true, default_value = ".", value_name = "DIR")]
    out: PathBuf,

    /// 以 JSON 输出结果。
    #[arg(long, global = true)]
    json: bool,

    /// 输出调试日志。
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 根据提示词生成图片。
    Generate {
        #[arg(short, long)]
        prompt: String,

        /// 宽高比：1:1 / 16:9 / 9:16 / 4:3。
        #[arg(short, long, default_value = "1:1")]
        aspect_ratio: String,
    },
    /// 按遮罩重绘图片。给出 `--mask` 时使用上传遮罩，否则使用笔画。
    Inpaint {
        #[command(flatten)]
        canvas: CanvasArgs,

        /// 手动上传的遮罩文件（白色为重绘区域）。
        #[arg(long, value_name = "PATH", conflicts_with = "strokes")]
        mask: Option<PathBuf>,

        #[arg(short, long)]
        prompt: String,
    },
    /// 擦除遮罩区域并自然填充。
    Erase {
        #[command(flatten)]
        canvas: CanvasArgs,

        /// 可选的填充指令，留空使用默认值。
        #[arg(short, long, default_value = "")]
        prompt: String,
    },
    /// 仅在本地渲染二值遮罩 PNG（与上传内容一致），不发起请求。
    Mask {
        #[command(flatten)]
        canvas: CanvasArgs,

        /// 输出文件名（位于 `--out` 目录下）。
        #[arg(long, default_value = "mask.png")]
        file_name: String,
    },
}

#[derive(Args, Debug)]
struct CanvasArgs {
    /// 原图路径。
    #[arg(short, long, value_name = "PATH")]
    image: PathBuf,

    /// 笔画 JSON 文件（画布显示坐标系下的 `MaskStroke` 数组）。
    #[arg(short, long, value_name = "PATH")]
    strokes: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match run(&cli).await {
        Ok(output) => {
            if cli.json {
                println!("{}", json!({ "ok": true, "result": output.result, "path": output.path }));
            } else {
                println!("{}", output.path.display());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{}", err);
            if cli.json {
                println!(
                    "{}",
                    json!({ "ok": false, "code": err.code(), "message": err.user_message(), "error": err })
                );
            } else {
                eprintln!("{}", err.user_message());
            }
            ExitCode::FAILURE
        }
    }
}

struct RunOutput {
    result: Option<PresentedResult>,
    path: PathBuf,
}

async fn run(cli: &Cli) -> Result<RunOutput, AppError> {
    let config = load_config(cli)?;

    match &cli.command {
        Command::Generate { prompt, aspect_ratio } => {
            let mut session = FormSession::new(Feature::Generate, config)?;
            session.set_prompt(prompt.as_str());
            session.set_aspect_ratio(AspectRatio::from_str(aspect_ratio)?);
            submit_and_save(session, &cli.out).await
        }
        Command::Inpaint { canvas, mask, prompt } => {
            let feature = if mask.is_some() { Feature::InpaintUpload } else { Feature::Inpaint };
            let mut session = FormSession::new(feature, config)?;
            session.select_image_file(&canvas.image).await?;
            match mask {
                Some(mask) => {
                    session.select_mask_file(mask).await?;
                }
                None => apply_strokes(&mut session, canvas.strokes.as_deref())?,
            }
            session.set_prompt(prompt.as_str());
            submit_and_save(session, &cli.out).await
        }
        Command::Erase { canvas, prompt } => {
            let mut session = FormSession::new(Feature::Erase, config)?;
            session.select_image_file(&canvas.image).await?;
            apply_strokes(&mut session, canvas.strokes.as_deref())?;
            session.set_prompt(prompt.as_str());
            submit_and_save(session, &cli.out).await
        }
        Command::Mask { canvas, file_name } => {
            let mut session = FormSession::new(Feature::Erase, config)?;
            session.select_image_file(&canvas.image).await?;
            apply_strokes(&mut session, canvas.strokes.as_deref())?;

            let mask = session.export_mask_png()?;

            std::fs::create_dir_all(&cli.out)?;
            let path = cli.out.join(file_name);
            std::fs::write(&path, &mask)?;
            log::info!("💾 遮罩已保存：{}", path.display());

            Ok(RunOutput { result: None, path })
        }
    }
}

/// 配置叠加：默认值 / 配置文件 → 环境变量 → 命令行参数。
fn load_config(cli: &Cli) -> Result<StudioConfig, AppError> {
    let config = match &cli.config {
        Some(path) => StudioConfig::load_from_path(path)?,
        None => StudioConfig::default(),
    };

    let mut config = config.with_env_overrides();
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.trim().to_string();
    }

    config.validate()?;
    log::debug!("⚙️ 服务地址：{}", config.base_url);
    Ok(config)
}

fn apply_strokes(session: &mut FormSession, strokes_path: Option<&Path>) -> Result<(), AppError> {
    let Some(path) = strokes_path else {
        log::warn!("未提供笔画文件，遮罩为空（不会修改任何区域）");
        return Ok(());
    };

    let content = std::fs::read_to_string(path)?;
    let strokes: Vec<MaskStroke> = serde_json::from_str(&content)
        .map_err(|e| AppError::InvalidInput(format!("笔画文件 {} 解析失败：{}", path.display(), e)))?;

    let recorder = session.recorder_mut()?;
    let count = strokes.len();
    for stroke in strokes {
        recorder.push_stroke(stroke);
    }

    log::info!("🖌️ 已载入 {} 笔画", count);
    Ok(())
}

async fn submit_and_save(mut session: FormSession, out: &Path) -> Result<RunOutput, AppError> {
    let presented = session
        .submit_with_hooks(|state| match state {
            SubmissionState::Submitting { attempt } => log::info!("📤 正在提交（第 {} 次）...", attempt),
            SubmissionState::Retrying { delay, last_error, .. } => {
                log::warn!("🔁 {}；{}ms 后重试", last_error, delay.as_millis())
            }
            state if state.is_terminal() => log::info!("🏁 提交结束：{:?}", state),
            _ => log::debug!("状态：{:?}", state),
        })
        .await?;

    let path = session.save_download(out)?;
    Ok(RunOutput {
        result: Some(presented),
        path,
    })
}

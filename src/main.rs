mod cli;

use clipforge::{config, render};

use anyhow::{Context, Result};
use cf_av::{FfmpegTranscoder, FfprobeProber, ToolRegistry};
use cf_core::JobId;
use cf_merge::{Inspector, JsonLinesRecorder, MergeRecorder, MergeResult, MergeService, NoopRecorder};
use clap::Parser;
use cli::{Cli, Commands};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipforge=trace,cf_merge=trace,cf_av=debug".to_string()
        } else {
            "clipforge=info,cf_merge=info,cf_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Merge {
            inputs,
            name,
            work_root,
            json,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(merge(inputs, &name, work_root, json, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json, cli.config.as_deref()))
        }
        Commands::CheckTools => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("clipforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn merge(
    inputs: Vec<PathBuf>,
    name: &str,
    work_root: Option<PathBuf>,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(root) = work_root {
        config.merge.work_root = root;
    }

    for input in &inputs {
        if !input.exists() {
            anyhow::bail!("Input file does not exist: {:?}", input);
        }
    }

    let registry = ToolRegistry::discover(&config.tools);
    let ffprobe = registry.require("ffprobe")?;
    let ffmpeg = registry.require("ffmpeg")?;
    let prober = Arc::new(FfprobeProber::new(
        ffprobe.path.clone(),
        config.tools.probe_timeout(),
    ));
    let transcoder = Arc::new(FfmpegTranscoder::new(
        ffmpeg.path.clone(),
        config.merge.encode_timeout(),
    ));

    let wants_hw = config
        .merge
        .hw_accel
        .as_deref()
        .is_some_and(|m| m != "none");
    let hw_encoders = if wants_hw {
        registry.detect_hw_encoders().await
    } else {
        Vec::new()
    };

    let recorder: Arc<dyn MergeRecorder> = match &config.records.path {
        Some(path) => {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            Arc::new(JsonLinesRecorder::new(expanded))
        }
        None => Arc::new(NoopRecorder),
    };

    let service = MergeService::new(prober, transcoder, Arc::new(config), recorder)
        .with_hw_encoders(&hw_encoders);
    tracing::info!(
        encoder = service.encoder().video_encoder,
        inputs = inputs.len(),
        "Starting merge"
    );

    let handle = service.submit(JobId::new(), inputs, name, move |update| {
        if !json {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "\r{}", render::progress_line(&update));
            let _ = stderr.flush();
        }
    });

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling merge");
            cancel.cancel();
        }
    });

    let result = handle.wait().await;
    if !json {
        eprintln!();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", render::result_summary(&result));
    }

    match result {
        MergeResult::Done { .. } => Ok(()),
        MergeResult::Failed { error_kind, .. } => {
            anyhow::bail!("Merge failed ({error_kind})")
        }
    }
}

async fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let registry = ToolRegistry::discover(&config.tools);
    let ffprobe = registry.require("ffprobe")?;
    let prober = FfprobeProber::new(ffprobe.path.clone(), config.tools.probe_timeout());

    let info = Inspector::new(&prober)
        .inspect(file)
        .await
        .with_context(|| format!("Failed to probe {:?}", file))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File: {}", info.path.display());
    println!("Container: {}", info.container);
    println!("Size: {} bytes", info.file_size);
    println!("Duration: {}", render::clock(info.duration));
    println!(
        "Video: {} {}x{} {:.3} fps {}",
        info.video_codec, info.width, info.height, info.frame_rate, info.pixel_format
    );
    match &info.audio_codec {
        Some(codec) => {
            print!("Audio: {}", codec);
            if let Some(rate) = info.audio_sample_rate {
                print!(" {} Hz", rate);
            }
            if let Some(ch) = info.audio_channels {
                print!(" {}ch", ch);
            }
            println!(" ({} track(s))", info.audio_streams);
        }
        None => println!("Audio: none"),
    }
    println!("Subtitles: {}", if info.has_subtitles { "yes" } else { "no" });

    Ok(())
}

async fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let registry = ToolRegistry::discover(&config.tools);
    let tools = registry.check_all().await;
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    let hw = registry.detect_hw_encoders().await;
    if hw.is_empty() {
        println!("\nHardware encoders: none (software libx264 will be used)");
    } else {
        println!("\nHardware encoders: {}", hw.join(", "));
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg and ffprobe to merge files.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Work root: {}", config.merge.work_root.display());
    println!("  Container: {}", config.merge.container);
    println!("  Quality: {}", config.merge.quality);
    println!(
        "  Hardware acceleration: {}",
        config.merge.hw_accel.as_deref().unwrap_or("none")
    );
    println!(
        "  Target: {} fps, {}, {} Hz, {}ch",
        config.target.frame_rate,
        config.target.pixel_format,
        config.target.audio_sample_rate,
        config.target.audio_channels
    );
    if let Some(ref records) = config.records.path {
        println!("  Merge log: {}", records.display());
    }

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for w in &warnings {
            println!("  - {}", w);
        }
    }

    Ok(())
}

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use specmap_session::{
    init_tracing, HttpProcessingClient, NamedBlob, Preview, ServiceConfig, SessionError,
    SessionOrchestrator, TransformAction,
};

/// Run one upload/transform/export pass against the processing service
#[derive(Parser)]
#[command(name = "specmap")]
#[command(version)]
struct Cli {
    /// Data files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Config file (defaults to <config dir>/specmap/session.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the service base URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Apply the energy-loss conversion after upload
    #[arg(long)]
    convert: bool,

    /// Transform to apply, in order (flip_ud, flip_lr, rotate_ccw90, rotate_cw90, blur, sharpen, reset)
    #[arg(short, long = "transform", value_name = "ACTION")]
    transforms: Vec<TransformAction>,

    /// Reset to the post-upload state after the transforms
    #[arg(long)]
    reset: bool,

    /// Export the resulting dataset
    #[arg(long)]
    export: bool,

    /// Save the final preview image to this path (extension is added)
    #[arg(long, value_name = "PATH")]
    save_preview: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match cli.config.clone().or_else(ServiceConfig::default_path) {
        Some(path) => ServiceConfig::load_or_default(&path)?,
        None => ServiceConfig::default(),
    };
    if let Some(url) = cli.base_url.clone() {
        config.base_url = url;
    }

    let client = HttpProcessingClient::new(&config)?;
    let mut session = SessionOrchestrator::new(client);

    let files = read_files(&cli.files).await?;
    let outcome = session.ingest(files).await?;
    let mut preview = outcome.preview;
    print_preview("upload", &preview);
    if let Some(e) = outcome.conversion_error {
        bail!("Upload kept, but conversion failed: {}", e);
    }

    if cli.convert {
        preview = session.set_conversion_enabled(true).await?;
        print_preview("convert", &preview);
    }

    for action in &cli.transforms {
        preview = session.transform(*action).await?;
        print_preview(action.as_str(), &preview);
    }

    if cli.reset {
        preview = session.reset_to_initial()?;
        print_preview("reset", &preview);
    }

    if cli.export {
        match session.export_dataset().await {
            Ok(result) => {
                for url in &result.file_references {
                    println!("export: {}", url);
                }
            }
            Err(SessionError::NoFilesProduced) => println!("export: no files available"),
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(path) = &cli.save_preview {
        let image = session.client().fetch_image(&preview.image).await?;
        let target = path.with_extension(image.extension());
        tokio::fs::write(&target, &image.bytes)
            .await
            .with_context(|| format!("Failed to write {:?}", target))?;
        println!("saved: {}", target.display());
    }

    Ok(())
}

async fn read_files(paths: &[PathBuf]) -> Result<Vec<NamedBlob>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(read_file(path).await?);
    }
    info!("Read {} files", files.len());
    Ok(files)
}

async fn read_file(path: &Path) -> Result<NamedBlob> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        bail!("Not a file path: {:?}", path);
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    Ok(NamedBlob::new(name, bytes))
}

fn print_preview(step: &str, preview: &Preview) {
    println!("{}: {:?} {}", step, preview.kind, preview.image);
}

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use container_inspector::dockerfile::{align_image_to_dockerfile, DockerfileInstruction};
use container_inspector::layout::{detect_layout, Layout};
use container_inspector::loader::{docker, get_images_from_tarball, oci, LoadOptions};
use container_inspector::squash::rebuild_rootfs;
use container_inspector::Image;
use env_logger::Env;
use log::{debug, info, LevelFilter};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Verbose mode (-v for info, -vv for debug, -vvv for trace)"
    )]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Print every image's parsed metadata as JSON (or CSV with --csv).
    Inspect {
        /// Path to an extracted image directory or a `docker save`/OCI tarball.
        image_path: PathBuf,

        #[arg(long, help = "Verify config and layer digests against the manifest")]
        verify: bool,

        #[arg(long, help = "Emit one CSV record per layer instead of JSON")]
        csv: bool,
    },
    /// Replay the first image's layers into a squashed root filesystem.
    Squash {
        /// Path to an extracted image directory or a `docker save`/OCI tarball.
        image_path: PathBuf,
        target_dir: PathBuf,

        #[arg(long)]
        verify: bool,
    },
    /// Align the first image's layer history to a pre-parsed Dockerfile.
    Dockerfile {
        /// Path to an extracted image directory or a `docker save`/OCI tarball.
        image_path: PathBuf,
        /// JSON file: an array of `{"instruction": "...", "value": "..."}`
        /// objects, in Dockerfile order, leading `FROM` included.
        instructions_file: PathBuf,

        #[arg(long)]
        verify: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_env(Env::default())
        .filter_level(log_level)
        .init();

    match cli.command {
        Command::Inspect { image_path, verify, csv } => inspect(&image_path, verify, csv),
        Command::Squash { image_path, target_dir, verify } => squash(&image_path, &target_dir, verify),
        Command::Dockerfile { image_path, instructions_file, verify } => {
            dockerfile_align(&image_path, &instructions_file, verify)
        }
    }
}

/// Loads every image at `image_path`, which may be an already-extracted
/// image directory or a top-level `docker save`/OCI tarball.
fn load_images(image_path: &Path, verify: bool) -> Result<Vec<Image>> {
    let opts = LoadOptions { verify };

    if image_path.is_file() {
        debug!("treating {} as a tarball archive", image_path.display());
        return get_images_from_tarball(image_path, opts).map_err(Into::into);
    }

    match detect_layout(image_path) {
        Layout::Docker => {
            debug!("detected docker layout at {}", image_path.display());
            docker::load(image_path, opts).map_err(Into::into)
        }
        Layout::Oci => {
            debug!("detected OCI layout at {}", image_path.display());
            oci::load(image_path, opts).map_err(Into::into)
        }
        Layout::LegacyV10 => Err(anyhow!(
            "{} looks like a legacy v1.0 image repository, which this tool can detect but not load",
            image_path.display()
        )),
        Layout::Unknown(reason) => Err(anyhow!("cannot classify {}: {}", image_path.display(), reason)),
    }
}

fn inspect(image_path: &Path, verify: bool, csv: bool) -> Result<()> {
    info!("inspecting image(s) at {}", image_path.display());
    let images = load_images(image_path, verify)?;

    if csv {
        println!("image_index,layer_index,layer_id,created_by,size_bytes,is_empty_layer");
        for (img_idx, image) in images.iter().enumerate() {
            for (i, layer) in image.layers.iter().enumerate() {
                println!(
                    "{},{},{},{:?},{},{}",
                    img_idx,
                    i,
                    layer.layer_id,
                    layer.created_by.clone().unwrap_or_default(),
                    layer.size_bytes,
                    layer.is_empty_layer
                );
            }
        }
    } else {
        serde_json::to_writer_pretty(std::io::stdout(), &images).context("failed to serialize images")?;
        println!();
    }

    Ok(())
}

fn first_image(images: Vec<Image>, image_path: &Path) -> Result<Image> {
    if images.len() > 1 {
        log::warn!(
            "{} contains {} images; operating on the first one only",
            image_path.display(),
            images.len()
        );
    }
    images
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("{} contains no images", image_path.display()))
}

fn squash(image_path: &Path, target_dir: &Path, verify: bool) -> Result<()> {
    info!("squashing image at {} into {}", image_path.display(), target_dir.display());
    let image = first_image(load_images(image_path, verify)?, image_path)?;
    let deletions = rebuild_rootfs(&image, target_dir)?;
    info!("squash complete: {} paths deleted by whiteouts", deletions.len());
    Ok(())
}

fn dockerfile_align(image_path: &Path, instructions_file: &Path, verify: bool) -> Result<()> {
    let image = first_image(load_images(image_path, verify)?, image_path)?;
    let content = std::fs::read_to_string(instructions_file)
        .with_context(|| format!("failed to read {}", instructions_file.display()))?;
    let mut instructions: Vec<DockerfileInstruction> =
        serde_json::from_str(&content).context("failed to parse instructions file")?;

    if instructions.first().map(|i| i.instruction.as_str()) == Some("FROM") {
        instructions.remove(0);
    }

    let alignments = align_image_to_dockerfile(&image, &instructions)?;
    for alignment in alignments {
        println!("layer[{}] -> {}", alignment.layer_index, alignment.instruction);
    }
    Ok(())
}

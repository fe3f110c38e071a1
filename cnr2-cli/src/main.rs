//! # cnr2
//!
//! Temporal chroma noise reduction for YUV4MPEG2 files.
//!
//! ## Usage
//! ```bash
//! cnr2 in.y4m out.y4m
//!
//! # Parameters from a JSON file, one value overridden
//! cnr2 in.y4m out.y4m --params strong.json --scdthr 5
//!
//! # Per-frame scene-change logging
//! RUST_LOG=cnr2_core=debug cnr2 in.y4m out.y4m
//! ```

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, info};

use cnr2_core::y4m::{Y4mReader, Y4mWriter};
use cnr2_core::{Cnr2, Cnr2Params, FilterStats, FrameSource, Sample};

type FileReader = Y4mReader<BufReader<File>>;

#[derive(Parser, Debug)]
#[command(
    name = "cnr2",
    version,
    about = "Temporal chroma noise reduction for YUV4MPEG2 streams"
)]
struct Cli {
    /// Input file (.y4m)
    input: PathBuf,
    /// Output file (.y4m)
    output: PathBuf,
    /// JSON parameter file; missing fields keep their defaults
    #[arg(short, long)]
    params: Option<PathBuf>,
    /// Curve selectors for Y, U, V ('x' = linear, anything else = quadratic)
    #[arg(long)]
    mode: Option<String>,
    /// Scene-change threshold in percent (0-100)
    #[arg(long)]
    scdthr: Option<f64>,
    /// Luma radius
    #[arg(long)]
    ln: Option<i32>,
    /// Luma amplitude
    #[arg(long)]
    lm: Option<i32>,
    /// U radius
    #[arg(long)]
    un: Option<i32>,
    /// U amplitude
    #[arg(long)]
    um: Option<i32>,
    /// V radius
    #[arg(long)]
    vn: Option<i32>,
    /// V amplitude
    #[arg(long)]
    vm: Option<i32>,
    /// Count chroma differences towards scene detection
    #[arg(long, overrides_with = "no_scene_chroma")]
    scene_chroma: bool,
    /// Luma-only scene detection, even if the parameter file enables chroma
    #[arg(long, overrides_with = "scene_chroma")]
    no_scene_chroma: bool,
}

impl Cli {
    /// Defaults, then the parameter file, then command-line values.
    fn resolve_params(&self) -> Result<Cnr2Params> {
        let mut params = match &self.params {
            Some(path) => Cnr2Params::from_json_file(path)
                .with_context(|| format!("reading parameters from {}", path.display()))?,
            None => Cnr2Params::default(),
        };

        if let Some(mode) = &self.mode {
            params.mode = mode.clone();
        }
        if let Some(scdthr) = self.scdthr {
            params.scdthr = scdthr;
        }
        for (value, slot) in [
            (self.ln, &mut params.ln),
            (self.lm, &mut params.lm),
            (self.un, &mut params.un),
            (self.um, &mut params.um),
            (self.vn, &mut params.vn),
            (self.vm, &mut params.vm),
        ] {
            if let Some(value) = value {
                *slot = value;
            }
        }
        if self.scene_chroma {
            params.scene_chroma = true;
        } else if self.no_scene_chroma {
            params.scene_chroma = false;
        }

        params.validate()?;
        Ok(params)
    }
}

/// Filter every frame of `reader` into `output`.
fn run<T: Sample>(reader: FileReader, params: Cnr2Params, output: &Path) -> Result<FilterStats>
where
    FileReader: FrameSource<T>,
{
    let header = reader.header().clone();
    let mut cnr = Cnr2::<T, _>::new(reader, params)?;
    let mut writer =
        Y4mWriter::create(output, &header).with_context(|| format!("creating {}", output.display()))?;

    let total = cnr.frame_count();
    for n in 0..total {
        let frame = cnr.get_frame(n).with_context(|| format!("filtering frame {}", n))?;
        writer.write_frame(&frame).with_context(|| format!("writing frame {}", n))?;
        if (n + 1) % 100 == 0 {
            debug!("{}/{} frames", n + 1, total);
        }
    }
    writer.finish()?;

    Ok(cnr.stats())
}

fn filter_file(cli: &Cli) -> Result<FilterStats> {
    let params = cli.resolve_params()?;
    debug!("Parameters: {}", params.to_json()?);

    let reader =
        Y4mReader::open(&cli.input).with_context(|| format!("opening {}", cli.input.display()))?;
    let format = reader.header().format()?;

    match format.bytes_per_sample() {
        1 => run::<u8>(reader, params, &cli.output),
        2 => run::<u16>(reader, params, &cli.output),
        n => bail!("{}-byte samples are not supported", n),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cnr2=info".parse()?)
                .add_directive("cnr2_core=info".parse()?),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    info!("cnr2 v{}: {} -> {}", env!("CARGO_PKG_VERSION"), cli.input.display(), cli.output.display());

    let start = Instant::now();
    let stats = filter_file(&cli)?;
    let frames = stats.frames_blended + stats.scene_changes + stats.passthrough;

    info!(
        "{} frames in {:.2?}: {} blended, {} scene changes, {} cache misses",
        frames,
        start.elapsed(),
        stats.frames_blended,
        stats.scene_changes,
        stats.cache_misses
    );
    Ok(())
}

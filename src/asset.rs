//! Reference/distorted raw yuv pairs & their pixel formats.
use anyhow::{Context, bail, ensure};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Raw planar yuv layout, a.k.a. `yuv_type`.
#[derive(
    clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[clap(rename_all = "lower")]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Yuv420p,
    Yuv422p,
    Yuv444p,
    Yuv420p10le,
    Yuv422p10le,
    Yuv444p10le,
}

impl PixelFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Yuv420p10le => "yuv420p10le",
            Self::Yuv422p10le => "yuv422p10le",
            Self::Yuv444p10le => "yuv444p10le",
        }
    }

    pub fn bit_depth(self) -> u8 {
        match self {
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => 8,
            Self::Yuv420p10le | Self::Yuv422p10le | Self::Yuv444p10le => 10,
        }
    }

    /// Chroma subsampling as the engine names it.
    pub fn chroma(self) -> &'static str {
        match self {
            Self::Yuv420p | Self::Yuv420p10le => "420",
            Self::Yuv422p | Self::Yuv422p10le => "422",
            Self::Yuv444p | Self::Yuv444p10le => "444",
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self.bit_depth() {
            8 => 1,
            _ => 2,
        }
    }

    /// Luma & chroma plane dimensions. Odd luma sizes round the chroma size up.
    pub fn plane_dimensions(self, width: usize, height: usize) -> [(usize, usize); 3] {
        let (ss_x, ss_y) = match self.chroma() {
            "420" => (1, 1),
            "422" => (1, 0),
            _ => (0, 0),
        };
        let chroma = ((width + ss_x) >> ss_x, (height + ss_y) >> ss_y);
        [(width, height), chroma, chroma]
    }

    /// Size in bytes of a single frame.
    pub fn frame_size(self, width: usize, height: usize) -> usize {
        self.plane_dimensions(width, height)
            .iter()
            .map(|(w, h)| w * h)
            .sum::<usize>()
            * self.bytes_per_sample()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl FromStr for PixelFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "yuv420p" => Self::Yuv420p,
            "yuv422p" => Self::Yuv422p,
            "yuv444p" => Self::Yuv444p,
            "yuv420p10le" => Self::Yuv420p10le,
            "yuv422p10le" => Self::Yuv422p10le,
            "yuv444p10le" => Self::Yuv444p10le,
            _ => bail!("unsupported yuv_type `{s}`"),
        })
    }
}

/// A reference/distorted pair to score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default)]
    pub content_id: u32,
    #[serde(default)]
    pub asset_id: u32,
    pub ref_path: PathBuf,
    pub dis_path: PathBuf,
    pub width: usize,
    pub height: usize,
    #[serde(default = "default_yuv_type")]
    pub yuv_type: PixelFormat,
}

fn default_dataset() -> String {
    "cmd".into()
}

fn default_yuv_type() -> PixelFormat {
    PixelFormat::Yuv420p
}

impl Asset {
    /// Asset scoring the reference against itself, next asset_id.
    pub fn reference_vs_itself(&self) -> Self {
        Self {
            asset_id: self.asset_id + 1,
            dis_path: self.ref_path.clone(),
            ..self.clone()
        }
    }

    pub fn is_reference_vs_itself(&self) -> bool {
        self.ref_path == self.dis_path
    }

    pub fn frame_size(&self) -> usize {
        self.yuv_type.frame_size(self.width, self.height)
    }

    /// Number of frames that will be scored, i.e. of the shorter file.
    pub fn frame_count(&self) -> anyhow::Result<u64> {
        let reference = frame_count(&self.ref_path, self.frame_size())?;
        if self.is_reference_vs_itself() {
            return Ok(reference);
        }
        Ok(reference.min(frame_count(&self.dis_path, self.frame_size())?))
    }

    /// Short description for logs & output, e.g. `test/0/1`.
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.dataset, self.content_id, self.asset_id)
    }

    pub fn ensure_valid(&self) -> anyhow::Result<()> {
        ensure!(
            self.width > 0 && self.height > 0,
            "invalid asset {} dimensions {}x{}",
            self.label(),
            self.width,
            self.height
        );
        Ok(())
    }
}

fn frame_count(path: &Path, frame_size: usize) -> anyhow::Result<u64> {
    ensure!(frame_size > 0, "{} has an empty frame size", path.display());
    let len = std::fs::metadata(path)
        .with_context(|| format!("could not read {}", path.display()))?
        .len();
    let frame_size = frame_size as u64;
    ensure!(
        len % frame_size == 0,
        "{} size {len} is not a whole number of {frame_size} byte frames",
        path.display()
    );
    Ok(len / frame_size)
}

/// Read a json array of assets.
pub fn load_assets(path: &Path) -> anyhow::Result<Vec<Asset>> {
    let data =
        std::fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
    let assets: Vec<Asset> = serde_json::from_slice(&data)
        .with_context(|| format!("invalid assets json {}", path.display()))?;
    for asset in &assets {
        asset.ensure_valid()?;
    }
    Ok(assets)
}

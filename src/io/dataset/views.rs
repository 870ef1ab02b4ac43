use std::path::{Path, PathBuf};

use log::debug;
use nshare::ToNdarray2;

use crate::{
    camera::CameraIntrinsics,
    error::{Error, Result},
    image::{IntoArray3, RgbdImage},
};

use super::RgbdDataset;

/// Multi-view RGB-D capture stored as
///
/// ```text
/// <base_dir>/depth/depth0.png  (16 bits, millimeters)
/// <base_dir>/color/color0.png  (8 bits RGB)
/// <base_dir>/intrinsics.json   (optional, see [`CameraIntrinsics`])
/// ```
///
/// with one depth and one color image per view index.
pub struct ViewDataset {
    base_dir: PathBuf,
    num_views: usize,
    intrinsics: CameraIntrinsics,
}

fn view_index(path: &Path, prefix: &str) -> Option<usize> {
    path.file_stem()?
        .to_str()?
        .strip_prefix(prefix)?
        .parse::<usize>()
        .ok()
}

impl ViewDataset {
    /// Opens a dataset directory. The number of views is the highest depth image index plus one.
    pub fn load<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        if !base_dir.is_dir() {
            return Err(Error::input(format!(
                "Dataset directory {} does not exist",
                base_dir.display()
            )));
        }

        let pattern = base_dir.join("depth").join("depth*.png");
        let pattern = pattern
            .to_str()
            .ok_or_else(|| Error::invalid_parameter("Dataset path is not valid UTF-8"))?;
        let num_views = glob::glob(pattern)
            .map_err(|err| Error::invalid_parameter(format!("Invalid dataset path: {err}")))?
            .filter_map(|entry| entry.ok())
            .filter_map(|path| view_index(&path, "depth"))
            .max()
            .map(|max_index| max_index + 1)
            .ok_or_else(|| {
                Error::input(format!(
                    "No depth images found in {}",
                    base_dir.join("depth").display()
                ))
            })?;

        let intrinsics_path = base_dir.join("intrinsics.json");
        let intrinsics = if intrinsics_path.is_file() {
            let file = std::fs::File::open(&intrinsics_path)?;
            serde_json::from_reader(std::io::BufReader::new(file))?
        } else {
            CameraIntrinsics::default()
        };

        debug!("Dataset {} has {} views", base_dir.display(), num_views);
        Ok(Self {
            base_dir,
            num_views,
            intrinsics,
        })
    }

    /// Restricts or extends the number of views, views without files fail when loaded.
    pub fn with_num_views(mut self, num_views: usize) -> Self {
        self.num_views = num_views;
        self
    }

    pub fn with_intrinsics(mut self, intrinsics: CameraIntrinsics) -> Self {
        self.intrinsics = intrinsics;
        self
    }

    pub fn depth_path(&self, index: usize) -> PathBuf {
        self.base_dir
            .join("depth")
            .join(format!("depth{index}.png"))
    }

    pub fn color_path(&self, index: usize) -> PathBuf {
        self.base_dir
            .join("color")
            .join(format!("color{index}.png"))
    }
}

fn check_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::input(format!("Missing file {}", path.display())))
    }
}

impl RgbdDataset for ViewDataset {
    fn len(&self) -> usize {
        self.num_views
    }

    fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    fn get(&self, index: usize) -> Result<RgbdImage> {
        let depth_path = self.depth_path(index);
        let color_path = self.color_path(index);
        check_exists(&depth_path)?;
        check_exists(&color_path)?;

        let depth = image::open(&depth_path)?.into_luma16().into_ndarray2();
        let color = image::open(&color_path)?.into_rgb8().into_array3()?;

        RgbdImage::new(color, depth)
    }
}

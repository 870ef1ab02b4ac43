use crate::{
    camera::CameraIntrinsics,
    error::{Error, Result},
    image::RgbdImage,
};

/// A collection of RGB-D views captured by the same sensor.
pub trait RgbdDataset: Sync {
    /// Number of views, including those that may fail to load.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Intrinsics shared by all views.
    fn intrinsics(&self) -> &CameraIntrinsics;

    /// Loads one view.
    ///
    /// # Errors
    ///
    /// [`Error::Input`] or [`Error::Image`] if the view's rasters are missing or malformed.
    fn get(&self, index: usize) -> Result<RgbdImage>;
}

/// Dataset held in memory, views set to `None` report an input error when loaded.
#[derive(Clone)]
pub struct InMemoryDataset {
    intrinsics: CameraIntrinsics,
    views: Vec<Option<RgbdImage>>,
}

impl InMemoryDataset {
    pub fn new(intrinsics: CameraIntrinsics, views: Vec<Option<RgbdImage>>) -> Self {
        Self { intrinsics, views }
    }
}

impl RgbdDataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.views.len()
    }

    fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    fn get(&self, index: usize) -> Result<RgbdImage> {
        match self.views.get(index) {
            Some(Some(image)) => Ok(image.clone()),
            Some(None) => Err(Error::input(format!("View {index} is not available"))),
            None => Err(Error::input(format!(
                "View {index} is out of range, dataset has {} views",
                self.views.len()
            ))),
        }
    }
}

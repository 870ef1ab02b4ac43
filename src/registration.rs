use std::collections::BTreeMap;
use std::path::Path;

use log::{error, info, warn};
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::{
    camera::CameraIntrinsics,
    error::{Error, Result},
    icp::{Icp, IcpParams, IcpResult},
    image::RgbdImage,
    io::{dataset::RgbdDataset, Visualizer},
    normals::NormalEstimator,
    pointcloud::PointCloud,
    sampling::Downsample,
};

/// Turns one RGB-D view into a downsampled point cloud with normals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewPipeline {
    /// Voxel grid edge length in meters.
    pub leaf_size: f32,
    /// Neighborhood radius of the normal estimation in meters.
    pub normal_radius: f32,
    /// Neighbors needed for a valid normal.
    pub min_neighbors: usize,
}

impl Default for ViewPipeline {
    fn default() -> Self {
        Self {
            leaf_size: 0.01,
            normal_radius: 0.01,
            min_neighbors: 3,
        }
    }
}

impl ViewPipeline {
    pub fn with_leaf_size(mut self, leaf_size: f32) -> Self {
        self.leaf_size = leaf_size;
        self
    }

    pub fn with_normal_radius(mut self, normal_radius: f32) -> Self {
        self.normal_radius = normal_radius;
        self
    }

    pub fn with_min_neighbors(mut self, min_neighbors: usize) -> Self {
        self.min_neighbors = min_neighbors;
        self
    }

    /// Projects, downsamples and estimates the normals of a view.
    /// The result stays in the view's camera frame.
    pub fn process(&self, camera: &CameraIntrinsics, rgbd_image: &RgbdImage) -> Result<PointCloud> {
        let pcl = PointCloud::from_rgbd_image(camera, rgbd_image).downsample(self.leaf_size)?;
        NormalEstimator::new(self.normal_radius)
            .with_min_neighbors(self.min_neighbors)
            .estimate(&pcl)
    }
}

/// Settings of a registration run, usually read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Overrides the dataset's intrinsics.
    pub intrinsics: Option<CameraIntrinsics>,
    pub pipeline: ViewPipeline,
    pub icp: IcpParams,
    /// View every other view is registered against.
    pub reference_view: usize,
    /// Point size used when showing the aligned clouds.
    pub point_size: f32,
    /// Point size used when showing the views before registration.
    pub view_point_size: f32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            intrinsics: None,
            pipeline: ViewPipeline::default(),
            icp: IcpParams::default(),
            reference_view: 0,
            point_size: 5.0,
            view_point_size: 2.0,
        }
    }
}

impl RegistrationConfig {
    /// Reads a JSON configuration, missing fields take their default values.
    pub fn load<P: AsRef<Path>>(filepath: P) -> Result<Self> {
        let file = std::fs::File::open(filepath)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

/// What happened to a non-reference view.
#[derive(Debug)]
pub enum ViewOutcome {
    Registered(IcpResult),
    /// The view's images couldn't be read or processed.
    LoadFailed(Error),
    /// ICP failed, usually [`Error::Registration`].
    RegistrationFailed(Error),
}

impl ViewOutcome {
    pub fn result(&self) -> Option<&IcpResult> {
        match self {
            ViewOutcome::Registered(result) => Some(result),
            _ => None,
        }
    }

    /// Whether ICP converged, `false` for failed views.
    pub fn has_converged(&self) -> bool {
        self.result().map_or(false, IcpResult::has_converged)
    }

    /// Fitness of the registration, or of the last successful iteration when it failed.
    pub fn fitness(&self) -> Option<f32> {
        match self {
            ViewOutcome::Registered(result) => Some(result.fitness),
            ViewOutcome::RegistrationFailed(Error::Registration { last_fitness, .. }) => {
                *last_fitness
            }
            _ => None,
        }
    }
}

/// Result of a multi-view registration.
#[derive(Debug)]
pub struct RegistrationReport {
    pub reference_view: usize,
    /// The reference view's cloud, which defines the common frame.
    pub reference: PointCloud,
    /// Outcome of every other view, by view index.
    pub views: BTreeMap<usize, ViewOutcome>,
    /// Downsampled cloud with normals of every view that was loaded, the
    /// reference included, in its own camera frame.
    pub clouds: BTreeMap<usize, PointCloud>,
}

impl RegistrationReport {
    /// Registered views and their ICP results, in view order.
    pub fn registered(&self) -> impl Iterator<Item = (usize, &IcpResult)> {
        self.views
            .iter()
            .filter_map(|(index, outcome)| outcome.result().map(|result| (*index, result)))
    }

    /// Views that couldn't be loaded or registered.
    pub fn failed(&self) -> impl Iterator<Item = (usize, &Error)> {
        self.views.iter().filter_map(|(index, outcome)| match outcome {
            ViewOutcome::LoadFailed(err) | ViewOutcome::RegistrationFailed(err) => {
                Some((*index, err))
            }
            ViewOutcome::Registered(_) => None,
        })
    }

    /// The views before registration with their display names, in view order.
    pub fn view_clouds(&self) -> Vec<(String, &PointCloud)> {
        self.clouds
            .iter()
            .map(|(index, pcl)| (format!("pointclouds{index}"), pcl))
            .collect()
    }

    /// Hands every view's cloud before registration to a visualizer.
    pub fn show_views(&self, visualizer: &mut dyn Visualizer, point_size: f32) {
        for (name, pcl) in self.view_clouds() {
            visualizer.add_point_cloud(&name, pcl, point_size);
        }
    }

    /// All clouds in the reference frame with their display names, the reference first.
    pub fn aligned_clouds(&self) -> Vec<(String, &PointCloud)> {
        std::iter::once(("cloud_ref".to_string(), &self.reference))
            .chain(
                self.registered()
                    .map(|(index, result)| (format!("registered{index}"), &result.aligned)),
            )
            .collect()
    }

    /// Concatenates the reference with all registered clouds.
    pub fn merged(&self) -> Result<PointCloud> {
        let clouds = self
            .aligned_clouds()
            .into_iter()
            .map(|(_, pcl)| pcl)
            .collect::<Vec<_>>();
        PointCloud::merge(&clouds)
    }

    /// Hands every aligned cloud to a visualizer.
    pub fn show(&self, visualizer: &mut dyn Visualizer, point_size: f32) {
        for (name, pcl) in self.aligned_clouds() {
            visualizer.add_point_cloud(&name, pcl, point_size);
        }
    }
}

/// Registers every view of a dataset against a fixed reference view.
///
/// Views are registered independently, transforms are never chained through
/// other registered views.
#[derive(Debug, Clone, Default)]
pub struct MultiViewRegistration {
    pub pipeline: ViewPipeline,
    pub icp: IcpParams,
    pub reference_view: usize,
}

impl MultiViewRegistration {
    pub fn new(pipeline: ViewPipeline, icp: IcpParams) -> Self {
        Self {
            pipeline,
            icp,
            reference_view: 0,
        }
    }

    pub fn from_config(config: &RegistrationConfig) -> Self {
        Self::new(config.pipeline, config.icp).with_reference_view(config.reference_view)
    }

    pub fn with_reference_view(mut self, reference_view: usize) -> Self {
        self.reference_view = reference_view;
        self
    }

    /// Runs the registration.
    ///
    /// # Errors
    ///
    /// Fails only if the parameters are invalid or if the reference view can't
    /// be loaded. Failures of other views are reported in [`RegistrationReport::views`].
    pub fn run<D: RgbdDataset + ?Sized>(&self, dataset: &D) -> Result<RegistrationReport> {
        if self.reference_view >= dataset.len() {
            return Err(Error::invalid_parameter(format!(
                "Reference view {} is out of range, the dataset has {} views",
                self.reference_view,
                dataset.len()
            )));
        }
        self.icp.validate()?;

        let camera = dataset.intrinsics();
        let (reference, others): (Vec<_>, Vec<_>) = (0..dataset.len())
            .into_par_iter()
            .map(|index| {
                let pcl = dataset
                    .get(index)
                    .and_then(|rgbd_image| self.pipeline.process(camera, &rgbd_image));
                (index, pcl)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .partition(|(index, _)| *index == self.reference_view);

        let reference = match reference.into_iter().next() {
            Some((_, Ok(pcl))) => pcl,
            Some((_, Err(err))) => {
                error!("Could not load the reference view {}: {}", self.reference_view, err);
                return Err(err);
            }
            None => {
                return Err(Error::invalid_parameter("Reference view was not processed"));
            }
        };
        info!(
            "Reference view {} has {} points, {} with valid normals",
            self.reference_view,
            reference.len(),
            reference.count_valid_normals()
        );

        let icp = Icp::new(self.icp, &reference)?;
        let processed = others
            .into_par_iter()
            .map(|(index, pcl)| {
                let pcl = match pcl {
                    Err(err) => {
                        warn!("Skipping view {index}: {err}");
                        return (index, ViewOutcome::LoadFailed(err), None);
                    }
                    Ok(pcl) => pcl,
                };
                let outcome = match icp.align(&pcl) {
                    Ok(result) => {
                        info!(
                            "View {} registered: converged {}, fitness {:.6e}, {} iterations",
                            index,
                            result.has_converged(),
                            result.fitness,
                            result.iterations
                        );
                        ViewOutcome::Registered(result)
                    }
                    Err(err) => {
                        warn!("View {index} was not registered: {err}");
                        ViewOutcome::RegistrationFailed(err)
                    }
                };
                (index, outcome, Some(pcl))
            })
            .collect::<Vec<_>>();

        let mut views = BTreeMap::new();
        let mut clouds = BTreeMap::new();
        for (index, outcome, pcl) in processed {
            views.insert(index, outcome);
            if let Some(pcl) = pcl {
                clouds.insert(index, pcl);
            }
        }
        clouds.insert(self.reference_view, reference.clone());

        Ok(RegistrationReport {
            reference_view: self.reference_view,
            reference,
            views,
            clouds,
        })
    }
}

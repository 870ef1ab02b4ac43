use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};
use multiview_align::{
    icp::ErrorMetric,
    io::{dataset::ViewDataset, CloudExporter, CloudFormat},
    registration::{MultiViewRegistration, RegistrationConfig, ViewOutcome},
    Result,
};

#[derive(Parser)]
#[command(about = "Registers the views of an RGB-D capture against a reference view")]
struct Args {
    /// Dataset directory with depth/depth{i}.png and color/color{i}.png
    dataset: PathBuf,
    /// JSON file with the registration settings
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Directory where the aligned point clouds are written
    #[arg(long, short, default_value = "output")]
    output: PathBuf,
    /// Number of views to use, by default all views found in the dataset
    #[arg(long)]
    num_views: Option<usize>,
    /// View the others are registered against
    #[arg(long)]
    reference_view: Option<usize>,
    /// Uses the point to point error metric instead of point to plane
    #[arg(long, action)]
    point_to_point: bool,
    #[arg(long)]
    max_iterations: Option<usize>,
    /// Maximum correspondence distance in meters
    #[arg(long)]
    max_distance: Option<f32>,
    #[arg(long)]
    transformation_epsilon: Option<f32>,
    #[arg(long)]
    fitness_epsilon: Option<f32>,
    /// Output format: ply or pcd
    #[arg(long, default_value = "ply")]
    format: CloudFormat,
}

impl Args {
    fn config(&self) -> Result<RegistrationConfig> {
        let mut config = match &self.config {
            Some(path) => RegistrationConfig::load(path)?,
            None => RegistrationConfig::default(),
        };

        if let Some(reference_view) = self.reference_view {
            config.reference_view = reference_view;
        }
        if self.point_to_point {
            config.icp.metric = ErrorMetric::PointToPoint;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.icp.max_iterations = max_iterations;
        }
        if let Some(max_distance) = self.max_distance {
            config.icp.max_correspondence_distance = max_distance;
        }
        if let Some(epsilon) = self.transformation_epsilon {
            config.icp.transformation_epsilon = epsilon;
        }
        if let Some(epsilon) = self.fitness_epsilon {
            config.icp.fitness_epsilon = epsilon;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.config()?;

    let mut dataset = ViewDataset::load(&args.dataset)?;
    if let Some(num_views) = args.num_views {
        dataset = dataset.with_num_views(num_views);
    }
    if let Some(intrinsics) = config.intrinsics.clone() {
        dataset = dataset.with_intrinsics(intrinsics);
    }

    let report = MultiViewRegistration::from_config(&config).run(&dataset)?;
    let mut exporter = CloudExporter::new(&args.output, args.format);
    report.show_views(&mut exporter, config.view_point_size);

    for (index, outcome) in report.views.iter() {
        match outcome {
            ViewOutcome::Registered(result) => {
                println!(
                    "View {index}: has converged: {}, score: {}",
                    result.has_converged(),
                    result.fitness
                );
                println!("{}", result.transform.matrix());
            }
            ViewOutcome::LoadFailed(err) => println!("View {index}: not loaded, {err}"),
            ViewOutcome::RegistrationFailed(err) => {
                println!("View {index}: has converged: false, {err}")
            }
        }
    }

    report.show(&mut exporter, config.point_size);
    match report.merged() {
        Ok(merged) => match exporter.export("merged", &merged) {
            Ok(filepath) => info!("Merged cloud saved to {}", filepath.display()),
            Err(err) => warn!("Could not save the merged cloud: {err}"),
        },
        Err(err) => warn!("Could not merge the clouds: {err}"),
    }

    Ok(())
}

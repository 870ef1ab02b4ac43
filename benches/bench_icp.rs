mod common;

use criterion::{criterion_group, criterion_main, Criterion};
use multiview_align::icp::{Icp, IcpParams};
use multiview_align::normals::NormalEstimator;
use multiview_align::transform::Transform;
use nalgebra::Vector3;
use pprof::criterion::{Output, PProfProfiler};

fn icp_benchmark(c: &mut Criterion) {
    let estimator = NormalEstimator::new(0.03);
    let target = estimator.estimate(&common::wavy_cloud(150, 0.005)).unwrap();
    let source =
        &Transform::from_axis_angle(&Vector3::z(), 0.05, &Vector3::new(0.01, 0.0, 0.0)) * &target;

    let icp = Icp::new(
        IcpParams::default()
            .with_max_iterations(10)
            .with_max_correspondence_distance(0.05),
        &target,
    )
    .unwrap();

    c.bench_function("icp align", |b| {
        b.iter(|| icp.align(&source).unwrap());
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = icp_benchmark
}

criterion_main!(benches);

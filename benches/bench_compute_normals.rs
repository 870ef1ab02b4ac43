mod common;

use criterion::{criterion_group, criterion_main, Criterion};
use multiview_align::normals::NormalEstimator;
use multiview_align::sampling::VoxelGrid;
use pprof::criterion::{Output, PProfProfiler};

fn compute_normals_benchmark(c: &mut Criterion) {
    let pcl = common::wavy_cloud(200, 0.003);

    c.bench_function("compute_normals", |b| {
        let estimator = NormalEstimator::new(0.01);
        b.iter(|| estimator.estimate(&pcl).unwrap());
    });

    c.bench_function("voxel_downsample", |b| {
        let grid = VoxelGrid::new(0.01).unwrap();
        b.iter(|| grid.filter(&pcl));
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = compute_normals_benchmark
}

criterion_main!(benches);

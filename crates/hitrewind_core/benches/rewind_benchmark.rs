//! # Rewind Performance Benchmark
//!
//! REQUIREMENTS:
//! - Capture of 256 entities well under one 60 Hz step
//! - Gated ray query cost dominated by the few entities it touches
//!
//! Run with: `cargo bench --package hitrewind_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hitrewind_core::{
    EntityId, HitShape, QueryFilter, RewindConfig, RewindCoordinator, ShapeAxis,
    TrackedEntityBuilder, VolumeQueryEngine,
};
use hitrewind_shared::{Ray, Transform, Vec3};

/// Builds `count` entities on a grid, each with a capsule body and a head.
fn populated(count: u64) -> RewindCoordinator {
    let config = RewindConfig::default();
    let mut coordinator = RewindCoordinator::new(config.clone()).expect("default config is valid");
    for id in 0..count {
        let root = Transform::from_position(Vec3::new((id % 16) as f32 * 4.0, 0.0, (id / 16) as f32 * 4.0));
        let entity = TrackedEntityBuilder::new(EntityId::new(id))
            .root(root)
            .volume(
                HitShape::Capsule { radius: 0.4, half_height: 0.6, axis: ShapeAxis::Y },
                Transform::IDENTITY,
            )
            .volume(HitShape::Sphere { radius: 0.25 }, Transform::from_position(Vec3::new(0.0, 1.3, 0.0)))
            .build(&config);
        coordinator.register(entity).expect("depth matches");
    }
    coordinator
}

fn step(coordinator: &mut RewindCoordinator, ids: &[EntityId]) {
    let t = coordinator.frame() as f32 * 0.05;
    for &id in ids {
        if let Some(entity) = coordinator.entity_mut(id) {
            let mut root = *entity.root();
            root.position.x += t.sin() * 0.1;
            let _ = entity.set_root_pose(root);
        }
    }
    coordinator.advance();
}

/// Benchmark: one capture step.
fn bench_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture_step");

    for count in [16u64, 256, 1024] {
        let mut coordinator = populated(count);
        let ids: Vec<EntityId> = coordinator.registry().ids().collect();
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| step(black_box(&mut coordinator), &ids));
        });
    }

    group.finish();
}

/// Benchmark: open a window 100 ms back, gate a ray, restore.
fn bench_gated_raycast(c: &mut Criterion) {
    let mut group = c.benchmark_group("gated_raycast");

    for count in [16u64, 256, 1024] {
        let mut coordinator = populated(count);
        let ids: Vec<EntityId> = coordinator.registry().ids().collect();
        for _ in 0..60 {
            step(&mut coordinator, &ids);
        }
        let ray = Ray::new(Vec3::new(-10.0, 0.0, 0.0), Vec3::X);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let mut scope = coordinator.rewind_seconds(0.1);
                black_box(scope.raycast(&mut VolumeQueryEngine, &ray, 200.0, QueryFilter::ANY))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_capture, bench_gated_raycast);
criterion_main!(benches);

use criterion::{
    criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion, PlotConfiguration,
    Throughput,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rand_distr::Exp;

use loose_octree::*;

fn random_triangle(rng: &mut SmallRng, size: &Exp<f32>) -> Triangle {
    let mut point = |extent: f32| {
        Vec3::new(
            rng.gen_range(-extent..extent),
            rng.gen_range(-extent..extent),
            rng.gen_range(-extent..extent),
        )
    };
    let a = point(100.0);
    let width = rng.sample(size);
    let b = a + Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), 0.0) * width;
    let c = a + Vec3::new(0.0, rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)) * width;
    Triangle::new(a, b, c)
}

fn populated(rng: &mut SmallRng, count: u64) -> (Octree<u64>, Vec<FaceId>) {
    let size = Exp::new(2.0).unwrap();
    let mut t = Octree::new();
    t.initialize(Vec3::ZERO, 200.0);
    let ids = (0..count)
        .map(|i| t.insert(random_triangle(rng, &size), i))
        .collect();
    (t, ids)
}

pub fn bench(c: &mut Criterion) {
    let mut rng = SmallRng::from_seed([0xAB; 32]);

    let mut group = c.benchmark_group("insert triangles");
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));
    for count in [100, 1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| populated(&mut rng, count));
        });
    }
    group.finish();

    let (mut t, ids) = populated(&mut rng, 10_000);
    c.bench_function("realign 10000 jittered triangles", |b| {
        b.iter(|| {
            for &id in &ids {
                let offset = Vec3::new(
                    rng.gen_range(-0.01..0.01),
                    rng.gen_range(-0.01..0.01),
                    rng.gen_range(-0.01..0.01),
                );
                let moved = t.get(id).unwrap().triangle().translated(offset);
                t.realign(id, moved);
            }
        });
    });

    c.bench_function("sphere query in 10000 triangles", |b| {
        b.iter(|| {
            let center = Vec3::new(
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
            );
            t.intersect_sphere(&Sphere::new(center, 5.0))
        });
    });

    c.bench_function("ray query in 10000 triangles", |b| {
        b.iter(|| {
            let direction = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            let ray = Ray::new(Vec3::splat(-150.0), Vec3::splat(1.0) + direction * 0.5);
            t.intersect_ray(&ray)
        });
    });
}

criterion_group!(benches, bench);
criterion_main!(benches);

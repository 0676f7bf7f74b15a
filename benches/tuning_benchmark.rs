use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use servo_tuner::tuning::generator::{CandidateGenerator, GainPriors};
use servo_tuner::tuning::population::PopulationPool;

// Helper to drive one full fill-then-perturb cycle of a pool: the hot path
// of the live loop without the transport around it.
fn run_cycle(generator: &CandidateGenerator, rng: &mut StdRng) -> usize {
    let mut pool = PopulationPool::new(30);
    for step in 0..60 {
        let mut candidate = generator.generate(&pool, rng);
        for member in &mut candidate.members {
            member.vel_sq_mean_error = 1.0 + step as f64;
            member.pos_sq_mean_error = 0.01;
        }
        pool.offer(candidate);
    }
    pool.len()
}

fn benchmark_generate_and_offer(c: &mut Criterion) {
    let generator = CandidateGenerator::new(2, &GainPriors::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    let mut group = c.benchmark_group("TuningGroup Hot Path");
    group.bench_function("generate_and_offer_60", |b| {
        b.iter(|| run_cycle(&generator, &mut rng))
    });
    group.finish();
}

criterion_group!(benches, benchmark_generate_and_offer);
criterion_main!(benches);

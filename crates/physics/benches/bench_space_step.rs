use std::hint::black_box;
use std::time::Instant;

use glam::Vec2;
use roomworld_common::CollisionGroup;
use roomworld_physics::{Geometry, RigidBody, ShapeDesc, Space, StepParams};

fn make_space(body_count: usize) -> Space {
    let mut space = Space::default();
    let floor = space
        .insert_body(RigidBody::fixed(Vec2::ZERO))
        .expect("floor body");
    space
        .attach_shape(
            floor,
            ShapeDesc::new(Geometry::rect(4000.0, 10.0), CollisionGroup::Terrain),
        )
        .expect("floor shape");
    let side = (body_count as f32).sqrt().ceil() as usize;
    for i in 0..body_count {
        let x = (i % side) as f32 * 12.0 - 1000.0;
        let y = (i / side) as f32 * 12.0 + 20.0;
        let body = space
            .insert_body(RigidBody::dynamic(Vec2::new(x, y), 1.0))
            .expect("body");
        space
            .attach_shape(
                body,
                ShapeDesc::new(Geometry::circle(5.0), CollisionGroup::Enemy),
            )
            .expect("body shape");
    }
    space
}

fn bench_step(body_count: usize, iterations: usize) {
    let mut space = make_space(body_count);
    let params = StepParams {
        dt: 1.0 / 240.0,
        gravity: Vec2::new(0.0, -900.0),
        damping: 0.9,
    };

    let start = Instant::now();
    for _ in 0..iterations {
        space.step(black_box(&params), &mut ()).expect("step");
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    let contacts = space.contact_count();
    println!(
        "  step ({body_count} bodies, {iterations} iters): {per_iter:?}/iter, \
         total {elapsed:?}, {contacts} contacts"
    );
}

fn main() {
    println!("=== Space Step Benchmarks ===\n");
    println!("Falling bodies onto a floor:");
    bench_step(50, 1000);
    bench_step(200, 240);
    bench_step(500, 60);

    println!("\n=== Done ===");
}

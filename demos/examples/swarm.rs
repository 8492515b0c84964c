// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A swarm simulation driven by `understory_octree`.
//!
//! One leader steers toward a random target and picks a new one on arrival.
//! Every other actor jitters randomly and flocks using the octree: separation
//! from close neighbors, alignment with their velocities, cohesion toward
//! their center, and a pull toward the leader.
//!
//! Each tick the simulation calls `relocate` for every actor that moved and
//! `visit_neighbors` for every follower, which is the intended usage pattern.
//!
//! Run:
//! - `cargo run -p understory_demos --example swarm`

use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use understory_octree::{Event, Observer, Octree, OctreeConfig, Positioned, Region, Vector3};

const ACTORS: u32 = 400;
const TICKS: u32 = 120;
const BOUND: f64 = 100.0;
const VIEW: f64 = 8.0;
const CROWD: f64 = 2.0;
const MAX_SPEED: f64 = 3.0;

/// Octree handle for one actor; `id` indexes the simulation arrays.
#[derive(Clone, Debug)]
struct ActorKey {
    id: u32,
    spawn: Vector3,
}

impl PartialEq for ActorKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActorKey {}

impl Hash for ActorKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Positioned for ActorKey {
    fn position(&self) -> Vector3 {
        self.spawn
    }
}

/// Counts structural churn between reports.
#[derive(Debug, Default)]
struct Churn {
    splits: usize,
    collapses: usize,
}

impl Observer for Churn {
    fn on_event(&mut self, event: &Event) {
        match event {
            Event::Split { .. } => self.splits += 1,
            Event::Collapse { .. } => self.collapses += 1,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Motion {
    position: Vector3,
    velocity: Vector3,
}

struct Leader {
    acceleration: f64,
    deceleration: f64,
    target: Vector3,
}

fn random_in(rng: &mut StdRng, half: f64) -> Vector3 {
    Vector3::new(
        rng.random_range(-half..half),
        rng.random_range(-half..half),
        rng.random_range(-half..half),
    )
}

/// Clamp a position into the half-open world.
fn confine(p: Vector3) -> Vector3 {
    let limit = BOUND - 1e-6;
    Vector3::new(
        p.x.clamp(-BOUND, limit),
        p.y.clamp(-BOUND, limit),
        p.z.clamp(-BOUND, limit),
    )
}

fn cap_speed(v: Vector3) -> Vector3 {
    if v.length() > MAX_SPEED {
        v.normalize().scale(MAX_SPEED)
    } else {
        v
    }
}

fn main() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let world = Region::from_bounds([-BOUND, BOUND, -BOUND, BOUND, -BOUND, BOUND]);

    let keys: Vec<ActorKey> = (0..ACTORS)
        .map(|id| ActorKey {
            id,
            spawn: random_in(&mut rng, 30.0),
        })
        .collect();
    let mut motion: Vec<Motion> = keys
        .iter()
        .map(|k| Motion {
            position: k.spawn,
            velocity: Vector3::ZERO,
        })
        .collect();
    let mut leader = Leader {
        acceleration: 1.1,
        deceleration: 0.8,
        target: random_in(&mut rng, BOUND),
    };

    let mut tree = match Octree::with_observer(
        world,
        keys.iter().cloned(),
        OctreeConfig::default(),
        Churn::default(),
    ) {
        Ok(tree) => tree,
        Err(err) => {
            eprintln!("failed to seed the swarm: {err}");
            return;
        }
    };
    println!(
        "seeded {} actors into {} nodes ({} leaves)",
        tree.len(),
        tree.node_count(),
        tree.leaf_count()
    );

    for tick in 0..TICKS {
        // Leader: steer toward the target, pick a new one on arrival.
        let lead = &mut motion[0];
        let to_target = leader.target - lead.position;
        if to_target.length() < 15.0 {
            leader.target = random_in(&mut rng, BOUND);
            println!(
                "tick {tick}: new target ({:.1}, {:.1}, {:.1})",
                leader.target.x, leader.target.y, leader.target.z
            );
        }
        let heading = (leader.target - lead.position).normalize();
        lead.velocity =
            lead.velocity.scale(leader.deceleration) + heading.scale(leader.acceleration);
        let leader_at = lead.position;

        // Followers: gather steering from neighbors before moving anyone.
        let mut steer = vec![Vector3::ZERO; motion.len()];
        for key in &keys[1..] {
            let me = motion[key.id as usize];
            let mut separation = Vector3::ZERO;
            let mut heading_sum = Vector3::ZERO;
            let mut center_sum = Vector3::ZERO;
            let mut seen = 0_u32;
            let visited = tree.visit_neighbors(key, VIEW, 3, |other, at| {
                if other.id == key.id {
                    return;
                }
                let away = me.position - at;
                if away.length() < CROWD {
                    separation = separation + away;
                }
                heading_sum = heading_sum + motion[other.id as usize].velocity;
                center_sum = center_sum + at;
                seen += 1;
            });
            if let Err(err) = visited {
                eprintln!("actor {} lost from the index: {err}", key.id);
                continue;
            }

            let mut force = separation.scale(0.5);
            if seen > 0 {
                let n = f64::from(seen);
                force = force + heading_sum.scale(0.05 / n);
                force = force + (center_sum.scale(1.0 / n) - me.position).scale(0.02);
            }
            force = force + (leader_at - me.position).normalize().scale(0.1);
            force = force + random_in(&mut rng, 0.3);
            steer[key.id as usize] = force;
        }

        // Integrate and re-file everyone who moved.
        for key in &keys {
            let m = &mut motion[key.id as usize];
            m.velocity = cap_speed(m.velocity + steer[key.id as usize]);
            let next = confine(m.position + m.velocity);
            if next == m.position {
                continue;
            }
            m.position = next;
            if let Err(err) = tree.relocate(key, next) {
                eprintln!("relocating actor {} failed: {err}", key.id);
            }
        }

        if tick % 20 == 19 {
            let churn = std::mem::take(tree.observer_mut());
            println!(
                "tick {tick}: {} nodes, {} leaves, {} splits, {} collapses",
                tree.node_count(),
                tree.leaf_count(),
                churn.splits,
                churn.collapses
            );
        }
    }

    match tree.validate() {
        Ok(()) => println!("final tree is consistent with {} actors", tree.size()),
        Err(err) => eprintln!("final tree is inconsistent: {err}"),
    }
}

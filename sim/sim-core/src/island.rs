//! Contact islands and sleep management.
//!
//! Dynamic bodies joined by this step's manifolds form an island. Static
//! bodies never join one, so two stacks on the same floor stay separate.
//!
//! - A body's sleep timer advances while it moves slower than both sleep
//!   thresholds and resets otherwise.
//! - An island falls asleep only when every awake member's timer exceeds
//!   `time_to_sleep`. All members are tagged with the island's lowest slot
//!   index.
//! - Waking any tagged body wakes every body sharing its tag.
//!
//! Whether a body counts as moving for wake-on-contact is sampled at the
//! start of the step, before gravity is added. A body resting on a sleeper
//! therefore does not wake it just by being pulled down for one step.

use sim_types::SleepConfig;

use crate::body_store::BodyStore;
use crate::contact::ContactManifold;

/// Tag of a body that is not part of a sleeping island.
pub(crate) const NO_ISLAND: u32 = u32::MAX;

/// Union-find and per-step motion buffers, sized once for the world.
#[derive(Debug, Clone, Default)]
pub(crate) struct IslandScratch {
    parent: Vec<u32>,
    /// Smallest sleep timer among the awake members, indexed by root.
    min_timer: Vec<f64>,
    /// Motion sampled at the start of the step.
    moving: Vec<bool>,
}

impl IslandScratch {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            parent: Vec::with_capacity(capacity),
            min_timer: Vec::with_capacity(capacity),
            moving: Vec::with_capacity(capacity),
        }
    }

    /// Record which bodies are awake, dynamic and above the thresholds.
    pub(crate) fn record_motion(&mut self, bodies: &BodyStore, config: &SleepConfig) {
        self.moving.clear();
        for i in 0..bodies.len() {
            self.moving
                .push(bodies.flags[i].is_awake_dynamic() && !is_resting(bodies, i, config));
        }
    }

    /// Motion of slot `i` as recorded by [`record_motion`](Self::record_motion).
    pub(crate) fn was_moving(&self, i: usize) -> bool {
        self.moving.get(i).copied().unwrap_or(false)
    }

    fn reset(&mut self, len: usize) {
        self.parent.clear();
        self.parent.extend(0..len as u32);
        self.min_timer.clear();
        self.min_timer.resize(len, f64::INFINITY);
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] as usize != x {
            let grandparent = self.parent[self.parent[x] as usize];
            self.parent[x] = grandparent;
            x = grandparent as usize;
        }
        x
    }

    /// Join two sets; the lower root index wins so roots are deterministic.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb) as u32;
        }
    }
}

fn is_resting(bodies: &BodyStore, i: usize, config: &SleepConfig) -> bool {
    bodies.linear_velocities[i].norm() < config.linear_threshold
        && bodies.angular_velocities[i].norm() < config.angular_threshold
}

/// Advance sleep timers and put fully rested islands to sleep.
pub(crate) fn update_sleep(
    bodies: &mut BodyStore,
    manifolds: &[ContactManifold],
    config: &SleepConfig,
    dt: f64,
    islands: &mut IslandScratch,
) {
    if !config.enabled {
        return;
    }

    let n = bodies.len();
    for i in 0..n {
        if !bodies.flags[i].is_awake_dynamic() {
            continue;
        }
        if is_resting(bodies, i, config) {
            bodies.sleep_timers[i] += dt;
        } else {
            bodies.sleep_timers[i] = 0.0;
        }
    }

    islands.reset(n);
    for manifold in manifolds {
        let (a, b) = (manifold.body_a.index() as usize, manifold.body_b.index() as usize);
        if is_dynamic(bodies, a) && is_dynamic(bodies, b) {
            islands.union(a, b);
        }
    }

    for i in 0..n {
        if bodies.flags[i].is_awake_dynamic() {
            let root = islands.find(i);
            islands.min_timer[root] = islands.min_timer[root].min(bodies.sleep_timers[i]);
        }
    }

    for i in 0..n {
        if !is_dynamic(bodies, i) {
            continue;
        }
        let root = islands.find(i);
        let timer = islands.min_timer[root];
        // Infinite means no awake member: nothing to decide.
        if !timer.is_finite() || timer <= config.time_to_sleep {
            continue;
        }
        let tag = root as u32;
        if bodies.is_sleeping(i) {
            match bodies.island_tags[i] {
                NO_ISLAND => bodies.island_tags[i] = tag,
                old if old != tag => bodies.retag_island(old, tag),
                _ => {}
            }
        } else {
            bodies.sleep(i, tag);
        }
    }
}

fn is_dynamic(bodies: &BodyStore, i: usize) -> bool {
    bodies.is_alive(i) && !bodies.is_static(i)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::shape::HullPool;
    use nalgebra::{Point3, UnitQuaternion, Vector3};
    use sim_types::BodyFlags;

    const DT: f64 = 1.0 / 60.0;

    fn store(count: usize) -> BodyStore {
        let hulls = HullPool::with_capacity(0);
        let mut bodies = BodyStore::with_capacity(count);
        for k in 0..count {
            bodies
                .allocate(Point3::new(k as f64, 0.0, 0.0), UnitQuaternion::identity(), &hulls)
                .unwrap();
        }
        bodies
    }

    fn touching(bodies: &BodyStore, a: usize, b: usize) -> ContactManifold {
        ContactManifold::new(bodies.id_at(a), bodies.id_at(b))
    }

    #[test]
    fn test_union_find_roots_at_lowest_index() {
        let mut islands = IslandScratch::with_capacity(6);
        islands.reset(6);
        islands.union(4, 5);
        islands.union(5, 2);
        islands.union(1, 3);
        assert_eq!(islands.find(5), 2);
        assert_eq!(islands.find(4), 2);
        assert_eq!(islands.find(3), 1);
        assert_eq!(islands.find(0), 0);
    }

    #[test]
    fn test_lone_body_sleeps_after_rest_time() {
        let mut bodies = store(1);
        let mut islands = IslandScratch::with_capacity(1);
        let config = SleepConfig::default();
        for _ in 0..59 {
            update_sleep(&mut bodies, &[], &config, DT, &mut islands);
        }
        assert!(!bodies.is_sleeping(0));
        for _ in 0..2 {
            update_sleep(&mut bodies, &[], &config, DT, &mut islands);
        }
        assert!(bodies.is_sleeping(0));
        assert_eq!(bodies.island_tags[0], 0);

        // Motion resets the timer.
        bodies.wake(0);
        bodies.sleep_timers[0] = 0.9;
        bodies.linear_velocities[0] = Vector3::new(1.0, 0.0, 0.0);
        update_sleep(&mut bodies, &[], &config, DT, &mut islands);
        assert_eq!(bodies.sleep_timers[0], 0.0);
    }

    #[test]
    fn test_island_waits_for_slowest_member() {
        let mut bodies = store(3);
        let mut islands = IslandScratch::with_capacity(3);
        let config = SleepConfig::default();
        let manifolds = [touching(&bodies, 0, 1), touching(&bodies, 1, 2)];
        bodies.sleep_timers[0] = 5.0;
        bodies.sleep_timers[1] = 5.0;

        for _ in 0..59 {
            update_sleep(&mut bodies, &manifolds, &config, DT, &mut islands);
        }
        assert!((0..3).all(|i| !bodies.is_sleeping(i)));

        for _ in 0..2 {
            update_sleep(&mut bodies, &manifolds, &config, DT, &mut islands);
        }
        assert!((0..3).all(|i| bodies.is_sleeping(i)));
        assert!(bodies.island_tags.iter().all(|&t| t == 0));
    }

    #[test]
    fn test_static_bodies_do_not_join_islands() {
        let mut bodies = store(3);
        let mut islands = IslandScratch::with_capacity(3);
        let config = SleepConfig::default();
        bodies.flags[1].insert(BodyFlags::STATIC);
        let manifolds = [touching(&bodies, 0, 1), touching(&bodies, 1, 2)];
        bodies.linear_velocities[2] = Vector3::new(1.0, 0.0, 0.0);
        bodies.sleep_timers[0] = 2.0;

        update_sleep(&mut bodies, &manifolds, &config, DT, &mut islands);
        assert!(bodies.is_sleeping(0));
        assert!(!bodies.is_sleeping(2));
    }

    #[test]
    fn test_waking_one_member_wakes_the_island() {
        let mut bodies = store(4);
        let mut islands = IslandScratch::with_capacity(4);
        let config = SleepConfig::default();
        let manifolds = [touching(&bodies, 1, 2), touching(&bodies, 2, 3)];
        for t in &mut bodies.sleep_timers {
            *t = 2.0;
        }
        update_sleep(&mut bodies, &manifolds, &config, DT, &mut islands);
        assert!((0..4).all(|i| bodies.is_sleeping(i)));

        bodies.wake(3);
        assert!(bodies.is_sleeping(0));
        assert!((1..4).all(|i| !bodies.is_sleeping(i)));
        assert!((1..4).all(|i| bodies.island_tags[i] == NO_ISLAND));
    }

    #[test]
    fn test_sleeping_member_merges_into_new_island() {
        let mut bodies = store(3);
        let mut islands = IslandScratch::with_capacity(3);
        let config = SleepConfig::default();

        // 1 and 2 fall asleep together first.
        bodies.sleep_timers[1] = 2.0;
        bodies.sleep_timers[2] = 2.0;
        bodies.linear_velocities[0] = Vector3::new(1.0, 0.0, 0.0);
        let contacts = [touching(&bodies, 1, 2)];
        update_sleep(&mut bodies, &contacts, &config, DT, &mut islands);
        assert_eq!(bodies.island_tags[2], 1);
        assert!(!bodies.is_sleeping(0));

        // 0 comes to rest on 1; the merged island takes tag 0.
        bodies.linear_velocities[0] = Vector3::zeros();
        bodies.sleep_timers[0] = 2.0;
        let contacts = [touching(&bodies, 0, 1)];
        update_sleep(&mut bodies, &contacts, &config, DT, &mut islands);
        assert!((0..3).all(|i| bodies.island_tags[i] == 0));

        bodies.wake(2);
        assert!((0..3).all(|i| !bodies.is_sleeping(i)));
    }

    #[test]
    fn test_motion_sampled_before_gravity() {
        let mut bodies = store(2);
        let mut islands = IslandScratch::with_capacity(2);
        let config = SleepConfig::default();
        bodies.linear_velocities[1] = Vector3::new(0.0, -0.5, 0.0);
        islands.record_motion(&bodies, &config);
        assert!(!islands.was_moving(0));
        assert!(islands.was_moving(1));
        assert!(!islands.was_moving(7));
    }

    #[test]
    fn test_disabled_config_never_sleeps() {
        let mut bodies = store(1);
        let mut islands = IslandScratch::with_capacity(1);
        for _ in 0..600 {
            update_sleep(&mut bodies, &[], &SleepConfig::disabled(), DT, &mut islands);
        }
        assert!(!bodies.is_sleeping(0));
    }
}

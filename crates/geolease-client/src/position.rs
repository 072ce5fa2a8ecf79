use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use geolease_types::{GeoZone, Position};

/// Supplies the equipment's position, one reading per tick.
pub trait PositionSource: Send {
    fn next_position(&mut self) -> Position;
}

impl<P: PositionSource + ?Sized> PositionSource for Box<P> {
    fn next_position(&mut self) -> Position {
        (**self).next_position()
    }
}

/// A fixed route; the last point repeats once the route is exhausted.
#[derive(Clone, Debug)]
pub struct Waypoints {
    points: Vec<Position>,
    index: usize,
}

impl Waypoints {
    pub fn new(points: Vec<Position>) -> Self {
        Self { points, index: 0 }
    }

    /// Stay at the zone center for `inside` readings, then `outside`
    /// readings `margin_m` metres beyond the northern edge, then return to
    /// the center for good.
    pub fn excursion(zone: &GeoZone, inside: usize, outside: usize, margin_m: u64) -> Self {
        let north = i64::try_from(zone.radius_m.saturating_add(margin_m)).unwrap_or(i64::MAX);
        let away = zone.center.offset_meters(north, 0);

        let mut points = Vec::with_capacity(inside + outside + 1);
        points.extend(std::iter::repeat(zone.center).take(inside));
        points.extend(std::iter::repeat(away).take(outside));
        points.push(zone.center);
        Self::new(points)
    }

    pub fn remaining(&self) -> usize {
        self.points.len().saturating_sub(self.index)
    }
}

impl PositionSource for Waypoints {
    fn next_position(&mut self) -> Position {
        let Some(last) = self.points.last().copied() else {
            return Position::default();
        };
        let point = self.points.get(self.index).copied().unwrap_or(last);
        if self.index < self.points.len() {
            self.index += 1;
        }
        point
    }
}

/// Seeded random walk: each reading moves up to `step_m` metres along each
/// axis from the previous one.
#[derive(Clone, Debug)]
pub struct RandomWalk {
    current: Position,
    step_m: i64,
    rng: StdRng,
}

impl RandomWalk {
    pub fn new(start: Position, step_m: u64, seed: u64) -> Self {
        Self {
            current: start,
            step_m: i64::try_from(step_m).unwrap_or(i64::MAX),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl PositionSource for RandomWalk {
    fn next_position(&mut self) -> Position {
        let north = self.rng.gen_range(-self.step_m..=self.step_m);
        let east = self.rng.gen_range(-self.step_m..=self.step_m);
        self.current = self.current.offset_meters(north, east);
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> GeoZone {
        GeoZone::new(Position::new(52_370_216, 4_895_168), 500)
    }

    #[test]
    fn waypoints_repeat_last_point() {
        let a = Position::new(1, 1);
        let b = Position::new(2, 2);
        let mut route = Waypoints::new(vec![a, b]);
        assert_eq!(route.next_position(), a);
        assert_eq!(route.next_position(), b);
        assert_eq!(route.next_position(), b);
        assert_eq!(route.remaining(), 0);
    }

    #[test]
    fn excursion_leaves_and_returns() {
        let zone = zone();
        let mut route = Waypoints::excursion(&zone, 2, 3, 100);
        let inside: Vec<bool> = (0..7).map(|_| zone.contains(&route.next_position())).collect();
        assert_eq!(inside, vec![true, true, false, false, false, true, true]);
    }

    #[test]
    fn random_walk_is_reproducible_and_bounded() {
        let start = zone().center;
        let mut a = RandomWalk::new(start, 30, 7);
        let mut b = RandomWalk::new(start, 30, 7);

        let mut previous = start;
        for _ in 0..50 {
            let next = a.next_position();
            assert_eq!(next, b.next_position());
            let step = GeoZone::new(previous, 0).distance_m(&next);
            // 30 m per axis, plus rounding of each axis to whole microdegrees
            assert!(step <= 44, "step of {step} m");
            previous = next;
        }
    }
}

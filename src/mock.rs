//! Analytic spatial query used by unit tests.

use bevy::prelude::*;

use crate::backend::SpatialQuery;
use crate::collision::CollisionData;

/// Half-space boundary, optionally cut off at `x_max`.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    pub point: Vec3,
    pub normal: Vec3,
    /// Surface only exists where `x <= x_max`.
    pub x_max: Option<f32>,
    pub entity: Option<Entity>,
}

impl Plane {
    pub fn new(point: Vec3, normal: Vec3) -> Self {
        Self {
            point,
            normal: normal.normalize(),
            x_max: None,
            entity: None,
        }
    }

    pub fn ending_at_x(mut self, x_max: f32) -> Self {
        self.x_max = Some(x_max);
        self
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    fn contains(&self, p: Vec3) -> bool {
        self.x_max.is_none_or(|x| p.x <= x + 1e-4)
    }

    fn signed_distance(&self, p: Vec3) -> f32 {
        (p - self.point).dot(self.normal)
    }

    fn sweep(&self, origin: Vec3, radius: f32, dir: Vec3, max: f32) -> Option<CollisionData> {
        let approach = -dir.dot(self.normal);
        if approach <= 0.0 {
            return None;
        }
        let gap = self.signed_distance(origin) - radius;
        if gap < -radius {
            return None;
        }
        let t = (gap / approach).max(0.0);
        if t > max {
            return None;
        }
        let point = origin + dir * t - self.normal * radius;
        self.contains(point)
            .then(|| CollisionData::new(t, self.normal, point, self.entity))
    }
}

/// A scene made of planes.
#[derive(Debug, Clone, Default)]
pub struct MockQuery {
    pub planes: Vec<Plane>,
}

impl MockQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, plane: Plane) -> Self {
        self.planes.push(plane);
        self
    }

    /// Flat floor at height `y`.
    pub fn floor(y: f32) -> Self {
        Self::new().with(Plane::new(Vec3::new(0.0, y, 0.0), Vec3::Y))
    }

    fn nearest(&self, origin: Vec3, radius: f32, dir: Vec3, max: f32) -> Option<CollisionData> {
        self.planes
            .iter()
            .filter_map(|p| p.sweep(origin, radius, dir, max))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

impl SpatialQuery for MockQuery {
    fn cast_sphere(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<CollisionData> {
        self.nearest(origin, radius, direction.normalize(), max_distance)
    }

    fn cast_ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<CollisionData> {
        self.nearest(origin, 0.0, direction.normalize(), max_distance)
    }

    fn overlaps_capsule(&self, a: Vec3, b: Vec3, radius: f32) -> bool {
        self.planes.iter().any(|p| {
            [a, b]
                .into_iter()
                .any(|c| p.signed_distance(c) < radius && p.contains(c))
        })
    }
}

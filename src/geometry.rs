use glam::Vec3;

use crate::FaceId;

/// An axis-aligned bounding box in world space
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    /// Smallest point inside the box
    pub min: Vec3,
    /// Largest point inside the box
    pub max: Vec3,
}

impl Aabb {
    /// Cube of edge length `width` centered on `center`
    pub fn from_center_width(center: Vec3, width: f32) -> Self {
        let half = Vec3::splat(width * 0.5);
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Whether `other` lies entirely inside `self`, boundary included
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && other.max.cmple(self.max).all()
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// Point in the box closest to `point`
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.max(self.min).min(self.max)
    }

    /// Distance along `ray` at which it enters the box, or zero if it starts inside
    ///
    /// `None` if the ray misses the box entirely.
    pub fn ray_entry(&self, ray: &Ray) -> Option<f32> {
        // Slab method
        let (near, far) = (0..3).try_fold(
            (f32::NEG_INFINITY, f32::INFINITY),
            |(near, far), axis| {
                let (origin, direction) = (ray.origin[axis], ray.direction[axis]);
                let (min, max) = (self.min[axis], self.max[axis]);
                if direction == 0.0 {
                    // Parallel to this slab: either always inside it or never
                    return (min <= origin && origin <= max).then_some((near, far));
                }
                let t1 = (min - origin) / direction;
                let t2 = (max - origin) / direction;
                Some((near.max(t1.min(t2)), far.min(t1.max(t2))))
            },
        )?;
        if far < near || far < 0.0 {
            return None;
        }
        Some(near.max(0.0))
    }
}

/// Cached geometry of one mesh face
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    pub const fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        [self.a, self.b, self.c]
    }

    pub fn bounds(&self) -> Aabb {
        Aabb {
            min: self.a.min(self.b).min(self.c),
            max: self.a.max(self.b).max(self.c),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.a.is_finite() && self.b.is_finite() && self.c.is_finite()
    }

    /// Translate every vertex by `offset`
    pub fn translated(&self, offset: Vec3) -> Self {
        Self::new(self.a + offset, self.b + offset, self.c + offset)
    }

    /// Point on the triangle closest to `point`
    ///
    /// Voronoi region classification from "Real-Time Collision Detection" (Christer Ericson),
    /// section 5.1.5.
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let Self { a, b, c } = *self;
        let ab = b - a;
        let ac = c - a;

        let ap = point - a;
        let d1 = ab.dot(ap);
        let d2 = ac.dot(ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return a;
        }

        let bp = point - b;
        let d3 = ab.dot(bp);
        let d4 = ac.dot(bp);
        if d3 >= 0.0 && d4 <= d3 {
            return b;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            return a + ab * (d1 / (d1 - d3));
        }

        let cp = point - c;
        let d5 = ab.dot(cp);
        let d6 = ac.dot(cp);
        if d6 >= 0.0 && d5 <= d6 {
            return c;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            return a + ac * (d2 / (d2 - d6));
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && d4 - d3 >= 0.0 && d5 - d6 >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return b + (c - b) * w;
        }

        // Inside the face region
        let denom = 1.0 / (va + vb + vc);
        a + ab * (vb * denom) + ac * (vc * denom)
    }
}

/// A half-line starting at `origin`
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    origin: Vec3,
    /// Unit length
    direction: Vec3,
}

impl Ray {
    /// Construct a ray from `origin` heading along `direction`, which need not have unit length
    ///
    /// Panics if `direction` is zero or not finite.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let direction = direction
            .try_normalize()
            .expect("ray direction must be non-zero and finite");
        Self { origin, direction }
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }

    /// Distance along the ray to `triangle`, hitting either side
    ///
    /// Möller-Trumbore.
    pub fn intersect_triangle(&self, triangle: &Triangle) -> Option<f32> {
        let e1 = triangle.b - triangle.a;
        let e2 = triangle.c - triangle.a;
        let p = self.direction.cross(e2);
        let det = e1.dot(p);
        if det.abs() <= f32::EPSILON * e1.length_squared().max(e2.length_squared()) {
            // Parallel or degenerate
            return None;
        }
        let inverse = 1.0 / det;
        let s = self.origin - triangle.a;
        let u = s.dot(p) * inverse;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(e1);
        let v = self.direction.dot(q) * inverse;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(q) * inverse;
        (t >= 0.0).then_some(t)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    /// Panics if `radius` is negative or not finite.
    pub fn new(center: Vec3, radius: f32) -> Self {
        assert!(
            radius.is_finite() && radius >= 0.0,
            "sphere radius must be finite and non-negative, got {radius}"
        );
        Self { center, radius }
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.center.distance_squared(point) <= self.radius * self.radius
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.contains_point(aabb.closest_point(self.center))
    }

    pub fn intersects_triangle(&self, triangle: &Triangle) -> bool {
        self.contains_point(triangle.closest_point(self.center))
    }
}

/// The nearest face hit by a ray
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FaceIntersection {
    pub face: FaceId,
    /// World space location of the hit
    pub point: Vec3,
    /// Distance from the ray origin to `point`
    pub distance: f32,
}

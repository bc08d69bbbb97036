// Shared geometric helpers for the unstructured mesh core

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// 3D point type
pub type Point3D = Point3<f64>;

/// 3D vector type
pub type Vector3D = Vector3<f64>;

/// A ray for point queries against the mesh
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Point3D,
    pub direction: Vector3D,
}

impl Ray {
    pub fn new(origin: Point3D, direction: Vector3D) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }
}

/// Midpoint of two points
pub fn midpoint(a: &Point3D, b: &Point3D) -> Point3D {
    Point3D::from((a.coords + b.coords) / 2.0)
}

/// Area of the triangle (a, b, c)
pub fn triangle_area(a: &Point3D, b: &Point3D, c: &Point3D) -> f64 {
    (b - a).cross(&(c - a)).norm() / 2.0
}

/// Unit normal of the triangle (a, b, c)
/// Returns (0, 0, 1) for degenerate triangles
pub fn triangle_normal(a: &Point3D, b: &Point3D, c: &Point3D) -> Vector3D {
    let cross = (b - a).cross(&(c - a));
    let norm = cross.norm();

    // Handle degenerate triangles (zero area or nearly colinear)
    if norm < 1e-10 || !norm.is_finite() {
        return Vector3D::new(0.0, 0.0, 1.0);
    }

    cross / norm
}

/// Interior angle at `apex` formed by the segments to `p` and `q`
pub fn interior_angle(apex: &Point3D, p: &Point3D, q: &Point3D) -> f64 {
    let u = p - apex;
    let v = q - apex;
    let nu = u.norm();
    let nv = v.norm();

    if nu < 1e-12 || nv < 1e-12 {
        return 0.0;
    }

    (u.dot(&v) / (nu * nv)).clamp(-1.0, 1.0).acos()
}

/// Cotangent of the angle at `pk` opposite to the edge (pi, pj)
pub fn cotangent(pi: &Point3D, pj: &Point3D, pk: &Point3D) -> f64 {
    let u = pi - pk;
    let v = pj - pk;

    let dot = u.dot(&v);
    let cross = u.cross(&v).norm();

    if cross < 1e-10 {
        return 0.0; // Degenerate triangle
    }

    dot / cross
}

/// Barycentric coordinates of `point` with respect to triangle (a, b, c)
pub fn barycentric_coords(
    a: &Point3D,
    b: &Point3D,
    c: &Point3D,
    point: &Point3D,
) -> Option<(f64, f64, f64)> {
    let v0v1 = b - a;
    let v0v2 = c - a;
    let v0p = point - a;

    let d00 = v0v1.dot(&v0v1);
    let d01 = v0v1.dot(&v0v2);
    let d11 = v0v2.dot(&v0v2);
    let d20 = v0p.dot(&v0v1);
    let d21 = v0p.dot(&v0v2);

    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-10 {
        return None; // Degenerate triangle
    }

    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    let u = 1.0 - v - w;

    Some((u, v, w))
}

/// Circumcenter of triangle (a, b, c), falling back to the barycenter when the
/// circumcenter lies outside the triangle or the triangle is degenerate.
pub fn face_center(a: &Point3D, b: &Point3D, c: &Point3D) -> Point3D {
    let barycenter = Point3D::from((a.coords + b.coords + c.coords) / 3.0);

    let ab = b - a;
    let ac = c - a;
    let n = ab.cross(&ac);
    let n2 = n.norm_squared();

    if n2 < 1e-20 {
        return barycenter;
    }

    // Classic circumcenter formula relative to `a`
    let offset = (ac.norm_squared() * n.cross(&ab) + ab.norm_squared() * ac.cross(&n)) / (2.0 * n2);
    let cc = a + offset;

    match barycentric_coords(a, b, c, &cc) {
        Some((u, v, w)) if u >= 0.0 && v >= 0.0 && w >= 0.0 => cc,
        _ => barycenter,
    }
}

/// Moeller-Trumbore ray/triangle intersection.
/// Returns the ray parameter `t` of the hit, or None.
pub fn ray_triangle_intersect(ray: &Ray, a: &Point3D, b: &Point3D, c: &Point3D) -> Option<f64> {
    const EPS: f64 = 1e-12;

    let e1 = b - a;
    let e2 = c - a;
    let pvec = ray.direction.cross(&e2);
    let det = e1.dot(&pvec);

    if det.abs() < EPS {
        return None; // Ray parallel to triangle plane
    }

    let inv_det = 1.0 / det;
    let tvec = ray.origin - a;
    let u = tvec.dot(&pvec) * inv_det;
    if !(-EPS..=1.0 + EPS).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(&e1);
    let v = ray.direction.dot(&qvec) * inv_det;
    if v < -EPS || u + v > 1.0 + EPS {
        return None;
    }

    let t = e2.dot(&qvec) * inv_det;
    if t > EPS {
        Some(t)
    } else {
        None
    }
}

/// Signed area of triangle (p, q, r) with respect to the reference normal
pub fn signed_triangle_area(p: &Point3D, q: &Point3D, r: &Point3D, normal: &Vector3D) -> f64 {
    (q - p).cross(&(r - p)).dot(normal) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cotangent_sixty_degrees() {
        let p0 = Point3D::new(0.0, 0.0, 0.0);
        let p1 = Point3D::new(1.0, 0.0, 0.0);
        let p2 = Point3D::new(0.5, 3.0_f64.sqrt() / 2.0, 0.0);

        let cot = cotangent(&p0, &p1, &p2);
        let expected = 1.0 / 60.0_f64.to_radians().tan();

        assert!((cot - expected).abs() < 1e-10);
    }

    #[test]
    fn test_face_center_interior_circumcenter() {
        // Equilateral triangle: circumcenter coincides with the barycenter
        let a = Point3D::new(0.0, 0.0, 0.0);
        let b = Point3D::new(1.0, 0.0, 0.0);
        let c = Point3D::new(0.5, 3.0_f64.sqrt() / 2.0, 0.0);

        let center = face_center(&a, &b, &c);
        let expected = Point3D::new(0.5, 1.0 / (2.0 * 3.0_f64.sqrt()), 0.0);

        assert!((center - expected).norm() < 1e-10);
    }

    #[test]
    fn test_face_center_obtuse_falls_back() {
        // Very obtuse triangle: circumcenter lies outside, expect barycenter
        let a = Point3D::new(0.0, 0.0, 0.0);
        let b = Point3D::new(10.0, 0.0, 0.0);
        let c = Point3D::new(5.0, 0.1, 0.0);

        let center = face_center(&a, &b, &c);
        let barycenter = Point3D::from((a.coords + b.coords + c.coords) / 3.0);

        assert!((center - barycenter).norm() < 1e-10);
    }

    #[test]
    fn test_ray_triangle_hit() {
        let a = Point3D::new(0.0, 0.0, 0.0);
        let b = Point3D::new(1.0, 0.0, 0.0);
        let c = Point3D::new(0.0, 1.0, 0.0);

        let ray = Ray::new(Point3D::new(0.25, 0.25, 5.0), Vector3D::new(0.0, 0.0, -1.0));
        let t = ray_triangle_intersect(&ray, &a, &b, &c).unwrap();
        assert!((t - 5.0).abs() < 1e-10);

        let miss = Ray::new(Point3D::new(2.0, 2.0, 5.0), Vector3D::new(0.0, 0.0, -1.0));
        assert!(ray_triangle_intersect(&miss, &a, &b, &c).is_none());
    }

    #[test]
    fn test_interior_angle_right() {
        let apex = Point3D::new(0.0, 0.0, 0.0);
        let p = Point3D::new(1.0, 0.0, 0.0);
        let q = Point3D::new(0.0, 1.0, 0.0);

        let angle = interior_angle(&apex, &p, &q);
        assert!((angle - std::f64::consts::FRAC_PI_2).abs() < 1e-10);
    }
}

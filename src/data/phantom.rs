use ndarray::Array3;

/// One ellipsoid of the phantom: intensity, semi-axes, center and rotation
/// about the z axis in degrees. Coordinates live in `[-1, 1]^3`.
struct Ellipsoid {
    intensity: f32,
    axes: (f64, f64, f64),
    center: (f64, f64, f64),
    phi: f64,
}

const fn ellipsoid(intensity: f32, a: f64, b: f64, c: f64, x0: f64, y0: f64, z0: f64, phi: f64) -> Ellipsoid {
    Ellipsoid {
        intensity,
        axes: (a, b, c),
        center: (x0, y0, z0),
        phi,
    }
}

/// Modified Shepp-Logan head, 3D extension.
const MODIFIED_SHEPP_LOGAN: [Ellipsoid; 10] = [
    ellipsoid(1.0, 0.6900, 0.920, 0.810, 0.0, 0.0, 0.0, 0.0),
    ellipsoid(-0.8, 0.6624, 0.874, 0.780, 0.0, -0.0184, 0.0, 0.0),
    ellipsoid(-0.2, 0.1100, 0.310, 0.220, 0.22, 0.0, 0.0, -18.0),
    ellipsoid(-0.2, 0.1600, 0.410, 0.280, -0.22, 0.0, 0.0, 18.0),
    ellipsoid(0.1, 0.2100, 0.250, 0.410, 0.0, 0.35, -0.15, 0.0),
    ellipsoid(0.1, 0.0460, 0.046, 0.050, 0.0, 0.1, 0.25, 0.0),
    ellipsoid(0.1, 0.0460, 0.046, 0.050, 0.0, -0.1, 0.25, 0.0),
    ellipsoid(0.1, 0.0460, 0.023, 0.050, -0.08, -0.605, 0.0, 0.0),
    ellipsoid(0.1, 0.0230, 0.023, 0.020, 0.0, -0.606, 0.0, 0.0),
    ellipsoid(0.1, 0.0230, 0.046, 0.020, 0.06, -0.605, 0.0, 0.0),
];

/// Modified Shepp-Logan phantom of shape `(size, size, size)`, axes `(z, y, x)`.
/// Values lie in `[0, 1]`.
pub fn shepp_logan_3d(size: usize) -> Array3<f32> {
    let coord = |i: usize| {
        if size <= 1 {
            0.0
        } else {
            -1.0 + 2.0 * i as f64 / (size - 1) as f64
        }
    };

    Array3::from_shape_fn((size, size, size), |(k, j, i)| {
        let (x, y, z) = (coord(i), -coord(j), coord(k));
        MODIFIED_SHEPP_LOGAN
            .iter()
            .filter(|e| e.contains(x, y, z))
            .map(|e| e.intensity)
            .sum::<f32>()
            .max(0.0)
    })
}

impl Ellipsoid {
    fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        let (sin_p, cos_p) = self.phi.to_radians().sin_cos();
        let dx = x - self.center.0;
        let dy = y - self.center.1;
        let dz = z - self.center.2;
        let u = dx * cos_p + dy * sin_p;
        let v = -dx * sin_p + dy * cos_p;
        (u / self.axes.0).powi(2) + (v / self.axes.1).powi(2) + (dz / self.axes.2).powi(2) <= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phantom_shape_and_range() {
        let phantom = shepp_logan_3d(32);
        assert_eq!(phantom.dim(), (32, 32, 32));
        assert!(phantom.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(phantom.iter().any(|v| *v > 0.0));
    }

    #[test]
    fn test_phantom_corners_empty_and_center_filled() {
        let phantom = shepp_logan_3d(33);
        assert_eq!(phantom[[0, 0, 0]], 0.0);
        assert_eq!(phantom[[32, 32, 32]], 0.0);
        assert!((phantom[[16, 16, 16]] - 0.2).abs() < 1e-6);
    }
}

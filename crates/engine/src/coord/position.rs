use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Symmetric bound applied to every Cartesian component, in meters.
pub const CARTESIAN_LIMIT: f64 = 1000.0;
/// Upper bound for polar distance, in meters.
pub const MAX_DISTANCE: f64 = 1000.0;

/// Spherical coordinates in degrees and meters.
///
/// Azimuth is measured in the horizontal plane from the +X axis towards +Y,
/// elevation from the horizontal plane towards +Z.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Polar {
    pub azimuth: f64,
    pub elevation: f64,
    pub distance: f64,
}

impl Polar {
    pub const fn new(azimuth: f64, elevation: f64, distance: f64) -> Self {
        Self {
            azimuth,
            elevation,
            distance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Position {
    Cartesian(DVec3),
    Polar(Polar),
}

impl Default for Position {
    fn default() -> Self {
        Self::Cartesian(DVec3::ZERO)
    }
}

impl From<DVec3> for Position {
    fn from(value: DVec3) -> Self {
        Self::Cartesian(value)
    }
}

impl From<Polar> for Position {
    fn from(value: Polar) -> Self {
        Self::Polar(value)
    }
}

impl Position {
    pub fn cartesian(x: f64, y: f64, z: f64) -> Self {
        Self::Cartesian(DVec3::new(x, y, z))
    }

    pub fn polar(azimuth: f64, elevation: f64, distance: f64) -> Self {
        Self::Polar(Polar::new(azimuth, elevation, distance))
    }

    pub fn is_polar(&self) -> bool {
        matches!(self, Self::Polar(_))
    }

    pub fn components(&self) -> [f64; 3] {
        match *self {
            Self::Cartesian(v) => v.to_array(),
            Self::Polar(p) => [p.azimuth, p.elevation, p.distance],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.components().iter().all(|c| c.is_finite())
    }

    /// Cartesian vector of this position, converting if needed.
    pub fn to_vec3(&self) -> DVec3 {
        match *self {
            Self::Cartesian(v) => finite_vec(v),
            Self::Polar(p) => polar_to_vec(p),
        }
    }

    pub fn to_cartesian(&self) -> Position {
        Self::Cartesian(self.to_vec3())
    }

    pub fn to_polar(&self) -> Position {
        Self::Polar(self.as_polar())
    }

    /// Converts into the same variant as `like`.
    pub fn to_variant_of(&self, like: &Position) -> Position {
        if like.is_polar() {
            self.to_polar()
        } else {
            self.to_cartesian()
        }
    }

    /// Linear interpolation in `self`'s variant. Polar azimuth follows the
    /// shortest arc so that crossing +/-180 degrees does not sweep the long
    /// way round.
    pub fn interpolate(&self, other: &Position, t: f64) -> Position {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        if t <= 0.0 {
            return self.to_variant_of(self);
        }
        if t >= 1.0 {
            return other.to_variant_of(self);
        }

        if !self.is_polar() {
            return Self::Cartesian(finite_vec(self.to_vec3().lerp(other.to_vec3(), t)));
        }

        let (a, b) = (self.as_polar(), other.as_polar());
        let delta = wrap_degrees(b.azimuth - a.azimuth);
        Self::Polar(Polar {
            azimuth: wrap_degrees(a.azimuth + delta * t),
            elevation: finite_or_zero(a.elevation + (b.elevation - a.elevation) * t),
            distance: finite_or_zero(a.distance + (b.distance - a.distance) * t),
        })
    }

    /// Polar components of this position, converting if needed.
    pub fn as_polar(&self) -> Polar {
        match *self {
            Self::Cartesian(v) => vec_to_polar(finite_vec(v)),
            Self::Polar(p) => Polar {
                azimuth: finite_or_zero(p.azimuth),
                elevation: finite_or_zero(p.elevation),
                distance: finite_or_zero(p.distance),
            },
        }
    }

    /// Clamps every component into its declared bound.
    pub fn normalize(&self) -> Position {
        match *self {
            Self::Cartesian(v) => Self::Cartesian(
                finite_vec(v).clamp(DVec3::splat(-CARTESIAN_LIMIT), DVec3::splat(CARTESIAN_LIMIT)),
            ),
            Self::Polar(p) => Self::Polar(Polar {
                azimuth: wrap_degrees(p.azimuth),
                elevation: finite_or_zero(p.elevation).clamp(-90.0, 90.0),
                distance: finite_or_zero(p.distance).clamp(0.0, MAX_DISTANCE),
            }),
        }
    }

    /// Adds a Cartesian offset, keeping `self`'s variant.
    pub fn offset_by(&self, offset: DVec3) -> Position {
        Position::Cartesian(self.to_vec3() + finite_vec(offset)).to_variant_of(self)
    }
}

/// Wraps an angle in degrees into (-180, 180].
pub fn wrap_degrees(angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 { wrapped + 360.0 } else { wrapped }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn finite_vec(v: DVec3) -> DVec3 {
    DVec3::new(finite_or_zero(v.x), finite_or_zero(v.y), finite_or_zero(v.z))
}

fn polar_to_vec(p: Polar) -> DVec3 {
    let azimuth = finite_or_zero(p.azimuth).to_radians();
    let elevation = finite_or_zero(p.elevation).to_radians();
    let distance = finite_or_zero(p.distance);

    let (sin_az, cos_az) = azimuth.sin_cos();
    let (sin_el, cos_el) = elevation.sin_cos();
    finite_vec(DVec3::new(
        distance * cos_el * cos_az,
        distance * cos_el * sin_az,
        distance * sin_el,
    ))
}

fn vec_to_polar(v: DVec3) -> Polar {
    let distance = v.length();
    if distance <= f64::EPSILON || !distance.is_finite() {
        return Polar::default();
    }

    let horizontal = v.x.hypot(v.y);
    let azimuth = if horizontal <= f64::EPSILON {
        0.0
    } else {
        wrap_degrees(v.y.atan2(v.x).to_degrees())
    };
    let elevation = (v.z / distance).clamp(-1.0, 1.0).asin().to_degrees();

    Polar {
        azimuth,
        elevation,
        distance,
    }
}

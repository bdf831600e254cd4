//! Transform matrix comparison, validation and test-matrix generation.
//!
//! Matrices are row-major 4x4 homogeneous transforms with translation in
//! millimeters. All comparisons use absolute element differences.

use std::fmt::Write as _;

use brpnav_frame::{Matrix4x4, IDENTITY};
use rand::Rng;

/// Tolerance of an "exact" comparison.
pub const EXACT_TOLERANCE: f64 = 1.0e-10;

/// Bound on `|RᵀR - I|` and `|det R - 1|` for a well-formed rotation.
pub const ROTATION_TOLERANCE: f64 = 1.0e-3;

/// Range of the random test translation, per axis.
pub const RANDOM_TRANSLATION_MM: f32 = 50.0;

/// How a received transform is checked against the expected one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatrixCheck {
    /// Element-wise within [`EXACT_TOLERANCE`].
    Exact,
    /// Element-wise within the given absolute tolerance.
    Within(f64),
    /// Only the arrival of a transform matters.
    Any,
}

impl MatrixCheck {
    /// Tolerance to compare with, or `None` when the value is not checked.
    pub fn tolerance(self) -> Option<f64> {
        match self {
            MatrixCheck::Exact => Some(EXACT_TOLERANCE),
            MatrixCheck::Within(tolerance) => Some(tolerance),
            MatrixCheck::Any => None,
        }
    }
}

/// True when every pair of corresponding elements differs by at most `tol`.
///
/// Identical elements always match, including non-finite ones.
pub fn compare(a: &Matrix4x4, b: &Matrix4x4, tol: f64) -> bool {
    a.iter()
        .flatten()
        .zip(b.iter().flatten())
        .all(|(&x, &y)| element_matches(x, y, tol))
}

fn element_matches(x: f32, y: f32, tol: f64) -> bool {
    if x == y || (x.is_nan() && y.is_nan()) {
        return true;
    }
    (f64::from(x) - f64::from(y)).abs() <= tol
}

/// Largest absolute element difference, for diagnostics.
pub fn max_difference(a: &Matrix4x4, b: &Matrix4x4) -> f64 {
    a.iter()
        .flatten()
        .zip(b.iter().flatten())
        .map(|(&x, &y)| (f64::from(x) - f64::from(y)).abs())
        .fold(0.0, f64::max)
}

/// Why a matrix is not a rigid transform.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatrixDefect {
    #[error("element [{row}][{col}] is not finite")]
    NonFinite { row: usize, col: usize },

    #[error("rotation is not orthonormal (max |RᵀR - I| = {deviation:.3e})")]
    NotOrthonormal { deviation: f64 },

    #[error("rotation determinant is {determinant:.6}, expected +1")]
    NotProperRotation { determinant: f64 },

    #[error("bottom row is not 0 0 0 1")]
    BadBottomRow,
}

/// Check that `matrix` is a rigid transform: finite values, orthonormal
/// rotation block with determinant +1, and a `0 0 0 1` bottom row.
pub fn validate_matrix(matrix: &Matrix4x4) -> Result<(), MatrixDefect> {
    for (row, values) in matrix.iter().enumerate() {
        if let Some(col) = values.iter().position(|v| !v.is_finite()) {
            return Err(MatrixDefect::NonFinite { row, col });
        }
    }

    let r = |i: usize, j: usize| f64::from(matrix[i][j]);
    let mut deviation = 0.0f64;
    for i in 0..3 {
        for j in 0..3 {
            let dot: f64 = (0..3).map(|k| r(k, i) * r(k, j)).sum();
            let expected = if i == j { 1.0 } else { 0.0 };
            deviation = deviation.max((dot - expected).abs());
        }
    }
    if deviation > ROTATION_TOLERANCE {
        return Err(MatrixDefect::NotOrthonormal { deviation });
    }

    let determinant = r(0, 0) * (r(1, 1) * r(2, 2) - r(1, 2) * r(2, 1))
        - r(0, 1) * (r(1, 0) * r(2, 2) - r(1, 2) * r(2, 0))
        + r(0, 2) * (r(1, 0) * r(2, 1) - r(1, 1) * r(2, 0));
    if (determinant - 1.0).abs() > ROTATION_TOLERANCE {
        return Err(MatrixDefect::NotProperRotation { determinant });
    }

    if matrix[3] != [0.0, 0.0, 0.0, 1.0] {
        return Err(MatrixDefect::BadBottomRow);
    }
    Ok(())
}

pub fn is_well_formed(matrix: &Matrix4x4) -> bool {
    validate_matrix(matrix).is_ok()
}

/// Identity transform.
pub fn identity() -> Matrix4x4 {
    IDENTITY
}

/// Rotation matrix of the quaternion `[x, y, z, w]`, normalized first.
pub fn quaternion_to_matrix(q: [f32; 4]) -> Matrix4x4 {
    let norm = q.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return IDENTITY;
    }
    let [x, y, z, w] = q.map(|v| v / norm);

    [
        [
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - z * w),
            2.0 * (x * z + y * w),
            0.0,
        ],
        [
            2.0 * (x * y + z * w),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - x * w),
            0.0,
        ],
        [
            2.0 * (x * z - y * w),
            2.0 * (y * z + x * w),
            1.0 - 2.0 * (x * x + y * y),
            0.0,
        ],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Random rigid transform: uniformly random rotation, translation within
/// ±[`RANDOM_TRANSLATION_MM`] on each axis.
pub fn random_test_matrix<R: Rng + ?Sized>(rng: &mut R) -> Matrix4x4 {
    // Shoemake's uniform unit quaternion.
    let u1: f32 = rng.gen();
    let u2: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
    let u3: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
    let a = (1.0 - u1).sqrt();
    let b = u1.sqrt();
    let q = [a * u2.sin(), a * u2.cos(), b * u3.sin(), b * u3.cos()];

    let mut matrix = quaternion_to_matrix(q);
    for row in matrix.iter_mut().take(3) {
        row[3] = rng.gen_range(-RANDOM_TRANSLATION_MM..RANDOM_TRANSLATION_MM);
    }
    matrix
}

/// Euclidean distance between the translations of two transforms.
pub fn translation_distance(a: &Matrix4x4, b: &Matrix4x4) -> f64 {
    (0..3)
        .map(|i| {
            let d = f64::from(a[i][3]) - f64::from(b[i][3]);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Largest absolute difference between the rotation blocks of two
/// transforms. NaN when either block holds a NaN.
pub fn rotation_difference(a: &Matrix4x4, b: &Matrix4x4) -> f64 {
    let mut max = 0.0f64;
    for (row_a, row_b) in a.iter().zip(b.iter()).take(3) {
        for (&x, &y) in row_a.iter().zip(row_b.iter()).take(3) {
            let d = (f64::from(x) - f64::from(y)).abs();
            if d.is_nan() {
                return f64::NAN;
            }
            max = max.max(d);
        }
    }
    max
}

/// Multi-line rendering for traces.
pub fn format_matrix(matrix: &Matrix4x4) -> String {
    let mut out = String::new();
    for (i, row) in matrix.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(
            out,
            "[ {:>10.4}, {:>10.4}, {:>10.4}, {:>10.4} ]",
            row[0], row[1], row[2], row[3]
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn matrix_strategy() -> impl Strategy<Value = Matrix4x4> {
        prop::array::uniform4(prop::array::uniform4(any::<f32>()))
    }

    proptest! {
        #[test]
        fn compare_is_reflexive(a in matrix_strategy(), tol in 0.0f64..1.0e6) {
            prop_assert!(compare(&a, &a, tol));
        }

        #[test]
        fn compare_is_symmetric(
            a in matrix_strategy(),
            b in matrix_strategy(),
            tol in 0.0f64..1.0e6,
        ) {
            prop_assert_eq!(compare(&a, &b, tol), compare(&b, &a, tol));
        }

        #[test]
        fn compare_is_monotonic_in_tolerance(
            a in prop::array::uniform4(prop::array::uniform4(-100.0f32..100.0)),
            b in prop::array::uniform4(prop::array::uniform4(-100.0f32..100.0)),
            tol in 0.0f64..200.0,
            extra in 0.0f64..200.0,
        ) {
            if compare(&a, &b, tol) {
                prop_assert!(compare(&a, &b, tol + extra));
            }
        }

        #[test]
        fn random_matrices_are_rigid(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let matrix = random_test_matrix(&mut rng);
            prop_assert!(is_well_formed(&matrix), "{}", format_matrix(&matrix));
            for row in matrix.iter().take(3) {
                prop_assert!(row[3].abs() <= RANDOM_TRANSLATION_MM);
            }
        }
    }

    #[test]
    fn single_element_beyond_tolerance_fails() {
        let mut moved = IDENTITY;
        moved[1][3] = 0.5;
        assert!(!compare(&IDENTITY, &moved, 0.4));
        assert!(compare(&IDENTITY, &moved, 0.5));
        assert!((max_difference(&IDENTITY, &moved) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn exact_check_rejects_float_noise() {
        let mut noisy = IDENTITY;
        noisy[0][0] = 1.0 + f32::EPSILON;
        let tol = MatrixCheck::Exact.tolerance().unwrap();
        assert!(!compare(&IDENTITY, &noisy, tol));
        assert_eq!(MatrixCheck::Any.tolerance(), None);
        assert_eq!(MatrixCheck::Within(2.0).tolerance(), Some(2.0));
    }

    #[test]
    fn identity_is_well_formed() {
        assert_eq!(validate_matrix(&identity()), Ok(()));
    }

    #[test]
    fn validate_reports_defects() {
        let mut m = IDENTITY;
        m[2][3] = f32::NAN;
        assert_eq!(
            validate_matrix(&m),
            Err(MatrixDefect::NonFinite { row: 2, col: 3 })
        );

        let mut skewed = IDENTITY;
        skewed[0][1] = 0.5;
        assert!(matches!(
            validate_matrix(&skewed),
            Err(MatrixDefect::NotOrthonormal { .. })
        ));

        let mut mirrored = IDENTITY;
        mirrored[2][2] = -1.0;
        assert!(matches!(
            validate_matrix(&mirrored),
            Err(MatrixDefect::NotProperRotation { .. })
        ));

        let mut projective = IDENTITY;
        projective[3][0] = 1.0;
        assert_eq!(validate_matrix(&projective), Err(MatrixDefect::BadBottomRow));
    }

    #[test]
    fn quaternion_rotation_about_z() {
        let half = std::f32::consts::FRAC_PI_4;
        let m = quaternion_to_matrix([0.0, 0.0, half.sin(), half.cos()]);
        let expected: Matrix4x4 = [
            [0.0, -1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        assert!(compare(&m, &expected, 1e-6), "{}", format_matrix(&m));
        assert_eq!(quaternion_to_matrix([0.0; 4]), IDENTITY);
    }

    #[test]
    fn translation_distance_is_euclidean() {
        let mut a = IDENTITY;
        a[0][3] = 3.0;
        a[1][3] = 4.0;
        assert!((translation_distance(&a, &IDENTITY) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn rotation_difference_ignores_translation() {
        let mut moved = IDENTITY;
        moved[2][3] = 40.0;
        assert_eq!(rotation_difference(&moved, &IDENTITY), 0.0);

        let turned = quaternion_to_matrix([0.0, 0.0, 0.5f32.sqrt(), 0.5f32.sqrt()]);
        assert!((rotation_difference(&turned, &IDENTITY) - 1.0).abs() < 1e-6);

        let mut nan = IDENTITY;
        nan[1][1] = f32::NAN;
        assert!(rotation_difference(&nan, &IDENTITY).is_nan());
    }

    #[test]
    fn format_has_four_rows() {
        let text = format_matrix(&IDENTITY);
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("[     1.0000,"));
    }
}

use std::sync::Arc;

use ffreg_core::geometry::{Point, Spacing};
use ffreg_core::grid::{GridScheduleComputer, GridScheduler};
use ffreg_core::image::ImageDomain;
use ffreg_core::transform::{BSplineDeformation, ParametricTransform, TranslationTransform};
use ffreg_registration::metric::{CombinedCost, CorrespondingPointsDistanceMetric, CostFunction, DistanceMode, RegistrationComponent};
use ffreg_registration::regularization::RigidityPenaltyTerm;
use ffreg_registration::RegistrationError;

fn bspline_2d() -> (Arc<BSplineDeformation<2>>, ImageDomain<2>) {
    let domain = ImageDomain::<2>::from_size([20, 20]);
    let grid = GridScheduleComputer::<2>::default()
        .compute_grid(&domain, &Spacing::<2>::repeat(5.0))
        .unwrap();
    (Arc::new(BSplineDeformation::new(grid)), domain)
}

fn landmarks() -> Vec<Point<2>> {
    vec![
        Point::<2>::new(2.0, 3.0),
        Point::<2>::new(10.0, 10.0),
        Point::<2>::new(15.5, 4.0),
        Point::<2>::new(7.0, 17.0),
    ]
}

#[test]
fn test_single_pair_3d() {
    let metric = CorrespondingPointsDistanceMetric::<3>::new(
        vec![Point::<3>::new(0.0, 0.0, 0.0)],
        vec![Point::<3>::new(1.0, 0.0, 0.0)],
        Arc::new(TranslationTransform::<3>::new()),
    )
    .unwrap();
    let (value, derivative) = metric.value_and_derivative(&[0.0, 0.0, 0.0]).unwrap();
    assert_eq!(value, 1.0);
    assert_eq!(derivative, vec![2.0, 0.0, 0.0]);
}

#[test]
fn test_identical_sets_are_zero() {
    let (transform, _) = bspline_2d();
    let points = landmarks();
    let metric = CorrespondingPointsDistanceMetric::new(points.clone(), points, transform.clone()).unwrap();
    let (value, derivative) = metric.value_and_derivative(&transform.identity_parameters()).unwrap();
    assert_eq!(value, 0.0);
    assert!(derivative.iter().all(|&d| d == 0.0));
}

#[test]
fn test_mismatched_counts_rejected() {
    let result = CorrespondingPointsDistanceMetric::<2>::new(
        landmarks(),
        landmarks()[..3].to_vec(),
        Arc::new(TranslationTransform::<2>::new()),
    );
    assert!(matches!(
        result,
        Err(RegistrationError::PointCountMismatch { fixed: 4, moving: 3 })
    ));
}

#[test]
fn test_uniform_bspline_shift_cancels_offset() {
    let (transform, _) = bspline_2d();
    let fixed = landmarks();
    let moving: Vec<Point<2>> = fixed.iter().map(|p| Point::<2>::new(p.x + 1.0, p.y)).collect();
    let metric = CorrespondingPointsDistanceMetric::new(fixed, moving, transform.clone()).unwrap();

    let identity = transform.identity_parameters();
    assert!((metric.value(&identity).unwrap() - 1.0).abs() < 1e-12);

    // Cubic B-spline weights sum to one, so equal coefficients translate.
    let n = transform.number_of_control_points();
    let mut shift = identity.clone();
    shift[..n].iter_mut().for_each(|p| *p = -1.0);
    assert!(metric.value(&shift).unwrap() < 1e-20);
}

#[test]
fn test_bspline_gradient_matches_finite_differences() {
    let (transform, _) = bspline_2d();
    let fixed = landmarks();
    let moving: Vec<Point<2>> = fixed.iter().map(|p| Point::<2>::new(p.x + 0.7, p.y - 0.4)).collect();
    for mode in [DistanceMode::Squared, DistanceMode::Euclidean] {
        let metric = CorrespondingPointsDistanceMetric::new(fixed.clone(), moving.clone(), transform.clone())
            .unwrap()
            .with_mode(mode);
        let parameters: Vec<f64> = (0..transform.number_of_parameters())
            .map(|i| 0.2 * ((i as f64) * 1.3).cos())
            .collect();
        let (_, derivative) = metric.value_and_derivative(&parameters).unwrap();

        let h = 1e-6;
        for index in (0..parameters.len()).step_by(7) {
            let mut plus = parameters.clone();
            let mut minus = parameters.clone();
            plus[index] += h;
            minus[index] -= h;
            let numeric = (metric.value(&plus).unwrap() - metric.value(&minus).unwrap()) / (2.0 * h);
            assert!(
                (numeric - derivative[index]).abs() < 1e-6,
                "{} parameter {}: numeric {} analytic {}",
                mode,
                index,
                numeric,
                derivative[index]
            );
        }
    }
}

#[test]
fn test_combined_with_rigidity_under_translation() {
    let (transform, domain) = bspline_2d();
    let fixed = landmarks();
    let moving: Vec<Point<2>> = fixed.iter().map(|p| Point::<2>::new(p.x + 1.0, p.y)).collect();
    let metric = CorrespondingPointsDistanceMetric::new(fixed, moving, transform.clone()).unwrap();
    let mut rigidity = RigidityPenaltyTerm::new().use_rigidity_everywhere(true);
    rigidity.prepare_level(transform.clone(), domain, None);

    let n = transform.number_of_control_points();
    let mut shift = transform.identity_parameters();
    shift[..n].iter_mut().for_each(|p| *p = -1.0);
    rigidity.initialize(&shift).unwrap();

    let cost = CombinedCost::<2>::new()
        .with_term(1.0, Box::new(metric))
        .with_term(0.5, Box::new(rigidity));
    assert_eq!(cost.describe(), vec![("corresponding_points", 1.0), ("rigidity", 0.5)]);

    // A pure translation is rigid; only the point residual remains and it is zero.
    let (value, derivative) = cost.value_and_derivative(&shift).unwrap();
    assert!(value < 1e-20);
    assert!(derivative.iter().all(|d| d.abs() < 1e-9));
}

use std::sync::Arc;

use ffreg_core::geometry::Spacing;
use ffreg_core::grid::{GridScheduleComputer, GridScheduler, PeriodicGridScheduleComputer};
use ffreg_core::image::ImageDomain;
use ffreg_core::transform::{BSplineDeformation, ParametricTransform};
use ffreg_registration::metric::{CostFunction, RegistrationComponent};
use ffreg_registration::regularization::{CoefficientMap, PenaltyTerm, RigidityPenaltyTerm};
use proptest::prelude::*;

fn deformation<const D: usize>(size: [usize; D], grid_spacing: f64) -> (Arc<BSplineDeformation<D>>, ImageDomain<D>) {
    let domain = ImageDomain::<D>::from_size(size);
    let grid = GridScheduleComputer::<D>::default()
        .compute_grid(&domain, &Spacing::<D>::repeat(grid_spacing))
        .unwrap();
    (Arc::new(BSplineDeformation::new(grid)), domain)
}

fn wavy(n: usize, amplitude: f64) -> Vec<f64> {
    (0..n).map(|i| amplitude * ((i as f64) * 0.91).sin()).collect()
}

#[test]
fn test_identity_3d_is_zero() {
    let (transform, domain) = deformation([6, 6, 6], 3.0);
    let mut term = RigidityPenaltyTerm::new().use_rigidity_everywhere(true);
    term.prepare_level(transform.clone(), domain, None);
    let parameters = transform.identity_parameters();
    term.initialize(&parameters).unwrap();

    assert!(term.number_of_samples() > 0);
    let components = term.components(&parameters).unwrap();
    assert_eq!(components.orthonormality, 0.0);
    assert_eq!(components.properness, 0.0);
    assert_eq!(components.linearity, 0.0);
    assert_eq!(term.value(&parameters).unwrap(), 0.0);
}

#[test]
fn test_finite_difference_3d() {
    let (transform, domain) = deformation([6, 6, 6], 3.0);
    let mut term = RigidityPenaltyTerm::new()
        .use_rigidity_everywhere(true)
        .with_sample_subdivision(2);
    term.prepare_level(transform.clone(), domain, None);
    let parameters = wavy(transform.number_of_parameters(), 0.15);
    term.initialize(&parameters).unwrap();
    let (value, derivative) = term.value_and_derivative(&parameters).unwrap();
    assert!(value > 0.0);

    // Central differences along one direction; the error is O(scale^3).
    let direction = wavy(parameters.len(), 1.0);
    for scale in [1e-3, 1e-4] {
        let plus: Vec<f64> = parameters.iter().zip(&direction).map(|(p, d)| p + scale * d).collect();
        let minus: Vec<f64> = parameters.iter().zip(&direction).map(|(p, d)| p - scale * d).collect();
        let numeric = (term.value(&plus).unwrap() - term.value(&minus).unwrap()) / 2.0;
        let analytic: f64 = derivative.iter().zip(&direction).map(|(g, d)| g * scale * d).sum();
        assert!(
            (numeric - analytic).abs() <= scale * scale,
            "scale {}: numeric {} analytic {}",
            scale,
            numeric,
            analytic
        );
    }
}

#[test]
fn test_periodic_axis_samples_wrap() {
    let domain = ImageDomain::<2>::from_size([12, 8]);
    let grid = PeriodicGridScheduleComputer::<2>::new(0)
        .compute_grid(&domain, &Spacing::<2>::new(3.0, 4.0))
        .unwrap();
    assert!(grid.is_periodic(0));
    let transform = Arc::new(BSplineDeformation::new(grid));
    let mut term = RigidityPenaltyTerm::new().use_rigidity_everywhere(true);
    term.prepare_level(transform.clone(), domain, None);
    let parameters = wavy(transform.number_of_parameters(), 0.1);
    term.initialize(&parameters).unwrap();

    // Periodic axis: nodes at 0, 3, 6, 9; other axis: 0 and 4 inside.
    assert_eq!(term.number_of_samples(), 4 * 2);
    let (_, derivative) = term.value_and_derivative(&parameters).unwrap();
    assert!(derivative.iter().all(|d| d.is_finite()));
}

#[test]
fn test_moving_map_sampled_through_transform() {
    let (transform, domain) = deformation([10, 10], 3.0);
    // Rigid only on columns 4 and 5 of the moving image.
    let values = (0..100).map(|i| if (4..=5).contains(&(i % 10)) { 1.0 } else { 0.0 }).collect();
    let moving = CoefficientMap::new(domain.clone(), values).unwrap();

    let mut at_rest = RigidityPenaltyTerm::new().with_moving_coefficients(moving.clone());
    at_rest.prepare_level(transform.clone(), domain.clone(), None);
    at_rest.initialize(&transform.identity_parameters()).unwrap();

    // A uniform +2 shift along axis 1 maps column 3 onto column 5.
    let n = transform.number_of_control_points();
    let mut shifted = vec![0.0; 2 * n];
    shifted[n..].iter_mut().for_each(|p| *p = 2.0);
    let mut moved = RigidityPenaltyTerm::new().with_moving_coefficients(moving);
    moved.prepare_level(transform.clone(), domain, None);
    moved.initialize(&shifted).unwrap();

    // Samples sit at 0, 3, 6, 9 along both axes.
    assert_eq!(at_rest.number_of_samples(), 0);
    assert_eq!(moved.number_of_samples(), 4);
}

#[test]
fn test_dilation_widens_rigid_region() {
    let (transform, domain) = deformation([10, 10], 3.0);
    let values = (0..100).map(|i| if i == 44 { 1.0 } else { 0.0 }).collect();
    let map = CoefficientMap::new(domain.clone(), values).unwrap();

    let mut plain = RigidityPenaltyTerm::new().with_fixed_coefficients(map.clone());
    plain.prepare_level(transform.clone(), domain.clone(), None);
    plain.initialize(&transform.identity_parameters()).unwrap();
    assert_eq!(plain.number_of_samples(), 0);

    // Radius ceil(1.0 * 3 / 1) = 3 covers the grid samples at 3 and 6.
    let mut dilated = RigidityPenaltyTerm::new()
        .with_fixed_coefficients(map)
        .with_dilation(1.0);
    dilated.prepare_level(transform.clone(), domain, None);
    dilated.initialize(&transform.identity_parameters()).unwrap();
    assert_eq!(dilated.number_of_samples(), 4);
    assert!(dilated.is_active());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_zero_map_is_exactly_zero(seed in 0u64..1000, amplitude in 0.0f64..5.0) {
        let (transform, domain) = deformation([10, 10], 3.0);
        let map = CoefficientMap::constant(domain.clone(), 0.0);
        let mut term = RigidityPenaltyTerm::new()
            .with_fixed_coefficients(map.clone())
            .with_moving_coefficients(map);
        term.prepare_level(transform.clone(), domain, None);
        let parameters: Vec<f64> = (0..transform.number_of_parameters())
            .map(|i| amplitude * ((i as u64 * 31 + seed) as f64).sin())
            .collect();
        term.initialize(&parameters).unwrap();

        let (value, derivative) = term.value_and_derivative(&parameters).unwrap();
        prop_assert_eq!(value, 0.0);
        prop_assert!(derivative.iter().all(|&d| d == 0.0));
        prop_assert!(term.sub_terms(&parameters).unwrap().iter().all(|&(_, v)| v == 0.0));
    }

    #[test]
    fn prop_value_is_non_negative(seed in 0u64..1000) {
        let (transform, domain) = deformation([8, 8], 4.0);
        let mut term = RigidityPenaltyTerm::new().use_rigidity_everywhere(true);
        term.prepare_level(transform.clone(), domain, None);
        let parameters: Vec<f64> = (0..transform.number_of_parameters())
            .map(|i| 0.5 * ((i as u64 * 17 + seed) as f64).cos())
            .collect();
        term.initialize(&parameters).unwrap();
        prop_assert!(term.value(&parameters).unwrap() >= 0.0);
    }
}

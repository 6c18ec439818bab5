//! Rigidity Demo
//!
//! Registers two landmark sets on a 2D domain with a B-spline deformation.
//! A disc in the middle of the fixed image is marked rigid; the landmarks
//! inside it move as a block while those outside are stretched.
//!
//! Usage:
//!   RUST_LOG=debug cargo run --example rigidity_demo

use std::sync::Arc;

use burn_ndarray::NdArray;
use ffreg_core::filter::MultiResolutionPyramid;
use ffreg_core::geometry::Point;
use ffreg_core::image::{Image, ImageDomain};
use ffreg_core::transform::TranslationTransform;
use ffreg_registration::mask::MaskPyramidOrchestrator;
use ffreg_registration::metric::CorrespondingPointsDistanceMetric;
use ffreg_registration::regularization::{CoefficientMap, RigidityPenaltyTerm};
use ffreg_registration::{
    HistoryDiagnostics, MultiResolutionRegistration, Objective, Optimizer, ParameterMap, Result,
};
use tracing_subscriber::EnvFilter;

type Backend = NdArray<f32>;

const CONFIG: &str = r#"
NumberOfResolutions = 3
FinalGridSpacingInPhysicalUnits = 8.0
ErodeMask = false
OrthonormalityConditionWeight = [1.0, 1.0, 0.5]
PropernessConditionWeight = 1.0
LinearityConditionWeight = [10.0, 1.0, 1.0]
DilateRigidityImages = true
DilationRadiusMultiplier = 0.5
MaskErosionBackend = "cpu"
"#;

/// Steepest descent with Armijo backtracking.
struct GradientDescent {
    iterations: usize,
}

impl Optimizer for GradientDescent {
    fn optimize(&mut self, objective: &mut dyn Objective, initial: Vec<f64>, _level: usize) -> Result<Vec<f64>> {
        let mut x = initial;
        let (mut value, mut gradient) = objective.value_and_derivative(&x)?;
        let mut step = 1.0;
        for _ in 0..self.iterations {
            let slope: f64 = gradient.iter().map(|g| g * g).sum();
            if slope < 1e-16 {
                break;
            }
            loop {
                let candidate: Vec<f64> = x.iter().zip(&gradient).map(|(p, g)| p - step * g).collect();
                let (candidate_value, candidate_gradient) = objective.value_and_derivative(&candidate)?;
                if candidate_value <= value - 1e-4 * step * slope {
                    (x, value, gradient) = (candidate, candidate_value, candidate_gradient);
                    step *= 2.0;
                    break;
                }
                step *= 0.5;
                if step < 1e-12 {
                    return Ok(x);
                }
            }
            objective.end_iteration(&x, value);
        }
        Ok(x)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Rigidity Penalty Demo");
    println!("=====================\n");

    let device = Default::default();
    let size = [64usize, 64];
    let domain = ImageDomain::<2>::from_size(size);
    let center = Point::<2>::new(32.0, 32.0);

    // Rigid disc of radius 12.
    let rigid: Vec<f32> = (0..size[0] * size[1])
        .map(|i| {
            let p = Point::<2>::new((i / size[1]) as f64, (i % size[1]) as f64);
            if (p - center).norm() <= 12.0 {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    let rigid_image = Image::<Backend, 2>::from_host(rigid.clone(), &domain, &device)?;
    let coefficients = CoefficientMap::new(domain.clone(), rigid)?;

    // Landmarks on two rings: the inner ring is rotated by 10 degrees, the
    // outer ring is pushed outward.
    let angle = 10f64.to_radians();
    let mut fixed = Vec::new();
    let mut moving = Vec::new();
    for k in 0..12 {
        let theta = k as f64 * std::f64::consts::TAU / 12.0;
        let inner = center + 8.0 * nalgebra::Vector2::new(theta.cos(), theta.sin());
        let rotated = center + 8.0 * nalgebra::Vector2::new((theta + angle).cos(), (theta + angle).sin());
        fixed.push(inner);
        moving.push(rotated);

        let outer = center + 24.0 * nalgebra::Vector2::new(theta.cos(), theta.sin());
        fixed.push(outer);
        moving.push(center + 27.0 * nalgebra::Vector2::new(theta.cos(), theta.sin()));
    }
    println!("Landmarks: {} pairs", fixed.len());

    let config = ParameterMap::from_toml_str(CONFIG)?;
    let history = HistoryDiagnostics::new();
    let orchestrator = MaskPyramidOrchestrator::new()
        .with_fixed_pyramid(Box::new(MultiResolutionPyramid::with_default_schedule(&rigid_image, 3)?));

    let metric = CorrespondingPointsDistanceMetric::new(fixed, moving, Arc::new(TranslationTransform::<2>::new()))?;
    let rigidity = RigidityPenaltyTerm::new().with_fixed_coefficients(coefficients);

    let mut registration = MultiResolutionRegistration::<Backend, 2>::new(config, domain)
        .with_orchestrator(orchestrator)
        .with_component(1.0, Box::new(metric))
        .with_component(0.5, Box::new(rigidity))
        .with_diagnostics(Box::new(history.clone()));

    let result = registration.run(&mut GradientDescent { iterations: 100 })?;

    println!("\nPer-level results:");
    for (level, value) in result.level_values.iter().enumerate() {
        let iterations = history.level_history(level);
        let last = iterations.last();
        println!(
            "  level {}: cost {:.6}, {} iterations, OC {:.3e}, PC {:.3e}, LC {:.3e}",
            level,
            value,
            iterations.len(),
            last.and_then(|d| d.metric("rigidity.orthonormality")).unwrap_or(0.0),
            last.and_then(|d| d.metric("rigidity.properness")).unwrap_or(0.0),
            last.and_then(|d| d.metric("rigidity.linearity")).unwrap_or(0.0),
        );
    }
    println!("\nFinal grid: {:?}", result.transform.grid().size());
    Ok(())
}

//! Closed-loop DeePC regulation of a scalar integrator.
//!
//! Collects one randomly excited offline experiment, formulates the chosen
//! design, then regulates the output from a perturbed start back to the
//! set-point while rolling the history buffers.
//!
//! Usage:
//!   cargo run -p deepc-demos --bin integrator_tracking -- --mode standard --steps 40
//!   cargo run -p deepc-demos --bin integrator_tracking -- --mode robust --uloss du --u-bound 0.2

use clap::Parser;
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use deepc_control::DeepcController;
use deepc_core::dims::ProblemDimensions;
use deepc_core::types::{
    ConstrainedVariable, ConstraintSpec, ControlLoss, DesignMode, ReferenceSignals, SolverOptions,
    TrajectoryData, WeightMatrices,
};

#[derive(Parser)]
#[command(about = "Closed-loop DeePC regulation of a scalar integrator")]
struct Args {
    /// Design mode: standard, robust
    #[arg(long, default_value = "standard")]
    mode: String,

    /// Control loss: u, uus, du
    #[arg(long, default_value = "u")]
    uloss: String,

    /// Closed-loop steps
    #[arg(long, default_value_t = 40)]
    steps: u32,

    /// Offline experiment length T
    #[arg(long, default_value_t = 40)]
    t: usize,

    /// History length Tini
    #[arg(long, default_value_t = 4)]
    tini: usize,

    /// Prediction horizon Np
    #[arg(long, default_value_t = 8)]
    np: usize,

    /// Initial output perturbation
    #[arg(long, default_value_t = 1.0)]
    y0: f64,

    /// Offline excitation seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output tracking weight
    #[arg(long, default_value_t = 50.0)]
    q: f64,

    /// Control effort weight
    #[arg(long, default_value_t = 0.1)]
    r: f64,

    /// Symmetric input bound (omit for unconstrained)
    #[arg(long)]
    u_bound: Option<f64>,

    /// Decision-vector regularization (robust mode)
    #[arg(long, default_value_t = 1e-3)]
    lambda_g: f64,

    /// Output-slack penalty (robust mode)
    #[arg(long, default_value_t = 1e4)]
    lambda_y: f64,
}

fn parse_mode(s: &str) -> DesignMode {
    match s.to_lowercase().as_str() {
        "standard" => DesignMode::Standard,
        "robust" => DesignMode::Robust,
        _ => {
            eprintln!("Unknown mode '{s}', using standard");
            DesignMode::Standard
        }
    }
}

fn parse_uloss(s: &str) -> ControlLoss {
    match s.to_lowercase().as_str() {
        "u" => ControlLoss::U,
        "uus" => ControlLoss::Uus,
        "du" => ControlLoss::Du,
        _ => {
            eprintln!("Unknown uloss '{s}', using u");
            ControlLoss::U
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let mode = parse_mode(&args.mode);
    let uloss = parse_uloss(&args.uloss);

    println!("=== DeePC Integrator Demo ===");
    println!("  Design: {} / {}", mode.name(), uloss.name());
    println!("  T={} Tini={} Np={}", args.t, args.tini, args.np);
    println!("  y0={:.2} steps={}", args.y0, args.steps);
    if let Some(b) = args.u_bound {
        println!("  |u| <= {b}");
    }
    println!();

    // --- Offline experiment: integrator driven by uniform random inputs ---
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let mut ud = DMatrix::zeros(args.t, 1);
    let mut yd = DMatrix::zeros(args.t, 1);
    for i in 0..args.t {
        ud[(i, 0)] = rng.gen_range(-1.0..1.0);
        if i + 1 < args.t {
            yd[(i + 1, 0)] = yd[(i, 0)] + ud[(i, 0)];
        }
    }
    let trajectory = TrajectoryData::new(ud, yd).expect("consistent experiment lengths");

    // --- Problem description ---
    let dims = ProblemDimensions::new(1, 1, args.t, args.tini, args.np)
        .expect("valid demo dimensions");
    let weights = WeightMatrices::diagonal(&dims, &[args.q], &[args.r])
        .expect("one weight per component")
        .with_regularization(
            DMatrix::identity(dims.g_dim(), dims.g_dim()) * args.lambda_g,
            DMatrix::identity(dims.past_output_rows(), dims.past_output_rows()) * args.lambda_y,
        );
    let references = ReferenceSignals::new(
        Some(DVector::zeros(1)),
        DVector::zeros(1),
        dims.np(),
    );
    let constraints = match args.u_bound {
        Some(b) => ConstraintSpec::none().bound(
            ConstrainedVariable::Input,
            vec![0],
            vec![-b],
            vec![b],
        ),
        None => ConstraintSpec::none(),
    };

    let mut controller =
        DeepcController::new(dims, &trajectory, weights, references, constraints)
            .expect("controller construction");
    if !controller.excitation().is_satisfied() {
        println!(
            "WARNING: offline data is not persistently exciting (rank {} of {})",
            controller.excitation().input_hankel_rank,
            controller.excitation().required
        );
    }

    controller
        .formulate(mode, uloss, &SolverOptions::default())
        .expect("formulation");

    // --- Closed loop ---
    // The plant held y0 under zero input, so constant history is consistent.
    let mut uini = DVector::zeros(dims.past_input_rows());
    let mut yini = DVector::from_element(dims.past_output_rows(), args.y0);
    let mut y = args.y0;

    let mut total_solve_us: u64 = 0;
    let mut failures = 0u32;
    let mut max_abs_u = 0.0_f64;

    for step in 0..args.steps {
        let solution = controller
            .step(&uini, &yini)
            .expect("solve step");
        if !solution.converged {
            failures += 1;
        }
        total_solve_us += solution.solve_time_us;

        let u = solution.u_opt[0];
        max_abs_u = max_abs_u.max(u.abs());
        y += u;

        let n = uini.len();
        for i in 0..n - 1 {
            uini[i] = uini[i + 1];
        }
        uini[n - 1] = u;
        let n = yini.len();
        for i in 0..n - 1 {
            yini[i] = yini[i + 1];
        }
        yini[n - 1] = y;

        if step % 5 == 0 {
            println!(
                "  step {step:3}: y={y:+.4}  u={u:+.4}  solve={:>4}us  {}",
                solution.solve_time_us,
                if solution.converged { "OK" } else { "FAIL" },
            );
        }
    }

    // --- Final report ---
    let avg_solve = total_solve_us / u64::from(args.steps.max(1));
    println!("\n{}", "=".repeat(50));
    println!("RESULTS");
    println!("{}", "=".repeat(50));
    println!("  Final |y|:     {:.6}", y.abs());
    println!("  Max |u|:       {max_abs_u:.4}");
    println!("  Avg solve:     {avg_solve} us");
    println!("  Failures:      {failures}/{}", args.steps);
    println!("{}", "=".repeat(50));

    if y.abs() > 0.05 {
        println!("\nWARNING: output did not settle (|y|={:.4})", y.abs());
    }
}

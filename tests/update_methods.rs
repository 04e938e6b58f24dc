//! Update methods driven through their public configuration.

use ndarray::array;
use rustydnn::arrays::{DenseArray, Gradient, NormType, ParamsArray, SparseArray};
use rustydnn::error::DnnError;
use rustydnn::optimizers::{
    AdamMethod, DecayMethod, GradientClipping, LearningRateMethod, NesterovMomentumMethod, ParamsOptimizer,
    ParamsRegularization, RAdamMethod, UpdateMethod, UpdateMethodConfig, UpdateMethodKind,
};

fn all_methods() -> Vec<UpdateMethodKind> {
    vec![
        UpdateMethodKind::LearningRate {
            learning_rate: 0.1,
            decay: None,
        },
        UpdateMethodKind::AdaGrad {
            learning_rate: 0.1,
            epsilon: 1e-8,
        },
        UpdateMethodKind::Adam {
            learning_rate: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        },
        UpdateMethodKind::RAdam {
            learning_rate: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        },
        UpdateMethodKind::Momentum {
            learning_rate: 0.1,
            momentum: 0.9,
        },
        UpdateMethodKind::NesterovMomentum {
            learning_rate: 0.1,
            momentum: 0.9,
        },
    ]
}

fn run_steps(method: &mut dyn UpdateMethod, params: &mut ParamsArray, gradients: &[Gradient]) {
    for g in gradients {
        method.new_batch();
        method.update(params, g).unwrap();
    }
}

#[test]
fn test_methods_are_deterministic() {
    let gradients = vec![
        Gradient::Dense(array![[0.5, -1.0], [0.2, 0.0]]),
        Gradient::Dense(array![[0.1, 0.3], [-0.7, 2.0]]),
        Gradient::Dense(array![[-0.4, 0.0], [0.0, 1.0]]),
    ];
    for kind in all_methods() {
        let config = UpdateMethodConfig::new(kind);
        let mut a = ParamsArray::from_values(array![[1.0, 2.0], [3.0, 4.0]]);
        let mut b = ParamsArray::from_values(array![[1.0, 2.0], [3.0, 4.0]]);
        run_steps(config.build().unwrap().as_mut(), &mut a, &gradients);
        run_steps(config.build().unwrap().as_mut(), &mut b, &gradients);
        assert_eq!(a.values, b.values, "{:?}", config.kind);
        assert_eq!(a.support(), b.support(), "{:?}", config.kind);
        assert_ne!(a.values, array![[1.0, 2.0], [3.0, 4.0]], "{:?}", config.kind);
    }
}

#[test]
fn test_sparse_updates_touch_only_active_entries() {
    let sparse = SparseArray::from_entries((2, 3), vec![((0, 1), 0.5), ((1, 2), -2.0)]).unwrap();
    for kind in all_methods() {
        let config = UpdateMethodConfig::new(kind);
        let initial = array![[1.0, 1.0, 1.0], [1.0, 1.0, 1.0]];

        let mut dense_params = ParamsArray::from_values(initial.clone());
        let mut dense_method = config.build().unwrap();
        run_steps(dense_method.as_mut(), &mut dense_params, &[Gradient::Dense(sparse.to_dense())]);

        let mut sparse_params = ParamsArray::from_values(initial.clone());
        let mut sparse_method = config.build().unwrap();
        run_steps(sparse_method.as_mut(), &mut sparse_params, &[Gradient::Sparse(sparse.clone())]);

        for ((r, c), &v) in sparse_params.values.indexed_iter() {
            if sparse.get(r, c) == 0.0 {
                assert_eq!(v, 1.0, "{:?} touched ({}, {})", config.kind, r, c);
            } else {
                assert!((v - dense_params.values[[r, c]]).abs() < 1e-12, "{:?}", config.kind);
            }
        }
    }
}

#[test]
fn test_adam_two_steps() {
    let mut method = AdamMethod::new(0.1, 0.9, 0.999, 1e-8).unwrap();
    let mut params = ParamsArray::from_values(array![[0.0]]);
    run_steps(
        &mut method,
        &mut params,
        &[Gradient::Dense(array![[1.0]]), Gradient::Dense(array![[2.0]])],
    );
    assert_eq!(method.timestep(), 2);

    // m, v after two steps and the bias corrected step size at t = 2
    let (m1, v1) = (0.1, 0.001);
    let (m2, v2): (f64, f64) = (0.9 * m1 + 0.1 * 2.0, 0.999 * v1 + 0.001 * 4.0);
    let alpha1 = 0.1 * (1.0f64 - 0.999).sqrt() / (1.0 - 0.9);
    let alpha2 = 0.1 * (1.0f64 - 0.999f64.powi(2)).sqrt() / (1.0 - 0.9f64.powi(2));
    let expected = -alpha1 * m1 / (v1.sqrt() + 1e-8) - alpha2 * m2 / (v2.sqrt() + 1e-8);
    assert!((params.values[[0, 0]] - expected).abs() < 1e-12);
}

#[test]
fn test_radam_starts_with_momentum_steps() {
    let mut method = RAdamMethod::new(0.1, 0.9, 0.999, 1e-8).unwrap();
    let mut params = ParamsArray::from_values(array![[0.0, 0.0]]);
    run_steps(&mut method, &mut params, &[Gradient::Dense(array![[1.0, -3.0]])]);
    // ρ_1 = 1: the step is lr · m̂ = lr · g
    assert!((params.values[[0, 0]] + 0.1).abs() < 1e-12);
    assert!((params.values[[0, 1]] - 0.3).abs() < 1e-12);
}

#[test]
fn test_nesterov_formula() {
    let method = NesterovMomentumMethod::new(0.1, 0.5).unwrap();
    let mut params = ParamsArray::from_values(array![[0.0]]);
    method.update(&mut params, &Gradient::Dense(array![[1.0]])).unwrap();
    // v = 0.1, delta = 1.5 · 0.1
    assert!((params.values[[0, 0]] + 0.15).abs() < 1e-12);
    method.update(&mut params, &Gradient::Dense(array![[1.0]])).unwrap();
    // v_prev = 0.1, v = 0.15, delta = 1.5 · 0.15 - 0.5 · 0.1
    assert!((params.values[[0, 0]] + 0.15 + 0.175).abs() < 1e-12);
}

#[test]
fn test_learning_rate_decay_per_epoch() {
    let mut method = LearningRateMethod::new(1.0)
        .unwrap()
        .with_decay(DecayMethod::Hyperbolic { rate: 1.0, min: 0.1 })
        .unwrap();
    method.new_epoch();
    assert_eq!(method.learning_rate(), 0.5);
    let mut params = ParamsArray::from_values(array![[0.0]]);
    method.update(&mut params, &Gradient::Dense(array![[1.0]])).unwrap();
    assert_eq!(params.values[[0, 0]], -0.5);
}

#[test]
fn test_clipping_and_regularization_from_json() {
    let json = r#"{
        "method": "LearningRate",
        "learning_rate": 1.0,
        "regularization": { "L2": { "lambda": 0.5 } },
        "gradient_clipping": { "Norm": { "max_norm": 1.0, "norm_type": "L2" } }
    }"#;
    let config = UpdateMethodConfig::from_json(json).unwrap();
    assert_eq!(
        config.gradient_clipping,
        Some(GradientClipping::Norm {
            max_norm: 1.0,
            norm_type: NormType::L2
        })
    );
    assert_eq!(config.regularization, Some(ParamsRegularization::L2 { lambda: 0.5 }));

    let method = config.build().unwrap();
    let mut params = ParamsArray::from_values(array![[2.0, 2.0]]);
    method.update(&mut params, &Gradient::Dense(array![[3.0, 4.0]])).unwrap();
    // w = 2 - 0.5 · 2 = 1, then g clipped to [0.6, 0.8]
    assert!((params.values[[0, 0]] - 0.4).abs() < 1e-12);
    assert!((params.values[[0, 1]] - 0.2).abs() < 1e-12);
}

#[test]
fn test_invalid_hyperparameters() {
    for kind in [
        UpdateMethodKind::Adam {
            learning_rate: 0.1,
            beta1: 1.0,
            beta2: 0.999,
            epsilon: 1e-8,
        },
        UpdateMethodKind::AdaGrad {
            learning_rate: 0.1,
            epsilon: 0.0,
        },
        UpdateMethodKind::Momentum {
            learning_rate: -1.0,
            momentum: 0.9,
        },
    ] {
        assert!(UpdateMethodConfig::new(kind).build().is_err());
    }
}

#[test]
fn test_invalid_settings_are_rejected_at_build() {
    let base = r#""method": "LearningRate", "learning_rate": 0.1"#;
    for extra in [
        r#""gradient_clipping": { "Value": { "clip": -1.0 } }"#,
        r#""gradient_clipping": { "Norm": { "max_norm": 0.0, "norm_type": "L2" } }"#,
        r#""regularization": { "L2": { "lambda": -0.5 } }"#,
        r#""regularization": { "MaxNorm": { "max_norm": -1.0 } }"#,
        r#""decay": { "Hyperbolic": { "rate": -1.0, "min": 0.0 } }"#,
    ] {
        let json = format!("{{ {}, {} }}", base, extra);
        let config = UpdateMethodConfig::from_json(&json).unwrap();
        assert!(
            matches!(config.build(), Err(DnnError::InvalidHyperParameter { .. })),
            "{}",
            json
        );
    }
}

#[test]
fn test_sparse_update_with_regularization_keeps_inactive_entries() {
    let config = UpdateMethodConfig::new(UpdateMethodKind::LearningRate {
        learning_rate: 0.1,
        decay: None,
    })
    .with_regularization(ParamsRegularization::L2 { lambda: 0.5 });
    let method = config.build().unwrap();

    let mut params = ParamsArray::from_values(DenseArray::ones((2, 2)));
    let gradient = SparseArray::from_entries((2, 2), vec![((0, 0), 1.0)]).unwrap();
    method.update(&mut params, &Gradient::Sparse(gradient)).unwrap();

    // w = 1 - 0.5 · 1, then 0.5 - 0.1 · 1
    assert!((params.values[[0, 0]] - 0.4).abs() < 1e-12);
    assert_eq!(params.values[[0, 1]], 1.0);
    assert_eq!(params.values[[1, 0]], 1.0);
    assert_eq!(params.values[[1, 1]], 1.0);
}

#[test]
fn test_optimizer_averages_accumulated_errors() {
    let mut w = ParamsArray::from_values(DenseArray::zeros((1, 2)));
    let mut untouched = ParamsArray::from_values(DenseArray::ones((1, 1)));
    let mut optimizer = ParamsOptimizer::new(Box::new(LearningRateMethod::new(1.0).unwrap()));

    for g in [array![[1.0, 0.0]], array![[3.0, 2.0]]] {
        let mut errors = rustydnn::arrays::ParamsErrors::new();
        errors.push_dense(&w, g);
        optimizer.accumulate(errors).unwrap();
    }
    optimizer.update(vec![&mut w, &mut untouched]).unwrap();

    assert_eq!(w.values, array![[-2.0, -1.0]]);
    assert_eq!(untouched.values, array![[1.0]]);
    assert!(optimizer.accumulator().is_empty());
}

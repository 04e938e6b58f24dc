//! Training loops over the processors.

use rustydnn::arrays::{column, DenseArray};
use rustydnn::functions::ActivationFunction;
use rustydnn::initializers::{GlorotInitializer, RandomInitializer};
use rustydnn::layers::{AttentionParameters, LayerInput, LayerInterface, LayerType, StackedLayersParameters};
use rustydnn::losses::{LossCalculator, MseCalculator};
use rustydnn::optimizers::{AdamMethod, ParamsOptimizer, UpdateMethodConfig, UpdateMethodKind};
use rustydnn::processors::{
    AttentionModel, AttentionProcessor, BatchFeedforwardProcessor, BiRnnEncoder, BiRnnMergeMode, BiRnnModel,
    FeedforwardNeuralProcessor, RecurrentNeuralProcessor,
};

fn xor() -> Vec<(DenseArray, DenseArray)> {
    [(0.0, 0.0, 0.0), (0.0, 1.0, 1.0), (1.0, 0.0, 1.0), (1.0, 1.0, 0.0)]
        .iter()
        .map(|&(a, b, y)| (column(&[a, b]), column(&[y])))
        .collect()
}

fn xor_model(hidden: usize, seed: u64) -> StackedLayersParameters {
    let init = GlorotInitializer::new(seed);
    StackedLayersParameters::new(
        vec![
            LayerInterface::new(2),
            LayerInterface::new(hidden).with_activation(ActivationFunction::Tanh),
            LayerInterface::new(1).with_activation(ActivationFunction::Sigmoid),
        ],
        Some(&init),
        None,
    )
    .unwrap()
}

fn xor_loss(model: &StackedLayersParameters) -> f64 {
    let mut processor = FeedforwardNeuralProcessor::new(model, false, false).unwrap();
    xor()
        .iter()
        .map(|(x, gold)| {
            let y = processor.forward(model, x.clone().into()).unwrap();
            MseCalculator.total_loss(&y, gold).unwrap()
        })
        .sum()
}

/// Full-batch training on XOR, one update per epoch.
fn train_xor(model: &mut StackedLayersParameters, optimizer: &mut ParamsOptimizer, epochs: usize) {
    let mut processor = FeedforwardNeuralProcessor::new(model, false, false).unwrap();
    for _ in 0..epochs {
        optimizer.new_epoch();
        optimizer.new_batch();
        for (x, gold) in xor() {
            optimizer.new_example();
            let y = processor.forward(model, x.into()).unwrap();
            processor
                .backward(model, MseCalculator.errors(&y, &gold).unwrap())
                .unwrap();
            optimizer.accumulate(processor.params_errors().unwrap().clone()).unwrap();
        }
        optimizer.update(model.params_mut()).unwrap();
    }
}

#[test]
fn test_xor_converges() {
    let mut model = xor_model(8, 42);
    let mut optimizer = ParamsOptimizer::new(Box::new(AdamMethod::new(0.05, 0.9, 0.999, 1e-8).unwrap()));
    train_xor(&mut model, &mut optimizer, 1500);

    let mut processor = FeedforwardNeuralProcessor::new(&model, false, false).unwrap();
    for (x, gold) in xor() {
        let y = processor.forward(&model, x.clone().into()).unwrap();
        assert!(
            (y[[0, 0]] - gold[[0, 0]]).abs() < 0.3,
            "{:?} -> {} (expected {})",
            x,
            y[[0, 0]],
            gold[[0, 0]]
        );
    }
}

#[test]
fn test_every_method_reduces_the_loss() {
    let kinds = [
        UpdateMethodKind::LearningRate {
            learning_rate: 0.5,
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
    ];
    for kind in kinds {
        let mut model = xor_model(4, 7);
        let initial = xor_loss(&model);
        let config = UpdateMethodConfig::new(kind);
        let mut optimizer = ParamsOptimizer::new(config.build().unwrap());
        train_xor(&mut model, &mut optimizer, 100);
        let trained = xor_loss(&model);
        assert!(trained < initial, "{:?}: {} -> {}", config.kind, initial, trained);
    }
}

#[test]
fn test_batch_processor_matches_single_examples() {
    let model = xor_model(3, 1);
    let examples = xor();

    let mut batch = BatchFeedforwardProcessor::new(false, false);
    let inputs: Vec<LayerInput> = examples.iter().map(|(x, _)| x.clone().into()).collect();
    let ys = batch.forward(&model, inputs).unwrap();
    let errors: Vec<DenseArray> = ys
        .iter()
        .zip(&examples)
        .map(|(y, (_, gold))| MseCalculator.errors(y, gold).unwrap())
        .collect();
    batch.backward(&model, errors.clone()).unwrap();

    let mut optimizer = ParamsOptimizer::new(Box::new(AdamMethod::default()));
    let mut processor = FeedforwardNeuralProcessor::new(&model, false, false).unwrap();
    for ((x, _), gy) in examples.iter().zip(errors) {
        processor.forward(&model, x.clone().into()).unwrap();
        processor.backward(&model, gy).unwrap();
        optimizer.accumulate(processor.params_errors().unwrap().clone()).unwrap();
    }

    let mut averaged = optimizer.accumulator().clone();
    averaged.average();
    for params in model.params() {
        let expected = averaged.get(params).unwrap().to_dense();
        let actual = batch.params_errors().unwrap().get(params).unwrap().to_dense();
        assert!((expected - actual).iter().all(|d| d.abs() < 1e-12));
    }
}

#[test]
fn test_dropout_is_reproducible_with_a_seed() {
    let init = RandomInitializer::new(0.5, 3);
    let model = StackedLayersParameters::new(
        vec![
            LayerInterface::new(6),
            LayerInterface::new(6)
                .with_activation(ActivationFunction::Tanh)
                .with_dropout(0.5),
            LayerInterface::new(2).with_dropout(0.5),
        ],
        Some(&init),
        Some(&init),
    )
    .unwrap();
    let x: LayerInput = DenseArray::ones((6, 1)).into();

    let run = |seed: u64, use_dropout: bool| {
        let mut processor = FeedforwardNeuralProcessor::new(&model, use_dropout, false)
            .unwrap()
            .with_seed(seed);
        (0..5)
            .map(|_| processor.forward(&model, x.clone()).unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(11, true), run(11, true));
    assert_ne!(run(11, true), run(11, false));
    // без dropout все проходы одинаковы
    let plain = run(0, false);
    assert!(plain.iter().all(|y| y == &plain[0]));
}

/// Sequences of ±1 scalars; the target is the sign of the first element.
fn memory_task() -> Vec<(Vec<DenseArray>, DenseArray)> {
    [[1.0, -1.0, -1.0], [-1.0, 1.0, 1.0], [1.0, 1.0, -1.0], [-1.0, -1.0, 1.0]]
        .iter()
        .map(|seq| {
            let xs = seq.iter().map(|&v| column(&[v])).collect();
            let gold = column(&[if seq[0] > 0.0 { 1.0 } else { 0.0 }]);
            (xs, gold)
        })
        .collect()
}

#[test]
fn test_recurrent_network_learns_to_remember() {
    let init = RandomInitializer::new(0.5, 5);
    let mut model = StackedLayersParameters::new(
        vec![
            LayerInterface::new(1),
            LayerInterface::new(4)
                .with_connection(LayerType::GRU)
                .with_activation(ActivationFunction::Tanh),
            LayerInterface::new(1).with_activation(ActivationFunction::Sigmoid),
        ],
        Some(&init),
        None,
    )
    .unwrap();
    let mut processor = RecurrentNeuralProcessor::new(&model, false).unwrap();
    let mut optimizer = ParamsOptimizer::new(Box::new(AdamMethod::new(0.05, 0.9, 0.999, 1e-8).unwrap()));

    let loss_of = |model: &StackedLayersParameters, processor: &mut RecurrentNeuralProcessor| -> f64 {
        memory_task()
            .into_iter()
            .map(|(xs, gold)| {
                let ys = processor.forward(model, xs).unwrap();
                MseCalculator.total_loss(ys.last().unwrap(), &gold).unwrap()
            })
            .sum()
    };
    let initial = loss_of(&model, &mut processor);

    for _ in 0..200 {
        optimizer.new_batch();
        for (xs, gold) in memory_task() {
            let ys = processor.forward(&model, xs).unwrap();
            let last = ys.len() - 1;
            // ошибка только на последнем шаге
            let errors = ys
                .iter()
                .enumerate()
                .map(|(t, y)| {
                    if t == last {
                        MseCalculator.errors(y, &gold).unwrap()
                    } else {
                        DenseArray::zeros(y.dim())
                    }
                })
                .collect();
            processor.backward(&model, errors).unwrap();
            optimizer.accumulate(processor.params_errors().unwrap().clone()).unwrap();
        }
        optimizer.update(model.params_mut()).unwrap();
    }

    let trained = loss_of(&model, &mut processor);
    assert!(trained < initial * 0.7, "{} -> {}", initial, trained);
}

#[test]
fn test_birnn_encoder_trains() {
    let direction = |seed: u64| {
        let init = RandomInitializer::new(0.5, seed);
        StackedLayersParameters::new(
            vec![
                LayerInterface::new(1),
                LayerInterface::new(3)
                    .with_connection(LayerType::SimpleRecurrent)
                    .with_activation(ActivationFunction::Tanh),
            ],
            Some(&init),
            None,
        )
        .unwrap()
    };
    let mut model = BiRnnModel::new(direction(1), direction(2), BiRnnMergeMode::Sum).unwrap();
    let mut encoder = BiRnnEncoder::new(&model, true).unwrap();
    let mut optimizer = ParamsOptimizer::new(Box::new(AdamMethod::new(0.02, 0.9, 0.999, 1e-8).unwrap()));

    // каждый шаг кодирования должен воспроизвести вход в первой компоненте
    let xs = vec![column(&[0.5]), column(&[-0.5]), column(&[0.25])];
    let loss = |ys: &[DenseArray]| -> f64 { ys.iter().zip(&xs).map(|(y, x)| 0.5 * (y[[0, 0]] - x[[0, 0]]).powi(2)).sum() };

    let initial = loss(&encoder.forward(&model, xs.clone()).unwrap());
    for _ in 0..150 {
        optimizer.new_batch();
        let ys = encoder.forward(&model, xs.clone()).unwrap();
        let errors = ys
            .iter()
            .zip(&xs)
            .map(|(y, x)| {
                let mut g = DenseArray::zeros(y.dim());
                g[[0, 0]] = y[[0, 0]] - x[[0, 0]];
                g
            })
            .collect();
        encoder.backward(&model, errors).unwrap();
        assert_eq!(encoder.input_errors().unwrap().len(), xs.len());
        optimizer.accumulate(encoder.params_errors().unwrap().clone()).unwrap();
        optimizer.update(model.params_mut()).unwrap();
    }
    let trained = loss(&encoder.forward(&model, xs.clone()).unwrap());
    assert!(trained < initial, "{} -> {}", initial, trained);
}

#[test]
fn test_attention_learns_to_select_a_step() {
    let init = RandomInitializer::new(0.3, 9);
    let mut model = AttentionModel::Pooling(AttentionParameters::new(2, 3, Some(&init), None));
    let mut processor = AttentionProcessor::new(&model, false);
    let mut optimizer = ParamsOptimizer::new(Box::new(AdamMethod::new(0.05, 0.9, 0.999, 1e-8).unwrap()));

    // целевой вектор совпадает с шагом, первая компонента которого положительна
    let xs = vec![column(&[-1.0, 0.2]), column(&[1.0, 0.8]), column(&[-1.0, -0.4])];
    let gold = column(&[1.0, 0.8]);

    let initial = MseCalculator
        .total_loss(&processor.forward(&model, xs.clone()).unwrap()[0], &gold)
        .unwrap();
    for _ in 0..200 {
        optimizer.new_batch();
        let y = processor.forward(&model, xs.clone()).unwrap().remove(0);
        processor
            .backward(&model, vec![MseCalculator.errors(&y, &gold).unwrap()])
            .unwrap();
        optimizer.accumulate(processor.params_errors().unwrap().clone()).unwrap();
        optimizer.update(model.params_mut()).unwrap();
    }
    let trained = MseCalculator
        .total_loss(&processor.forward(&model, xs.clone()).unwrap()[0], &gold)
        .unwrap();
    assert!(trained < initial * 0.5, "{} -> {}", initial, trained);
    assert!(processor.scores()[[1, 0]] > 0.5);
}

//! Демонстрация: обучение небольшой сети на XOR.

use clap::{Parser, ValueEnum};
use rustydnn::arrays::{column, DenseArray};
use rustydnn::functions::ActivationFunction;
use rustydnn::initializers::GlorotInitializer;
use rustydnn::layers::{LayerInterface, StackedLayersParameters};
use rustydnn::losses::{LossCalculator, MseCalculator};
use rustydnn::optimizers::{ParamsOptimizer, UpdateMethodConfig, UpdateMethodKind};
use rustydnn::processors::FeedforwardNeuralProcessor;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Method {
    LearningRate,
    #[value(name = "adagrad")]
    AdaGrad,
    Adam,
    #[value(name = "radam")]
    RAdam,
    Momentum,
    Nesterov,
}

impl Method {
    fn config(self, learning_rate: Option<f64>) -> UpdateMethodConfig {
        let kind = match self {
            Method::LearningRate => UpdateMethodKind::LearningRate {
                learning_rate: learning_rate.unwrap_or(0.5),
                decay: None,
            },
            Method::AdaGrad => UpdateMethodKind::AdaGrad {
                learning_rate: learning_rate.unwrap_or(0.1),
                epsilon: 1e-8,
            },
            Method::Adam => UpdateMethodKind::Adam {
                learning_rate: learning_rate.unwrap_or(0.01),
                beta1: 0.9,
                beta2: 0.999,
                epsilon: 1e-8,
            },
            Method::RAdam => UpdateMethodKind::RAdam {
                learning_rate: learning_rate.unwrap_or(0.01),
                beta1: 0.9,
                beta2: 0.999,
                epsilon: 1e-8,
            },
            Method::Momentum => UpdateMethodKind::Momentum {
                learning_rate: learning_rate.unwrap_or(0.1),
                momentum: 0.9,
            },
            Method::Nesterov => UpdateMethodKind::NesterovMomentum {
                learning_rate: learning_rate.unwrap_or(0.1),
                momentum: 0.9,
            },
        };
        UpdateMethodConfig::new(kind)
    }
}

/// Аргументы командной строки
#[derive(Parser, Debug)]
#[command(author, version, about = "rustydnn: XOR training demo", long_about = None)]
struct Args {
    /// Метод обновления параметров
    #[arg(long, value_enum, default_value = "adam")]
    method: Method,
    /// JSON с конфигурацией метода обновления (вместо --method)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    learning_rate: Option<f64>,
    #[arg(long, default_value = "500")]
    epochs: usize,
    #[arg(long, default_value = "4")]
    hidden_size: usize,
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // ---------- 1. Конфигурация ----------
    let config = match &args.config {
        Some(path) => UpdateMethodConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => args.method.config(args.learning_rate),
    };
    info!(config = %config.to_json()?, "update method");

    // ---------- 2. Модель ----------
    let init = GlorotInitializer::new(args.seed);
    let mut model = StackedLayersParameters::new(
        vec![
            LayerInterface::new(2),
            LayerInterface::new(args.hidden_size).with_activation(ActivationFunction::Tanh),
            LayerInterface::new(1).with_activation(ActivationFunction::Sigmoid),
        ],
        Some(&init),
        None,
    )?;
    let mut optimizer = ParamsOptimizer::new(config.build()?);
    let mut processor = FeedforwardNeuralProcessor::new(&model, false, false)?;

    let examples: Vec<(DenseArray, DenseArray)> = [(0.0, 0.0, 0.0), (0.0, 1.0, 1.0), (1.0, 0.0, 1.0), (1.0, 1.0, 0.0)]
        .iter()
        .map(|&(a, b, y)| (column(&[a, b]), column(&[y])))
        .collect();

    // ---------- 3. Обучение: один батч из четырёх примеров на эпоху ----------
    for epoch in 0..args.epochs {
        optimizer.new_epoch();
        optimizer.new_batch();
        let mut loss = 0.0;
        for (x, gold) in &examples {
            optimizer.new_example();
            let y = processor.forward(&model, x.clone().into())?;
            loss += MseCalculator.total_loss(&y, gold)?;
            processor.backward(&model, MseCalculator.errors(&y, gold)?)?;
            optimizer.accumulate(processor.params_errors()?.clone())?;
        }
        optimizer.update(model.params_mut())?;

        if epoch % 100 == 0 || epoch + 1 == args.epochs {
            info!(epoch, loss, "training");
        } else {
            debug!(epoch, loss, "training");
        }
    }

    // ---------- 4. Результат ----------
    for (x, gold) in &examples {
        let y = processor.forward(&model, x.clone().into())?;
        println!(
            "{:?} -> {:.4} (ожидалось {})",
            x.column(0).to_vec(),
            y[[0, 0]],
            gold[[0, 0]]
        );
    }
    Ok(())
}

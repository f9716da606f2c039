//! End-to-end runs over the reference models and synthetic streams.

use supervised_trainer_rs::checkpoint::{strip_module_prefix, Checkpoint};
use supervised_trainer_rs::checkpoint::CheckpointManager;
use supervised_trainer_rs::data::{DatasetKind, SyntheticStream};
use supervised_trainer_rs::models::{LinearProbeNet, MlpEncoder, SgdOptimizer, SupCeNet};
use supervised_trainer_rs::prelude::*;

const INPUT_DIM: usize = 8;
const HIDDEN_DIM: usize = 16;
const FEATURE_DIM: usize = 8;

fn small_config(epochs: usize, save_freq: usize) -> RunConfig {
    RunConfig::builder()
        .epochs(epochs)
        .batch_size(20)
        .learning_rate(0.1)
        .momentum(0.9)
        .save_freq(save_freq)
        .num_classes(10)
        .build()
        .unwrap()
}

fn streams(seed: u64) -> (SyntheticStream, SyntheticStream) {
    let train =
        SyntheticStream::new(DatasetKind::Mnist, INPUT_DIM, 100, 20, true, seed).unwrap();
    let val =
        SyntheticStream::new(DatasetKind::Mnist, INPUT_DIM, 40, 20, false, seed + 1).unwrap();
    (train, val)
}

#[test]
fn one_epoch_produces_one_record_and_updates_parameters() {
    let config = small_config(1, 10);
    let model = SupCeNet::new(INPUT_DIM, HIDDEN_DIM, FEATURE_DIM, 10, 3);
    let initial = Model::state_dict(&model);
    let optimizer = SgdOptimizer::from_config(&config);
    let (mut train, mut val) = streams(7);

    let mut session =
        TrainingSession::new(config, model, optimizer, ExecutionContext::default(), None)
            .unwrap();
    let summary = session.run(&mut train, &mut val).unwrap();

    assert_eq!(summary.epochs_completed, 1);
    assert_eq!(session.history().len(), 1);
    assert!(summary.last_checkpoint.is_none());

    let trained = Model::state_dict(session.model());
    assert_ne!(trained, initial, "training left every parameter untouched");
}

#[test]
fn best_accuracy_is_the_maximum_over_epochs() {
    let config = small_config(4, 10);
    let model = SupCeNet::new(INPUT_DIM, HIDDEN_DIM, FEATURE_DIM, 10, 3);
    let optimizer = SgdOptimizer::from_config(&config);
    let (mut train, mut val) = streams(11);

    let mut session =
        TrainingSession::new(config, model, optimizer, ExecutionContext::default(), None)
            .unwrap();
    let summary = session.run(&mut train, &mut val).unwrap();

    let max_val = session
        .history()
        .val_accuracy
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    assert!((summary.best_accuracy - max_val).abs() < 1e-12);
}

#[test]
fn checkpoints_follow_the_cadence_and_last_is_unconditional() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(3, 2);
    let model = SupCeNet::new(INPUT_DIM, HIDDEN_DIM, FEATURE_DIM, 10, 3);
    let optimizer = SgdOptimizer::from_config(&config);
    let manager = CheckpointManager::new(dir.path().join("save")).unwrap();
    let (mut train, mut val) = streams(5);

    let mut session = TrainingSession::new(
        config,
        model,
        optimizer,
        ExecutionContext::default(),
        Some(manager.clone()),
    )
    .unwrap();
    let summary = session.run(&mut train, &mut val).unwrap();

    // save_freq = 2 over 3 epochs: only epoch 2 gets a periodic checkpoint.
    assert!(!manager.epoch_path(1).exists());
    assert!(manager.epoch_path(2).exists());
    assert!(!manager.epoch_path(3).exists());
    assert_eq!(summary.last_checkpoint.as_deref(), Some(manager.last_path().as_path()));
    assert!(manager.last_path().exists());

    let restored = Checkpoint::load(manager.last_path()).unwrap();
    assert_eq!(restored.epoch, 3);
    assert_eq!(restored.model, Model::state_dict(session.model()));
}

#[test]
fn probe_restores_encoder_from_checkpoint_and_trains_the_head() {
    let dir = tempfile::tempdir().unwrap();

    // Pretrain and checkpoint.
    let config = small_config(2, 10);
    let model = SupCeNet::new(INPUT_DIM, HIDDEN_DIM, FEATURE_DIM, 10, 3);
    let optimizer = SgdOptimizer::from_config(&config);
    let manager = CheckpointManager::new(dir.path()).unwrap();
    let (mut train, mut val) = streams(9);
    let mut session = TrainingSession::new(
        config,
        model,
        optimizer,
        ExecutionContext::default(),
        Some(manager),
    )
    .unwrap();
    let summary = session.run(&mut train, &mut val).unwrap();
    let ckpt_path = summary.last_checkpoint.unwrap();

    // Restore the encoder and train a probe on it.
    let checkpoint = Checkpoint::load(&ckpt_path).unwrap();
    let state = strip_module_prefix(&checkpoint.model);
    let mut encoder = MlpEncoder::new(INPUT_DIM, HIDDEN_DIM, FEATURE_DIM, 0);
    encoder.load_state_dict(&state).unwrap();
    let frozen = encoder.state_dict();

    let probe_config = small_config(2, 10);
    let probe = LinearProbeNet::new(encoder, 10, 17);
    let probe_optimizer = SgdOptimizer::from_config(&probe_config);
    let (mut train, mut val) = streams(9);
    let mut probe_session = TrainingSession::new(
        probe_config,
        probe,
        probe_optimizer,
        ExecutionContext::default(),
        None,
    )
    .unwrap();
    let probe_summary = probe_session.run(&mut train, &mut val).unwrap();

    assert_eq!(probe_summary.epochs_completed, 2);
    // The frozen encoder half survives probe training bit for bit.
    for (name, values) in &frozen {
        assert_eq!(&state[name], values, "encoder parameter {name} drifted");
    }
}

#[test]
fn validate_only_watermark_is_monotone() {
    let config = small_config(1, 10);
    let model = SupCeNet::new(INPUT_DIM, HIDDEN_DIM, FEATURE_DIM, 10, 3);
    let optimizer = SgdOptimizer::from_config(&config);
    let (mut train, mut val) = streams(13);

    let mut session =
        TrainingSession::new(config, model, optimizer, ExecutionContext::default(), None)
            .unwrap();

    let mut watermark = 0.0f64;
    for _ in 0..3 {
        session.run_epoch(1, &mut train, &mut val).unwrap();
        session.validate_only(&mut val).unwrap();
        let best = session.best_accuracy();
        assert!(best >= watermark, "best accuracy regressed");
        watermark = best;
    }
}

//! Encoder resource manager lifecycle: admission, idle unload, memory
//! pressure and out-of-memory recovery.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{encoder_with, ScriptedLoader, ScriptedPressure, DIM};
use vaultsearch::domain::errors::EncoderError;
use vaultsearch::domain::ports::NoPressure;
use vaultsearch::services::EncoderState;

fn texts(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_admission_caps_concurrent_encodes() {
    let loader = ScriptedLoader::new(DIM).with_encode_delay(Duration::from_millis(60));
    let stats = loader.stats();
    let encoder = encoder_with(Arc::new(loader), Arc::new(NoPressure), Duration::from_secs(30));

    let mut handles = Vec::new();
    for i in 0..6 {
        let encoder = encoder.clone();
        handles.push(tokio::spawn(async move {
            encoder.embed(&[format!("document {i}")], true).await
        }));
    }
    for handle in handles {
        let vectors = handle.await.unwrap().unwrap();
        assert_eq!(vectors[0].len(), DIM);
    }

    assert_eq!(stats.encodes(), 6);
    assert!(stats.max_in_flight() <= 2, "in flight: {}", stats.max_in_flight());
    assert_eq!(encoder.available_encode_slots(), 2);
    assert_eq!(encoder.load_count(), 1);
}

#[tokio::test]
async fn test_idle_unload_then_reload() {
    let encoder = encoder_with(
        Arc::new(ScriptedLoader::new(DIM)),
        Arc::new(NoPressure),
        Duration::from_millis(100),
    );

    encoder.embed(&texts(&["first"]), true).await.unwrap();
    assert_eq!(encoder.state(), EncoderState::Ready);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(encoder.state(), EncoderState::Unloaded);
    assert_eq!(encoder.unload_count(), 1);

    let vectors = encoder.embed(&texts(&["second"]), true).await.unwrap();
    assert_eq!(vectors[0].len(), DIM);
    assert_eq!(encoder.load_count(), 2);
}

#[tokio::test]
async fn test_live_lease_prevents_unload() {
    let encoder = encoder_with(
        Arc::new(ScriptedLoader::new(DIM)),
        Arc::new(NoPressure),
        Duration::from_millis(100),
    );
    encoder.embed(&texts(&["warm"]), true).await.unwrap();

    let lease = encoder.acquire_lease().await.unwrap();
    assert_eq!(encoder.active_leases(), 1);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(encoder.state(), EncoderState::Ready);
    assert_eq!(lease.model().dimensions(), DIM);

    drop(lease);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(encoder.state(), EncoderState::Unloaded);
    assert_eq!(encoder.load_count(), 1);
}

#[tokio::test]
async fn test_repeated_use_resets_idle_timer() {
    let encoder = encoder_with(
        Arc::new(ScriptedLoader::new(DIM)),
        Arc::new(NoPressure),
        Duration::from_millis(250),
    );

    for _ in 0..4 {
        encoder.embed(&texts(&["keep alive"]), true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(encoder.state(), EncoderState::Ready);
    assert_eq!(encoder.unload_count(), 0);
}

#[tokio::test]
async fn test_load_oom_retried_once() {
    let loader = ScriptedLoader::new(DIM).fail_loads(1);
    let stats = loader.stats();
    let encoder = encoder_with(Arc::new(loader), Arc::new(NoPressure), Duration::from_secs(30));

    encoder.embed(&texts(&["retry"]), true).await.unwrap();
    assert_eq!(stats.load_attempts(), 2);
    assert_eq!(encoder.load_count(), 1);
}

#[tokio::test]
async fn test_load_oom_twice_is_resource_exhausted() {
    let loader = ScriptedLoader::new(DIM).fail_loads(2);
    let stats = loader.stats();
    let encoder = encoder_with(Arc::new(loader), Arc::new(NoPressure), Duration::from_secs(30));

    let err = encoder.embed(&texts(&["fail"]), true).await.unwrap_err();
    assert!(matches!(err, EncoderError::ResourceExhausted(_)));
    assert_eq!(stats.load_attempts(), 2);
    assert_eq!(encoder.active_leases(), 0);
    assert_eq!(encoder.state(), EncoderState::Unloaded);

    // the script is exhausted, the next call loads normally
    assert!(encoder.embed(&texts(&["ok"]), true).await.is_ok());
}

#[tokio::test]
async fn test_encode_oom_reloads_and_retries() {
    let loader = ScriptedLoader::new(DIM).fail_encodes(1);
    let stats = loader.stats();
    let encoder = encoder_with(Arc::new(loader), Arc::new(NoPressure), Duration::from_secs(30));

    let vectors = encoder.embed(&texts(&["a", "b"]), true).await.unwrap();
    assert_eq!(vectors.len(), 2);
    assert_eq!(stats.encodes(), 2);
    assert_eq!(encoder.load_count(), 2);
    assert_eq!(encoder.unload_count(), 1);
}

#[tokio::test]
async fn test_encode_oom_twice_is_resource_exhausted() {
    let encoder = encoder_with(
        Arc::new(ScriptedLoader::new(DIM).fail_encodes(2)),
        Arc::new(NoPressure),
        Duration::from_secs(30),
    );
    let err = encoder.embed(&texts(&["a"]), true).await.unwrap_err();
    assert!(matches!(err, EncoderError::ResourceExhausted(_)));
    assert_eq!(encoder.active_leases(), 0);
}

#[tokio::test]
async fn test_memory_pressure_cycles_model_without_failing() {
    let pressure = Arc::new(ScriptedPressure::default());
    let encoder = encoder_with(
        Arc::new(ScriptedLoader::new(DIM)),
        pressure.clone(),
        Duration::from_secs(30),
    );

    let before = encoder.embed(&texts(&["same text"]), true).await.unwrap();
    assert_eq!(encoder.load_count(), 1);

    pressure.fire(1);
    let after = encoder.embed(&texts(&["same text"]), true).await.unwrap();
    assert_eq!(encoder.load_count(), 2);
    assert_eq!(encoder.unload_count(), 1);
    assert_eq!(before, after);
    assert_eq!(pressure.readings(), 2);
}

#[tokio::test]
async fn test_pressure_before_first_load_is_ignored() {
    let pressure = Arc::new(ScriptedPressure::default());
    pressure.fire(1);
    let encoder = encoder_with(
        Arc::new(ScriptedLoader::new(DIM)),
        pressure,
        Duration::from_secs(30),
    );

    encoder.embed(&texts(&["cold"]), true).await.unwrap();
    assert_eq!(encoder.load_count(), 1);
    assert_eq!(encoder.unload_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_encode_releases_lease_and_slot() {
    let encoder = encoder_with(
        Arc::new(ScriptedLoader::new(DIM).with_encode_delay(Duration::from_millis(300))),
        Arc::new(NoPressure),
        Duration::from_secs(30),
    );

    let task = {
        let encoder = encoder.clone();
        tokio::spawn(async move { encoder.embed(&texts(&["slow"]), true).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(encoder.active_leases(), 1);
    assert_eq!(encoder.available_encode_slots(), 1);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(encoder.active_leases(), 0);
    assert_eq!(encoder.available_encode_slots(), 2);
}

#[tokio::test]
async fn test_shutdown_refuses_work() {
    let encoder = encoder_with(
        Arc::new(ScriptedLoader::new(DIM)),
        Arc::new(NoPressure),
        Duration::from_secs(30),
    );
    encoder.embed(&texts(&["before"]), true).await.unwrap();

    encoder.shutdown().await;
    assert_eq!(encoder.state(), EncoderState::Unloaded);
    assert_eq!(
        encoder.embed(&texts(&["after"]), true).await.unwrap_err(),
        EncoderError::ShuttingDown
    );
}

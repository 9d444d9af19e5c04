mod common;

use shakestream_core::{
    sensors::{Location, Sample},
    storage::{duckdb::DuckDbBackend, memory::MemoryStore, SensorStore},
    registry::ClientRegistry,
    SensorType, Timestamp,
};
use std::sync::Arc;

fn accel(client: &str, nanos: i64) -> Sample {
    Sample::axes(SensorType::Accelerometer, client, Timestamp(nanos), 0.5, -0.5, 9.8)
}

async fn exercise_store(store: Arc<dyn SensorStore>) {
    store.init(&SensorType::ALL).await.unwrap();

    let batch: Vec<Sample> = (0..20).map(|i| accel("a", i)).collect();
    assert_eq!(store.insert_batch(SensorType::Accelerometer, &batch).await.unwrap(), 20);
    // overlapping retry only adds the new tail
    let retry: Vec<Sample> = (15..25).map(|i| accel("a", i)).collect();
    assert_eq!(store.insert_batch(SensorType::Accelerometer, &retry).await.unwrap(), 5);
    // same timestamps from another client are distinct rows
    assert_eq!(store.insert_batch(SensorType::Accelerometer, &[accel("b", 3)]).await.unwrap(), 1);

    let range = store
        .query_range(SensorType::Accelerometer, "a", Timestamp(5), Timestamp(9))
        .await
        .unwrap();
    let stamps: Vec<i64> = range.iter().map(|s| s.timestamp.as_nanos()).collect();
    assert_eq!(stamps, vec![5, 6, 7, 8, 9]);

    let clients = store
        .distinct_clients(SensorType::Accelerometer, Timestamp(10))
        .await
        .unwrap();
    assert_eq!(clients.into_iter().collect::<Vec<_>>(), vec!["a".to_string()]);

    assert_eq!(
        store
            .delete_older_than(SensorType::Accelerometer, Timestamp(12))
            .await
            .unwrap(),
        13
    );
    let stats = store.stats(SensorType::Accelerometer).await.unwrap();
    assert_eq!(stats.total_records, 13);
    assert_eq!(stats.oldest, Some(Timestamp(12)));
    assert_eq!(stats.newest, Some(Timestamp(24)));

    let latest = store.latest(SensorType::Accelerometer, "a").await.unwrap().unwrap();
    assert_eq!(latest.timestamp, Timestamp(24));
    assert!(store.latest(SensorType::Gravity, "a").await.unwrap().is_none());

    let gravity = |nanos| Sample::axes(SensorType::Gravity, "c", Timestamp(nanos), 0.0, 0.0, 9.81);
    store
        .insert_batch(SensorType::Gravity, &[gravity(2), gravity(-5)])
        .await
        .unwrap();
    // "b" only had a row older than the sweep above
    let everyone = store.all_clients(&SensorType::ALL).await.unwrap();
    assert_eq!(everyone.into_iter().collect::<Vec<_>>(), vec!["a".to_string(), "c".to_string()]);

    let history = store.client_history(SensorType::Gravity, "c").await.unwrap();
    let stamps: Vec<i64> = history.iter().map(|s| s.timestamp.as_nanos()).collect();
    assert_eq!(stamps, vec![-5, 2]);
    assert_eq!(
        store.client_history(SensorType::Accelerometer, "a").await.unwrap().len(),
        13
    );
}

#[tokio::test]
async fn test_duckdb_store_contract() {
    let (backend, _dir) = common::duckdb_backend().await;
    exercise_store(backend.sensor_store()).await;
}

#[tokio::test]
async fn test_memory_store_contract() {
    exercise_store(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_duckdb_data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.duckdb");
    let path = path.to_str().unwrap();

    {
        let backend = DuckDbBackend::new(path, 100).unwrap();
        backend.init(&[SensorType::Location]).await.unwrap();
        let fix = Location {
            latitude: 35.68,
            longitude: 139.76,
            altitude: Some(40.0),
            horizontal_accuracy: Some(5.0),
            vertical_accuracy: None,
        };
        backend
            .insert_batch(
                SensorType::Location,
                &[Sample::location("10.0.0.7", Timestamp(1_000), fix)],
            )
            .await
            .unwrap();
        ClientRegistry::new(Arc::new(backend.clone()))
            .upsert("10.0.0.7", "rooftop")
            .await
            .unwrap();
    }

    let backend = DuckDbBackend::new(path, 100).unwrap();
    backend.init(&[SensorType::Location]).await.unwrap();
    let latest = backend
        .latest(SensorType::Location, "10.0.0.7")
        .await
        .unwrap()
        .expect("location row");
    match latest.payload {
        shakestream_core::sensors::Payload::Location(loc) => {
            assert_eq!(loc.altitude, Some(40.0));
            assert_eq!(loc.vertical_accuracy, None);
        }
        other => panic!("unexpected payload {:?}", other),
    }
    let tags = ClientRegistry::new(Arc::new(backend)).get_all().await.unwrap();
    assert_eq!(tags.get("10.0.0.7").map(String::as_str), Some("rooftop"));
}

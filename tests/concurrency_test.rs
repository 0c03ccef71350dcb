use geoload::{Config, Engine, Point};
use std::thread;
use std::time::Duration;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_concurrent_requests_and_sweeps() {
    init();
    let engine = Engine::with_config(
        Config::default()
            .with_thresholds(40, 15)
            .with_merge_interval(Duration::from_millis(5)),
    )
    .unwrap();

    let writers: Vec<_> = (0..6)
        .map(|t| {
            let engine = engine.clone();
            thread::spawn(move || {
                for i in 0..400 {
                    let location = Point::new(
                        2.30 + (i % 20) as f64 * 0.003,
                        48.80 + t as f64 * 0.004,
                    );
                    let entity = if i % 3 == 0 { "svc-b" } else { "svc-a" };
                    engine.record_request(entity, &location).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let _ = engine.centroids("svc-a").unwrap();
                    let _ = engine.weighted_centroids("svc-b").unwrap();
                    let _ = engine.current_load("svc-a").unwrap();
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    let a = engine.current_load("svc-a").unwrap();
    let b = engine.current_load("svc-b").unwrap();
    assert_eq!(a + b, 2400);
    assert_eq!(engine.index().entity_client_count("svc-a"), Some(a));
    assert_eq!(engine.index().entity_client_count("svc-b"), Some(b));

    for entity in ["svc-a", "svc-b"] {
        assert_eq!(engine.index().check_invariants(entity), Some(Ok(())));
    }
    assert!(engine.index_stats().unwrap().splits > 0);
}

#[test]
fn test_explore_override_during_traffic() {
    init();
    let engine = Engine::new().unwrap();
    let berlin = Point::new(13.4050, 52.5200);
    let probe = vec![geoload::compute::cells::cell_at(&Point::new(-43.1729, -22.9068), 10)];

    engine.record_request("svc-a", &berlin).unwrap();
    engine.set_explore_override("svc-a", probe.clone()).unwrap();
    engine.record_request("svc-a", &berlin).unwrap();

    assert_eq!(engine.centroids("svc-a").unwrap(), Some(probe));
    assert_eq!(engine.current_load("svc-a").unwrap(), 2);

    assert!(engine.clear_explore_override("svc-a").unwrap());
    let live = engine.weighted_centroids("svc-a").unwrap().unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].count, 2);
}

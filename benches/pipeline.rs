use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use sbsync::model::{ClassifierState, SclRenderedServicePath, ServiceFunction};
use sbsync::{
    AccessorConfig, ChangeEvent, Datastore, Dispatcher, DispatcherConfig, InMemoryDataStore, JsonExporter, Listener,
    OperationClassifier, PresenceClassifier, RecordingSink, ResourceKey, SerializedAccessor,
};

fn bench_classify(c: &mut Criterion) {
    let event = ChangeEvent::updated(
        ServiceFunction::new("sf1").with_rest_uri("http://10.0.0.1:5000"),
        ServiceFunction::new("sf1").with_rest_uri("http://10.0.0.2:5000"),
    );
    c.bench_function("pipeline/classify", |b| {
        b.iter(|| PresenceClassifier.classify(std::hint::black_box(&event)));
    });
}

fn bench_listener_to_sink(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(1));
    group.bench_function("listener_to_sink", |b| {
        b.iter_custom(|iters| {
            // Fresh pool per sample so queued work never leaks between samples.
            let dispatcher = Arc::new(
                Dispatcher::start(
                    &DispatcherConfig::with_workers(4),
                    Arc::new(RecordingSink::new()),
                    Arc::new(JsonExporter::<ServiceFunction>::new()),
                )
                .unwrap(),
            );
            let listener = Listener::new(Arc::clone(&dispatcher));
            let events: Vec<_> = (0..64)
                .map(|i| ChangeEvent::created(ServiceFunction::new(format!("sf{i}")).with_rest_uri("http://10.0.0.1:5000")))
                .collect();

            let started = Instant::now();
            let mut sent = 0;
            while sent < iters {
                let n = (iters - sent).min(events.len() as u64) as usize;
                listener.on_changes(&events[..n]);
                sent += n as u64;
                // Stay under the queue bound.
                assert!(dispatcher.wait_idle(Duration::from_secs(30)));
            }
            started.elapsed()
        });
    });
    group.finish();
}

fn bench_merge_append(c: &mut Criterion) {
    c.bench_function("accessor/merge_append", |b| {
        b.iter_custom(|iters| {
            let store = InMemoryDataStore::new().unwrap();
            let accessor = SerializedAccessor::start("bench", Arc::new(store), &AccessorConfig::default()).unwrap();
            let key = ResourceKey::new("clsf");

            let started = Instant::now();
            for i in 0..iters {
                // Bounded child count keeps every iteration the same size.
                let child = SclRenderedServicePath::new(format!("rsp{}", i % 32));
                accessor.merge_append::<ClassifierState, _>(&key, child, Datastore::Operational);
            }
            started.elapsed()
        });
    });
}

criterion_group!(pipeline, bench_classify, bench_listener_to_sink, bench_merge_append);
criterion_main!(pipeline);

use std::sync::Arc;
use std::thread;

use sbsync::model::{ClassifierState, ServiceFunctionClassifier};
use sbsync::{
    AccessorConfig, Accessors, Datastore, InMemoryDataStore, RecordingSink, ResourceKey, ServiceClassifierApi,
    SouthboundSync, SyncConfig, TreeEntity,
};

#[test]
fn rendered_paths_append_to_absent_state() {
    let store = InMemoryDataStore::new().unwrap();
    let sync = SouthboundSync::start(
        &SyncConfig::default(),
        Arc::new(store.clone()),
        Arc::new(RecordingSink::new()),
    )
    .unwrap();
    let api = sync.classifier_api().unwrap();

    assert!(api.read_state("clsfName").is_none());
    assert!(api.add_rendered_path("clsfName", "rspName1"));
    assert!(api.add_rendered_path("clsfName", "rspName2"));

    let state = api.read_state("clsfName").unwrap();
    assert_eq!(state.rendered_path_names(), vec!["rspName1", "rspName2"]);

    // State is operational data, not configuration.
    let path = ClassifierState::path_for(&ResourceKey::new("clsfName"));
    assert!(store.snapshot(Datastore::Operational, &path).unwrap().is_some());
    assert!(store.snapshot(Datastore::Configuration, &path).unwrap().is_none());
}

#[test]
fn concurrent_appends_through_separate_api_handles_lose_nothing() {
    let store = InMemoryDataStore::new().unwrap();
    let accessors = Arc::new(Accessors::new(Arc::new(store), AccessorConfig::default()));

    let threads: Vec<_> = (0..16)
        .map(|i| {
            let accessors = Arc::clone(&accessors);
            thread::spawn(move || {
                let api = ServiceClassifierApi::new(&accessors).unwrap();
                api.add_rendered_path("clsf", &format!("rsp{i:02}"))
            })
        })
        .collect();
    for t in threads {
        assert!(t.join().unwrap());
    }
    assert_eq!(accessors.len(), 1);

    let api = ServiceClassifierApi::new(&accessors).unwrap();
    let mut names: Vec<String> = api
        .read_state("clsf")
        .unwrap()
        .rendered_path_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    names.sort();
    let expected: Vec<String> = (0..16).map(|i| format!("rsp{i:02}")).collect();
    assert_eq!(names, expected);
}

#[test]
fn classifier_written_through_api_drives_acl_resolution() {
    use std::time::Duration;

    use sbsync::model::{AccessList, ServiceFunctionForwarder};
    use sbsync::{DataStore, RestOperation};

    let store = InMemoryDataStore::new().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let sync = SouthboundSync::start(&SyncConfig::default(), Arc::new(store.clone()), sink.clone()).unwrap();
    let api = sync.classifier_api().unwrap();

    let sff = ServiceFunctionForwarder::new("sff1").with_rest_uri("http://192.0.2.1:5000");
    let mut tx = store.new_transaction(Datastore::Configuration);
    tx.put(ServiceFunctionForwarder::path_for(&sff.key()), serde_json::to_value(&sff).unwrap());
    tx.submit().unwrap();
    assert!(api.write_classifier(&ServiceFunctionClassifier::new("clsf1", "acl1", &["sff1"])));

    let acl = AccessList::new("acl1");
    let mut tx = store.new_transaction(Datastore::Configuration);
    tx.put(AccessList::path_for(&acl.key()), serde_json::to_value(&acl).unwrap());
    tx.submit().unwrap();

    assert!(store.settle(Duration::from_secs(5)));
    assert!(sync.wait_idle(Duration::from_secs(5)));
    let calls = sink.requests_to("http://192.0.2.1:5000/config/ietf-access-control-list:access-lists/acl/acl1");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation, RestOperation::Post);
}

use std::sync::Arc;

use dynapi_core::CustomObjectData;
use dynapi_store::{CustomObjectRegistry, KvObjectRegistry, MemStore};
use metrics_exporter_prometheus::PrometheusBuilder;

// One recorder per process, so this file holds a single test.
#[tokio::test]
async fn registry_metrics_reach_prometheus_exporter() {
    let handle = PrometheusBuilder::new().install_recorder().expect("install recorder");

    let reg = KvObjectRegistry::with_json(Arc::new(MemStore::new()));
    let obj = CustomObjectData { name: "w1".into(), version: "v1".into(), data: r#"{"name":"w1"}"#.into() };
    reg.set("widgets", "w1", &obj).await.unwrap();
    reg.set("widgets", "w1", &obj).await.unwrap();
    reg.list("widgets").await.unwrap();

    let rendered = handle.render();
    assert!(rendered.contains("registry_set_total 2"), "rendered: {}", rendered);
    assert!(rendered.contains("registry_list_ms"), "rendered: {}", rendered);
}

//! Serving registry tests against an in-memory backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use mlc_core::cache::{CacheStore, MemoryStore};
use mlc_core::catalog::ServingModule;
use mlc_core::serving::{
    group_document_key, GroupMembers, RegisterOutcome, ServingGroup, ServingRegistry,
    ServingTarget, REGISTRY_KEY,
};

fn registry() -> (Arc<MemoryStore>, ServingRegistry) {
    let store = Arc::new(MemoryStore::new("backend"));
    (store.clone(), ServingRegistry::new(store))
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Canonical registry
// ============================================================================

#[tokio::test]
async fn test_register_unregister_round_trip() {
    let (store, registry) = registry();
    let before = store.hgetall(REGISTRY_KEY).await.unwrap();
    let target = ServingTarget::new(ServingModule::InstanceAnomaly, "was", "1201");

    assert_eq!(registry.register(&target).await.unwrap(), RegisterOutcome::Registered);
    let listed = registry.list_all().await.unwrap();
    assert_eq!(listed[&target.key()].target_id, "1201");
    assert_eq!(listed[&target.key()].inst_type, "was");

    assert!(registry.unregister(&target.key()).await.unwrap());
    assert_eq!(store.hgetall(REGISTRY_KEY).await.unwrap(), before);
}

#[tokio::test]
async fn test_unregister_absent_key_is_ok() {
    let (_, registry) = registry();
    assert!(!registry
        .unregister("exem_aiops_anls_inst_was_1201")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_log_serving_targets() {
    let (_, registry) = registry();
    for target in [
        ServingTarget::new(ServingModule::LogAnomaly, "syslog", "11"),
        ServingTarget::new(ServingModule::LogAnomaly, "filelog", "12"),
        ServingTarget::new(ServingModule::InstanceAnomaly, "was", "13"),
    ] {
        registry.register(&target).await.unwrap();
    }
    let mut targets = registry.log_serving_targets().await.unwrap();
    targets.sort();
    assert_eq!(targets, ids(&["11", "12"]));
}

// ============================================================================
// Group documents
// ============================================================================

#[tokio::test]
async fn test_group_toggle_consistency() {
    let (_, registry) = registry();
    let group = ServingGroup {
        module: ServingModule::LoadForecast,
        inst_type: "was".into(),
        group_id: "all".into(),
        members: GroupMembers::Flat(ids(&["1201", "1202", "1203"])),
    };
    registry.register_group(&group).await.unwrap();

    let doc = registry
        .read_group_document(ServingModule::LoadForecast, "was", "all")
        .await
        .unwrap();
    assert_eq!(doc, Some(group.members.clone()));
    assert!(registry
        .list_all()
        .await
        .unwrap()
        .contains_key(&group.target().key()));

    assert!(registry
        .unregister_group(ServingModule::LoadForecast, "was", "all")
        .await
        .unwrap());
    assert!(registry.list_all().await.unwrap().is_empty());
    assert_eq!(
        registry
            .read_group_document(ServingModule::LoadForecast, "was", "all")
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_group_rewrite_replaces_members() {
    let (_, registry) = registry();
    let mut group = ServingGroup {
        module: ServingModule::EventForecast,
        inst_type: "instanceGroup".into(),
        group_id: "179".into(),
        members: GroupMembers::ByType(BTreeMap::from([("was".to_string(), ids(&["1"]))])),
    };
    registry.register_group(&group).await.unwrap();
    group.members = GroupMembers::ByType(BTreeMap::from([("db".to_string(), ids(&["9"]))]));
    assert_eq!(
        registry.register_group(&group).await.unwrap(),
        RegisterOutcome::AlreadyServing
    );
    let doc = registry
        .read_group_document(ServingModule::EventForecast, "instanceGroup", "179")
        .await
        .unwrap()
        .unwrap();
    assert!(doc.contains("db", "9"));
    assert!(!doc.contains("was", "1"));
}

#[tokio::test]
async fn test_remove_target_everywhere() {
    let (store, registry) = registry();
    registry
        .register(&ServingTarget::new(ServingModule::InstanceAnomaly, "was", "1201"))
        .await
        .unwrap();
    registry
        .register(&ServingTarget::new(ServingModule::ForecastMixer, "was", "1201"))
        .await
        .unwrap();
    registry
        .register(&ServingTarget::new(ServingModule::InstanceAnomaly, "was", "11201"))
        .await
        .unwrap();
    registry
        .register_group(&ServingGroup {
            module: ServingModule::LoadForecast,
            inst_type: "was".into(),
            group_id: "all".into(),
            members: GroupMembers::Flat(ids(&["1201", "1300"])),
        })
        .await
        .unwrap();
    registry
        .register_group(&ServingGroup {
            module: ServingModule::LoadForecast,
            inst_type: "db".into(),
            group_id: "ORACLE".into(),
            members: GroupMembers::Flat(ids(&["1201"])),
        })
        .await
        .unwrap();
    registry
        .register_group(&ServingGroup {
            module: ServingModule::EventForecast,
            inst_type: "instanceGroup".into(),
            group_id: "179".into(),
            members: GroupMembers::ByType(BTreeMap::from([(
                "was".to_string(),
                ids(&["1201", "5"]),
            )])),
        })
        .await
        .unwrap();

    let report = registry.remove_target_everywhere("was", "1201").await.unwrap();
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.documents.len(), 2);

    let remaining = registry.list_all().await.unwrap();
    assert!(remaining.contains_key("exem_aiops_anls_inst_was_11201"));
    assert!(!remaining.contains_key("exem_aiops_anls_inst_was_1201"));

    let was_doc = registry
        .read_group_document(ServingModule::LoadForecast, "was", "all")
        .await
        .unwrap();
    assert_eq!(was_doc, Some(GroupMembers::Flat(ids(&["1300"]))));
    let db_doc = registry
        .read_group_document(ServingModule::LoadForecast, "db", "ORACLE")
        .await
        .unwrap();
    assert_eq!(db_doc, Some(GroupMembers::Flat(ids(&["1201"]))));

    let event_key =
        group_document_key(ServingModule::EventForecast, "instanceGroup", "179").unwrap();
    let raw = store.get(&event_key).await.unwrap().unwrap();
    assert_eq!(String::from_utf8(raw).unwrap(), r#"{"was":["5"]}"#);
}

#[tokio::test]
async fn test_reset_only_touches_registry_keys() {
    let (store, registry) = registry();
    registry
        .register(&ServingTarget::new(ServingModule::InstanceAnomaly, "was", "1"))
        .await
        .unwrap();
    store.set("Collect::Other", b"x").await.unwrap();
    store.set("was/1/model", b"y").await.unwrap();
    assert_eq!(registry.reset().await.unwrap(), 2);
    assert!(store.exists("was/1/model").await.unwrap());
}

//! Serving controller tests: config store, registry and loader together.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use mlc_core::artifacts::KeyScheme;
use mlc_core::cache::{CacheStore, MemoryStore, ReplicaHandle, ReplicaRole, ReplicaSet};
use mlc_core::catalog::ServingModule;
use mlc_core::serving::{
    ControlError, GroupMembers, GroupToggle, LogServingUpdate, LogTargetConfig,
    MemoryConfigStore, ServingController, ServingRegistry, ServingRow, ServingTarget,
    TargetToggle,
};
use mlc_core::sync::{BulkLoader, Publisher};

// ============================================================================
// Fixtures
// ============================================================================

struct Harness {
    _dir: tempfile::TempDir,
    root: PathBuf,
    cache: Arc<MemoryStore>,
    config: Arc<MemoryConfigStore>,
    controller: ServingController,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("model");
    fs::create_dir_all(&root).unwrap();
    let cache = Arc::new(MemoryStore::new("cache"));
    let replicas = ReplicaSet::new(vec![ReplicaHandle::new(
        ReplicaRole::Master,
        "m:6379",
        cache.clone(),
    )]);
    let loader = BulkLoader::new(
        Arc::new(Publisher::new(replicas)),
        KeyScheme::new(&root),
        ReplicaRole::Master,
    );
    let config = Arc::new(MemoryConfigStore::new());
    let controller = ServingController::new(
        ServingRegistry::new(cache.clone()),
        config.clone(),
        loader,
        &root,
        "102",
    );
    Harness {
        _dir: dir,
        root,
        cache,
        config,
        controller,
    }
}

fn row(module: ServingModule, inst: &str, id: &str) -> ServingRow {
    ServingRow {
        target: ServingTarget::new(module, inst, id),
        on_boot: false,
        group_id: None,
        product_type: None,
        members: None,
    }
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn log_update(target_id: &str) -> LogServingUpdate {
    LogServingUpdate {
        target_id: target_id.into(),
        service_on_boot: true,
        set_name: Some("default".into()),
        is_log_service_on: true,
        is_param_auto: false,
        anomaly_threshold: 0.7,
        auto_anomaly_threshold: 0.8,
        alert_threshold: 3.0,
        rare_rate: 0.01,
        is_sparse_service_on: true,
        exclude_keywords: Some(ids(&["debug"])),
        include_keywords: None,
    }
}

// ============================================================================
// Target and group toggles
// ============================================================================

#[tokio::test]
async fn test_target_toggle_on_off() {
    let h = harness();
    let on = TargetToggle {
        module: ServingModule::InstanceAnomaly,
        inst_type: "was".into(),
        target_id: "1201".into(),
        serving: true,
    };
    h.controller.set_target_serving(&[on.clone()]).await.unwrap();
    assert!(h
        .controller
        .serving_status()
        .await
        .unwrap()
        .contains_key("exem_aiops_anls_inst_was_1201"));

    let off = TargetToggle { serving: false, ..on };
    h.controller.set_target_serving(&[off.clone()]).await.unwrap();
    h.controller.set_target_serving(&[off]).await.unwrap();
    assert!(h.controller.serving_status().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_group_toggle_expands_members() {
    let h = harness();
    for id in ["1", "2"] {
        let mut r = row(ServingModule::InstanceAnomaly, "db", id);
        r.group_id = Some("g1".into());
        r.product_type = Some("ORACLE".into());
        h.config.add_row(r);
    }
    let mut other = row(ServingModule::InstanceAnomaly, "db", "3");
    other.group_id = Some("g1".into());
    other.product_type = Some("TIBERO".into());
    h.config.add_row(other);

    let toggle = GroupToggle {
        module: ServingModule::InstanceAnomaly,
        inst_type: "ORACLE".into(),
        group_id: "g1".into(),
        serving: true,
    };
    h.controller.set_group_serving(&[toggle]).await.unwrap();
    let status = h.controller.serving_status().await.unwrap();
    let keys: Vec<&str> = status.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec!["exem_aiops_anls_inst_db_1", "exem_aiops_anls_inst_db_2"]
    );
}

#[tokio::test]
async fn test_load_forecast_group_toggle_uses_product_type() {
    let h = harness();
    let mut r = row(ServingModule::LoadForecast, "db", "ORACLE");
    r.members = Some(GroupMembers::Flat(ids(&["1", "2"])));
    h.config.add_row(r);

    let toggle = GroupToggle {
        module: ServingModule::LoadForecast,
        inst_type: "ORACLE".into(),
        group_id: "ignored".into(),
        serving: true,
    };
    h.controller.set_group_serving(&[toggle.clone()]).await.unwrap();
    let doc = h
        .controller
        .registry()
        .read_group_document(ServingModule::LoadForecast, "db", "ORACLE")
        .await
        .unwrap();
    assert_eq!(doc, Some(GroupMembers::Flat(ids(&["1", "2"]))));
    assert!(h
        .controller
        .serving_status()
        .await
        .unwrap()
        .contains_key("exem_aiops_load_fcst_db_ORACLE"));

    h.controller
        .set_group_serving(&[GroupToggle { serving: false, ..toggle }])
        .await
        .unwrap();
    assert!(h.controller.serving_status().await.unwrap().is_empty());
    assert!(!h
        .cache
        .exists("Collect::LoadFcstTargetList:db:ORACLE")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_log_group_toggle_uses_log_targets() {
    let h = harness();
    for (id, log_type) in [("11", "syslog"), ("12", "syslog"), ("13", "filelog")] {
        h.config.add_log_target(
            id,
            LogTargetConfig {
                log_type: log_type.into(),
                ..LogTargetConfig::default()
            },
        );
    }
    let toggle = GroupToggle {
        module: ServingModule::LogAnomaly,
        inst_type: "syslog".into(),
        group_id: "any".into(),
        serving: true,
    };
    h.controller.set_group_serving(&[toggle]).await.unwrap();
    let mut targets = h.controller.log_serving_targets().await.unwrap();
    targets.sort();
    assert_eq!(targets, ids(&["11", "12"]));
}

// ============================================================================
// Delete, reload, bootstrap
// ============================================================================

#[tokio::test]
async fn test_delete_group_type_removes_event_document() {
    let h = harness();
    let mut r = row(ServingModule::EventForecast, "instanceGroup", "179");
    r.members = Some(GroupMembers::ByType(BTreeMap::from([(
        "was".to_string(),
        ids(&["1"]),
    )])));
    h.config.add_row(r);
    h.controller
        .enable_target(&ServingTarget::new(ServingModule::EventForecast, "instanceGroup", "179"))
        .await
        .unwrap();

    let report = h.controller.delete_target("instanceGroup", "179").await.unwrap();
    assert_eq!(
        report.documents,
        ids(&["Collect::TargetGroups::instanceGroup:179:exem_aiops_event_fcst"])
    );
}

#[tokio::test]
async fn test_delete_db_product_normalizes() {
    let h = harness();
    h.controller
        .enable_target(&ServingTarget::new(ServingModule::InstanceAnomaly, "db", "77"))
        .await
        .unwrap();
    let report = h.controller.delete_target("POSTGRES", "77").await.unwrap();
    assert_eq!(report.entries, ids(&["exem_aiops_anls_inst_db_77"]));
}

#[tokio::test]
async fn test_reload_target_loads_and_registers() {
    let h = harness();
    let dir = h.root.join("102/exem_aiops_anls_inst/was/1201");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("model.onnx"), b"graph").unwrap();

    let summary = h
        .controller
        .reload_target("exem_aiops_anls_inst", "was", "1201")
        .await
        .unwrap();
    assert_eq!(summary.published, 1);
    assert!(h
        .cache
        .exists("102/exem_aiops_anls_inst/was/1201/model")
        .await
        .unwrap());
    assert!(h
        .controller
        .serving_status()
        .await
        .unwrap()
        .contains_key("exem_aiops_anls_inst_was_1201"));
}

#[tokio::test]
async fn test_reload_log_target_registers_under_log_type() {
    let h = harness();
    let dir = h.root.join("102/exem_aiops_anls_log/log/7/digcn");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("model.pkl"), b"weights").unwrap();

    h.controller
        .reload_target("exem_aiops_anls_log", "syslog", "7")
        .await
        .unwrap();
    let status = h.controller.serving_status().await.unwrap();
    let keys: Vec<&str> = status.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["exem_aiops_anls_log_log_7"]);
    assert_eq!(h.controller.log_serving_targets().await.unwrap(), ids(&["7"]));
}

#[tokio::test]
async fn test_target_toggle_folds_db_product_type() {
    let h = harness();
    let on = TargetToggle {
        module: ServingModule::InstanceAnomaly,
        inst_type: "ORACLE".into(),
        target_id: "9".into(),
        serving: true,
    };
    h.controller.set_target_serving(&[on.clone()]).await.unwrap();
    let status = h.controller.serving_status().await.unwrap();
    let keys: Vec<&str> = status.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["exem_aiops_anls_inst_db_9"]);

    h.controller
        .set_target_serving(&[TargetToggle { serving: false, ..on }])
        .await
        .unwrap();
    assert!(h.controller.serving_status().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reload_missing_directory_is_generic_failure() {
    let h = harness();
    let err = h
        .controller
        .reload_target("exem_aiops_anls_inst", "was", "404")
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::Load(_)));
    assert_eq!(err.public_message(), "serving request failed");
}

#[tokio::test]
async fn test_bootstrap_rebuilds_from_onboot_rows() {
    let h = harness();
    h.cache
        .hset("RedisServingTargets::mlc", "stale", "{}")
        .await
        .unwrap();
    h.cache.set("Collect::LoadFcstTargetList:was:old", b"[]").await.unwrap();

    let mut inst = row(ServingModule::InstanceAnomaly, "was", "1");
    inst.on_boot = true;
    h.config.add_row(inst);
    h.config.add_row(row(ServingModule::InstanceAnomaly, "was", "2"));
    let mut group = row(ServingModule::LoadForecast, "was", "all");
    group.on_boot = true;
    group.members = Some(GroupMembers::Flat(ids(&["1", "2"])));
    h.config.add_row(group);

    let report = h.controller.bootstrap().await.unwrap();
    assert_eq!(report.cleared, 2);
    assert_eq!(report.targets, 1);
    assert_eq!(report.groups, 1);

    let status = h.controller.serving_status().await.unwrap();
    let keys: Vec<&str> = status.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec!["exem_aiops_anls_inst_was_1", "exem_aiops_load_fcst_was_all"]
    );
    assert!(!h
        .cache
        .exists("Collect::LoadFcstTargetList:was:old")
        .await
        .unwrap());
}

// ============================================================================
// Log serving updates
// ============================================================================

#[tokio::test]
async fn test_log_serving_update_applies() {
    let h = harness();
    h.config.add_preset("default");
    h.config.add_log_target(
        "11",
        LogTargetConfig {
            log_type: "syslog".into(),
            exclude_keywords: ids(&["trace"]),
            ..LogTargetConfig::default()
        },
    );
    h.controller
        .update_log_serving(&[log_update("11")])
        .await
        .unwrap();
    let stored = h.config.log_target("11").unwrap();
    assert!(stored.on_boot);
    assert_eq!(stored.preset.as_deref(), Some("default"));
    assert_eq!(stored.exclude_keywords, ids(&["debug"]));
    assert!(stored.include_keywords.is_empty());
    assert_eq!(stored.recommended_threshold, 0.8);
}

#[tokio::test]
async fn test_log_serving_update_is_all_or_nothing() {
    let h = harness();
    h.config.add_log_target("11", LogTargetConfig::default());
    let err = h
        .controller
        .update_log_serving(&[log_update("11"), log_update("missing")])
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::UpdateRejected));
    assert!(!h.config.log_target("11").unwrap().on_boot);
}

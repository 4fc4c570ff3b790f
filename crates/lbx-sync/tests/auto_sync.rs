//! Integration test: the auto-sync loop picks up opted-in vaults and stops on
//! shutdown.

use lbx_storage::{CloudProvider, OpendalProvider, ProviderRegistry};
use lbx_sync::{AutoSync, SyncEngine, VaultSyncConfig};
use opendal::Operator;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn auto_sync_uploads_opted_in_vaults_until_shutdown() {
    let op = Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    let mut registry = ProviderRegistry::new();
    let shared = op.clone();
    registry.register("memory", move || {
        Box::new(OpendalProvider::with_operator("memory", shared.clone()))
    });
    let engine = Arc::new(SyncEngine::new(registry));
    let remote = OpendalProvider::with_operator("memory", op);

    let tmp = TempDir::new().unwrap();
    let auto = tmp.path().join("auto.json");
    let manual = tmp.path().join("manual.json");
    std::fs::write(&auto, b"{\"sealed\":\"auto\"}").unwrap();
    std::fs::write(&manual, b"{\"sealed\":\"manual\"}").unwrap();

    let mut cfg = VaultSyncConfig::new("memory", "auto");
    cfg.auto_sync = true;
    cfg.sync_interval = 1;
    engine.enable_sync(&auto, cfg).unwrap();
    engine
        .enable_sync(&manual, VaultSyncConfig::new("memory", "manual"))
        .unwrap();

    let (shutdown, _) = tokio::sync::broadcast::channel(1);
    let runner = tokio::spawn(AutoSync::new(engine.clone(), vec![auto, manual]).run(shutdown.clone()));

    let mut uploaded = false;
    for _ in 0..100 {
        if remote.exists("auto").await.unwrap() {
            uploaded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(uploaded, "auto-sync vault should be uploaded on the first tick");

    shutdown.send(()).unwrap();
    let watched = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("auto-sync stops after shutdown")
        .unwrap();

    assert_eq!(watched, 1);
    assert!(!remote.exists("manual").await.unwrap());
}

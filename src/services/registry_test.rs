use super::*;

fn outbox() -> Outbox {
    let (tx, _rx) = mpsc::channel(4);
    tx
}

#[tokio::test]
async fn register_then_identity_of() {
    let registry = Registry::new();
    let id = Uuid::new_v4();
    registry.register(id, "alice", outbox()).await.unwrap();

    assert_eq!(registry.identity_of(id).await.unwrap(), "alice");
    assert_eq!(registry.len().await, 1);
    assert!(!registry.is_empty().await);
}

#[tokio::test]
async fn duplicate_register_fails_and_keeps_original() {
    let registry = Registry::new();
    let id = Uuid::new_v4();
    registry.register(id, "alice", outbox()).await.unwrap();

    let err = registry.register(id, "mallory", outbox()).await.unwrap_err();
    assert_eq!(err, RegistryError::Duplicate(id));
    assert_eq!(err.error_code(), "E_DUPLICATE_CONNECTION");
    assert_eq!(registry.identity_of(id).await.unwrap(), "alice");
}

#[tokio::test]
async fn identity_of_unknown_connection_fails() {
    let registry = Registry::new();
    let id = Uuid::new_v4();
    assert_eq!(registry.identity_of(id).await.unwrap_err(), RegistryError::Unknown(id));
}

#[tokio::test]
async fn unregister_twice_is_a_no_op() {
    let registry = Registry::new();
    let id = Uuid::new_v4();
    registry.register(id, "alice", outbox()).await.unwrap();

    assert!(registry.unregister(id).await);
    assert!(!registry.unregister(id).await);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn unregister_absent_is_a_no_op() {
    let registry = Registry::new();
    assert!(!registry.unregister(Uuid::new_v4()).await);
}

#[tokio::test]
async fn list_live_is_a_detached_snapshot() {
    let registry = Registry::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    registry.register(a, "a", outbox()).await.unwrap();
    registry.register(b, "b", outbox()).await.unwrap();

    let snapshot = registry.list_live().await;
    registry.unregister(a).await;

    assert_eq!(snapshot, HashSet::from([a, b]));
    assert_eq!(registry.list_live().await, HashSet::from([b]));
}

#[tokio::test]
async fn id_can_be_reused_after_unregister() {
    let registry = Registry::new();
    let id = Uuid::new_v4();
    registry.register(id, "first", outbox()).await.unwrap();
    registry.unregister(id).await;
    registry.register(id, "second", outbox()).await.unwrap();
    assert_eq!(registry.identity_of(id).await.unwrap(), "second");
}

#[tokio::test]
async fn concurrent_register_and_unregister_stay_consistent() {
    let registry = Registry::new();
    let ids: Vec<Uuid> = (0..64).map(|_| Uuid::new_v4()).collect();

    let mut tasks = Vec::new();
    for id in ids.clone() {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            registry.register(id, id.to_string(), outbox()).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(registry.len().await, 64);

    let mut tasks = Vec::new();
    for id in ids.iter().copied().step_by(2) {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move { registry.unregister(id).await }));
    }
    for task in tasks {
        assert!(task.await.unwrap());
    }

    let live = registry.list_live().await;
    assert_eq!(live.len(), 32);
    assert!(ids.iter().skip(1).step_by(2).all(|id| live.contains(id)));
}

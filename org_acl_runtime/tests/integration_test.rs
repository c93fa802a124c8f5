//! Integration tests for org_acl_runtime.
//!
//! File-backed tests use `tempfile` for isolation; timing tests run on a
//! paused tokio clock.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use org_acl_kernel::codec::encode_call_script;
use org_acl_kernel::{
    AclError, CallKind, CallPayload, CapabilityDescriptor, Entity, EventBatch, ForwarderOracle,
    ManagerChanged, MethodDescriptor, OracleError, PermissionChanged, StaticRegistry,
};

use org_acl_runtime::bridge::{Bridge, RequestEnvelope};
use org_acl_runtime::cache::{Cache, MemoryCache};
use org_acl_runtime::oracle::{Acceptance, CachedOracle, StaticOracle};
use org_acl_runtime::replay;
use org_acl_runtime::{Organization, Resolution, RuntimeConfig, RuntimeError};

/// Canonical hash of the kernel's golden counter history.
const GOLDEN_HASH: &str = "f93e9daaad37e505265a4e2ee216f83c23d1d37a3b949675bbf3d4dc39257b1e";

const ROOT: &str = "0x0000000000000000000000000000000000000abc";
const COUNTER: &str = "0x1111111111111111111111111111111111111111";
const VOTING: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const TOKENS: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const ALICE: &str = "0x9999999999999999999999999999999999999999";
const BOB: &str = "0x8888888888888888888888888888888888888888";

fn golden_events_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("org_acl_kernel")
        .join("tests")
        .join("golden")
        .join("events.json")
}

fn forwarder(app_id: &str, address: &str) -> Entity {
    Entity {
        app_id: app_id.into(),
        address: address.into(),
        descriptor: None,
        kind: CallKind::ForwardingCall,
        kernel: Some(ROOT.into()),
    }
}

fn registry() -> Arc<StaticRegistry> {
    Arc::new(StaticRegistry::new(vec![
        Entity {
            app_id: "counter".into(),
            address: COUNTER.into(),
            descriptor: Some(CapabilityDescriptor {
                methods: vec![MethodDescriptor {
                    name: "increment".into(),
                    signature: "increment(uint256)".into(),
                    roles: vec!["INCREMENT".into()],
                    notice: Some("Increment the counter".into()),
                }],
            }),
            kind: CallKind::DirectCall,
            kernel: Some(ROOT.into()),
        },
        forwarder("tokens", TOKENS),
        forwarder("voting", VOTING),
    ]))
}

fn grants(holders: &[&str]) -> EventBatch {
    EventBatch {
        permission: holders
            .iter()
            .map(|h| PermissionChanged::new(COUNTER, "INCREMENT", h, true).to_value())
            .collect(),
        manager: vec![],
    }
}

fn config() -> RuntimeConfig {
    RuntimeConfig {
        debounce_ms: 50,
        forward_check_timeout_ms: 1_000,
        ..RuntimeConfig::default()
    }
}

fn connect(oracle: Arc<dyn ForwarderOracle>) -> Organization {
    Organization::connect(ROOT, registry(), oracle, &config()).unwrap()
}

fn increment() -> CallPayload {
    CallPayload::new("increment", vec![json!(1)])
}

// ─────────────────────────────────────────────────────────────
// Replay
// ─────────────────────────────────────────────────────────────

#[test]
fn replay_matches_golden_hash() {
    let batch = replay::load_batch(&golden_events_path()).unwrap();
    let (state, hash) = replay::rebuild_state(&batch);
    assert_eq!(hash, GOLDEN_HASH, "Runtime replay hash does not match golden hash");
    assert_eq!(state.allowed_entities("counter", "add"), vec!["0x1", "0x2"]);
}

#[test]
fn replay_is_deterministic() {
    let batch = replay::load_batch(&golden_events_path()).unwrap();
    assert_eq!(replay::verify_determinism(&batch).unwrap(), GOLDEN_HASH);
}

#[test]
fn replay_skips_malformed_records() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let history = json!({
        "permission": [
            PermissionChanged::new("counter", "add", "0x1", true).to_value(),
            {"event": "SetPermission", "returnValues": {"app": "counter"}},
        ],
    });
    write!(file, "{}", history).unwrap();

    let batch = replay::load_batch(file.path()).unwrap();
    let (state, _) = replay::rebuild_state(&batch);
    assert_eq!(state.allowed_entities("counter", "add"), vec!["0x1"]);
}

#[test]
fn missing_history_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = replay::load_batch(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, RuntimeError::Io { .. }));
}

#[test]
fn config_file_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runtime.json");
    fs::write(&path, serde_json::to_string(&config()).unwrap()).unwrap();
    assert_eq!(RuntimeConfig::load(&path).unwrap(), config());
}

// ─────────────────────────────────────────────────────────────
// Organization session
// ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn direct_holder_gets_single_step() {
    let org = connect(Arc::new(StaticOracle::default()));
    org.ingest(grants(&[ALICE])).await.unwrap();
    org.flush().await.unwrap();

    let plan = org
        .resolve(ALICE, COUNTER, "INCREMENT", &increment())
        .await
        .unwrap();
    assert!(plan.is_direct());
    assert_eq!(
        plan.outermost().description.as_deref(),
        Some("Increment the counter")
    );
    org.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn voting_relays_for_token_holder() {
    let oracle = StaticOracle::new(vec![Acceptance {
        forwarder: VOTING.into(),
        sender: ALICE.into(),
    }]);
    let org = connect(Arc::new(oracle));
    org.ingest(grants(&[VOTING])).await.unwrap();
    org.flush().await.unwrap();

    let plan = org
        .resolve_intent(ALICE, COUNTER, "increment", vec![json!(2)])
        .await
        .unwrap();
    assert_eq!(plan.relays(), vec![VOTING]);
    let txs = plan.to_transactions();
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0].to, VOTING);

    let err = org
        .resolve_intent(BOB, COUNTER, "increment", vec![json!(2)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Acl(AclError::NoPermission { .. })
    ));
    org.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn resolution_sees_only_published_snapshots() {
    let org = connect(Arc::new(StaticOracle::default()));
    let mut sub = org.subscribe();
    assert_eq!(sub.next().await.unwrap().version, 0);

    org.ingest(grants(&[ALICE])).await.unwrap();
    // Still inside the debounce window: nothing published yet.
    assert!(org
        .resolve(ALICE, COUNTER, "INCREMENT", &increment())
        .await
        .is_err());

    let snap = sub.next().await.unwrap();
    assert_eq!(snap.version, 1);
    assert!(org
        .resolve(ALICE, COUNTER, "INCREMENT", &increment())
        .await
        .is_ok());
    org.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn revocation_and_manager_flow_through_feed() {
    let org = connect(Arc::new(StaticOracle::default()));
    org.ingest(grants(&[ALICE, BOB])).await.unwrap();
    org.ingest(EventBatch {
        permission: vec![PermissionChanged::new(COUNTER, "INCREMENT", ALICE, false).to_value()],
        manager: vec![ManagerChanged::new(COUNTER, "INCREMENT", ROOT).to_value()],
    })
    .await
    .unwrap();
    let snap = org.flush().await.unwrap();

    assert_eq!(snap.state.allowed_entities(COUNTER, "INCREMENT"), vec![BOB]);
    assert_eq!(snap.state.manager_of(COUNTER, "INCREMENT"), Some(ROOT));
    assert!(snap.verify());
    org.shutdown().await;
}

#[tokio::test]
async fn foreign_root_is_not_an_organization() {
    let other = "0x0000000000000000000000000000000000000def";
    let err = Organization::connect(
        other,
        registry(),
        Arc::new(StaticOracle::default()),
        &config(),
    )
    .err()
    .unwrap();
    assert!(err.to_string().contains("Provided root address is not a DAO"));
}

// ─────────────────────────────────────────────────────────────
// Forwarder checks
// ─────────────────────────────────────────────────────────────

/// Never answers for `stuck`; accepts everything else.
struct Stalling {
    stuck: String,
}

#[async_trait]
impl ForwarderOracle for Stalling {
    async fn can_forward(
        &self,
        forwarder: &Entity,
        _sender: &str,
        _script: &[u8],
    ) -> Result<bool, OracleError> {
        if forwarder.address == self.stuck {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }
        Ok(true)
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_forwarder_fails_only_its_hop() {
    // tokens is listed first and hangs; voting still relays.
    let org = connect(Arc::new(Stalling {
        stuck: TOKENS.into(),
    }));
    org.ingest(grants(&[TOKENS, VOTING])).await.unwrap();
    org.flush().await.unwrap();

    let plan = org
        .resolve(ALICE, COUNTER, "INCREMENT", &increment())
        .await
        .unwrap();
    assert_eq!(plan.relays(), vec![VOTING]);
    org.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn bridge_exposes_cached_forwarder_answers() {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let inner = StaticOracle::new(vec![Acceptance {
        forwarder: VOTING.into(),
        sender: ALICE.into(),
    }]);
    let oracle = CachedOracle::new(Arc::new(inner), cache.clone());
    let org = Arc::new(connect(Arc::new(oracle)));
    org.ingest(grants(&[VOTING])).await.unwrap();
    org.flush().await.unwrap();

    let bridge = Bridge::new(org.clone(), cache.clone(), ALICE);
    let response = bridge
        .handle(RequestEnvelope {
            id: json!(1),
            method: "intent".into(),
            params: vec![json!(COUNTER), json!("increment"), json!([3])],
        })
        .await;
    assert_eq!(response.error, None);
    let txs = response.result.unwrap();
    assert_eq!(txs[0]["to"], json!(VOTING));

    // The voting check was stored under its canonical key and the bridge
    // serves it back.
    let plan = org
        .resolve_intent(ALICE, COUNTER, "increment", vec![json!(3)])
        .await
        .unwrap();
    let script = encode_call_script(&plan.steps()[1..]).unwrap();
    let key = CachedOracle::cache_key(VOTING, ALICE, &script);
    let cached = bridge
        .handle(RequestEnvelope {
            id: json!(2),
            method: "cache".into(),
            params: vec![json!("get"), json!(key)],
        })
        .await;
    assert_eq!(cached.result, Some(Value::Bool(true)));
}

// ─────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────

/// Version 1: ALICE holds the role. Version 2: ALICE is revoked and VOTING,
/// which relays for ALICE, holds it instead.
fn assert_plan_matches_version(resolution: &Resolution) {
    match resolution.version {
        1 => assert!(resolution.plan.is_direct()),
        2 => assert_eq!(resolution.plan.relays(), vec![VOTING]),
        other => panic!("resolved against unexpected snapshot version {other}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolutions_each_see_one_snapshot() {
    let oracle = StaticOracle::new(vec![Acceptance {
        forwarder: VOTING.into(),
        sender: ALICE.into(),
    }]);
    let org = Arc::new(connect(Arc::new(oracle)));
    org.ingest(EventBatch {
        permission: vec![PermissionChanged::new(COUNTER, "INCREMENT", ALICE, true)
            .at(1, 0)
            .to_value()],
        manager: vec![],
    })
    .await
    .unwrap();
    assert_eq!(org.flush().await.unwrap().version, 1);

    let mut resolutions = tokio::task::JoinSet::new();
    for _ in 0..32 {
        let org = org.clone();
        resolutions.spawn(async move {
            org.resolve_at_latest(ALICE, COUNTER, "INCREMENT", &increment())
                .await
        });
    }
    let writer = {
        let org = org.clone();
        tokio::spawn(async move {
            org.ingest(EventBatch {
                permission: vec![
                    PermissionChanged::new(COUNTER, "INCREMENT", ALICE, false)
                        .at(2, 0)
                        .to_value(),
                    PermissionChanged::new(COUNTER, "INCREMENT", VOTING, true)
                        .at(2, 1)
                        .to_value(),
                ],
                manager: vec![],
            })
            .await?;
            org.flush().await
        })
    };

    while let Some(joined) = resolutions.join_next().await {
        assert_plan_matches_version(&joined.unwrap().unwrap());
    }
    let published = writer.await.unwrap().unwrap();
    assert_eq!(published.version, 2);

    let (payload_a, payload_b) = (increment(), increment());
    let after = tokio::join!(
        org.resolve_at_latest(ALICE, COUNTER, "INCREMENT", &payload_a),
        org.resolve_at_latest(ALICE, COUNTER, "INCREMENT", &payload_b),
    );
    for resolution in [after.0.unwrap(), after.1.unwrap()] {
        assert_eq!(resolution.version, 2);
        assert_plan_matches_version(&resolution);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingest_publishes_serial_result() {
    let org = Arc::new(connect(Arc::new(StaticOracle::default())));
    let holders = [ALICE, BOB, VOTING, TOKENS];

    let mut writers = tokio::task::JoinSet::new();
    for (block, holder) in holders.iter().enumerate() {
        let org = org.clone();
        let batch = EventBatch {
            permission: vec![PermissionChanged::new(COUNTER, "INCREMENT", holder, true)
                .at(block as u64, 0)
                .to_value()],
            manager: vec![],
        };
        writers.spawn(async move { org.ingest(batch).await });
    }
    while let Some(joined) = writers.join_next().await {
        joined.unwrap().unwrap();
    }
    let snap = org.flush().await.unwrap();

    // Log positions, not arrival order, decide enumeration order.
    assert_eq!(snap.state.allowed_entities(COUNTER, "INCREMENT"), holders.to_vec());
    assert!(snap.verify());
}

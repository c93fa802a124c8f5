//! Organization session: one permission feed plus one path resolver, bound
//! to a validated organization root.
//!
//! Resolution always reads the latest published snapshot, so it never
//! observes a fold in progress.

use std::sync::Arc;

use serde_json::Value;

use org_acl_kernel::address::{is_address, normalize};
use org_acl_kernel::{
    AclError, CallPayload, EntityRegistry, EventBatch, ExecutionPlan, ForwarderOracle,
    PathResolver,
};

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::feed::PermissionFeed;
use crate::oracle::TimedOracle;
use crate::snapshot::Snapshot;
use crate::subscription::Subscription;

/// A plan together with the snapshot version it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub version: u64,
    pub plan: ExecutionPlan,
}

pub struct Organization {
    root: String,
    feed: PermissionFeed,
    resolver: PathResolver,
}

impl Organization {
    /// Connect to the organization at `root`.
    ///
    /// `root` must be a well-formed address. When the registry reports owning
    /// kernels for its entities, `root` must be one of them.
    pub fn connect(
        root: &str,
        registry: Arc<dyn EntityRegistry>,
        oracle: Arc<dyn ForwarderOracle>,
        config: &RuntimeConfig,
    ) -> Result<Self> {
        config.validate()?;
        let root = normalize(root);
        if !is_address(&root) {
            return Err(not_an_organization(&root).into());
        }

        let kernels: Vec<String> = registry
            .list_entities()
            .into_iter()
            .filter_map(|e| e.kernel.map(|k| normalize(&k)))
            .collect();
        if !kernels.is_empty() && !kernels.contains(&root) {
            return Err(not_an_organization(&root).into());
        }

        let oracle = Arc::new(TimedOracle::new(oracle, config.forward_check_timeout()));
        let resolver =
            PathResolver::new(registry, oracle).with_max_path_length(config.max_path_length);
        let feed = PermissionFeed::spawn(config);
        tracing::info!(root = %root, "connected to organization");

        Ok(Self {
            root,
            feed,
            resolver,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn registry(&self) -> &Arc<dyn EntityRegistry> {
        self.resolver.registry()
    }

    pub async fn ingest(&self, batch: EventBatch) -> Result<()> {
        self.feed.ingest(batch).await
    }

    pub async fn flush(&self) -> Result<Arc<Snapshot>> {
        self.feed.flush().await
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.feed.latest()
    }

    pub fn subscribe(&self) -> Subscription<Arc<Snapshot>> {
        self.feed.subscribe()
    }

    pub async fn resolve(
        &self,
        sender: &str,
        target: &str,
        role: &str,
        payload: &CallPayload,
    ) -> Result<ExecutionPlan> {
        Ok(self.resolve_at_latest(sender, target, role, payload).await?.plan)
    }

    /// Like `resolve`, also reporting which snapshot version the plan was
    /// computed against.
    pub async fn resolve_at_latest(
        &self,
        sender: &str,
        target: &str,
        role: &str,
        payload: &CallPayload,
    ) -> Result<Resolution> {
        let snapshot = self.feed.latest();
        let plan = self
            .resolver
            .resolve(&snapshot.state, sender, target, role, payload)
            .await?;
        tracing::debug!(
            sender,
            target,
            role,
            steps = plan.len(),
            version = snapshot.version,
            "resolved execution plan"
        );
        Ok(Resolution {
            version: snapshot.version,
            plan,
        })
    }

    pub async fn resolve_intent(
        &self,
        sender: &str,
        target: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<ExecutionPlan> {
        let snapshot = self.feed.latest();
        let plan = self
            .resolver
            .resolve_intent(&snapshot.state, sender, target, method, args)
            .await?;
        tracing::debug!(
            sender,
            target,
            method,
            steps = plan.len(),
            version = snapshot.version,
            "resolved intent"
        );
        Ok(plan)
    }

    pub async fn shutdown(self) {
        self.feed.shutdown().await;
    }
}

fn not_an_organization(root: &str) -> AclError {
    AclError::InvalidAddress(format!("Provided root address is not a DAO: {}", root))
}

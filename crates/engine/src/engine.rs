//! The synchronization engine.
//!
//! One engine instance serves one tenant session at a time. Starting a
//! session wires a typed subscription per collection into in-memory
//! mirrors; switching tenants tears every listener down, bumps the
//! session epoch so in-flight pushes from the old session are discarded,
//! and attaches fresh. At no point can records from two tenants coexist
//! in the mirrors.
//!
//! The mirrors converge with whatever the store pushes; the engine never
//! reconciles concurrent edits beyond last-write-wins at the store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, watch, RwLock};

use deskline_core::models::{Comment, Company, RequestTicket, Unit, User};
use deskline_core::roles::Role;
use deskline_core::Record;
use deskline_store::{DocumentStore, RemoteStore, StoreAdapter, Subscription};

use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus, EventKind};
use crate::tenant::TenantProfile;

/// Bound on the requests subscription; key order is creation order, so
/// this keeps the most recent tickets.
pub const RECENT_REQUESTS_LIMIT: usize = 500;
/// Bound on the comments subscription.
pub const RECENT_COMMENTS_LIMIT: usize = 2000;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Coarse session status, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineFlags {
    /// Store heartbeat; false while offline or before any session.
    pub connected: bool,
    /// True from session start until the first users snapshot lands.
    pub loading: bool,
    /// False only when the tenant store holds no user profiles at all —
    /// the signal that first-run provisioning should be offered. Demo
    /// sessions always count as set up.
    pub setup_done: bool,
}

impl EngineFlags {
    fn idle() -> Self {
        Self {
            connected: false,
            loading: false,
            setup_done: true,
        }
    }

    fn starting(connected: bool) -> Self {
        Self {
            connected,
            loading: true,
            setup_done: true,
        }
    }

    /// Published when a session open fails: disconnected, not loading,
    /// and setup pending so the surface above offers retry or
    /// provisioning instead of a working session.
    fn failed() -> Self {
        Self {
            connected: false,
            loading: false,
            setup_done: false,
        }
    }
}

/// How the current session is backed.
#[derive(Debug, Clone)]
pub enum EngineMode {
    /// Live session against a tenant's remote store.
    Connected(TenantProfile),
    /// Self-contained session against a seeded in-process store.
    Demo,
}

impl EngineMode {
    pub fn is_demo(&self) -> bool {
        matches!(self, EngineMode::Demo)
    }
}

#[derive(Default)]
pub(crate) struct Collections {
    pub companies: Vec<Company>,
    pub units: Vec<Unit>,
    pub users: Vec<User>,
    pub requests: Vec<RequestTicket>,
    pub comments: Vec<Comment>,
}

/// Everything tied to one attached session. Dropped wholesale on
/// teardown; the subscriptions unsubscribe on drop.
struct Runtime {
    mode: EngineMode,
    adapter: StoreAdapter,
    subscriptions: Vec<Subscription>,
}

pub(crate) struct EngineInner {
    pub(crate) collections: RwLock<Collections>,
    runtime: RwLock<Option<Runtime>>,
    flags: watch::Sender<EngineFlags>,
    pub(crate) events: EventBus,
    /// Session epoch. Bumped on every attach and teardown; pump tasks
    /// carry the epoch they were spawned under and drop any batch that
    /// arrives after it has moved on.
    epoch: AtomicU64,
}

impl EngineInner {
    fn set_flags(&self, mutate: impl FnOnce(&mut EngineFlags)) {
        self.flags.send_modify(mutate);
    }

    fn epoch_is(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Client-side synchronization engine. Cheap to clone via `Arc`.
pub struct SyncEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new() -> Self {
        let (flags, _) = watch::channel(EngineFlags::idle());
        Self {
            inner: Arc::new(EngineInner {
                collections: RwLock::new(Collections::default()),
                runtime: RwLock::new(None),
                flags,
                events: EventBus::new(),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Start a live session against a tenant's remote store.
    ///
    /// Any previous session is torn down first. When the store cannot be
    /// reached the engine publishes the failure flags (disconnected, not
    /// loading, setup pending) — the caller keeps the profile and may
    /// retry or fall back.
    pub async fn start(&self, profile: TenantProfile) -> Result<(), EngineError> {
        self.stop().await;

        let store = match RemoteStore::connect(profile.remote_config()).await {
            Ok(store) => Arc::new(store),
            Err(error) => {
                tracing::error!(slug = %profile.slug, %error, "Tenant store unreachable");
                self.inner.set_flags(|f| *f = EngineFlags::failed());
                return Err(error.into());
            }
        };

        self.attach(EngineMode::Connected(profile), store).await;
        Ok(())
    }

    /// Start a session against an already-constructed store. Backs the
    /// test suite and any embedded deployment that brings its own store.
    pub async fn start_with_store(&self, mode: EngineMode, store: Arc<dyn DocumentStore>) {
        self.stop().await;
        self.attach(mode, store).await;
    }

    /// Start a self-contained demo session against a seeded in-process
    /// store. Everything behaves as in a live session — same adapter,
    /// same subscriptions, same mutation paths — but nothing leaves the
    /// process and the data is discarded on stop.
    pub async fn enable_demo_mode(&self) {
        let store = Arc::new(deskline_store::MemoryStore::new());
        seed_demo(&StoreAdapter::new(store.clone())).await;
        self.start_with_store(EngineMode::Demo, store).await;
    }

    /// Tear down the current session: cancel every subscription, bump
    /// the epoch so in-flight pushes are discarded, clear the mirrors.
    pub async fn stop(&self) {
        let previous = self.inner.runtime.write().await.take();
        if let Some(runtime) = previous {
            for subscription in &runtime.subscriptions {
                subscription.unsubscribe();
            }
            tracing::info!(demo = runtime.mode.is_demo(), "Session stopped");
        }
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        *self.inner.collections.write().await = Collections::default();
        self.inner.set_flags(|f| *f = EngineFlags::idle());
    }

    async fn attach(&self, mode: EngineMode, store: Arc<dyn DocumentStore>) {
        let adapter = StoreAdapter::new(store);
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let demo = mode.is_demo();

        let connection = adapter.watch_connection();
        self.inner
            .set_flags(|f| *f = EngineFlags::starting(*connection.borrow()));

        let mut subscriptions = Vec::with_capacity(5);

        let (sub, rx) = adapter.subscribe::<Company>();
        subscriptions.push(sub);
        tokio::spawn(companies_pump(Arc::clone(&self.inner), epoch, rx));

        let (sub, rx) = adapter.subscribe::<Unit>();
        subscriptions.push(sub);
        tokio::spawn(units_pump(Arc::clone(&self.inner), epoch, rx));

        let (sub, rx) = adapter.subscribe::<User>();
        subscriptions.push(sub);
        tokio::spawn(users_pump(Arc::clone(&self.inner), epoch, demo, rx));

        let (sub, rx) = adapter.subscribe_recent::<RequestTicket>(RECENT_REQUESTS_LIMIT);
        subscriptions.push(sub);
        tokio::spawn(requests_pump(Arc::clone(&self.inner), epoch, rx));

        let (sub, rx) = adapter.subscribe_recent::<Comment>(RECENT_COMMENTS_LIMIT);
        subscriptions.push(sub);
        tokio::spawn(comments_pump(Arc::clone(&self.inner), epoch, rx));

        tokio::spawn(connection_pump(Arc::clone(&self.inner), epoch, connection));

        *self.inner.runtime.write().await = Some(Runtime {
            mode,
            adapter,
            subscriptions,
        });
        tracing::info!(demo, "Session started");
    }

    // -- session introspection ----------------------------------------------

    /// Current flags snapshot.
    pub fn flags(&self) -> EngineFlags {
        *self.inner.flags.borrow()
    }

    /// Live flags stream.
    pub fn watch_flags(&self) -> watch::Receiver<EngineFlags> {
        self.inner.flags.subscribe()
    }

    /// Subscribe to engine events (new requests, new comments).
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// The current session's mode, if one is attached.
    pub async fn mode(&self) -> Option<EngineMode> {
        self.inner
            .runtime
            .read()
            .await
            .as_ref()
            .map(|runtime| runtime.mode.clone())
    }

    pub(crate) async fn adapter(&self) -> Result<StoreAdapter, EngineError> {
        self.inner
            .runtime
            .read()
            .await
            .as_ref()
            .map(|runtime| runtime.adapter.clone())
            .ok_or(EngineError::NotStarted)
    }

    // -- views --------------------------------------------------------------

    pub async fn companies(&self) -> Vec<Company> {
        self.inner.collections.read().await.companies.clone()
    }

    pub async fn units(&self) -> Vec<Unit> {
        self.inner.collections.read().await.units.clone()
    }

    pub async fn users(&self) -> Vec<User> {
        self.inner.collections.read().await.users.clone()
    }

    /// All mirrored requests, most recently active first. Ties keep
    /// arrival order (the sort is stable).
    pub async fn sorted_requests(&self) -> Vec<RequestTicket> {
        let mut requests = self.inner.collections.read().await.requests.clone();
        requests.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
        requests
    }

    /// Requests scoped to one unit, most recently active first.
    pub async fn requests_for_unit(&self, unit_id: &str) -> Vec<RequestTicket> {
        let mut requests = self.sorted_requests().await;
        requests.retain(|r| r.unit_id == unit_id);
        requests
    }

    /// Requests scoped to one company, most recently active first.
    pub async fn requests_for_company(&self, company_id: &str) -> Vec<RequestTicket> {
        let mut requests = self.sorted_requests().await;
        requests.retain(|r| r.company_id == company_id);
        requests
    }

    pub async fn request(&self, id: &str) -> Option<RequestTicket> {
        self.inner
            .collections
            .read()
            .await
            .requests
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// All mirrored comments in chronological order.
    pub async fn sorted_comments(&self) -> Vec<Comment> {
        let mut comments = self.inner.collections.read().await.comments.clone();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        comments
    }

    /// One ticket's comment thread in chronological order, with internal
    /// comments filtered out for roles that must not see them.
    pub async fn comments_for_request(&self, request_id: &str, viewer: Role) -> Vec<Comment> {
        let mut comments: Vec<Comment> = self
            .inner
            .collections
            .read()
            .await
            .comments
            .iter()
            .filter(|c| c.request_id == request_id)
            .filter(|c| !c.is_internal || viewer.sees_internal_comments())
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        comments
    }

    pub async fn user_by_id(&self, id: &str) -> Option<User> {
        self.inner
            .collections
            .read()
            .await
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Demo data
// ---------------------------------------------------------------------------

/// Email of the pre-provisioned demo administrator. The hosting binary
/// registers this identity with its demo identity provider.
pub const DEMO_ADMIN_EMAIL: &str = "demo@deskline.app";
pub const DEMO_ADMIN_PASSWORD: &str = "demo-password";

/// Seed a just-created store with the minimum demo tenant: one company,
/// the default unit, and the demo administrator. Requests and comments
/// start empty; the demo tells its story through what the user does,
/// not through canned history. Seed failures are logged and skipped.
async fn seed_demo(adapter: &StoreAdapter) {
    let company = Company {
        id: "demo-co".into(),
        name: "Acme Facilities".into(),
    };
    let unit = Unit {
        id: "demo-unit".into(),
        company_id: company.id.clone(),
        name: crate::mutations::DEFAULT_UNIT_NAME.into(),
        location: String::new(),
    };
    let admin = User {
        id: "demo-admin".into(),
        company_id: company.id.clone(),
        unit_id: None,
        name: "Demo Admin".into(),
        email: DEMO_ADMIN_EMAIL.into(),
        role: Role::Admin,
        external_id: None,
    };

    seed(adapter, &company).await;
    seed(adapter, &unit).await;
    seed(adapter, &admin).await;
}

async fn seed<T: Record>(adapter: &StoreAdapter, record: &T) {
    if let Err(error) = adapter.set(record).await {
        tracing::warn!(collection = T::COLLECTION, id = record.id(), %error, "Demo seed failed");
    }
}

// ---------------------------------------------------------------------------
// Pumps
// ---------------------------------------------------------------------------
//
// One task per collection, fed by the adapter subscription. The receiver
// closes when the subscription is cancelled, so a pump's natural end is
// `recv() == None`; the epoch check additionally drops batches that were
// already in flight when the session changed.

async fn companies_pump(
    inner: Arc<EngineInner>,
    epoch: u64,
    mut rx: mpsc::UnboundedReceiver<Vec<Company>>,
) {
    while let Some(batch) = rx.recv().await {
        if !inner.epoch_is(epoch) {
            break;
        }
        inner.collections.write().await.companies = batch;
    }
}

async fn units_pump(
    inner: Arc<EngineInner>,
    epoch: u64,
    mut rx: mpsc::UnboundedReceiver<Vec<Unit>>,
) {
    while let Some(batch) = rx.recv().await {
        if !inner.epoch_is(epoch) {
            break;
        }
        inner.collections.write().await.units = batch;
    }
}

async fn users_pump(
    inner: Arc<EngineInner>,
    epoch: u64,
    demo: bool,
    mut rx: mpsc::UnboundedReceiver<Vec<User>>,
) {
    while let Some(batch) = rx.recv().await {
        if !inner.epoch_is(epoch) {
            break;
        }
        let setup_done = demo || !batch.is_empty();
        inner.collections.write().await.users = batch;
        inner.set_flags(|f| {
            f.loading = false;
            f.setup_done = setup_done;
        });
        inner.events.publish(EngineEvent::new(EventKind::UsersChanged));
    }
}

async fn requests_pump(
    inner: Arc<EngineInner>,
    epoch: u64,
    mut rx: mpsc::UnboundedReceiver<Vec<RequestTicket>>,
) {
    // The first batch is the pre-existing state; only later arrivals are
    // news.
    let mut primed = false;
    while let Some(batch) = rx.recv().await {
        if !inner.epoch_is(epoch) {
            break;
        }
        let mut collections = inner.collections.write().await;
        let known: HashSet<String> = collections.requests.iter().map(|r| r.id.clone()).collect();
        let fresh: Vec<EngineEvent> = if primed {
            batch
                .iter()
                .filter(|r| !known.contains(&r.id))
                .map(|r| {
                    EngineEvent::new(EventKind::RequestAppeared)
                        .with_entity(r.id.clone())
                        .with_payload(json!({
                            "title": r.title,
                            "unitId": r.unit_id,
                            "creatorId": r.creator_id,
                        }))
                })
                .collect()
        } else {
            Vec::new()
        };
        collections.requests = batch;
        drop(collections);

        primed = true;
        for event in fresh {
            inner.events.publish(event);
        }
    }
}

async fn comments_pump(
    inner: Arc<EngineInner>,
    epoch: u64,
    mut rx: mpsc::UnboundedReceiver<Vec<Comment>>,
) {
    let mut primed = false;
    while let Some(batch) = rx.recv().await {
        if !inner.epoch_is(epoch) {
            break;
        }
        let mut collections = inner.collections.write().await;
        let known: HashSet<String> = collections.comments.iter().map(|c| c.id.clone()).collect();
        let fresh: Vec<EngineEvent> = if primed {
            batch
                .iter()
                .filter(|c| !known.contains(&c.id))
                .map(|c| {
                    EngineEvent::new(EventKind::CommentAppeared)
                        .with_entity(c.id.clone())
                        .with_payload(json!({
                            "requestId": c.request_id,
                            "userId": c.user_id,
                            "isInternal": c.is_internal,
                        }))
                })
                .collect()
        } else {
            Vec::new()
        };
        collections.comments = batch;
        drop(collections);

        primed = true;
        for event in fresh {
            inner.events.publish(event);
        }
    }
}

async fn connection_pump(inner: Arc<EngineInner>, epoch: u64, mut rx: watch::Receiver<bool>) {
    loop {
        if rx.changed().await.is_err() {
            break;
        }
        let connected = *rx.borrow_and_update();
        if !inner.epoch_is(epoch) {
            break;
        }
        tracing::debug!(connected, "Store connectivity changed");
        inner.set_flags(|f| f.connected = connected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_store::MemoryStore;

    async fn settle() {
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    }

    fn user(id: &str, email: &str) -> User {
        User {
            id: id.into(),
            company_id: "c1".into(),
            unit_id: None,
            name: "Admin".into(),
            email: email.into(),
            role: Role::Admin,
            external_id: None,
        }
    }

    #[tokio::test]
    async fn idle_engine_reports_no_session() {
        let engine = SyncEngine::new();
        assert!(engine.mode().await.is_none());
        assert!(!engine.flags().connected);
        assert!(!engine.flags().loading);
        assert!(engine.adapter().await.is_err());
    }

    #[tokio::test]
    async fn failed_open_reports_setup_pending() {
        let engine = SyncEngine::new();
        let profile = crate::tenant::TenantProfile {
            slug: "t".into(),
            endpoint: "ws://127.0.0.1:9".into(),
            api_key: "k".into(),
            project_id: "p".into(),
            upload: None,
        };
        assert!(engine.start(profile).await.is_err());

        let flags = engine.flags();
        assert!(!flags.connected);
        assert!(!flags.loading);
        assert!(!flags.setup_done, "failed open must leave setup pending");
    }

    #[tokio::test]
    async fn demo_mode_seeds_an_admin_and_nothing_else() {
        let engine = SyncEngine::new();
        engine.enable_demo_mode().await;
        settle().await;

        assert!(engine.sorted_requests().await.is_empty());
        assert!(engine.sorted_comments().await.is_empty());
        let users = engine.users().await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, DEMO_ADMIN_EMAIL);
        assert_eq!(users[0].role, Role::Admin);
        assert_eq!(engine.units().await.len(), 1);
        assert_eq!(engine.companies().await.len(), 1);
        assert!(engine.flags().setup_done, "demo counts as set up");
    }

    #[tokio::test]
    async fn empty_users_collection_means_setup_pending() {
        let engine = SyncEngine::new();
        let store = Arc::new(MemoryStore::new());
        engine
            .start_with_store(
                EngineMode::Connected(crate::tenant::TenantProfile {
                    slug: "t".into(),
                    endpoint: "wss://unused".into(),
                    api_key: "k".into(),
                    project_id: "p".into(),
                    upload: None,
                }),
                store,
            )
            .await;
        settle().await;

        let flags = engine.flags();
        assert!(!flags.loading, "first users snapshot ends loading");
        assert!(!flags.setup_done, "no users at all means setup pending");
    }

    #[tokio::test]
    async fn users_snapshot_flips_setup_done() {
        let engine = SyncEngine::new();
        let store = Arc::new(MemoryStore::new());
        let adapter = StoreAdapter::new(store.clone() as Arc<dyn DocumentStore>);
        adapter.set(&user("p1", "admin@acme.test")).await.unwrap();

        engine.start_with_store(EngineMode::Demo, store).await;
        settle().await;

        assert!(engine.flags().setup_done);
        assert_eq!(engine.users().await.len(), 1);
    }

    #[tokio::test]
    async fn stop_clears_mirrors_and_discards_late_pushes() {
        let engine = SyncEngine::new();
        let store = Arc::new(MemoryStore::new());
        let adapter = StoreAdapter::new(store.clone() as Arc<dyn DocumentStore>);
        adapter.set(&user("p1", "admin@acme.test")).await.unwrap();

        engine.start_with_store(EngineMode::Demo, store).await;
        settle().await;
        assert_eq!(engine.users().await.len(), 1);

        engine.stop().await;
        assert!(engine.users().await.is_empty());
        assert!(engine.mode().await.is_none());

        // Writes to the old store no longer reach the engine.
        adapter.set(&user("p2", "other@acme.test")).await.unwrap();
        settle().await;
        assert!(engine.users().await.is_empty());
    }

    #[tokio::test]
    async fn switching_stores_never_mixes_tenants() {
        let engine = SyncEngine::new();

        let first = Arc::new(MemoryStore::new());
        let first_adapter = StoreAdapter::new(first.clone() as Arc<dyn DocumentStore>);
        first_adapter.set(&user("p1", "one@acme.test")).await.unwrap();

        engine.start_with_store(EngineMode::Demo, first).await;
        settle().await;
        assert_eq!(engine.users().await.len(), 1);

        let second = Arc::new(MemoryStore::new());
        let second_adapter = StoreAdapter::new(second.clone() as Arc<dyn DocumentStore>);
        second_adapter
            .set(&user("p9", "nine@globex.test"))
            .await
            .unwrap();

        engine.start_with_store(EngineMode::Demo, second).await;
        settle().await;

        let users = engine.users().await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "nine@globex.test");

        // Late writes from the first tenant must not leak in.
        first_adapter.set(&user("p2", "two@acme.test")).await.unwrap();
        settle().await;
        let emails: Vec<_> = engine.users().await.iter().map(|u| u.email.clone()).collect();
        assert_eq!(emails, vec!["nine@globex.test"]);
    }
}

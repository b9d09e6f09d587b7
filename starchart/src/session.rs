//! Map session: the control loop between camera, store and render pool.
//!
//! ```text
//!  ViewportManager ──Settled{rect}──► range_query(store, rect) ──► RenderPool::reconcile
//!        ▲                                                              │
//!        └──────── Locate{coord} ◄── EventBus ◄── Select{id} ◄──────────┘
//!                  (move_to)                      (select)     handlers
//! ```
//!
//! Bus subscriptions hold weak references, so dropping the session releases
//! the viewport and pool even though the bus outlives it.
//!
//! Interaction handlers must be invoked from outside pool and viewport
//! callbacks; both sit behind non-reentrant locks.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::bus::{BusMessage, EventBus, SubscriptionId, Topic};
use crate::geometry::{Point, Rect, Size};
use crate::query::range_query;
use crate::render::{ReconcileReport, RenderPool, Renderer};
use crate::store::EntityStore;
use crate::viewport::{ViewportConfig, ViewportError, ViewportManager};

pub struct MapSession<R: Renderer + 'static> {
    store: EntityStore,
    bus: Arc<EventBus>,
    viewport: Arc<Mutex<ViewportManager>>,
    pool: Arc<Mutex<RenderPool<R>>>,
    subscriptions: Vec<SubscriptionId>,
}

fn reconcile_rect<R: Renderer>(store: &EntityStore, pool: &Mutex<RenderPool<R>>, rect: &Rect) -> ReconcileReport {
    let entities = range_query(store, rect);
    pool.lock().reconcile(&entities)
}

impl<R: Renderer + 'static> MapSession<R> {
    /// Wire a viewport and a render pool over `store` through `bus`.
    pub fn new(
        store: EntityStore,
        bus: Arc<EventBus>,
        config: ViewportConfig,
        screen: Size,
        renderer: R,
    ) -> Self {
        let locate_duration = config.locate_duration;
        let viewport = Arc::new(Mutex::new(ViewportManager::new(
            config,
            screen,
            Arc::clone(&bus),
        )));
        let pool = Arc::new(Mutex::new(RenderPool::new(renderer, Arc::clone(&bus))));

        let mut subscriptions = Vec::with_capacity(3);

        let settled_pool: Weak<Mutex<RenderPool<R>>> = Arc::downgrade(&pool);
        let settled_store = store.clone();
        subscriptions.push(bus.subscribe(Topic::Settled, move |msg| {
            let (BusMessage::Settled { rect }, Some(pool)) = (msg, settled_pool.upgrade()) else {
                return;
            };
            reconcile_rect(&settled_store, &pool, rect);
        }));

        let select_pool = Arc::downgrade(&pool);
        subscriptions.push(bus.subscribe(Topic::Select, move |msg| {
            let (BusMessage::Select { id }, Some(pool)) = (msg, select_pool.upgrade()) else {
                return;
            };
            pool.lock().select(id);
        }));

        let locate_viewport = Arc::downgrade(&viewport);
        subscriptions.push(bus.subscribe(Topic::Locate, move |msg| {
            let (BusMessage::Locate { coord }, Some(viewport)) = (msg, locate_viewport.upgrade())
            else {
                return;
            };
            let result = viewport.lock().move_to(*coord, locate_duration);
            if let Err(e) = result {
                warn!(%coord, error = %e, "Locate ignored");
            }
        }));

        debug!("Map session wired");
        Self {
            store,
            bus,
            viewport,
            pool,
            subscriptions,
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Lock the viewport. Settles triggered through the guard reconcile the
    /// pool synchronously.
    pub fn viewport(&self) -> MutexGuard<'_, ViewportManager> {
        self.viewport.lock()
    }

    pub fn pool(&self) -> MutexGuard<'_, RenderPool<R>> {
        self.pool.lock()
    }

    /// Reconcile against the current query rectangle, picking up entities
    /// synced since the last settle.
    pub fn refresh(&self) -> ReconcileReport {
        let rect = self.viewport.lock().query_rect();
        reconcile_rect(&self.store, &self.pool, &rect)
    }

    pub fn pan(&self, delta: Point) -> Result<Option<Rect>, ViewportError> {
        self.viewport.lock().pan(delta)
    }

    pub fn zoom_by(&self, factor: f64, anchor: Point) -> Result<Option<Rect>, ViewportError> {
        self.viewport.lock().zoom_by(factor, anchor)
    }

    pub fn move_to(&self, target: Point, duration: Duration) -> Result<Option<Rect>, ViewportError> {
        self.viewport.lock().move_to(target, duration)
    }

    pub fn advance(&self, dt: Duration) -> Option<Rect> {
        self.viewport.lock().advance(dt)
    }

    pub fn pointer_down(&self, screen: Point) {
        self.viewport.lock().pointer_down(screen);
    }

    pub fn pointer_move(&self, screen: Point) {
        self.viewport.lock().pointer_move(screen);
    }

    pub fn pointer_up(&self, screen: Point) -> Option<Rect> {
        self.viewport.lock().pointer_up(screen)
    }

    pub fn resize(&self, screen: Size) -> Option<Rect> {
        self.viewport.lock().resize(screen)
    }

    /// Publish `Select` on the bus.
    pub fn select(&self, id: &str) {
        self.bus.publish(BusMessage::Select { id: id.to_string() });
    }

    /// Publish `Locate` on the bus.
    pub fn locate(&self, coord: Point) {
        self.bus.publish(BusMessage::Locate { coord });
    }
}

impl<R: Renderer + 'static> Drop for MapSession<R> {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
    }
}

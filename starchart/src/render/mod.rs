//! Incremental reconciliation of query results against rendered objects.
//!
//! The [`RenderPool`] keeps one [`RenderEntry`] per entity ever displayed.
//! Each reconcile pass compares the current query result with the pool:
//!
//! | Entity in result | Entry exists | Entry shown | Action            |
//! |------------------|--------------|-------------|-------------------|
//! | yes              | no           | -           | create, show      |
//! | yes              | yes          | no          | show              |
//! | yes              | yes          | yes         | nothing           |
//! | yes, changed     | yes          | -           | update (+ show)   |
//! | no               | yes          | yes         | hide              |
//!
//! Entries are never destroyed, so a visual that scrolls off-screen and back
//! keeps its handle and its interaction wiring.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bus::{BusMessage, EventBus};
use crate::entity::Entity;
use crate::geometry::Point;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The entity lacks a field the renderer needs.
    #[error("entity {id} is missing display field '{field}'")]
    MissingField { id: String, field: String },

    /// The renderer failed for another reason.
    #[error("renderer error: {0}")]
    Backend(String),
}

/// Interaction callbacks wired into a visual when it is created.
///
/// A click selects the entity, an activation (double-click, enter) locates
/// it. Both go through the bus.
///
/// The position is shared with the pool entry, so an entity that moves keeps
/// its handlers and `activate` locates its current position.
#[derive(Clone)]
pub struct InteractionHandlers {
    id: String,
    coord: Arc<RwLock<Point>>,
    bus: Arc<EventBus>,
}

impl std::fmt::Debug for InteractionHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionHandlers")
            .field("id", &self.id)
            .field("coord", &*self.coord.read())
            .finish()
    }
}

impl InteractionHandlers {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Publish `Select` for this entity.
    pub fn click(&self) {
        self.bus.publish(BusMessage::Select {
            id: self.id.clone(),
        });
    }

    /// Publish `Locate` for this entity's position.
    pub fn activate(&self) {
        let coord = *self.coord.read();
        self.bus.publish(BusMessage::Locate { coord });
    }
}

/// Display backend creating and toggling visuals.
pub trait Renderer: Send {
    /// Visual handle owned by the pool.
    type Handle: Send;

    /// Instantiate a visual for `entity`, wiring `handlers` into it.
    fn create(
        &mut self,
        entity: &Entity,
        handlers: InteractionHandlers,
    ) -> Result<Self::Handle, RenderError>;

    /// Refresh a visual after its entity changed in the store.
    fn update(&mut self, _handle: &mut Self::Handle, _entity: &Entity) {}

    fn show(&mut self, handle: &mut Self::Handle);

    fn hide(&mut self, handle: &mut Self::Handle);

    fn set_highlight(&mut self, handle: &mut Self::Handle, highlighted: bool);
}

/// A pooled visual.
#[derive(Debug)]
pub struct RenderEntry<H> {
    pub id: String,
    pub handle: H,
    pub shown: bool,
    /// Entity as last rendered.
    entity: Entity,
    coord: Arc<RwLock<Point>>,
}

/// Counts from one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub shown: usize,
    pub hidden: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl ReconcileReport {
    /// Whether the pass changed anything on screen.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.shown == 0 && self.hidden == 0 && self.updated == 0
    }
}

/// Persistent pool of rendered entities.
pub struct RenderPool<R: Renderer> {
    renderer: R,
    entries: HashMap<String, RenderEntry<R::Handle>>,
    selected: Option<String>,
    bus: Arc<EventBus>,
}

impl<R: Renderer> RenderPool<R> {
    pub fn new(renderer: R, bus: Arc<EventBus>) -> Self {
        Self {
            renderer,
            entries: HashMap::new(),
            selected: None,
            bus,
        }
    }

    /// Bring the pool in line with `entities`.
    pub fn reconcile(&mut self, entities: &[Entity]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut present: HashSet<&str> = HashSet::with_capacity(entities.len());

        for entity in entities {
            if let Err(e) = entity.validate_display() {
                warn!(error = %e, "Skipping entity without display fields");
                report.skipped += 1;
                continue;
            }
            if !present.insert(entity.id.as_str()) {
                continue;
            }

            if let Some(entry) = self.entries.get_mut(&entity.id) {
                if entry.entity != *entity {
                    self.renderer.update(&mut entry.handle, entity);
                    *entry.coord.write() = entity.position();
                    entry.entity = entity.clone();
                    report.updated += 1;
                }
                if !entry.shown {
                    self.renderer.show(&mut entry.handle);
                    entry.shown = true;
                    report.shown += 1;
                }
                continue;
            }

            let coord = Arc::new(RwLock::new(entity.position()));
            let handlers = InteractionHandlers {
                id: entity.id.clone(),
                coord: Arc::clone(&coord),
                bus: Arc::clone(&self.bus),
            };
            match self.renderer.create(entity, handlers) {
                Ok(mut handle) => {
                    self.renderer.show(&mut handle);
                    if self.selected.as_deref() == Some(entity.id.as_str()) {
                        self.renderer.set_highlight(&mut handle, true);
                    }
                    self.entries.insert(
                        entity.id.clone(),
                        RenderEntry {
                            id: entity.id.clone(),
                            handle,
                            shown: true,
                            entity: entity.clone(),
                            coord,
                        },
                    );
                    report.created += 1;
                }
                Err(e) => {
                    warn!(id = %entity.id, error = %e, "Renderer rejected entity");
                    report.skipped += 1;
                }
            }
        }

        for entry in self.entries.values_mut() {
            if entry.shown && !present.contains(entry.id.as_str()) {
                self.renderer.hide(&mut entry.handle);
                entry.shown = false;
                report.hidden += 1;
            }
        }

        debug!(
            created = report.created,
            shown = report.shown,
            hidden = report.hidden,
            updated = report.updated,
            skipped = report.skipped,
            pool = self.entries.len(),
            "Reconciled"
        );
        report
    }

    /// Highlight `id`, clearing the previous selection.
    ///
    /// An id without an entry is remembered and highlighted once created.
    pub fn select(&mut self, id: &str) {
        if self.selected.as_deref() == Some(id) {
            return;
        }
        self.clear_selection();
        if let Some(entry) = self.entries.get_mut(id) {
            self.renderer.set_highlight(&mut entry.handle, true);
        }
        self.selected = Some(id.to_string());
    }

    /// Remove the highlight from the current selection.
    pub fn clear_selection(&mut self) {
        if let Some(previous) = self.selected.take() {
            if let Some(entry) = self.entries.get_mut(&previous) {
                self.renderer.set_highlight(&mut entry.handle, false);
            }
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn entry(&self, id: &str) -> Option<&RenderEntry<R::Handle>> {
        self.entries.get(id)
    }

    pub fn is_shown(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(|e| e.shown)
    }

    /// Total pooled entries, shown or hidden.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn shown_count(&self) -> usize {
        self.entries.values().filter(|e| e.shown).count()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bus::Topic;
    use crate::entity::EntityKind;
    use parking_lot::Mutex;

    /// Renderer recording every call, keyed by entity id.
    #[derive(Default)]
    pub(crate) struct RecordingRenderer {
        pub created: Vec<String>,
        pub highlighted: HashSet<String>,
        pub handlers: HashMap<String, InteractionHandlers>,
        pub reject: HashSet<String>,
        pub updated: Vec<String>,
    }

    pub(crate) struct TestHandle {
        id: String,
        pub visible: bool,
    }

    impl Renderer for RecordingRenderer {
        type Handle = TestHandle;

        fn create(
            &mut self,
            entity: &Entity,
            handlers: InteractionHandlers,
        ) -> Result<TestHandle, RenderError> {
            if self.reject.contains(&entity.id) {
                return Err(RenderError::MissingField {
                    id: entity.id.clone(),
                    field: "name".to_string(),
                });
            }
            self.created.push(entity.id.clone());
            self.handlers.insert(entity.id.clone(), handlers);
            Ok(TestHandle {
                id: entity.id.clone(),
                visible: false,
            })
        }

        fn update(&mut self, handle: &mut TestHandle, entity: &Entity) {
            assert_eq!(handle.id, entity.id);
            self.updated.push(entity.id.clone());
        }

        fn show(&mut self, handle: &mut TestHandle) {
            handle.visible = true;
        }

        fn hide(&mut self, handle: &mut TestHandle) {
            handle.visible = false;
        }

        fn set_highlight(&mut self, handle: &mut TestHandle, highlighted: bool) {
            if highlighted {
                self.highlighted.insert(handle.id.clone());
            } else {
                self.highlighted.remove(&handle.id);
            }
        }
    }

    fn star(id: &str, x: f64) -> Entity {
        Entity::new(id, x, x, EntityKind::WhiteDwarf)
    }

    fn pool() -> RenderPool<RecordingRenderer> {
        RenderPool::new(RecordingRenderer::default(), Arc::new(EventBus::new()))
    }

    #[test]
    fn test_reconcile_creates_then_hides_then_reshows() {
        let mut pool = pool();

        let first = pool.reconcile(&[star("A", 0.0), star("B", 1.0)]);
        assert_eq!(first.created, 2);

        let second = pool.reconcile(&[star("B", 1.0)]);
        assert_eq!(second.hidden, 1);
        assert!(!pool.is_shown("A"));
        assert!(!pool.entry("A").unwrap().handle.visible);

        let third = pool.reconcile(&[star("A", 0.0), star("B", 1.0)]);
        assert_eq!(third.shown, 1);
        assert_eq!(third.created, 0);
        assert!(pool.entry("A").unwrap().handle.visible);
        assert_eq!(pool.renderer().created, vec!["A", "B"]);
    }

    #[test]
    fn test_reconcile_same_set_is_noop() {
        let mut pool = pool();
        pool.reconcile(&[star("A", 0.0)]);
        assert!(pool.reconcile(&[star("A", 0.0)]).is_noop());
    }

    #[test]
    fn test_reconcile_skips_invalid_and_rejected() {
        let mut renderer = RecordingRenderer::default();
        renderer.reject.insert("BAD".to_string());
        let mut pool = RenderPool::new(renderer, Arc::new(EventBus::new()));

        let report = pool.reconcile(&[
            star("A", 0.0),
            Entity::new("NAN", f64::NAN, 0.0, EntityKind::Nebula),
            star("BAD", 2.0),
            star("C", 3.0),
        ]);

        assert_eq!(report.created, 2);
        assert_eq!(report.skipped, 2);
        assert!(pool.is_shown("A") && pool.is_shown("C"));
        assert!(pool.entry("BAD").is_none());
    }

    #[test]
    fn test_duplicate_ids_in_result_create_once() {
        let mut pool = pool();
        let report = pool.reconcile(&[star("A", 0.0), star("A", 0.0)]);
        assert_eq!(report.created, 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_select_moves_highlight() {
        let mut pool = pool();
        pool.reconcile(&[star("A", 0.0), star("B", 1.0)]);

        pool.select("A");
        pool.select("B");
        assert_eq!(pool.selected(), Some("B"));
        assert_eq!(
            pool.renderer().highlighted,
            HashSet::from(["B".to_string()])
        );

        pool.clear_selection();
        assert!(pool.renderer().highlighted.is_empty());
        assert_eq!(pool.selected(), None);
    }

    #[test]
    fn test_select_before_creation_highlights_on_create() {
        let mut pool = pool();
        pool.select("LATER");
        assert!(pool.renderer().highlighted.is_empty());

        pool.reconcile(&[star("LATER", 0.0)]);
        assert!(pool.renderer().highlighted.contains("LATER"));
    }

    #[test]
    fn test_handlers_publish_on_bus() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        for topic in [Topic::Select, Topic::Locate] {
            let sink = Arc::clone(&log);
            bus.subscribe(topic, move |msg| sink.lock().push(msg.clone()));
        }
        let mut pool = RenderPool::new(RecordingRenderer::default(), Arc::clone(&bus));
        pool.reconcile(&[star("A", 7.0)]);

        let handlers = pool.renderer().handlers["A"].clone();
        handlers.click();
        handlers.activate();

        assert_eq!(
            *log.lock(),
            vec![
                BusMessage::Select { id: "A".into() },
                BusMessage::Locate {
                    coord: Point::new(7.0, 7.0)
                },
            ]
        );
    }

    #[test]
    fn test_moved_entity_updates_visual_and_locate_target() {
        let bus = Arc::new(EventBus::new());
        let locates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&locates);
        bus.subscribe(Topic::Locate, move |msg| sink.lock().push(msg.clone()));
        let mut pool = RenderPool::new(RecordingRenderer::default(), Arc::clone(&bus));

        pool.reconcile(&[star("A", 1.0)]);
        let report = pool.reconcile(&[star("A", 4.0)]);

        assert_eq!(report.updated, 1);
        assert_eq!(report.created, 0);
        assert_eq!(pool.renderer().created, vec!["A"]);
        assert_eq!(pool.renderer().updated, vec!["A"]);

        // Handlers wired at creation follow the new position
        pool.renderer().handlers["A"].activate();
        assert_eq!(
            *locates.lock(),
            vec![BusMessage::Locate {
                coord: Point::new(4.0, 4.0)
            }]
        );

        // Unchanged entity: no further update
        assert!(pool.reconcile(&[star("A", 4.0)]).is_noop());
    }

    #[test]
    fn test_hidden_entity_changed_while_offscreen_is_updated_on_return() {
        let mut pool = pool();
        pool.reconcile(&[star("A", 1.0)]);
        pool.reconcile(&[]);

        let report = pool.reconcile(&[star("A", 2.0)]);
        assert_eq!(report.updated, 1);
        assert_eq!(report.shown, 1);
        assert!(pool.entry("A").unwrap().handle.visible);
    }
}

//! Entities and their components.
//!
//! An entity is a schema-less attribute bag plus a list of behavior
//! components kept in ascending [`Phase`] order. Each simulation tick the
//! entity runs every component once, in that order.
//!
//! Mid-tick attachment: during [`Entity::update`] only the component that is
//! currently running is taken out of its slot, so siblings stay visible to
//! [`Entity::get_component`]. A component attached during the sweep is
//! initialized immediately but parked until the sweep ends, so it first runs
//! on the next tick.
//!
//! The `id` attribute always mirrors [`Entity::id`]; attribute writers cannot
//! change it.

use std::collections::VecDeque;
use std::fmt;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::{EventNode, Observable};
use crate::sorted_list::SortedList;

/// Attribute bag. Keys are free-form; values are tagged JSON values.
pub type Attributes = Map<String, Value>;

/// Opaque entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        EntityId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Simulation sub-stage of a component. Lower phases run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Phase(pub u8);

impl Phase {
    pub const INPUT: Phase = Phase(0);
    pub const LOGIC: Phase = Phase(10);
    pub const PHYSICS: Phase = Phase(20);
    pub const SYNC: Phase = Phase(30);
}

/// Per-tick data handed to every component update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameContext {
    pub tick: u64,
    pub dt: f32,
    /// Playable area width.
    pub width: f64,
    /// Playable area height.
    pub height: f64,
}

/// Behavior unit attached to an entity.
///
/// The owning entity is passed into `init` and `update` rather than stored.
/// `phase` must return the same value for as long as the component is
/// attached.
pub trait Component: Send {
    fn key(&self) -> &str;

    fn phase(&self) -> Phase;

    /// Called exactly once, when the component is attached.
    fn init(&mut self, _owner: &mut Entity) {}

    /// Called once per tick while attached.
    fn update(&mut self, owner: &mut Entity, game: &GameContext) -> anyhow::Result<()>;
}

/// Position in the component list. `component` is empty only while that
/// component is running.
struct Slot {
    key: String,
    phase: Phase,
    component: Option<Box<dyn Component>>,
}

impl Slot {
    fn new(component: Box<dyn Component>) -> Self {
        Self {
            key: component.key().to_string(),
            phase: component.phase(),
            component: Some(component),
        }
    }
}

type ComponentList = SortedList<Slot>;

fn component_list() -> ComponentList {
    SortedList::new(|a: &Slot, b: &Slot| a.phase < b.phase)
}

/// Simulated game object.
pub struct Entity {
    id: EntityId,
    attributes: Attributes,
    components: ComponentList,
    /// Attached during the current sweep, merged when it ends.
    parked: Vec<Box<dyn Component>>,
    updating: bool,
    /// Reported state waiting for the next tick.
    state: VecDeque<Attributes>,
    events: EventNode,
}

impl Entity {
    /// Creates an entity. The id is mirrored into the `id` attribute.
    pub fn new(id: EntityId, mut attributes: Attributes) -> Self {
        attributes.insert("id".to_string(), Value::String(id.0.clone()));
        Self {
            id,
            attributes,
            components: component_list(),
            parked: Vec::new(),
            updating: false,
            state: VecDeque::new(),
            events: EventNode::new(),
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Runs every component once, in phase order.
    ///
    /// Stops at the first failing component; the error names it. The
    /// component list is left intact either way.
    pub fn update(&mut self, game: &GameContext) -> anyhow::Result<()> {
        let outer = std::mem::replace(&mut self.updating, true);

        let mut result = Ok(());
        for i in 0..self.components.len() {
            let Some(mut component) = self.components.get_mut(i).and_then(|s| s.component.take())
            else {
                continue;
            };
            let outcome = component.update(self, game);
            if let Some(slot) = self.components.get_mut(i) {
                slot.component = Some(component);
            }
            if let Err(e) = outcome {
                let key = self.components.get(i).map(|s| s.key.clone()).unwrap_or_default();
                result = Err(e).with_context(|| format!("component `{key}` on entity {}", self.id));
                break;
            }
        }

        self.updating = outer;
        if !outer {
            for component in std::mem::take(&mut self.parked) {
                self.components.add(Slot::new(component));
            }
        }
        result
    }

    /// Merges `state` into the attributes and emits `entity.sync`.
    pub fn sync(&mut self, state: Attributes) {
        self.set_attrs(state);
        let snapshot = Value::Object(self.serialize());
        self.events.trigger("entity.sync", &[snapshot]);
    }

    pub fn get_attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Numeric attribute, if present and numeric.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).and_then(Value::as_f64)
    }

    /// Sets one attribute. Writes to `id` are ignored.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        if name != "id" {
            self.attributes.insert(name, value.into());
        }
    }

    /// Shallow overwrite-merge: nested values are replaced wholesale. An `id`
    /// key in `attrs` is ignored.
    pub fn set_attrs(&mut self, attrs: Attributes) {
        for (name, value) in attrs {
            if name != "id" {
                self.attributes.insert(name, value);
            }
        }
    }

    /// Attaches a component: it is initialized with this entity as owner,
    /// then inserted in phase order.
    pub fn add_component(&mut self, mut component: Box<dyn Component>) {
        component.init(self);
        if self.updating {
            self.parked.push(component);
        } else {
            self.components.add(Slot::new(component));
        }
    }

    /// First attached component with `key`. The component that is currently
    /// running does not see itself.
    pub fn get_component(&self, key: &str) -> Option<&dyn Component> {
        self.components
            .iter()
            .find(|s| s.key == key)
            .and_then(|s| s.component.as_deref())
    }

    pub fn get_component_mut(&mut self, key: &str) -> Option<&mut Box<dyn Component>> {
        self.components
            .iter_mut()
            .find(|s| s.key == key)
            .and_then(|s| s.component.as_mut())
    }

    /// Component keys in update order.
    pub fn component_keys(&self) -> Vec<&str> {
        self.components.iter().map(|s| s.key.as_str()).collect()
    }

    /// Emits `entity.die`. Removal from any registry is up to the owner.
    pub fn die(&mut self) {
        self.events.trigger("entity.die", &[]);
    }

    /// Snapshot of the current attributes.
    pub fn serialize(&self) -> Attributes {
        self.attributes.clone()
    }

    /// Queues reported state for the next tick.
    pub fn push_state(&mut self, state: Attributes) {
        self.state.push_back(state);
    }

    /// Takes all queued state, oldest first.
    pub fn drain_state(&mut self) -> Vec<Attributes> {
        self.state.drain(..).collect()
    }

    pub fn pending_state(&self) -> usize {
        self.state.len()
    }
}

impl Observable for Entity {
    fn events(&mut self) -> &mut EventNode {
        &mut self.events
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("components", &self.component_keys())
            .field("pending_state", &self.state.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use serde_json::json;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        key: String,
        phase: Phase,
        log: Log,
    }

    impl Recorder {
        fn boxed(key: &str, phase: Phase, log: &Log) -> Box<dyn Component> {
            Box::new(Recorder {
                key: key.to_string(),
                phase,
                log: Arc::clone(log),
            })
        }
    }

    impl Component for Recorder {
        fn key(&self) -> &str {
            &self.key
        }

        fn phase(&self) -> Phase {
            self.phase
        }

        fn init(&mut self, owner: &mut Entity) {
            self.log
                .lock()
                .unwrap()
                .push(format!("init {} on {}", self.key, owner.id()));
        }

        fn update(&mut self, _owner: &mut Entity, game: &GameContext) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("{}@{}", self.key, game.tick));
            Ok(())
        }
    }

    /// Attaches a recorder the first time it runs.
    struct Spawner {
        log: Log,
        done: bool,
    }

    impl Component for Spawner {
        fn key(&self) -> &str {
            "spawner"
        }

        fn phase(&self) -> Phase {
            Phase::INPUT
        }

        fn update(&mut self, owner: &mut Entity, _game: &GameContext) -> anyhow::Result<()> {
            if !self.done {
                self.done = true;
                owner.add_component(Recorder::boxed("late", Phase::SYNC, &self.log));
            }
            Ok(())
        }
    }

    /// Records whether a sibling is reachable while it runs.
    struct Lookup {
        target: &'static str,
        seen: Arc<Mutex<Vec<(bool, Vec<String>)>>>,
    }

    impl Component for Lookup {
        fn key(&self) -> &str {
            "lookup"
        }

        fn phase(&self) -> Phase {
            Phase::INPUT
        }

        fn update(&mut self, owner: &mut Entity, _game: &GameContext) -> anyhow::Result<()> {
            let found = owner.get_component(self.target).is_some()
                && owner.get_component_mut(self.target).is_some();
            let keys: Vec<String> = owner.component_keys().iter().map(|k| k.to_string()).collect();
            self.seen.lock().unwrap().push((found, keys));
            Ok(())
        }
    }

    struct Failing;

    impl Component for Failing {
        fn key(&self) -> &str {
            "failing"
        }

        fn phase(&self) -> Phase {
            Phase::LOGIC
        }

        fn update(&mut self, _owner: &mut Entity, _game: &GameContext) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    fn ctx(tick: u64) -> GameContext {
        GameContext {
            tick,
            dt: 1.0 / 30.0,
            width: 640.0,
            height: 480.0,
        }
    }

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn new_mirrors_id_attribute() {
        let e = Entity::new(EntityId::new("e1"), attrs(json!({"hp": 3})));
        assert_eq!(e.get_attr("id"), Some(&json!("e1")));
        assert_eq!(e.get_f64("hp"), Some(3.0));
    }

    #[test]
    fn components_update_in_phase_order_with_stable_ties() {
        let log = Log::default();
        let mut e = Entity::new(EntityId::new("e1"), Attributes::new());
        e.add_component(Recorder::boxed("sync", Phase::SYNC, &log));
        e.add_component(Recorder::boxed("input-a", Phase::INPUT, &log));
        e.add_component(Recorder::boxed("physics", Phase::PHYSICS, &log));
        e.add_component(Recorder::boxed("input-b", Phase::INPUT, &log));

        assert_eq!(e.component_keys(), vec!["input-a", "input-b", "physics", "sync"]);

        log.lock().unwrap().clear();
        e.update(&ctx(1)).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["input-a@1", "input-b@1", "physics@1", "sync@1"]
        );
    }

    #[test]
    fn init_runs_once_at_attach_with_owner() {
        let log = Log::default();
        let mut e = Entity::new(EntityId::new("owner-1"), Attributes::new());
        e.add_component(Recorder::boxed("r", Phase::LOGIC, &log));
        e.update(&ctx(1)).unwrap();
        e.update(&ctx(2)).unwrap();

        let inits = log.lock().unwrap().iter().filter(|l| l.starts_with("init")).count();
        assert_eq!(inits, 1);
        assert_eq!(log.lock().unwrap()[0], "init r on owner-1");
    }

    #[test]
    fn component_attached_mid_tick_runs_from_next_tick() {
        let log = Log::default();
        let mut e = Entity::new(EntityId::new("e1"), Attributes::new());
        e.add_component(Box::new(Spawner {
            log: Arc::clone(&log),
            done: false,
        }));

        e.update(&ctx(1)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["init late on e1"]);
        assert_eq!(e.component_keys(), vec!["spawner", "late"]);

        e.update(&ctx(2)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["init late on e1", "late@2"]);
    }

    #[test]
    fn siblings_stay_visible_during_update() {
        let log = Log::default();
        let seen: Arc<Mutex<Vec<(bool, Vec<String>)>>> = Arc::default();
        let mut e = Entity::new(EntityId::new("e1"), Attributes::new());
        e.add_component(Recorder::boxed("physics", Phase::PHYSICS, &log));
        e.add_component(Box::new(Lookup {
            target: "physics",
            seen: Arc::clone(&seen),
        }));
        assert!(e.get_component("physics").is_some());

        e.update(&ctx(1)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0, "physics sibling was hidden during update");
        assert_eq!(seen[0].1, vec!["lookup", "physics"]);
        assert!(e.get_component("lookup").is_some());
    }

    #[test]
    fn failing_component_stops_sweep_and_keeps_list() {
        let log = Log::default();
        let mut e = Entity::new(EntityId::new("e1"), Attributes::new());
        e.add_component(Recorder::boxed("before", Phase::INPUT, &log));
        e.add_component(Box::new(Failing));
        e.add_component(Recorder::boxed("after", Phase::SYNC, &log));
        log.lock().unwrap().clear();

        let err = e.update(&ctx(1)).unwrap_err();
        assert!(format!("{err:#}").contains("failing"));
        assert_eq!(*log.lock().unwrap(), vec!["before@1"]);
        assert_eq!(e.component_keys(), vec!["before", "failing", "after"]);
    }

    #[test]
    fn get_component_finds_first_match_or_none() {
        let log = Log::default();
        let mut e = Entity::new(EntityId::new("e1"), Attributes::new());
        e.add_component(Recorder::boxed("dup", Phase::PHYSICS, &log));
        e.add_component(Recorder::boxed("dup", Phase::INPUT, &log));

        let found = e.get_component("dup").unwrap();
        assert_eq!(found.phase(), Phase::INPUT);
        assert!(e.get_component("missing").is_none());
        assert!(e.get_component_mut("missing").is_none());
    }

    #[test]
    fn set_attrs_overwrites_only_given_keys() {
        let mut e = Entity::new(
            EntityId::new("e1"),
            attrs(json!({"x": 1, "y": 2, "meta": {"a": 1, "b": 2}})),
        );
        e.set_attrs(attrs(json!({"x": 10, "meta": {"a": 5}, "hp": 9})));

        let snap = e.serialize();
        assert_eq!(snap["x"], json!(10));
        assert_eq!(snap["y"], json!(2));
        assert_eq!(snap["meta"], json!({"a": 5}));
        assert_eq!(snap["hp"], json!(9));
        assert_eq!(snap["id"], json!("e1"));
    }

    #[test]
    fn id_attribute_cannot_be_overwritten() {
        let mut e = Entity::new(EntityId::new("e1"), Attributes::new());
        e.set_attr("id", "other");
        e.set_attrs(attrs(json!({"id": "spoof", "x": 1})));
        e.sync(attrs(json!({"id": "again"})));

        assert_eq!(e.serialize()["id"], json!(e.id().as_str()));
        assert_eq!(e.get_f64("x"), Some(1.0));
    }

    #[test]
    fn sync_merges_then_emits_full_snapshot() {
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let mut e = Entity::new(EntityId::new("e1"), attrs(json!({"x": 1, "y": 2})));
        let s = Arc::clone(&seen);
        e.on("entity.sync", move |args| s.lock().unwrap().push(args[0].clone()));

        e.sync(attrs(json!({"x": 4})));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], json!({"id": "e1", "x": 4, "y": 2}));
    }

    #[test]
    fn die_only_emits() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut e = Entity::new(EntityId::new("e1"), attrs(json!({"x": 1})));
        let h = Arc::clone(&hits);
        e.on("entity.die", move |args| {
            assert!(args.is_empty());
            h.fetch_add(1, Ordering::SeqCst);
        });

        e.die();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(e.get_f64("x"), Some(1.0));
    }

    #[test]
    fn state_queue_is_fifo() {
        let mut e = Entity::new(EntityId::new("e1"), Attributes::new());
        e.push_state(attrs(json!({"x": 1})));
        e.push_state(attrs(json!({"x": 2})));
        assert_eq!(e.pending_state(), 2);

        let drained = e.drain_state();
        assert_eq!(drained[0]["x"], json!(1));
        assert_eq!(drained[1]["x"], json!(2));
        assert_eq!(e.pending_state(), 0);
    }
}

//! Components.
//!
//! A [`ComponentDef`] describes a component: its declared props, an
//! optional `setup` producing state bindings or a render function, an
//! optional `data` factory and an optional render function. The renderer
//! turns each mounted component vnode into a [`ComponentInstance`].
//!
//! # Props and Attributes
//!
//! Incoming vnode props are split by the declared prop names. Declared
//! props live in a shallow reactive store that only the parent may change;
//! everything else is passed through as attributes.
//!
//! # Property Resolution
//!
//! Render functions read instance data through an [`InstanceProxy`], which
//! looks a name up in this order: `data()` state, setup state, props, then
//! the public properties `$attrs` and `$props`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::host::HostNode;
use super::vnode::{Props, Slot, VNode};
use crate::error::{Error, Result};
use crate::reactive::{
    reactive, shallow_reactive, Computed, Key, ObjectRef, RawObject, Reactive, ReactiveContext,
    ReactiveEffect, Ref, Value,
};
use crate::scheduler::Job;

pub type SetupFn = Rc<dyn Fn(&Reactive, &SetupContext) -> SetupResult>;
pub type DataFn = Rc<dyn Fn() -> RawObject>;
pub type RenderFn = Rc<dyn Fn(&InstanceProxy) -> VNode>;

/// Static description of a component.
pub struct ComponentDef {
    name: String,
    props: Vec<String>,
    setup: Option<SetupFn>,
    data: Option<DataFn>,
    render: Option<RenderFn>,
}

impl ComponentDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            props: Vec::new(),
            setup: None,
            data: None,
            render: None,
        }
    }

    /// Declare the names accepted as props.
    pub fn props<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.props = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&Reactive, &SetupContext) -> SetupResult + 'static,
    {
        self.setup = Some(Rc::new(setup));
        self
    }

    pub fn data<F>(mut self, data: F) -> Self
    where
        F: Fn() -> RawObject + 'static,
    {
        self.data = Some(Rc::new(data));
        self
    }

    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&InstanceProxy) -> VNode + 'static,
    {
        self.render = Some(Rc::new(render));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_props(&self) -> &[String] {
        &self.props
    }

    fn declares(&self, key: &str) -> bool {
        self.props.iter().any(|p| p == key)
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("props", &self.props)
            .finish()
    }
}

/// What `setup` returned.
pub enum SetupResult {
    /// Named bindings exposed to the render function.
    State(IndexMap<String, Binding>),
    /// The component's render function.
    Render(RenderFn),
    Empty,
}

impl SetupResult {
    pub fn state<I, K>(bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        SetupResult::State(bindings.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn render<F>(render: F) -> Self
    where
        F: Fn(&InstanceProxy) -> VNode + 'static,
    {
        SetupResult::Render(Rc::new(render))
    }
}

/// One entry of setup state. Reading a ref-like binding unwraps it.
#[derive(Clone)]
pub enum Binding {
    Ref(Ref),
    Object(ObjectRef),
    Computed(Computed<Value>),
    Value(Value),
}

impl Binding {
    pub fn get(&self) -> Value {
        match self {
            Binding::Ref(r) => r.get(),
            Binding::Object(r) => r.get(),
            Binding::Computed(c) => c.get(),
            Binding::Value(v) => v.clone(),
        }
    }
}

impl From<Ref> for Binding {
    fn from(r: Ref) -> Self {
        Binding::Ref(r)
    }
}

impl From<ObjectRef> for Binding {
    fn from(r: ObjectRef) -> Self {
        Binding::Object(r)
    }
}

impl From<Computed<Value>> for Binding {
    fn from(c: Computed<Value>) -> Self {
        Binding::Computed(c)
    }
}

impl From<Value> for Binding {
    fn from(v: Value) -> Self {
        Binding::Value(v)
    }
}

/// Split vnode props into declared props and pass-through attributes.
fn split_props(def: &ComponentDef, raw: Option<&Rc<Props>>) -> (Props, Props) {
    let mut props = Props::new();
    let mut attrs = Props::new();
    for (key, value) in raw.into_iter().flat_map(|p| p.iter()) {
        if def.declares(key) {
            props.insert(key.clone(), value.clone());
        } else {
            attrs.insert(key.clone(), value.clone());
        }
    }
    (props, attrs)
}

fn handler_name(event: &str) -> String {
    let mut chars = event.chars();
    match chars.next() {
        Some(first) => format!("on{}{}", first.to_uppercase(), chars.as_str()),
        None => "on".to_owned(),
    }
}

/// Live state of one mounted component.
pub struct ComponentInstance {
    def: Rc<ComponentDef>,
    this: Weak<ComponentInstance>,
    /// Props of the vnode currently rendered, as the parent passed them.
    vnode_props: RefCell<Option<Rc<Props>>>,
    /// Vnode waiting to be applied by the next render.
    next: RefCell<Option<VNode>>,
    sub_tree: RefCell<Option<VNode>>,
    mounted: Cell<bool>,
    unmounted: Cell<bool>,
    props: Reactive,
    attrs: RefCell<RawObject>,
    slots: RefCell<IndexMap<String, Slot>>,
    state: RefCell<Option<Reactive>>,
    setup_state: RefCell<IndexMap<String, Binding>>,
    render: RefCell<Option<RenderFn>>,
    exposed: RefCell<Option<Value>>,
    effect: RefCell<Option<ReactiveEffect<()>>>,
    job: RefCell<Option<Job>>,
    container: Cell<Option<HostNode>>,
    render_count: Cell<u64>,
}

impl ComponentInstance {
    /// Create the instance for `vnode`: initialize props, then run `setup`
    /// and `data` untracked.
    pub(crate) fn create(def: Rc<ComponentDef>, vnode: &VNode) -> Rc<Self> {
        let (props, attrs) = split_props(&def, vnode.props());
        let instance = Rc::new_cyclic(|this| Self {
            def,
            this: this.clone(),
            vnode_props: RefCell::new(vnode.props().cloned()),
            next: RefCell::new(None),
            sub_tree: RefCell::new(None),
            mounted: Cell::new(false),
            unmounted: Cell::new(false),
            props: shallow_reactive(RawObject::record(props)),
            attrs: RefCell::new(RawObject::record(attrs)),
            slots: RefCell::new(vnode.slots().clone()),
            state: RefCell::new(None),
            setup_state: RefCell::new(IndexMap::new()),
            render: RefCell::new(None),
            exposed: RefCell::new(None),
            effect: RefCell::new(None),
            job: RefCell::new(None),
            container: Cell::new(None),
            render_count: Cell::new(0),
        });
        instance.setup();
        instance
    }

    fn setup(&self) {
        if let Some(setup) = self.def.setup.clone() {
            let ctx = SetupContext {
                instance: self.this.clone(),
            };
            let result = ReactiveContext::untracked(|| setup(&self.props, &ctx));
            match result {
                SetupResult::State(bindings) => *self.setup_state.borrow_mut() = bindings,
                SetupResult::Render(render) => *self.render.borrow_mut() = Some(render),
                SetupResult::Empty => {}
            }
        }
        if let Some(data) = self.def.data.clone() {
            let raw = ReactiveContext::untracked(|| data());
            *self.state.borrow_mut() = Some(reactive(raw));
        }
        if self.render.borrow().is_none() {
            *self.render.borrow_mut() = self.def.render.clone();
        }
    }

    pub fn def(&self) -> &Rc<ComponentDef> {
        &self.def
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// The reactive props store.
    pub fn props(&self) -> &Reactive {
        &self.props
    }

    pub fn attrs(&self) -> RawObject {
        self.attrs.borrow().clone()
    }

    pub fn state(&self) -> Option<Reactive> {
        self.state.borrow().clone()
    }

    pub fn exposed(&self) -> Option<Value> {
        self.exposed.borrow().clone()
    }

    pub fn proxy(&self) -> InstanceProxy {
        InstanceProxy {
            instance: self.this.clone(),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    pub fn is_unmounted(&self) -> bool {
        self.unmounted.get()
    }

    /// Number of times the render function has run.
    pub fn render_count(&self) -> u64 {
        self.render_count.get()
    }

    pub fn sub_tree(&self) -> Option<VNode> {
        self.sub_tree.borrow().clone()
    }

    pub fn effect(&self) -> Option<ReactiveEffect<()>> {
        self.effect.borrow().clone()
    }

    pub(crate) fn job(&self) -> Option<Job> {
        self.job.borrow().clone()
    }

    pub(crate) fn install(&self, effect: ReactiveEffect<()>, job: Job, container: HostNode) {
        *self.effect.borrow_mut() = Some(effect);
        *self.job.borrow_mut() = Some(job);
        self.container.set(Some(container));
    }

    pub(crate) fn container(&self) -> Option<HostNode> {
        self.container.get()
    }

    pub(crate) fn set_sub_tree(&self, tree: VNode) {
        let previous = self.sub_tree.replace(Some(tree));
        drop(previous);
    }

    pub(crate) fn mark_mounted(&self) {
        self.mounted.set(true);
    }

    /// Stop rendering. Returns the effect so the caller can drop it outside
    /// any borrow.
    pub(crate) fn mark_unmounted(&self) -> Option<ReactiveEffect<()>> {
        self.unmounted.set(true);
        self.next.borrow_mut().take();
        self.effect.borrow_mut().take()
    }

    pub(crate) fn set_next(&self, next: VNode) {
        *self.next.borrow_mut() = Some(next);
    }

    pub(crate) fn take_next(&self) -> Option<VNode> {
        self.next.borrow_mut().take()
    }

    /// Adopt a new vnode whose props did not change.
    pub(crate) fn adopt(&self, vnode: &VNode) {
        *self.vnode_props.borrow_mut() = vnode.props().cloned();
        *self.slots.borrow_mut() = vnode.slots().clone();
    }

    /// Apply a pending vnode before re-rendering: write changed props key
    /// by key, delete the ones that disappeared, replace attrs and slots.
    pub(crate) fn update_pre_render(&self, next: &VNode) {
        let (props, attrs) = split_props(&self.def, next.props());
        // Props are a record keyed by field names, so these writes never fail.
        for (key, value) in &props {
            if let Err(err) = self.props.set(key.as_str(), value.clone()) {
                debug!(component = %self.name(), prop = %key, %err, "failed to update prop");
            }
        }
        for key in self.props.raw().keys() {
            let Key::Field(name) = &key else {
                continue;
            };
            if props.contains_key(name) {
                continue;
            }
            if let Err(err) = self.props.delete(key.clone()) {
                debug!(component = %self.name(), prop = %name, %err, "failed to remove prop");
            }
        }
        *self.attrs.borrow_mut() = RawObject::record(attrs);
        self.adopt(next);
    }

    /// Run the render function. Without one, renders nothing.
    pub(crate) fn render_tree(&self) -> VNode {
        self.render_count.set(self.render_count.get() + 1);
        let render = self.render.borrow().clone();
        match render {
            Some(render) => render(&self.proxy()),
            None => {
                warn!(component = %self.def.name(), "component has no render function");
                VNode::fragment(Vec::new())
            }
        }
    }

    /// Re-render synchronously.
    pub fn update(&self) {
        let effect = self.effect();
        if let Some(effect) = effect {
            effect.run();
        }
    }

    fn emit(&self, event: &str, args: &[Value]) {
        let name = handler_name(event);
        let handler = self
            .vnode_props
            .borrow()
            .as_ref()
            .and_then(|props| props.get(&name).cloned());
        match handler {
            Some(Value::Func(callback)) => callback.call(args),
            Some(list @ (Value::Object(_) | Value::Reactive(_))) => {
                let Some(raw) = list.as_object() else {
                    return;
                };
                if !raw.is_sequence() {
                    return;
                }
                for key in raw.keys() {
                    if let Some(Value::Func(callback)) = raw.peek(&key) {
                        callback.call(args);
                    }
                }
            }
            _ => {}
        }
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("name", &self.def.name())
            .field("mounted", &self.mounted.get())
            .field("unmounted", &self.unmounted.get())
            .field("render_count", &self.render_count.get())
            .finish()
    }
}

/// Second argument of `setup`.
#[derive(Clone)]
pub struct SetupContext {
    instance: Weak<ComponentInstance>,
}

impl SetupContext {
    /// Attributes that were not declared as props.
    pub fn attrs(&self) -> Option<RawObject> {
        self.instance.upgrade().map(|i| i.attrs())
    }

    pub fn slot(&self, name: &str) -> Option<Slot> {
        self.instance.upgrade()?.slots.borrow().get(name).cloned()
    }

    pub fn slots(&self) -> IndexMap<String, Slot> {
        self.instance
            .upgrade()
            .map(|i| i.slots.borrow().clone())
            .unwrap_or_default()
    }

    /// Call the handler the parent passed as `on<Event>`. A handler may be a
    /// single callback or a sequence of callbacks.
    pub fn emit(&self, event: &str, args: &[Value]) {
        if let Some(instance) = self.instance.upgrade() {
            instance.emit(event, args);
        }
    }

    /// Designate the component's public handle.
    pub fn expose(&self, value: impl Into<Value>) {
        if let Some(instance) = self.instance.upgrade() {
            *instance.exposed.borrow_mut() = Some(value.into());
        }
    }
}

/// Name-based access to a component's data, handed to render functions.
#[derive(Clone)]
pub struct InstanceProxy {
    instance: Weak<ComponentInstance>,
}

impl InstanceProxy {
    /// Resolve `key` against state, setup state, props, then `$attrs` and
    /// `$props`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let instance = self.instance.upgrade()?;
        let field = Key::from(key);

        let state = instance.state();
        if let Some(state) = state.filter(|s| s.raw().contains(&field)) {
            return Some(state.get(field));
        }
        let binding = instance.setup_state.borrow().get(key).cloned();
        if let Some(binding) = binding {
            return Some(binding.get());
        }
        if instance.props.raw().contains(&field) {
            return Some(instance.props.get(field));
        }
        match key {
            "$attrs" => Some(Value::Object(instance.attrs())),
            "$props" => Some(Value::Reactive(instance.props.clone())),
            _ => None,
        }
    }

    /// Write `key`. State and setup state accept writes, props reject them
    /// and unknown names are ignored.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let Some(instance) = self.instance.upgrade() else {
            return Ok(());
        };
        let field = Key::from(key);
        let value = value.into();

        let state = instance.state();
        if let Some(state) = state.filter(|s| s.raw().contains(&field)) {
            state.set(field, value)?;
            return Ok(());
        }
        let binding = instance.setup_state.borrow().get(key).cloned();
        if let Some(binding) = binding {
            match binding {
                Binding::Ref(r) => {
                    r.set(value);
                }
                Binding::Object(r) => {
                    r.set(value)?;
                }
                Binding::Computed(c) => c.set(value),
                Binding::Value(_) => {
                    instance
                        .setup_state
                        .borrow_mut()
                        .insert(key.to_owned(), Binding::Value(value));
                }
            }
            return Ok(());
        }
        if instance.props.raw().contains(&field) {
            warn!(component = %instance.name(), prop = key, "attempted to mutate a prop; props are readonly");
            return Err(Error::ReadonlyProp {
                key: key.to_owned(),
            });
        }
        Ok(())
    }

    pub fn instance(&self) -> Option<Rc<ComponentInstance>> {
        self.instance.upgrade()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Callback;

    fn mount_props(def: ComponentDef, props: Props) -> Rc<ComponentInstance> {
        let def = Rc::new(def);
        let vnode = VNode::component(&def).props(Rc::new(props)).build();
        ComponentInstance::create(def, &vnode)
    }

    fn props_of<const N: usize>(entries: [(&str, Value); N]) -> Props {
        entries.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn props_and_attrs_are_split_by_declaration() {
        let instance = mount_props(
            ComponentDef::new("Card").props(["title"]),
            props_of([("title", Value::from("hi")), ("class", Value::from("big"))]),
        );
        assert_eq!(instance.props().get("title"), Value::from("hi"));
        assert!(!instance.props().raw().contains(&Key::from("class")));
        assert_eq!(instance.attrs().peek(&Key::from("class")), Some(Value::from("big")));
    }

    #[test]
    fn proxy_resolution_order() {
        let def = ComponentDef::new("Order")
            .props(["name", "shared"])
            .setup(|_, _| {
                SetupResult::state([
                    ("shared", Binding::from(Value::from("setup"))),
                    ("count", Binding::from(Ref::new(1))),
                ])
            })
            .data(|| RawObject::record([("shared", Value::from("data"))]));
        let instance = mount_props(
            def,
            props_of([("name", Value::from("prop")), ("shared", Value::from("prop"))]),
        );
        let proxy = instance.proxy();

        assert_eq!(proxy.get("shared"), Some(Value::from("data")));
        assert_eq!(proxy.get("count"), Some(Value::from(1)));
        assert_eq!(proxy.get("name"), Some(Value::from("prop")));
        assert!(matches!(proxy.get("$props"), Some(Value::Reactive(_))));
        assert!(matches!(proxy.get("$attrs"), Some(Value::Object(_))));
        assert_eq!(proxy.get("missing"), None);
    }

    #[test]
    fn proxy_writes_state_and_rejects_props() {
        let def = ComponentDef::new("Writes")
            .props(["name"])
            .setup(|_, _| SetupResult::state([("count", Binding::from(Ref::new(1)))]))
            .data(|| RawObject::record([("open", Value::from(false))]));
        let instance = mount_props(def, props_of([("name", Value::from("a"))]));
        let proxy = instance.proxy();

        assert_eq!(proxy.set("open", true), Ok(()));
        assert_eq!(proxy.get("open"), Some(Value::from(true)));
        assert_eq!(proxy.set("count", 2), Ok(()));
        assert_eq!(proxy.get("count"), Some(Value::from(2)));

        assert_eq!(
            proxy.set("name", "b"),
            Err(Error::ReadonlyProp { key: "name".into() })
        );
        assert_eq!(proxy.get("name"), Some(Value::from("a")));
        assert_eq!(proxy.set("unknown", 1), Ok(()));
    }

    #[test]
    fn emit_calls_capitalised_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let on_change = Callback::new(move |args: &[Value]| sink.borrow_mut().push(args.to_vec()));

        let emitter: Rc<RefCell<Option<SetupContext>>> = Rc::default();
        let slot = emitter.clone();
        let def = ComponentDef::new("Emitter").setup(move |_, ctx| {
            *slot.borrow_mut() = Some(ctx.clone());
            SetupResult::Empty
        });
        let _instance = mount_props(def, props_of([("onChange", Value::from(on_change))]));

        let ctx = emitter.borrow().clone();
        let ctx = ctx.unwrap();
        ctx.emit("change", &[Value::from(1)]);
        ctx.emit("other", &[]);
        assert_eq!(*seen.borrow(), vec![vec![Value::from(1)]]);
    }

    #[test]
    fn emit_calls_every_handler_in_a_sequence() {
        let calls = Rc::new(Cell::new(0));
        let handler = |calls: &Rc<Cell<u32>>| {
            let calls = calls.clone();
            Value::from(Callback::new(move |_| calls.set(calls.get() + 1)))
        };
        let handlers = RawObject::sequence([handler(&calls), handler(&calls)]);

        let emitter: Rc<RefCell<Option<SetupContext>>> = Rc::default();
        let slot = emitter.clone();
        let def = ComponentDef::new("Multi").setup(move |_, ctx| {
            *slot.borrow_mut() = Some(ctx.clone());
            SetupResult::Empty
        });
        let _instance = mount_props(def, props_of([("onSave", Value::from(handlers))]));

        let ctx = emitter.borrow().clone().unwrap();
        ctx.emit("save", &[]);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn pending_vnode_updates_and_removes_props() {
        let def = Rc::new(ComponentDef::new("Card").props(["title", "subtitle"]));
        let first = VNode::component(&def)
            .props(Rc::new(props_of([
                ("title", Value::from("a")),
                ("subtitle", Value::from("b")),
            ])))
            .build();
        let instance = ComponentInstance::create(def.clone(), &first);

        let next = VNode::component(&def)
            .props(Rc::new(props_of([
                ("title", Value::from("c")),
                ("class", Value::from("wide")),
            ])))
            .build();
        instance.update_pre_render(&next);

        assert_eq!(instance.props().get("title"), Value::from("c"));
        assert!(!instance.props().raw().contains(&Key::from("subtitle")));
        assert_eq!(instance.attrs().peek(&Key::from("class")), Some(Value::from("wide")));
    }

    #[test]
    fn missing_render_function_renders_nothing() {
        let instance = mount_props(ComponentDef::new("Empty"), Props::new());
        let tree = instance.render_tree();
        assert!(matches!(tree.children(), crate::render::Children::List(list) if list.is_empty()));
    }
}

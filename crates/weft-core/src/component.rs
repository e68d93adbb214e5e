//! User-defined units and their constructors.
//!
//! A unit is anything implementing [`Component`]. Class-like units also
//! implement [`ComponentClass`], which carries the static metadata the
//! reconciler needs before an instance exists (its name and the context keys
//! it reads or provides). [`ComponentType`] erases all of that into a value
//! that descriptors can carry and compare.

use std::any::TypeId;
use std::fmt;
use std::rc::Rc;

use crate::descriptor::Descriptor;
use crate::error::{Error, HookName};
use crate::value::{Context, Props, Record};

pub use crate::update_queue::ComponentHandle;

bitflags::bitflags! {
    /// Lifecycle hooks a unit implements. Queried once when the unit is
    /// constructed; hooks not listed here are never invoked.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Hooks: u16 {
        const BEFORE_MOUNT = 1 << 0;
        const AFTER_MOUNT = 1 << 1;
        const RECEIVE_PROPS = 1 << 2;
        const SHOULD_UPDATE = 1 << 3;
        const BEFORE_UPDATE = 1 << 4;
        const AFTER_UPDATE = 1 << 5;
        const WILL_UNMOUNT = 1 << 6;
        /// Error boundary: mount failures below this unit are handed to
        /// [`Component::on_error`] and the subtree is rendered once more.
        const ON_ERROR = 1 << 7;
        const CHILD_CONTEXT = 1 << 8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeKind {
    Stateful,
    /// Skips updates when props and state are shallowly equal.
    Pure,
    /// A plain render function wrapped in an adapter.
    Functional,
}

/// Props, state and masked context of a unit at one point in time.
#[derive(Clone, Debug, Default)]
pub struct View {
    pub props: Props,
    pub state: Option<Record>,
    pub context: Context,
}

/// What a hook sees of its own instance.
pub struct Cx<'a> {
    view: &'a View,
    handle: &'a ComponentHandle,
}

impl<'a> Cx<'a> {
    pub(crate) fn new(view: &'a View, handle: &'a ComponentHandle) -> Self {
        Self { view, handle }
    }

    pub fn props(&self) -> &'a Props {
        &self.view.props
    }

    pub fn state(&self) -> Option<&'a Record> {
        self.view.state.as_ref()
    }

    pub fn context(&self) -> &'a Context {
        &self.view.context
    }

    pub fn view(&self) -> &'a View {
        self.view
    }

    /// Update-queue capability of this instance.
    pub fn handle(&self) -> &'a ComponentHandle {
        self.handle
    }
}

pub trait Component: 'static {
    fn hooks(&self) -> Hooks {
        Hooks::empty()
    }

    fn initial_state(&self, _props: &Props, _context: &Context) -> Option<Record> {
        None
    }

    fn render(&mut self, cx: &Cx<'_>) -> Result<Option<Descriptor>, Error>;

    fn before_mount(&mut self, _cx: &Cx<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn after_mount(&mut self, _cx: &Cx<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn receive_props(
        &mut self,
        _cx: &Cx<'_>,
        _next_props: &Props,
        _next_context: &Context,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn should_update(&mut self, _cx: &Cx<'_>, _next: &View) -> Result<bool, Error> {
        Ok(true)
    }

    fn before_update(&mut self, _cx: &Cx<'_>, _next: &View) -> Result<(), Error> {
        Ok(())
    }

    fn after_update(&mut self, _cx: &Cx<'_>, _prev: &View) -> Result<(), Error> {
        Ok(())
    }

    fn will_unmount(&mut self, _cx: &Cx<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn on_error(&mut self, _cx: &Cx<'_>, _error: &Error) -> Result<(), Error> {
        Ok(())
    }

    /// Keys returned here must be listed in
    /// [`ComponentClass::CHILD_CONTEXT_KEYS`].
    fn child_context(&self, _cx: &Cx<'_>) -> Result<Option<Context>, Error> {
        Ok(None)
    }
}

pub trait ComponentClass: Component + Sized {
    const NAME: &'static str;
    const CONTEXT_KEYS: &'static [&'static str] = &[];
    const CHILD_CONTEXT_KEYS: &'static [&'static str] = &[];

    fn create(props: &Props, context: &Context) -> Result<Self, Error>;
}

pub(crate) struct Constructed {
    pub(crate) unit: Box<dyn Component>,
    /// Function units render while being constructed.
    pub(crate) rendered: Option<Option<Descriptor>>,
}

type Constructor = Box<dyn Fn(&Props, &Context) -> Result<Constructed, Error>>;

struct ComponentTypeInner {
    id: TypeId,
    name: &'static str,
    kind: CompositeKind,
    context_keys: &'static [&'static str],
    child_context_keys: &'static [&'static str],
    construct: Constructor,
}

/// Type-erased unit constructor. Two component types are equal when they
/// were built from the same class or function item with the same kind.
#[derive(Clone)]
pub struct ComponentType {
    inner: Rc<ComponentTypeInner>,
}

impl ComponentType {
    pub fn stateful<C: ComponentClass>() -> Self {
        Self::class::<C>(CompositeKind::Stateful)
    }

    pub fn pure<C: ComponentClass>() -> Self {
        Self::class::<C>(CompositeKind::Pure)
    }

    fn class<C: ComponentClass>(kind: CompositeKind) -> Self {
        Self {
            inner: Rc::new(ComponentTypeInner {
                id: TypeId::of::<C>(),
                name: C::NAME,
                kind,
                context_keys: C::CONTEXT_KEYS,
                child_context_keys: C::CHILD_CONTEXT_KEYS,
                construct: Box::new(|props, context| {
                    let unit = C::create(props, context)
                        .map_err(|err| err.in_hook(C::NAME, HookName::Construct))?;
                    Ok(Constructed {
                        unit: Box::new(unit),
                        rendered: None,
                    })
                }),
            }),
        }
    }

    pub fn function<F>(name: &'static str, render: F) -> Self
    where
        F: Fn(&Props, &Context) -> Result<Option<Descriptor>, Error> + 'static,
    {
        Self::function_with_context(name, &[], render)
    }

    pub fn function_with_context<F>(
        name: &'static str,
        context_keys: &'static [&'static str],
        render: F,
    ) -> Self
    where
        F: Fn(&Props, &Context) -> Result<Option<Descriptor>, Error> + 'static,
    {
        let render = Rc::new(render);
        Self {
            inner: Rc::new(ComponentTypeInner {
                id: TypeId::of::<F>(),
                name,
                kind: CompositeKind::Functional,
                context_keys,
                child_context_keys: &[],
                construct: Box::new(move |props, context| {
                    let rendered =
                        render(props, context).map_err(|err| err.in_hook(name, HookName::Render))?;
                    Ok(Constructed {
                        unit: Box::new(FunctionUnit {
                            render: Rc::clone(&render),
                        }),
                        rendered: Some(rendered),
                    })
                }),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn kind(&self) -> CompositeKind {
        self.inner.kind
    }

    pub fn context_keys(&self) -> &'static [&'static str] {
        self.inner.context_keys
    }

    pub fn child_context_keys(&self) -> &'static [&'static str] {
        self.inner.child_context_keys
    }

    /// Descriptor of this type with the given props.
    pub fn element(&self, props: Props) -> Descriptor {
        Descriptor::component(self.clone(), props)
    }

    pub(crate) fn construct(&self, props: &Props, context: &Context) -> Result<Constructed, Error> {
        (self.inner.construct)(props, context)
    }

    pub(crate) fn mask_context(&self, unmasked: &Context) -> Context {
        unmasked.masked(self.inner.context_keys)
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id && self.inner.kind == other.inner.kind
    }
}

impl Eq for ComponentType {}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

struct FunctionUnit<F> {
    render: Rc<F>,
}

impl<F> Component for FunctionUnit<F>
where
    F: Fn(&Props, &Context) -> Result<Option<Descriptor>, Error> + 'static,
{
    fn render(&mut self, cx: &Cx<'_>) -> Result<Option<Descriptor>, Error> {
        (self.render)(cx.props(), cx.context())
    }
}

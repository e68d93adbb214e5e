use std::fmt;
use std::rc::Rc;

use crate::component::{ComponentHandle, ComponentType};
use crate::host::NodeId;
use crate::value::{Props, Value};

pub type Key = Rc<str>;

/// What a descriptor asks the reconciler to build.
#[derive(Clone)]
pub enum ElementType {
    /// A platform node identified by its tag.
    Host(Rc<str>),
    /// A text leaf; the content lives in the `text` prop.
    Text,
    /// A user-defined unit.
    Component(ComponentType),
}

impl ElementType {
    pub fn name(&self) -> &str {
        match self {
            ElementType::Host(tag) => tag,
            ElementType::Text => "#text",
            ElementType::Component(ty) => ty.name(),
        }
    }
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ElementType::Host(a), ElementType::Host(b)) => a == b,
            (ElementType::Text, ElementType::Text) => true,
            (ElementType::Component(a), ElementType::Component(b)) => a == b,
            _ => false,
        }
    }
}

/// Target handed to a ref callback once the node it describes is mounted.
#[derive(Clone, Debug)]
pub enum RefTarget {
    Component(ComponentHandle),
    Host(NodeId),
}

/// Attach target carried by a descriptor. Identity is the callback pointer.
#[derive(Clone)]
pub struct Ref(Rc<dyn Fn(Option<RefTarget>)>);

impl Ref {
    pub fn new(callback: impl Fn(Option<RefTarget>) + 'static) -> Self {
        Self(Rc::new(callback))
    }

    pub fn ptr_eq(&self, other: &Ref) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn call(&self, target: Option<RefTarget>) {
        (self.0)(target)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ref(..)")
    }
}

#[derive(Clone)]
struct DescriptorInner {
    ty: ElementType,
    key: Option<Key>,
    props: Props,
    children: Rc<[Descriptor]>,
    ref_: Option<Ref>,
}

/// Immutable declarative description of one tree position.
///
/// Descriptors are produced fresh on every render. Cloning shares the same
/// allocation, so [`Descriptor::ptr_eq`] tells whether two descriptors are the
/// very same value rather than merely equal-looking.
#[derive(Clone)]
pub struct Descriptor {
    inner: Rc<DescriptorInner>,
}

impl Descriptor {
    fn new(ty: ElementType, props: Props, children: Vec<Descriptor>) -> Self {
        Self {
            inner: Rc::new(DescriptorInner {
                ty,
                key: None,
                props,
                children: Rc::from(children),
                ref_: None,
            }),
        }
    }

    pub fn host(tag: impl Into<Rc<str>>, props: Props, children: Vec<Descriptor>) -> Self {
        Self::new(ElementType::Host(tag.into()), props, children)
    }

    pub fn text(text: impl Into<Value>) -> Self {
        Self::new(
            ElementType::Text,
            Props::new().with("text", text.into()),
            Vec::new(),
        )
    }

    pub fn component(ty: ComponentType, props: Props) -> Self {
        Self::new(ElementType::Component(ty), props, Vec::new())
    }

    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        Rc::make_mut(&mut self.inner).key = Some(key.into());
        self
    }

    pub fn with_ref(mut self, ref_: Ref) -> Self {
        Rc::make_mut(&mut self.inner).ref_ = Some(ref_);
        self
    }

    pub fn ty(&self) -> &ElementType {
        &self.inner.ty
    }

    pub fn key(&self) -> Option<&Key> {
        self.inner.key.as_ref()
    }

    pub fn props(&self) -> &Props {
        &self.inner.props
    }

    pub fn children(&self) -> &[Descriptor] {
        &self.inner.children
    }

    pub fn ref_(&self) -> Option<&Ref> {
        self.inner.ref_.as_ref()
    }

    /// Text content of a text descriptor, rendered from its `text` prop.
    pub fn text_content(&self) -> String {
        match self.inner.props.get("text") {
            Some(Value::Str(text)) => text.to_string(),
            Some(Value::Int(value)) => value.to_string(),
            Some(Value::Float(value)) => value.to_string(),
            Some(Value::Bool(value)) => value.to_string(),
            _ => String::new(),
        }
    }

    pub fn ptr_eq(&self, other: &Descriptor) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct(self.inner.ty.name());
        if let Some(key) = &self.inner.key {
            debug.field("key", key);
        }
        debug.field("props", &self.inner.props);
        if !self.inner.children.is_empty() {
            debug.field("children", &self.inner.children);
        }
        debug.finish()
    }
}

/// Whether `next` may be reconciled in place against the instance built for
/// `prev`. Empty matches only empty, text matches any text, everything else
/// needs the same element type and the same key.
pub fn same_type_and_key(prev: Option<&Descriptor>, next: Option<&Descriptor>) -> bool {
    match (prev, next) {
        (None, None) => true,
        (Some(prev), Some(next)) => match (prev.ty(), next.ty()) {
            (ElementType::Text, ElementType::Text) => true,
            (ElementType::Text, _) | (_, ElementType::Text) => false,
            (prev_ty, next_ty) => prev_ty == next_ty && prev.key() == next.key(),
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_do_not_disturb_shared_descriptors() {
        let base = Descriptor::host("div", Props::new(), Vec::new());
        let shared = base.clone();
        let keyed = shared.with_key("a");
        assert!(base.key().is_none());
        assert_eq!(keyed.key().map(|key| &**key), Some("a"));
        assert!(!keyed.ptr_eq(&base));
    }

    #[test]
    fn same_type_and_key_rules() {
        let div = Descriptor::host("div", Props::new(), Vec::new());
        let span = Descriptor::host("span", Props::new(), Vec::new());
        let keyed = div.clone().with_key("k");
        assert!(same_type_and_key(None, None));
        assert!(!same_type_and_key(None, Some(&div)));
        assert!(same_type_and_key(Some(&div), Some(&div.clone())));
        assert!(!same_type_and_key(Some(&div), Some(&span)));
        assert!(!same_type_and_key(Some(&div), Some(&keyed)));
        assert!(same_type_and_key(
            Some(&Descriptor::text("a")),
            Some(&Descriptor::text("b"))
        ));
        assert!(!same_type_and_key(Some(&Descriptor::text("a")), Some(&div)));
    }

    #[test]
    fn text_content_renders_scalars() {
        assert_eq!(Descriptor::text("hi").text_content(), "hi");
        assert_eq!(Descriptor::text(3).text_content(), "3");
    }
}

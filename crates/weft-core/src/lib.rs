#![doc = r"Composite reconciliation and batched updates for declarative UI trees."]

pub mod batching;
pub mod callback_queue;
pub mod collections;
pub mod component;
pub mod composite;
pub mod descriptor;
pub mod error;
pub mod host;
pub mod nodes;
pub mod reconciler;
pub mod root;
pub mod runtime;
mod scheduler;
pub mod transaction;
pub mod update_queue;
pub mod value;

pub use batching::{BatchingStrategy, DefaultBatchingStrategy};
pub use callback_queue::CallbackQueue;
pub use component::{
    Component, ComponentClass, ComponentType, CompositeKind, Cx, Hooks, View,
};
pub use composite::CompositeInstance;
pub use descriptor::{same_type_and_key, Descriptor, ElementType, Key, Ref, RefTarget};
pub use error::{Error, HookName, Invariant};
pub use host::{Host, HostError, HostNode, HostNodeKind, HostOp, MemoryHost, NodeId};
pub use reconciler::{HostContext, Instance, Reconcilable};
pub use root::Root;
pub use runtime::{Runtime, RuntimeBuilder, RuntimeHandle};
pub use transaction::{Checkpoint, ReconcileTransaction, Transaction, TransactionWrapper};
pub use update_queue::{merge_state, ComponentHandle, HandleId, StateUpdate};
pub use value::{shallow_equal, Context, Props, Record, Value};

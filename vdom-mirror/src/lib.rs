//! vdom-mirror: a serializable, in-memory mirror of a live document tree.
//!
//! A `Document` owns an arena of nodes linked through an intrusive sibling
//! list, so parent and sibling traversal is O(1) and moves never reallocate.
//! The `sync` module walks any host tree that implements `LiveTree` and
//! rebuilds the mirror from it, assigning stable negative ids to nodes that
//! arrive without one and registering every node in the document's mirror
//! table. Inline styles are projected from the `style` attribute through
//! `cssparser`; the attribute text stays the single stored form.
//!
//! `html::LiveDocument` is a small host tree built from markup with
//! `html5gum`. It is what the tests and benches drive the synchronizer with.

pub mod css;
pub mod dom;
pub mod error;
pub mod html;
pub mod live;
pub mod mirror;
pub mod sync;

pub use dom::{AttrValue, Document, NodeKey, NodeSnapshot, NodeType, TreeSnapshot};
pub use error::{DomError, DomResult, SyncError};
pub use live::{IdSource, LiveTree, LocalIds, NodeRecord, ProcessIds, RecordKind};
pub use sync::{SyncOptions, SyncStats, Synchronizer, build_from_dom};

//! Auxiliary input widgets that edit a toy's hidden text field, and the
//! dropdown that switches between them.

mod kv;
mod mirror;
mod story;
mod switcher;

use crate::dom::{DomError, NodeId};

pub use kv::{parse_existing_rows, serialize_rows, KeyValueEditor, RowMap, ValueType};
pub use mirror::MirrorInput;
pub use story::{DendriteForm, PAGE_FIELDS, STORY_FIELDS};
pub use switcher::{InputMethod, InputMethodTable, InputSwitcher, SetupFn};

/// A widget layered over the hidden text field.
pub trait AuxWidget {
    /// Root element of the widget inside the input container.
    fn node(&self) -> NodeId;

    /// Releases every listener the widget registered.
    fn dispose(&self) -> Result<(), DomError>;
}

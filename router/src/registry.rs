// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Element class registry.
//!
//! Element libraries register a factory per class with
//! [`linkme::distributed_slice`]; the linker resolves configuration class
//! names against this slice. Registration:
//!
//! ```ignore
//! #[distributed_slice(ELEMENT_CLASSES)]
//! static QUEUE: ElementClass = ElementClass::new("Queue", || Box::new(Queue::new()));
//! ```

use crate::element::Element;
use linkme::distributed_slice;

/// Factory signature for element construction.
pub type ElementFactory = fn() -> Box<dyn Element>;

/// One registered element class.
pub struct ElementClass {
    /// Class name as written in configurations.
    pub name: &'static str,
    /// Constructor.
    pub factory: ElementFactory,
}

impl ElementClass {
    /// Describe a class.
    #[must_use]
    pub const fn new(name: &'static str, factory: ElementFactory) -> Self {
        ElementClass { name, factory }
    }
}

/// Every element class linked into this binary.
#[distributed_slice]
pub static ELEMENT_CLASSES: [ElementClass];

/// The factory for `name`, if registered.
#[must_use]
pub fn factory_for(name: &str) -> Option<ElementFactory> {
    ELEMENT_CLASSES
        .iter()
        .find(|class| class.name == name)
        .map(|class| class.factory)
}

/// True if `name` is a registered class.
#[must_use]
pub fn has_class(name: &str) -> bool {
    factory_for(name).is_some()
}

/// Names of every registered class, sorted.
#[must_use]
pub fn class_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = ELEMENT_CLASSES.iter().map(|class| class.name).collect();
    names.sort_unstable();
    names
}

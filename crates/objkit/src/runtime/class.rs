//! `Class` descriptors, registration, and per-class singleton accessors.
//!
//! This module implements the class system with:
//! - `Class` descriptors built from a [`ClassDef`]
//! - Single inheritance rooted at `Object`
//! - Dispatch tables inherited by copy, then edited by the class's
//!   `initialize` hook
//! - A global name registry
//!
//! # Architecture
//!
//! `Class`es are **globally registered** and never deallocated:
//! - Each class name maps to exactly one `Class`
//! - `Class`es have `'static` lifetime (leaked on registration)
//! - Immutable after registration, including the dispatch table
//!
//! Every built-in class is reached through a singleton accessor
//! (`Lock::class()`, `MutableArray::class()`, ...) backed by a [`ClassCell`].
//! The first call builds and registers the descriptor behind a
//! [`Once`](crate::runtime::Once) gate; later calls are a single atomic load.
//!
//! # Thread Safety
//!
//! The registry is protected by a `parking_lot::RwLock`. A class's
//! `initialize` hook runs outside the registry lock, so it may itself touch
//! other class accessors.

use crate::error::{Error, Result};
use crate::runtime::Once;
use crate::runtime::object::ObjectInterface;
use fxhash::FxHashMap;
use objkit_log::{debug, error};
use parking_lot::RwLock;
use std::alloc::Layout;
use std::fmt;
use std::ptr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicPtr, Ordering};

/// One-time hook that edits a class's dispatch table.
///
/// The table passed in already holds a copy of the superclass's entries;
/// the hook overwrites the entries this class overrides. Entries receive the
/// instance as `&Object` and may reinterpret it as the class's instance type,
/// which is why declaring a class with a hook is `unsafe`.
pub type Initializer = fn(&mut ObjectInterface);

/// Dispatch table of the root class, used as the base for root descriptors.
static ROOT_INTERFACE: ObjectInterface = ObjectInterface::ROOT;

/// Everything needed to declare a class.
///
/// # Example
///
/// ```rust
/// use objkit::runtime::{Class, ClassDef, Object, ObjectInterface, ObjectType};
///
/// fn initialize(interface: &mut ObjectInterface) {
///     interface.description = |_| "quiet".to_string();
/// }
///
/// // SAFETY: the override only reads through `&Object`.
/// let def = unsafe {
///     ClassDef::new::<Object>("QuietObjectDocExample", Object::class(), initialize)
/// };
/// let class = Class::register(def).unwrap();
///
/// assert_eq!(class.name(), "QuietObjectDocExample");
/// assert!(class.is_subclass_of(Object::class()));
/// ```
#[derive(Clone)]
pub struct ClassDef {
    /// Unique class name.
    pub name: String,
    /// Superclass descriptor; `None` only for the root class.
    pub superclass: Option<&'static Class>,
    /// Layout of one instance.
    pub layout: Layout,
    /// Dispatch table hook, invoked exactly once.
    pub initialize: Initializer,
}

impl ClassDef {
    /// Declares a class whose instances are laid out as `T`.
    ///
    /// `T` is the `#[repr(C)]` instance struct; several classes may share one
    /// instance type when a subclass only overrides dispatch entries.
    ///
    /// # Safety
    ///
    /// - `T` must begin with the instance type of `superclass` (or be that
    ///   type), so inherited entries see the layout they expect.
    /// - Every entry `initialize` installs must be valid for instances laid
    ///   out as `T`. Copying entries from an unrelated class, e.g. giving a
    ///   bare `Object` subclass the `Array` table, is undefined behavior.
    ///
    /// Declaring a class without `unsafe` is rejected:
    ///
    /// ```rust,compile_fail
    /// use objkit::runtime::{Array, ClassDef, Object, ObjectType};
    ///
    /// let _ = ClassDef::new::<Object>("Transplanted", Object::class(), |interface| {
    ///     *interface = *Array::class().interface();
    /// });
    /// ```
    pub unsafe fn new<T>(
        name: impl Into<String>,
        superclass: &'static Class,
        initialize: Initializer,
    ) -> Self {
        ClassDef {
            name: name.into(),
            superclass: Some(superclass),
            layout: Layout::new::<T>(),
            initialize,
        }
    }

    /// Declares the root class.
    ///
    /// # Safety
    ///
    /// Same contract as [`ClassDef::new`], with `T` embedding nothing.
    pub(crate) unsafe fn root<T>(name: impl Into<String>, initialize: Initializer) -> Self {
        ClassDef {
            name: name.into(),
            superclass: None,
            layout: Layout::new::<T>(),
            initialize,
        }
    }
}

/// Runtime class descriptor.
///
/// Holds the class name, superclass, instance layout, and the dispatch table
/// shared by every instance of the class.
pub struct Class {
    name: Box<str>,
    superclass: Option<&'static Class>,
    layout: Layout,
    interface: ObjectInterface,
}

/// Global class registry.
///
/// Ensures unique class names and provides lookup by name.
struct ClassRegistry {
    classes: RwLock<FxHashMap<Box<str>, &'static Class>>,
}

static REGISTRY: OnceLock<ClassRegistry> = OnceLock::new();

fn registry() -> &'static ClassRegistry {
    REGISTRY.get_or_init(|| ClassRegistry {
        classes: RwLock::new(FxHashMap::default()),
    })
}

impl Class {
    /// Builds, initializes, and registers a class descriptor.
    ///
    /// The new dispatch table starts as a copy of the superclass's table (or
    /// the root defaults) and is then handed to `def.initialize`.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyClassName`] if `def.name` is empty
    /// - [`Error::InstanceTooSmall`] if the instance layout cannot embed the
    ///   superclass instance
    /// - [`Error::ClassAlreadyExists`] if the name is taken
    pub fn register(def: ClassDef) -> Result<&'static Class> {
        let ClassDef {
            name,
            superclass,
            layout,
            initialize,
        } = def;

        if name.is_empty() {
            return Err(Error::EmptyClassName);
        }

        if let Some(superclass) = superclass {
            if layout.size() < superclass.layout.size() {
                return Err(Error::InstanceTooSmall {
                    size: layout.size(),
                    superclass_size: superclass.layout.size(),
                });
            }
        }

        let registry = registry();
        if registry.classes.read().contains_key(name.as_str()) {
            return Err(Error::ClassAlreadyExists);
        }

        // Copy, then override.
        let mut interface = match superclass {
            Some(superclass) => superclass.interface,
            None => ObjectInterface::ROOT,
        };
        initialize(&mut interface);

        let mut classes = registry.classes.write();

        // Another thread may have registered the name while we initialized.
        if classes.contains_key(name.as_str()) {
            return Err(Error::ClassAlreadyExists);
        }

        let class: &'static Class = Box::leak(Box::new(Class {
            name: name.into_boxed_str(),
            superclass,
            layout,
            interface,
        }));
        classes.insert(class.name.clone(), class);
        drop(classes);

        debug!(
            "registered class {} (superclass: {}, instance size: {})",
            class.name(),
            class.superclass.map_or("<root>", Class::name),
            class.instance_size()
        );

        Ok(class)
    }

    /// Looks up a registered class by name.
    #[must_use]
    pub fn named(name: &str) -> Option<&'static Class> {
        registry().classes.read().get(name).copied()
    }

    /// Returns the class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the superclass, or `None` for the root class.
    #[must_use]
    pub fn superclass(&self) -> Option<&'static Class> {
        self.superclass
    }

    /// Returns the size of one instance in bytes.
    #[must_use]
    pub fn instance_size(&self) -> usize {
        self.layout.size()
    }

    /// Returns the layout of one instance.
    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Returns this class's dispatch table.
    #[must_use]
    pub fn interface(&'static self) -> &'static ObjectInterface {
        &self.interface
    }

    /// Returns the superclass's dispatch table.
    ///
    /// This is what an override calls to reach the behavior it replaced, e.g.
    /// a `dealloc` entry releasing its own fields and then chaining up:
    ///
    /// ```rust,ignore
    /// unsafe { (Lock::class().superclass_interface().dealloc)(object) }
    /// ```
    ///
    /// The root class answers with the root defaults.
    #[must_use]
    pub fn superclass_interface(&self) -> &'static ObjectInterface {
        match self.superclass {
            Some(superclass) => &superclass.interface,
            None => &ROOT_INTERFACE,
        }
    }

    /// Checks if this class is `class` or inherits from it.
    #[must_use]
    pub fn is_subclass_of(&self, class: &Class) -> bool {
        let mut current = Some(self);

        while let Some(candidate) = current {
            if ptr::eq(candidate, class) {
                return true;
            }
            current = candidate.superclass.map(|superclass| superclass as &Class);
        }

        false
    }

    /// Iterates from this class up to the root, inclusive.
    pub fn ancestors(&'static self) -> Ancestors {
        Ancestors {
            next: Some(self),
        }
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        // Registry guarantees one descriptor per name.
        ptr::eq(self, other)
    }
}

impl Eq for Class {}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name())
            .field("superclass", &self.superclass.map(Class::name))
            .field("instance_size", &self.instance_size())
            .finish()
    }
}

/// Iterator over a class and its superclasses.
pub struct Ancestors {
    next: Option<&'static Class>,
}

impl Iterator for Ancestors {
    type Item = &'static Class;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.superclass;
        Some(current)
    }
}

/// Lazily-registered class descriptor slot.
///
/// Each class keeps one `ClassCell` in a `static` inside its accessor:
///
/// ```rust
/// use objkit::runtime::{Class, ClassCell, ClassDef, Object, ObjectType};
///
/// fn widget_class() -> &'static Class {
///     static CLASS: ClassCell = ClassCell::new();
///     // SAFETY: no entries are overridden.
///     CLASS.get_or_init(|| unsafe {
///         ClassDef::new::<Object>("WidgetDocExample", Object::class(), |_| {})
///     })
/// }
///
/// assert!(std::ptr::eq(widget_class(), widget_class()));
/// ```
pub struct ClassCell {
    once: Once,
    class: AtomicPtr<Class>,
}

impl ClassCell {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        ClassCell {
            once: Once::new(),
            class: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Returns the descriptor, registering it from `define` on first use.
    ///
    /// Concurrent first callers block until the single registration finishes.
    ///
    /// # Panics
    ///
    /// Panics if registration fails; a built-in class that cannot register
    /// leaves the runtime unusable.
    pub fn get_or_init<F>(&self, define: F) -> &'static Class
    where
        F: FnOnce() -> ClassDef,
    {
        self.once.call_once(|| {
            let def = define();
            let name = def.name.clone();
            match Class::register(def) {
                Ok(class) => self
                    .class
                    .store(ptr::from_ref(class).cast_mut(), Ordering::Release),
                Err(err) => {
                    error!("failed to register class {}: {}", name, err);
                    panic!("failed to register class {name}: {err}");
                }
            }
        });

        // SAFETY: the gate only completes after a leaked, registered class
        // has been stored.
        unsafe { &*self.class.load(Ordering::Acquire) }
    }

    /// Returns the descriptor if it has been registered.
    #[must_use]
    pub fn get(&self) -> Option<&'static Class> {
        // SAFETY: non-null values are leaked, registered classes.
        unsafe { self.class.load(Ordering::Acquire).as_ref() }
    }
}

impl Default for ClassCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Alloc, Object, ObjectType};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    fn noop(_interface: &mut ObjectInterface) {}

    fn object_def(
        name: &str,
        superclass: &'static Class,
        initialize: Initializer,
    ) -> ClassDef {
        // SAFETY: test classes only install entries that read through `&Object`.
        unsafe { ClassDef::new::<Object>(name, superclass, initialize) }
    }

    fn shouting_description(_object: &Object) -> String {
        "SHOUT".to_string()
    }

    fn shouting(interface: &mut ObjectInterface) {
        interface.description = shouting_description;
    }

    #[test]
    fn test_root_class() {
        let root = Object::class();
        assert_eq!(root.name(), "Object");
        assert!(root.superclass().is_none());
        assert_eq!(root.instance_size(), std::mem::size_of::<Object>());
    }

    #[test]
    fn test_subclass_registration() {
        let class =
            Class::register(object_def("RegSub", Object::class(), noop))
                .unwrap();

        assert_eq!(class.name(), "RegSub");
        assert_eq!(class.superclass().unwrap().name(), "Object");
        assert!(Class::named("RegSub").is_some_and(|c| ptr::eq(c, class)));
    }

    #[test]
    fn test_duplicate_class_name_error() {
        Class::register(object_def("RegDup", Object::class(), noop))
            .unwrap();
        let result =
            Class::register(object_def("RegDup", Object::class(), noop));

        assert!(matches!(result, Err(Error::ClassAlreadyExists)));
    }

    #[test]
    fn test_empty_name_error() {
        let result = Class::register(object_def("", Object::class(), noop));
        assert!(matches!(result, Err(Error::EmptyClassName)));
    }

    #[test]
    fn test_instance_too_small() {
        // SAFETY: rejected before any entry can run.
        let def = unsafe { ClassDef::new::<u8>("RegTiny", Object::class(), noop) };
        let result = Class::register(def);
        assert!(matches!(
            result,
            Err(Error::InstanceTooSmall { size: 1, .. })
        ));
        assert!(Class::named("RegTiny").is_none());
    }

    #[test]
    fn test_initialize_copies_then_overrides() {
        let parent =
            Class::register(object_def("RegLoud", Object::class(), shouting))
                .unwrap();
        let child =
            Class::register(object_def("RegLouder", parent, noop)).unwrap();

        // Child inherits the parent's override through the copied table.
        assert!(ptr::fn_addr_eq(
            child.interface().description,
            shouting_description as fn(&Object) -> String
        ));

        // The root table is untouched.
        let plain = Object::new();
        assert_ne!(plain.description(), "SHOUT");

        let loud = Alloc::<Object>::with_class(child).init(|object| object);
        assert_eq!(loud.description(), "SHOUT");
    }

    #[test]
    fn test_is_subclass_of_and_ancestors() {
        let a = Class::register(object_def("RegChainA", Object::class(), noop))
            .unwrap();
        let b = Class::register(object_def("RegChainB", a, noop)).unwrap();
        let c = Class::register(object_def("RegChainC", b, noop)).unwrap();

        assert!(c.is_subclass_of(a));
        assert!(c.is_subclass_of(c));
        assert!(c.is_subclass_of(Object::class()));
        assert!(!a.is_subclass_of(c));

        let names: Vec<&str> = c.ancestors().map(Class::name).collect();
        assert_eq!(names, ["RegChainC", "RegChainB", "RegChainA", "Object"]);
    }

    #[test]
    fn test_superclass_interface() {
        let class =
            Class::register(object_def("RegSuperIface", Object::class(), shouting))
                .unwrap();

        assert!(ptr::eq(class.superclass_interface(), Object::class().interface()));
        assert!(ptr::fn_addr_eq(
            Object::class().superclass_interface().description,
            ObjectInterface::ROOT.description
        ));
    }

    #[test]
    fn test_class_cell_initializes_once_under_contention() {
        const THREADS: usize = 12;
        static CELL: ClassCell = ClassCell::new();
        static INITIALIZED: AtomicUsize = AtomicUsize::new(0);

        fn counting(_interface: &mut ObjectInterface) {
            INITIALIZED.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
        }

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let class = CELL.get_or_init(|| {
                        object_def("RegContended", Object::class(), counting)
                    });
                    ptr::from_ref(class) as usize
                })
            })
            .collect();

        let addresses: Vec<usize> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(INITIALIZED.load(Ordering::SeqCst), 1);
        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
        assert!(CELL.get().is_some());
    }

    #[test]
    fn test_class_debug() {
        let class =
            Class::register(object_def("RegDebug", Object::class(), noop))
                .unwrap();
        let debug = format!("{class:?}");
        assert!(debug.contains("RegDebug"));
        assert!(debug.contains("Object"));
    }
}

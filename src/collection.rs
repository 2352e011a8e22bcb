//! Casted collections: the value of an array-typed property.
//!
//! A collection remembers the descriptor it was built for and the object that
//! owns it. Elements added after construction go through the same cast as the
//! initial ones, and casted elements point back at the *owner*, never at the
//! collection.
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{CastError, Result};
use crate::model::{Model, WeakModel};
use crate::property::PropertyDescriptor;
use crate::typecast;
use crate::value::Value;

#[derive(Clone)]
pub struct CastedCollection(Rc<RefCell<CollectionInner>>);

struct CollectionInner {
    items: Vec<Value>,
    descriptor: Arc<PropertyDescriptor>,
    owner: WeakModel,
}

impl CastedCollection {
    pub(crate) fn new(items: Vec<Value>, descriptor: &Arc<PropertyDescriptor>, owner: Option<&Model>) -> Self {
        Self(Rc::new(RefCell::new(CollectionInner {
            items,
            descriptor: Arc::clone(descriptor),
            owner: owner.map(Model::downgrade).unwrap_or_default(),
        })))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().items.get(index).cloned()
    }

    pub fn first(&self) -> Option<Value> {
        self.get(0)
    }

    pub fn last(&self) -> Option<Value> {
        self.0.borrow().items.last().cloned()
    }

    /// The elements as a plain vector (handles stay shared).
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().items.clone()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.0.borrow().items.iter().any(|x| x == value)
    }

    /// The object owning this collection.
    pub fn casted_by(&self) -> Option<Model> {
        self.0.borrow().owner.upgrade()
    }

    /// The array property this collection belongs to.
    pub fn casted_by_property(&self) -> Arc<PropertyDescriptor> {
        Arc::clone(&self.0.borrow().descriptor)
    }

    pub fn ptr_eq(&self, other: &CastedCollection) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    fn cast_item(&self, raw: Value) -> Result<Value> {
        let (descriptor, owner) = {
            let inner = self.0.borrow();
            (Arc::clone(&inner.descriptor), inner.owner.upgrade())
        };
        if let Value::Collection(c) = &raw {
            if c.ptr_eq(self) {
                return Err(CastError::CyclicAssignment { property: descriptor.name().to_string() });
            }
        }
        typecast::cast_element(&descriptor, owner.as_ref(), raw)
    }

    /// Cast and append; returns the stored element.
    pub fn push(&self, raw: impl Into<Value>) -> Result<Value> {
        let value = self.cast_item(raw.into())?;
        self.0.borrow_mut().items.push(value.clone());
        Ok(value)
    }

    /// Cast and insert at `index` (clamped to the length).
    pub fn insert(&self, index: usize, raw: impl Into<Value>) -> Result<Value> {
        let value = self.cast_item(raw.into())?;
        let mut inner = self.0.borrow_mut();
        let index = index.min(inner.items.len());
        inner.items.insert(index, value.clone());
        Ok(value)
    }

    /// Construct a new element from positional arguments, adopt it and append
    /// it.
    pub fn build(&self, args: Vec<Value>) -> Result<Value> {
        let (descriptor, owner) = {
            let inner = self.0.borrow();
            (Arc::clone(&inner.descriptor), inner.owner.upgrade())
        };
        let value = typecast::construct(&descriptor, args)?;
        if let Some(owner) = &owner {
            typecast::check_cycle(&descriptor, owner, &value)?;
        }
        typecast::adopt(&descriptor, owner.as_ref(), &value);
        self.0.borrow_mut().items.push(value.clone());
        Ok(value)
    }

    /// Remove the element at `index`. A removed object no longer held by the
    /// owner loses its back-reference.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let (removed, owner) = {
            let mut inner = self.0.borrow_mut();
            let removed = (index < inner.items.len()).then(|| inner.items.remove(index));
            (removed, inner.owner.upgrade())
        };
        if let (Some(item), Some(owner)) = (&removed, &owner) {
            owner.release(item);
        }
        removed
    }

    pub fn clear(&self) {
        let (items, owner) = {
            let mut inner = self.0.borrow_mut();
            (std::mem::take(&mut inner.items), inner.owner.upgrade())
        };
        if let Some(owner) = owner {
            for item in &items {
                owner.release(item);
            }
        }
    }
}

impl fmt::Debug for CastedCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(inner) => f
                .debug_struct("CastedCollection")
                .field("property", &inner.descriptor.name())
                .field("items", &inner.items)
                .finish(),
            Err(_) => f.write_str("CastedCollection(<borrowed>)"),
        }
    }
}

//! The UI instantiation side.
//!
//! The runtime publishes lifecycle events to a [`UiLayer`] together with a
//! key-value [`InitProperties`] context. What the layer builds from them is its
//! own business; it only has to drop every reference to a wrapper when the
//! matching `*_removed` call arrives.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    layout::OutputLayout,
    object::{Output, Surface},
    registry::NativeHandle,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Handle(NativeHandle),
}

/// Initialization context handed to the UI layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitProperties {
    values: BTreeMap<&'static str, PropertyValue>,
}

impl InitProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: PropertyValue) -> Self {
        self.values.insert(key, value);
        self
    }

    pub fn set(&mut self, key: &'static str, value: PropertyValue) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.values.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(PropertyValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(PropertyValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn handle(&self, key: &str) -> Option<NativeHandle> {
        match self.values.get(key) {
            Some(PropertyValue::Handle(handle)) => Some(*handle),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &PropertyValue)> {
        self.values.iter().map(|(key, value)| (*key, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub trait UiLayer {
    fn surface_added(&mut self, surface: &Surface, properties: &InitProperties);

    fn surface_removed(&mut self, surface: &Surface);

    /// `layout` is the arrangement shared by every output, already holding
    /// this one's placement.
    fn output_added(&mut self, output: &Output, layout: &OutputLayout, properties: &InitProperties);

    fn output_removed(&mut self, output: &Output);
}

struct Created<T> {
    owner: NativeHandle,
    properties: InitProperties,
    object: T,
}

/// Builds one object per `add` call and tears down everything an owner created.
pub struct ObjectCreator<T> {
    factory: Box<dyn FnMut(NativeHandle, &InitProperties) -> T>,
    created: Vec<Created<T>>,
}

impl<T> ObjectCreator<T> {
    pub fn new(factory: impl FnMut(NativeHandle, &InitProperties) -> T + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            created: Vec::new(),
        }
    }

    pub fn add(&mut self, owner: NativeHandle, properties: InitProperties) -> &T {
        let object = (self.factory)(owner, &properties);
        self.created.push(Created {
            owner,
            properties,
            object,
        });
        &self.created[self.created.len() - 1].object
    }

    /// Returns the removed objects in creation order.
    pub fn remove_by_owner(&mut self, owner: NativeHandle) -> Vec<T> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.created.drain(..).partition(|entry| entry.owner == owner);
        self.created = kept;
        debug!(%owner, count = removed.len(), "removed created objects");
        removed.into_iter().map(|entry| entry.object).collect()
    }

    pub fn get(&self, owner: NativeHandle) -> Option<&T> {
        self.created
            .iter()
            .find(|entry| entry.owner == owner)
            .map(|entry| &entry.object)
    }

    pub fn properties(&self, owner: NativeHandle) -> Option<&InitProperties> {
        self.created
            .iter()
            .find(|entry| entry.owner == owner)
            .map(|entry| &entry.properties)
    }

    pub fn owners(&self) -> Vec<NativeHandle> {
        self.created.iter().map(|entry| entry.owner).collect()
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }
}

/// A [`UiLayer`] that keeps one creator for outputs and one for shell surfaces.
pub struct DelegateUi<O, S> {
    pub outputs: ObjectCreator<O>,
    pub surfaces: ObjectCreator<S>,
}

impl<O, S> DelegateUi<O, S> {
    pub fn new(outputs: ObjectCreator<O>, surfaces: ObjectCreator<S>) -> Self {
        Self { outputs, surfaces }
    }
}

impl<O, S> UiLayer for DelegateUi<O, S> {
    fn surface_added(&mut self, surface: &Surface, properties: &InitProperties) {
        self.surfaces.add(surface.handle(), properties.clone());
    }

    fn surface_removed(&mut self, surface: &Surface) {
        self.surfaces.remove_by_owner(surface.handle());
    }

    fn output_added(
        &mut self,
        output: &Output,
        _layout: &OutputLayout,
        properties: &InitProperties,
    ) {
        self.outputs.add(output.handle(), properties.clone());
    }

    fn output_removed(&mut self, output: &Output) {
        self.outputs.remove_by_owner(output.handle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(raw: u64) -> NativeHandle {
        NativeHandle::from_raw(raw)
    }

    #[test]
    fn properties_are_typed() {
        let props = InitProperties::new()
            .with("type", PropertyValue::Text("popup".into()))
            .with("x", PropertyValue::Int(1920))
            .with("surface", PropertyValue::Handle(h(3)));

        assert_eq!(props.text("type"), Some("popup"));
        assert_eq!(props.int("x"), Some(1920));
        assert_eq!(props.handle("surface"), Some(h(3)));
        assert_eq!(props.text("x"), None);
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn creator_removes_everything_an_owner_created() {
        let mut creator = ObjectCreator::new(|owner: NativeHandle, props: &InitProperties| {
            format!("{}:{}", owner, props.text("type").unwrap_or("?"))
        });

        creator.add(h(1), InitProperties::new().with("type", PropertyValue::Text("toplevel".into())));
        creator.add(h(2), InitProperties::new());
        creator.add(h(1), InitProperties::new().with("type", PropertyValue::Text("popup".into())));

        assert_eq!(creator.get(h(2)).map(String::as_str), Some("0x2:?"));

        let removed = creator.remove_by_owner(h(1));
        assert_eq!(removed, vec!["0x1:toplevel".to_string(), "0x1:popup".to_string()]);
        assert_eq!(creator.owners(), vec![h(2)]);
        assert!(creator.remove_by_owner(h(1)).is_empty());
    }
}

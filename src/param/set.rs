//! Per-instance parameter storage with keyframes.

use crate::core::error::ParamError;
use crate::param::definition::{ParamDescriptor, ParamValue};
use indexmap::IndexMap;

/// Index of a parameter within its set; stable for the life of the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamHandle(pub usize);

/// One parameter: its descriptor, static value and keyframes.
#[derive(Debug, Clone)]
pub struct Param {
    descriptor: ParamDescriptor,
    value: ParamValue,
    keys: Vec<(f64, ParamValue)>,
    enabled: bool,
}

impl Param {
    fn new(descriptor: ParamDescriptor) -> Self {
        Self {
            value: descriptor.default.clone(),
            descriptor,
            keys: Vec::new(),
            enabled: true,
        }
    }

    /// The static description.
    pub fn descriptor(&self) -> &ParamDescriptor {
        &self.descriptor
    }

    /// Whether the parameter is enabled in the interface.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of keyframes.
    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    /// Value ignoring keyframes.
    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    /// Value at `time`.
    ///
    /// Without keyframes this is the static value. Before the first key and
    /// after the last the nearest key holds; between keys numeric kinds
    /// interpolate linearly and the others step.
    pub fn value_at_time(&self, time: f64) -> ParamValue {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return self.value.clone(),
        };
        if time <= first.0 {
            return first.1.clone();
        }
        if time >= last.0 {
            return last.1.clone();
        }
        let after = self.keys.partition_point(|(t, _)| *t <= time);
        let (t0, v0) = &self.keys[after - 1];
        let (t1, v1) = &self.keys[after];
        if *t0 == time || !self.descriptor.param_type.interpolates() {
            return v0.clone();
        }
        v0.lerp(v1, (time - t0) / (t1 - t0))
    }
}

/// All parameters of one effect instance, in definition order.
#[derive(Debug, Clone, Default)]
pub struct ParamSet {
    params: IndexMap<String, Param>,
}

impl ParamSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set holding the defaults of `descriptors`.
    pub fn from_descriptors<'a, I>(descriptors: I) -> Result<Self, ParamError>
    where
        I: IntoIterator<Item = &'a ParamDescriptor>,
    {
        let mut set = Self::new();
        for d in descriptors {
            set.define(d.clone())?;
        }
        Ok(set)
    }

    /// Define a new parameter.
    pub fn define(&mut self, descriptor: ParamDescriptor) -> Result<ParamHandle, ParamError> {
        if self.params.contains_key(&descriptor.name) {
            return Err(ParamError::AlreadyDefined(descriptor.name));
        }
        let (index, _) = self
            .params
            .insert_full(descriptor.name.clone(), Param::new(descriptor));
        Ok(ParamHandle(index))
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True if no parameter is defined.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Look up a handle by name.
    pub fn handle(&self, name: &str) -> Result<ParamHandle, ParamError> {
        self.params
            .get_index_of(name)
            .map(ParamHandle)
            .ok_or_else(|| ParamError::Unknown(name.to_string()))
    }

    /// Get a parameter by handle.
    pub fn get(&self, handle: ParamHandle) -> Result<&Param, ParamError> {
        self.params
            .get_index(handle.0)
            .map(|(_, p)| p)
            .ok_or_else(|| ParamError::Unknown(format!("#{}", handle.0)))
    }

    fn get_mut(&mut self, handle: ParamHandle) -> Result<&mut Param, ParamError> {
        self.params
            .get_index_mut(handle.0)
            .map(|(_, p)| p)
            .ok_or_else(|| ParamError::Unknown(format!("#{}", handle.0)))
    }

    /// Get a parameter by name.
    pub fn by_name(&self, name: &str) -> Result<&Param, ParamError> {
        self.get(self.handle(name)?)
    }

    /// Value at `time`.
    pub fn value_at_time(&self, handle: ParamHandle, time: f64) -> Result<ParamValue, ParamError> {
        Ok(self.get(handle)?.value_at_time(time))
    }

    /// Set the static value, removing any keyframes. Returns the stored
    /// value after clamping.
    pub fn set_value(&mut self, handle: ParamHandle, value: ParamValue) -> Result<ParamValue, ParamError> {
        let param = self.get_mut(handle)?;
        let value = param.descriptor.validate(value)?;
        param.keys.clear();
        param.value = value.clone();
        Ok(value)
    }

    /// Set a keyframe, replacing any key at the same time.
    pub fn set_value_at_time(
        &mut self,
        handle: ParamHandle,
        time: f64,
        value: ParamValue,
    ) -> Result<ParamValue, ParamError> {
        let param = self.get_mut(handle)?;
        if !param.descriptor.animates {
            return Err(ParamError::NotAnimatable(param.descriptor.name.clone()));
        }
        let value = param.descriptor.validate(value)?;
        match param.keys.binary_search_by(|(t, _)| t.total_cmp(&time)) {
            Ok(i) => param.keys[i].1 = value.clone(),
            Err(i) => param.keys.insert(i, (time, value.clone())),
        }
        Ok(value)
    }

    /// Remove every keyframe, keeping the static value.
    pub fn delete_all_keys(&mut self, handle: ParamHandle) -> Result<(), ParamError> {
        self.get_mut(handle)?.keys.clear();
        Ok(())
    }

    /// Enable or disable a parameter.
    pub fn set_enabled(&mut self, handle: ParamHandle, enabled: bool) -> Result<(), ParamError> {
        self.get_mut(handle)?.enabled = enabled;
        Ok(())
    }

    /// Iterate over parameters in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.values()
    }
}

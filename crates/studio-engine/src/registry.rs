//! Generation-checked arena of outputs.

use std::collections::HashMap;

use studio_ipc::OutputId;

use crate::{EngineError, EngineResult};

struct Slot<T> {
    generation: u32,
    entry: Option<(Option<String>, T)>,
}

/// Arena keyed by [`OutputId`]. Reusing a slot bumps its generation, so a
/// handle to a removed entry never resolves to the slot's next occupant.
pub(crate) struct Registry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    names: HashMap<String, OutputId>,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            names: HashMap::new(),
        }
    }

    /// Id the next insert will return.
    pub(crate) fn next_id(&self) -> OutputId {
        match self.free.last() {
            Some(&index) => OutputId::new(index, self.slots[index as usize].generation),
            None => OutputId::new(self.slots.len() as u32, 0),
        }
    }

    pub(crate) fn insert(&mut self, name: Option<String>, value: T) -> EngineResult<OutputId> {
        if let Some(name) = &name {
            if self.names.contains_key(name) {
                return Err(EngineError::NameTaken(name.clone()));
            }
        }

        let id = self.next_id();
        match self.free.pop() {
            Some(index) => self.slots[index as usize].entry = Some((name.clone(), value)),
            None => self.slots.push(Slot {
                generation: 0,
                entry: Some((name.clone(), value)),
            }),
        }
        if let Some(name) = name {
            self.names.insert(name, id);
        }
        Ok(id)
    }

    pub(crate) fn get(&self, id: OutputId) -> Option<&T> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref().map(|(_, value)| value)
    }

    pub(crate) fn get_mut(&mut self, id: OutputId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut().map(|(_, value)| value)
    }

    pub(crate) fn require(&self, id: OutputId) -> EngineResult<&T> {
        self.get(id).ok_or(EngineError::UnknownOutput(id))
    }

    pub(crate) fn require_mut(&mut self, id: OutputId) -> EngineResult<&mut T> {
        self.get_mut(id).ok_or(EngineError::UnknownOutput(id))
    }

    pub(crate) fn remove(&mut self, id: OutputId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let (name, value) = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        if let Some(name) = name {
            self.names.remove(&name);
        }
        Some(value)
    }

    pub(crate) fn by_name(&self, name: &str) -> Option<OutputId> {
        self.names.get(name).copied()
    }

    pub(crate) fn name_of(&self, id: OutputId) -> Option<&str> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()?.0.as_deref()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (OutputId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry
                .as_ref()
                .map(|(_, value)| (OutputId::new(index as u32, slot.generation), value))
        })
    }

    /// Remove every entry.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        self.names.clear();
        let mut drained = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some((_, value)) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                drained.push(value);
            }
        }
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.entry.is_some()).count()
    }
}

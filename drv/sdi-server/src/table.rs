// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handle resolution.
//!
//! Resources live in a fixed-size slot table. A handle is a slot index plus
//! the generation the slot had when the resource was installed; removing a
//! resource bumps the generation, so old handles stop resolving even after
//! the slot is reused.
//!
//! The table lock is only held long enough to find a slot and clone out the
//! `Arc` of its resource. Each resource has its own lock, which is what
//! serializes operations on a handle.

use crate::Resource;
use drv_sdi_api::{Fault, Generation, ResourceHdl, ResourceKind};
use std::sync::Arc;

/// Most resources a table can hold.
pub const TABLE_CAPACITY: usize = 64;

/// One resource and its lock.
///
/// The lock is held for a whole driver call, bus traffic included, and
/// waiters spin rather than park. That is only acceptable while every
/// transaction is short and bounded: at most one 4100-byte flush, or one
/// NVRAM write and its rollback. Slow or blocking buses need a parking lock
/// here.
pub type SharedResource = Arc<spin::Mutex<Resource>>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TableError {
    /// Every slot is in use.
    Full,
    /// A resource of the same kind already has this name.
    DuplicateName,
}

struct Entry {
    name: String,
    kind: ResourceKind,
    resource: SharedResource,
}

struct Slot {
    gen: Generation,
    entry: Option<Entry>,
}

pub struct ResourceTable {
    slots: spin::RwLock<heapless::Vec<Slot, TABLE_CAPACITY>>,
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTable {
    pub const fn new() -> Self {
        Self {
            slots: spin::RwLock::new(heapless::Vec::new()),
        }
    }

    /// Installs `resource` under `name` and returns a fresh handle for it.
    pub fn insert(
        &self,
        name: &str,
        resource: Resource,
    ) -> Result<ResourceHdl, TableError> {
        let kind = resource.kind();
        let mut slots = self.slots.write();

        if slots.iter().any(|slot| {
            slot.entry
                .as_ref()
                .is_some_and(|e| e.kind == kind && e.name == name)
        }) {
            return Err(TableError::DuplicateName);
        }

        let entry = Entry {
            name: name.to_owned(),
            kind,
            resource: Arc::new(spin::Mutex::new(resource)),
        };

        let index = match slots.iter().position(|slot| slot.entry.is_none()) {
            Some(index) => index,
            None => {
                slots
                    .push(Slot {
                        gen: Generation::ZERO,
                        entry: None,
                    })
                    .map_err(|_| TableError::Full)?;
                slots.len() - 1
            }
        };
        let slot = &mut slots[index];
        slot.entry = Some(entry);
        Ok(ResourceHdl::for_index_and_gen(index, slot.gen))
    }

    /// Finds the handle of the resource of `kind` called `name`.
    pub fn lookup(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Option<ResourceHdl> {
        let slots = self.slots.read();
        slots.iter().enumerate().find_map(|(index, slot)| {
            let e = slot.entry.as_ref()?;
            (e.kind == kind && e.name == name)
                .then(|| ResourceHdl::for_index_and_gen(index, slot.gen))
        })
    }

    /// Takes a resource out of the table. Its handle, and any copies of it,
    /// stop resolving. Operations already in progress on it finish normally.
    pub fn remove(&self, hdl: ResourceHdl) -> Result<(), Fault> {
        let mut slots = self.slots.write();
        let slot = slots
            .get_mut(hdl.index())
            .filter(|slot| slot.gen == hdl.generation())
            .ok_or(Fault::InvalidHandle)?;
        if slot.entry.take().is_none() {
            return Err(Fault::InvalidHandle);
        }
        slot.gen = slot.gen.next();
        Ok(())
    }

    /// Resolves `hdl` to its resource.
    pub fn resolve(&self, hdl: ResourceHdl) -> Result<SharedResource, Fault> {
        let slots = self.slots.read();
        slots
            .get(hdl.index())
            .filter(|slot| slot.gen == hdl.generation())
            .and_then(|slot| slot.entry.as_ref())
            .map(|e| e.resource.clone())
            .ok_or(Fault::InvalidHandle)
    }

    /// Number of installed resources.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|slot| slot.entry.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DynBus;
    use drv_sdi_devices::HostSystem;
    use drv_sdi_emulator::{EmulatedHostSystem, HostSystemParams};

    fn host(slot: u8) -> Resource {
        let (bus, _port) = EmulatedHostSystem::new(HostSystemParams {
            slot,
            ..Default::default()
        });
        let bus: DynBus = Box::new(bus);
        Resource::HostSystem(HostSystem::new(bus))
    }

    #[test]
    fn insert_lookup_resolve() {
        let table = ResourceTable::new();
        let a = table.insert("a", host(1)).unwrap();
        let b = table.insert("b", host(2)).unwrap();
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);

        assert_eq!(table.lookup(ResourceKind::HostSystem, "b"), Some(b));
        assert_eq!(table.lookup(ResourceKind::Nvram, "b"), None);
        let a = table.resolve(a).unwrap();
        assert_eq!(a.lock().kind(), ResourceKind::HostSystem);
    }

    #[test]
    fn duplicate_names_are_per_kind() {
        let table = ResourceTable::new();
        table.insert("x", host(1)).unwrap();
        assert_eq!(
            table.insert("x", host(2)).map(|_| ()),
            Err(TableError::DuplicateName)
        );
    }

    #[test]
    fn removed_handle_goes_stale() {
        let table = ResourceTable::new();
        let old = table.insert("a", host(1)).unwrap();
        table.remove(old).unwrap();
        assert!(matches!(table.resolve(old), Err(Fault::InvalidHandle)));
        assert_eq!(table.remove(old), Err(Fault::InvalidHandle));

        // The slot is reused, but not by the old handle.
        let new = table.insert("a", host(3)).unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);
        assert!(table.resolve(new).is_ok());
        assert!(table.resolve(old).is_err());
    }

    #[test]
    fn garbage_handles_do_not_resolve() {
        let table = ResourceTable::new();
        table.insert("a", host(1)).unwrap();
        assert!(table.resolve(ResourceHdl::INVALID).is_err());
        assert!(table.resolve(ResourceHdl::from_raw(0x0001_0000)).is_err());
        assert!(table.resolve(ResourceHdl::from_raw(7)).is_err());
    }

    #[test]
    fn capacity_is_bounded() {
        let table = ResourceTable::new();
        for i in 0..TABLE_CAPACITY {
            table.insert(&format!("h{i}"), host(0)).unwrap();
        }
        assert_eq!(
            table.insert("one-too-many", host(0)).map(|_| ()),
            Err(TableError::Full)
        );
    }
}

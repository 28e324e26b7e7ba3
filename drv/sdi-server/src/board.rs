// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An [`Sdi`] populated with emulated hardware from an [`SdiConfig`].

use crate::{DynBus, Sdi, SdiConfig};
use anyhow::{anyhow, Result};
use drv_sdi_api::{ResourceHdl, ResourceKind};
use drv_sdi_devices::Nvram;
use drv_sdi_emulator::{
    CommDevParams, ControllerPort, EmulatedCommDev, EmulatedHostSystem,
    EmulatedNvram, HostSystemParams, HostSystemPort, NvramPort,
};
use std::collections::BTreeMap;

/// Far ends of the emulated devices, by resource name.
#[derive(Clone, Default)]
pub struct Ports {
    pub comm_dev: BTreeMap<String, ControllerPort>,
    pub host_system: BTreeMap<String, HostSystemPort>,
    pub nvram: BTreeMap<String, NvramPort>,
}

pub struct Board {
    sdi: Sdi,
    ports: Ports,
}

impl Board {
    pub fn from_config(cfg: &SdiConfig) -> Result<Self> {
        cfg.validate()?;

        let sdi = Sdi::new();
        let mut ports = Ports::default();

        for (name, c) in &cfg.comm_dev {
            let (bus, port) = EmulatedCommDev::new(CommDevParams {
                service_tag: c.service_tag()?,
                fw_version: c.fw_version()?,
                slot_occupation: c.slot_occupation,
                sb_queue_depth: c.sb_queue_depth,
                loopback: c.loopback,
                unsupported: c.unsupported.iter().map(|&r| r.into()).collect(),
            });
            sdi.register_comm_dev(name, bus).map_err(|e| {
                anyhow!("registering comm-dev {name:?}: {e:?}")
            })?;
            ports.comm_dev.insert(name.clone(), port);
        }

        for (name, c) in &cfg.host_system {
            let (bus, port) = EmulatedHostSystem::new(HostSystemParams {
                slot: c.slot,
                unsupported: c.unsupported.iter().map(|&r| r.into()).collect(),
            });
            sdi.register_host_system(name, bus).map_err(|e| {
                anyhow!("registering host-system {name:?}: {e:?}")
            })?;
            ports.host_system.insert(name.clone(), port);
        }

        for (name, c) in &cfg.nvram {
            let (bus, port) = EmulatedNvram::new(c.size, c.page_size);
            let bus: DynBus = Box::new(bus);
            let nvram = Nvram::new(bus, c.size, c.page_size)
                .map_err(|e| anyhow!("nvram {name:?}: {e:?}"))?;
            sdi.register_nvram(name, nvram).map_err(|e| {
                anyhow!("registering nvram {name:?}: {e:?}")
            })?;
            ports.nvram.insert(name.clone(), port);
        }

        Ok(Self { sdi, ports })
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Self::from_config(&SdiConfig::from_toml(text)?)
    }

    pub fn sdi(&self) -> &Sdi {
        &self.sdi
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    /// Handle of the resource of `kind` called `name`.
    pub fn handle(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Option<ResourceHdl> {
        self.sdi.lookup(kind, name)
    }

    pub fn comm_dev_port(&self, name: &str) -> Option<&ControllerPort> {
        self.ports.comm_dev.get(name)
    }

    pub fn host_system_port(&self, name: &str) -> Option<&HostSystemPort> {
        self.ports.host_system.get(name)
    }

    pub fn nvram_port(&self, name: &str) -> Option<&NvramPort> {
        self.ports.nvram.get(name)
    }
}

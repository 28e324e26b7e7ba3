// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Board description.
//!
//! A board is described in TOML, one table per resource, keyed by the name
//! the resource is looked up by:
//!
//! ```toml
//! [comm-dev.mailbox]
//! service-tag = "7XQ2KC3"
//! fw-version = "3.12.1"
//! slot-occupation = 4
//!
//! [host-system.board]
//! slot = 4
//!
//! [nvram.config]
//! size = 256
//! page-size = 16
//! ```

use anyhow::{bail, Context, Result};
use drv_sdi_api::regs::{comm_dev, host_system};
use drv_sdi_api::{FwVersion, ServiceTag};
use drv_sdi_devices::nvram::MAX_PAGE_SIZE;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SdiConfig {
    #[serde(default)]
    pub comm_dev: BTreeMap<String, CommDevConfig>,
    #[serde(default)]
    pub host_system: BTreeMap<String, HostSystemConfig>,
    #[serde(default)]
    pub nvram: BTreeMap<String, NvramConfig>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CommDevConfig {
    pub service_tag: String,
    pub fw_version: String,
    #[serde(default)]
    pub slot_occupation: u32,

    /// Southbound messages the controller holds before it stops taking more.
    #[serde(default = "default_sb_queue_depth")]
    pub sb_queue_depth: usize,

    /// Echo every southbound message back northbound (bring-up only).
    #[serde(default)]
    pub loopback: bool,

    /// Registers this hardware variant lacks.
    #[serde(default)]
    pub unsupported: Vec<CommDevRegister>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HostSystemConfig {
    pub slot: u8,
    #[serde(default)]
    pub unsupported: Vec<HostSystemRegister>,
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NvramConfig {
    pub size: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_sb_queue_depth() -> usize {
    1
}

fn default_page_size() -> u32 {
    16
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommDevRegister {
    ServiceTag,
    CommDevFwVersion,
    SlotOccupation,
    HostSwVersion,
    HostTemperature,
    Status,
    NbLength,
    NbData,
    NbAck,
    SbData,
}

impl From<CommDevRegister> for comm_dev::Register {
    fn from(r: CommDevRegister) -> Self {
        match r {
            CommDevRegister::ServiceTag => Self::ServiceTag,
            CommDevRegister::CommDevFwVersion => Self::CommDevFwVersion,
            CommDevRegister::SlotOccupation => Self::SlotOccupation,
            CommDevRegister::HostSwVersion => Self::HostSwVersion,
            CommDevRegister::HostTemperature => Self::HostTemperature,
            CommDevRegister::Status => Self::Status,
            CommDevRegister::NbLength => Self::NbLength,
            CommDevRegister::NbData => Self::NbData,
            CommDevRegister::NbAck => Self::NbAck,
            CommDevRegister::SbData => Self::SbData,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostSystemRegister {
    SlotPosition,
    Booted,
}

impl From<HostSystemRegister> for host_system::Register {
    fn from(r: HostSystemRegister) -> Self {
        match r {
            HostSystemRegister::SlotPosition => Self::SlotPosition,
            HostSystemRegister::Booted => Self::Booted,
        }
    }
}

impl CommDevConfig {
    pub fn service_tag(&self) -> Result<ServiceTag> {
        match ServiceTag::try_from_str(&self.service_tag) {
            Ok(tag) => Ok(tag),
            Err(e) => bail!(
                "service-tag {:?} is not a valid {}-byte string: {e:?}",
                self.service_tag,
                drv_sdi_api::SERVICE_TAG_SIZE,
            ),
        }
    }

    pub fn fw_version(&self) -> Result<FwVersion> {
        match FwVersion::try_from_str(&self.fw_version) {
            Ok(ver) => Ok(ver),
            Err(e) => bail!(
                "fw-version {:?} is not a valid {}-byte string: {e:?}",
                self.fw_version,
                drv_sdi_api::FW_VERSION_SIZE,
            ),
        }
    }

    fn validate(&self) -> Result<()> {
        self.service_tag()?;
        self.fw_version()?;
        if self.sb_queue_depth == 0 {
            bail!("sb-queue-depth must be at least 1");
        }
        Ok(())
    }
}

impl NvramConfig {
    fn validate(&self) -> Result<()> {
        if self.size == 0 {
            bail!("size must be nonzero");
        }
        if !self.page_size.is_power_of_two() {
            bail!("page-size {} is not a power of two", self.page_size);
        }
        if self.page_size > MAX_PAGE_SIZE {
            bail!(
                "page-size {} is larger than the maximum of {MAX_PAGE_SIZE}",
                self.page_size
            );
        }
        if self.page_size > self.size {
            bail!(
                "page-size {} is larger than the part ({} bytes)",
                self.page_size,
                self.size
            );
        }
        Ok(())
    }
}

fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("{kind} with an empty name");
    }
    Ok(())
}

impl SdiConfig {
    /// Parses and validates a board description.
    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: Self =
            toml::from_str(text).context("failed to parse SDI config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&text)
            .with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, c) in &self.comm_dev {
            check_name("comm-dev", name)?;
            c.validate()
                .with_context(|| format!("comm-dev {name:?}"))?;
        }
        for name in self.host_system.keys() {
            check_name("host-system", name)?;
        }
        for (name, n) in &self.nvram {
            check_name("nvram", name)?;
            n.validate().with_context(|| format!("nvram {name:?}"))?;
        }
        Ok(())
    }
}

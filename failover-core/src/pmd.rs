//! Poll-mode driver selection and interface binding plans.
//!
//! DPDK reaches a Hyper-V NIC in one of two ways:
//! - `failsafe`: the synthetic device stays on `hv_netvsc` and testpmd drives
//!   it through `net_vdev_netvsc`, failing over to the synthetic path when
//!   the VF disappears;
//! - `netvsc`: the synthetic device is handed to `uio_hv_generic` and the
//!   netvsc PMD drives the VMBus device directly.

use std::str::FromStr;

use crate::nic::{DetachedDevice, NicInfo};

/// VMBus class id of network devices, registered with `uio_hv_generic`.
pub const HV_UIO_GENERIC_UUID: &str = "f8615163-df3e-46c5-913f-f2d2f965ed0e";

/// Poll-mode driver a scenario runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PmdMode {
    /// Direct netvsc PMD over `uio_hv_generic`.
    Netvsc,
    /// Failsafe PMD over `hv_netvsc` (Azure default).
    Failsafe,
}

/// A PMD name that is neither `netvsc` nor `failsafe`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized pmd {0:?} passed to test init procedure")]
pub struct UnknownPmd(pub String);

impl PmdMode {
    /// Kernel driver the test interface must be bound to.
    pub fn target_driver(self) -> &'static str {
        match self {
            Self::Netvsc => "uio_hv_generic",
            Self::Failsafe => "hv_netvsc",
        }
    }

    /// PMD name as used on the command line and in scenario names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Netvsc => "netvsc",
            Self::Failsafe => "failsafe",
        }
    }
}

impl FromStr for PmdMode {
    type Err = UnknownPmd;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "netvsc" => Ok(Self::Netvsc),
            "failsafe" => Ok(Self::Failsafe),
            other => Err(UnknownPmd(other.to_string())),
        }
    }
}

impl std::fmt::Display for PmdMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What it takes to put an interface on the driver a PMD needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindPlan {
    /// Already on the target driver; nothing to do.
    AlreadyBound,
    /// Unbind from `from`, then bind to `to`.
    Rebind {
        /// Current driver.
        from: String,
        /// Target driver.
        to: &'static str,
    },
}

/// Decide how to bind `nic` for `mode`.
pub fn plan_binding(nic: &NicInfo, mode: PmdMode) -> BindPlan {
    let target = mode.target_driver();
    if nic.bound_driver == target {
        BindPlan::AlreadyBound
    } else {
        BindPlan::Rebind {
            from: nic.bound_driver.clone(),
            to: target,
        }
    }
}

impl BindPlan {
    /// Shell commands (to run as root) carrying out the plan for `nic`.
    pub fn commands(&self, nic: &NicInfo) -> Vec<String> {
        let BindPlan::Rebind { from, to } = self else {
            return Vec::new();
        };

        let mut cmds = vec![format!(
            "echo {} > /sys/bus/vmbus/drivers/{}/unbind",
            nic.device_id, from
        )];
        if *to == PmdMode::Netvsc.target_driver() {
            cmds.push("modprobe uio_hv_generic".to_string());
            // uio_hv_generic only claims devices whose class id it was told about.
            cmds.push(format!(
                "echo {} > /sys/bus/vmbus/drivers/uio_hv_generic/new_id",
                HV_UIO_GENERIC_UUID
            ));
        }
        cmds.push(format!(
            "echo {} > /sys/bus/vmbus/drivers/{}/bind",
            nic.device_id, to
        ));
        cmds
    }
}

/// Shell commands (to run as root) returning a detached device to
/// `hv_netvsc`, so it shows up as an interface again.
pub fn reclaim_commands(device: &DetachedDevice) -> Vec<String> {
    let target = PmdMode::Failsafe.target_driver();
    let mut cmds = Vec::new();
    if let Some(driver) = &device.driver {
        cmds.push(format!(
            "echo {} > /sys/bus/vmbus/drivers/{}/unbind",
            device.device_id, driver
        ));
    }
    cmds.push(format!(
        "echo {} > /sys/bus/vmbus/drivers/{}/bind",
        device.device_id, target
    ));
    cmds
}

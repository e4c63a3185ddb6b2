//! Network interface discovery.
//!
//! A node's accelerated interfaces come in pairs: the synthetic `hv_netvsc`
//! interface ("upper") and the SR-IOV virtual function enslaved to it
//! ("lower"). Discovery runs [`DISCOVERY_SCRIPT`] on the node and parses one
//! line per VMBus network device with [`parse_nic_listing`].
//!
//! A synthetic device handed to `uio_hv_generic` by an earlier netvsc run
//! has no netdev, so it cannot be named or paired with its VF. Discovery
//! still lists it; [`parse_detached_devices`] reports such devices so they
//! can be returned to `hv_netvsc` before the test interface is picked.

/// Shell script printing `upper lower pci_slot ip driver device_id` per
/// VMBus network device (class id `HV_UIO_GENERIC_UUID`). Missing values
/// are printed as `-`; devices off `hv_netvsc` print `-` for every name.
pub const DISCOVERY_SCRIPT: &str = r#"for d in /sys/bus/vmbus/devices/*; do
  [ "$(cat "$d/class_id" 2>/dev/null)" = "{f8615163-df3e-46c5-913f-f2d2f965ed0e}" ] || continue
  dev_id=$(basename "$d")
  driver=-
  [ -e "$d/driver" ] && driver=$(basename "$(readlink -f "$d/driver")")
  upper=-; lower=-; pci=-; ip=-
  if [ "$driver" = hv_netvsc ]; then
    for n in "$d"/net/*; do
      [ -e "$n" ] && upper=$(basename "$n")
    done
  fi
  if [ "$upper" != - ]; then
    for l in /sys/class/net/"$upper"/lower_*; do
      [ -e "$l" ] || continue
      lower=${l##*/lower_}
      pci=$(basename "$(readlink -f "$l/device")")
    done
    addr=$(ip -4 -o addr show dev "$upper" | awk '{print $4}' | cut -d/ -f1 | head -n1)
    ip=${addr:--}
  fi
  echo "$upper $lower $pci $ip $driver $dev_id"
done"#;

/// Placeholder for a missing value in the discovery listing.
const NONE: &str = "-";

/// An accelerated interface pair on a test node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NicInfo {
    /// Synthetic interface name, e.g. `eth1`.
    pub upper: String,
    /// VF interface name, e.g. `enP30832s1`.
    pub lower: String,
    /// PCI slot of the VF, e.g. `7870:00:02.0`.
    pub pci_slot: String,
    /// IPv4 address of the synthetic interface, if any.
    pub ip_addr: Option<String>,
    /// Kernel driver the synthetic device is currently bound to.
    pub bound_driver: String,
    /// VMBus device id of the synthetic device.
    pub device_id: String,
}

/// A VMBus network device not on `hv_netvsc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedDevice {
    /// VMBus device id.
    pub device_id: String,
    /// Driver it is bound to, if any (usually `uio_hv_generic`).
    pub driver: Option<String>,
}

/// Malformed discovery output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A line did not have the expected number of fields.
    #[error("malformed interface line {line:?}: expected 6 fields, got {fields}")]
    FieldCount {
        /// Offending line.
        line: String,
        /// Number of fields found.
        fields: usize,
    },
}

fn listing_lines(output: &str) -> Result<Vec<[&str; 6]>, ParseError> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            <[&str; 6]>::try_from(fields.as_slice()).map_err(|_| ParseError::FieldCount {
                line: line.to_string(),
                fields: fields.len(),
            })
        })
        .collect()
}

/// Parse the output of [`DISCOVERY_SCRIPT`] into interface pairs.
///
/// Interfaces without a VF are skipped: they cannot exercise failover. So
/// are detached devices. The result is ordered by upper interface name,
/// numerically on the trailing index (`eth2` before `eth10`).
pub fn parse_nic_listing(output: &str) -> Result<Vec<NicInfo>, ParseError> {
    let mut nics = Vec::new();
    for [upper, lower, pci_slot, ip, driver, device_id] in listing_lines(output)? {
        if upper == NONE || lower == NONE || pci_slot == NONE {
            continue;
        }
        nics.push(NicInfo {
            upper: upper.to_string(),
            lower: lower.to_string(),
            pci_slot: pci_slot.to_string(),
            ip_addr: (ip != NONE).then(|| ip.to_string()),
            bound_driver: driver.to_string(),
            device_id: device_id.to_string(),
        });
    }
    nics.sort_by(|a, b| {
        interface_order(&a.upper)
            .cmp(&interface_order(&b.upper))
            .then_with(|| a.upper.cmp(&b.upper))
    });
    Ok(nics)
}

/// Devices in the output of [`DISCOVERY_SCRIPT`] that are not on
/// `hv_netvsc`, in listing order.
pub fn parse_detached_devices(output: &str) -> Result<Vec<DetachedDevice>, ParseError> {
    Ok(listing_lines(output)?
        .into_iter()
        .filter(|[.., driver, _]| *driver != "hv_netvsc")
        .map(|[.., driver, device_id]| DetachedDevice {
            device_id: device_id.to_string(),
            driver: (driver != NONE).then(|| driver.to_string()),
        })
        .collect())
}

/// Sort key splitting an interface name into its prefix and trailing index.
fn interface_order(name: &str) -> (&str, u64) {
    let prefix = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let index = name[prefix.len()..].parse().unwrap_or(0);
    (prefix, index)
}

/// Pick the interface under test.
///
/// With a preferred name, the pair whose upper interface has that name.
/// Otherwise the last pair: the first one carries management traffic.
pub fn select_test_nic<'a>(nics: &'a [NicInfo], preferred: Option<&str>) -> Option<&'a NicInfo> {
    match preferred {
        Some(name) => nics.iter().find(|nic| nic.upper == name),
        None => nics.last(),
    }
}

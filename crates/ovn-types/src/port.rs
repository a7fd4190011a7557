//! Tenant port definitions.

use crate::{NetworkId, ParseError, PortId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// VNIC type requested for a port binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VnicType {
    /// Regular virtio interface (default).
    #[default]
    Normal,
    /// SR-IOV virtual function.
    Direct,
    /// SR-IOV physical function passthrough.
    DirectPhysical,
    /// Macvtap on top of a virtual function.
    Macvtap,
    /// Bare metal server port.
    Baremetal,
    /// Virtio forwarder (vDPA-like relay).
    VirtioForwarder,
    /// SmartNIC managed port.
    SmartNic,
    /// vDPA device.
    Vdpa,
    /// Port managed by a remote DPU.
    RemoteManaged,
}

impl VnicType {
    /// Returns true if ports of this type are served by an external chassis
    /// unless they report hardware offload.
    pub const fn is_external_candidate(&self) -> bool {
        matches!(
            self,
            VnicType::Direct | VnicType::DirectPhysical | VnicType::Macvtap
        )
    }
}

impl fmt::Display for VnicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VnicType::Normal => "normal",
            VnicType::Direct => "direct",
            VnicType::DirectPhysical => "direct-physical",
            VnicType::Macvtap => "macvtap",
            VnicType::Baremetal => "baremetal",
            VnicType::VirtioForwarder => "virtio-forwarder",
            VnicType::SmartNic => "smart-nic",
            VnicType::Vdpa => "vdpa",
            VnicType::RemoteManaged => "remote-managed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for VnicType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(VnicType::Normal),
            "direct" => Ok(VnicType::Direct),
            "direct-physical" => Ok(VnicType::DirectPhysical),
            "macvtap" => Ok(VnicType::Macvtap),
            "baremetal" => Ok(VnicType::Baremetal),
            "virtio-forwarder" => Ok(VnicType::VirtioForwarder),
            "smart-nic" => Ok(VnicType::SmartNic),
            "vdpa" => Ok(VnicType::Vdpa),
            "remote-managed" => Ok(VnicType::RemoteManaged),
            _ => Err(ParseError::InvalidVnicType(s.to_string())),
        }
    }
}

/// A capability flag reported in a port's binding profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// The NIC is in switchdev mode and offloads the datapath.
    Switchdev,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Switchdev => write!(f, "switchdev"),
        }
    }
}

impl FromStr for Capability {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "switchdev" => Ok(Capability::Switchdev),
            _ => Err(ParseError::UnknownCapability(s.to_string())),
        }
    }
}

/// Typed view of a port's binding profile.
///
/// Only capabilities the reconciler understands are kept; unknown flags are
/// dropped when the profile is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawProfile", into = "RawProfile")]
pub struct BindingProfile {
    capabilities: BTreeSet<Capability>,
}

#[derive(Serialize, Deserialize)]
struct RawProfile {
    #[serde(default)]
    capabilities: Vec<String>,
}

impl BindingProfile {
    /// Builds a profile from raw capability strings.
    pub fn from_flags<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut capabilities = BTreeSet::new();
        for flag in flags {
            match flag.as_ref().parse::<Capability>() {
                Ok(cap) => {
                    capabilities.insert(cap);
                }
                Err(_) => log::debug!("ignoring binding profile capability '{}'", flag.as_ref()),
            }
        }
        Self { capabilities }
    }

    /// Returns a profile with a single capability.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }
}

impl From<RawProfile> for BindingProfile {
    fn from(raw: RawProfile) -> Self {
        BindingProfile::from_flags(raw.capabilities)
    }
}

impl From<BindingProfile> for RawProfile {
    fn from(profile: BindingProfile) -> Self {
        RawProfile {
            capabilities: profile.capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Port attribute named in an update event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortField {
    VnicType,
    BindingProfile,
    Host,
    FixedIps,
    AllowedAddressPairs,
    /// Any attribute the reconciler does not derive state from.
    Other,
}

impl PortField {
    /// Every field, as used for port creation.
    pub const ALL: [PortField; 6] = [
        PortField::VnicType,
        PortField::BindingProfile,
        PortField::Host,
        PortField::FixedIps,
        PortField::AllowedAddressPairs,
        PortField::Other,
    ];

    /// Returns true if a change to this field can alter the address index.
    pub const fn affects_addresses(&self) -> bool {
        matches!(self, PortField::FixedIps | PortField::AllowedAddressPairs)
    }

    /// Returns true if a change to this field can alter the port's own type.
    pub const fn affects_classification(&self) -> bool {
        !matches!(self, PortField::Host | PortField::Other)
    }
}

/// A tenant port as seen by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub network_id: NetworkId,
    /// Hostname the port is bound to, if any.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub vnic_type: VnicType,
    #[serde(default)]
    pub profile: BindingProfile,
    /// Primary addresses, in assignment order.
    #[serde(default)]
    pub fixed_ips: Vec<IpAddr>,
    /// Extra addresses this port may send from.
    #[serde(default)]
    pub allowed_address_pairs: Vec<IpAddr>,
    #[serde(default)]
    pub revision_number: u64,
}

impl Port {
    /// Creates an unbound normal port with no addresses.
    pub fn new(id: impl Into<PortId>, network_id: impl Into<NetworkId>) -> Self {
        Self {
            id: id.into(),
            network_id: network_id.into(),
            host: None,
            vnic_type: VnicType::Normal,
            profile: BindingProfile::default(),
            fixed_ips: Vec::new(),
            allowed_address_pairs: Vec::new(),
            revision_number: 1,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_vnic_type(mut self, vnic_type: VnicType) -> Self {
        self.vnic_type = vnic_type;
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.profile = self.profile.with_capability(capability);
        self
    }

    pub fn with_fixed_ip(mut self, ip: IpAddr) -> Self {
        self.fixed_ips.push(ip);
        self
    }

    pub fn with_allowed_address(mut self, ip: IpAddr) -> Self {
        self.allowed_address_pairs.push(ip);
        self
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision_number = revision;
        self
    }

    /// Returns true if the port should be served by an external chassis.
    pub fn is_external_candidate(&self) -> bool {
        self.vnic_type.is_external_candidate() && !self.profile.has(Capability::Switchdev)
    }

    /// Allowed-address IPs with duplicates removed, first occurrence kept.
    pub fn allowed_ips(&self) -> Vec<IpAddr> {
        let mut seen = BTreeSet::new();
        self.allowed_address_pairs
            .iter()
            .filter(|ip| seen.insert(**ip))
            .copied()
            .collect()
    }

    /// Fields that differ between `self` and `other`.
    pub fn changed_fields(&self, other: &Port) -> BTreeSet<PortField> {
        let mut fields = BTreeSet::new();
        if self.vnic_type != other.vnic_type {
            fields.insert(PortField::VnicType);
        }
        if self.profile != other.profile {
            fields.insert(PortField::BindingProfile);
        }
        if self.host != other.host {
            fields.insert(PortField::Host);
        }
        if self.fixed_ips != other.fixed_ips {
            fields.insert(PortField::FixedIps);
        }
        if self.allowed_ips() != other.allowed_ips() {
            fields.insert(PortField::AllowedAddressPairs);
        }
        fields
    }
}

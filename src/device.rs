// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Device conditions consulted before auto-downloading
pub trait DeviceState: Send + Sync {
    /// Whether the current connection may be used for automatic downloads
    fn network_suitable_for_auto_download(&self) -> bool;

    fn charging(&self) -> bool;
}

/// Fixed device conditions, e.g. taken from command line flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticDeviceState {
    pub network_suitable: bool,
    pub charging: bool,
}

impl StaticDeviceState {
    pub fn new(network_suitable: bool, charging: bool) -> Self {
        Self {
            network_suitable,
            charging,
        }
    }
}

impl Default for StaticDeviceState {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl DeviceState for StaticDeviceState {
    fn network_suitable_for_auto_download(&self) -> bool {
        self.network_suitable
    }

    fn charging(&self) -> bool {
        self.charging
    }
}

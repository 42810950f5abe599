//! Board-specific routing policy.

use crate::types::{cmd, netfn};

/// Routing decisions a board may override.
///
/// The defaults describe a controller that serves node-manager sensor reads
/// from the ME itself, handles its own OEM 1S maintenance commands from the
/// host and treats the bridge commands as answered elsewhere.
pub trait Platform: Send + Sync {
    /// Whether a request arriving from the ME is executed locally rather
    /// than bridged to the BMC.
    fn request_to_bic_from_me(&self, netfn: u8, cmd: u8) -> bool {
        netfn == netfn::OEM_REQ && cmd == cmd::OEM_NM_SENSOR_READ
    }

    /// Whether a request arriving from the host KCS is executed locally.
    fn request_to_bic_from_kcs(&self, netfn: u8, cmd: u8) -> bool {
        netfn == netfn::OEM_1S_REQ
            && matches!(
                cmd,
                cmd::OEM_1S_FW_UPDATE
                    | cmd::OEM_1S_RESET_BMC
                    | cmd::OEM_1S_GET_BIC_STATUS
                    | cmd::OEM_1S_RESET_BIC
            )
    }

    /// Whether the dispatcher must not send a response for this command
    /// because the command answers its source by other means.
    fn is_not_return_cmd(&self, netfn: u8, cmd: u8) -> bool {
        netfn == netfn::OEM_1S_REQ && matches!(cmd, cmd::OEM_1S_MSG_OUT | cmd::OEM_1S_MSG_IN)
    }
}

/// A platform that uses every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlatform;

impl Platform for DefaultPlatform {}

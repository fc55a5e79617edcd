//! Endpoint resolution
//!
//! Picks the inbound and outbound endpoint of an accessory interface from the
//! active configuration descriptor.

use tracing::debug;

use crate::error::{AccessoryError, Result};
use crate::transport::{ConfigurationLayout, TransferKind};
use crate::types::{Direction, EndpointPair};

/// Resolve the endpoint pair of a configuration
///
/// Endpoints are visited in descriptor order. The first one with the IN bit
/// set becomes the inbound endpoint; any other endpoint fills the outbound
/// slot if it is still empty. The transfer type is not checked, so an
/// interrupt endpoint can be selected on devices that list one first.
pub fn resolve_endpoints(layout: &ConfigurationLayout) -> Result<EndpointPair> {
    let mut in_address: Option<u8> = None;
    let mut out_address: Option<u8> = None;

    for endpoint in layout.endpoints() {
        if in_address.is_some() && out_address.is_some() {
            break;
        }

        if endpoint.transfer_kind != TransferKind::Bulk {
            debug!(
                "Endpoint {:#04x} is {:?}, not bulk",
                endpoint.address, endpoint.transfer_kind
            );
        }

        if in_address.is_none() && Direction::of_endpoint(endpoint.address) == Direction::In {
            in_address = Some(endpoint.address);
        } else if out_address.is_none() {
            out_address = Some(endpoint.address);
        }
    }

    let in_address = in_address.ok_or(AccessoryError::EndpointNotFound(Direction::In))?;
    let out_address = out_address.ok_or(AccessoryError::EndpointNotFound(Direction::Out))?;

    let pair = EndpointPair {
        in_address,
        out_address,
    };
    debug!("Resolved endpoints: {}", pair);
    Ok(pair)
}

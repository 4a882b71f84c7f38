//! Group sender-key sessions.
//!
//! One outbound session per (room, local account): a forward-only symmetric
//! chain whose key material is exported once per recipient via a
//! [`GroupDistributionMessage`](sealbox_proto::GroupDistributionMessage) and
//! installed on the receiving side as an inbound session. There is no
//! backward ratchet in the group direction; break-in recovery comes from the
//! host rotating to a fresh outbound session (on membership change or
//! suspicion).

mod engine;
mod inbound;
mod outbound;

pub use engine::GroupEngine;

pub(crate) use inbound::InboundGroupState;
pub(crate) use outbound::OutboundGroupState;

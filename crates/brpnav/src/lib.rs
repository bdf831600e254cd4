//! OpenIGTLink conformance testing for surgical robot navigation interfaces.
//!
//! brpnav plays the navigation software side of the robot workflow against a
//! robot controller and reports the first step at which the controller
//! deviates from the protocol. A reference robot simulator is included.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and Unix domain socket streams, endpoint parsing
//! - [`frame`]: OpenIGTLink v1 header and body codecs, message reader/writer
//! - [`peer`]: connections with receive deadlines (behind `peer` feature)
//! - [`conformance`]: navigation script, validators, robot simulator
//!   (behind `conformance` feature)

/// Re-export transport types.
pub mod transport {
    pub use brpnav_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use brpnav_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use brpnav_peer::*;
}

/// Re-export conformance types (requires `conformance` feature).
#[cfg(feature = "conformance")]
pub mod conformance {
    pub use brpnav_conformance::*;
}

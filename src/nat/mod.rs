//! NAT behavior classification over STUN
//!
//! This module determines how the local NAT treats UDP traffic without any
//! access to the router:
//! - Mapping behavior - does one local endpoint keep its external port across
//!   destinations (two plain Binding Requests from one socket)
//! - Filtering behavior - will the NAT admit a reply from an address we never
//!   sent to (CHANGE-REQUEST against a server advertising OTHER-ADDRESS)
//!
//! Partial failures degrade the classification instead of aborting. Only a
//! failed bind and a silent first server (`Blocked`) are reported as errors.

// Submodules
pub mod filtering;
pub mod mapping;
pub mod orchestrator;
pub mod server_list;
pub mod stun;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use types::{
    DetectionFailure, DetectionResult, FilteringBehavior, MappedEndpoint, MappingBehavior,
    NatClassification, ProbeError, TraversalOutlook,
};

// Re-export main functions
pub use filtering::{probe_filtering, FilteringOutcome, FilteringTimeouts};
pub use mapping::{classify_mapping, probe_mapping, MappingObservation};
pub use orchestrator::{detect_nat, detect_nat_with, detect_nat_with_config};
pub use server_list::{HttpServerList, ServerListSource, StaticServerList};
pub use stun::{build_binding_request, decode_response, ChangeRequest, DecodeError, StunError};
pub use transport::{ProbeSocket, StunTransport, UdpTransport};

pub mod bridge_server;
pub mod protocol;

pub use bridge_server::{dispatch, log_update_summary, BridgeServer};
pub use protocol::{parse, transition_report, Inbound, Outbound, INVALID_OBS};

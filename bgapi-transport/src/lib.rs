//! Serial handler for BlueGiga BGAPI devices.
//!
//! [`BgapiHandler`] owns one link. A background thread frames and decodes
//! the input stream; responses complete the oldest matching outstanding
//! command and events fan out to registered listeners.
//!
//! ```no_run
//! use std::net::TcpStream;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bgapi_protocol::{BgapiCommand, BgapiEvent, PacketRegistry};
//! use bgapi_transport::{BgapiEventListener, BgapiHandler, HandlerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:9000")?;
//! stream.set_read_timeout(Some(Duration::from_millis(100)))?;
//!
//! let handler = BgapiHandler::connect(
//!     stream.try_clone()?,
//!     stream,
//!     Arc::new(PacketRegistry::ble112()),
//!     HandlerConfig::load_from_env(),
//! )?;
//!
//! let listener: Arc<dyn BgapiEventListener> = Arc::new(|event: &BgapiEvent| println!("{:?}", event));
//! handler.add_event_listener(listener);
//!
//! let info = handler.send(BgapiCommand::SystemGetInfo)?;
//! println!("{:?}", info);
//! handler.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod stats;
pub mod transaction;
pub mod writer;

pub use config::HandlerConfig;
pub use error::TransportError;
pub use handler::BgapiHandler;
pub use listener::{BgapiEventListener, BgapiHandlerListener, EventQueue, ListenerSet};
pub use stats::HandlerStats;
pub use transaction::{TransactionManager, TransactionResult};
pub use writer::FrameWriter;

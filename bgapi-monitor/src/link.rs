//! Opening the byte stream a BGAPI device sits behind.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Where the device is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// A serial-to-TCP bridge such as `ser2net`.
    Tcp(String),
    /// An already configured character device, e.g. `/dev/ttyACM0`.
    Device(PathBuf),
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkTarget::Tcp(addr) => write!(f, "tcp://{}", addr),
            LinkTarget::Device(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Independent read and write halves of one link.
pub struct Link {
    pub input: Box<dyn Read + Send>,
    pub output: Box<dyn Write + Send>,
}

impl LinkTarget {
    /// Open the link. TCP reads time out after `read_timeout` so the
    /// handler can shut down promptly.
    pub fn open(&self, connect_timeout: Duration, read_timeout: Duration) -> io::Result<Link> {
        match self {
            LinkTarget::Tcp(addr) => {
                let socket = addr
                    .to_socket_addrs()?
                    .next()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("no address for {}", addr)))?;
                let stream = TcpStream::connect_timeout(&socket, connect_timeout)?;
                stream.set_nodelay(true)?;
                stream.set_read_timeout(Some(read_timeout))?;
                Ok(Link {
                    input: Box::new(stream.try_clone()?),
                    output: Box::new(stream),
                })
            }
            LinkTarget::Device(path) => {
                let file: File = OpenOptions::new().read(true).write(true).open(path)?;
                Ok(Link {
                    input: Box::new(file.try_clone()?),
                    output: Box::new(file),
                })
            }
        }
    }
}

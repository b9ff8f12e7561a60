//! Transport establishment (direct TCP or SOCKS5 tunnel)

mod proxy;

pub use proxy::{Dialer, Transport};

pub mod config;
pub mod session;
pub mod stream;
pub mod terminal;
pub mod transport;
pub mod util;

pub use config::Config;
pub use session::{
    ActionCoordinator, ActionError, Chunk, DeployAction, DuplexAdapter, SessionError, SessionId,
    SessionKind, SessionManager, SessionRegistry, SessionSnapshot, UnidirectionalAdapter,
};
pub use stream::{StreamTransformer, TransformConfig};
pub use terminal::{StdoutTerminal, Terminal};
pub use transport::{
    DuplexConnector, HttpStreamClient, StreamClient, StreamMessage, TransportError, WsConnector,
};
